pub mod backend;
pub mod config;
pub mod error;
pub mod frontend;
pub mod imu;
pub mod io;
pub mod mesher;
pub mod planes;
pub mod system;
pub mod types;
pub mod visualizer;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use system::{Collaborators, Pipeline, PipelineState, SpinOutcome};
