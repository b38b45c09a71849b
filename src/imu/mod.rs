pub mod accumulator;
pub mod preintegration;
pub mod sample;

pub use accumulator::ImuAccumulator;
pub use preintegration::{GyroPreintegrator, PreintegratedState, Preintegrator};
pub use sample::{GRAVITY, ImuBias, ImuNoise, ImuSample};
