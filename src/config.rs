//! Pipeline configuration.

use std::fs::File;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::Deserialize;

use crate::backend::BackendKind;
use crate::error::{PipelineError, PipelineResult};
use crate::system::shared_state::QueueCapacities;
use crate::visualizer::VisualizationType;

/// Seed used when `deterministic_random_number_generator` is set.
pub const DETERMINISTIC_SEED: u64 = 0x5EED_0F_C0FFEE;

/// Orchestrator configuration. Every field has a default, so a YAML file only
/// needs to list what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Write frontend/backend results as CSV into `output_dir`.
    pub log_output: bool,
    /// Run the parallel pipeline. The sequential pipeline is not available.
    pub parallel_run: bool,
    /// 0: normal VIO, 1: regular VIO.
    pub backend_type: u8,
    /// Factor modality of the regular VIO backend (0-4).
    pub regular_backend_modality: u8,
    /// Enable overall visualization.
    pub visualize: bool,
    /// Send landmark types along with mesher landmarks.
    pub visualize_lmk_type: bool,
    /// 0: point cloud, 1: repeated point cloud, 2: 2D mesh, 3: 2D→3D mesh,
    /// 4: sparse 2D mesh, 5: sparse 2D→3D mesh, 7: none.
    pub viz_type: i32,
    /// Smart feature selection. Not thread safe.
    pub use_feature_selection: bool,
    /// Repeatable pseudo-random sequences across runs.
    pub deterministic_random_number_generator: bool,
    /// Minimum number of keyframes observing a landmark for the mesher.
    pub min_num_obs_for_mesher_points: usize,
    pub backend_queue_capacity: usize,
    pub mesher_queue_capacity: usize,
    /// Visualizer payloads kept while the visualizer lags; older ones are dropped.
    pub visualizer_queue_capacity: usize,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_output: false,
            parallel_run: true,
            backend_type: 0,
            regular_backend_modality: 4,
            visualize: true,
            visualize_lmk_type: false,
            viz_type: 0,
            use_feature_selection: false,
            deterministic_random_number_generator: false,
            min_num_obs_for_mesher_points: 4,
            backend_queue_capacity: 1,
            mesher_queue_capacity: 1,
            visualizer_queue_capacity: 1,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let file = File::open(path.as_ref())?;
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn from_yaml_str(yaml: &str) -> PipelineResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reject unsupported settings and resolve the backend variant.
    pub fn validate(&self) -> PipelineResult<BackendKind> {
        if !self.parallel_run {
            return Err(PipelineError::Configuration(
                "sequential pipeline is not yet available, set parallel_run".to_string(),
            ));
        }
        if self.use_feature_selection {
            return Err(PipelineError::Configuration(
                "feature selection is not thread safe and cannot run in the parallel pipeline".to_string(),
            ));
        }
        BackendKind::from_codes(self.backend_type, self.regular_backend_modality)
    }

    pub fn visualization_type(&self) -> VisualizationType {
        VisualizationType::from_code(self.viz_type)
    }

    pub fn queue_capacities(&self) -> QueueCapacities {
        QueueCapacities {
            backend: self.backend_queue_capacity.max(1),
            mesher: self.mesher_queue_capacity.max(1),
            visualizer: self.visualizer_queue_capacity.max(1),
        }
    }

    /// Seed handed to randomized collaborators.
    pub fn rng_seed(&self) -> u64 {
        if self.deterministic_random_number_generator {
            DETERMINISTIC_SEED
        } else {
            rand::thread_rng().next_u64()
        }
    }
}
