//! CSV output of frontend and backend results.

use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::backend::NavState;
use crate::error::PipelineResult;
use crate::frontend::FrontendOutput;
use crate::system::messages::BackendOutput;
use crate::types::{FrameId, Timestamp};

pub const FRONTEND_CSV: &str = "output_frontend.csv";
pub const BACKEND_CSV: &str = "output_backend.csv";
pub const INITIAL_STATE_CSV: &str = "output_initial_state.csv";

#[derive(Debug, Serialize)]
struct FrontendRow {
    frame_id: u64,
    timestamp_ns: Timestamp,
    timestamp_lkf_ns: Timestamp,
    status: &'static str,
    num_measurements: usize,
    num_stereo: usize,
    is_keyframe: bool,
    frontend_ms: f64,
}

#[derive(Debug, Serialize)]
struct StateRow {
    timestamp_ns: Timestamp,
    x: f64,
    y: f64,
    z: f64,
    qw: f64,
    qx: f64,
    qy: f64,
    qz: f64,
    vx: f64,
    vy: f64,
    vz: f64,
}

impl StateRow {
    fn new(timestamp_ns: Timestamp, state: &NavState) -> Self {
        let t = state.pose.translation.vector;
        let q = state.pose.rotation;
        Self {
            timestamp_ns,
            x: t.x,
            y: t.y,
            z: t.z,
            qw: q.w,
            qx: q.i,
            qy: q.j,
            qz: q.k,
            vx: state.velocity.x,
            vy: state.velocity.y,
            vz: state.velocity.z,
        }
    }
}

#[derive(Debug, Serialize)]
struct BackendRow {
    keyframe_index: u64,
    timestamp_ns: Timestamp,
    x: f64,
    y: f64,
    z: f64,
    qw: f64,
    qx: f64,
    qy: f64,
    qz: f64,
    vx: f64,
    vy: f64,
    vz: f64,
    num_landmarks: usize,
    num_factors: usize,
    backend_ms: f64,
}

/// Writes one CSV file per result stream into an output directory.
pub struct ResultsLogger {
    frontend: Writer<File>,
    backend: Writer<File>,
    initial_state: Writer<File>,
}

impl ResultsLogger {
    /// Create `dir` if needed and open (truncate) the result files.
    pub fn create<P: AsRef<Path>>(dir: P) -> PipelineResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        info!("Writing results to {}", dir.display());
        Ok(Self {
            frontend: Writer::from_path(dir.join(FRONTEND_CSV))?,
            backend: Writer::from_path(dir.join(BACKEND_CSV))?,
            initial_state: Writer::from_path(dir.join(INITIAL_STATE_CSV))?,
        })
    }

    pub fn log_frontend(
        &mut self,
        frame_id: FrameId,
        timestamp_ns: Timestamp,
        timestamp_lkf_ns: Timestamp,
        output: &FrontendOutput,
        elapsed: Duration,
    ) -> PipelineResult<()> {
        self.frontend.serialize(FrontendRow {
            frame_id: frame_id.0,
            timestamp_ns,
            timestamp_lkf_ns,
            status: output.status.as_str(),
            num_measurements: output.measurements.len(),
            num_stereo: output.measurements.iter().filter(|m| m.right_u.is_some()).count(),
            is_keyframe: output.is_keyframe,
            frontend_ms: elapsed.as_secs_f64() * 1e3,
        })?;
        Ok(())
    }

    pub fn log_backend(&mut self, output: &BackendOutput, elapsed: Duration) -> PipelineResult<()> {
        let state = StateRow::new(output.timestamp_kf_ns, &output.state);
        self.backend.serialize(BackendRow {
            keyframe_index: output.keyframe_index,
            timestamp_ns: state.timestamp_ns,
            x: state.x,
            y: state.y,
            z: state.z,
            qw: state.qw,
            qx: state.qx,
            qy: state.qy,
            qz: state.qz,
            vx: state.vx,
            vy: state.vy,
            vz: state.vz,
            num_landmarks: output.landmarks.len(),
            num_factors: output.factors.len(),
            backend_ms: elapsed.as_secs_f64() * 1e3,
        })?;
        Ok(())
    }

    pub fn log_initial_state(&mut self, timestamp_ns: Timestamp, state: &NavState) -> PipelineResult<()> {
        self.initial_state.serialize(StateRow::new(timestamp_ns, state))?;
        Ok(())
    }

    pub fn flush(&mut self) -> PipelineResult<()> {
        self.frontend.flush()?;
        self.backend.flush()?;
        self.initial_state.flush()?;
        Ok(())
    }
}
