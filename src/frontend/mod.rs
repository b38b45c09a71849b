//! Stereo frontend: turns frames into measurement bundles and keyframe decisions.
//!
//! The orchestrator only depends on the [`Frontend`] trait. Feature tracking
//! itself is a collaborator; [`IntervalFrontend`] is a simple reference
//! implementation used by the binary and the integration tests.

pub mod camera;
pub mod frame;
pub mod interval;
pub mod keyframe_decision;
pub mod state;

use std::sync::Arc;

use anyhow::Result;
use nalgebra::{Point2, UnitQuaternion};

use crate::mesher::{Mesh2D, Mesh2DKind};
use crate::types::{LandmarkId, Pose3};

pub use camera::StereoCalibration;
pub use frame::{Image, KeyframeView, StereoFrame, StereoImuSyncPacket, TrackedKeypoint};
pub use interval::{IntervalFrontend, IntervalFrontendConfig};
pub use keyframe_decision::KeyFrameDecision;
pub use state::TrackingStatus;

/// A landmark observed in both rectified images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoMeasurement {
    pub landmark_id: LandmarkId,
    pub left: Point2<f64>,
    /// Column in the right image; `None` when the stereo match failed.
    pub right_u: Option<f64>,
}

/// Measurement bundle for one frame.
pub type StereoMeasurements = Vec<StereoMeasurement>;

/// What the frontend hands back after bootstrapping on the first frame.
#[derive(Debug, Clone, Copy)]
pub struct FrontendBootstrap {
    pub calibration: StereoCalibration,
}

/// Result of tracking one frame.
#[derive(Debug, Clone)]
pub struct FrontendOutput {
    pub status: TrackingStatus,
    pub measurements: StereoMeasurements,
    pub is_keyframe: bool,
    /// Relative body pose from the last keyframe, from stereo geometry.
    pub relative_pose_body_stereo: Option<Pose3>,
}

/// Stereo frontend collaborator. Runs in the orchestrator thread.
pub trait Frontend {
    /// Bootstrap on the first frame. `seed` makes randomized steps reproducible.
    fn process_first(&mut self, frame: &StereoFrame, seed: u64) -> Result<FrontendBootstrap>;

    /// Track `frame` using `rotation_prior` (left camera, last keyframe → current frame).
    fn process(&mut self, frame: &StereoFrame, rotation_prior: &UnitQuaternion<f64>) -> Result<FrontendOutput>;

    /// Snapshot of the last keyframe.
    fn last_keyframe(&self) -> Option<Arc<KeyframeView>>;

    /// 2D mesh over the keypoints of the last keyframe's left image.
    fn mesh_2d(&self, kind: Mesh2DKind) -> Mesh2D;
}
