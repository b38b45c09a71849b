//! State-estimation backend interface.
//!
//! The backend runs on its own thread and consumes one [`BackendInput`] per
//! keyframe. Everything the orchestrator needs from it afterwards (landmark
//! map, raw points, factor list, navigation state) travels back inside the
//! immutable [`BackendOutput`] snapshot.

pub mod dead_reckoning;

use std::collections::BTreeMap;

use anyhow::Result;
use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::error::{PipelineError, PipelineResult};
use crate::frontend::StereoCalibration;
use crate::imu::{GyroPreintegrator, ImuBias, ImuSample};
use crate::system::messages::{BackendInput, BackendOutput};
use crate::types::{LandmarkId, PlaneId, Pose3, Timestamp};

pub use dead_reckoning::{DeadReckoningBackend, DeadReckoningConfig, DeadReckoningFactory};

/// Factor types a regular backend may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegularModality {
    Structureless,
    Projection,
    StructurelessAndProjection,
    ProjectionAndRegularity,
    StructurelessProjectionAndRegularity,
}

impl TryFrom<u8> for RegularModality {
    type Error = PipelineError;

    fn try_from(value: u8) -> PipelineResult<Self> {
        Ok(match value {
            0 => Self::Structureless,
            1 => Self::Projection,
            2 => Self::StructurelessAndProjection,
            3 => Self::ProjectionAndRegularity,
            4 => Self::StructurelessProjectionAndRegularity,
            other => {
                return Err(PipelineError::Configuration(format!(
                    "unsupported regular backend modality {other} (supported: 0-4)"
                )))
            }
        })
    }
}

impl RegularModality {
    /// Landmark type produced for a freshly triangulated landmark.
    pub fn landmark_type(self) -> LandmarkType {
        match self {
            Self::Structureless | Self::StructurelessAndProjection => LandmarkType::Smart,
            _ => LandmarkType::Projection,
        }
    }

    pub fn uses_regularities(self) -> bool {
        matches!(
            self,
            Self::ProjectionAndRegularity | Self::StructurelessProjectionAndRegularity
        )
    }
}

/// Backend variant, selected once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Normal,
    Regular(RegularModality),
}

impl BackendKind {
    /// Resolve the `backend_type` / `regular_backend_modality` config pair.
    pub fn from_codes(backend_type: u8, regular_modality: u8) -> PipelineResult<Self> {
        match backend_type {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Regular(RegularModality::try_from(regular_modality)?)),
            other => Err(PipelineError::Configuration(format!(
                "requested backend type {other} is not supported (0: normal VIO, 1: regular VIO)"
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal VIO"),
            Self::Regular(m) => write!(f, "Regular VIO ({:?})", m),
        }
    }
}

/// How a landmark enters the factor graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkType {
    Smart,
    Projection,
    Plane,
}

/// Landmark estimate as held by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub position: Point3<f64>,
    /// Number of keyframes observing the landmark.
    pub num_observations: usize,
    pub kind: LandmarkType,
    pub last_seen_ns: Timestamp,
}

pub type LandmarkMap = BTreeMap<LandmarkId, Landmark>;
pub type PointsWithIdMap = BTreeMap<LandmarkId, Point3<f64>>;
pub type LmkIdToLmkTypeMap = BTreeMap<LandmarkId, LandmarkType>;

/// Summary of a factor in the backend graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Factor {
    Imu { from_kf: u64, to_kf: u64 },
    SmartStereo { landmark: LandmarkId },
    Projection { landmark: LandmarkId, kf: u64 },
    PointPlane { landmark: LandmarkId, plane: PlaneId },
}

/// Navigation state of the body at a keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavState {
    /// Body pose in world frame (W_Pose_B).
    pub pose: Pose3,
    pub velocity: Vector3<f64>,
    pub bias: ImuBias,
}

impl NavState {
    pub fn at_rest(pose: Pose3) -> Self {
        Self {
            pose,
            velocity: Vector3::zeros(),
            bias: ImuBias::zero(),
        }
    }
}

/// Everything a backend needs to initialize on the first frame.
#[derive(Debug, Clone)]
pub struct BackendInitialization {
    pub kind: BackendKind,
    pub calibration: StereoCalibration,
    pub timestamp_ns: Timestamp,
    /// IMU samples of the first packet (used for gravity alignment).
    pub imu: Vec<ImuSample>,
    /// Externally supplied initial state (ground truth), if any.
    pub initial_state: Option<NavState>,
    pub seed: u64,
}

/// Backend worker. Runs on its own thread once launched.
pub trait Backend: Send {
    /// Stateless helper computing the frontend rotation prior.
    fn gyro_preintegrator(&self) -> GyroPreintegrator;

    /// Initial navigation state, for logging.
    fn initial_state(&self) -> NavState;

    /// Estimate the state at one keyframe.
    fn spin_once(&mut self, input: BackendInput) -> Result<BackendOutput>;
}

/// Builds the backend for the configured variant.
pub trait BackendFactory {
    fn build(&self, init: &BackendInitialization) -> Result<Box<dyn Backend>>;
}

impl<F> BackendFactory for F
where
    F: Fn(&BackendInitialization) -> Result<Box<dyn Backend>>,
{
    fn build(&self, init: &BackendInitialization) -> Result<Box<dyn Backend>> {
        self(init)
    }
}

/// Rotation aligning the mean accelerometer reading with world +z.
///
/// Returns identity when no samples are given.
pub fn gravity_aligned_rotation(imu: &[ImuSample]) -> UnitQuaternion<f64> {
    if imu.is_empty() {
        return UnitQuaternion::identity();
    }
    let mean_accel = imu.iter().map(|s| s.accel).sum::<Vector3<f64>>() / imu.len() as f64;
    UnitQuaternion::rotation_between(&mean_accel, &Vector3::z()).unwrap_or_else(UnitQuaternion::identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_backend_kind_from_codes() {
        assert_eq!(BackendKind::from_codes(0, 9).unwrap(), BackendKind::Normal);
        assert_eq!(
            BackendKind::from_codes(1, 4).unwrap(),
            BackendKind::Regular(RegularModality::StructurelessProjectionAndRegularity)
        );
        assert!(matches!(BackendKind::from_codes(2, 0), Err(PipelineError::Configuration(_))));
        assert!(matches!(BackendKind::from_codes(1, 5), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_modality_landmark_types() {
        assert_eq!(RegularModality::Structureless.landmark_type(), LandmarkType::Smart);
        assert_eq!(RegularModality::Projection.landmark_type(), LandmarkType::Projection);
        assert!(RegularModality::ProjectionAndRegularity.uses_regularities());
        assert!(!RegularModality::StructurelessAndProjection.uses_regularities());
    }

    #[test]
    fn test_gravity_alignment() {
        // Body x axis points up.
        let imu = vec![ImuSample::new(0, Vector3::new(9.81, 0.0, 0.0), Vector3::zeros()); 4];
        let rot = gravity_aligned_rotation(&imu);
        let up = rot * Vector3::x();
        assert_relative_eq!(up, Vector3::z(), epsilon = 1e-9);

        assert_eq!(gravity_aligned_rotation(&[]), UnitQuaternion::identity());
    }
}
