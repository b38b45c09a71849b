//! Payloads transferred through the stage queues.
//!
//! Every payload is moved into its queue and consumed exactly once. The only
//! shared payload is the backend output, which is wrapped in an `Arc` and
//! never mutated after production.

use std::sync::Arc;

use nalgebra::{Matrix6, Point3};

use crate::backend::{
    BackendKind, Factor, LandmarkMap, LmkIdToLmkTypeMap, NavState, PointsWithIdMap,
};
use crate::frontend::{Image, KeyframeView, StereoMeasurements, TrackingStatus};
use crate::imu::ImuSample;
use crate::mesher::{Mesh2D, Mesh3D, Mesh3DColors};
use crate::planes::{Plane, PlaneRegistry};
use crate::types::{FrameId, Pose3, Timestamp};
use crate::visualizer::VisualizationType;

/// Sent to the backend once per keyframe.
#[derive(Debug)]
pub struct BackendInput {
    pub frame_id: FrameId,
    /// Timestamp of this keyframe.
    pub timestamp_kf_ns: Timestamp,
    /// Timestamp of the previous keyframe.
    pub timestamp_lkf_ns: Timestamp,
    pub measurements: StereoMeasurements,
    pub tracking_status: TrackingStatus,
    /// IMU samples from the previous keyframe to this one.
    pub imu: Vec<ImuSample>,
    /// Read-only snapshot of the orchestrator's plane registry.
    pub planes: Arc<PlaneRegistry>,
    /// Relative body pose from the frontend's stereo geometry.
    pub relative_pose_body_stereo: Option<Pose3>,
}

/// Backend estimate at one keyframe.
#[derive(Debug, Clone)]
pub struct BackendOutput {
    pub timestamp_kf_ns: Timestamp,
    /// Sequential keyframe index assigned by the backend.
    pub keyframe_index: u64,
    pub state: NavState,
    /// Pose covariance (rotation, translation).
    pub covariance: Matrix6<f64>,
    /// Landmarks in the current time horizon.
    pub landmarks: LandmarkMap,
    /// Raw 3D points, possibly repeated across keyframes.
    pub points_3d: Vec<Point3<f64>>,
    pub factors: Vec<Factor>,
    /// Pose of the left camera in the body frame.
    pub body_pose_left_cam: Pose3,
    /// Plane models refined by the backend; merged by the orchestrator.
    pub updated_planes: Option<Vec<Plane>>,
}

impl BackendOutput {
    /// Landmarks observed in at least `min_num_obs` keyframes.
    pub fn landmarks_in_time_horizon(&self, min_num_obs: usize) -> PointsWithIdMap {
        self.landmarks
            .iter()
            .filter(|(_, lmk)| lmk.num_observations >= min_num_obs)
            .map(|(id, lmk)| (*id, lmk.position))
            .collect()
    }

    /// Landmark types, with the same observation filter.
    pub fn landmark_types(&self, min_num_obs: usize) -> LmkIdToLmkTypeMap {
        self.landmarks
            .iter()
            .filter(|(_, lmk)| lmk.num_observations >= min_num_obs)
            .map(|(id, lmk)| (*id, lmk.kind))
            .collect()
    }

    /// World pose of the left camera at this keyframe.
    pub fn left_camera_pose(&self) -> Pose3 {
        self.state.pose * self.body_pose_left_cam
    }
}

/// Sent to the mesher for mesh-producing visualization modes.
#[derive(Debug)]
pub struct MesherInput {
    pub timestamp_ns: Timestamp,
    pub points_with_id: PointsWithIdMap,
    pub keyframe: Arc<KeyframeView>,
    /// World pose of the left camera at the keyframe.
    pub camera_pose: Pose3,
    pub planes: Arc<PlaneRegistry>,
    /// Drop triangles that do not correspond to planar surfaces.
    pub filter_obstacles: bool,
}

/// Mesher result. The default value is the empty mesh.
#[derive(Debug, Clone, Default)]
pub struct MesherOutput {
    pub timestamp_ns: Timestamp,
    pub mesh_2d: Mesh2D,
    pub mesh_3d: Mesh3D,
}

/// Sent to the visualizer once per keyframe when visualization is enabled.
///
/// Slots a visualization mode does not use hold empty defaults.
#[derive(Debug)]
pub struct VisualizerInput {
    pub visualization_type: VisualizationType,
    pub backend_kind: BackendKind,
    pub timestamp_ns: Timestamp,
    /// World pose of the left camera, for the trajectory.
    pub pose: Pose3,
    /// 2D mesh for the `Mesh2D*` modes.
    pub mesh_2d: Mesh2D,
    /// Output of the semantic segmentation hook, empty if none registered.
    pub mesh_3d_colors: Mesh3DColors,
    /// Last keyframe, for drawing on its left image.
    pub keyframe: Option<Arc<KeyframeView>>,
    pub mesher_output: MesherOutput,
    pub points_with_id: PointsWithIdMap,
    pub lmk_types: LmkIdToLmkTypeMap,
    pub planes: Arc<PlaneRegistry>,
    /// Factors and state snapshot.
    pub backend: Arc<BackendOutput>,
    pub points_3d: Vec<Point3<f64>>,
}

/// A 2D image the display sink should show.
#[derive(Debug, Clone)]
pub struct ImageToDisplay {
    pub name: String,
    pub image: Image,
}

/// 3D scene content the display sink should render.
#[derive(Debug, Clone, Default)]
pub struct Scene3D {
    pub trajectory: Vec<Point3<f64>>,
    pub points: Vec<Point3<f64>>,
    pub mesh: Mesh3D,
}

/// Visualizer result for one keyframe.
#[derive(Debug, Clone)]
pub struct VisualizerOutput {
    pub visualization_type: VisualizationType,
    pub timestamp_ns: Timestamp,
    pub images_to_display: Vec<ImageToDisplay>,
    pub scene: Scene3D,
}
