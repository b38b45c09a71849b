#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use nalgebra::{Point2, Point3, UnitQuaternion, Vector3};
use parking_lot::Mutex;

use rust_vio::backend::{
    Backend, BackendFactory, BackendInitialization, Factor, Landmark, LandmarkMap, LandmarkType, NavState,
};
use rust_vio::frontend::{
    Frontend, FrontendBootstrap, FrontendOutput, Image, KeyframeView, StereoCalibration, StereoFrame,
    StereoImuSyncPacket, StereoMeasurement, TrackedKeypoint, TrackingStatus,
};
use rust_vio::imu::{GyroPreintegrator, ImuSample};
use rust_vio::mesher::{mesh_2d_from_points, Mesh2D, Mesh2DKind, Mesh3D, Mesher};
use rust_vio::planes::{Plane, PlaneRegistry};
use rust_vio::system::{BackendInput, BackendOutput, MesherInput, MesherOutput, VisualizerInput, VisualizerOutput};
use rust_vio::types::{FrameId, LandmarkId, Pose3, Timestamp};
use rust_vio::visualizer::{DisplaySink, VisualizationType, Visualizer};
use rust_vio::{Collaborators, PipelineConfig};

pub const FRAME_PERIOD_NS: Timestamp = 50_000_000;
pub const START_NS: Timestamp = 1_000_000_000;
/// IMU samples per packet, both boundaries included.
pub const IMU_PER_PACKET: usize = 6;

pub fn timestamp(index: u64) -> Timestamp {
    START_NS + index * FRAME_PERIOD_NS
}

/// Packet `index` with evenly spaced IMU samples from the previous frame to this one.
pub fn packet(index: u64) -> StereoImuSyncPacket {
    let ts = timestamp(index);
    let from = ts - FRAME_PERIOD_NS;
    let step = FRAME_PERIOD_NS / (IMU_PER_PACKET as u64 - 1);
    let imu = (0..IMU_PER_PACKET as u64)
        .map(|i| ImuSample::new(from + i * step, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros()))
        .collect();
    let frame = StereoFrame {
        id: FrameId(index),
        timestamp_ns: ts,
        left: Image::black(16, 16),
        right: Image::black(16, 16),
    };
    StereoImuSyncPacket::new(frame, imu)
}

pub fn calibration() -> StereoCalibration {
    StereoCalibration {
        fx: 100.0,
        fy: 100.0,
        cx: 8.0,
        cy: 8.0,
        baseline: 0.1,
        body_pose_cam: Pose3::identity(),
    }
}

/// Poll `cond` until it holds or `timeout` expires.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Frontend whose keyframe decisions come from a script.
pub struct ScriptedFrontend {
    is_keyframe: Box<dyn Fn(FrameId) -> bool>,
    last_keyframe: Option<Arc<KeyframeView>>,
    pub processed: Arc<Mutex<Vec<FrameId>>>,
}

impl ScriptedFrontend {
    pub fn new(is_keyframe: impl Fn(FrameId) -> bool + 'static) -> Self {
        Self {
            is_keyframe: Box::new(is_keyframe),
            last_keyframe: None,
            processed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn keyframe_view(frame: &StereoFrame) -> Arc<KeyframeView> {
        let keypoints = [(2.0, 2.0), (12.0, 2.0), (12.0, 12.0), (2.0, 12.0)]
            .iter()
            .enumerate()
            .map(|(i, &(u, v))| TrackedKeypoint {
                landmark_id: LandmarkId(i as u64),
                pixel: Point2::new(u, v),
                right_valid: i != 3,
            })
            .collect();
        Arc::new(KeyframeView {
            frame: frame.clone(),
            keypoints,
        })
    }
}

impl Frontend for ScriptedFrontend {
    fn process_first(&mut self, frame: &StereoFrame, _seed: u64) -> Result<FrontendBootstrap> {
        self.last_keyframe = Some(Self::keyframe_view(frame));
        Ok(FrontendBootstrap {
            calibration: calibration(),
        })
    }

    fn process(&mut self, frame: &StereoFrame, _rotation_prior: &UnitQuaternion<f64>) -> Result<FrontendOutput> {
        self.processed.lock().push(frame.id);
        let is_keyframe = (self.is_keyframe)(frame.id);
        if is_keyframe {
            self.last_keyframe = Some(Self::keyframe_view(frame));
        }
        // One measurement per landmark, tagged with the frame id in the pixel.
        let measurements = (0..4)
            .map(|i| StereoMeasurement {
                landmark_id: LandmarkId(i),
                left: Point2::new(frame.id.0 as f64, 8.0),
                right_u: Some(frame.id.0 as f64 - 1.0),
            })
            .collect();
        Ok(FrontendOutput {
            status: TrackingStatus::Valid,
            measurements,
            is_keyframe,
            relative_pose_body_stereo: None,
        })
    }

    fn last_keyframe(&self) -> Option<Arc<KeyframeView>> {
        self.last_keyframe.clone()
    }

    fn mesh_2d(&self, kind: Mesh2DKind) -> Mesh2D {
        let Some(kf) = &self.last_keyframe else {
            return Mesh2D::default();
        };
        let points: Vec<_> = kf
            .keypoints
            .iter()
            .filter(|k| kind == Mesh2DKind::Dense || k.right_valid)
            .map(|k| k.pixel)
            .collect();
        mesh_2d_from_points(&points)
    }
}

/// What the recording backend saw for one keyframe.
#[derive(Debug, Clone)]
pub struct BackendCall {
    pub frame_id: FrameId,
    pub timestamp_kf_ns: Timestamp,
    pub timestamp_lkf_ns: Timestamp,
    pub imu_len: usize,
    pub imu_first_ns: Option<Timestamp>,
    pub imu_last_ns: Option<Timestamp>,
    pub num_measurements: usize,
    pub num_planes: usize,
    pub planes: Arc<PlaneRegistry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Error,
    Panic,
}

#[derive(Clone, Default)]
pub struct BackendRecorder {
    pub calls: Arc<Mutex<Vec<BackendCall>>>,
    pub builds: Arc<Mutex<Vec<BackendInitialization>>>,
}

pub struct RecordingBackend {
    recorder: BackendRecorder,
    fail_at_call: Option<(usize, Failure)>,
    planes_to_report: Vec<Plane>,
    index: u64,
}

impl Backend for RecordingBackend {
    fn gyro_preintegrator(&self) -> GyroPreintegrator {
        GyroPreintegrator::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    fn initial_state(&self) -> NavState {
        NavState::at_rest(Pose3::identity())
    }

    fn spin_once(&mut self, input: BackendInput) -> Result<BackendOutput> {
        let call_number = {
            let mut calls = self.recorder.calls.lock();
            calls.push(BackendCall {
                frame_id: input.frame_id,
                timestamp_kf_ns: input.timestamp_kf_ns,
                timestamp_lkf_ns: input.timestamp_lkf_ns,
                imu_len: input.imu.len(),
                imu_first_ns: input.imu.first().map(|s| s.timestamp_ns),
                imu_last_ns: input.imu.last().map(|s| s.timestamp_ns),
                num_measurements: input.measurements.len(),
                num_planes: input.planes.len(),
                planes: Arc::clone(&input.planes),
            });
            calls.len()
        };
        match self.fail_at_call {
            Some((n, Failure::Error)) if n == call_number => bail!("backend diverged"),
            Some((n, Failure::Panic)) if n == call_number => panic!("backend crashed"),
            _ => {}
        }

        self.index += 1;
        let mut landmarks = LandmarkMap::new();
        for (i, m) in input.measurements.iter().enumerate() {
            landmarks.insert(
                m.landmark_id,
                Landmark {
                    position: Point3::new(i as f64, 0.0, 2.0),
                    num_observations: i + 1,
                    kind: LandmarkType::Smart,
                    last_seen_ns: input.timestamp_kf_ns,
                },
            );
        }
        let points_3d: Vec<_> = landmarks.values().map(|l| l.position).chain([Point3::new(0.0, 0.0, 2.0)]).collect();
        Ok(BackendOutput {
            timestamp_kf_ns: input.timestamp_kf_ns,
            keyframe_index: self.index,
            state: NavState::at_rest(Pose3::identity()),
            covariance: nalgebra::Matrix6::identity(),
            landmarks,
            points_3d,
            factors: vec![Factor::Imu {
                from_kf: self.index - 1,
                to_kf: self.index,
            }],
            body_pose_left_cam: Pose3::identity(),
            updated_planes: (!self.planes_to_report.is_empty()).then(|| self.planes_to_report.clone()),
        })
    }
}

pub struct RecordingBackendFactory {
    pub recorder: BackendRecorder,
    pub fail_at_call: Option<(usize, Failure)>,
    pub planes_to_report: Vec<Plane>,
}

impl RecordingBackendFactory {
    pub fn new(recorder: BackendRecorder) -> Self {
        Self {
            recorder,
            fail_at_call: None,
            planes_to_report: Vec::new(),
        }
    }
}

impl BackendFactory for RecordingBackendFactory {
    fn build(&self, init: &BackendInitialization) -> Result<Box<dyn Backend>> {
        self.recorder.builds.lock().push(init.clone());
        Ok(Box::new(RecordingBackend {
            recorder: self.recorder.clone(),
            fail_at_call: self.fail_at_call,
            planes_to_report: self.planes_to_report.clone(),
            index: 0,
        }))
    }
}

/// Mesher returning one triangle per input, recording obstacle filtering.
#[derive(Clone, Default)]
pub struct RecordingMesher {
    pub calls: Arc<Mutex<Vec<(usize, bool)>>>,
}

impl Mesher for RecordingMesher {
    fn spin_once(&mut self, input: MesherInput) -> Result<MesherOutput> {
        self.calls.lock().push((input.points_with_id.len(), input.filter_obstacles));
        let vertices: Vec<_> = input.points_with_id.values().copied().take(3).collect();
        let polygons = if vertices.len() == 3 { vec![[0, 1, 2]] } else { Vec::new() };
        Ok(MesherOutput {
            timestamp_ns: input.timestamp_ns,
            mesh_2d: Mesh2D {
                triangles: vec![[Point2::new(0.0, 0.0), Point2::new(4.0, 0.0), Point2::new(0.0, 4.0)]],
            },
            mesh_3d: Mesh3D { vertices, polygons },
        })
    }
}

/// Summary of a visualizer input.
#[derive(Debug, Clone)]
pub struct VisualizerCall {
    pub visualization_type: VisualizationType,
    pub timestamp_ns: Timestamp,
    pub mesh_2d_len: usize,
    pub mesh_3d_polygons: usize,
    pub has_keyframe: bool,
    pub num_points_with_id: usize,
    pub num_lmk_types: usize,
    pub num_points_3d: usize,
    pub num_colors: usize,
}

#[derive(Clone, Default)]
pub struct RecordingVisualizer {
    pub calls: Arc<Mutex<Vec<VisualizerCall>>>,
    /// Time spent on every input, to simulate a slow renderer.
    pub delay: Duration,
}

impl Visualizer for RecordingVisualizer {
    fn spin_once(&mut self, input: VisualizerInput) -> Result<Option<VisualizerOutput>> {
        self.calls.lock().push(VisualizerCall {
            visualization_type: input.visualization_type,
            timestamp_ns: input.timestamp_ns,
            mesh_2d_len: input.mesh_2d.len(),
            mesh_3d_polygons: input.mesher_output.mesh_3d.polygons.len(),
            has_keyframe: input.keyframe.is_some(),
            num_points_with_id: input.points_with_id.len(),
            num_lmk_types: input.lmk_types.len(),
            num_points_3d: input.points_3d.len(),
            num_colors: input.mesh_3d_colors.len(),
        });
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(Some(VisualizerOutput {
            visualization_type: input.visualization_type,
            timestamp_ns: input.timestamp_ns,
            images_to_display: Vec::new(),
            scene: Default::default(),
        }))
    }
}

#[derive(Clone, Default)]
pub struct CountingDisplay {
    pub shown: Arc<Mutex<Vec<Timestamp>>>,
}

impl DisplaySink for CountingDisplay {
    fn spin_once(&mut self, output: VisualizerOutput) {
        self.shown.lock().push(output.timestamp_ns);
    }
}

/// Mock collaborators plus handles on what they recorded.
pub struct Harness {
    pub backend: BackendRecorder,
    pub frontend_frames: Arc<Mutex<Vec<FrameId>>>,
    pub mesher: RecordingMesher,
    pub visualizer: RecordingVisualizer,
    pub display: CountingDisplay,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            backend: BackendRecorder::default(),
            frontend_frames: Arc::new(Mutex::new(Vec::new())),
            mesher: RecordingMesher::default(),
            visualizer: RecordingVisualizer::default(),
            display: CountingDisplay::default(),
        }
    }

    pub fn collaborators(&self, is_keyframe: impl Fn(FrameId) -> bool + 'static) -> Collaborators {
        self.collaborators_with(is_keyframe, RecordingBackendFactory::new(self.backend.clone()))
    }

    pub fn collaborators_with(
        &self,
        is_keyframe: impl Fn(FrameId) -> bool + 'static,
        factory: RecordingBackendFactory,
    ) -> Collaborators {
        let mut frontend = ScriptedFrontend::new(is_keyframe);
        frontend.processed = Arc::clone(&self.frontend_frames);
        Collaborators {
            frontend: Box::new(frontend),
            backend_factory: Box::new(factory),
            mesher: Box::new(self.mesher.clone()),
            visualizer: Box::new(self.visualizer.clone()),
            display: Box::new(self.display.clone()),
            segmentation: None,
        }
    }

    pub fn backend_calls(&self) -> Vec<BackendCall> {
        self.backend.calls.lock().clone()
    }

    pub fn visualizer_calls(&self) -> Vec<VisualizerCall> {
        self.visualizer.calls.lock().clone()
    }
}

/// Deterministic config without result files.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        deterministic_random_number_generator: true,
        min_num_obs_for_mesher_points: 2,
        ..Default::default()
    }
}
