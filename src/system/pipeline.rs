//! Pipeline orchestrator.
//!
//! The `Pipeline` is driven by the frame source through [`Pipeline::spin`].
//! It runs the frontend in the calling thread, accumulates IMU samples
//! between keyframes and, for every keyframe, fans the work out to the
//! backend, mesher and visualizer threads through the stage queues.
//!
//! The backend and the mesher are used synchronously: exactly one payload is
//! in flight to each of them. The visualizer is fire-and-forget: when it lags,
//! its bounded input queue drops the oldest payload, and its output is polled
//! without blocking.

use std::sync::Arc;
use std::time::Instant;

use nalgebra::Point3;
use tracing::{debug, error, info, warn};

use super::messages::{BackendInput, BackendOutput, MesherInput, MesherOutput, VisualizerInput};
use super::queue::QueueClosed;
use super::shared_state::SharedState;
use super::workers::WorkerThreads;
use crate::backend::{
    BackendFactory, BackendInitialization, BackendKind, LmkIdToLmkTypeMap, NavState, PointsWithIdMap,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::frontend::{Frontend, FrontendOutput, Image, KeyframeView, StereoImuSyncPacket};
use crate::imu::{GyroPreintegrator, ImuAccumulator};
use crate::io::ResultsLogger;
use crate::mesher::{Mesh2D, Mesh2DKind, Mesh3D, Mesh3DColors, Mesher};
use crate::planes::PlaneRegistry;
use crate::types::{FrameId, Timestamp};
use crate::visualizer::{DisplaySink, VisualizationType, Visualizer};

/// Semantic segmentation hook coloring the 3D mesh from the left image.
pub type SegmentationHook = Box<dyn FnMut(&Image, &Mesh2D, &Mesh3D) -> Mesh3DColors + Send>;

/// Lifecycle of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No frame processed yet.
    Uninitialized,
    /// Workers launched, frames are processed.
    Running,
    /// Terminal. Workers joined, queues closed.
    ShuttingDown,
}

/// What one `spin` call did with its packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinOutcome {
    /// First packet: collaborators initialized and workers launched.
    Bootstrapped,
    /// Frame tracked, not a keyframe.
    Tracked,
    /// Keyframe processed by the backend.
    Keyframe,
}

/// Everything the orchestrator drives.
pub struct Collaborators {
    pub frontend: Box<dyn Frontend>,
    pub backend_factory: Box<dyn BackendFactory>,
    pub mesher: Box<dyn Mesher>,
    pub visualizer: Box<dyn Visualizer>,
    pub display: Box<dyn DisplaySink>,
    pub segmentation: Option<SegmentationHook>,
}

pub struct Pipeline {
    config: PipelineConfig,
    backend_kind: BackendKind,
    visualization_type: VisualizationType,
    state: PipelineState,
    shared: Arc<SharedState>,

    frontend: Box<dyn Frontend>,
    backend_factory: Box<dyn BackendFactory>,
    /// Mesher and visualizer until they move into their threads.
    pending_workers: Option<(Box<dyn Mesher>, Box<dyn Visualizer>)>,
    workers: Option<WorkerThreads>,
    display: Box<dyn DisplaySink>,
    segmentation: Option<SegmentationHook>,

    /// Available once the backend is built.
    gyro_preintegrator: Option<GyroPreintegrator>,
    ground_truth_initial_state: Option<NavState>,
    imu_buffer: ImuAccumulator,
    timestamp_lkf: Timestamp,
    /// Shared with in-flight payloads; copied only when merged while shared.
    planes: Arc<PlaneRegistry>,
    latest_backend_output: Option<Arc<BackendOutput>>,
    keyframes_processed: u64,
    visualizer_inputs_dropped: u64,
    logger: Option<ResultsLogger>,
}

impl Pipeline {
    /// Validate the configuration and set up queues and outputs.
    ///
    /// No thread is started before the first `spin`.
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> PipelineResult<Self> {
        let backend_kind = config.validate()?;
        let visualization_type = config.visualization_type();
        let logger = if config.log_output {
            Some(ResultsLogger::create(&config.output_dir)?)
        } else {
            None
        };
        info!(
            "Pipeline configured: {} backend, visualization {:?} (enabled: {})",
            backend_kind, visualization_type, config.visualize
        );

        Ok(Self {
            shared: SharedState::new(config.queue_capacities()),
            backend_kind,
            visualization_type,
            state: PipelineState::Uninitialized,
            frontend: collaborators.frontend,
            backend_factory: collaborators.backend_factory,
            pending_workers: Some((collaborators.mesher, collaborators.visualizer)),
            workers: None,
            display: collaborators.display,
            segmentation: collaborators.segmentation,
            gyro_preintegrator: None,
            ground_truth_initial_state: None,
            imu_buffer: ImuAccumulator::new(),
            timestamp_lkf: 0,
            planes: Arc::new(PlaneRegistry::new()),
            latest_backend_output: None,
            keyframes_processed: 0,
            visualizer_inputs_dropped: 0,
            logger,
            config,
        })
    }

    /// Initialize the backend from this state instead of the IMU attitude.
    ///
    /// Must be called before the first `spin`. Once the backend is built the
    /// state is rejected with a `Configuration` error and the running
    /// pipeline is left as is.
    pub fn set_ground_truth_initial_state(&mut self, state: NavState) -> PipelineResult<()> {
        if self.state != PipelineState::Uninitialized {
            warn!("Ignoring ground-truth initial state, pipeline is {:?}", self.state);
            return Err(PipelineError::Configuration(
                "ground-truth initial state must be set before the first packet".to_string(),
            ));
        }
        self.ground_truth_initial_state = Some(state);
        Ok(())
    }

    /// Process one synchronized stereo/IMU packet.
    ///
    /// The first call only bootstraps the collaborators and launches the
    /// workers. Fatal errors shut the pipeline down before they are returned.
    pub fn spin(&mut self, packet: StereoImuSyncPacket) -> PipelineResult<SpinOutcome> {
        let result = match self.state {
            PipelineState::ShuttingDown => return Err(PipelineError::NotRunning),
            PipelineState::Uninitialized => self.initialize(&packet).map(|()| SpinOutcome::Bootstrapped),
            PipelineState::Running => match self.shared.failure() {
                // A worker died between two calls.
                Some(failure) => Err(PipelineError::WorkerFailed {
                    worker: failure.worker,
                    reason: failure.reason,
                }),
                None => self.spin_once(&packet),
            },
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                error!("Pipeline failed on {}: {}", packet.frame_id(), e);
                self.shutdown();
            }
        }
        result
    }

    fn initialize(&mut self, packet: &StereoImuSyncPacket) -> PipelineResult<()> {
        let frame = &packet.stereo_frame;
        info!("Initializing pipeline on {} at {}", frame.id, frame.timestamp_ns);

        let seed = self.config.rng_seed();
        let bootstrap = self.frontend.process_first(frame, seed)?;

        let init = BackendInitialization {
            kind: self.backend_kind,
            calibration: bootstrap.calibration,
            timestamp_ns: frame.timestamp_ns,
            imu: packet.imu.clone(),
            initial_state: self.ground_truth_initial_state,
            seed,
        };
        let backend = self.backend_factory.build(&init)?;
        self.gyro_preintegrator = Some(backend.gyro_preintegrator());
        if let Some(logger) = self.logger.as_mut() {
            logger.log_initial_state(frame.timestamp_ns, &backend.initial_state())?;
        }

        let (mesher, visualizer) = self
            .pending_workers
            .take()
            .ok_or_else(|| PipelineError::Configuration("workers were already launched".to_string()))?;
        self.workers = Some(WorkerThreads::launch(Arc::clone(&self.shared), backend, mesher, visualizer)?);

        self.imu_buffer.reset();
        self.timestamp_lkf = frame.timestamp_ns;
        self.state = PipelineState::Running;
        Ok(())
    }

    fn spin_once(&mut self, packet: &StereoImuSyncPacket) -> PipelineResult<SpinOutcome> {
        let frame = &packet.stereo_frame;
        let gyro = self
            .gyro_preintegrator
            .ok_or_else(|| PipelineError::Precheck("backend not initialized".to_string()))?;

        self.imu_buffer.merge(&packet.imu)?;
        debug!("IMU buffer holds {} samples", self.imu_buffer.len());

        // Rotation of the left camera from the last keyframe to this frame.
        let rotation_prior = gyro.preintegrate(self.imu_buffer.samples());

        let started = Instant::now();
        let output = self.frontend.process(frame, &rotation_prior)?;
        let elapsed = started.elapsed();
        if let Some(logger) = self.logger.as_mut() {
            logger.log_frontend(frame.id, frame.timestamp_ns, self.timestamp_lkf, &output, elapsed)?;
        }
        info!(
            "Processed {} ({}): {} measurements{}",
            frame.id,
            output.status,
            output.measurements.len(),
            if output.is_keyframe { ", keyframe" } else { "" }
        );

        if !output.is_keyframe {
            return Ok(SpinOutcome::Tracked);
        }

        self.process_keyframe(frame.id, frame.timestamp_ns, output, &frame.left)?;
        self.imu_buffer.reset();
        self.timestamp_lkf = frame.timestamp_ns;
        Ok(SpinOutcome::Keyframe)
    }

    fn process_keyframe(
        &mut self,
        frame_id: FrameId,
        timestamp_kf_ns: Timestamp,
        frontend_output: FrontendOutput,
        left_image: &Image,
    ) -> PipelineResult<()> {
        let backend_input = BackendInput {
            frame_id,
            timestamp_kf_ns,
            timestamp_lkf_ns: self.timestamp_lkf,
            measurements: frontend_output.measurements,
            tracking_status: frontend_output.status,
            imu: self.imu_buffer.take(),
            planes: Arc::clone(&self.planes),
            relative_pose_body_stereo: frontend_output.relative_pose_body_stereo,
        };

        let started = Instant::now();
        let queues = &self.shared.queues;
        queues
            .backend_input
            .push_blocking(backend_input)
            .map_err(|e| self.closed_error(e))?;
        let backend_output = queues.backend_output.pop_blocking().map_err(|e| self.closed_error(e))?;
        let elapsed = started.elapsed();
        self.keyframes_processed += 1;

        if let Some(updated) = &backend_output.updated_planes {
            let added = Arc::make_mut(&mut self.planes).merge(updated.iter().cloned());
            debug!("Merged {} planes ({} new)", updated.len(), added);
        }
        if let Some(logger) = self.logger.as_mut() {
            logger.log_backend(&backend_output, elapsed)?;
        }
        self.latest_backend_output = Some(Arc::clone(&backend_output));

        if self.config.visualize {
            let input = self.build_visualizer_input(timestamp_kf_ns, &backend_output, left_image)?;
            self.dispatch_visualization(input)?;
        }
        Ok(())
    }

    /// Compute what the visualization mode needs and pack it.
    ///
    /// Slots the mode does not use keep their empty defaults.
    fn build_visualizer_input(
        &mut self,
        timestamp_ns: Timestamp,
        backend_output: &Arc<BackendOutput>,
        left_image: &Image,
    ) -> PipelineResult<VisualizerInput> {
        let mut input = VisualizerInput {
            visualization_type: self.visualization_type,
            backend_kind: self.backend_kind,
            timestamp_ns,
            pose: backend_output.left_camera_pose(),
            mesh_2d: Mesh2D::default(),
            mesh_3d_colors: Mesh3DColors::new(),
            keyframe: None,
            mesher_output: MesherOutput::default(),
            points_with_id: PointsWithIdMap::new(),
            lmk_types: LmkIdToLmkTypeMap::new(),
            planes: Arc::clone(&self.planes),
            backend: Arc::clone(backend_output),
            points_3d: Vec::<Point3<f64>>::new(),
        };

        match self.visualization_type {
            VisualizationType::Mesh2D => {
                input.mesh_2d = self.frontend.mesh_2d(Mesh2DKind::Dense);
                input.keyframe = self.frontend.last_keyframe();
            }
            VisualizationType::Mesh2DSparse => {
                input.mesh_2d = self.frontend.mesh_2d(Mesh2DKind::Sparse);
                input.keyframe = self.frontend.last_keyframe();
            }
            VisualizationType::Mesh2DTo3D | VisualizationType::Mesh2DTo3DSparse => {
                let min_obs = self.config.min_num_obs_for_mesher_points;
                input.points_with_id = backend_output.landmarks_in_time_horizon(min_obs);
                if self.config.visualize_lmk_type {
                    input.lmk_types = backend_output.landmark_types(min_obs);
                }
                match self.frontend.last_keyframe() {
                    Some(keyframe) => {
                        input.mesher_output =
                            self.run_mesher(timestamp_ns, &input.points_with_id, &keyframe, backend_output)?;
                        input.keyframe = Some(keyframe);
                    }
                    None => warn!("No keyframe available for the mesher at {}", timestamp_ns),
                }
            }
            VisualizationType::PointCloud => {
                input.points_with_id = backend_output.landmarks_in_time_horizon(0);
                if self.config.visualize_lmk_type {
                    input.lmk_types = backend_output.landmark_types(0);
                }
            }
            VisualizationType::PointCloudRepeated => {
                input.points_3d = backend_output.points_3d.clone();
            }
            VisualizationType::None => {}
        }

        if self.visualization_type.is_mesh() {
            if let Some(segment) = self.segmentation.as_mut() {
                let mesh_2d = if self.visualization_type.requires_mesher() {
                    &input.mesher_output.mesh_2d
                } else {
                    &input.mesh_2d
                };
                input.mesh_3d_colors = segment(left_image, mesh_2d, &input.mesher_output.mesh_3d);
            }
        }
        Ok(input)
    }

    /// One synchronous round-trip through the mesher.
    fn run_mesher(
        &self,
        timestamp_ns: Timestamp,
        points_with_id: &PointsWithIdMap,
        keyframe: &Arc<KeyframeView>,
        backend_output: &BackendOutput,
    ) -> PipelineResult<MesherOutput> {
        let input = MesherInput {
            timestamp_ns,
            points_with_id: points_with_id.clone(),
            keyframe: Arc::clone(keyframe),
            camera_pose: backend_output.left_camera_pose(),
            planes: Arc::clone(&self.planes),
            filter_obstacles: self.visualization_type == VisualizationType::Mesh2DTo3DSparse,
        };
        let queues = &self.shared.queues;
        queues.mesher_input.push_blocking(input).map_err(|e| self.closed_error(e))?;
        queues.mesher_output.pop_blocking().map_err(|e| self.closed_error(e))
    }

    fn dispatch_visualization(&mut self, input: VisualizerInput) -> PipelineResult<()> {
        let timestamp_ns = input.timestamp_ns;
        let queues = &self.shared.queues;
        let dropped = queues
            .visualizer_input
            .push_dropping_oldest(input)
            .map_err(|e| self.closed_error(e))?;
        if dropped > 0 {
            self.visualizer_inputs_dropped += dropped as u64;
            warn!(
                "Visualizer is lagging behind, dropped {} stale input(s) at {}",
                dropped, timestamp_ns
            );
        }
        let output = queues
            .visualizer_output
            .pop_nonblocking()
            .map_err(|e| self.closed_error(e))?;
        match output {
            Some(output) => self.display.spin_once(output),
            None => warn!("Visualizer is lagging behind, no output ready at {}", timestamp_ns),
        }
        Ok(())
    }

    /// A closed queue while running means a worker failed.
    fn closed_error(&self, closed: QueueClosed) -> PipelineError {
        match self.shared.failure() {
            Some(failure) => PipelineError::WorkerFailed {
                worker: failure.worker,
                reason: failure.reason,
            },
            None => PipelineError::QueueClosed(closed),
        }
    }

    /// Stop the workers, close every queue and flush the result files.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.state == PipelineState::ShuttingDown {
            return;
        }
        info!("Shutting down pipeline after {} keyframes", self.keyframes_processed);
        self.state = PipelineState::ShuttingDown;
        self.shared.request_shutdown();
        if let Some(mut workers) = self.workers.take() {
            workers.shutdown();
        }
        if let Some(mut logger) = self.logger.take() {
            if let Err(e) = logger.flush() {
                error!("Failed to flush results: {}", e);
            }
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    pub fn visualization_type(&self) -> VisualizationType {
        self.visualization_type
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn imu_buffer_len(&self) -> usize {
        self.imu_buffer.len()
    }

    /// Timestamp of the last keyframe (the bootstrap frame counts as one).
    pub fn timestamp_lkf(&self) -> Timestamp {
        self.timestamp_lkf
    }

    pub fn planes(&self) -> &Arc<PlaneRegistry> {
        &self.planes
    }

    pub fn keyframes_processed(&self) -> u64 {
        self.keyframes_processed
    }

    /// Visualizer payloads discarded because the visualizer lagged.
    pub fn visualizer_inputs_dropped(&self) -> u64 {
        self.visualizer_inputs_dropped
    }

    pub fn latest_backend_output(&self) -> Option<&Arc<BackendOutput>> {
        self.latest_backend_output.as_ref()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
