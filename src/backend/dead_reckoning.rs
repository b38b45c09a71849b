//! Reference backend: IMU dead reckoning plus stereo landmark triangulation.
//!
//! No smoothing happens here. The body state is propagated through the IMU
//! interval of every keyframe, and stereo measurements are anchored in the
//! world at the propagated pose. Landmarks leave the time horizon once they
//! have not been observed for `horizon_s` seconds.

use anyhow::{bail, Result};
use nalgebra::{Matrix6, Point3, Translation3, Vector6};
use tracing::{debug, info};

use super::{
    gravity_aligned_rotation, Backend, BackendFactory, BackendInitialization, BackendKind, Factor, Landmark,
    LandmarkMap, LandmarkType, NavState,
};
use crate::frontend::{StereoCalibration, TrackingStatus};
use crate::imu::{GyroPreintegrator, ImuNoise, Preintegrator};
use crate::planes::{Plane, PlaneRegistry};
use crate::system::messages::{BackendInput, BackendOutput};
use crate::types::{ns_to_s, LandmarkId, Pose3, Timestamp};

#[derive(Debug, Clone, Copy)]
pub struct DeadReckoningConfig {
    /// Landmarks unseen for longer than this (s) are dropped.
    pub horizon_s: f64,
    pub noise: ImuNoise,
    /// Initial pose standard deviation (rad for rotation, m for translation).
    pub initial_pose_sigma: f64,
}

impl Default for DeadReckoningConfig {
    fn default() -> Self {
        Self {
            horizon_s: 6.0,
            noise: ImuNoise::default(),
            initial_pose_sigma: 1e-3,
        }
    }
}

pub struct DeadReckoningBackend {
    config: DeadReckoningConfig,
    kind: BackendKind,
    calibration: StereoCalibration,
    state: NavState,
    initial_state: NavState,
    covariance: Matrix6<f64>,
    landmarks: LandmarkMap,
    last_timestamp_ns: Timestamp,
    next_keyframe_index: u64,
}

impl DeadReckoningBackend {
    pub fn new(config: DeadReckoningConfig, init: &BackendInitialization) -> Self {
        let initial_state = init.initial_state.unwrap_or_else(|| {
            let rotation = gravity_aligned_rotation(&init.imu);
            NavState::at_rest(Pose3::from_parts(Translation3::identity(), rotation))
        });
        info!(
            "{} backend initialized at {} (t = {:?})",
            init.kind,
            init.timestamp_ns,
            initial_state.pose.translation.vector.as_slice()
        );
        Self {
            kind: init.kind,
            calibration: init.calibration,
            state: initial_state,
            initial_state,
            covariance: Matrix6::identity() * config.initial_pose_sigma.powi(2),
            landmarks: LandmarkMap::new(),
            last_timestamp_ns: init.timestamp_ns,
            next_keyframe_index: 1,
            config,
        }
    }

    pub fn landmarks(&self) -> &LandmarkMap {
        &self.landmarks
    }

    fn propagate(&mut self, input: &BackendInput, dt: f64) {
        if input.imu.len() < 2 {
            if let Some(rel) = input.relative_pose_body_stereo {
                self.state.pose *= rel;
            }
            return;
        }
        let mut preintegrator = Preintegrator::new(self.state.bias, self.config.noise);
        preintegrator.integrate_interval(&input.imu);
        let (rot, pos, vel) = preintegrator.propagate(
            self.state.pose.rotation,
            self.state.pose.translation.vector,
            self.state.velocity,
        );
        self.state.pose = Pose3::from_parts(pos.into(), rot);
        self.state.velocity = vel;

        let g = self.config.noise.sigma_gyro.powi(2) * dt;
        let a = self.config.noise.sigma_accel.powi(2) * dt * dt;
        self.covariance += Matrix6::from_diagonal(&Vector6::new(g, g, g, a, a, a));
    }

    fn landmark_type(&self, id: LandmarkId, planes: &PlaneRegistry) -> LandmarkType {
        match self.kind {
            BackendKind::Normal => LandmarkType::Smart,
            BackendKind::Regular(m) => {
                if m.uses_regularities() && planes.iter().any(|p| p.landmarks.contains(&id)) {
                    LandmarkType::Plane
                } else {
                    m.landmark_type()
                }
            }
        }
    }

    /// Re-fit the distance of every plane that has landmarks in the map.
    fn refine_planes(&self, planes: &PlaneRegistry) -> Option<Vec<Plane>> {
        let BackendKind::Regular(m) = self.kind else {
            return None;
        };
        if !m.uses_regularities() || planes.is_empty() {
            return None;
        }
        let refined: Vec<Plane> = planes
            .iter()
            .filter_map(|plane| {
                let points: Vec<&Point3<f64>> = plane
                    .landmarks
                    .iter()
                    .filter_map(|id| self.landmarks.get(id).map(|l| &l.position))
                    .collect();
                if points.is_empty() {
                    return None;
                }
                let distance = points.iter().map(|p| plane.normal.dot(&p.coords)).sum::<f64>() / points.len() as f64;
                Some(Plane {
                    distance,
                    ..plane.clone()
                })
            })
            .collect();
        (!refined.is_empty()).then_some(refined)
    }
}

impl Backend for DeadReckoningBackend {
    fn gyro_preintegrator(&self) -> GyroPreintegrator {
        GyroPreintegrator::new(self.state.bias.gyro, self.calibration.body_pose_cam.rotation)
    }

    fn initial_state(&self) -> NavState {
        self.initial_state
    }

    fn spin_once(&mut self, input: BackendInput) -> Result<BackendOutput> {
        if input.timestamp_kf_ns <= self.last_timestamp_ns {
            bail!(
                "keyframe {} at {} does not follow the previous keyframe at {}",
                input.frame_id,
                input.timestamp_kf_ns,
                self.last_timestamp_ns
            );
        }
        let dt = ns_to_s(input.timestamp_kf_ns as i128 - self.last_timestamp_ns as i128);
        let keyframe_index = self.next_keyframe_index;
        self.next_keyframe_index += 1;
        self.last_timestamp_ns = input.timestamp_kf_ns;

        self.propagate(&input, dt);

        let mut factors = vec![Factor::Imu {
            from_kf: keyframe_index - 1,
            to_kf: keyframe_index,
        }];
        let mut points_3d = Vec::new();

        if input.tracking_status == TrackingStatus::Invalid {
            debug!("Skipping measurements of {} ({})", input.frame_id, input.tracking_status);
        } else {
            let world_pose_cam = self.state.pose * self.calibration.body_pose_cam;
            for m in &input.measurements {
                let observed = m
                    .right_u
                    .and_then(|right_u| self.calibration.backproject(&m.left, right_u))
                    .map(|p_cam| world_pose_cam * Point3::from(p_cam));

                let kind = self.landmark_type(m.landmark_id, &input.planes);
                let (position, kind) = match self.landmarks.get_mut(&m.landmark_id) {
                    Some(lmk) => {
                        if let Some(p) = observed {
                            let n = lmk.num_observations as f64;
                            lmk.position = Point3::from((lmk.position.coords * n + p.coords) / (n + 1.0));
                        }
                        lmk.num_observations += 1;
                        lmk.last_seen_ns = input.timestamp_kf_ns;
                        (lmk.position, lmk.kind)
                    }
                    None => {
                        // Monocular observation of an unknown landmark.
                        let Some(p) = observed else {
                            continue;
                        };
                        self.landmarks.insert(
                            m.landmark_id,
                            Landmark {
                                position: p,
                                num_observations: 1,
                                kind,
                                last_seen_ns: input.timestamp_kf_ns,
                            },
                        );
                        (p, kind)
                    }
                };
                points_3d.push(position);

                match kind {
                    LandmarkType::Smart => factors.push(Factor::SmartStereo { landmark: m.landmark_id }),
                    LandmarkType::Projection => factors.push(Factor::Projection {
                        landmark: m.landmark_id,
                        kf: keyframe_index,
                    }),
                    LandmarkType::Plane => {
                        factors.push(Factor::Projection {
                            landmark: m.landmark_id,
                            kf: keyframe_index,
                        });
                        factors.extend(
                            input
                                .planes
                                .iter()
                                .filter(|p| p.landmarks.contains(&m.landmark_id))
                                .map(|p| Factor::PointPlane {
                                    landmark: m.landmark_id,
                                    plane: p.id,
                                }),
                        );
                    }
                }
            }
        }

        let horizon_ns = (self.config.horizon_s * 1e9) as u64;
        let oldest = input.timestamp_kf_ns.saturating_sub(horizon_ns);
        let before = self.landmarks.len();
        self.landmarks.retain(|_, lmk| lmk.last_seen_ns >= oldest);
        debug!(
            "Backend kf {}: {} landmarks ({} marginalized), {} factors",
            keyframe_index,
            self.landmarks.len(),
            before - self.landmarks.len(),
            factors.len()
        );

        Ok(BackendOutput {
            timestamp_kf_ns: input.timestamp_kf_ns,
            keyframe_index,
            state: self.state,
            covariance: self.covariance,
            landmarks: self.landmarks.clone(),
            points_3d,
            factors,
            body_pose_left_cam: self.calibration.body_pose_cam,
            updated_planes: self.refine_planes(&input.planes),
        })
    }
}

/// Builds [`DeadReckoningBackend`]s for either backend variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadReckoningFactory {
    pub config: DeadReckoningConfig,
}

impl BackendFactory for DeadReckoningFactory {
    fn build(&self, init: &BackendInitialization) -> Result<Box<dyn Backend>> {
        Ok(Box::new(DeadReckoningBackend::new(self.config, init)))
    }
}
