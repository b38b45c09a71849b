//! Reference stereo frontend.
//!
//! Detects bright peaks on a coarse grid of the left image, matches them
//! along the same row of the rectified right image and tracks them against
//! the last keyframe using the gyro rotation prior. Meant for synthetic
//! sequences and tests, not for real imagery.

use std::sync::Arc;

use anyhow::{bail, Result};
use nalgebra::{Point2, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use super::camera::{StereoCalibration, MIN_DISPARITY};
use super::frame::{Image, KeyframeView, StereoFrame, TrackedKeypoint};
use super::keyframe_decision::KeyFrameDecision;
use super::state::TrackingStatus;
use super::{Frontend, FrontendBootstrap, FrontendOutput, StereoMeasurement, StereoMeasurements};
use crate::mesher::{mesh_2d_from_points, Mesh2D, Mesh2DKind};
use crate::types::{ns_to_s, LandmarkId};

#[derive(Debug, Clone)]
pub struct IntervalFrontendConfig {
    pub calibration: StereoCalibration,
    /// Side of a detection cell (px). At most one keypoint per cell.
    pub cell_size: usize,
    /// Minimum intensity of a keypoint.
    pub min_intensity: u8,
    /// Upper bound of detected keypoints per frame.
    pub max_features: usize,
    /// Largest disparity searched in the right image (px).
    pub max_disparity: f64,
    /// Search radius around the predicted keypoint position (px).
    pub track_radius: f64,
    /// Below this many measurements tracking is reported as `FewMatches`.
    pub min_measurements: usize,
    pub keyframe_decision: KeyFrameDecision,
}

impl IntervalFrontendConfig {
    pub fn new(calibration: StereoCalibration) -> Self {
        Self {
            calibration,
            cell_size: 8,
            min_intensity: 128,
            max_features: 200,
            max_disparity: 64.0,
            track_radius: 8.0,
            min_measurements: 8,
            keyframe_decision: KeyFrameDecision::default(),
        }
    }
}

pub struct IntervalFrontend {
    config: IntervalFrontendConfig,
    decision: KeyFrameDecision,
    rng: Option<StdRng>,
    next_landmark_id: u64,
    last_keyframe: Option<Arc<KeyframeView>>,
}

impl IntervalFrontend {
    pub fn new(config: IntervalFrontendConfig) -> Self {
        Self {
            decision: config.keyframe_decision.clone(),
            config,
            rng: None,
            next_landmark_id: 0,
            last_keyframe: None,
        }
    }

    /// Grid peak detection on the left image.
    fn detect(&mut self, img: &Image) -> Vec<Point2<f64>> {
        let cell = self.config.cell_size.max(1);
        let mut peaks = Vec::new();
        for cy in (0..img.height).step_by(cell) {
            for cx in (0..img.width).step_by(cell) {
                let mut best: Option<(u8, usize, usize)> = None;
                for v in cy..(cy + cell).min(img.height) {
                    for u in cx..(cx + cell).min(img.width) {
                        let Some(val) = img.get(u, v) else {
                            continue;
                        };
                        if val >= self.config.min_intensity && best.map_or(true, |(b, _, _)| val > b) {
                            best = Some((val, u, v));
                        }
                    }
                }
                if let Some((_, u, v)) = best {
                    peaks.push(Point2::new(u as f64, v as f64));
                }
            }
        }

        if peaks.len() > self.config.max_features {
            match self.rng.as_mut() {
                Some(rng) => peaks.shuffle(rng),
                None => warn!("Frontend not bootstrapped, keeping the first detections"),
            }
            peaks.truncate(self.config.max_features);
        }
        peaks
    }

    /// Brightest column on the same row of the right image, within the disparity range.
    fn match_right(&self, right: &Image, left: &Point2<f64>) -> Option<f64> {
        let v = left.y as usize;
        let u_max = left.x - MIN_DISPARITY;
        let u_min = (left.x - self.config.max_disparity).max(0.0);
        if u_max < 0.0 || v >= right.height {
            return None;
        }
        let mut best: Option<(u8, usize)> = None;
        for u in (u_min.ceil() as usize)..=(u_max.floor() as usize) {
            let val = right.get(u, v)?;
            if val >= self.config.min_intensity && best.map_or(true, |(b, _)| val > b) {
                best = Some((val, u));
            }
        }
        best.map(|(_, u)| u as f64)
    }

    /// Where a keyframe keypoint should appear after `rotation` (keyframe → current camera).
    fn predict(&self, pixel: &Point2<f64>, rotation: &UnitQuaternion<f64>) -> Option<Point2<f64>> {
        let cal = &self.config.calibration;
        let ray = Vector3::new((pixel.x - cal.cx) / cal.fx, (pixel.y - cal.cy) / cal.fy, 1.0);
        let rotated = rotation.inverse() * ray;
        if rotated.z <= 0.0 {
            return None;
        }
        Some(Point2::new(
            cal.fx * rotated.x / rotated.z + cal.cx,
            cal.fy * rotated.y / rotated.z + cal.cy,
        ))
    }

    fn fresh_id(&mut self) -> LandmarkId {
        let id = LandmarkId(self.next_landmark_id);
        self.next_landmark_id += 1;
        id
    }

    fn make_keypoints(
        &mut self,
        frame: &StereoFrame,
        tracked: Vec<(LandmarkId, Point2<f64>)>,
        fresh: Vec<Point2<f64>>,
    ) -> Vec<TrackedKeypoint> {
        let mut keypoints = Vec::with_capacity(tracked.len() + fresh.len());
        for (landmark_id, pixel) in tracked {
            let right_valid = self.match_right(&frame.right, &pixel).is_some();
            keypoints.push(TrackedKeypoint { landmark_id, pixel, right_valid });
        }
        for pixel in fresh {
            let landmark_id = self.fresh_id();
            let right_valid = self.match_right(&frame.right, &pixel).is_some();
            keypoints.push(TrackedKeypoint { landmark_id, pixel, right_valid });
        }
        keypoints
    }

    fn measurements(&self, frame: &StereoFrame, keypoints: &[(LandmarkId, Point2<f64>)]) -> StereoMeasurements {
        keypoints
            .iter()
            .map(|(landmark_id, left)| StereoMeasurement {
                landmark_id: *landmark_id,
                left: *left,
                right_u: self.match_right(&frame.right, left),
            })
            .collect()
    }
}

impl Frontend for IntervalFrontend {
    fn process_first(&mut self, frame: &StereoFrame, seed: u64) -> Result<FrontendBootstrap> {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self.decision.reset();

        let detections = self.detect(&frame.left);
        let keypoints = self.make_keypoints(frame, Vec::new(), detections);
        debug!("Frontend bootstrapped on {} with {} keypoints", frame.id, keypoints.len());
        self.last_keyframe = Some(Arc::new(KeyframeView {
            frame: frame.clone(),
            keypoints,
        }));

        Ok(FrontendBootstrap {
            calibration: self.config.calibration,
        })
    }

    fn process(&mut self, frame: &StereoFrame, rotation_prior: &UnitQuaternion<f64>) -> Result<FrontendOutput> {
        let Some(reference) = self.last_keyframe.clone() else {
            bail!("frontend received {} before bootstrapping", frame.id);
        };
        if frame.timestamp_ns <= reference.timestamp_ns() {
            bail!(
                "frame {} at {} is not after the last keyframe at {}",
                frame.id,
                frame.timestamp_ns,
                reference.timestamp_ns()
            );
        }

        let mut detections = self.detect(&frame.left);
        let mut tracked: Vec<(LandmarkId, Point2<f64>)> = Vec::new();
        for kp in &reference.keypoints {
            let Some(predicted) = self.predict(&kp.pixel, rotation_prior) else {
                continue;
            };
            let nearest = detections
                .iter()
                .enumerate()
                .map(|(i, d)| (i, (d - predicted).norm()))
                .filter(|(_, dist)| *dist <= self.config.track_radius)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((i, _)) = nearest {
                tracked.push((kp.landmark_id, detections.swap_remove(i)));
            }
        }

        let dt = ns_to_s(frame.timestamp_ns as i128 - reference.timestamp_ns() as i128);
        let is_keyframe = self
            .decision
            .should_create_keyframe(tracked.len(), reference.keypoints.len(), dt);

        let mut measurements = self.measurements(frame, &tracked);
        if is_keyframe {
            let keypoints = self.make_keypoints(frame, tracked, detections);
            let fresh = &keypoints[measurements.len()..];
            measurements.extend(fresh.iter().map(|kp| StereoMeasurement {
                landmark_id: kp.landmark_id,
                left: kp.pixel,
                right_u: self.match_right(&frame.right, &kp.pixel),
            }));
            self.last_keyframe = Some(Arc::new(KeyframeView {
                frame: frame.clone(),
                keypoints,
            }));
        }

        let stereo = measurements.iter().filter(|m| m.right_u.is_some()).count();
        let status = if measurements.is_empty() {
            TrackingStatus::Invalid
        } else if stereo < self.config.min_measurements {
            TrackingStatus::FewMatches
        } else {
            TrackingStatus::Valid
        };

        Ok(FrontendOutput {
            status,
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
        let points: Vec<Point2<f64>> = kf
            .keypoints
            .iter()
            .filter(|kp| kind == Mesh2DKind::Dense || kp.right_valid)
            .map(|kp| kp.pixel)
            .collect();
        mesh_2d_from_points(&points)
    }
}
