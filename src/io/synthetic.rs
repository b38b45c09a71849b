//! Synthetic stereo + IMU sequence.
//!
//! A stereo rig yaws at a constant rate in the middle of a cylinder of static
//! points. Every point is rendered as a single bright pixel into both
//! rectified images. The IMU runs on its own clock, offset from the camera,
//! so the first and last sample of every packet are interpolated at the frame
//! timestamps, like a real synchronizer does.

use nalgebra::{Point2, Point3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frontend::{Image, StereoCalibration, StereoFrame, StereoImuSyncPacket};
use crate::imu::{ImuSample, GRAVITY};
use crate::types::{FrameId, Pose3, Timestamp};

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub width: usize,
    pub height: usize,
    pub calibration: StereoCalibration,
    pub num_points: usize,
    /// Radius range of the point cylinder (m).
    pub min_radius: f64,
    pub max_radius: f64,
    /// Half height of the point cylinder (m).
    pub half_height: f64,
    /// Yaw rate of the rig (rad/s).
    pub yaw_rate: f64,
    pub camera_period_ns: Timestamp,
    pub imu_period_ns: Timestamp,
    /// Offset of the IMU clock with respect to the camera clock.
    pub imu_offset_ns: Timestamp,
    pub start_ns: Timestamp,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            calibration: StereoCalibration {
                fx: 100.0,
                fy: 100.0,
                cx: 80.0,
                cy: 60.0,
                baseline: 0.2,
                body_pose_cam: Pose3::identity(),
            },
            num_points: 300,
            min_radius: 3.0,
            max_radius: 6.0,
            half_height: 1.0,
            yaw_rate: 0.2,
            camera_period_ns: 50_000_000,
            imu_period_ns: 5_000_000,
            imu_offset_ns: 2_500_000,
            start_ns: 1_000_000_000,
            seed: 42,
        }
    }
}

/// Iterator over synchronized stereo/IMU packets.
pub struct SyntheticSequence {
    config: SyntheticConfig,
    /// Points in the frame of the first camera (x right, y down, z forward).
    points: Vec<Point3<f64>>,
    next_frame: u64,
}

impl SyntheticSequence {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let points = (0..config.num_points)
            .map(|_| {
                let azimuth = rng.gen_range(0.0..std::f64::consts::TAU);
                let radius = rng.gen_range(config.min_radius..config.max_radius);
                let height = rng.gen_range(-config.half_height..config.half_height);
                Point3::new(radius * azimuth.sin(), height, radius * azimuth.cos())
            })
            .collect();
        Self {
            config,
            points,
            next_frame: 0,
        }
    }

    pub fn calibration(&self) -> StereoCalibration {
        self.config.calibration
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    fn frame_timestamp(&self, index: u64) -> Timestamp {
        self.config.start_ns + index * self.config.camera_period_ns
    }

    /// Angular velocity of the rig in its own frame. Yaw is about "up", i.e. -y.
    fn angular_velocity(&self) -> Vector3<f64> {
        Vector3::new(0.0, -self.config.yaw_rate, 0.0)
    }

    /// Orientation of the camera at `t` relative to the first camera.
    pub fn rotation_at(&self, timestamp_ns: Timestamp) -> UnitQuaternion<f64> {
        let elapsed = (timestamp_ns as f64 - self.config.start_ns as f64) * 1e-9;
        UnitQuaternion::from_scaled_axis(self.angular_velocity() * elapsed)
    }

    fn imu_sample(&self, timestamp_ns: Timestamp) -> ImuSample {
        // The rig only yaws, so the specific force stays constant in the body frame.
        let up_in_body = Vector3::new(0.0, -1.0, 0.0);
        ImuSample::new(timestamp_ns, up_in_body * GRAVITY.norm(), self.angular_velocity())
    }

    /// IMU samples covering `[from_ns, to_ns]`, both ends interpolated.
    fn imu_between(&self, from_ns: Timestamp, to_ns: Timestamp) -> Vec<ImuSample> {
        let period = self.config.imu_period_ns.max(1);
        let offset = self.config.imu_offset_ns % period;
        // Last IMU tick at or before `from_ns`.
        let first_tick = ((from_ns.saturating_sub(offset)) / period) * period + offset;

        let mut raw = Vec::new();
        let mut t = first_tick;
        while t <= to_ns + period {
            raw.push(self.imu_sample(t));
            t += period;
        }

        let mut samples = Vec::with_capacity(raw.len());
        samples.push(interpolate_at(&raw, from_ns));
        samples.extend(raw.iter().filter(|s| s.timestamp_ns > from_ns && s.timestamp_ns < to_ns));
        samples.push(interpolate_at(&raw, to_ns));
        samples
    }

    fn render(&self, rotation: &UnitQuaternion<f64>) -> (Image, Image) {
        let (w, h) = (self.config.width, self.config.height);
        let cal = &self.config.calibration;
        let mut left = vec![0u8; w * h];
        let mut right = vec![0u8; w * h];
        let world_to_cam = rotation.inverse();

        for p in &self.points {
            let p_cam = world_to_cam * *p;
            let (Some(l), Some(r_u)) = (cal.project(&p_cam), cal.project_right_u(&p_cam)) else {
                continue;
            };
            if let Some(idx) = pixel_index(&l, w, h) {
                left[idx] = 255;
            }
            if let Some(idx) = pixel_index(&Point2::new(r_u, l.y), w, h) {
                right[idx] = 255;
            }
        }
        let image = |data: Vec<u8>| Image {
            width: w,
            height: h,
            data: data.into(),
        };
        (image(left), image(right))
    }
}

impl Iterator for SyntheticSequence {
    type Item = StereoImuSyncPacket;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next_frame;
        self.next_frame += 1;

        let timestamp_ns = self.frame_timestamp(index);
        let prev_ns = timestamp_ns.checked_sub(self.config.camera_period_ns)?;
        let (left, right) = self.render(&self.rotation_at(timestamp_ns));
        let frame = StereoFrame {
            id: FrameId(index),
            timestamp_ns,
            left,
            right,
        };
        Some(StereoImuSyncPacket::new(frame, self.imu_between(prev_ns, timestamp_ns)))
    }
}

fn interpolate_at(raw: &[ImuSample], timestamp_ns: Timestamp) -> ImuSample {
    let after = raw.iter().position(|s| s.timestamp_ns >= timestamp_ns).unwrap_or(raw.len() - 1);
    let before = after.saturating_sub(1);
    ImuSample::interpolate(&raw[before], &raw[after], timestamp_ns)
}

fn pixel_index(p: &Point2<f64>, width: usize, height: usize) -> Option<usize> {
    let (u, v) = (p.x.round(), p.y.round());
    if u < 0.0 || v < 0.0 || u >= width as f64 || v >= height as f64 {
        return None;
    }
    Some(v as usize * width + u as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::imu::{GyroPreintegrator, ImuAccumulator};

    #[test]
    fn test_packets_are_synchronized() {
        let mut seq = SyntheticSequence::new(SyntheticConfig::default());
        let first = seq.next().unwrap();
        let second = seq.next().unwrap();

        assert_eq!(first.frame_id(), FrameId(0));
        assert_eq!(second.timestamp_ns() - first.timestamp_ns(), 50_000_000);
        assert_eq!(second.imu.first().unwrap().timestamp_ns, first.timestamp_ns());
        assert_eq!(second.imu.last().unwrap().timestamp_ns, second.timestamp_ns());
        // 10 IMU ticks per frame, none on a frame timestamp.
        assert_eq!(second.imu.len(), 12);
        assert!(second.imu.windows(2).all(|w| w[0].timestamp_ns < w[1].timestamp_ns));
    }

    #[test]
    fn test_packets_merge_into_accumulator() {
        let mut seq = SyntheticSequence::new(SyntheticConfig::default());
        let _bootstrap = seq.next().unwrap();
        let mut acc = ImuAccumulator::new();
        for packet in seq.by_ref().take(3) {
            acc.merge(&packet.imu).unwrap();
        }
        // Every merge after the first drops the boundary sample.
        assert_eq!(acc.len(), 12 + 11 + 11);
    }

    #[test]
    fn test_gyro_matches_rig_rotation() {
        let config = SyntheticConfig::default();
        let mut seq = SyntheticSequence::new(config.clone());
        let first = seq.next().unwrap();
        let second = seq.next().unwrap();

        let gyro = GyroPreintegrator::new(Vector3::zeros(), UnitQuaternion::identity());
        let measured = gyro.preintegrate(&second.imu);
        let expected = seq.rotation_at(first.timestamp_ns()).inverse() * seq.rotation_at(second.timestamp_ns());
        assert_relative_eq!(measured.angle_to(&expected), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_points_are_visible_in_both_images() {
        let mut seq = SyntheticSequence::new(SyntheticConfig::default());
        let packet = seq.next().unwrap();
        let lit = |img: &Image| img.data.iter().filter(|&&px| px > 0).count();
        assert!(lit(&packet.stereo_frame.left) > 20);
        assert!(lit(&packet.stereo_frame.right) > 20);
    }
}
