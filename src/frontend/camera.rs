//! Rectified stereo camera model.

use nalgebra::{Point2, Point3, Vector3};

use crate::types::Pose3;

/// Minimum disparity (px) for a stereo match to be back-projected.
pub const MIN_DISPARITY: f64 = 0.5;

/// Pinhole model of the rectified left camera plus stereo baseline and
/// body→left-camera extrinsics.
#[derive(Debug, Clone, Copy)]
pub struct StereoCalibration {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Baseline in meters.
    pub baseline: f64,
    /// Pose of the left camera in the body (IMU) frame.
    pub body_pose_cam: Pose3,
}

impl StereoCalibration {
    /// Back-project a left pixel with its right-image column into the camera frame.
    pub fn backproject(&self, left: &Point2<f64>, right_u: f64) -> Option<Vector3<f64>> {
        let disparity = left.x - right_u;
        if disparity < MIN_DISPARITY {
            return None;
        }
        let z = self.fx * self.baseline / disparity;
        let x = (left.x - self.cx) * z / self.fx;
        let y = (left.y - self.cy) * z / self.fy;
        Some(Vector3::new(x, y, z))
    }

    /// Project a camera-frame point into the left image.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Point2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }

    /// Column of a camera-frame point in the right image.
    pub fn project_right_u(&self, p: &Point3<f64>) -> Option<f64> {
        if p.z <= 0.0 {
            return None;
        }
        Some(self.fx * (p.x - self.baseline) / p.z + self.cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calib() -> StereoCalibration {
        StereoCalibration {
            fx: 400.0,
            fy: 400.0,
            cx: 80.0,
            cy: 60.0,
            baseline: 0.1,
            body_pose_cam: Pose3::identity(),
        }
    }

    #[test]
    fn test_project_backproject_consistency() {
        let cam = calib();
        let p = Point3::new(0.3, -0.2, 4.0);
        let left = cam.project(&p).unwrap();
        let right_u = cam.project_right_u(&p).unwrap();

        let back = cam.backproject(&left, right_u).unwrap();
        assert_relative_eq!(back, p.coords, epsilon = 1e-9);
    }

    #[test]
    fn test_backproject_rejects_small_disparity() {
        let cam = calib();
        assert!(cam.backproject(&Point2::new(50.0, 50.0), 49.8).is_none());
        assert!(cam.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }
}
