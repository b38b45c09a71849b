use nalgebra::Vector3;

use crate::types::Timestamp;

/// Gravity vector in world frame (m/s^2).
pub const GRAVITY: Vector3<f64> = Vector3::new(0.0, 0.0, -9.81);

/// IMU noise parameters (1-sigma, continuous time).
#[derive(Debug, Clone, Copy)]
pub struct ImuNoise {
    pub sigma_gyro: f64,
    pub sigma_accel: f64,
}

impl Default for ImuNoise {
    fn default() -> Self {
        Self {
            // Approximate EuRoC noise values
            sigma_gyro: 1.7e-4,
            sigma_accel: 2.0e-3,
        }
    }
}

/// IMU biases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuBias {
    pub gyro: Vector3<f64>,
    pub accel: Vector3<f64>,
}

impl ImuBias {
    pub fn zero() -> Self {
        Self {
            gyro: Vector3::zeros(),
            accel: Vector3::zeros(),
        }
    }
}

impl Default for ImuBias {
    fn default() -> Self {
        Self::zero()
    }
}

/// Single IMU measurement (body frame).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub timestamp_ns: Timestamp,
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
}

impl ImuSample {
    pub fn new(timestamp_ns: Timestamp, accel: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self {
            timestamp_ns,
            accel,
            gyro,
        }
    }

    /// Linearly interpolates between two samples at `timestamp_ns`.
    ///
    /// Used by frame synchronizers to insert the boundary samples at frame
    /// timestamps. `timestamp_ns` must lie within `[a, b]`.
    pub fn interpolate(a: &ImuSample, b: &ImuSample, timestamp_ns: Timestamp) -> ImuSample {
        let span = b.timestamp_ns.saturating_sub(a.timestamp_ns);
        if span == 0 {
            return ImuSample { timestamp_ns, ..*a };
        }
        let alpha = timestamp_ns.saturating_sub(a.timestamp_ns) as f64 / span as f64;
        ImuSample {
            timestamp_ns,
            accel: a.accel + (b.accel - a.accel) * alpha,
            gyro: a.gyro + (b.gyro - a.gyro) * alpha,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interpolate_midpoint() {
        let a = ImuSample::new(0, Vector3::new(0.0, 0.0, 9.0), Vector3::new(1.0, 0.0, 0.0));
        let b = ImuSample::new(10, Vector3::new(0.0, 0.0, 11.0), Vector3::new(3.0, 0.0, 0.0));

        let mid = ImuSample::interpolate(&a, &b, 5);
        assert_eq!(mid.timestamp_ns, 5);
        assert_relative_eq!(mid.accel.z, 10.0);
        assert_relative_eq!(mid.gyro.x, 2.0);
    }

    #[test]
    fn test_interpolate_degenerate_span() {
        let a = ImuSample::new(4, Vector3::zeros(), Vector3::new(1.0, 2.0, 3.0));
        let s = ImuSample::interpolate(&a, &a, 4);
        assert_eq!(s, a);
    }
}
