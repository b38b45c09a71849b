use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use super::sample::{ImuBias, ImuNoise, ImuSample, GRAVITY};

/// Preintegrated motion between two keyframes.
#[derive(Debug, Clone, Copy)]
pub struct PreintegratedState {
    pub delta_rot: UnitQuaternion<f64>,
    pub delta_vel: Vector3<f64>,
    pub delta_pos: Vector3<f64>,
    pub dt: f64,
}

impl PreintegratedState {
    pub fn identity() -> Self {
        Self {
            delta_rot: UnitQuaternion::identity(),
            delta_vel: Vector3::zeros(),
            delta_pos: Vector3::zeros(),
            dt: 0.0,
        }
    }
}

/// IMU preintegrator: integrates high-rate IMU into a relative motion prior.
pub struct Preintegrator {
    pub bias: ImuBias,
    pub noise: ImuNoise,
    pub state: PreintegratedState,
}

impl Preintegrator {
    pub fn new(bias: ImuBias, noise: ImuNoise) -> Self {
        Self {
            bias,
            noise,
            state: PreintegratedState::identity(),
        }
    }

    pub fn reset(&mut self) {
        self.state = PreintegratedState::identity();
    }

    /// Integrate every consecutive pair of an ordered sample interval.
    pub fn integrate_interval(&mut self, samples: &[ImuSample]) {
        for pair in samples.windows(2) {
            self.integrate(pair[0], pair[1]);
        }
    }

    /// Integrate a single time step using midpoint integration.
    pub fn integrate(&mut self, prev: ImuSample, curr: ImuSample) {
        let Some(dt) = step_seconds(&prev, &curr) else {
            return;
        };

        let gyro_prev = prev.gyro - self.bias.gyro;
        let gyro_curr = curr.gyro - self.bias.gyro;
        let omega = 0.5 * (gyro_prev + gyro_curr);

        // Update rotation
        let delta_q = UnitQuaternion::from_scaled_axis(omega * dt);
        self.state.delta_rot *= delta_q;

        // Rotate acceleration into the start frame (approx using updated rotation)
        let accel_prev = prev.accel - self.bias.accel;
        let accel_curr = curr.accel - self.bias.accel;
        let accel_body = 0.5 * (accel_prev + accel_curr);
        let accel_start = self.state.delta_rot * accel_body;

        self.state.delta_pos += self.state.delta_vel * dt + 0.5 * accel_start * dt * dt;
        self.state.delta_vel += accel_start * dt;
        self.state.dt += dt;
    }

    /// Predict rotation/position/velocity (world frame) from a previous state.
    pub fn propagate(
        &self,
        prev_rot: UnitQuaternion<f64>,
        prev_pos: Vector3<f64>,
        prev_vel: Vector3<f64>,
    ) -> (UnitQuaternion<f64>, Vector3<f64>, Vector3<f64>) {
        let dt = self.state.dt;
        let rot = prev_rot * self.state.delta_rot;
        let vel = prev_vel + GRAVITY * dt + prev_rot * self.state.delta_vel;
        let pos = prev_pos + prev_vel * dt + 0.5 * GRAVITY * dt * dt + prev_rot * self.state.delta_pos;
        (rot, pos, vel)
    }

    /// Convenience: build rotation matrix of current delta.
    pub fn delta_rotation_matrix(&self) -> Matrix3<f64> {
        self.state.delta_rot.to_rotation_matrix().into_inner()
    }
}

/// Stateless gyro preintegration used as the frontend's rotation prior.
///
/// Integrates only the gyroscope between the last keyframe and the current
/// frame and expresses the result in the left camera frame:
/// `R_cam = R_bc^T * R_body * R_bc`.
#[derive(Debug, Clone, Copy)]
pub struct GyroPreintegrator {
    gyro_bias: Vector3<f64>,
    body_rot_cam: UnitQuaternion<f64>,
}

impl GyroPreintegrator {
    pub fn new(gyro_bias: Vector3<f64>, body_rot_cam: UnitQuaternion<f64>) -> Self {
        Self {
            gyro_bias,
            body_rot_cam,
        }
    }

    /// Relative camera rotation from the first to the last sample of `samples`.
    pub fn preintegrate(&self, samples: &[ImuSample]) -> UnitQuaternion<f64> {
        let mut body_rot = UnitQuaternion::identity();
        for pair in samples.windows(2) {
            let Some(dt) = step_seconds(&pair[0], &pair[1]) else {
                continue;
            };
            let omega = 0.5 * (pair[0].gyro + pair[1].gyro) - self.gyro_bias;
            body_rot *= UnitQuaternion::from_scaled_axis(omega * dt);
        }
        self.body_rot_cam.inverse() * body_rot * self.body_rot_cam
    }
}

fn step_seconds(prev: &ImuSample, curr: &ImuSample) -> Option<f64> {
    if curr.timestamp_ns <= prev.timestamp_ns {
        return None;
    }
    Some((curr.timestamp_ns - prev.timestamp_ns) as f64 * 1e-9)
}
