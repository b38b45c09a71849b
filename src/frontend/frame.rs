//! Frame-level data: grayscale images, stereo frames and synchronized packets.

use std::sync::Arc;

use nalgebra::Point2;

use crate::error::{PipelineError, PipelineResult};
use crate::imu::ImuSample;
use crate::types::{FrameId, LandmarkId, Timestamp};

/// 8-bit grayscale image. Pixel data is shared, so clones are cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub data: Arc<[u8]>,
}

impl Image {
    /// Row-major image from `data`, which must hold `width * height` pixels.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> PipelineResult<Self> {
        if data.len() != width * height {
            return Err(PipelineError::Precheck(format!(
                "{}x{} image needs {} pixels, got {}",
                width,
                height,
                width * height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
        })
    }

    pub fn black(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height].into(),
        }
    }

    /// Intensity at (u, v), or `None` outside the image or its pixel buffer.
    #[inline]
    pub fn get(&self, u: usize, v: usize) -> Option<u8> {
        if u >= self.width || v >= self.height {
            return None;
        }
        self.data.get(v * self.width + u).copied()
    }

    /// Copy the pixels into a mutable buffer (for drawing).
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

/// A rectified stereo image pair.
#[derive(Debug, Clone)]
pub struct StereoFrame {
    pub id: FrameId,
    pub timestamp_ns: Timestamp,
    pub left: Image,
    pub right: Image,
}

/// One frame plus the IMU samples between the previous frame and this one.
///
/// Both ends of `imu` are interpolated at the previous and the current frame
/// timestamps by the synchronizer that produces the packet.
#[derive(Debug, Clone)]
pub struct StereoImuSyncPacket {
    pub stereo_frame: StereoFrame,
    pub imu: Vec<ImuSample>,
}

impl StereoImuSyncPacket {
    pub fn new(stereo_frame: StereoFrame, imu: Vec<ImuSample>) -> Self {
        Self { stereo_frame, imu }
    }

    pub fn frame_id(&self) -> FrameId {
        self.stereo_frame.id
    }

    pub fn timestamp_ns(&self) -> Timestamp {
        self.stereo_frame.timestamp_ns
    }
}

/// A keypoint tracked in the left image of a keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedKeypoint {
    pub landmark_id: LandmarkId,
    pub pixel: Point2<f64>,
    /// Whether a valid stereo match exists in the right image.
    pub right_valid: bool,
}

/// Read-only snapshot of the last keyframe as seen by the frontend.
#[derive(Debug, Clone)]
pub struct KeyframeView {
    pub frame: StereoFrame,
    pub keypoints: Vec<TrackedKeypoint>,
}

impl KeyframeView {
    pub fn timestamp_ns(&self) -> Timestamp {
        self.frame.timestamp_ns
    }

    pub fn right_valid_keypoints(&self) -> impl Iterator<Item = &TrackedKeypoint> {
        self.keypoints.iter().filter(|k| k.right_valid)
    }
}
