//! Core ID types and aliases shared by every pipeline stage.

use nalgebra::Isometry3;

/// Timestamp in nanoseconds.
pub type Timestamp = u64;

/// Rigid-body pose (rotation + translation).
pub type Pose3 = Isometry3<f64>;

/// Converts a nanosecond timestamp difference into seconds.
#[inline]
pub fn ns_to_s(ns: i128) -> f64 {
    ns as f64 * 1e-9
}

/// Unique identifier of a frame in the input stream.
///
/// FrameIds are assigned by the frame source, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameId(pub u64);

impl FrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Unique identifier of a landmark tracked by the frontend and estimated by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LandmarkId(pub u64);

impl LandmarkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Unique identifier of a plane in the plane registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaneId(pub u64);

impl std::fmt::Display for PlaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}
