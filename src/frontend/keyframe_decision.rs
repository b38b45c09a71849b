//! Keyframe decision criteria for the reference frontend.

/// Criteria for deciding whether the current frame becomes a keyframe.
///
/// - Maximum number of frames since the last keyframe
/// - Maximum time since the last keyframe
/// - Ratio of tracked features with respect to the last keyframe
#[derive(Debug, Clone)]
pub struct KeyFrameDecision {
    /// Minimum frames between keyframes.
    min_frames: usize,
    /// Maximum frames between keyframes.
    max_frames: usize,
    /// Maximum time (seconds) between keyframes.
    max_interval_s: f64,
    /// Below this ratio of tracked features a new keyframe is created.
    min_tracked_ratio: f64,
    /// Frame counter since last keyframe.
    frames_since_kf: usize,
}

impl KeyFrameDecision {
    pub fn new(min_frames: usize, max_frames: usize, max_interval_s: f64, min_tracked_ratio: f64) -> Self {
        Self {
            min_frames,
            max_frames: max_frames.max(1),
            max_interval_s,
            min_tracked_ratio,
            frames_since_kf: 0,
        }
    }

    /// Decide whether the current frame is a keyframe.
    ///
    /// # Arguments
    /// * `tracked` - Number of features tracked in the current frame
    /// * `reference` - Number of features in the last keyframe
    /// * `time_since_last_kf` - Seconds elapsed since the last keyframe
    pub fn should_create_keyframe(&mut self, tracked: usize, reference: usize, time_since_last_kf: f64) -> bool {
        self.frames_since_kf += 1;

        // Don't create KF too soon
        if self.frames_since_kf < self.min_frames {
            return false;
        }

        if self.frames_since_kf >= self.max_frames || time_since_last_kf >= self.max_interval_s {
            self.frames_since_kf = 0;
            return true;
        }

        // Create KF if tracking quality dropped
        if reference > 0 {
            let ratio = tracked as f64 / reference as f64;
            if ratio < self.min_tracked_ratio {
                self.frames_since_kf = 0;
                return true;
            }
        }

        false
    }

    /// Reset after keyframe creation outside of `should_create_keyframe`.
    pub fn reset(&mut self) {
        self.frames_since_kf = 0;
    }
}

impl Default for KeyFrameDecision {
    fn default() -> Self {
        Self::new(0, 5, 0.5, 0.7)
    }
}
