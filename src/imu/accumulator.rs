//! IMU interval accumulation between keyframes.
//!
//! The frame synchronizer delivers, with every frame, the IMU samples between
//! the previous and the current frame timestamps. Both ends of that interval
//! are interpolated at the frame timestamps. When two consecutive intervals
//! are concatenated, the upper bound of the first one and the lower bound of
//! the second one coincide, so the upper bound is dropped before appending.

use crate::error::{PipelineError, PipelineResult};
use crate::types::Timestamp;

use super::sample::ImuSample;

/// IMU samples accumulated since the last keyframe.
///
/// Timestamps are strictly increasing at all times.
#[derive(Debug, Default, Clone)]
pub struct ImuAccumulator {
    samples: Vec<ImuSample>,
}

impl ImuAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the IMU interval of a new frame into the buffer.
    ///
    /// On error the buffer is left untouched.
    pub fn merge(&mut self, new_samples: &[ImuSample]) -> PipelineResult<()> {
        if new_samples.is_empty() {
            return Err(PipelineError::Precheck(
                "frame carries no IMU samples".to_string(),
            ));
        }
        check_strictly_increasing(new_samples)?;

        if self.samples.is_empty() {
            self.samples.extend_from_slice(new_samples);
            return Ok(());
        }

        // Everything but the interpolated upper bound of the buffer.
        let kept = self.samples.len() - 1;
        if let Some(last_kept) = kept.checked_sub(1).map(|i| self.samples[i].timestamp_ns) {
            if new_samples[0].timestamp_ns <= last_kept {
                return Err(PipelineError::Precheck(format!(
                    "IMU interval starting at {} overlaps buffered samples up to {}",
                    new_samples[0].timestamp_ns, last_kept
                )));
            }
        }

        self.samples.truncate(kept);
        self.samples.extend_from_slice(new_samples);
        Ok(())
    }

    /// Empties the buffer. Called once per keyframe.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Moves the buffered interval out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<ImuSample> {
        std::mem::take(&mut self.samples)
    }

    pub fn samples(&self) -> &[ImuSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.samples.first().map(|s| s.timestamp_ns)
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.samples.last().map(|s| s.timestamp_ns)
    }
}

fn check_strictly_increasing(samples: &[ImuSample]) -> PipelineResult<()> {
    for pair in samples.windows(2) {
        if pair[1].timestamp_ns <= pair[0].timestamp_ns {
            return Err(PipelineError::Precheck(format!(
                "IMU timestamps not strictly increasing: {} followed by {}",
                pair[0].timestamp_ns, pair[1].timestamp_ns
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    /// Interval `[from, to]` sampled every `step`, both ends included.
    fn interval(from: u64, to: u64, step: u64) -> Vec<ImuSample> {
        let mut out: Vec<_> = (from..to)
            .step_by(step as usize)
            .map(|t| ImuSample::new(t, Vector3::new(0.0, 0.0, 9.81), Vector3::new(0.0, 0.0, t as f64)))
            .collect();
        out.push(ImuSample::new(to, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros()));
        out
    }

    fn stamps(acc: &ImuAccumulator) -> Vec<u64> {
        acc.samples().iter().map(|s| s.timestamp_ns).collect()
    }

    #[test]
    fn test_first_merge_copies_samples() {
        let mut acc = ImuAccumulator::new();
        acc.merge(&interval(0, 50, 10)).unwrap();
        assert_eq!(stamps(&acc), vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_merge_drops_interpolated_upper_bound() {
        let mut acc = ImuAccumulator::new();
        acc.merge(&interval(0, 50, 10)).unwrap();
        let before = acc.len();

        let next = interval(50, 100, 10);
        acc.merge(&next).unwrap();

        assert_eq!(acc.len(), before + next.len() - 1);
        assert_eq!(stamps(&acc), vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        // The sample at 50 is the lower bound of the new interval.
        assert_eq!(acc.samples()[5].gyro.z, 50.0);
    }

    #[test]
    fn test_merge_is_order_consistent() {
        let a = interval(0, 50, 10);
        let b = interval(50, 120, 10);
        let c = interval(120, 200, 20);

        let mut sequential = ImuAccumulator::new();
        sequential.merge(&a).unwrap();
        sequential.merge(&b).unwrap();
        sequential.merge(&c).unwrap();

        let mut ab = ImuAccumulator::new();
        ab.merge(&a).unwrap();
        ab.merge(&b).unwrap();
        let mut grouped = ImuAccumulator::new();
        grouped.merge(ab.samples()).unwrap();
        grouped.merge(&c).unwrap();

        assert_eq!(sequential.samples(), grouped.samples());
        assert!(stamps(&sequential).windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_interval_is_precheck_failure() {
        let mut acc = ImuAccumulator::new();
        assert!(matches!(acc.merge(&[]), Err(PipelineError::Precheck(_))));

        acc.merge(&interval(0, 20, 10)).unwrap();
        assert!(matches!(acc.merge(&[]), Err(PipelineError::Precheck(_))));
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn test_unordered_interval_is_rejected() {
        let mut acc = ImuAccumulator::new();
        let mut bad = interval(0, 30, 10);
        bad.swap(1, 2);
        assert!(matches!(acc.merge(&bad), Err(PipelineError::Precheck(_))));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_overlapping_interval_leaves_buffer_untouched() {
        let mut acc = ImuAccumulator::new();
        acc.merge(&interval(0, 50, 10)).unwrap();

        // Starts before the last real sample (40).
        let overlapping = interval(30, 80, 10);
        assert!(matches!(acc.merge(&overlapping), Err(PipelineError::Precheck(_))));
        assert_eq!(stamps(&acc), vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_reset_and_take() {
        let mut acc = ImuAccumulator::new();
        acc.merge(&interval(0, 20, 10)).unwrap();
        assert_eq!(acc.first_timestamp(), Some(0));
        assert_eq!(acc.last_timestamp(), Some(20));

        let taken = acc.take();
        assert_eq!(taken.len(), 3);
        assert!(acc.is_empty());

        acc.merge(&interval(20, 40, 10)).unwrap();
        acc.reset();
        assert!(acc.is_empty());
        assert_eq!(acc.last_timestamp(), None);
    }
}
