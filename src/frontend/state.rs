//! Tracking status reported by the frontend for every frame.

/// Outcome of stereo tracking / geometric verification for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingStatus {
    /// Enough inliers, pose prior is reliable.
    Valid,
    /// Not enough disparity to estimate the translation.
    LowDisparity,
    /// Too few matched features.
    FewMatches,
    /// Geometric verification failed.
    Invalid,
    /// Tracking has not run for this frame.
    #[default]
    Disabled,
}

impl TrackingStatus {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::LowDisparity => "LOW_DISPARITY",
            Self::FewMatches => "FEW_MATCHES",
            Self::Invalid => "INVALID",
            Self::Disabled => "DISABLED",
        }
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
