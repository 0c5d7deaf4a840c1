use std::fmt;

/// Result of a single processing attempt or a terminal dispatch, used as the
/// `outcome` label on event counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Retried,
    Failed,
    Dropped,
    InvalidPayload,
    DownstreamError,
}

impl Outcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retried => "retried",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
            Self::InvalidPayload => "invalid_payload",
            Self::DownstreamError => "downstream_error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
