use thiserror::Error;

use crate::event::ParseError;
use crate::outcome::Outcome;

/// Worker-wide error taxonomy. The dispatcher uses [`WorkerError::is_retryable`]
/// to decide between another attempt and a terminal failure; the worker never
/// acknowledges a message that ends in a terminal failure.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Malformed message. Terminal: the message is deleted without a retry
    /// since it will never become well-formed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Transient failure from a downstream collaborator.
    #[error("{service} unavailable: {message}")]
    Downstream {
        service: &'static str,
        message: String,
    },

    /// Downstream rejection that is unlikely to succeed on redelivery. Still
    /// retried like [`WorkerError::Downstream`], but surfaced distinctly so
    /// operators can tell the cases apart in logs.
    #[error("{service} rejected the request: {message}")]
    Permanent {
        service: &'static str,
        message: String,
    },

    /// Shutdown or deadline expiry. Not retried; the message is abandoned and
    /// redelivers after its visibility window.
    #[error("processing cancelled")]
    Cancelled,

    /// A bug. Treated like a downstream error for acknowledgement purposes.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Downstream { .. } | Self::Permanent { .. } | Self::Internal(_)
        )
    }

    /// Terminal outcome label for this error.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::InvalidPayload(_) => Outcome::InvalidPayload,
            Self::Downstream { .. } | Self::Permanent { .. } | Self::Internal(_) => {
                Outcome::DownstreamError
            }
            Self::Cancelled => Outcome::Failed,
        }
    }
}

impl From<ParseError> for WorkerError {
    fn from(err: ParseError) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}
