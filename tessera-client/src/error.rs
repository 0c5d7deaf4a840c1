use reqwest::StatusCode;
use thiserror::Error;

use tessera_core::WorkerError;

/// Classified downstream-call failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The per-call deadline expired before a response arrived.
    #[error("{service} call timed out")]
    Timeout { service: &'static str },

    /// Connection-level failure or a status that suggests a transient fault.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// The collaborator rejected the request; a redelivery with the same
    /// payload is unlikely to fare better.
    #[error("{service} rejected the request ({status}): {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },
}

impl ClientError {
    pub(crate) fn from_transport(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { service }
        } else {
            Self::Unavailable {
                service,
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn from_status(service: &'static str, status: StatusCode, body: String) -> Self {
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            Self::Unavailable {
                service,
                message: format!("status {status}: {body}"),
            }
        } else {
            Self::Rejected {
                service,
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl From<ClientError> for WorkerError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Timeout { service } => WorkerError::Downstream {
                service,
                message: "call timed out".into(),
            },
            ClientError::Unavailable { service, message } => {
                WorkerError::Downstream { service, message }
            }
            ClientError::Rejected {
                service,
                status,
                body,
            } => WorkerError::Permanent {
                service,
                message: format!("status {status}: {body}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_classify_as_unavailable() {
        let err = ClientError::from_status(
            "inventory",
            StatusCode::SERVICE_UNAVAILABLE,
            "overloaded".into(),
        );
        assert!(matches!(err, ClientError::Unavailable { .. }));

        let err =
            ClientError::from_status("inventory", StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(err, ClientError::Unavailable { .. }));
    }

    #[test]
    fn client_errors_classify_as_rejected() {
        let err = ClientError::from_status(
            "reservation",
            StatusCode::BAD_REQUEST,
            "unknown status".into(),
        );
        assert!(matches!(
            err,
            ClientError::Rejected {
                status: 400,
                ..
            }
        ));
    }

    #[test]
    fn rejections_map_to_permanent_worker_errors() {
        let err: WorkerError = ClientError::Rejected {
            service: "inventory",
            status: 400,
            body: "bad seat id".into(),
        }
        .into();
        assert!(matches!(err, WorkerError::Permanent { .. }));
        // Uniform retry model: permanent classifications still retry.
        assert!(err.is_retryable());
    }
}
