//! Long-poll client for a managed queue service speaking JSON over HTTP.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use tessera_core::ReceiptHandle;

use crate::{EventQueue, QueueError, ReceivedMessage};

/// Slack added on top of the server-side wait so a full long poll does not
/// race the client-side request timeout.
const REQUEST_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ReceiveRequest {
    max_messages: usize,
    wait_seconds: u64,
    visibility_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: String,
    body: String,
    receipt_handle: ReceiptHandle,
    #[serde(default)]
    receive_count: u32,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    receipt_handle: &'a ReceiptHandle,
}

/// Queue client bound to a single queue URL. Holds one connection pool for
/// the service lifetime and is safe to share across tasks.
#[derive(Debug, Clone)]
pub struct HttpQueue {
    http: reqwest::Client,
    queue_url: String,
}

impl HttpQueue {
    pub fn new(queue_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            queue_url: queue_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn transport_err(err: reqwest::Error) -> QueueError {
        QueueError::Transport(err.to_string())
    }
}

#[async_trait]
impl EventQueue for HttpQueue {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let request = ReceiveRequest {
            max_messages,
            wait_seconds: wait.as_secs(),
            visibility_timeout: visibility_timeout.as_secs(),
        };

        let response = self
            .http
            .post(format!("{}/receive", self.queue_url))
            .timeout(wait + REQUEST_GRACE)
            .json(&request)
            .send()
            .await
            .map_err(Self::transport_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let payload: ReceiveResponse = response.json().await.map_err(Self::transport_err)?;
        Ok(payload
            .messages
            .into_iter()
            .map(|message| ReceivedMessage {
                message_id: message.message_id,
                body: message.body,
                receipt_handle: message.receipt_handle,
                receive_count: message.receive_count,
                attributes: message.attributes,
            })
            .collect())
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let response = self
            .http
            .post(format!("{}/delete", self.queue_url))
            .timeout(REQUEST_GRACE)
            .json(&DeleteRequest {
                receipt_handle: receipt,
            })
            .send()
            .await
            .map_err(Self::transport_err)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(QueueError::ReceiptExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
