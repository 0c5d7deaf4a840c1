//! Client for the inventory service. The service is co-located and
//! latency-sensitive, so every call carries a tight 250 ms deadline.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ClientError;

const SERVICE: &str = "inventory";
const CALL_DEADLINE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseHold {
    pub event_id: String,
    pub reservation_id: String,
    pub quantity: u32,
    pub seat_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReservation {
    pub event_id: String,
    pub reservation_id: String,
    pub quantity: u32,
    pub seat_ids: Vec<String>,
    pub payment_intent_id: String,
}

/// Seat-hold operations on the inventory service.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// Returns held seats to the available pool.
    async fn release_hold(&self, request: ReleaseHold) -> Result<(), ClientError>;

    /// Marks held seats as sold.
    async fn commit_reservation(&self, request: CommitReservation) -> Result<(), ClientError>;
}

/// Long-lived inventory client. The underlying connection pool is kept open
/// for the service lifetime and shared by all workers.
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl InventoryClient {
    pub fn new(addr: &str) -> Result<Self, reqwest::Error> {
        let base_url = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr.trim_end_matches('/'))
        };
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, base_url })
    }

    async fn post<T: Serialize>(&self, path: &str, request: &T) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .timeout(CALL_DEADLINE)
            .json(request)
            .send()
            .await
            .map_err(|err| ClientError::from_transport(SERVICE, err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::from_status(SERVICE, status, body))
    }
}

#[async_trait]
impl InventoryApi for InventoryClient {
    async fn release_hold(&self, request: ReleaseHold) -> Result<(), ClientError> {
        self.post("/v1/inventory/release", &request).await
    }

    async fn commit_reservation(&self, request: CommitReservation) -> Result<(), ClientError> {
        self.post("/v1/inventory/commit", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addr_gets_a_scheme() {
        let client = InventoryClient::new("inventory-svc:8080").expect("client");
        assert_eq!(client.base_url, "http://inventory-svc:8080");

        let client = InventoryClient::new("https://inventory.internal/").expect("client");
        assert_eq!(client.base_url, "https://inventory.internal");
    }
}
