//! Client for the reservation service's internal HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tessera_core::ReservationStatus;

use crate::error::ClientError;

const SERVICE: &str = "reservation";
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Reservation-state operations. `get_status` exists for integration tests
/// and operational checks; the worker itself only patches.
#[async_trait]
pub trait ReservationApi: Send + Sync {
    async fn update_status(
        &self,
        reservation_id: &str,
        status: ReservationStatus,
        order_id: Option<&str>,
    ) -> Result<(), ClientError>;

    async fn get_status(&self, reservation_id: &str) -> Result<ReservationStatus, ClientError>;
}

#[derive(Debug, Serialize)]
struct UpdateStatusBody<'a> {
    status: ReservationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: ReservationStatus,
}

/// HTTP client with a reused connection pool and a 30 s per-call timeout,
/// dominated by connection and TLS costs on cold paths.
#[derive(Debug, Clone)]
pub struct ReservationClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReservationClient {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(CALL_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn reservation_url(&self, reservation_id: &str) -> String {
        format!("{}/internal/reservations/{reservation_id}", self.base_url)
    }
}

#[async_trait]
impl ReservationApi for ReservationClient {
    async fn update_status(
        &self,
        reservation_id: &str,
        status: ReservationStatus,
        order_id: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .patch(self.reservation_url(reservation_id))
            .json(&UpdateStatusBody { status, order_id })
            .send()
            .await
            .map_err(|err| ClientError::from_transport(SERVICE, err))?;

        let http_status = response.status();
        if !http_status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(SERVICE, http_status, body));
        }

        tracing::debug!(
            reservation_id,
            status = %status,
            "updated reservation status"
        );
        Ok(())
    }

    async fn get_status(&self, reservation_id: &str) -> Result<ReservationStatus, ClientError> {
        let response = self
            .http
            .get(self.reservation_url(reservation_id))
            .send()
            .await
            .map_err(|err| ClientError::from_transport(SERVICE, err))?;

        let http_status = response.status();
        if !http_status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(SERVICE, http_status, body));
        }

        let payload: StatusResponse = response
            .json()
            .await
            .map_err(|err| ClientError::from_transport(SERVICE, err))?;
        Ok(payload.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_internal_reservation_urls() {
        let client = ReservationClient::new("http://reservation-api:8080/").expect("client");
        assert_eq!(
            client.reservation_url("rsv_1"),
            "http://reservation-api:8080/internal/reservations/rsv_1"
        );
    }

    #[test]
    fn update_body_omits_absent_order_id() {
        let body = serde_json::to_string(&UpdateStatusBody {
            status: ReservationStatus::Confirmed,
            order_id: None,
        })
        .expect("serialize");
        assert_eq!(body, r#"{"status":"CONFIRMED"}"#);

        let body = serde_json::to_string(&UpdateStatusBody {
            status: ReservationStatus::Confirmed,
            order_id: Some("ord_1"),
        })
        .expect("serialize");
        assert_eq!(body, r#"{"status":"CONFIRMED","order_id":"ord_1"}"#);
    }
}
