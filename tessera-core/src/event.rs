use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Lifecycle event types consumed from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ReservationExpired,
    PaymentApproved,
    PaymentFailed,
}

impl EventType {
    /// Parses a wire-level type string. `reservation.hold.expired` is a legacy
    /// alias kept for older publishers and maps to [`EventType::ReservationExpired`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reservation.expired" | "reservation.hold.expired" => Some(Self::ReservationExpired),
            "payment.approved" => Some(Self::PaymentApproved),
            "payment.failed" => Some(Self::PaymentFailed),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReservationExpired => "reservation.expired",
            Self::PaymentApproved => "payment.approved",
            Self::PaymentFailed => "payment.failed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque per-delivery token handed out by the queue. Required to delete a
/// message and valid only while the message stays invisible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpiredDetail {
    #[serde(rename = "qty", default)]
    pub quantity: u32,
    #[serde(default)]
    pub seat_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovedDetail {
    #[serde(default)]
    pub payment_intent_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(rename = "qty", default)]
    pub quantity: u32,
    #[serde(default)]
    pub seat_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailedDetail {
    #[serde(default)]
    pub payment_intent_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "qty", default)]
    pub quantity: u32,
    #[serde(default)]
    pub seat_ids: Vec<String>,
}

/// Type-specific payload, tagged by the envelope's `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    Expired(ExpiredDetail),
    Approved(ApprovedDetail),
    Failed(FailedDetail),
}

impl EventDetail {
    fn from_value(event_type: EventType, value: Value) -> Result<Self, ParseError> {
        let detail = match event_type {
            EventType::ReservationExpired => Self::Expired(serde_json::from_value(value)?),
            EventType::PaymentApproved => Self::Approved(serde_json::from_value(value)?),
            EventType::PaymentFailed => Self::Failed(serde_json::from_value(value)?),
        };
        Ok(detail)
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed event json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unknown event type: {0}")]
    UnknownType(String),
}

/// A parsed lifecycle event, owned by exactly one worker from the moment the
/// poller hands it to the pool until its outcome is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    pub reservation_id: String,
    pub event_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub trace_id: Option<String>,
    pub detail: EventDetail,
    /// Attached by the poller, never present on the wire.
    pub receipt: ReceiptHandle,
}

/// Envelope with a nested `detail` object carrying the correlation keys.
#[derive(Debug, Deserialize)]
struct NestedEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(default)]
    trace_id: Option<String>,
}

/// Flat envelope used by older publishers: correlation keys on the envelope,
/// payload fields under `payload`.
#[derive(Debug, Deserialize)]
struct FlatEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    reservation_id: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    ts: Option<DateTime<Utc>>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    trace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CorrelationKeys {
    #[serde(default)]
    reservation_id: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
}

fn required(field: Option<String>, name: &'static str) -> Result<String, ParseError> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ParseError::MissingField(name)),
    }
}

impl Event {
    /// Parses a raw message body into an event and attaches the delivery
    /// receipt. Both envelope flavours are accepted: the nested `detail` form
    /// first, then the flat `payload` form.
    pub fn from_json(body: &str, receipt: ReceiptHandle) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(body)?;
        if value.get("detail").is_some_and(Value::is_object) {
            Self::from_nested(value, receipt)
        } else {
            Self::from_flat(value, receipt)
        }
    }

    fn from_nested(value: Value, receipt: ReceiptHandle) -> Result<Self, ParseError> {
        let envelope: NestedEnvelope = serde_json::from_value(value)?;
        let id = required(envelope.id, "id")?;
        let type_str = required(envelope.event_type, "type")?;
        let event_type =
            EventType::parse(&type_str).ok_or(ParseError::UnknownType(type_str))?;
        let detail_value = envelope.detail.ok_or(ParseError::MissingField("detail"))?;

        let keys: CorrelationKeys = serde_json::from_value(detail_value.clone())?;
        let reservation_id = required(keys.reservation_id, "reservation_id")?;
        let event_id = required(keys.event_id, "event_id")?;
        let detail = EventDetail::from_value(event_type, detail_value)?;

        Ok(Self {
            id,
            event_type,
            reservation_id,
            event_id,
            timestamp: envelope.time,
            trace_id: envelope.trace_id,
            detail,
            receipt,
        })
    }

    fn from_flat(value: Value, receipt: ReceiptHandle) -> Result<Self, ParseError> {
        let envelope: FlatEnvelope = serde_json::from_value(value)?;
        let id = required(envelope.id, "id")?;
        let type_str = required(envelope.event_type, "type")?;
        let event_type =
            EventType::parse(&type_str).ok_or(ParseError::UnknownType(type_str))?;
        let reservation_id = required(envelope.reservation_id, "reservation_id")?;
        let event_id = required(envelope.event_id, "event_id")?;
        let payload = envelope.payload.unwrap_or_else(|| Value::Object(Default::default()));
        let detail = EventDetail::from_value(event_type, payload)?;

        Ok(Self {
            id,
            event_type,
            reservation_id,
            event_id,
            timestamp: envelope.ts,
            trace_id: envelope.trace_id,
            detail,
            receipt,
        })
    }

    /// Serializes back into the canonical nested envelope. Parsing the result
    /// yields a field-equivalent event.
    pub fn to_envelope(&self) -> Result<Value, serde_json::Error> {
        let mut detail = match &self.detail {
            EventDetail::Expired(d) => serde_json::to_value(d)?,
            EventDetail::Approved(d) => serde_json::to_value(d)?,
            EventDetail::Failed(d) => serde_json::to_value(d)?,
        };
        if let Value::Object(map) = &mut detail {
            map.insert("reservation_id".into(), Value::String(self.reservation_id.clone()));
            map.insert("event_id".into(), Value::String(self.event_id.clone()));
        }

        let mut envelope = serde_json::Map::new();
        envelope.insert("id".into(), Value::String(self.id.clone()));
        envelope.insert("type".into(), Value::String(self.event_type.as_str().into()));
        envelope.insert("detail".into(), detail);
        if let Some(time) = &self.timestamp {
            envelope.insert("time".into(), serde_json::to_value(time)?);
        }
        if let Some(trace_id) = &self.trace_id {
            envelope.insert("trace_id".into(), Value::String(trace_id.clone()));
        }
        Ok(Value::Object(envelope))
    }
}
