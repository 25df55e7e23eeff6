use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AccountCreated,
    TransferCreated,
    TransferReversed,
    HoldCreated,
    HoldVoided,
    HoldCaptured,
}

impl EventType {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            EventType::AccountCreated => "account.created",
            EventType::TransferCreated => "transfer.created",
            EventType::TransferReversed => "transfer.reversed",
            EventType::HoldCreated => "hold.created",
            EventType::HoldVoided => "hold.voided",
            EventType::HoldCaptured => "hold.captured",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Id,
    pub aggregate_type: String,
    pub aggregate_id: Id,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: Id,
        event_type: EventType,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        OutboxEvent {
            id: Id::generate(),
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            event_type,
            payload,
            created_at: now,
            published: false,
            published_at: None,
        }
    }
}
