use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CardDto, ProtoError, UserId};

/// Inbound frame as it arrives on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    #[serde(default)]
    pub data: Vec<Value>,
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self, ProtoError> { Ok(serde_json::from_str(text)?) }

    pub fn encode(&self) -> Result<String, ProtoError> { Ok(serde_json::to_string(self)?) }
}

/// Frame kind the server uses for loyalty events. The router decides by the payload's
/// `type` field, so other kinds carrying a loyalty payload are routed as well.
pub const LOYALTY_EVENT_KIND: &str = "loyalty_event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyEventType {
    PunchAdded,
    CardCreated,
    RewardRedeemed,
}

/// Loyalty domain payload carried in `data[0]` of an [`Envelope`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyEvent {
    #[serde(rename = "type")]
    pub event_type: LoyaltyEventType,
    pub user_id: UserId,
    pub punch_card: CardDto,
}

impl LoyaltyEvent {
    /// Decodes the loyalty payload from a frame's data. Accepts either the full `data` array
    /// (first element is used) or the bare payload object.
    pub fn from_payload(kind: &str, payload: &Value) -> Result<Self, ProtoError> {
        let first = match payload {
            Value::Array(items) => items.first().ok_or_else(|| ProtoError::EmptyPayload { kind: kind.to_string() })?,
            other => other,
        };
        Ok(LoyaltyEvent::deserialize(first)?)
    }

    pub fn into_envelope(self, kind: &str) -> Result<Envelope, ProtoError> {
        Ok(Envelope { kind: kind.to_string(), data: vec![serde_json::to_value(self)?] })
    }
}

/// Frames sent from the client to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    RegisterUser {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String, ProtoError> { Ok(serde_json::to_string(self)?) }

    pub fn decode(text: &str) -> Result<Self, ProtoError> { Ok(serde_json::from_str(text)?) }
}
