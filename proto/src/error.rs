use thiserror::Error;

use crate::CardId;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame `{kind}` carries no payload")]
    EmptyPayload { kind: String },
}

/// A card payload that violates the punch-count invariants
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidCard {
    #[error("card {0} has no punch slots")]
    NoSlots(CardId),
    #[error("card {id} has {current} punches but only {total} slots")]
    Overfull { id: CardId, current: u32, total: u32 },
}
