use punchcard_proto::{CardId, InvalidCard, ProtoError};
use thiserror::Error;

/// Failure of a sequence step's effect or cleanup. Logged by the sequencer and never
/// propagated: the timeline moves on regardless.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("card {0} is not in the collection")]
    CardMissing(CardId),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why the router dropped a domain event
#[derive(Debug, Error)]
pub enum Ignored {
    #[error("no user is signed in")]
    NoSession,
    #[error("addressed to another user")]
    OtherUser,
    #[error("not a loyalty event: {0}")]
    Malformed(#[from] ProtoError),
    #[error(transparent)]
    InvalidCard(#[from] InvalidCard),
    #[error("card {0} is not in the collection")]
    UnknownCard(CardId),
}
