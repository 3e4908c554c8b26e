use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CardId, InvalidCard};

/// Business status of a punch card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    #[default]
    Active,
    RewardReady,
    RewardRedeemed,
}

/// Card as transmitted by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDto {
    pub id: CardId,
    pub current_punches: u32,
    pub total_punches: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CardStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loyalty_program_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CardDto {
    pub fn new(id: impl Into<CardId>, current_punches: u32, total_punches: u32) -> Self {
        Self { id: id.into(), current_punches, total_punches, status: None, loyalty_program_id: None, created_at: None }
    }

    pub fn with_status(mut self, status: CardStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Checks the punch-count invariants and resolves the status the card must have.
    ///
    /// A card is `REWARD_READY` exactly when every slot is punched and it has not been
    /// redeemed; whatever status the server sent is overridden accordingly.
    pub fn validate(&self) -> Result<CardStatus, InvalidCard> {
        if self.total_punches == 0 {
            return Err(InvalidCard::NoSlots(self.id.clone()));
        }
        if self.current_punches > self.total_punches {
            return Err(InvalidCard::Overfull { id: self.id.clone(), current: self.current_punches, total: self.total_punches });
        }
        Ok(match self.status {
            Some(CardStatus::RewardRedeemed) => CardStatus::RewardRedeemed,
            _ if self.current_punches == self.total_punches => CardStatus::RewardReady,
            _ => CardStatus::Active,
        })
    }
}
