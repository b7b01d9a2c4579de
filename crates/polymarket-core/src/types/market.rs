//! Market and token metadata, including sync watermarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a condition a token trades.
///
/// Outcome *labels* are domain-specific ("Up"/"Down", "Team A"/"Team B");
/// the outcome index is authoritative. Index 0 is canonically YES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeSide {
    Yes,
    No,
}

impl OutcomeSide {
    pub fn from_index(index: u8) -> Self {
        if index == 0 {
            OutcomeSide::Yes
        } else {
            OutcomeSide::No
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeSide::Yes => "YES",
            OutcomeSide::No => "NO",
        }
    }
}

/// One tradable outcome slot of a condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketToken {
    pub token_id: String,
    pub condition_id: String,
    /// Human question of the parent condition.
    pub question: String,
    /// Outcome label as listed by the market ("Yes", "Up", ...).
    pub outcome: String,
    /// 0 is the YES side, 1 the NO side.
    pub outcome_index: u8,
    /// Market creation time (unix seconds), when the indexer knows it.
    pub created_at: Option<i64>,
    /// Resolution time (unix seconds) for resolved markets.
    pub resolved_at: Option<i64>,
}

impl MarketToken {
    pub fn outcome_side(&self) -> OutcomeSide {
        OutcomeSide::from_index(self.outcome_index)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Sync watermarks for a token's fill coverage in the store.
///
/// Invariant: when both bounds are set, every fill for the token with a
/// timestamp in `[synced_from, synced_to]` is present in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketSync {
    pub synced_from: Option<i64>,
    pub synced_to: Option<i64>,
    /// Wall-clock of the last sync.
    pub synced_at: Option<DateTime<Utc>>,
    /// Set once the token's first fill has been reached going backwards.
    pub has_complete_history: bool,
}

impl MarketSync {
    pub fn is_empty(&self) -> bool {
        self.synced_from.is_none() || self.synced_to.is_none()
    }

    /// Whether `[from, to]` falls entirely inside the synced interval.
    pub fn covers(&self, from: i64, to: i64) -> bool {
        match (self.synced_from, self.synced_to) {
            (Some(lo), Some(hi)) => lo <= from && to <= hi,
            _ => false,
        }
    }
}

/// A wallet's open position on one token, from the indexer's
/// `MarketPosition` entity. Quantities and values are 6-dp micro-units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub token_id: String,
    pub net_quantity: i64,
    pub net_value: i64,
}
