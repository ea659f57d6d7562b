//! Common types used across TradeSync

use serde::{Deserialize, Serialize};

/// The record families pushed by the trading terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Order,
    Deal,
    Position,
    Account,
}

impl EntityKind {
    /// Singular lowercase name, used in logs and error bodies
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Deal => "deal",
            EntityKind::Position => "position",
            EntityKind::Account => "account",
        }
    }

    /// Plural name used for the raw audit copy (`orders.json`, ...)
    pub fn file_stem(self) -> &'static str {
        match self {
            EntityKind::Order => "orders",
            EntityKind::Deal => "deals",
            EntityKind::Position => "positions",
            EntityKind::Account => "accounts",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
