//! Open positions (`/position`), always delivered as a full snapshot

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tradesync_common::{
    time::{EpochUnit, TimestampNormalizer},
    EntityKind,
};

use super::{require_symbol, Entity};

/// One open position in the terminal's current snapshot.
///
/// `ticket` is carried but not relied on as a key: a snapshot replaces the
/// stored set wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Position {
    pub ticket: i64,
    pub symbol: String,

    pub time: Option<i64>,
    pub time_msc: Option<i64>,
    pub time_update: Option<i64>,
    pub time_update_msc: Option<i64>,

    #[serde(rename = "type")]
    pub position_type: Option<i32>,
    pub magic: Option<i64>,
    pub identifier: Option<i64>,
    pub reason: Option<i32>,

    pub volume: Option<f64>,
    pub price_open: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub price_current: Option<f64>,
    pub swap: Option<f64>,
    pub profit: Option<f64>,

    pub comment: Option<String>,
    pub external_id: Option<String>,

    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_normalized: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_msc_normalized: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_update_normalized: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_update_msc_normalized: Option<DateTime<FixedOffset>>,
}

impl Position {
    pub fn new(ticket: i64, symbol: impl Into<String>) -> Self {
        Self {
            ticket,
            symbol: symbol.into(),
            time: None,
            time_msc: None,
            time_update: None,
            time_update_msc: None,
            position_type: None,
            magic: None,
            identifier: None,
            reason: None,
            volume: None,
            price_open: None,
            sl: None,
            tp: None,
            price_current: None,
            swap: None,
            profit: None,
            comment: None,
            external_id: None,
            time_normalized: None,
            time_msc_normalized: None,
            time_update_normalized: None,
            time_update_msc_normalized: None,
        }
    }
}

impl Entity for Position {
    const KIND: EntityKind = EntityKind::Position;

    fn normalize(&mut self, normalizer: &TimestampNormalizer) {
        self.time_normalized = normalizer.normalize(self.time, EpochUnit::Seconds);
        self.time_msc_normalized = normalizer.normalize(self.time_msc, EpochUnit::Milliseconds);
        self.time_update_normalized = normalizer.normalize(self.time_update, EpochUnit::Seconds);
        self.time_update_msc_normalized =
            normalizer.normalize(self.time_update_msc, EpochUnit::Milliseconds);
    }

    fn validate(&self) -> Result<(), String> {
        require_symbol(&self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_all_four_timestamps() {
        let mut position = Position::new(42, "USDJPY");
        position.time = Some(1_718_452_800);
        position.time_msc = Some(1_718_452_800_500);
        position.time_update = Some(1_734_264_000);
        position.time_update_msc = None;

        position.normalize(&TimestampNormalizer::default());

        assert!(position.time_normalized.is_some());
        assert_eq!(
            position.time_msc_normalized.unwrap().timestamp_subsec_millis(),
            500
        );
        assert_eq!(
            position.time_update_normalized.unwrap().to_rfc3339(),
            "2024-12-15T18:00:00+08:00"
        );
        assert!(position.time_update_msc_normalized.is_none());
    }

    #[test]
    fn test_validate_requires_symbol() {
        assert!(Position::new(1, "EURUSD").validate().is_ok());
        assert!(Position::new(1, "").validate().is_err());
    }
}
