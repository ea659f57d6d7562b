//! Pending and historical orders (`/open`)

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tradesync_common::{
    time::{EpochUnit, TimestampNormalizer},
    EntityKind,
};

use super::{merge_derived, merge_field, require_positive, require_symbol, Entity, KeyedEntity};

/// A terminal order, keyed by `ticket`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub ticket: i64,
    pub symbol: String,

    pub time_setup: Option<i64>,
    pub time_setup_msc: Option<i64>,
    pub time_done: Option<i64>,
    pub time_done_msc: Option<i64>,
    pub time_expiration: Option<i64>,

    #[serde(rename = "type")]
    pub order_type: Option<i32>,
    pub type_time: Option<i32>,
    pub type_filling: Option<i32>,
    pub state: Option<i32>,
    pub magic: Option<i64>,
    pub position_id: Option<i64>,
    pub position_by_id: Option<i64>,
    pub reason: Option<i32>,

    pub volume_initial: Option<f64>,
    pub volume_current: Option<f64>,
    pub price_open: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub price_current: Option<f64>,
    pub price_stoplimit: Option<f64>,

    pub comment: Option<String>,
    pub external_id: Option<String>,

    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_setup_normalized: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_setup_msc_normalized: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_done_normalized: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_done_msc_normalized: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_expiration_normalized: Option<DateTime<FixedOffset>>,
}

impl Order {
    /// An order carrying only its required fields
    pub fn new(ticket: i64, symbol: impl Into<String>) -> Self {
        Self {
            ticket,
            symbol: symbol.into(),
            time_setup: None,
            time_setup_msc: None,
            time_done: None,
            time_done_msc: None,
            time_expiration: None,
            order_type: None,
            type_time: None,
            type_filling: None,
            state: None,
            magic: None,
            position_id: None,
            position_by_id: None,
            reason: None,
            volume_initial: None,
            volume_current: None,
            price_open: None,
            sl: None,
            tp: None,
            price_current: None,
            price_stoplimit: None,
            comment: None,
            external_id: None,
            time_setup_normalized: None,
            time_setup_msc_normalized: None,
            time_done_normalized: None,
            time_done_msc_normalized: None,
            time_expiration_normalized: None,
        }
    }
}

impl Entity for Order {
    const KIND: EntityKind = EntityKind::Order;

    fn normalize(&mut self, normalizer: &TimestampNormalizer) {
        self.time_setup_normalized = normalizer.normalize(self.time_setup, EpochUnit::Seconds);
        self.time_setup_msc_normalized =
            normalizer.normalize(self.time_setup_msc, EpochUnit::Milliseconds);
        self.time_done_normalized = normalizer.normalize(self.time_done, EpochUnit::Seconds);
        self.time_done_msc_normalized =
            normalizer.normalize(self.time_done_msc, EpochUnit::Milliseconds);
        self.time_expiration_normalized =
            normalizer.normalize(self.time_expiration, EpochUnit::Seconds);
    }

    fn validate(&self) -> Result<(), String> {
        require_positive("ticket", self.ticket)?;
        require_symbol(&self.symbol)
    }
}

impl KeyedEntity for Order {
    type Key = i64;

    fn key(&self) -> i64 {
        self.ticket
    }

    fn merge_from(&mut self, incoming: &Self) {
        self.ticket = incoming.ticket;
        self.symbol.clone_from(&incoming.symbol);

        merge_field(&mut self.time_setup, &incoming.time_setup);
        merge_field(&mut self.time_setup_msc, &incoming.time_setup_msc);
        merge_field(&mut self.time_done, &incoming.time_done);
        merge_field(&mut self.time_done_msc, &incoming.time_done_msc);
        merge_field(&mut self.time_expiration, &incoming.time_expiration);

        merge_field(&mut self.order_type, &incoming.order_type);
        merge_field(&mut self.type_time, &incoming.type_time);
        merge_field(&mut self.type_filling, &incoming.type_filling);
        merge_field(&mut self.state, &incoming.state);
        merge_field(&mut self.magic, &incoming.magic);
        merge_field(&mut self.position_id, &incoming.position_id);
        merge_field(&mut self.position_by_id, &incoming.position_by_id);
        merge_field(&mut self.reason, &incoming.reason);

        merge_field(&mut self.volume_initial, &incoming.volume_initial);
        merge_field(&mut self.volume_current, &incoming.volume_current);
        merge_field(&mut self.price_open, &incoming.price_open);
        merge_field(&mut self.sl, &incoming.sl);
        merge_field(&mut self.tp, &incoming.tp);
        merge_field(&mut self.price_current, &incoming.price_current);
        merge_field(&mut self.price_stoplimit, &incoming.price_stoplimit);

        merge_field(&mut self.comment, &incoming.comment);
        merge_field(&mut self.external_id, &incoming.external_id);

        merge_derived(
            &mut self.time_setup_normalized,
            &incoming.time_setup,
            &incoming.time_setup_normalized,
        );
        merge_derived(
            &mut self.time_setup_msc_normalized,
            &incoming.time_setup_msc,
            &incoming.time_setup_msc_normalized,
        );
        merge_derived(
            &mut self.time_done_normalized,
            &incoming.time_done,
            &incoming.time_done_normalized,
        );
        merge_derived(
            &mut self.time_done_msc_normalized,
            &incoming.time_done_msc,
            &incoming.time_done_msc_normalized,
        );
        merge_derived(
            &mut self.time_expiration_normalized,
            &incoming.time_expiration,
            &incoming.time_expiration_normalized,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_terminal_payload() {
        let order: Order = serde_json::from_value(json!({
            "ticket": 5001,
            "symbol": "EURUSD",
            "time_setup": 1718452800,
            "time_setup_msc": 1718452800123_i64,
            "type": 2,
            "volume_initial": 0.1,
            "price_open": 1.0712,
            "unknown_field": "ignored",
            "time_setup_normalized": "2000-01-01T00:00:00+00:00"
        }))
        .unwrap();

        assert_eq!(order.ticket, 5001);
        assert_eq!(order.order_type, Some(2));
        assert_eq!(order.time_setup_msc, Some(1_718_452_800_123));
        assert!(order.time_setup_normalized.is_none());
    }

    #[test]
    fn test_missing_ticket_rejected() {
        let result = serde_json::from_value::<Order>(json!({ "symbol": "EURUSD" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_fills_every_derived_field() {
        let mut order = Order::new(1, "XAUUSD");
        order.time_setup = Some(1_718_452_800);
        order.time_setup_msc = Some(1_718_452_800_000);
        order.time_done = Some(1_734_264_000);
        order.time_done_msc = Some(1_734_264_000_000);
        order.time_expiration = Some(0);

        order.normalize(&TimestampNormalizer::default());

        assert_eq!(
            order.time_setup_normalized.unwrap().to_rfc3339(),
            "2024-06-15T17:00:00+08:00"
        );
        assert_eq!(order.time_setup_msc_normalized, order.time_setup_normalized);
        assert_eq!(
            order.time_done_normalized.unwrap().to_rfc3339(),
            "2024-12-15T18:00:00+08:00"
        );
        assert_eq!(order.time_done_msc_normalized, order.time_done_normalized);
        assert!(order.time_expiration_normalized.is_some());
    }

    #[test]
    fn test_merge_overwrites_present_fields_only() {
        let mut stored = Order::new(7, "EURUSD");
        stored.price_open = Some(1.10);
        stored.comment = Some("first".to_string());
        stored.state = Some(1);

        let mut incoming = Order::new(7, "EURUSD");
        incoming.state = Some(4);
        incoming.comment = Some("filled".to_string());

        stored.merge_from(&incoming);

        assert_eq!(stored.state, Some(4));
        assert_eq!(stored.comment.as_deref(), Some("filled"));
        assert_eq!(stored.price_open, Some(1.10));
    }

    #[test]
    fn test_validate() {
        assert!(Order::new(1, "EURUSD").validate().is_ok());
        assert!(Order::new(0, "EURUSD").validate().is_err());
        assert!(Order::new(1, "  ").validate().is_err());
    }

    #[test]
    fn test_raw_serialization_omits_derived_fields() {
        let value = serde_json::to_value(Order::new(3, "GBPUSD")).unwrap();
        assert!(value.get("time_setup_normalized").is_none());
        assert_eq!(value["type"], serde_json::Value::Null);
    }
}
