//! Executed deals (`/close`)

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tradesync_common::{
    time::{EpochUnit, TimestampNormalizer},
    EntityKind,
};

use super::{merge_derived, merge_field, require_positive, require_symbol, Entity, KeyedEntity};

/// A terminal deal, keyed by `ticket`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deal {
    pub ticket: i64,
    pub symbol: String,

    /// Ticket of the order that produced the deal
    #[serde(rename = "order")]
    pub order_ticket: Option<i64>,
    pub time: Option<i64>,
    pub time_msc: Option<i64>,

    #[serde(rename = "type")]
    pub deal_type: Option<i32>,
    pub entry: Option<i32>,
    pub magic: Option<i64>,
    pub position_id: Option<i64>,
    pub reason: Option<i32>,

    pub volume: Option<f64>,
    pub price: Option<f64>,
    pub commission: Option<f64>,
    pub swap: Option<f64>,
    pub profit: Option<f64>,
    pub fee: Option<f64>,

    pub comment: Option<String>,
    pub external_id: Option<String>,

    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_normalized: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub time_msc_normalized: Option<DateTime<FixedOffset>>,
}

impl Deal {
    pub fn new(ticket: i64, symbol: impl Into<String>) -> Self {
        Self {
            ticket,
            symbol: symbol.into(),
            order_ticket: None,
            time: None,
            time_msc: None,
            deal_type: None,
            entry: None,
            magic: None,
            position_id: None,
            reason: None,
            volume: None,
            price: None,
            commission: None,
            swap: None,
            profit: None,
            fee: None,
            comment: None,
            external_id: None,
            time_normalized: None,
            time_msc_normalized: None,
        }
    }
}

impl Entity for Deal {
    const KIND: EntityKind = EntityKind::Deal;

    fn normalize(&mut self, normalizer: &TimestampNormalizer) {
        self.time_normalized = normalizer.normalize(self.time, EpochUnit::Seconds);
        self.time_msc_normalized = normalizer.normalize(self.time_msc, EpochUnit::Milliseconds);
    }

    fn validate(&self) -> Result<(), String> {
        require_positive("ticket", self.ticket)?;
        require_symbol(&self.symbol)
    }
}

impl KeyedEntity for Deal {
    type Key = i64;

    fn key(&self) -> i64 {
        self.ticket
    }

    fn merge_from(&mut self, incoming: &Self) {
        self.ticket = incoming.ticket;
        self.symbol.clone_from(&incoming.symbol);

        merge_field(&mut self.order_ticket, &incoming.order_ticket);
        merge_field(&mut self.time, &incoming.time);
        merge_field(&mut self.time_msc, &incoming.time_msc);

        merge_field(&mut self.deal_type, &incoming.deal_type);
        merge_field(&mut self.entry, &incoming.entry);
        merge_field(&mut self.magic, &incoming.magic);
        merge_field(&mut self.position_id, &incoming.position_id);
        merge_field(&mut self.reason, &incoming.reason);

        merge_field(&mut self.volume, &incoming.volume);
        merge_field(&mut self.price, &incoming.price);
        merge_field(&mut self.commission, &incoming.commission);
        merge_field(&mut self.swap, &incoming.swap);
        merge_field(&mut self.profit, &incoming.profit);
        merge_field(&mut self.fee, &incoming.fee);

        merge_field(&mut self.comment, &incoming.comment);
        merge_field(&mut self.external_id, &incoming.external_id);

        merge_derived(&mut self.time_normalized, &incoming.time, &incoming.time_normalized);
        merge_derived(
            &mut self.time_msc_normalized,
            &incoming.time_msc,
            &incoming.time_msc_normalized,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_field_maps_to_order_ticket() {
        let deal: Deal = serde_json::from_value(json!({
            "ticket": 88,
            "symbol": "EURUSD",
            "order": 5001,
            "type": 1,
            "entry": 1,
            "profit": -12.5
        }))
        .unwrap();

        assert_eq!(deal.order_ticket, Some(5001));
        assert_eq!(deal.deal_type, Some(1));
        assert_eq!(deal.profit, Some(-12.5));

        let raw = serde_json::to_value(&deal).unwrap();
        assert_eq!(raw["order"], 5001);
    }

    #[test]
    fn test_renormalized_after_time_change() {
        let normalizer = TimestampNormalizer::default();

        let mut stored = Deal::new(88, "EURUSD");
        stored.time = Some(1_734_264_000);
        stored.normalize(&normalizer);

        let mut incoming = Deal::new(88, "EURUSD");
        incoming.time = Some(1_718_452_800);
        incoming.normalize(&normalizer);

        stored.merge_from(&incoming);
        assert_eq!(stored.time, Some(1_718_452_800));
        assert_eq!(
            stored.time_normalized.unwrap().to_rfc3339(),
            "2024-06-15T17:00:00+08:00"
        );
    }

    #[test]
    fn test_absent_time_keeps_stored_normalized_value() {
        let normalizer = TimestampNormalizer::default();

        let mut stored = Deal::new(88, "EURUSD");
        stored.time_msc = Some(1_734_264_000_000);
        stored.normalize(&normalizer);
        let before = stored.time_msc_normalized;

        let mut incoming = Deal::new(88, "EURUSD");
        incoming.commission = Some(-0.7);
        incoming.normalize(&normalizer);

        stored.merge_from(&incoming);
        assert_eq!(stored.time_msc_normalized, before);
        assert_eq!(stored.commission, Some(-0.7));
    }
}
