//! Batch ingestion
//!
//! [`IngestService`] takes one decoded [`Batch`] at a time and:
//!
//! 1. spawns a write of the raw batch to the audit sink (failures only logged)
//! 2. derives the normalized timestamps of every record
//! 3. opens a unit of work and reconciles keyed kinds by natural key, or
//!    replaces the whole snapshot for positions
//! 4. commits, or rolls back and reports the failing kind and cause
//!
//! Batches are expected to have passed [`Batch::validate`] already.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use tradesync_common::{time::TimestampNormalizer, EntityKind};

use crate::audit::AuditSink;
use crate::error::{IngestError, IngestResult};
use crate::models::{validate_batch, Account, Deal, Entity, Order, Position};
use crate::reconcile::reconcile;
use crate::snapshot::replace_all;
use crate::store::{Store, StoreResult, UnitOfWork};

/// One decoded batch of a single kind
#[derive(Debug, Clone)]
pub enum Batch {
    Orders(Vec<Order>),
    Deals(Vec<Deal>),
    Positions(Vec<Position>),
    Accounts(Vec<Account>),
}

impl Batch {
    pub fn kind(&self) -> EntityKind {
        match self {
            Batch::Orders(_) => EntityKind::Order,
            Batch::Deals(_) => EntityKind::Deal,
            Batch::Positions(_) => EntityKind::Position,
            Batch::Accounts(_) => EntityKind::Account,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Batch::Orders(records) => records.len(),
            Batch::Deals(records) => records.len(),
            Batch::Positions(records) => records.len(),
            Batch::Accounts(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape checks for every record, naming the first one that fails
    pub fn validate(&self) -> IngestResult<()> {
        let result = match self {
            Batch::Orders(records) => validate_batch(records),
            Batch::Deals(records) => validate_batch(records),
            Batch::Positions(records) => validate_batch(records),
            Batch::Accounts(records) => validate_batch(records),
        };
        result.map_err(|message| IngestError::validation(self.kind(), message))
    }

    /// The records as a JSON array, as they would be re-sent by the terminal
    pub fn to_raw_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Batch::Orders(records) => serde_json::to_value(records),
            Batch::Deals(records) => serde_json::to_value(records),
            Batch::Positions(records) => serde_json::to_value(records),
            Batch::Accounts(records) => serde_json::to_value(records),
        }
    }

    fn normalize(&mut self, normalizer: &TimestampNormalizer) {
        fn each<E: Entity>(records: &mut [E], normalizer: &TimestampNormalizer) {
            for record in records {
                record.normalize(normalizer);
            }
        }

        match self {
            Batch::Orders(records) => each(records, normalizer),
            Batch::Deals(records) => each(records, normalizer),
            Batch::Positions(records) => each(records, normalizer),
            Batch::Accounts(records) => each(records, normalizer),
        }
    }
}

/// Acknowledgement of a committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestAck {
    pub message: String,
    pub kind: EntityKind,
    pub received: usize,
    pub inserted: usize,
    pub updated: usize,
    pub removed: u64,
}

impl IngestAck {
    fn new(kind: EntityKind, received: usize) -> Self {
        Self {
            message: ack_message(kind).to_string(),
            kind,
            received,
            inserted: 0,
            updated: 0,
            removed: 0,
        }
    }
}

/// Confirmation text the terminal expects for each kind
pub fn ack_message(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Order => "Open order data saved successfully",
        EntityKind::Deal => "Close order data saved successfully",
        EntityKind::Position => "Position data saved successfully",
        EntityKind::Account => "Account data saved successfully",
    }
}

/// Coordinates normalization, storage and archiving of batches
pub struct IngestService<S: Store> {
    store: S,
    normalizer: TimestampNormalizer,
    audit: Arc<dyn AuditSink>,
}

impl<S: Store> Clone for IngestService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            normalizer: self.normalizer,
            audit: Arc::clone(&self.audit),
        }
    }
}

impl<S: Store> IngestService<S> {
    pub fn new(store: S, normalizer: TimestampNormalizer, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            normalizer,
            audit,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply one batch as a single unit of work
    #[tracing::instrument(skip(self, batch), fields(kind = %batch.kind(), records = batch.len()))]
    pub async fn ingest(&self, mut batch: Batch) -> IngestResult<IngestAck> {
        let kind = batch.kind();

        self.archive(&batch);
        batch.normalize(&self.normalizer);

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| IngestError::storage(kind, e))?;

        let ack = match apply(&mut tx, &batch).await {
            Ok(ack) => ack,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(kind = %kind, error = %rollback_err, "Rollback failed");
                }
                return Err(IngestError::storage(kind, e));
            },
        };

        tx.commit().await.map_err(|e| IngestError::storage(kind, e))?;

        info!(
            kind = %kind,
            received = ack.received,
            inserted = ack.inserted,
            updated = ack.updated,
            removed = ack.removed,
            "Batch committed"
        );

        Ok(ack)
    }

    /// Hand the raw batch to the audit sink without waiting for it
    fn archive(&self, batch: &Batch) {
        let kind = batch.kind();
        let raw = match batch.to_raw_json() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Could not serialize batch for audit copy");
                return;
            },
        };

        let sink = Arc::clone(&self.audit);
        tokio::spawn(async move {
            if let Err(e) = sink.write(kind, &raw).await {
                warn!(kind = %kind, error = %e, "Audit copy not written");
            }
        });
    }
}

async fn apply<U: UnitOfWork>(tx: &mut U, batch: &Batch) -> StoreResult<IngestAck> {
    let mut ack = IngestAck::new(batch.kind(), batch.len());

    match batch {
        Batch::Orders(records) => {
            let outcome = reconcile(tx, records).await?;
            ack.inserted = outcome.inserted;
            ack.updated = outcome.updated;
        },
        Batch::Deals(records) => {
            let outcome = reconcile(tx, records).await?;
            ack.inserted = outcome.inserted;
            ack.updated = outcome.updated;
        },
        Batch::Accounts(records) => {
            let outcome = reconcile(tx, records).await?;
            ack.inserted = outcome.inserted;
            ack.updated = outcome.updated;
        },
        Batch::Positions(records) => {
            let outcome = replace_all(tx, records).await?;
            ack.inserted = outcome.inserted;
            ack.removed = outcome.removed;
        },
    }

    Ok(ack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, NoopAuditSink};
    use crate::store::memory::testing::FaultyStore;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Forwards every audit write to a channel
    struct RecordingSink(mpsc::UnboundedSender<(EntityKind, serde_json::Value)>);

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn write(
            &self,
            kind: EntityKind,
            records: &serde_json::Value,
        ) -> Result<(), AuditError> {
            let _ = self.0.send((kind, records.clone()));
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn write(&self, _: EntityKind, _: &serde_json::Value) -> Result<(), AuditError> {
            Err(AuditError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            )))
        }
    }

    fn service<S: Store>(store: S) -> IngestService<S> {
        IngestService::new(store, TimestampNormalizer::default(), Arc::new(NoopAuditSink))
    }

    fn orders(tickets: std::ops::RangeInclusive<i64>) -> Vec<Order> {
        tickets
            .map(|ticket| {
                let mut order = Order::new(ticket, "EURUSD");
                order.time_setup = Some(1_718_452_800);
                order
            })
            .collect()
    }

    #[tokio::test]
    async fn test_orders_are_normalized_and_stored() {
        let store = MemoryStore::new();
        let ack = service(store.clone())
            .ingest(Batch::Orders(orders(1..=3)))
            .await
            .unwrap();

        assert_eq!(ack.message, "Open order data saved successfully");
        assert_eq!((ack.received, ack.inserted, ack.updated), (3, 3, 0));

        let stored = store.snapshot().await.orders;
        assert_eq!(stored.len(), 3);
        assert_eq!(
            stored[&2].time_setup_normalized.unwrap().to_rfc3339(),
            "2024-06-15T17:00:00+08:00"
        );
    }

    #[tokio::test]
    async fn test_resending_a_batch_updates_in_place() {
        let store = MemoryStore::new();
        let service = service(store.clone());

        service.ingest(Batch::Orders(orders(1..=3))).await.unwrap();
        let ack = service.ingest(Batch::Orders(orders(1..=3))).await.unwrap();

        assert_eq!((ack.inserted, ack.updated), (0, 3));
        assert_eq!(store.snapshot().await.orders.len(), 3);
    }

    #[tokio::test]
    async fn test_fault_on_last_record_leaves_nothing_visible() {
        let store = MemoryStore::new();
        let faulty = FaultyStore::new(store.clone(), 5);

        let err = service(faulty)
            .ingest(Batch::Orders(orders(1..=5)))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Storage { kind: EntityKind::Order, .. }));
        assert!(err.to_string().contains("injected fault on write 5"));
        assert!(store.snapshot().await.orders.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_prior_state_untouched() {
        let store = MemoryStore::new();
        service(store.clone())
            .ingest(Batch::Positions(vec![Position::new(1, "EURUSD")]))
            .await
            .unwrap();

        let faulty = FaultyStore::new(store.clone(), 2);
        let err = service(faulty)
            .ingest(Batch::Positions(vec![
                Position::new(2, "GBPUSD"),
                Position::new(3, "USDJPY"),
            ]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), EntityKind::Position);
        let positions = store.snapshot().await.positions;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket, 1);
    }

    #[tokio::test]
    async fn test_positions_replace_previous_snapshot() {
        let store = MemoryStore::new();
        let service = service(store.clone());

        service
            .ingest(Batch::Positions(vec![Position::new(1, "EURUSD"), Position::new(2, "EURUSD")]))
            .await
            .unwrap();
        let ack = service.ingest(Batch::Positions(vec![])).await.unwrap();

        assert_eq!(ack.message, "Position data saved successfully");
        assert_eq!((ack.received, ack.inserted, ack.removed), (0, 0, 2));
        assert!(store.snapshot().await.positions.is_empty());
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_ingestion() {
        let store = MemoryStore::new();
        let service = IngestService::new(
            store.clone(),
            TimestampNormalizer::default(),
            Arc::new(BrokenSink),
        );

        let ack = service
            .ingest(Batch::Accounts(vec![Account::new(77)]))
            .await
            .unwrap();

        assert_eq!(ack.message, "Account data saved successfully");
        assert!(store.snapshot().await.accounts.contains_key(&77));
    }

    #[tokio::test]
    async fn test_audit_receives_raw_batch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = IngestService::new(
            MemoryStore::new(),
            TimestampNormalizer::default(),
            Arc::new(RecordingSink(tx)),
        );

        let mut deal = Deal::new(9, "XAUUSD");
        deal.time = Some(1_718_452_800);
        service.ingest(Batch::Deals(vec![deal])).await.unwrap();

        let (kind, raw) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, EntityKind::Deal);
        assert_eq!(raw[0]["ticket"], 9);
        assert_eq!(raw[0]["time"], 1_718_452_800_i64);
        assert!(raw[0].get("time_normalized").is_none());
    }

    #[tokio::test]
    async fn test_audit_copy_is_written_even_when_storage_fails() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = IngestService::new(
            FaultyStore::new(MemoryStore::new(), 1),
            TimestampNormalizer::default(),
            Arc::new(RecordingSink(tx)),
        );

        assert!(service.ingest(Batch::Orders(orders(1..=1))).await.is_err());

        let (kind, _) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, EntityKind::Order);
    }

    #[test]
    fn test_validate_reports_kind() {
        let err = Batch::Deals(vec![Deal::new(0, "EURUSD")]).validate().unwrap_err();
        assert!(matches!(err, IngestError::Validation { kind: EntityKind::Deal, .. }));

        assert!(Batch::Positions(vec![]).validate().is_ok());
    }
}
