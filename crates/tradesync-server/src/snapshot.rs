//! Whole-set replacement for snapshot kinds
//!
//! A snapshot batch is the complete current state of its kind. Replacing it
//! clears every stored row, then installs the batch, all inside the caller's
//! unit of work, so readers see either the previous snapshot or the new one.

use serde::Serialize;
use tracing::debug;

use crate::models::Entity;
use crate::store::{SnapshotRepository, StoreResult};

/// What a snapshot replacement did to storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    pub removed: u64,
    pub inserted: usize,
}

/// Replace every stored row of `E` with `batch`.
///
/// An empty batch still clears: it means nothing is open.
#[tracing::instrument(skip(uow, batch), fields(kind = %E::KIND, records = batch.len()))]
pub async fn replace_all<E, U>(uow: &mut U, batch: &[E]) -> StoreResult<ReplaceOutcome>
where
    E: Entity,
    U: SnapshotRepository<E>,
{
    let removed = uow.clear().await?;

    if !batch.is_empty() {
        uow.insert_all(batch).await?;
    }

    debug!(removed, inserted = batch.len(), "Snapshot replaced");

    Ok(ReplaceOutcome {
        removed,
        inserted: batch.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;
    use crate::store::{MemoryStore, Store, UnitOfWork};

    async fn replace(store: &MemoryStore, batch: &[Position]) -> ReplaceOutcome {
        let mut tx = store.begin().await.unwrap();
        let outcome = replace_all(&mut tx, batch).await.unwrap();
        tx.commit().await.unwrap();
        outcome
    }

    fn tickets(positions: &[Position]) -> Vec<i64> {
        positions.iter().map(|p| p.ticket).collect()
    }

    #[tokio::test]
    async fn test_replace_leaves_exactly_the_new_batch() {
        let store = MemoryStore::new();
        replace(&store, &[Position::new(1, "EURUSD"), Position::new(2, "GBPUSD")]).await;

        let outcome = replace(&store, &[Position::new(3, "XAUUSD")]).await;

        assert_eq!(outcome, ReplaceOutcome { removed: 2, inserted: 1 });
        assert_eq!(tickets(&store.snapshot().await.positions), vec![3]);
    }

    #[tokio::test]
    async fn test_empty_batch_clears_previous_snapshot() {
        let store = MemoryStore::new();
        replace(&store, &[Position::new(1, "EURUSD")]).await;

        let outcome = replace(&store, &[]).await;

        assert_eq!(outcome, ReplaceOutcome { removed: 1, inserted: 0 });
        assert!(store.snapshot().await.positions.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_tickets_are_kept() {
        let store = MemoryStore::new();
        let batch = vec![Position::new(9, "EURUSD"), Position::new(9, "EURUSD")];

        replace(&store, &batch).await;
        replace(&store, &batch).await;

        assert_eq!(tickets(&store.snapshot().await.positions), vec![9, 9]);
    }

    #[tokio::test]
    async fn test_reader_never_sees_cleared_state() {
        let store = MemoryStore::new();
        replace(&store, &[Position::new(1, "EURUSD")]).await;

        let mut tx = store.begin().await.unwrap();
        replace_all(&mut tx, &[Position::new(2, "GBPUSD")]).await.unwrap();

        // The reader queues behind the open unit of work.
        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.snapshot().await.positions })
        };
        tokio::task::yield_now().await;
        assert!(!reader.is_finished());

        tx.commit().await.unwrap();
        assert_eq!(tickets(&reader.await.unwrap()), vec![2]);
    }
}
