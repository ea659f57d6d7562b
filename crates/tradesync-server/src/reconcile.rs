//! Natural-key reconciliation
//!
//! Merges a batch of keyed records into storage inside the caller's unit of
//! work: an existing row is updated field by field, a missing one is inserted.
//! Records are applied in batch order, so a key repeated within a batch ends
//! up with the later record's values.

use serde::Serialize;
use tracing::debug;

use crate::models::KeyedEntity;
use crate::store::{Repository, StoreResult};

/// What a reconciliation did to storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
}

/// Merge `batch` into storage through `uow`.
///
/// Keys are locked up front, before any lookup. On error the unit of work is
/// left as is; the caller rolls it back.
#[tracing::instrument(skip(uow, batch), fields(kind = %E::KIND, records = batch.len()))]
pub async fn reconcile<E, U>(uow: &mut U, batch: &[E]) -> StoreResult<ReconcileOutcome>
where
    E: KeyedEntity,
    U: Repository<E>,
{
    let mut keys: Vec<E::Key> = batch.iter().map(KeyedEntity::key).collect();
    keys.sort_unstable();
    keys.dedup();
    uow.lock_keys(&keys).await?;

    let mut outcome = ReconcileOutcome::default();

    for record in batch {
        match uow.find(record.key()).await? {
            Some(mut stored) => {
                stored.merge_from(record);
                uow.update(&stored).await?;
                outcome.updated += 1;
            },
            None => {
                uow.insert(record).await?;
                outcome.inserted += 1;
            },
        }
    }

    debug!(
        inserted = outcome.inserted,
        updated = outcome.updated,
        distinct_keys = keys.len(),
        "Batch reconciled"
    );

    Ok(outcome)
}
