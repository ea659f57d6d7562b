//! In-memory store
//!
//! All tables live behind one `tokio::sync::Mutex`. A unit of work holds the
//! owned guard for its whole lifetime and edits a private copy of the tables,
//! which replaces the shared tables on commit. Writers are therefore fully
//! serialised, and readers (who take the same lock) only ever see committed
//! state.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Repository, SnapshotRepository, Store, StoreError, StoreResult, UnitOfWork};
use crate::models::{Account, Deal, Entity, KeyedEntity, Order, Position};

/// Committed contents of a [`MemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub orders: BTreeMap<i64, Order>,
    pub deals: BTreeMap<i64, Deal>,
    pub accounts: BTreeMap<i64, Account>,
    pub positions: Vec<Position>,
}

/// Keyed kinds stored in a [`Tables`] map
pub trait MemoryTable: KeyedEntity<Key = i64> {
    fn table(tables: &mut Tables) -> &mut BTreeMap<i64, Self>;
}

impl MemoryTable for Order {
    fn table(tables: &mut Tables) -> &mut BTreeMap<i64, Self> {
        &mut tables.orders
    }
}

impl MemoryTable for Deal {
    fn table(tables: &mut Tables) -> &mut BTreeMap<i64, Self> {
        &mut tables.deals
    }
}

impl MemoryTable for Account {
    fn table(tables: &mut Tables) -> &mut BTreeMap<i64, Self> {
        &mut tables.accounts
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed tables; waits for any open unit of work to end
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryUnitOfWork;

    async fn begin(&self) -> StoreResult<MemoryUnitOfWork> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUnitOfWork { guard, working })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self) -> StoreResult<()> {
        let MemoryUnitOfWork { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<E: MemoryTable> Repository<E> for MemoryUnitOfWork {
    async fn lock_keys(&mut self, _keys: &[i64]) -> StoreResult<()> {
        // The unit of work already owns the whole store.
        Ok(())
    }

    async fn find(&mut self, key: i64) -> StoreResult<Option<E>> {
        Ok(E::table(&mut self.working).get(&key).cloned())
    }

    async fn update(&mut self, record: &E) -> StoreResult<()> {
        E::table(&mut self.working).insert(record.key(), record.clone());
        Ok(())
    }

    async fn insert(&mut self, record: &E) -> StoreResult<()> {
        let table = E::table(&mut self.working);
        if table.contains_key(&record.key()) {
            return Err(StoreError::duplicate(E::KIND, record.key()));
        }
        table.insert(record.key(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository<Position> for MemoryUnitOfWork {
    async fn clear(&mut self) -> StoreResult<u64> {
        let removed = self.working.positions.len() as u64;
        self.working.positions.clear();
        Ok(removed)
    }

    async fn insert_all(&mut self, records: &[Position]) -> StoreResult<()> {
        self.working.positions.extend_from_slice(records);
        Ok(())
    }
}
