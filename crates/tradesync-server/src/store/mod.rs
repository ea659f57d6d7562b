//! Transactional storage for ingested records
//!
//! A [`Store`] hands out explicit [`UnitOfWork`] values. Every read and write
//! of one batch goes through a single unit of work, which is either committed
//! or rolled back; dropping it without committing discards its effects.
//!
//! Two backends implement these traits:
//!
//! - [`postgres::PgStore`]: read-committed transactions, per-key advisory
//!   locks for check-then-act, an exclusive table lock for snapshots
//! - [`memory::MemoryStore`]: one writer at a time over a working copy

use async_trait::async_trait;
use thiserror::Error;
use tradesync_common::EntityKind;

use crate::models::{Account, Deal, Entity, KeyedEntity, Order, Position};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage-layer failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A row with this natural key already exists
    #[error("{kind} '{key}' already exists")]
    DuplicateKey { kind: EntityKind, key: String },

    /// The store cannot serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn duplicate(kind: EntityKind, key: impl ToString) -> Self {
        Self::DuplicateKey {
            kind,
            key: key.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A source of units of work
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: UnitOfWork;

    /// Open a unit of work
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Cheap connectivity probe
    async fn ping(&self) -> StoreResult<()>;
}

/// One atomic group of storage operations
#[async_trait]
pub trait UnitOfWork:
    Repository<Order> + Repository<Deal> + Repository<Account> + SnapshotRepository<Position> + Send
{
    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// Natural-key access to one keyed kind inside a unit of work
#[async_trait]
pub trait Repository<E: KeyedEntity>: Send {
    /// Serialise check-then-act on these keys against concurrent units of
    /// work until this one ends. Keys may come in any order; the backend
    /// acquires its locks in a fixed global order.
    async fn lock_keys(&mut self, keys: &[E::Key]) -> StoreResult<()>;

    async fn find(&mut self, key: E::Key) -> StoreResult<Option<E>>;

    /// Overwrite the stored row for `record.key()` with `record`
    async fn update(&mut self, record: &E) -> StoreResult<()>;

    /// Insert a new row; fails with [`StoreError::DuplicateKey`] if the key exists
    async fn insert(&mut self, record: &E) -> StoreResult<()>;
}

/// Whole-set access to a snapshot kind inside a unit of work
#[async_trait]
pub trait SnapshotRepository<E: Entity>: Send {
    /// Remove every stored row of this kind, returning how many were removed.
    ///
    /// Also takes whatever lock keeps other writers of this kind out until the
    /// unit of work ends.
    async fn clear(&mut self) -> StoreResult<u64>;

    async fn insert_all(&mut self, records: &[E]) -> StoreResult<()>;
}
