//! Raw batch archive
//!
//! Every accepted batch is copied, as received and before normalization, to an
//! [`AuditSink`]. The copy lives outside the transactional store and is best
//! effort: the coordinator spawns the write and only logs its failure.
//!
//! - [`FileAuditSink`]: latest batch per kind as `<dir>/<kind>.json`
//! - [`NoopAuditSink`]: archiving disabled

mod file;

use async_trait::async_trait;
use thiserror::Error;
use tradesync_common::EntityKind;

pub use file::FileAuditSink;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Failed to write audit copy: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize audit copy: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Destination for raw batch copies
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    /// Store `records` (a JSON array) as the latest raw batch of `kind`
    async fn write(&self, kind: EntityKind, records: &serde_json::Value) -> Result<(), AuditError>;
}

/// Discards every batch
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn write(&self, _kind: EntityKind, _records: &serde_json::Value) -> Result<(), AuditError> {
        Ok(())
    }
}
