//! TradeSync Server Library
//!
//! Receives batches of trading records pushed by a MetaTrader 5 terminal and
//! keeps a relational copy of them.
//!
//! # Overview
//!
//! - **Orders, deals, accounts** are reconciled by natural key (`ticket` or
//!   `login`): existing rows are updated field by field, new ones inserted.
//! - **Positions** arrive as the complete set of open positions and replace the
//!   stored set wholesale.
//! - Every epoch timestamp is normalized from the broker clock into a fixed
//!   target offset and stored next to the raw value.
//! - A raw copy of each batch is archived outside the store, best effort.
//!
//! # Architecture
//!
//! ```text
//! api ──▶ ingest::IngestService ──▶ reconcile / snapshot ──▶ store::{PgStore, MemoryStore}
//!                    └──▶ audit::AuditSink (spawned, never awaited)
//! ```
//!
//! Each batch runs in exactly one [`store::UnitOfWork`]; it is committed only
//! if every record was applied, so a failed batch leaves storage untouched and
//! can be resent as is.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tradesync_server::{api, audit::NoopAuditSink, config::Config, ingest::IngestService, store::MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let service = IngestService::new(
//!         MemoryStore::new(),
//!         config.time.normalizer()?,
//!         Arc::new(NoopAuditSink),
//!     );
//!     api::serve(&config.server, service).await
//! }
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod reconcile;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use error::{IngestError, IngestResult};
pub use ingest::{Batch, IngestAck, IngestService};
