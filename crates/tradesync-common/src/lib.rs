//! TradeSync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the TradeSync workspace.
//!
//! # Overview
//!
//! - **Types**: the entity kinds pushed by the trading terminal
//! - **Time**: broker-clock timestamp normalization
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Error Handling**: error and result types for this crate
//!
//! # Example
//!
//! ```no_run
//! use tradesync_common::time::{EpochUnit, TimestampNormalizer};
//!
//! let normalizer = TimestampNormalizer::default();
//! let normalized = normalizer.normalize(Some(1_718_452_800), EpochUnit::Seconds);
//! assert!(normalized.is_some());
//! ```

pub mod error;
pub mod logging;
pub mod time;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::EntityKind;
