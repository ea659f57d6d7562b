//! Record types pushed by the trading terminal
//!
//! Each kind is a flat struct of raw terminal fields plus derived
//! `*_normalized` timestamps. Derived fields are never read from the caller's
//! JSON and are left out of the serialized raw copy until they are filled.
//!
//! # Traits
//!
//! - [`Entity`]: anything that can be ingested (all four kinds)
//! - [`KeyedEntity`]: kinds reconciled by natural key (orders, deals, accounts);
//!   carries the explicit field-by-field merge

pub mod account;
pub mod deal;
pub mod order;
pub mod position;

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use tradesync_common::{time::TimestampNormalizer, EntityKind};

pub use account::Account;
pub use deal::Deal;
pub use order::Order;
pub use position::Position;

/// A record the ingestion pipeline knows how to normalize and validate
pub trait Entity:
    Debug + Clone + Serialize + DeserializeOwned + Send + Sync + Unpin + 'static
{
    const KIND: EntityKind;

    /// Recompute every derived timestamp from the raw epoch fields.
    fn normalize(&mut self, normalizer: &TimestampNormalizer);

    /// Shape checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String>;
}

/// A record with a natural key, merged into storage field by field
pub trait KeyedEntity: Entity {
    type Key: Debug + Display + Copy + Ord + Hash + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    /// Overwrite `self` with every field present on `incoming`.
    ///
    /// Required fields always overwrite; optional fields only when `incoming`
    /// carries a value. Derived timestamps follow their raw field.
    fn merge_from(&mut self, incoming: &Self);
}

/// Copy an optional field only when the incoming record carries it
pub(crate) fn merge_field<T: Clone>(stored: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        stored.clone_from(incoming);
    }
}

/// Replace a derived timestamp whenever its raw field is present on the
/// incoming record, even if the raw value could not be normalized
pub(crate) fn merge_derived<R, T: Clone>(
    stored: &mut Option<T>,
    incoming_raw: &Option<R>,
    incoming: &Option<T>,
) {
    if incoming_raw.is_some() {
        stored.clone_from(incoming);
    }
}

/// Validate a whole batch, naming the first offending record
pub fn validate_batch<E: Entity>(batch: &[E]) -> Result<(), String> {
    for (index, record) in batch.iter().enumerate() {
        record
            .validate()
            .map_err(|message| format!("record {}: {}", index, message))?;
    }
    Ok(())
}

pub(crate) fn require_positive(field: &str, value: i64) -> Result<(), String> {
    if value <= 0 {
        return Err(format!("{} must be greater than 0, got {}", field, value));
    }
    Ok(())
}

pub(crate) fn require_symbol(symbol: &str) -> Result<(), String> {
    if symbol.trim().is_empty() {
        return Err("symbol is required and cannot be empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_field_keeps_stored_value_when_absent() {
        let mut stored = Some(1.5);
        merge_field(&mut stored, &None);
        assert_eq!(stored, Some(1.5));

        merge_field(&mut stored, &Some(2.0));
        assert_eq!(stored, Some(2.0));
    }

    #[test]
    fn test_merge_derived_follows_raw_field() {
        let mut stored = Some("old");
        merge_derived(&mut stored, &None::<i64>, &None);
        assert_eq!(stored, Some("old"));

        merge_derived(&mut stored, &Some(i64::MAX), &None);
        assert_eq!(stored, None);
    }

    #[test]
    fn test_validate_batch_reports_index() {
        let batch = vec![
            Account::new(1001),
            Account::new(0),
        ];
        let err = validate_batch(&batch).unwrap_err();
        assert!(err.starts_with("record 1:"), "{}", err);
        assert!(err.contains("login"));
    }

    #[test]
    fn test_validate_empty_batch() {
        assert!(validate_batch::<Position>(&[]).is_ok());
    }
}
