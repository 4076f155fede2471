//! Store configuration.
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Knobs for a [crate::Store].  Every field has a default, so configs loaded from JSON may name only what they change.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Initial capacity of every table.
    pub table_capacity: usize,

    /// After each reconciliation, compare the cache against a fresh join and panic if they differ.
    ///
    /// This costs a full join per reconciliation and so defaults to on only in debug builds.
    pub verify_reconciliation: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            table_capacity: 0,
            verify_reconciliation: cfg!(debug_assertions),
        }
    }
}

impl StoreConfig {
    pub fn from_json(text: &str) -> Result<StoreConfig> {
        Ok(serde_json::from_str(text)?)
    }
}
