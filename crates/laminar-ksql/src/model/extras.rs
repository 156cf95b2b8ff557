//! String-keyed side channel carried by a query model.
//!
//! Values are JSON so the embedding runtime can pass sink sizing, emit
//! overrides and hub selections without widening the model type. Derived
//! projection data is memoized here once per model instance; the raw
//! values themselves are never changed by a compile.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::projection::{HubOverride, HubSelection, ProjectionMetadata};
use crate::error::StatementError;

/// Well-known keys.
pub mod keys {
    /// Sink topic partition count
    pub const SINK_PARTITIONS: &str = "sink/partitions";
    /// Sink topic replication factor
    pub const SINK_REPLICAS: &str = "sink/replicas";
    /// Sink topic retention in milliseconds (number or numeric string)
    pub const SINK_RETENTION_MS: &str = "sink/retentionMs";
    /// Sink cleanup policy
    pub const SINK_CLEANUP_POLICY: &str = "sink/cleanupPolicy";
    /// Sink cleanup policy, dotted spelling
    pub const SINK_CLEANUP_POLICY_DOTTED: &str = "sink/cleanup.policy";
    /// Value schema full name for the WITH clause
    pub const VALUE_SCHEMA_FULL_NAME: &str = "valueSchemaFullName";
    /// Emit mode requested by the runtime (`"Final"`, `"Changes"`)
    pub const EMIT: &str = "emit";
    /// Per-alias hub overrides
    pub const SELECT_OVERRIDES: &str = "select/overrides";
    /// Aliases dropped from the generated SELECT
    pub const SELECT_EXCLUDE: &str = "select/exclude";
    /// Columns known to exist on the hub rows stream
    pub const HUB_AVAILABLE_COLUMNS: &str = "hub/availableColumns";
}

/// Side-channel values plus memoized derived data.
#[derive(Debug, Clone, Default)]
pub struct Extras {
    values: BTreeMap<String, Value>,
    projection: OnceLock<ProjectionMetadata>,
    hub_selection: OnceLock<HubSelection>,
}

impl PartialEq for Extras {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Extras {
    /// Empty side channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one value.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces one value.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// True when `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of raw values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no raw values are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn positive(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .filter(|v| *v > 0)
    }

    /// Positive partition count.
    #[must_use]
    pub fn sink_partitions(&self) -> Option<u32> {
        self.positive(keys::SINK_PARTITIONS)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Positive replication factor.
    #[must_use]
    pub fn sink_replicas(&self) -> Option<u32> {
        self.positive(keys::SINK_REPLICAS)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Positive retention, from a number or a numeric string.
    #[must_use]
    pub fn retention_ms(&self) -> Option<u64> {
        self.positive(keys::SINK_RETENTION_MS)
    }

    /// Cleanup policy; the camel-case key wins over the dotted one.
    #[must_use]
    pub fn cleanup_policy(&self) -> Option<&str> {
        self.text(keys::SINK_CLEANUP_POLICY)
            .or_else(|| self.text(keys::SINK_CLEANUP_POLICY_DOTTED))
    }

    /// Value schema full name.
    #[must_use]
    pub fn value_schema_full_name(&self) -> Option<&str> {
        self.text(keys::VALUE_SCHEMA_FULL_NAME)
    }

    /// Requested emit mode.
    #[must_use]
    pub fn emit(&self) -> Option<&str> {
        self.text(keys::EMIT)
    }

    /// True when a finalized emit was requested.
    #[must_use]
    pub fn has_emit_final(&self) -> bool {
        self.emit()
            .is_some_and(|e| e.to_ascii_uppercase().contains("FINAL"))
    }

    fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StatementError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| StatementError::Extras {
                key: key.to_string(),
                source,
            })
    }

    /// Per-alias hub overrides supplied by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StatementError::Extras`] when the entry is not an object of
    /// override records.
    pub fn select_overrides(&self) -> Result<BTreeMap<String, HubOverride>, StatementError> {
        Ok(self.decode(keys::SELECT_OVERRIDES)?.unwrap_or_default())
    }

    /// Aliases the caller wants dropped from SELECT.
    ///
    /// # Errors
    ///
    /// Returns [`StatementError::Extras`] when the entry is not a string array.
    pub fn select_exclude(&self) -> Result<BTreeSet<String>, StatementError> {
        Ok(self.decode(keys::SELECT_EXCLUDE)?.unwrap_or_default())
    }

    /// Columns of the hub rows stream, when the caller knows them.
    ///
    /// # Errors
    ///
    /// Returns [`StatementError::Extras`] when the entry is not a string array.
    pub fn hub_available_columns(&self) -> Result<Option<BTreeSet<String>>, StatementError> {
        self.decode(keys::HUB_AVAILABLE_COLUMNS)
    }

    /// Caller-supplied selection (overrides and exclusions together).
    ///
    /// # Errors
    ///
    /// See [`Self::select_overrides`] and [`Self::select_exclude`].
    pub fn caller_selection(&self) -> Result<HubSelection, StatementError> {
        Ok(HubSelection {
            overrides: self.select_overrides()?,
            exclude: self.select_exclude()?,
        })
    }

    /// Memoized projection metadata, if computed.
    #[must_use]
    pub fn projection(&self) -> Option<&ProjectionMetadata> {
        self.projection.get()
    }

    /// Memoized projection metadata, computing it on first use.
    pub fn projection_or_init(
        &self,
        init: impl FnOnce() -> ProjectionMetadata,
    ) -> &ProjectionMetadata {
        self.projection.get_or_init(init)
    }

    pub(crate) fn set_projection(&mut self, meta: ProjectionMetadata) {
        self.projection = OnceLock::from(meta);
    }

    /// Memoized derived hub selection, if computed.
    #[must_use]
    pub fn hub_selection(&self) -> Option<&HubSelection> {
        self.hub_selection.get()
    }

    /// Memoized derived hub selection, computing it on first use.
    pub fn hub_selection_or_init(&self, init: impl FnOnce() -> HubSelection) -> &HubSelection {
        self.hub_selection.get_or_init(init)
    }
}
