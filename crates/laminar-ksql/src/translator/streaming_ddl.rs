//! Sink DDL fragments: object kind and the `WITH (...)` property list.
//!
//! ```text
//! CREATE TABLE IF NOT EXISTS bar_1m WITH (
//!     KAFKA_TOPIC='bar_1m', KEY_FORMAT='AVRO', VALUE_FORMAT='AVRO',
//!     PARTITIONS=1, REPLICAS=1
//! ) AS ...
//! ```
//!
//! Properties are always emitted in the same order so generated statements
//! are byte-stable.

use std::fmt;

use crate::model::Extras;

/// Default partition count for windowed sinks.
pub const DEFAULT_WINDOWED_PARTITIONS: u32 = 1;

/// Default replication factor for windowed sinks.
pub const DEFAULT_WINDOWED_REPLICAS: u32 = 1;

/// Materialization of the created object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Append-only stream
    Stream,
    /// Changelog table
    Table,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stream => "STREAM",
            Self::Table => "TABLE",
        })
    }
}

/// Sink topic settings taken from the model's side channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkOptions {
    /// Partition count
    pub partitions: Option<u32>,
    /// Replication factor
    pub replicas: Option<u32>,
    /// Retention in milliseconds
    pub retention_ms: Option<u64>,
    /// Cleanup policy
    pub cleanup_policy: Option<String>,
    /// Value schema full name
    pub value_schema_full_name: Option<String>,
}

impl SinkOptions {
    /// Reads the well-known sink keys.
    #[must_use]
    pub fn from_extras(extras: &Extras) -> Self {
        Self {
            partitions: extras.sink_partitions(),
            replicas: extras.sink_replicas(),
            retention_ms: extras.retention_ms(),
            cleanup_policy: extras.cleanup_policy().map(str::to_string),
            value_schema_full_name: extras.value_schema_full_name().map(str::to_string),
        }
    }

    /// Fills unset partitions and replicas with the windowed defaults.
    #[must_use]
    pub fn with_default_sizing(mut self) -> Self {
        self.partitions.get_or_insert(DEFAULT_WINDOWED_PARTITIONS);
        self.replicas.get_or_insert(DEFAULT_WINDOWED_REPLICAS);
        self
    }
}

/// `WITH (...)` property list of a CREATE statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithClause {
    /// Sink topic
    pub kafka_topic: String,
    /// `CLEANUP_POLICY`
    pub cleanup_policy: Option<String>,
    /// Emit `KEY_FORMAT` (some source declares keys)
    pub has_key: bool,
    /// `KEY_AVRO_SCHEMA_FULL_NAME`, only emitted with keys
    pub key_schema_full_name: Option<String>,
    /// `VALUE_AVRO_SCHEMA_FULL_NAME`
    pub value_schema_full_name: Option<String>,
    /// `TIMESTAMP` column
    pub timestamp_column: Option<String>,
    /// `PARTITIONS`
    pub partitions: Option<u32>,
    /// `REPLICAS`
    pub replicas: Option<u32>,
    /// `RETENTION_MS`
    pub retention_ms: Option<u64>,
}

impl WithClause {
    /// Clause for `topic` with only the value format set.
    #[must_use]
    pub fn new(topic: &str) -> Self {
        Self {
            kafka_topic: topic.to_string(),
            ..Self::default()
        }
    }

    /// Sets whether key formats are emitted.
    #[must_use]
    pub fn with_key(mut self, has_key: bool) -> Self {
        self.has_key = has_key;
        self
    }

    /// Sets the key schema full name.
    #[must_use]
    pub fn with_key_schema(mut self, name: Option<&str>) -> Self {
        self.key_schema_full_name = non_blank(name);
        self
    }

    /// Sets the value schema full name.
    #[must_use]
    pub fn with_value_schema(mut self, name: Option<&str>) -> Self {
        self.value_schema_full_name = non_blank(name);
        self
    }

    /// Sets the record timestamp column.
    #[must_use]
    pub fn with_timestamp(mut self, column: Option<&str>) -> Self {
        self.timestamp_column = non_blank(column);
        self
    }

    /// Applies sink sizing and cleanup policy. An explicit value schema
    /// already set on the clause wins over the side channel.
    #[must_use]
    pub fn with_sink(mut self, sink: &SinkOptions) -> Self {
        if self.cleanup_policy.is_none() {
            self.cleanup_policy.clone_from(&sink.cleanup_policy);
        }
        if self.value_schema_full_name.is_none() {
            self.value_schema_full_name.clone_from(&sink.value_schema_full_name);
        }
        self.partitions = sink.partitions.filter(|p| *p > 0);
        self.replicas = sink.replicas.filter(|r| *r > 0);
        self
    }

    /// Sets retention; zero is ignored.
    #[must_use]
    pub fn with_retention(mut self, retention_ms: Option<u64>) -> Self {
        self.retention_ms = retention_ms.filter(|r| *r > 0);
        self
    }

    /// Sets the cleanup policy; blank is ignored.
    #[must_use]
    pub fn with_cleanup_policy(mut self, policy: Option<&str>) -> Self {
        self.cleanup_policy = non_blank(policy);
        self
    }

    /// Properties in emission order.
    #[must_use]
    pub fn parts(&self) -> Vec<String> {
        let mut parts = vec![format!("KAFKA_TOPIC='{}'", self.kafka_topic)];
        if let Some(policy) = &self.cleanup_policy {
            parts.push(format!("CLEANUP_POLICY='{policy}'"));
        }
        if self.has_key {
            parts.push("KEY_FORMAT='AVRO'".to_string());
        }
        parts.push("VALUE_FORMAT='AVRO'".to_string());
        if let (true, Some(key_schema)) = (self.has_key, &self.key_schema_full_name) {
            parts.push(format!("KEY_AVRO_SCHEMA_FULL_NAME='{key_schema}'"));
        }
        if let Some(value_schema) = &self.value_schema_full_name {
            parts.push(format!("VALUE_AVRO_SCHEMA_FULL_NAME='{value_schema}'"));
        }
        if let Some(ts) = &self.timestamp_column {
            parts.push(format!("TIMESTAMP='{ts}'"));
        }
        if let Some(p) = self.partitions {
            parts.push(format!("PARTITIONS={p}"));
        }
        if let Some(r) = self.replicas {
            parts.push(format!("REPLICAS={r}"));
        }
        if let Some(ms) = self.retention_ms {
            parts.push(format!("RETENTION_MS={ms}"));
        }
        parts
    }

    /// `WITH (a, b, ...)`
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!("WITH ({})", self.parts().join(", "))
    }
}

impl fmt::Display for WithClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::keys;

    #[test]
    fn test_minimal_clause() {
        assert_eq!(
            WithClause::new("orders_out").to_sql(),
            "WITH (KAFKA_TOPIC='orders_out', VALUE_FORMAT='AVRO')"
        );
    }

    #[test]
    fn test_full_clause_order() {
        let sink = SinkOptions {
            partitions: Some(3),
            replicas: Some(2),
            retention_ms: Some(1000),
            cleanup_policy: Some("compact".to_string()),
            value_schema_full_name: None,
        };
        let clause = WithClause::new("bar_1m")
            .with_key(true)
            .with_key_schema(Some("fx.BarKey"))
            .with_value_schema(Some("fx.BarValue"))
            .with_timestamp(Some("BucketStart"))
            .with_sink(&sink)
            .with_retention(sink.retention_ms);
        assert_eq!(
            clause.to_sql(),
            "WITH (KAFKA_TOPIC='bar_1m', CLEANUP_POLICY='compact', KEY_FORMAT='AVRO', \
             VALUE_FORMAT='AVRO', KEY_AVRO_SCHEMA_FULL_NAME='fx.BarKey', \
             VALUE_AVRO_SCHEMA_FULL_NAME='fx.BarValue', TIMESTAMP='BucketStart', \
             PARTITIONS=3, REPLICAS=2, RETENTION_MS=1000)"
        );
    }

    #[test]
    fn test_key_schema_needs_keys() {
        let clause = WithClause::new("t").with_key_schema(Some("fx.Key"));
        assert!(!clause.to_sql().contains("KEY_AVRO_SCHEMA_FULL_NAME"));
    }

    #[test]
    fn test_sink_options_from_extras() {
        let extras = Extras::new()
            .with(keys::SINK_PARTITIONS, 6)
            .with(keys::VALUE_SCHEMA_FULL_NAME, "fx.Rate")
            .with(keys::SINK_CLEANUP_POLICY_DOTTED, "delete");
        let sink = SinkOptions::from_extras(&extras);
        assert_eq!(sink.partitions, Some(6));
        assert_eq!(sink.replicas, None);

        let clause = WithClause::new("t")
            .with_value_schema(Some("explicit.Name"))
            .with_sink(&sink);
        assert_eq!(clause.value_schema_full_name.as_deref(), Some("explicit.Name"));
        assert_eq!(clause.cleanup_policy.as_deref(), Some("delete"));

        let defaults = SinkOptions::default().with_default_sizing();
        assert_eq!((defaults.partitions, defaults.replicas), (Some(1), Some(1)));
    }

    #[test]
    fn test_explicit_cleanup_wins() {
        let sink = SinkOptions {
            cleanup_policy: Some("delete".to_string()),
            ..SinkOptions::default()
        };
        let clause = WithClause::new("t")
            .with_cleanup_policy(Some(" compact "))
            .with_sink(&sink);
        assert_eq!(clause.cleanup_policy.as_deref(), Some("compact"));
    }

    #[test]
    fn test_object_kind_display() {
        assert_eq!(ObjectKind::Table.to_string(), "TABLE");
        assert_eq!(ObjectKind::Stream.to_string(), "STREAM");
    }
}
