//! Source type descriptors.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::config::DecimalSetting;
use crate::expr::{sanitize_upper, ValueType};

/// Declared materialization of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Append-only stream
    #[default]
    Stream,
    /// Changelog table keyed by its key columns
    Table,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stream" => Ok(Self::Stream),
            "table" => Ok(Self::Table),
            other => Err(format!(
                "Unknown source kind: '{other}'. Valid values: stream, table"
            )),
        }
    }
}

/// One column of a source type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Property name, original casing
    pub name: String,
    /// Property type
    pub ty: ValueType,
    /// Position in the key, `None` for value columns
    pub key_order: Option<usize>,
    /// Declared decimal precision/scale
    pub decimal: Option<DecimalSetting>,
}

/// Metadata view of a source record type.
///
/// ```
/// use laminar_ksql::expr::ValueType;
/// use laminar_ksql::model::{SourceDescriptor, SourceKind};
///
/// let orders = SourceDescriptor::new("Order")
///     .with_topic("orders")
///     .with_kind(SourceKind::Table)
///     .with_key("Id", ValueType::Int)
///     .with_column("Amount", ValueType::Decimal);
/// assert_eq!(orders.source_name(), "ORDERS");
/// assert_eq!(orders.key_names(), vec!["ID".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    /// Record type name
    pub type_name: String,
    /// Declared topic, if any
    pub topic: Option<String>,
    /// Stream or table
    pub kind: SourceKind,
    /// Columns in declaration order
    pub columns: Vec<ColumnDescriptor>,
}

impl SourceDescriptor {
    /// Stream source with no columns.
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            topic: None,
            kind: SourceKind::Stream,
            columns: Vec::new(),
        }
    }

    /// Sets the declared topic.
    #[must_use]
    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    /// Sets the declared kind.
    #[must_use]
    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Adds a value column.
    #[must_use]
    pub fn with_column(mut self, name: &str, ty: ValueType) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.to_string(),
            ty,
            key_order: None,
            decimal: None,
        });
        self
    }

    /// Adds a key column after any existing key columns.
    #[must_use]
    pub fn with_key(mut self, name: &str, ty: ValueType) -> Self {
        let order = self.columns.iter().filter(|c| c.key_order.is_some()).count();
        self.columns.push(ColumnDescriptor {
            name: name.to_string(),
            ty,
            key_order: Some(order),
            decimal: None,
        });
        self
    }

    /// Adds a decimal value column with explicit precision and scale.
    #[must_use]
    pub fn with_decimal(mut self, name: &str, precision: u8, scale: u8) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.to_string(),
            ty: ValueType::Decimal,
            key_order: None,
            decimal: Some(DecimalSetting { precision, scale }),
        });
        self
    }

    /// True for table sources.
    #[must_use]
    pub fn is_table(&self) -> bool {
        self.kind == SourceKind::Table
    }

    /// Identifier used in FROM: the upper-cased topic when declared,
    /// otherwise the type name.
    #[must_use]
    pub fn source_name(&self) -> String {
        match &self.topic {
            Some(topic) if !topic.trim().is_empty() => topic.to_ascii_uppercase(),
            _ => self.type_name.clone(),
        }
    }

    /// Key columns in key order.
    #[must_use]
    pub fn key_columns(&self) -> Vec<&ColumnDescriptor> {
        let mut keys: Vec<&ColumnDescriptor> =
            self.columns.iter().filter(|c| c.key_order.is_some()).collect();
        keys.sort_by_key(|c| c.key_order);
        keys
    }

    /// Upper-cased key column names in key order.
    #[must_use]
    pub fn key_names(&self) -> Vec<String> {
        self.key_columns()
            .into_iter()
            .map(|c| c.name.to_ascii_uppercase())
            .collect()
    }

    /// True when any key column is declared.
    #[must_use]
    pub fn has_keys(&self) -> bool {
        self.columns.iter().any(|c| c.key_order.is_some())
    }

    /// Sanitized upper-case identifiers of every column.
    #[must_use]
    pub fn column_identifiers(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| sanitize_upper(&c.name)).collect()
    }

    /// Column by name, ignoring case.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_name_prefers_topic() {
        let s = SourceDescriptor::new("Trade");
        assert_eq!(s.source_name(), "Trade");
        let s = s.with_topic("trades-raw");
        assert_eq!(s.source_name(), "TRADES-RAW");
    }

    #[test]
    fn test_key_order_is_preserved() {
        let s = SourceDescriptor::new("Bar")
            .with_key("Broker", ValueType::String)
            .with_column("Close", ValueType::Double)
            .with_key("Symbol", ValueType::String);
        assert_eq!(s.key_names(), vec!["BROKER", "SYMBOL"]);
        assert!(s.has_keys());
    }

    #[test]
    fn test_column_identifiers_are_sanitized() {
        let s = SourceDescriptor::new("X")
            .with_column("unit-price", ValueType::Double)
            .with_column("Qty", ValueType::Int);
        let ids = s.column_identifiers();
        assert!(ids.contains("UNIT_PRICE"));
        assert!(ids.contains("QTY"));
    }

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("TABLE".parse::<SourceKind>().unwrap(), SourceKind::Table);
        let err = "view".parse::<SourceKind>().unwrap_err();
        assert!(err.contains("Valid values"));
    }
}
