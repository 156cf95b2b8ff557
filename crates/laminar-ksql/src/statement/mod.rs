//! Statement compilers.
//!
//! [`StatementCompiler`] turns a finished [`QueryModel`] into one complete
//! statement:
//!
//! ```text
//! create           CREATE {STREAM|TABLE} IF NOT EXISTS t WITH (...) AS SELECT ...
//! create_windowed  same, with WINDOW TUMBLING/HOPPING injected after FROM
//! create_hopping   same, with the model's own hopping window
//! create_all       one windowed statement per model timeframe
//! insert           INSERT INTO t SELECT ...
//! ```
//!
//! Every entry point takes the [`ModelScope`] opened for the model being
//! compiled. Compiling never changes the model; derived projection data is
//! memoized in its [`Extras`](crate::model::Extras).

mod create;
mod insert;
mod partition;
mod rewrite;
mod windowed;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::FunctionCatalog;
use crate::clause::ResultType;
use crate::config::CompilerConfig;
use crate::model::SourceDescriptor;
use crate::translator::ExpressionTranslator;

/// How key columns of a source are referenced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyPathStyle {
    /// Plain or alias-qualified column name
    #[default]
    None,
    /// `key.COL`
    Dot,
    /// `KEY->COL`
    Arrow,
}

/// Rendering switches for one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Key path style; `None` picks `Arrow` for table sources.
    pub key_path_style: KeyPathStyle,
    /// Output record used for decimal cast hints
    pub result_type: Option<ResultType>,
}

impl RenderOptions {
    /// Forces a key path style for every source.
    #[must_use]
    pub fn with_key_path_style(mut self, style: KeyPathStyle) -> Self {
        self.key_path_style = style;
        self
    }

    /// Casts decimal members of `result` explicitly.
    #[must_use]
    pub fn with_result_type(mut self, result: ResultType) -> Self {
        self.result_type = Some(result);
        self
    }
}

/// Maps a source to the identifier used in FROM.
pub type SourceResolver = Arc<dyn Fn(&SourceDescriptor) -> String + Send + Sync>;

fn resolve_sources(sources: &[SourceDescriptor], resolver: Option<&SourceResolver>) -> Vec<String> {
    sources
        .iter()
        .map(|s| resolver.map_or_else(|| s.source_name(), |r| r(s)))
        .collect()
}

/// Target of a `CREATE ... AS SELECT`.
#[derive(Clone, Default)]
pub struct CreateTarget {
    /// Object and topic name
    pub name: String,
    /// `KEY_AVRO_SCHEMA_FULL_NAME`
    pub key_schema_full_name: Option<String>,
    /// `VALUE_AVRO_SCHEMA_FULL_NAME`
    pub value_schema_full_name: Option<String>,
    /// Comma-separated PARTITION BY columns
    pub partition_by: Option<String>,
    /// `CLEANUP_POLICY`
    pub cleanup_policy: Option<String>,
    /// `TIMESTAMP` column
    pub timestamp_column: Option<String>,
    /// Rendering switches
    pub options: RenderOptions,
    /// FROM identifier override
    pub source_resolver: Option<SourceResolver>,
}

impl fmt::Debug for CreateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateTarget")
            .field("name", &self.name)
            .field("key_schema_full_name", &self.key_schema_full_name)
            .field("value_schema_full_name", &self.value_schema_full_name)
            .field("partition_by", &self.partition_by)
            .field("cleanup_policy", &self.cleanup_policy)
            .field("timestamp_column", &self.timestamp_column)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CreateTarget {
    /// Target named `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Sets the key schema full name.
    #[must_use]
    pub fn with_key_schema(mut self, full_name: &str) -> Self {
        self.key_schema_full_name = Some(full_name.to_string());
        self
    }

    /// Sets the value schema full name.
    #[must_use]
    pub fn with_value_schema(mut self, full_name: &str) -> Self {
        self.value_schema_full_name = Some(full_name.to_string());
        self
    }

    /// Sets the PARTITION BY column list.
    #[must_use]
    pub fn with_partition_by(mut self, columns: &str) -> Self {
        self.partition_by = Some(columns.to_string());
        self
    }

    /// Sets the cleanup policy.
    #[must_use]
    pub fn with_cleanup_policy(mut self, policy: &str) -> Self {
        self.cleanup_policy = Some(policy.to_string());
        self
    }

    /// Sets the record timestamp column.
    #[must_use]
    pub fn with_timestamp(mut self, column: &str) -> Self {
        self.timestamp_column = Some(column.to_string());
        self
    }

    /// Sets rendering switches.
    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Overrides how sources are named in FROM.
    #[must_use]
    pub fn with_source_resolver(
        mut self,
        resolver: impl Fn(&SourceDescriptor) -> String + Send + Sync + 'static,
    ) -> Self {
        self.source_resolver = Some(Arc::new(resolver));
        self
    }
}

/// Target of a windowed `CREATE TABLE ... AS SELECT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowedTarget {
    /// Object and topic name
    pub name: String,
    /// Window size token, e.g. `5m`
    pub timeframe: String,
    /// Replaces `EMIT CHANGES`
    pub emit_override: Option<String>,
    /// Replaces the primary FROM identifier
    pub input_override: Option<String>,
    /// Renders a hopping window advancing by this interval
    pub hop_interval: Option<Duration>,
    /// Rendering switches
    pub options: RenderOptions,
}

impl WindowedTarget {
    /// Tumbling window target.
    #[must_use]
    pub fn new(name: &str, timeframe: &str) -> Self {
        Self {
            name: name.to_string(),
            timeframe: timeframe.to_string(),
            ..Self::default()
        }
    }

    /// Sets the emit clause, e.g. `EMIT FINAL`.
    #[must_use]
    pub fn with_emit(mut self, emit: &str) -> Self {
        self.emit_override = Some(emit.to_string());
        self
    }

    /// Reads from `source` instead of the model's primary source.
    #[must_use]
    pub fn with_input(mut self, source: &str) -> Self {
        self.input_override = Some(source.to_string());
        self
    }

    /// Switches to a hopping window.
    #[must_use]
    pub fn with_hop(mut self, interval: Duration) -> Self {
        self.hop_interval = Some(interval);
        self
    }

    /// Sets rendering switches.
    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }
}

/// Target of a CREATE over the model's own hopping window.
#[derive(Debug, Clone, Default)]
pub struct HoppingTarget {
    /// Base target
    pub target: CreateTarget,
    /// Replaces `EMIT CHANGES`
    pub emit_override: Option<String>,
    /// Replaces the primary FROM identifier
    pub input_override: Option<String>,
}

impl HoppingTarget {
    /// Target named `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::from(CreateTarget::new(name))
    }

    /// Sets the emit clause.
    #[must_use]
    pub fn with_emit(mut self, emit: &str) -> Self {
        self.emit_override = Some(emit.to_string());
        self
    }

    /// Reads from `source` instead of the model's primary source.
    #[must_use]
    pub fn with_input(mut self, source: &str) -> Self {
        self.input_override = Some(source.to_string());
        self
    }
}

impl From<CreateTarget> for HoppingTarget {
    fn from(target: CreateTarget) -> Self {
        Self {
            target,
            emit_override: None,
            input_override: None,
        }
    }
}

/// Target of an `INSERT INTO ... SELECT`.
#[derive(Clone, Default)]
pub struct InsertTarget {
    /// Existing stream or table
    pub name: String,
    /// FROM identifier override
    pub source_resolver: Option<SourceResolver>,
}

impl fmt::Debug for InsertTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertTarget")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl InsertTarget {
    /// Target named `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source_resolver: None,
        }
    }

    /// Overrides how sources are named in FROM.
    #[must_use]
    pub fn with_source_resolver(
        mut self,
        resolver: impl Fn(&SourceDescriptor) -> String + Send + Sync + 'static,
    ) -> Self {
        self.source_resolver = Some(Arc::new(resolver));
        self
    }
}

/// Compiles query models into statements.
///
/// The compiler holds no per-statement state; one instance can serve any
/// number of models.
#[derive(Debug, Clone)]
pub struct StatementCompiler<'a> {
    catalog: &'a FunctionCatalog,
    config: CompilerConfig,
}

impl<'a> StatementCompiler<'a> {
    /// Compiler over `catalog` with `config`.
    #[must_use]
    pub fn new(catalog: &'a FunctionCatalog, config: CompilerConfig) -> Self {
        Self { catalog, config }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Function catalog used for translation.
    #[must_use]
    pub fn catalog(&self) -> &'a FunctionCatalog {
        self.catalog
    }

    fn translator(&self) -> ExpressionTranslator<'_> {
        ExpressionTranslator::new(self.catalog, &self.config.decimal)
    }
}

impl Default for StatementCompiler<'static> {
    fn default() -> Self {
        Self::new(FunctionCatalog::builtin(), CompilerConfig::default())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;

    #[test]
    fn test_resolve_sources_default_and_override() {
        let sources = vec![
            SourceDescriptor::new("Trade").with_topic("trades"),
            SourceDescriptor::new("Quote").with_kind(SourceKind::Table),
        ];
        assert_eq!(resolve_sources(&sources, None), vec!["TRADES", "Quote"]);

        let resolver: SourceResolver = Arc::new(|s| format!("{}_v2", s.source_name()));
        assert_eq!(
            resolve_sources(&sources, Some(&resolver)),
            vec!["TRADES_v2", "Quote_v2"]
        );
    }

    #[test]
    fn test_target_builders() {
        let target = CreateTarget::new("orders_by_id")
            .with_partition_by("o.Id")
            .with_key_schema("com.acme.OrderKey")
            .with_source_resolver(|s| s.source_name().to_lowercase());
        assert_eq!(target.partition_by.as_deref(), Some("o.Id"));
        assert!(target.source_resolver.is_some());
        assert!(format!("{target:?}").contains("orders_by_id"));

        let windowed = WindowedTarget::new("bar_1m_live", "1m")
            .with_emit("EMIT FINAL")
            .with_hop(Duration::from_secs(60));
        assert_eq!(windowed.emit_override.as_deref(), Some("EMIT FINAL"));
        assert_eq!(windowed.hop_interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" EMIT FINAL ")), Some("EMIT FINAL"));
        assert_eq!(non_blank(None), None);
    }
}
