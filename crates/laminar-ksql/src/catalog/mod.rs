//! Function catalog
//!
//! Maps host method names to dialect function syntax. The catalog is an
//! immutable value: [`FunctionCatalog::builtin`] is shared process-wide and
//! [`CatalogBuilder`] derives extended copies without touching it.

mod builtin;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::LazyLock;

use crate::config::DecimalConfig;
use crate::error::{ArgRange, TranslateError};

static BUILTIN: LazyLock<FunctionCatalog> = LazyLock::new(|| FunctionCatalog {
    mappings: builtin::mappings()
        .into_iter()
        .map(|(name, m)| (name.to_string(), m))
        .collect(),
});

/// How one host method renders in the dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMapping {
    /// Dialect function name (or the template text for template-only entries)
    pub function: String,
    /// Minimum effective argument count
    pub min_args: usize,
    /// Maximum effective argument count; `None` for variadic
    pub max_args: Option<usize>,
    /// Positional template (`{0}`, `{1}`, ...) used instead of `FUNC(args)`
    pub template: Option<String>,
    /// May appear in GROUP BY
    pub allowed_in_group_by: bool,
    /// May appear in ORDER BY
    pub allowed_in_order_by: bool,
    /// Rendered by a dedicated handler in the translator
    pub special: bool,
}

impl FunctionMapping {
    /// Mapping taking exactly `args` arguments.
    #[must_use]
    pub fn exact(function: &str, args: usize) -> Self {
        Self::range(function, args, Some(args))
    }

    /// Mapping taking between `min` and `max` arguments.
    #[must_use]
    pub fn range(function: &str, min: usize, max: Option<usize>) -> Self {
        Self {
            function: function.to_string(),
            min_args: min,
            max_args: max,
            template: None,
            allowed_in_group_by: false,
            allowed_in_order_by: false,
            special: false,
        }
    }

    /// Renders through `template` instead of `FUNC(args)`.
    #[must_use]
    pub fn with_template(mut self, template: &str) -> Self {
        self.template = Some(template.to_string());
        self
    }

    /// Allows use in GROUP BY.
    #[must_use]
    pub fn group_by(mut self) -> Self {
        self.allowed_in_group_by = true;
        self
    }

    /// Allows use in ORDER BY.
    #[must_use]
    pub fn order_by(mut self) -> Self {
        self.allowed_in_order_by = true;
        self
    }

    /// Routes rendering through a translator handler.
    #[must_use]
    pub fn special(mut self) -> Self {
        self.special = true;
        self
    }

    /// Accepted argument bounds.
    #[must_use]
    pub fn arg_range(&self) -> ArgRange {
        ArgRange {
            min: self.min_args,
            max: self.max_args,
        }
    }

    /// True when `count` lies within the bounds.
    #[must_use]
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// Renders a call with already-translated arguments.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError::ArgumentCount`] when `args` is out of bounds.
    pub fn render(&self, args: &[String]) -> Result<String, TranslateError> {
        if !self.accepts(args.len()) {
            return Err(TranslateError::ArgumentCount {
                method: self.function.clone(),
                expected: self.arg_range(),
                actual: args.len(),
            });
        }

        match &self.template {
            Some(template) => {
                let mut out = template.clone();
                for (i, arg) in args.iter().enumerate() {
                    out = out.replace(&format!("{{{i}}}"), arg);
                }
                Ok(out)
            }
            None => Ok(format!("{}({})", self.function, args.join(", "))),
        }
    }
}

/// Functional grouping of catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionCategory {
    /// Text functions
    String,
    /// Numeric functions
    Math,
    /// Date/time functions
    Date,
    /// Aggregates
    Aggregate,
    /// Array functions
    Array,
    /// JSON functions
    Json,
    /// Type conversions
    Cast,
    /// CASE/COALESCE and friends
    Conditional,
    /// URL parsing
    Url,
    /// Geospatial
    Geo,
    /// Hashes
    Crypto,
    /// Window and row metadata
    Window,
}

impl FunctionCategory {
    /// All categories in listing order.
    pub const ALL: [FunctionCategory; 12] = [
        Self::String,
        Self::Math,
        Self::Date,
        Self::Aggregate,
        Self::Array,
        Self::Json,
        Self::Cast,
        Self::Conditional,
        Self::Url,
        Self::Geo,
        Self::Crypto,
        Self::Window,
    ];

    /// Method names belonging to this category.
    #[must_use]
    pub fn members(self) -> &'static [&'static str] {
        builtin::category_members(self)
    }

    /// Display label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Math => "Math",
            Self::Date => "Date",
            Self::Aggregate => "Aggregate",
            Self::Array => "Array",
            Self::Json => "JSON",
            Self::Cast => "Cast",
            Self::Conditional => "Conditional",
            Self::Url => "URL",
            Self::Geo => "GEO",
            Self::Crypto => "Crypto",
            Self::Window => "Window",
        }
    }
}

/// Immutable method-name to mapping table.
#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    mappings: BTreeMap<String, FunctionMapping>,
}

impl FunctionCatalog {
    /// Shared built-in catalog.
    #[must_use]
    pub fn builtin() -> &'static FunctionCatalog {
        &BUILTIN
    }

    /// Mapping for `method`, if any. Lookup is case-sensitive.
    #[must_use]
    pub fn get(&self, method: &str) -> Option<&FunctionMapping> {
        self.mappings.get(method)
    }

    /// True when `method` has a mapping.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.mappings.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// True when the catalog has no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// True for methods in the aggregate category.
    #[must_use]
    pub fn is_aggregate(&self, method: &str) -> bool {
        FunctionCategory::Aggregate
            .members()
            .iter()
            .any(|m| *m == method)
    }

    /// Methods whose mapping needs a dedicated translator handler.
    #[must_use]
    pub fn special_handling(&self) -> Vec<&str> {
        self.mappings
            .iter()
            .filter(|(_, m)| m.special)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Mapped methods outside every category, sorted.
    #[must_use]
    pub fn uncategorized(&self) -> Vec<&str> {
        self.names()
            .filter(|name| {
                !FunctionCategory::ALL
                    .iter()
                    .any(|c| c.members().iter().any(|m| m == name))
            })
            .collect()
    }

    /// Dialect type inferred from a method name, used for `To*` casts and
    /// aggregate result typing.
    #[must_use]
    pub fn infer_type(method: &str, decimal: &DecimalConfig) -> String {
        match method.to_ascii_uppercase().as_str() {
            "SUM" | "AVG" | "TODOUBLE" => "DOUBLE".to_string(),
            "COUNT" | "TOLONG" | "TOINT64" => "BIGINT".to_string(),
            "MAX" | "MIN" => "ANY".to_string(),
            "TOPK" => "ARRAY".to_string(),
            "HISTOGRAM" => "MAP".to_string(),
            "TOINT" | "TOINT32" => "INTEGER".to_string(),
            "TODECIMAL" => decimal.default_sql_type(),
            "TOSTRING" => "VARCHAR".to_string(),
            "TOBOOL" | "TOBOOLEAN" => "BOOLEAN".to_string(),
            _ => "UNKNOWN".to_string(),
        }
    }

    /// Closest registered name to `method`, for error hints.
    #[must_use]
    pub fn suggest(&self, method: &str) -> Option<String> {
        crate::suggest::closest_match(method, self.names(), crate::suggest::MAX_HINT_DISTANCE)
            .map(str::to_string)
    }

    /// Human-readable listing grouped by category.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "KSQL Function Registry - Supported Functions:");
        let _ = writeln!(out, "{}", "=".repeat(51));

        let line = |out: &mut String, name: &str| {
            if let Some(m) = self.get(name) {
                let max = m.max_args.map_or_else(|| "*".to_string(), |v| v.to_string());
                let _ = writeln!(
                    out,
                    "\u{2022} {name} \u{2192} {} (args: {}-{max})",
                    m.function, m.min_args
                );
            }
        };

        for category in FunctionCategory::ALL {
            let members = category.members();
            let _ = writeln!(out, "\n[{}] ({} functions)", category.label(), members.len());
            for &name in members {
                line(&mut out, name);
            }
        }

        let custom = self.uncategorized();
        if !custom.is_empty() {
            let _ = writeln!(out, "\n[Custom] ({} functions)", custom.len());
            for name in custom {
                line(&mut out, name);
            }
        }
        out
    }
}

/// Builds a catalog from an existing one plus extra mappings.
///
/// ```
/// use laminar_ksql::catalog::{CatalogBuilder, FunctionCatalog, FunctionMapping};
///
/// let catalog = CatalogBuilder::from_catalog(FunctionCatalog::builtin())
///     .with("Reverse", FunctionMapping::exact("REVERSE", 1))
///     .build();
/// assert!(catalog.contains("Reverse"));
/// assert!(!FunctionCatalog::builtin().contains("Reverse"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    mappings: BTreeMap<String, FunctionMapping>,
}

impl CatalogBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded with every mapping from `catalog`.
    #[must_use]
    pub fn from_catalog(catalog: &FunctionCatalog) -> Self {
        Self {
            mappings: catalog.mappings.clone(),
        }
    }

    /// Adds or replaces the mapping for `method`.
    #[must_use]
    pub fn with(mut self, method: &str, mapping: FunctionMapping) -> Self {
        self.mappings.insert(method.to_string(), mapping);
        self
    }

    /// Finishes the catalog.
    #[must_use]
    pub fn build(self) -> FunctionCatalog {
        FunctionCatalog {
            mappings: self.mappings,
        }
    }
}
