//! Compiler configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default decimal precision.
pub const DEFAULT_DECIMAL_PRECISION: u8 = 18;

/// Default decimal scale.
pub const DEFAULT_DECIMAL_SCALE: u8 = 2;

/// Default join time bound, in seconds.
pub const DEFAULT_WITHIN_SECONDS: u64 = 300;

/// Suffix of derived per-second rows streams.
pub const DEFAULT_HUB_ROWS_SUFFIX: &str = "_1s_rows";

/// Maximum number of GROUP BY keys.
pub const DEFAULT_MAX_GROUP_BY_KEYS: usize = 10;

/// Precision/scale pair for one decimal column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalSetting {
    /// Total digits
    pub precision: u8,
    /// Digits after the point
    pub scale: u8,
}

/// Decimal precision defaults plus per-member overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimalConfig {
    /// Precision used when nothing more specific is known
    pub precision: u8,
    /// Scale used when nothing more specific is known
    pub scale: u8,
    /// Overrides keyed by `"Entity.Property"`
    pub overrides: BTreeMap<String, DecimalSetting>,
}

impl Default for DecimalConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_DECIMAL_PRECISION,
            scale: DEFAULT_DECIMAL_SCALE,
            overrides: BTreeMap::new(),
        }
    }
}

impl DecimalConfig {
    /// Precision and scale for `entity.property`, falling back to the
    /// defaults. The lookup ignores case.
    #[must_use]
    pub fn resolve(&self, entity: &str, property: &str) -> DecimalSetting {
        let key = format!("{entity}.{property}");
        self.overrides
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
            .map_or(
                DecimalSetting {
                    precision: self.precision,
                    scale: self.scale,
                },
                |(_, v)| *v,
            )
    }

    /// `DECIMAL(p, s)` with the default precision and scale.
    #[must_use]
    pub fn default_sql_type(&self) -> String {
        format!("DECIMAL({}, {})", self.precision, self.scale)
    }
}

/// Settings shared by every compile call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Decimal precision defaults and overrides
    pub decimal: DecimalConfig,
    /// WITHIN used for two-source joins without an explicit bound
    pub default_within_seconds: u64,
    /// Source-name suffix identifying per-second rows streams
    pub hub_rows_suffix: String,
    /// Upper bound on GROUP BY keys
    pub max_group_by_keys: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            decimal: DecimalConfig::default(),
            default_within_seconds: DEFAULT_WITHIN_SECONDS,
            hub_rows_suffix: DEFAULT_HUB_ROWS_SUFFIX.to_string(),
            max_group_by_keys: DEFAULT_MAX_GROUP_BY_KEYS,
        }
    }
}

impl CompilerConfig {
    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// True when `name` ends with the per-second rows suffix.
    #[must_use]
    pub fn is_hub_rows_source(&self, name: &str) -> bool {
        let suffix = self.hub_rows_suffix.to_ascii_lowercase();
        !suffix.is_empty() && name.to_ascii_lowercase().ends_with(&suffix)
    }
}
