//! Error types for statement compilation.
//!
//! Every failure carries a stable code so callers can match on it without
//! parsing messages. Codes are grouped by family:
//!
//! | Range     | Family                                   |
//! |-----------|------------------------------------------|
//! | KSQL-1xxx | expression and function translation      |
//! | KSQL-2xxx | statement shape and preconditions        |
//! | KSQL-3xxx | compile scope usage                      |

use std::fmt;

/// Stable error codes.
pub mod codes {
    /// Method name has no mapping and no cast fallback.
    pub const UNSUPPORTED_FUNCTION: &str = "KSQL-1001";
    /// Argument count outside the mapping's bounds.
    pub const ARGUMENT_COUNT: &str = "KSQL-1002";
    /// Argument category rejected by the function.
    pub const ARGUMENT_TYPE: &str = "KSQL-1003";
    /// Host type has no dialect counterpart.
    pub const UNSUPPORTED_TYPE: &str = "KSQL-1004";
    /// Expression node cannot appear in this position.
    pub const INVALID_EXPRESSION: &str = "KSQL-1005";
    /// Clause-specific shape violation (mixing aggregates, constant keys, ...).
    pub const CLAUSE_SHAPE: &str = "KSQL-1006";

    /// No source types on the model.
    pub const MISSING_SOURCE: &str = "KSQL-2001";
    /// More than two source types.
    pub const TOO_MANY_SOURCES: &str = "KSQL-2002";
    /// Two sources but no join predicate.
    pub const MISSING_JOIN_CONDITION: &str = "KSQL-2003";
    /// Join predicate operand not bound to a declared source.
    pub const UNQUALIFIED_JOIN_COLUMN: &str = "KSQL-2004";
    /// Default WITHIN disabled and none supplied.
    pub const WITHIN_REQUIRED: &str = "KSQL-2005";
    /// Window requested without the clauses it depends on.
    pub const WINDOW_SHAPE: &str = "KSQL-2006";
    /// Target arguments missing or blank.
    pub const INVALID_TARGET: &str = "KSQL-2007";
    /// Text rewrite pattern failed to compile.
    pub const REWRITE: &str = "KSQL-2008";
    /// Extras entry has the wrong shape.
    pub const INVALID_EXTRAS: &str = "KSQL-2009";
    /// Join compiled while the primary source is unaliased.
    pub const PRIMARY_ALIAS: &str = "KSQL-2010";

    /// Scope token opened for another model.
    pub const WRONG_SCOPE: &str = "KSQL-3001";
}

/// Inclusive argument bounds; `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgRange {
    /// Minimum argument count
    pub min: usize,
    /// Maximum argument count, `None` for variadic
    pub max: Option<usize>,
}

impl fmt::Display for ArgRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}-{}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

/// Failures while translating expressions into dialect text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// No mapping and no cast fallback.
    #[error("Function '{name}' is not supported.{}", hint.as_ref().map(|h| format!(" Did you mean '{h}'?")).unwrap_or_default())]
    UnsupportedFunction {
        /// Method name as written
        name: String,
        /// Closest catalog entry, if any is near enough
        hint: Option<String>,
    },

    /// Argument count out of bounds.
    #[error("Method '{method}' expects {expected} arguments, but got {actual}")]
    ArgumentCount {
        /// Method name
        method: String,
        /// Accepted bounds
        expected: ArgRange,
        /// Effective count
        actual: usize,
    },

    /// Argument category rejected.
    #[error("Function '{function}' does not support argument type {type_name}")]
    ArgumentType {
        /// Dialect function name
        function: String,
        /// Host type name of the offending argument
        type_name: String,
    },

    /// No dialect type for a host type.
    #[error("Type '{0}' is not supported.")]
    UnsupportedType(String),

    /// Node not allowed at this position.
    #[error("{0}")]
    InvalidExpression(String),

    /// Clause-level shape violation.
    #[error("{0}")]
    Clause(String),
}

impl TranslateError {
    /// Stable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFunction { .. } => codes::UNSUPPORTED_FUNCTION,
            Self::ArgumentCount { .. } => codes::ARGUMENT_COUNT,
            Self::ArgumentType { .. } => codes::ARGUMENT_TYPE,
            Self::UnsupportedType(_) => codes::UNSUPPORTED_TYPE,
            Self::InvalidExpression(_) => codes::INVALID_EXPRESSION,
            Self::Clause(_) => codes::CLAUSE_SHAPE,
        }
    }
}

/// Statement-level precondition failures.
#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    /// Model has no sources.
    #[error("Source types are required")]
    MissingSource,

    /// More than two sources.
    #[error("Only up to 2 tables are supported in JOIN (got {0})")]
    TooManySources(usize),

    /// Join without predicate.
    #[error("Join condition required for two table join")]
    MissingJoinCondition,

    /// Predicate operand outside the declared parameters.
    #[error("Unqualified column access in JOIN condition is not allowed: {0}")]
    UnqualifiedJoinColumn(String),

    /// Join requested while the primary source is rendered without alias.
    #[error("Primary source alias missing for join condition.")]
    MissingPrimaryAlias,

    /// Default WITHIN disabled.
    #[error("Stream-Stream JOIN requires explicit Within(...) when default is disabled.")]
    WithinRequired,

    /// Window requested on a model that cannot carry it.
    #[error("{0}")]
    Window(String),

    /// Target name, timeframe or similar argument is blank.
    #[error("{0} required")]
    InvalidTarget(&'static str),

    /// Dynamic rewrite pattern failed to compile.
    #[error("rewrite pattern error: {0}")]
    Rewrite(#[from] regex::Error),

    /// Extras value could not be decoded.
    #[error("Extras entry '{key}' is malformed: {source}")]
    Extras {
        /// Extras key
        key: String,
        /// Decoding failure
        #[source]
        source: serde_json::Error,
    },
}

impl StatementError {
    /// Stable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSource => codes::MISSING_SOURCE,
            Self::TooManySources(_) => codes::TOO_MANY_SOURCES,
            Self::MissingJoinCondition => codes::MISSING_JOIN_CONDITION,
            Self::UnqualifiedJoinColumn(_) => codes::UNQUALIFIED_JOIN_COLUMN,
            Self::MissingPrimaryAlias => codes::PRIMARY_ALIAS,
            Self::WithinRequired => codes::WITHIN_REQUIRED,
            Self::Window(_) => codes::WINDOW_SHAPE,
            Self::InvalidTarget(_) => codes::INVALID_TARGET,
            Self::Rewrite(_) => codes::REWRITE,
            Self::Extras { .. } => codes::INVALID_EXTRAS,
        }
    }
}

/// Compile attempted with a token for a different model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// Token/model mismatch.
    #[error("model scope {token} does not cover model {model}; open a scope for this model before compiling")]
    WrongModel {
        /// Model id the token was opened for
        token: u64,
        /// Model id being compiled
        model: u64,
    },
}

impl ScopeError {
    /// Stable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        codes::WRONG_SCOPE
    }
}
