//! # LaminarDB ksqlDB compiler
//!
//! Compiles typed streaming query models into ksqlDB statements.
//!
//! This crate provides:
//! - An expression model for projections, filters, grouping keys and joins
//! - A declarative function catalog mapping host methods to ksqlDB functions
//! - Clause builders for SELECT, WHERE, GROUP BY and HAVING
//! - Statement compilers for CREATE AS SELECT (plain, tumbling, hopping)
//!   and INSERT INTO ... SELECT
//!
//! ## Example output
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS bar_1m_live WITH (KAFKA_TOPIC='bar_1m_live',
//!     KEY_FORMAT='AVRO', VALUE_FORMAT='AVRO', PARTITIONS=1, REPLICAS=1) AS
//! SELECT Broker AS Broker, Symbol AS Symbol, MAX(Bid) AS High
//! FROM DEDUPRATES WINDOW TUMBLING (SIZE 1 MINUTES)
//! GROUP BY Broker, Symbol
//! EMIT CHANGES;
//! ```
//!
//! A compile call needs the [`ModelScope`] opened for the model it
//! compiles:
//!
//! ```no_run
//! use laminar_ksql::{CreateTarget, ModelScope, QueryModel, SourceDescriptor, StatementCompiler};
//!
//! let model = QueryModel::builder()
//!     .source(SourceDescriptor::new("Order").with_topic("orders"))
//!     .build();
//! let scope = ModelScope::open(&model);
//! let sql = StatementCompiler::default()
//!     .create(&scope, &model, &CreateTarget::new("orders_copy"))?;
//! # Ok::<(), laminar_ksql::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod clause;
pub mod config;
pub mod error;
pub mod expr;
pub mod model;
pub mod scope;
pub mod statement;
pub mod suggest;
pub mod translator;

// Re-export key types
pub use catalog::{CatalogBuilder, FunctionCatalog, FunctionCategory, FunctionMapping};
pub use clause::ResultType;
pub use config::{CompilerConfig, DecimalConfig};
pub use error::{ScopeError, StatementError, TranslateError};
pub use model::{Extras, HoppingWindow, QueryModel, SourceDescriptor, SourceKind};
pub use scope::ModelScope;
pub use statement::{
    CreateTarget, HoppingTarget, InsertTarget, KeyPathStyle, RenderOptions, StatementCompiler,
    WindowedTarget,
};

/// Result type for statement compilation
pub type Result<T> = std::result::Result<T, Error>;

/// Compilation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Expression or function translation failed
    #[error(transparent)]
    Translate(#[from] TranslateError),

    /// Statement shape or precondition violated
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Compile attempted outside the model's scope
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::Statement(StatementError::Rewrite(err))
    }
}

impl Error {
    /// Stable code, see [`error::codes`].
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Translate(e) => e.code(),
            Self::Statement(e) => e.code(),
            Self::Scope(e) => e.code(),
        }
    }
}
