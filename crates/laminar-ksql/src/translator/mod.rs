//! Expression and clause-fragment translation
//!
//! This module turns expression trees, window specifications, join
//! predicates and sink settings into dialect text fragments that the
//! statement compilers assemble.

/// Expression and method-call translation
pub mod function_translator;
mod join_translator;
/// Sink DDL fragments (`WITH (...)`, object kind)
pub mod streaming_ddl;
/// Host type to dialect type mapping
pub mod type_mapping;
mod window_translator;

pub use function_translator::{
    binary_operator, ExpressionTranslator, MemberResolver, PlainMemberNames,
};
pub use join_translator::{
    render_join_condition, FromClause, SourceAlias, StreamJoinConfig, JOIN_ALIAS, PRIMARY_ALIAS,
};
pub use streaming_ddl::{ObjectKind, SinkOptions, WithClause};
pub use type_mapping::{map_value_type, TypeCategory};
pub use window_translator::{
    compare_timeframes, format_duration, Timeframe, TimeframeUnit, WindowClause, WindowType,
};
