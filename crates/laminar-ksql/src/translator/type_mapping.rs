//! Host type to dialect type mapping.

use crate::config::DecimalConfig;
use crate::error::TranslateError;
use crate::expr::ValueType;

/// Coarse argument category used for function compatibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    /// 16/32-bit integers
    Int,
    /// 64-bit integers
    BigInt,
    /// Floating point
    Double,
    /// Fixed-point decimal
    Decimal,
    /// Text and characters
    String,
    /// Booleans
    Boolean,
    /// Timestamps
    DateTime,
    /// Records, collections and other composite values
    Struct,
    /// Unknown
    Unknown,
}

const NUMERIC: &[TypeCategory] = &[
    TypeCategory::Int,
    TypeCategory::BigInt,
    TypeCategory::Double,
    TypeCategory::Decimal,
];

const ORDERED: &[TypeCategory] = &[
    TypeCategory::Int,
    TypeCategory::BigInt,
    TypeCategory::Double,
    TypeCategory::Decimal,
    TypeCategory::String,
    TypeCategory::Boolean,
    TypeCategory::DateTime,
];

const ANY: &[TypeCategory] = &[
    TypeCategory::Int,
    TypeCategory::BigInt,
    TypeCategory::Double,
    TypeCategory::Decimal,
    TypeCategory::String,
    TypeCategory::Boolean,
    TypeCategory::DateTime,
    TypeCategory::Struct,
];

const TEXT: &[TypeCategory] = &[TypeCategory::String];

/// Category of a host type; nullable wrappers are ignored.
#[must_use]
pub fn categorize(ty: &ValueType) -> TypeCategory {
    match ty.underlying() {
        ValueType::Int | ValueType::Short => TypeCategory::Int,
        ValueType::Long => TypeCategory::BigInt,
        ValueType::Double | ValueType::Float => TypeCategory::Double,
        ValueType::Decimal => TypeCategory::Decimal,
        ValueType::String | ValueType::Char => TypeCategory::String,
        ValueType::Bool => TypeCategory::Boolean,
        ValueType::DateTime | ValueType::DateTimeOffset => TypeCategory::DateTime,
        ValueType::Guid
        | ValueType::Bytes
        | ValueType::List(_)
        | ValueType::Grouping { .. }
        | ValueType::Record(_) => TypeCategory::Struct,
        ValueType::Unknown | ValueType::Nullable(_) => TypeCategory::Unknown,
    }
}

/// Categories accepted by a dialect function, or `None` when the function
/// is not type-checked.
#[must_use]
pub fn allowed_categories(function: &str) -> Option<&'static [TypeCategory]> {
    match function.to_ascii_uppercase().as_str() {
        "SUM" | "AVG" => Some(NUMERIC),
        "MIN" | "MAX" | "TOPK" => Some(ORDERED),
        "COUNT" | "COLLECT_LIST" => Some(ANY),
        "LOWER" | "UPPER" | "LEN" => Some(TEXT),
        _ => None,
    }
}

/// Checks every argument type against the function's allow-list.
///
/// # Errors
///
/// Returns [`TranslateError::ArgumentType`] for the first rejected argument.
pub fn check_argument_types<'a, I>(function: &str, arg_types: I) -> Result<(), TranslateError>
where
    I: IntoIterator<Item = &'a ValueType>,
{
    let Some(allowed) = allowed_categories(function) else {
        return Ok(());
    };
    for ty in arg_types {
        if !allowed.contains(&categorize(ty)) {
            return Err(TranslateError::ArgumentType {
                function: function.to_string(),
                type_name: ty.name(),
            });
        }
    }
    Ok(())
}

/// Dialect column type for a host type.
///
/// # Errors
///
/// Returns [`TranslateError::UnsupportedType`] for composite or unknown types.
pub fn map_value_type(ty: &ValueType, decimal: &DecimalConfig) -> Result<String, TranslateError> {
    let sql = match ty.underlying() {
        ValueType::Int | ValueType::Short => "INTEGER".to_string(),
        ValueType::Long => "BIGINT".to_string(),
        ValueType::Double | ValueType::Float => "DOUBLE".to_string(),
        ValueType::Decimal => decimal.default_sql_type(),
        ValueType::String | ValueType::Char | ValueType::Guid => "VARCHAR".to_string(),
        ValueType::Bool => "BOOLEAN".to_string(),
        ValueType::DateTime | ValueType::DateTimeOffset => "TIMESTAMP".to_string(),
        ValueType::Bytes => "BYTES".to_string(),
        other => return Err(TranslateError::UnsupportedType(other.name())),
    };
    Ok(sql)
}
