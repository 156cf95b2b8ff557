//! Shared fixtures for the statement integration tests.

#![allow(dead_code)]

use laminar_ksql::expr::{Expr, Lambda, MethodCall, Param, ValueType};

/// Collapses whitespace runs and upper-cases, so layout and identifier
/// casing do not matter in comparisons.
pub fn normalize(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Asserts that `sql` contains `expected` after normalizing both.
pub fn assert_contains_normalized(sql: &str, expected: &str) {
    assert!(
        normalize(sql).contains(&normalize(expected)),
        "expected `{expected}` in:\n{sql}"
    );
}

pub fn record_param(name: &str, type_name: &str) -> Param {
    Param::new(name, ValueType::Record(type_name.into()))
}

pub fn grouping(name: &str, key: ValueType, element: &str) -> Param {
    Param::new(
        name,
        ValueType::Grouping {
            key: Box::new(key),
            element: Box::new(ValueType::Record(element.into())),
        },
    )
}

/// `g.Count()`
pub fn count(g: &Param) -> Expr {
    Expr::Call(MethodCall::extension("Count", vec![g.expr()], ValueType::Long))
}

/// `g.Name(x => x.field)`
pub fn aggregate(g: &Param, name: &str, element: &Param, field: &str, ty: ValueType) -> Expr {
    let selector = Expr::Lambda(Lambda::new(vec![element.clone()], element.field(field, ty.clone())));
    Expr::Call(MethodCall::extension(name, vec![g.expr(), selector], ty))
}
