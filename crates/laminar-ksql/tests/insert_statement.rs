//! INSERT INTO ... SELECT integration tests.

mod common;

use common::{assert_contains_normalized, count, grouping, record_param};
use laminar_ksql::expr::{BinaryOp, Expr, Lambda, ValueType};
use laminar_ksql::{InsertTarget, ModelScope, QueryModel, SourceDescriptor, StatementCompiler};

fn order() -> SourceDescriptor {
    SourceDescriptor::new("Order")
        .with_topic("orders")
        .with_key("Id", ValueType::Int)
        .with_column("Amount", ValueType::Double)
        .with_column("Region", ValueType::String)
}

fn insert(model: &QueryModel, target: &InsertTarget) -> laminar_ksql::Result<String> {
    let scope = ModelScope::open(model);
    StatementCompiler::default().insert(&scope, model, target)
}

// ── Scenario 1: Projection and filter ──

#[test]
fn test_insert_projection_and_filter() {
    let o = record_param("o", "Order");
    let model = QueryModel::builder()
        .source(order())
        .filter(Lambda::new(
            vec![o.clone()],
            Expr::binary(BinaryOp::GreaterThanOrEqual, o.field("Amount", ValueType::Double), Expr::int(10)),
        ))
        .select(Lambda::new(
            vec![o.clone()],
            Expr::record(vec![
                ("Id", o.field("Id", ValueType::Int)),
                ("Amount", o.field("Amount", ValueType::Double)),
            ]),
        ))
        .build();

    let sql = insert(&model, &InsertTarget::new("large_orders")).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO large_orders SELECT o.ID AS Id, o.AMOUNT AS Amount\n\
         FROM ORDERS o\n\
         WHERE (o.Amount >= 10)\n\
         EMIT CHANGES;"
    );
}

// ── Scenario 2: Aggregation ──

#[test]
fn test_insert_grouped() {
    let o = record_param("o", "Order");
    let g = grouping("g", ValueType::String, "Order");
    let model = QueryModel::builder()
        .source(order())
        .group_by(Lambda::new(vec![o.clone()], o.field("Region", ValueType::String)))
        .having(Lambda::new(
            vec![g.clone()],
            Expr::binary(BinaryOp::GreaterThan, count(&g), Expr::int(5)),
        ))
        .select(Lambda::new(
            vec![g.clone()],
            Expr::record(vec![("Region", g.field("Key", ValueType::String)), ("Orders", count(&g))]),
        ))
        .build();

    let sql = insert(&model, &InsertTarget::new("busy_regions")).unwrap();
    assert!(sql.starts_with("INSERT INTO busy_regions SELECT "));
    assert_contains_normalized(&sql, "COUNT(*) AS Orders");
    assert!(sql.contains("\nGROUP BY Region\nHAVING "));
    assert_contains_normalized(&sql, "(COUNT(*) > 5)");
    assert!(!sql.contains("WITH ("));
    assert!(!sql.contains("CREATE"));
}

// ── Scenario 3: Source resolution ──

#[test]
fn test_insert_with_source_resolver() {
    let model = QueryModel::builder().source(order()).build();
    let target = InsertTarget::new("orders_archive")
        .with_source_resolver(|s| format!("{}_REPLAY", s.source_name()));
    let sql = insert(&model, &target).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO orders_archive SELECT *\nFROM ORDERS_REPLAY o\nEMIT CHANGES;"
    );
}

#[test]
fn test_target_name_trimmed() {
    let model = QueryModel::builder().source(order()).build();
    let sql = insert(&model, &InsertTarget::new("  archive  ")).unwrap();
    assert!(sql.starts_with("INSERT INTO archive SELECT *"));
}

// ── Scenario 4: Failures ──

#[test]
fn test_insert_requires_source() {
    let model = QueryModel::builder().build();
    let err = insert(&model, &InsertTarget::new("anything")).unwrap_err();
    assert_eq!(err.code(), "KSQL-2001");
}

#[test]
fn test_insert_wrong_scope() {
    let model = QueryModel::builder().source(order()).build();
    let other = QueryModel::builder().source(order()).build();
    let scope = ModelScope::open(&other);
    let err = StatementCompiler::default()
        .insert(&scope, &model, &InsertTarget::new("archive"))
        .unwrap_err();
    assert_eq!(err.code(), "KSQL-3001");
}
