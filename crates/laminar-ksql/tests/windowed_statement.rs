//! Windowed CREATE integration tests.
//!
//! Tumbling bars per timeframe, hopping windows from a target interval or
//! from the model, emit and input overrides, and hub-rows input.

mod common;

use std::time::Duration;

use common::{aggregate, assert_contains_normalized, count, grouping, normalize, record_param};
use laminar_ksql::expr::{Expr, Lambda, MethodCall, Param, ValueType};
use laminar_ksql::model::{keys, QueryModelBuilder};
use laminar_ksql::{
    HoppingTarget, HoppingWindow, ModelScope, QueryModel, SourceDescriptor, StatementCompiler,
    WindowedTarget,
};

fn rate() -> SourceDescriptor {
    SourceDescriptor::new("Rate")
        .with_topic("deduprates")
        .with_key("Broker", ValueType::String)
        .with_key("Symbol", ValueType::String)
        .with_column("Bid", ValueType::Double)
}

fn bar_key() -> ValueType {
    ValueType::Record("BarKey".into())
}

/// `GroupBy(r => new { r.Broker, r.Symbol })`, projecting the keys and
/// `High = g.Max(x => x.Bid)` into a named `Bar` record.
fn bars() -> QueryModelBuilder {
    let r = record_param("r", "Rate");
    let g = grouping("g", bar_key(), "Rate");
    let key = g.field("Key", bar_key());
    QueryModel::builder()
        .source(rate())
        .group_by(Lambda::new(
            vec![r.clone()],
            Expr::record(vec![
                ("Broker", r.field("Broker", ValueType::String)),
                ("Symbol", r.field("Symbol", ValueType::String)),
            ]),
        ))
        .select(Lambda::new(
            vec![g.clone()],
            Expr::named_record(
                "Bar",
                vec![
                    ("Broker", key.clone().field("Broker", ValueType::String)),
                    ("Symbol", key.field("Symbol", ValueType::String)),
                    ("High", aggregate(&g, "Max", &r, "Bid", ValueType::Double)),
                ],
            ),
        ))
}

fn page_view() -> SourceDescriptor {
    SourceDescriptor::new("PageView")
        .with_topic("pageviews")
        .with_column("UserId", ValueType::String)
        .with_column("Url", ValueType::String)
}

fn window_start(g: &Param) -> Expr {
    Expr::Call(MethodCall::extension("WindowStart", vec![g.expr()], ValueType::DateTime))
}

/// Views per user with the window start projected as `start_alias`.
fn views_per_user(start_alias: &str) -> QueryModelBuilder {
    let v = record_param("v", "PageView");
    let g = grouping("g", ValueType::String, "PageView");
    QueryModel::builder()
        .source(page_view())
        .group_by(Lambda::new(vec![v.clone()], v.field("UserId", ValueType::String)))
        .select(Lambda::new(
            vec![g.clone()],
            Expr::record(vec![
                ("UserId", g.field("Key", ValueType::String)),
                ("Views", count(&g)),
                (start_alias, window_start(&g)),
            ]),
        ))
}

fn compile_windowed(model: &QueryModel, target: &WindowedTarget) -> laminar_ksql::Result<String> {
    let scope = ModelScope::open(model);
    StatementCompiler::default().create_windowed(&scope, model, target)
}

// ── Scenario 1: Tumbling bars ──

#[test]
fn test_tumbling_bar() {
    let model = bars().window("1m").build();
    let sql = compile_windowed(&model, &WindowedTarget::new("bar_1m_live", "1m")).unwrap();

    assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS bar_1m_live WITH ("));
    assert!(sql.contains("PARTITIONS=1, REPLICAS=1"));
    assert!(sql.contains("\nFROM DEDUPRATES WINDOW TUMBLING (SIZE 1 MINUTES)\nGROUP BY "));
    assert_contains_normalized(&sql, "SELECT BROKER AS Broker, SYMBOL AS Symbol, MAX(BID) AS High");
    assert_contains_normalized(&sql, "GROUP BY Broker, Symbol");
    assert!(sql.ends_with("\nEMIT CHANGES;"));
}

#[test]
fn test_grace_period_appended() {
    let model = bars().window("5m").grace(30).build();
    let sql = compile_windowed(&model, &WindowedTarget::new("bar_5m_live", "5m")).unwrap();
    assert!(sql.contains("WINDOW TUMBLING (SIZE 5 MINUTES, GRACE PERIOD 30 SECONDS)"));
}

#[test]
fn test_explicit_sizing_wins() {
    let model = bars()
        .window("1h")
        .extra(keys::SINK_PARTITIONS, 3)
        .extra(keys::SINK_RETENTION_MS, 86_400_000)
        .build();
    let sql = compile_windowed(&model, &WindowedTarget::new("bar_1h_live", "1h")).unwrap();
    assert!(sql.contains("PARTITIONS=3, REPLICAS=1, RETENTION_MS=86400000"));
    assert!(sql.contains("WINDOW TUMBLING (SIZE 1 HOURS)"));
}

#[test]
fn test_create_all_per_timeframe() {
    let model = bars().windows(["1m", "5m", "1m"]).build();
    let scope = ModelScope::open(&model);
    let statements = StatementCompiler::default()
        .create_all(&scope, &model, |tf| format!("bar_{tf}_live"))
        .unwrap();

    let timeframes: Vec<&str> = statements.iter().map(|(tf, _)| tf.as_str()).collect();
    assert_eq!(timeframes, ["1m", "5m"]);
    assert!(statements[0].1.contains("IF NOT EXISTS bar_1m_live"));
    assert!(statements[1].1.contains("IF NOT EXISTS bar_5m_live"));
    assert!(statements[1].1.contains("SIZE 5 MINUTES"));
}

// ── Scenario 2: Emit and input overrides ──

#[test]
fn test_input_override_retargets_from() {
    let r = record_param("r", "Rate");
    let model = QueryModel::builder()
        .source(rate())
        .group_by(Lambda::new(vec![r.clone()], r.field("Broker", ValueType::String)))
        .window("1m")
        .build();
    let target = WindowedTarget::new("bar_1m_live", "1m").with_input("deduprates_1s_rows");
    let sql = compile_windowed(&model, &target).unwrap();
    assert!(sql.contains("\nFROM deduprates_1s_rows WINDOW TUMBLING (SIZE 1 MINUTES)\n"));
    assert!(!sql.contains("DEDUPRATES WINDOW"));
}

#[test]
fn test_emit_final_override() {
    let model = bars().window("1m").build();
    let target = WindowedTarget::new("bar_1m_final", "1m").with_emit("EMIT FINAL");
    let sql = compile_windowed(&model, &target).unwrap();
    assert!(sql.ends_with("\nEMIT FINAL;"));
    assert!(!sql.contains("EMIT CHANGES"));
}

#[test]
fn test_hub_rows_input_reads_hub_columns() {
    let model = bars().window("1m").build();
    let target = WindowedTarget::new("bar_1m_live", "1m").with_input("deduprates_1s_rows");
    let sql = compile_windowed(&model, &target).unwrap();
    assert_contains_normalized(&sql, "MAX(HIGH) AS High");
    assert!(sql.contains("\nFROM deduprates_1s_rows WINDOW TUMBLING (SIZE 1 MINUTES)"));

    let again = compile_windowed(&model, &target).unwrap();
    assert_eq!(sql, again);
}

// ── Scenario 3: Hopping windows ──

#[test]
fn test_hopping_from_target_interval() {
    let model = views_per_user("BucketStart").build();
    let target = WindowedTarget::new("views_5m", "5m").with_hop(Duration::from_secs(60));
    let sql = compile_windowed(&model, &target).unwrap();

    assert!(sql.contains("WINDOW HOPPING (SIZE 5 MINUTES, ADVANCE BY 1 MINUTES)"));
    assert_contains_normalized(&sql, "GROUP BY USERID");
    assert!(!sql.contains("WINDOWSTART AS"));
    assert!(sql.contains("COUNT(*) AS Views\nFROM PAGEVIEWS WINDOW HOPPING"));
}

#[test]
fn test_hopping_end_ts_becomes_window_end() {
    let model = views_per_user("EndTs").build();
    let target = WindowedTarget::new("views_5m", "5m").with_hop(Duration::from_secs(60));
    let sql = compile_windowed(&model, &target).unwrap();
    assert!(sql.contains("WINDOWEND AS EndTs"));
    assert!(!normalize(&sql).contains("WINDOWSTART"));
}

#[test]
fn test_model_hopping_window() {
    let model = views_per_user("BucketStart")
        .hopping(HoppingWindow::new(Duration::from_secs(3600), Duration::from_secs(900)))
        .build();
    let scope = ModelScope::open(&model);
    let sql = StatementCompiler::default()
        .create_hopping(&scope, &model, &HoppingTarget::new("views_hourly"))
        .unwrap();

    assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS views_hourly"));
    assert!(sql.contains("\nFROM PAGEVIEWS WINDOW HOPPING (SIZE 1 HOURS, ADVANCE BY 15 MINUTES)\n"));
    assert!(sql.contains("PARTITIONS=1, REPLICAS=1"));
    assert!(!sql.contains("WINDOWSTART AS"));
}

#[test]
fn test_model_hopping_with_grace_and_emit() {
    let model = views_per_user("BucketStart")
        .hopping(
            HoppingWindow::new(Duration::from_secs(600), Duration::from_secs(120))
                .with_grace(Duration::from_secs(30)),
        )
        .build();
    let scope = ModelScope::open(&model);
    let target = HoppingTarget::new("views_10m").with_emit("EMIT FINAL");
    let sql = StatementCompiler::default()
        .create_hopping(&scope, &model, &target)
        .unwrap();
    assert!(sql.contains(
        "WINDOW HOPPING (SIZE 10 MINUTES, ADVANCE BY 2 MINUTES, GRACE PERIOD 30 SECONDS)"
    ));
    assert!(sql.ends_with("\nEMIT FINAL;"));
}

#[test]
fn test_hopping_table_omits_retention() {
    let model = views_per_user("BucketStart")
        .hopping(HoppingWindow::new(Duration::from_secs(300), Duration::from_secs(60)))
        .extra(keys::SINK_RETENTION_MS, 86_400_000)
        .build();
    let scope = ModelScope::open(&model);
    let compiler = StatementCompiler::default();

    let sql = compiler
        .create_hopping(&scope, &model, &HoppingTarget::new("views_5m"))
        .unwrap();
    assert!(sql.contains("PARTITIONS=1, REPLICAS=1)"));
    assert!(!sql.contains("RETENTION_MS"));

    let target = WindowedTarget::new("views_5m", "5m").with_hop(Duration::from_secs(60));
    let sql = compiler.create_windowed(&scope, &model, &target).unwrap();
    assert!(sql.contains("WINDOW HOPPING (SIZE 5 MINUTES, ADVANCE BY 1 MINUTES)"));
    assert!(!sql.contains("RETENTION_MS"));
}

// ── Scenario 4: Failures ──

#[test]
fn test_hopping_requires_group_by() {
    let model = QueryModel::builder().source(page_view()).build();
    let target = WindowedTarget::new("views_5m", "5m").with_hop(Duration::from_secs(60));
    let err = compile_windowed(&model, &target).unwrap_err();
    assert_eq!(err.code(), "KSQL-2006");
    assert!(err.to_string().contains("Hopping window requires GroupBy()"));
}

#[test]
fn test_model_without_hopping_window() {
    let model = views_per_user("BucketStart").build();
    let scope = ModelScope::open(&model);
    let err = StatementCompiler::default()
        .create_hopping(&scope, &model, &HoppingTarget::new("views"))
        .unwrap_err();
    assert_eq!(err.code(), "KSQL-2006");
}

#[test]
fn test_blank_timeframe() {
    let model = bars().build();
    let err = compile_windowed(&model, &WindowedTarget::new("bar", " ")).unwrap_err();
    assert_eq!(err.code(), "KSQL-2007");
}
