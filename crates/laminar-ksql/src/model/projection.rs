//! Projection metadata and hub-input selection policy.
//!
//! A projection over a per-second rows stream ("hub input") cannot
//! re-aggregate raw columns: the rows stream already holds pre-aggregated
//! columns (`SUMPRICE`, `CNT`, `LASTCLOSE`, ...). The policy here maps each
//! output alias to the hub column its aggregate should read, and drops
//! members that are computed client-side.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::catalog::FunctionCatalog;
use crate::expr::{sanitize_upper, Expr, Lambda, MemberAccess, MethodCall, RecordExpr, ValueType};

/// Alias excluded from hub CTAS output; it is restored from the windowed key.
pub const WINDOW_START_RAW: &str = "WindowStartRaw";

/// Aggregate names recognized after stripping `_` and upper-casing.
const AGGREGATE_SPELLINGS: &[&str] = &[
    "SUM",
    "COUNT",
    "MAX",
    "MIN",
    "AVG",
    "AVERAGE",
    "LATESTBYOFFSET",
    "EARLIESTBYOFFSET",
    "COLLECTLIST",
    "COLLECTSET",
    "COUNTDISTINCT",
    "HISTOGRAM",
    "TOPK",
    "TOPKDISTINCT",
];

/// Classification of one projected member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Part of the grouping key
    Key,
    /// Aggregate call
    Aggregate,
    /// Expression computed from other values
    Computed,
    /// Plain column
    Value,
}

/// One output member of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMember {
    /// Output alias
    pub alias: String,
    /// Projected expression
    pub expr: Expr,
    /// Classification
    pub kind: MemberKind,
    /// Upper-cased column this member resolves to
    pub resolved_column: Option<String>,
    /// Aggregate method name for aggregate members
    pub aggregate_function: Option<String>,
    /// Canonical source path read by the member or its aggregate
    pub source_path: Option<String>,
    /// Result type
    pub result_type: ValueType,
}

/// Derived description of a SELECT projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMetadata {
    /// Members in projection order
    pub members: Vec<ProjectionMember>,
    /// The projection reads a per-second rows stream
    pub is_hub_input: bool,
}

impl ProjectionMetadata {
    /// Classifies every member of `select`.
    #[must_use]
    pub fn analyze(select: &Lambda, catalog: &FunctionCatalog, is_hub_input: bool) -> Self {
        let members = match select.body.as_ref() {
            Expr::Record(record) => record
                .members
                .iter()
                .map(|(alias, e)| build_member(alias, e, catalog))
                .collect(),
            other => vec![build_member("value", other, catalog)],
        };
        Self {
            members,
            is_hub_input,
        }
    }

    /// Member by alias, ignoring case.
    #[must_use]
    pub fn member(&self, alias: &str) -> Option<&ProjectionMember> {
        self.members.iter().find(|m| m.alias.eq_ignore_ascii_case(alias))
    }
}

fn build_member(alias: &str, expr: &Expr, catalog: &FunctionCatalog) -> ProjectionMember {
    let inner = expr.unwrap_convert();
    let (kind, resolved_column, aggregate_function, source_path) = classify(alias, inner, catalog);
    ProjectionMember {
        alias: alias.to_string(),
        expr: expr.clone(),
        kind,
        resolved_column,
        aggregate_function,
        source_path,
        result_type: inner.value_type(),
    }
}

type Classified = (MemberKind, Option<String>, Option<String>, Option<String>);

fn classify(alias: &str, expr: &Expr, catalog: &FunctionCatalog) -> Classified {
    match expr {
        Expr::Call(call) if is_aggregate_call(call, catalog) => (
            MemberKind::Aggregate,
            Some(sanitize_upper(alias)),
            Some(call.name.clone()),
            aggregate_source_path(call),
        ),
        Expr::Member(m) => classify_member(alias, m),
        Expr::Parameter(_) => (MemberKind::Value, Some(sanitize_upper(alias)), None, None),
        Expr::Unary { operand, .. } => classify(alias, operand, catalog),
        Expr::Lambda(l) => classify(alias, &l.body, catalog),
        Expr::Constant(_)
        | Expr::Binary { .. }
        | Expr::Conditional { .. }
        | Expr::Record(_)
        | Expr::Call(_) => (MemberKind::Computed, Some(sanitize_upper(alias)), None, None),
    }
}

fn classify_member(alias: &str, member: &MemberAccess) -> Classified {
    let Some(path) = canonical_path(member) else {
        return (MemberKind::Value, Some(sanitize_upper(alias)), None, None);
    };

    if path == "KEY" {
        return (MemberKind::Key, Some(sanitize_upper(alias)), None, None);
    }
    if let Some(rest) = path.strip_prefix("KEY.") {
        let leaf = rest.rsplit('.').next().unwrap_or(rest).to_string();
        return (MemberKind::Key, Some(leaf), None, Some(rest.to_string()));
    }
    (MemberKind::Value, Some(path.clone()), None, Some(path))
}

fn canonical_path(member: &MemberAccess) -> Option<String> {
    let path = member.path()?;
    let joined = path
        .iter()
        .map(|p| sanitize_upper(p))
        .collect::<Vec<_>>()
        .join(".");
    (!joined.is_empty()).then_some(joined)
}

/// True when `call` is an aggregate by catalog category or by a known
/// dialect spelling (`LATEST_BY_OFFSET`, `Avg`, ...).
#[must_use]
pub fn is_aggregate_call(call: &MethodCall, catalog: &FunctionCatalog) -> bool {
    if catalog.is_aggregate(&call.name) {
        return true;
    }
    let normalized = call.name.replace('_', "").to_ascii_uppercase();
    AGGREGATE_SPELLINGS.contains(&normalized.as_str())
}

/// True when any node of `expr` is an aggregate call.
#[must_use]
pub fn contains_aggregate(expr: &Expr, catalog: &FunctionCatalog) -> bool {
    expr.any(&|e| matches!(e, Expr::Call(c) if is_aggregate_call(c, catalog)))
}

fn selector_member(call: &MethodCall) -> Option<&MemberAccess> {
    call.args.iter().find_map(|arg| match arg {
        Expr::Lambda(l) => match l.body.unwrap_convert() {
            Expr::Member(m) => Some(m),
            _ => None,
        },
        _ => None,
    })
}

fn aggregate_source_path(call: &MethodCall) -> Option<String> {
    selector_member(call).and_then(canonical_path)
}

fn first_aggregate<'e>(expr: &'e Expr, catalog: &FunctionCatalog) -> Option<&'e MethodCall> {
    let mut found = None;
    expr.walk(&mut |e| {
        if found.is_none() {
            if let Expr::Call(c) = e {
                if is_aggregate_call(c, catalog) {
                    found = Some(c);
                }
            }
        }
    });
    found
}

/// How one output alias reads the hub rows stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubOverride {
    /// Hub column to aggregate
    pub target_column: String,
    /// Aggregate method to apply, if any
    #[serde(default)]
    pub aggregate_function: Option<String>,
    /// Only aggregate calls may be redirected
    #[serde(default)]
    pub aggregate_only: bool,
}

impl HubOverride {
    /// Override used for aggregate members.
    #[must_use]
    pub fn for_aggregate(target_column: &str, aggregate_function: Option<&str>) -> Self {
        Self {
            target_column: target_column.to_string(),
            aggregate_function: aggregate_function.map(str::to_string),
            aggregate_only: false,
        }
    }
}

/// Per-alias overrides plus aliases dropped from the output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSelection {
    /// Overrides keyed by output alias
    #[serde(default)]
    pub overrides: BTreeMap<String, HubOverride>,
    /// Aliases excluded from the generated SELECT
    #[serde(default)]
    pub exclude: BTreeSet<String>,
}

impl HubSelection {
    /// Override for `alias`, ignoring case.
    #[must_use]
    pub fn override_for(&self, alias: &str) -> Option<&HubOverride> {
        self.overrides
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(alias))
            .map(|(_, v)| v)
    }

    /// True when `alias` is excluded, ignoring case.
    #[must_use]
    pub fn is_excluded(&self, alias: &str) -> bool {
        self.exclude.iter().any(|e| e.eq_ignore_ascii_case(alias))
    }

    /// Adds every entry of `other`, replacing overrides for the same alias.
    pub fn merge(&mut self, other: HubSelection) {
        self.overrides.extend(other.overrides);
        self.exclude.extend(other.exclude);
    }

    /// Derives overrides and exclusions from projection metadata.
    ///
    /// `available` lists the hub stream's columns when known; inferred
    /// targets are then checked against it.
    #[must_use]
    pub fn derive(
        meta: &ProjectionMetadata,
        catalog: &FunctionCatalog,
        available: Option<&BTreeSet<String>>,
    ) -> Self {
        let mut selection = Self::default();

        for m in &meta.members {
            if m.alias.trim().is_empty() {
                continue;
            }
            if m.alias.eq_ignore_ascii_case(WINDOW_START_RAW) {
                selection.exclude.insert(m.alias.clone());
                continue;
            }

            match m.kind {
                MemberKind::Aggregate => {
                    let func = m.aggregate_function.as_deref();
                    let is_avg = func.is_some_and(|f| {
                        f.eq_ignore_ascii_case("Average") || f.eq_ignore_ascii_case("Avg")
                    });
                    let inferred = if is_avg {
                        infer_hub_column(&m.expr, catalog, available)
                    } else {
                        None
                    };
                    let target = inferred.unwrap_or_else(|| sanitize_upper(&m.alias));
                    trace!(alias = %m.alias, target = %target, function = ?func, "hub aggregate override");
                    selection
                        .overrides
                        .insert(m.alias.clone(), HubOverride::for_aggregate(&target, func));
                }
                MemberKind::Computed if contains_aggregate(&m.expr, catalog) => {
                    let target = infer_hub_column(&m.expr, catalog, available)
                        .or_else(|| m.resolved_column.clone().filter(|c| !c.is_empty()))
                        .unwrap_or_else(|| sanitize_upper(&m.alias));
                    let func = m.aggregate_function.as_deref().unwrap_or("AVG");
                    trace!(alias = %m.alias, target = %target, function = func, "hub computed override");
                    selection
                        .overrides
                        .insert(m.alias.clone(), HubOverride::for_aggregate(&target, Some(func)));
                }
                MemberKind::Computed => {
                    selection.exclude.insert(m.alias.clone());
                }
                MemberKind::Key | MemberKind::Value => {}
            }
        }
        selection
    }
}

fn infer_hub_column(
    expr: &Expr,
    catalog: &FunctionCatalog,
    available: Option<&BTreeSet<String>>,
) -> Option<String> {
    let call = first_aggregate(expr, catalog)?;
    let func = call.name.as_str();
    let leaf = selector_member(call).map(|m| sanitize_upper(&m.name)).unwrap_or_default();

    let mut candidates = Vec::new();
    if !leaf.is_empty() {
        let prefix = match func.to_ascii_lowercase().as_str() {
            "average" | "avg" | "sum" => Some("SUM"),
            "max" => Some("MAX"),
            "min" => Some("MIN"),
            "latestbyoffset" => Some("LAST"),
            "earliestbyoffset" => Some("FIRST"),
            _ => None,
        };
        if let Some(prefix) = prefix {
            candidates.push(format!("{prefix}{leaf}"));
        }
    }
    if func.eq_ignore_ascii_case("Count") {
        candidates.push("CNT".to_string());
    }

    let available = match available {
        Some(cols) if !cols.is_empty() => cols,
        _ => return candidates.into_iter().next(),
    };
    let has = |name: &str| available.iter().any(|c| c.eq_ignore_ascii_case(name));

    if let Some(first) = candidates.first() {
        if first.starts_with("SUM") && has(first) && has("CNT") {
            return Some(first.clone());
        }
    }
    candidates.into_iter().find(|c| has(c))
}

/// Rewrites a grouped projection for hub-rows input: a `BucketStart` member
/// of a named result record reads `WindowStart()` instead of its original
/// expression. Other shapes are returned unchanged.
#[must_use]
pub fn adapt_hub_projection(select: &Lambda) -> Lambda {
    let Some(g) = select.params.first() else {
        return select.clone();
    };
    if !g.ty.is_grouping() {
        return select.clone();
    }
    let Expr::Record(record) = select.body.as_ref() else {
        return select.clone();
    };
    if record.is_anonymous() {
        return select.clone();
    }

    let members = record
        .members
        .iter()
        .map(|(name, e)| {
            if name.eq_ignore_ascii_case("BucketStart") {
                let window_start =
                    MethodCall::extension("WindowStart", vec![g.expr()], ValueType::DateTime);
                (name.clone(), Expr::Call(window_start))
            } else {
                (name.clone(), e.clone())
            }
        })
        .collect();

    Lambda {
        params: select.params.clone(),
        body: Box::new(Expr::Record(RecordExpr {
            type_name: record.type_name.clone(),
            members,
        })),
    }
}
