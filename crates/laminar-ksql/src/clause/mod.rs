//! Clause body builders.
//!
//! Each builder renders the body of one clause (without its keyword) from a
//! model lambda. Lambda parameters are mapped to source aliases through a
//! [`ParamAliases`] table so the same builder serves single-source and
//! joined queries:
//!
//! ```text
//! (o, i) => o.Amount > i.Limit      ParamAliases { o -> "o", i -> "i" }
//!                                   => (o.Amount > i.Limit)
//! ```
//!
//! Builders share one input check (expression depth and size) and one
//! output check (the rendered body must not be blank).

mod group_by;
mod having;
mod select;
mod where_clause;

use std::fmt;

pub use group_by::GroupByBuilder;
pub use having::HavingBuilder;
pub use select::{ResultType, SelectBuilder, TypeHint};
pub use where_clause::WhereBuilder;

use crate::catalog::FunctionCatalog;
use crate::error::TranslateError;
use crate::expr::{Expr, Param};
use crate::model::is_aggregate_call;
use crate::translator::{JOIN_ALIAS, PRIMARY_ALIAS};

/// Maximum nesting depth of a clause expression.
pub const MAX_EXPRESSION_DEPTH: usize = 50;

/// Maximum node count of a clause expression.
pub const MAX_EXPRESSION_NODES: usize = 1000;

/// Clause a builder renders, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    /// Projection
    Select,
    /// Row filter
    Where,
    /// Grouping keys
    GroupBy,
    /// Group filter
    Having,
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Select => "SELECT",
            Self::Where => "WHERE",
            Self::GroupBy => "GROUP BY",
            Self::Having => "HAVING",
        })
    }
}

/// Lambda parameter name to source alias, in parameter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamAliases {
    entries: Vec<(String, String)>,
}

impl ParamAliases {
    /// Empty table: every member renders unqualified.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Table for projections and grouping keys. Only parameters that
    /// correspond to a declared source are mapped; the first parameter is
    /// mapped to `o` only when the primary source carries that alias.
    #[must_use]
    pub fn for_sources(params: &[Param], source_count: usize, primary_alias: bool) -> Self {
        let entries = params
            .iter()
            .take(source_count)
            .enumerate()
            .filter_map(|(i, p)| {
                let alias = match i {
                    0 if primary_alias => PRIMARY_ALIAS.to_string(),
                    0 => return None,
                    1 => JOIN_ALIAS.to_string(),
                    n => format!("s{n}"),
                };
                Some((p.name.clone(), alias))
            })
            .collect();
        Self { entries }
    }

    /// Table for row filters: the first parameter maps to `o` when the
    /// primary source is aliased, the second always maps to `i`.
    #[must_use]
    pub fn for_filter(params: &[Param], primary_alias: bool) -> Self {
        let mut entries = Vec::new();
        if let (Some(p), true) = (params.first(), primary_alias) {
            entries.push((p.name.clone(), PRIMARY_ALIAS.to_string()));
        }
        if let Some(p) = params.get(1) {
            entries.push((p.name.clone(), JOIN_ALIAS.to_string()));
        }
        Self { entries }
    }

    /// Alias for parameter `name`.
    #[must_use]
    pub fn alias_for(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == name)
            .map(|(_, a)| a.as_str())
            .filter(|a| !a.is_empty())
    }

    /// First non-empty alias in parameter order.
    #[must_use]
    pub fn first_alias(&self) -> Option<&str> {
        self.entries
            .iter()
            .map(|(_, a)| a.as_str())
            .find(|a| !a.is_empty())
    }

    /// True when some parameter maps to `alias`.
    #[must_use]
    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.iter().any(|(_, a)| a == alias)
    }

    /// True when no parameter is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rejects expressions that are too deep or too large to render.
///
/// Depth counts operator, call, lambda, record and conditional nesting;
/// member chains do not add depth.
///
/// # Errors
///
/// Returns [`TranslateError::InvalidExpression`] when a limit is exceeded.
pub fn validate_expression(expr: &Expr) -> Result<(), TranslateError> {
    if exceeds_depth(expr, 0) {
        return Err(TranslateError::InvalidExpression(format!(
            "Expression depth exceeds maximum allowed depth of {MAX_EXPRESSION_DEPTH}. \
             Consider simplifying the expression or breaking it into multiple operations."
        )));
    }

    let mut nodes = 0usize;
    expr.walk(&mut |_| nodes += 1);
    if nodes > MAX_EXPRESSION_NODES {
        return Err(TranslateError::InvalidExpression(format!(
            "Expression complexity exceeds maximum allowed nodes of {MAX_EXPRESSION_NODES}. \
             Current expression has {nodes} nodes. \
             Consider simplifying the expression or breaking it into multiple operations."
        )));
    }
    Ok(())
}

fn exceeds_depth(expr: &Expr, depth: usize) -> bool {
    if depth > MAX_EXPRESSION_DEPTH {
        return true;
    }
    let next = depth + 1;
    match expr {
        Expr::Binary { left, right, .. } => exceeds_depth(left, next) || exceeds_depth(right, next),
        Expr::Unary { operand, .. } => exceeds_depth(operand, next),
        Expr::Call(call) => {
            call.receiver.as_deref().is_some_and(|r| exceeds_depth(r, next))
                || call.args.iter().any(|a| exceeds_depth(a, next))
        }
        Expr::Lambda(l) => exceeds_depth(&l.body, next),
        Expr::Record(r) => r.members.iter().any(|(_, e)| exceeds_depth(e, next)),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => {
            exceeds_depth(test, next) || exceeds_depth(if_true, next) || exceeds_depth(if_false, next)
        }
        Expr::Parameter(_) | Expr::Member(_) | Expr::Constant(_) => false,
    }
}

/// Rejects an aggregate call whose arguments contain another aggregate.
///
/// # Errors
///
/// Returns [`TranslateError::Clause`] for `Sum(x => Max(..))`-style nesting.
pub fn validate_no_nested_aggregates(
    expr: &Expr,
    catalog: &FunctionCatalog,
) -> Result<(), TranslateError> {
    let nested = expr.any(&|e| match e {
        Expr::Call(call) if is_aggregate_call(call, catalog) => call
            .receiver
            .iter()
            .map(AsRef::as_ref)
            .chain(call.args.iter())
            .any(|a| a.any(&|inner| matches!(inner, Expr::Call(c) if is_aggregate_call(c, catalog)))),
        _ => false,
    });
    if nested {
        return Err(TranslateError::Clause(
            "Nested aggregate functions are not supported".to_string(),
        ));
    }
    Ok(())
}

/// Fails when a builder rendered a blank body.
pub(crate) fn ensure_output(kind: ClauseKind, body: String) -> Result<String, TranslateError> {
    if body.trim().is_empty() {
        return Err(TranslateError::Clause(format!(
            "{kind} builder produced empty result. \
             This indicates an issue with the expression processing logic."
        )));
    }
    Ok(body)
}
