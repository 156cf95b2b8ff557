//! HAVING predicate builder.

use super::{ensure_output, validate_expression, validate_no_nested_aggregates, ClauseKind, ParamAliases};
use crate::error::TranslateError;
use crate::expr::{BinaryOp, Expr, Lambda, MemberAccess, MethodCall, UnaryOp};
use crate::model::is_aggregate_call;
use crate::translator::{binary_operator, ExpressionTranslator, MemberResolver};

/// Builds HAVING predicates over grouped rows.
///
/// Aggregates read their column from the selector lambda
/// (`g.Sum(x => x.Amount)` renders `SUM(Amount)`); plain members render by
/// name.
#[derive(Debug, Clone)]
pub struct HavingBuilder<'a> {
    translator: ExpressionTranslator<'a>,
    aliases: &'a ParamAliases,
}

impl<'a> HavingBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(translator: ExpressionTranslator<'a>, aliases: &'a ParamAliases) -> Self {
        Self {
            translator,
            aliases,
        }
    }

    /// Renders `predicate`.
    ///
    /// # Errors
    ///
    /// - [`TranslateError::Clause`] for conditional counts and nested
    ///   aggregates
    /// - [`TranslateError::InvalidExpression`] for oversized expressions and
    ///   selectors that do not read a column
    /// - call translation failures
    pub fn build(&self, predicate: &Lambda) -> Result<String, TranslateError> {
        validate_expression(&predicate.body)?;
        validate_no_nested_aggregates(&predicate.body, self.translator.catalog())?;
        let body = self.render(&predicate.body)?;
        ensure_output(ClauseKind::Having, body)
    }

    fn render(&self, expr: &Expr) -> Result<String, TranslateError> {
        match expr {
            Expr::Binary { op, left, right } => {
                let l = self.render(left)?;
                let r = self.render(right)?;
                Ok(match op {
                    BinaryOp::Coalesce => format!("COALESCE({l}, {r})"),
                    BinaryOp::NotEqual => format!("({l} <> {r})"),
                    _ => format!("({l} {} {r})", binary_operator(*op)),
                })
            }
            Expr::Unary {
                op: UnaryOp::Convert,
                operand,
                ..
            } => self.render(operand),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
                ..
            } => Ok(format!("NOT ({})", self.render(operand)?)),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
                ..
            } => Ok(format!("-{}", self.render(operand)?)),
            Expr::Member(m) => Ok(m.name.clone()),
            Expr::Call(call) if is_aggregate_call(call, self.translator.catalog()) => {
                aggregate(call)
            }
            Expr::Call(call) => self.translator.translate_call(call, &HavingMembers(self)),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Ok(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.render(test)?,
                self.render(if_true)?,
                self.render(if_false)?
            )),
            Expr::Constant(lit) => Ok(lit.to_sql()),
            Expr::Lambda(l) => self.render(&l.body),
            Expr::Parameter(p) => Ok(p.name.clone()),
            Expr::Record(_) => Err(TranslateError::InvalidExpression(
                "Record construction is not supported in HAVING".to_string(),
            )),
        }
    }
}

struct HavingMembers<'b, 'a>(&'b HavingBuilder<'a>);

impl MemberResolver for HavingMembers<'_, '_> {
    fn resolve(&self, member: &MemberAccess) -> Result<String, TranslateError> {
        let alias = member
            .root_parameter()
            .filter(|p| !p.ty.is_grouping())
            .and_then(|p| self.0.aliases.alias_for(&p.name));
        Ok(match alias {
            Some(alias) => format!("{alias}.{}", member.name),
            None => member.name.clone(),
        })
    }
}

fn aggregate(call: &MethodCall) -> Result<String, TranslateError> {
    let function = aggregate_name(&call.name);
    if call.name == "Count" {
        return match call.args.len() {
            0 | 1 => Ok("COUNT(*)".to_string()),
            _ => Err(TranslateError::Clause(
                "Conditional Count is not supported in KSQL HAVING clause. Use WHERE clause instead."
                    .to_string(),
            )),
        };
    }

    let selector = call.args.iter().find_map(|a| match a {
        Expr::Lambda(l) => Some(l),
        _ => None,
    });
    if let Some(lambda) = selector {
        return match lambda.body.unwrap_convert() {
            Expr::Member(m) => Ok(format!("{function}({})", m.name)),
            _ => Err(TranslateError::InvalidExpression(
                "Cannot extract column name from lambda".to_string(),
            )),
        };
    }

    let column = call
        .receiver
        .as_deref()
        .into_iter()
        .chain(call.args.iter())
        .find_map(|a| match a.unwrap_convert() {
            Expr::Member(m) => Some(m.name.as_str()),
            _ => None,
        });
    Ok(format!("{function}({})", column.unwrap_or("*")))
}

fn aggregate_name(method: &str) -> String {
    match method {
        "LatestByOffset" => "LATEST_BY_OFFSET".to_string(),
        "EarliestByOffset" => "EARLIEST_BY_OFFSET".to_string(),
        "CollectList" => "COLLECT_LIST".to_string(),
        "CollectSet" => "COLLECT_SET".to_string(),
        "Average" => "AVG".to_string(),
        "CountDistinct" => "COUNT_DISTINCT".to_string(),
        other => other.to_ascii_uppercase(),
    }
}
