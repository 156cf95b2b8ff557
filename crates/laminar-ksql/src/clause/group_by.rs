//! GROUP BY key builder.

use super::{ensure_output, validate_expression, ClauseKind, ParamAliases};
use crate::error::TranslateError;
use crate::expr::{sanitize_upper, BinaryOp, Expr, Lambda, MemberAccess, MethodCall, UnaryOp};
use crate::model::contains_aggregate;
use crate::translator::{binary_operator, ExpressionTranslator, MemberResolver};

/// Builds the GROUP BY key list.
///
/// A single-key lambda renders one expression; a record key renders one
/// expression per member, comma-separated, in declaration order.
#[derive(Debug, Clone)]
pub struct GroupByBuilder<'a> {
    translator: ExpressionTranslator<'a>,
    aliases: &'a ParamAliases,
    max_keys: usize,
}

impl<'a> GroupByBuilder<'a> {
    /// Creates a builder accepting at most `max_keys` keys.
    #[must_use]
    pub fn new(
        translator: ExpressionTranslator<'a>,
        aliases: &'a ParamAliases,
        max_keys: usize,
    ) -> Self {
        Self {
            translator,
            aliases,
            max_keys,
        }
    }

    /// Renders `key_selector`.
    ///
    /// # Errors
    ///
    /// - [`TranslateError::Clause`] for aggregates, constants, functions not
    ///   usable as grouping keys, too many keys or no keys at all
    /// - [`TranslateError::InvalidExpression`] for oversized expressions
    pub fn build(&self, key_selector: &Lambda) -> Result<String, TranslateError> {
        validate_expression(&key_selector.body)?;
        if contains_aggregate(&key_selector.body, self.translator.catalog()) {
            return Err(TranslateError::Clause(
                "Aggregate functions are not allowed in GROUP BY clause".to_string(),
            ));
        }

        let mut keys = Vec::new();
        match key_selector.body.unwrap_convert() {
            Expr::Record(_) => self.record_keys(&key_selector.body, &mut keys)?,
            Expr::Call(call) => {
                if !self.allowed(call) {
                    return Err(TranslateError::Clause(format!(
                        "Function '{}' is not allowed in GROUP BY clause",
                        call.name
                    )));
                }
                keys.push(self.render(&key_selector.body)?);
            }
            Expr::Constant(_) => return Err(constant_key()),
            other => keys.push(self.render(other)?),
        }

        if keys.len() > self.max_keys {
            return Err(TranslateError::Clause(format!(
                "GROUP BY supports maximum {} keys for optimal performance. Found {} keys. \
                 Consider using composite keys or data denormalization.",
                self.max_keys,
                keys.len()
            )));
        }
        if keys.is_empty() {
            return Err(TranslateError::Clause(
                "Unable to extract GROUP BY keys from expression".to_string(),
            ));
        }
        ensure_output(ClauseKind::GroupBy, keys.join(", "))
    }

    fn record_keys(&self, expr: &Expr, keys: &mut Vec<String>) -> Result<(), TranslateError> {
        let Expr::Record(record) = expr.unwrap_convert() else {
            keys.push(self.render(expr)?);
            return Ok(());
        };
        for (_, member) in &record.members {
            match member.unwrap_convert() {
                Expr::Record(_) => self.record_keys(member, keys)?,
                Expr::Call(call) if !self.allowed(call) => {
                    return Err(TranslateError::Clause(format!(
                        "Unsupported GROUP BY function: {}",
                        call.name
                    )));
                }
                Expr::Constant(_) => return Err(constant_key()),
                _ => keys.push(self.render(member)?),
            }
        }
        Ok(())
    }

    fn allowed(&self, call: &MethodCall) -> bool {
        self.translator
            .catalog()
            .get(&call.name)
            .is_some_and(|m| m.allowed_in_group_by)
    }

    fn render(&self, expr: &Expr) -> Result<String, TranslateError> {
        match expr {
            Expr::Member(m) => self.resolve(m),
            Expr::Call(call) => self.translator.translate_call(call, &GroupMembers(self)),
            Expr::Binary { op, left, right } => {
                let l = self.render(left)?;
                let r = self.render(right)?;
                Ok(match op {
                    BinaryOp::Coalesce => format!("COALESCE({l}, {r})"),
                    BinaryOp::NotEqual => format!("{l} <> {r}"),
                    _ => format!("{l} {} {r}", binary_operator(*op)),
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
                "Nested record keys must be members of the key record".to_string(),
            )),
        }
    }

    fn resolve(&self, member: &MemberAccess) -> Result<String, TranslateError> {
        if !member.is_key {
            return Ok(member.name.clone());
        }
        let alias = member
            .root_parameter()
            .and_then(|p| self.aliases.alias_for(&p.name));
        let column = sanitize_upper(&member.name);
        Ok(match alias {
            Some(alias) => format!("{alias}.{column}"),
            None => column,
        })
    }
}

struct GroupMembers<'b, 'a>(&'b GroupByBuilder<'a>);

impl MemberResolver for GroupMembers<'_, '_> {
    fn resolve(&self, member: &MemberAccess) -> Result<String, TranslateError> {
        self.0.resolve(member)
    }
}

fn constant_key() -> TranslateError {
    TranslateError::Clause("Constant expression is not supported in GROUP BY".to_string())
}
