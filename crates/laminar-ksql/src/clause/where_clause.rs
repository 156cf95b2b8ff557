//! WHERE predicate builder.

use super::{ensure_output, validate_expression, ClauseKind, ParamAliases};
use crate::error::TranslateError;
use crate::expr::{BinaryOp, CallKind, Expr, Lambda, MemberAccess, MethodCall, RecordExpr, UnaryOp};
use crate::model::contains_aggregate;
use crate::translator::{binary_operator, ExpressionTranslator, MemberResolver};

/// Builds WHERE predicates.
///
/// Boolean members in logical position compare against a literal
/// (`o.IsActive` renders `(o.IsActive = true)`), null comparisons become
/// `IS [NOT] NULL`, and membership tests become `IN` lists.
#[derive(Debug, Clone)]
pub struct WhereBuilder<'a> {
    translator: ExpressionTranslator<'a>,
    aliases: &'a ParamAliases,
}

impl<'a> WhereBuilder<'a> {
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
    /// - [`TranslateError::Clause`] when the predicate aggregates
    /// - [`TranslateError::InvalidExpression`] for oversized expressions and
    ///   mismatched composite keys
    /// - call translation failures
    pub fn build(&self, predicate: &Lambda) -> Result<String, TranslateError> {
        validate_expression(&predicate.body)?;
        if contains_aggregate(&predicate.body, self.translator.catalog()) {
            return Err(TranslateError::Clause(
                "Aggregate functions are not allowed in WHERE clause. Use HAVING clause instead."
                    .to_string(),
            ));
        }
        let body = self.render(&predicate.body, true)?;
        ensure_output(ClauseKind::Where, body)
    }

    fn render(&self, expr: &Expr, logical: bool) -> Result<String, TranslateError> {
        match expr {
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
                ..
            } => self.not(operand),
            Expr::Unary {
                op: UnaryOp::Convert,
                operand,
                ..
            } => self.render(operand, logical),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
                ..
            } => Ok(format!("-{}", self.render(operand, false)?)),
            Expr::Member(m) => self.member(m, logical),
            Expr::Call(call) => self.call(call),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Ok(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.render(test, true)?,
                self.render(if_true, false)?,
                self.render(if_false, false)?
            )),
            Expr::Constant(lit) => Ok(lit.to_sql()),
            Expr::Lambda(l) => self.render(&l.body, logical),
            Expr::Parameter(p) => Ok(p.name.clone()),
            Expr::Record(_) => Err(TranslateError::InvalidExpression(
                "Record construction is only supported in composite key comparisons".to_string(),
            )),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<String, TranslateError> {
        if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
            let test = if op == BinaryOp::Equal { "IS NULL" } else { "IS NOT NULL" };
            if right.is_null_constant() {
                return Ok(format!("{} {test}", self.render(left, false)?));
            }
            if left.is_null_constant() {
                return Ok(format!("{} {test}", self.render(right, false)?));
            }
        }
        if op == BinaryOp::Equal {
            if let (Expr::Record(l), Expr::Record(r)) = (left.unwrap_convert(), right.unwrap_convert()) {
                return self.composite(l, r);
            }
        }

        let logical = matches!(op, BinaryOp::AndAlso | BinaryOp::OrElse);
        let l = self.render(left, logical)?;
        let r = self.render(right, logical)?;
        Ok(match op {
            BinaryOp::Coalesce => format!("COALESCE({l}, {r})"),
            _ => format!("({l} {} {r})", binary_operator(op)),
        })
    }

    fn composite(&self, left: &RecordExpr, right: &RecordExpr) -> Result<String, TranslateError> {
        if left.members.len() != right.members.len() {
            return Err(TranslateError::InvalidExpression(
                "Composite key expressions must have the same number of properties".to_string(),
            ));
        }
        let pairs = left
            .members
            .iter()
            .zip(&right.members)
            .map(|((_, l), (_, r))| Ok(format!("{} = {}", self.render(l, false)?, self.render(r, false)?)))
            .collect::<Result<Vec<_>, TranslateError>>()?;
        Ok(if pairs.len() == 1 {
            pairs.concat()
        } else {
            format!("({})", pairs.join(" AND "))
        })
    }

    fn not(&self, operand: &Expr) -> Result<String, TranslateError> {
        match operand.unwrap_convert() {
            Expr::Member(m) if m.name == "Value" && is_nullable_bool(&m.target) => {
                Ok(format!("({} = false)", self.render(&m.target, false)?))
            }
            Expr::Member(m) if m.ty.is_bool() => Ok(format!("({} = false)", self.resolve(m)?)),
            Expr::Call(call) => match membership(call) {
                Some((collection, value)) => Ok(format!(
                    "{} NOT IN ({})",
                    self.render(value, false)?,
                    self.render(collection, false)?
                )),
                None => Ok(format!("NOT ({})", self.call(call)?)),
            },
            other => Ok(format!("NOT ({})", self.render(other, true)?)),
        }
    }

    fn member(&self, member: &MemberAccess, logical: bool) -> Result<String, TranslateError> {
        if member.name == "Value" && is_nullable_bool(&member.target) {
            return Ok(format!("({} = true)", self.render(&member.target, false)?));
        }
        if member.name == "HasValue" && member.target.value_type().is_nullable() {
            return Ok(format!("{} IS NOT NULL", self.render(&member.target, false)?));
        }
        let column = self.resolve(member)?;
        if logical && member.ty.is_bool() && !member.ty.is_nullable() {
            return Ok(format!("({column} = true)"));
        }
        Ok(column)
    }

    fn call(&self, call: &MethodCall) -> Result<String, TranslateError> {
        if let Some((collection, value)) = membership(call) {
            return Ok(format!(
                "{} IN ({})",
                self.render(value, false)?,
                self.render(collection, false)?
            ));
        }
        if let (CallKind::Instance, Some(receiver), [arg]) =
            (call.kind, call.receiver.as_deref(), call.args.as_slice())
        {
            if receiver.value_type().is_string() {
                let target = self.render(receiver, false)?;
                let value = self.render(arg, false)?;
                match call.name.as_str() {
                    "Contains" => return Ok(format!("INSTR({target}, {value}) > 0")),
                    "StartsWith" => return Ok(format!("STARTS_WITH({target}, {value})")),
                    "EndsWith" => return Ok(format!("ENDS_WITH({target}, {value})")),
                    _ => {}
                }
            }
        }
        self.translator.translate_call(call, &WhereMembers(self))
    }

    fn resolve(&self, member: &MemberAccess) -> Result<String, TranslateError> {
        let alias = member
            .root_parameter()
            .and_then(|p| self.aliases.alias_for(&p.name));
        Ok(match alias {
            Some(alias) => format!("{alias}.{}", member.name),
            None => member.name.clone(),
        })
    }
}

struct WhereMembers<'b, 'a>(&'b WhereBuilder<'a>);

impl MemberResolver for WhereMembers<'_, '_> {
    fn resolve(&self, member: &MemberAccess) -> Result<String, TranslateError> {
        self.0.resolve(member)
    }
}

fn is_nullable_bool(expr: &Expr) -> bool {
    let ty = expr.value_type();
    ty.is_nullable() && ty.is_bool()
}

/// `(collection, value)` for collection membership tests:
/// `list.Contains(x)` or the extension form `Contains(list, x)`.
fn membership(call: &MethodCall) -> Option<(&Expr, &Expr)> {
    if call.name != "Contains" {
        return None;
    }
    match (call.kind, call.receiver.as_deref(), call.args.as_slice()) {
        (CallKind::Instance, Some(collection), [value]) if collection.value_type().is_collection() => {
            Some((collection, value))
        }
        (CallKind::Extension | CallKind::Static, None, [collection, value])
            if collection.value_type().is_collection() =>
        {
            Some((collection, value))
        }
        _ => None,
    }
}
