//! FROM/JOIN clause builder
//!
//! Resolves the model's one or two sources into a `FROM` clause. A second
//! source becomes a stream-stream `JOIN ... WITHIN n SECONDS ON ...` whose
//! predicate is rendered against the fixed aliases `o` and `i`.

use crate::error::{StatementError, TranslateError};
use crate::expr::{BinaryOp, Expr, Lambda, RecordExpr};
use crate::model::QueryModel;

/// Alias of the primary source.
pub const PRIMARY_ALIAS: &str = "o";

/// Alias of the join target.
pub const JOIN_ALIAS: &str = "i";

/// Short alias bound to a resolved source name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAlias {
    /// `o` or `i`
    pub alias: String,
    /// Identifier emitted in FROM/JOIN
    pub source_name: String,
}

/// Configuration for a stream-stream join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamJoinConfig {
    /// Join target identifier
    pub right_source: String,
    /// Time bound in seconds
    pub within_seconds: u64,
    /// Rendered predicate
    pub condition: String,
}

impl StreamJoinConfig {
    /// ` JOIN R i WITHIN n SECONDS ON cond`
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!(
            " JOIN {} {JOIN_ALIAS} WITHIN {} SECONDS ON {}",
            self.right_source, self.within_seconds, self.condition
        )
    }
}

/// Rendered FROM clause plus its alias bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromClause {
    /// `FROM ...` text
    pub sql: String,
    /// Alias bindings, primary first. `o` is always bound, even when the
    /// primary source is rendered without it.
    pub aliases: Vec<SourceAlias>,
    /// Join, if two sources are present
    pub join: Option<StreamJoinConfig>,
}

impl FromClause {
    /// Builds the clause from already-resolved source identifiers.
    ///
    /// # Errors
    ///
    /// - [`StatementError::MissingSource`] when `source_names` is empty
    /// - [`StatementError::TooManySources`] for more than two sources
    /// - [`StatementError::MissingJoinCondition`] for two sources without a
    ///   predicate
    /// - [`StatementError::WithinRequired`] when no bound is set and the
    ///   default is forbidden
    /// - predicate rendering failures from [`render_join_condition`]
    pub fn build(
        model: &QueryModel,
        source_names: &[String],
        default_within_seconds: u64,
    ) -> crate::Result<Self> {
        Self::build_aliased(
            model,
            source_names,
            default_within_seconds,
            model.primary_source_requires_alias(),
        )
    }

    /// Like [`Self::build`], but `primary_alias` decides whether the primary
    /// source is rendered as `FROM name o`.
    ///
    /// # Errors
    ///
    /// See [`Self::build`].
    pub fn build_aliased(
        model: &QueryModel,
        source_names: &[String],
        default_within_seconds: u64,
        primary_alias: bool,
    ) -> crate::Result<Self> {
        let (left, rest) = source_names
            .split_first()
            .ok_or(StatementError::MissingSource)?;
        if source_names.len() > 2 {
            return Err(StatementError::TooManySources(source_names.len()).into());
        }

        let mut sql = if primary_alias {
            format!("FROM {left} {PRIMARY_ALIAS}")
        } else {
            format!("FROM {left}")
        };
        let mut aliases = vec![SourceAlias {
            alias: PRIMARY_ALIAS.to_string(),
            source_name: left.clone(),
        }];

        let join = match rest.first() {
            None => None,
            Some(right) => {
                aliases.push(SourceAlias {
                    alias: JOIN_ALIAS.to_string(),
                    source_name: right.clone(),
                });
                let on = model
                    .join_condition()
                    .ok_or(StatementError::MissingJoinCondition)?;
                let within_seconds = match model.within_seconds().filter(|s| *s > 0) {
                    Some(s) => s,
                    None if !model.forbid_default_within() => default_within_seconds,
                    None => return Err(StatementError::WithinRequired.into()),
                };
                if !primary_alias {
                    return Err(StatementError::MissingPrimaryAlias.into());
                }
                let config = StreamJoinConfig {
                    right_source: right.clone(),
                    within_seconds,
                    condition: render_join_condition(on, PRIMARY_ALIAS, JOIN_ALIAS)?,
                };
                sql.push_str(&config.to_sql());
                Some(config)
            }
        };

        Ok(Self { sql, aliases, join })
    }
}

/// Renders a join predicate with every operand qualified by `left` or
/// `right` according to the lambda parameter it is read from.
///
/// Equality renders as `(l = r)`, conjunctions as `(a AND b)`, and a
/// composite record equality expands to one equality per member pair.
///
/// # Errors
///
/// - [`StatementError::UnqualifiedJoinColumn`] for an operand not rooted at
///   either parameter
/// - [`TranslateError::InvalidExpression`] for composite keys of different
///   sizes or unsupported node kinds
pub fn render_join_condition(on: &Lambda, left: &str, right: &str) -> crate::Result<String> {
    JoinRenderer { on, left, right }.render(&on.body)
}

struct JoinRenderer<'a> {
    on: &'a Lambda,
    left: &'a str,
    right: &'a str,
}

impl JoinRenderer<'_> {
    fn render(&self, expr: &Expr) -> crate::Result<String> {
        match expr {
            Expr::Binary {
                op: BinaryOp::Equal,
                left,
                right,
            } => match (left.unwrap_convert(), right.unwrap_convert()) {
                (Expr::Record(l), Expr::Record(r)) => self.composite(l, r),
                _ => Ok(format!("({} = {})", self.render(left)?, self.render(right)?)),
            },
            Expr::Binary {
                op: BinaryOp::AndAlso,
                left,
                right,
            } => Ok(format!("({} AND {})", self.render(left)?, self.render(right)?)),
            Expr::Member(m) => {
                let alias = m.root_parameter().and_then(|p| {
                    let position = self.on.params.iter().position(|q| q.name == p.name)?;
                    match position {
                        0 => Some(self.left),
                        1 => Some(self.right),
                        _ => None,
                    }
                });
                match alias {
                    Some(alias) => Ok(format!("{alias}.{}", m.name)),
                    None => Err(StatementError::UnqualifiedJoinColumn(m.name.clone()).into()),
                }
            }
            Expr::Unary { operand, .. } => self.render(operand),
            Expr::Constant(lit) => Ok(lit.to_sql()),
            _ => Err(TranslateError::InvalidExpression(
                "JOIN condition supports only equality, AND and source columns".to_string(),
            )
            .into()),
        }
    }

    fn composite(&self, left: &RecordExpr, right: &RecordExpr) -> crate::Result<String> {
        if left.members.len() != right.members.len() {
            return Err(TranslateError::InvalidExpression(
                "Composite key expressions must have the same number of properties".to_string(),
            )
            .into());
        }
        let pairs = left
            .members
            .iter()
            .zip(&right.members)
            .map(|((_, l), (_, r))| Ok(format!("({} = {})", self.render(l)?, self.render(r)?)))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(if pairs.len() == 1 {
            pairs.concat()
        } else {
            format!("({})", pairs.join(" AND "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Param, ValueType};
    use crate::model::SourceDescriptor;

    fn params() -> (Param, Param) {
        (
            Param::new("o", ValueType::Record("Order".into())),
            Param::new("c", ValueType::Record("Customer".into())),
        )
    }

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| (*s).to_string()).collect()
    }

    fn join_model(within: Option<u64>, forbid: bool) -> QueryModel {
        let (o, c) = params();
        let on = Lambda::new(
            vec![o.clone(), c.clone()],
            Expr::eq(o.field("CustomerId", ValueType::Int), c.field("Id", ValueType::Int)),
        );
        let mut b = QueryModel::builder()
            .source(SourceDescriptor::new("Order"))
            .join(SourceDescriptor::new("Customer"), on);
        if let Some(w) = within {
            b = b.within(w);
        }
        if forbid {
            b = b.forbid_default_within();
        }
        b.build()
    }

    #[test]
    fn test_single_source() {
        let model = QueryModel::builder().source(SourceDescriptor::new("Order")).build();
        let from = FromClause::build(&model, &names(&["ORDERS"]), 300).unwrap();
        assert_eq!(from.sql, "FROM ORDERS");
        assert_eq!(from.aliases[0].alias, "o");
        assert_eq!(from.aliases[0].source_name, "ORDERS");
        assert!(from.join.is_none());
    }

    #[test]
    fn test_forced_primary_alias() {
        let model = QueryModel::builder().source(SourceDescriptor::new("Order")).build();
        let from = FromClause::build_aliased(&model, &names(&["ORDERS"]), 300, true).unwrap();
        assert_eq!(from.sql, "FROM ORDERS o");
    }

    #[test]
    fn test_join_uses_default_within() {
        let from = FromClause::build(&join_model(None, false), &names(&["ORDERS", "CUSTOMERS"]), 300)
            .unwrap();
        assert_eq!(
            from.sql,
            "FROM ORDERS o JOIN CUSTOMERS i WITHIN 300 SECONDS ON (o.CustomerId = i.Id)"
        );
        assert_eq!(from.aliases[1].alias, "i");
        assert_eq!(from.aliases[1].source_name, "CUSTOMERS");
    }

    #[test]
    fn test_join_explicit_within() {
        let from = FromClause::build(&join_model(Some(60), true), &names(&["A", "B"]), 300).unwrap();
        assert_eq!(from.join.map(|j| j.within_seconds), Some(60));
    }

    #[test]
    fn test_forbidden_default_within() {
        let err = FromClause::build(&join_model(None, true), &names(&["A", "B"]), 300).unwrap_err();
        assert!(err.to_string().contains("requires explicit Within"));
    }

    #[test]
    fn test_too_many_sources() {
        let model = QueryModel::builder().build();
        let err = FromClause::build(&model, &names(&["A", "B", "C"]), 300).unwrap_err();
        assert!(err.to_string().contains("Only up to 2 tables"));
        let err = FromClause::build(&model, &[], 300).unwrap_err();
        assert_eq!(err.to_string(), "Source types are required");
    }

    #[test]
    fn test_missing_join_condition() {
        let model = QueryModel::builder()
            .source(SourceDescriptor::new("A"))
            .source(SourceDescriptor::new("B"))
            .build();
        let err = FromClause::build(&model, &names(&["A", "B"]), 300).unwrap_err();
        assert_eq!(err.to_string(), "Join condition required for two table join");
    }

    #[test]
    fn test_unqualified_operand() {
        let (o, c) = params();
        let stray = Param::new("x", ValueType::Record("Other".into()));
        let on = Lambda::new(
            vec![o.clone(), c],
            Expr::eq(o.field("Id", ValueType::Int), stray.field("Id", ValueType::Int)),
        );
        let err = render_join_condition(&on, "o", "i").unwrap_err();
        assert!(err.to_string().contains("Unqualified column access"));
    }

    #[test]
    fn test_and_chain_and_composite() {
        let (o, c) = params();
        let on = Lambda::new(
            vec![o.clone(), c.clone()],
            Expr::and(
                Expr::eq(o.field("A", ValueType::Int), c.field("A", ValueType::Int)),
                Expr::eq(o.field("B", ValueType::Int), c.field("B", ValueType::Int)),
            ),
        );
        assert_eq!(
            render_join_condition(&on, "o", "i").unwrap(),
            "((o.A = i.A) AND (o.B = i.B))"
        );

        let composite = Lambda::new(
            vec![o.clone(), c.clone()],
            Expr::eq(
                Expr::record(vec![
                    ("A", o.field("A", ValueType::Int)),
                    ("B", o.field("B", ValueType::Int)),
                ]),
                Expr::record(vec![
                    ("A", c.field("A", ValueType::Int)),
                    ("B", c.field("B", ValueType::Int)),
                ]),
            ),
        );
        assert_eq!(
            render_join_condition(&composite, "o", "i").unwrap(),
            "((o.A = i.A) AND (o.B = i.B))"
        );
    }
}
