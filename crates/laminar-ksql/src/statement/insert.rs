//! `INSERT INTO ... SELECT` assembly.

use tracing::debug;

use super::{resolve_sources, InsertTarget, StatementCompiler};
use crate::clause::{GroupByBuilder, HavingBuilder, ParamAliases, SelectBuilder, WhereBuilder};
use crate::error::StatementError;
use crate::model::QueryModel;
use crate::scope::ModelScope;
use crate::translator::FromClause;

impl StatementCompiler<'_> {
    /// Compiles `model` into `INSERT INTO {target} SELECT ...`.
    ///
    /// The target already exists, so no WITH clause is rendered and the
    /// primary source is always aliased `o`.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::WrongModel`](crate::ScopeError::WrongModel) when
    ///   `scope` belongs to another model
    /// - [`StatementError::InvalidTarget`] for a blank target name
    /// - source and join shape failures, see [`FromClause::build`]
    /// - clause translation failures
    pub fn insert(
        &self,
        scope: &ModelScope,
        model: &QueryModel,
        target: &InsertTarget,
    ) -> crate::Result<String> {
        scope.ensure(model)?;
        if target.name.trim().is_empty() {
            return Err(StatementError::InvalidTarget("target name").into());
        }

        let sources = model.sources();
        let names = resolve_sources(sources, target.source_resolver.as_ref());
        let from = FromClause::build_aliased(model, &names, self.config.default_within_seconds, true)?;
        let translator = self.translator();
        let none = ParamAliases::none();

        let group_by = model
            .group_by()
            .map(|key| {
                GroupByBuilder::new(translator, &none, self.config.max_group_by_keys).build(key)
            })
            .transpose()?;
        let select = match model.select() {
            Some(projection) => {
                let aliases = ParamAliases::for_sources(&projection.params, sources.len(), true);
                SelectBuilder::new(translator, &aliases)
                    .with_group_keys(group_by.as_deref())
                    .build(projection)?
            }
            None => "*".to_string(),
        };
        let where_clause = model
            .where_condition()
            .map(|predicate| {
                let aliases = ParamAliases::for_filter(&predicate.params, true);
                WhereBuilder::new(translator, &aliases).build(predicate)
            })
            .transpose()?;
        let having = model
            .having()
            .map(|h| HavingBuilder::new(translator, &none).build(h))
            .transpose()?;

        let mut sql = format!("INSERT INTO {} SELECT {select}\n{}", target.name.trim(), from.sql);
        for (keyword, body) in [("WHERE", where_clause), ("GROUP BY", group_by), ("HAVING", having)] {
            if let Some(body) = body {
                sql.push('\n');
                sql.push_str(keyword);
                sql.push(' ');
                sql.push_str(&body);
            }
        }
        sql.push_str("\nEMIT CHANGES;");

        debug!(
            kind = "INSERT",
            target = %target.name,
            sources = sources.len(),
            windowed = false,
            "compiled INSERT statement"
        );
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Expr, Lambda, Param, ValueType};
    use crate::model::SourceDescriptor;

    fn order() -> SourceDescriptor {
        SourceDescriptor::new("Order")
            .with_topic("orders")
            .with_key("Id", ValueType::Int)
            .with_column("Amount", ValueType::Double)
    }

    #[test]
    fn test_insert_select_star() {
        let model = QueryModel::builder().source(order()).build();
        let scope = ModelScope::open(&model);
        let sql = StatementCompiler::default()
            .insert(&scope, &model, &InsertTarget::new("orders_archive"))
            .unwrap();
        assert_eq!(sql, "INSERT INTO orders_archive SELECT *\nFROM ORDERS o\nEMIT CHANGES;");
    }

    #[test]
    fn test_insert_keeps_aliases() {
        let o = Param::new("o", ValueType::Record("Order".into()));
        let model = QueryModel::builder()
            .source(order())
            .filter(Lambda::new(
                vec![o.clone()],
                Expr::binary(BinaryOp::GreaterThan, o.field("Amount", ValueType::Double), Expr::int(100)),
            ))
            .select(Lambda::new(
                vec![o.clone()],
                Expr::record(vec![("Amount", o.field("Amount", ValueType::Double))]),
            ))
            .build();
        let scope = ModelScope::open(&model);
        let sql = StatementCompiler::default()
            .insert(&scope, &model, &InsertTarget::new("big_orders"))
            .unwrap();
        assert!(sql.starts_with("INSERT INTO big_orders SELECT o.AMOUNT AS Amount\nFROM ORDERS o"));
        assert!(sql.contains("\nWHERE (o.Amount > 100)"));
        assert!(!sql.contains("WITH ("));
    }

    #[test]
    fn test_insert_blank_target() {
        let model = QueryModel::builder().source(order()).build();
        let scope = ModelScope::open(&model);
        let err = StatementCompiler::default()
            .insert(&scope, &model, &InsertTarget::new(""))
            .unwrap_err();
        assert_eq!(err.to_string(), "target name required");
    }
}
