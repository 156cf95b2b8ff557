//! `CREATE {STREAM|TABLE} ... AS SELECT` assembly.

use tracing::{debug, trace};

use super::partition::{
    dedup_partition, merge_into_group_by, normalize_partition, partition_keys,
};
use super::rewrite::{alias_scopes, apply_key_style, key_bindings, Dealias};
use super::{non_blank, resolve_sources, CreateTarget, StatementCompiler};
use crate::clause::{GroupByBuilder, HavingBuilder, ParamAliases, SelectBuilder, WhereBuilder};
use crate::error::StatementError;
use crate::expr::Lambda;
use crate::model::{keys, HubSelection, QueryModel, SourceDescriptor};
use crate::scope::ModelScope;
use crate::translator::{FromClause, ObjectKind, SinkOptions, WithClause, PRIMARY_ALIAS};

/// Inputs of one CREATE assembly.
pub(super) struct CreatePlan<'t> {
    pub target: &'t CreateTarget,
    /// Projection to render; may differ from the model's own
    pub select: Option<&'t Lambda>,
    pub sink: SinkOptions,
    /// A WINDOW clause will be injected after assembly
    pub windowed: bool,
    /// The injected window hops rather than tumbles
    pub hopping: bool,
}

/// Rendered clause bodies, without keywords.
#[derive(Debug, Default)]
struct Clauses {
    from: String,
    select: String,
    where_clause: Option<String>,
    group_by: Option<String>,
    having: Option<String>,
    partition: Option<String>,
}

impl StatementCompiler<'_> {
    /// Compiles `model` into `CREATE {STREAM|TABLE} IF NOT EXISTS`.
    ///
    /// The statement is a TABLE when the model aggregates or when the
    /// requested partition columns were folded into GROUP BY.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::WrongModel`](crate::ScopeError::WrongModel) when
    ///   `scope` belongs to another model
    /// - [`StatementError::InvalidTarget`] for a blank name
    /// - source and join shape failures, see [`FromClause::build`]
    /// - clause translation failures
    pub fn create(
        &self,
        scope: &ModelScope,
        model: &QueryModel,
        target: &CreateTarget,
    ) -> crate::Result<String> {
        scope.ensure(model)?;
        if target.name.trim().is_empty() {
            return Err(StatementError::InvalidTarget("name").into());
        }

        let plan = CreatePlan {
            target,
            select: model.select(),
            sink: SinkOptions::from_extras(model.extras()),
            windowed: false,
            hopping: false,
        };
        let (sql, kind) = self.assemble(model, &plan)?;
        debug!(
            kind = %kind,
            target = %target.name,
            sources = model.sources().len(),
            windowed = false,
            "compiled CREATE statement"
        );
        Ok(sql)
    }

    pub(super) fn assemble(
        &self,
        model: &QueryModel,
        plan: &CreatePlan<'_>,
    ) -> crate::Result<(String, ObjectKind)> {
        let target = plan.target;
        let sources = model.sources();
        let names = resolve_sources(sources, target.source_resolver.as_ref());
        let from = FromClause::build(model, &names, self.config.default_within_seconds)?;

        let mut clauses = Clauses {
            from: from.sql.clone(),
            ..Clauses::default()
        };
        clauses.group_by = self.group_by_clause(model)?;
        let (select, force_preserve) = self.select_clause(model, plan, clauses.group_by.as_deref())?;
        clauses.select = select;
        clauses.where_clause = self.where_clause(model)?;
        clauses.having = model
            .having()
            .map(|h| HavingBuilder::new(self.translator(), &ParamAliases::none()).build(h))
            .transpose()?;
        clauses.partition = self.retained_partition(model, plan);

        let bindings = key_bindings(model, target.options.key_path_style);
        clauses.from = apply_key_style(&clauses.from, &bindings)?;
        clauses.select = apply_key_style(&clauses.select, &bindings)?;
        for clause in [
            &mut clauses.group_by,
            &mut clauses.partition,
            &mut clauses.where_clause,
            &mut clauses.having,
        ]
        .into_iter()
        .flatten()
        {
            *clause = apply_key_style(clause, &bindings)?;
        }

        let scopes = alias_scopes(&from, sources);
        let dealias = Dealias::new(&scopes);
        let preserve = model.primary_source_requires_alias() || force_preserve;
        clauses.select = dealias.select(&clauses.select, preserve)?;
        for clause in [
            &mut clauses.group_by,
            &mut clauses.partition,
            &mut clauses.where_clause,
            &mut clauses.having,
        ]
        .into_iter()
        .flatten()
        {
            *clause = dealias.clause(clause)?;
        }

        let mut merged = false;
        if let Some(partition) = clauses.partition.take() {
            let partition = dedup_partition(&partition);
            let (group_by, used) = merge_into_group_by(clauses.group_by.as_deref(), &partition);
            debug!(partition = %partition, merged = used, "partition folded into GROUP BY");
            clauses.group_by = group_by;
            merged = used;
        }

        let aggregate = model.is_aggregate_query(self.catalog);
        let kind = if aggregate || merged {
            ObjectKind::Table
        } else {
            ObjectKind::Stream
        };

        // RETENTION_MS applies to streams and tumbling tables only
        let tumbling = if plan.windowed {
            !plan.hopping
        } else {
            !model.windows().is_empty() && !model.has_hopping()
        };
        let with = WithClause::new(&target.name)
            .with_key(sources.iter().any(SourceDescriptor::has_keys))
            .with_key_schema(target.key_schema_full_name.as_deref())
            .with_value_schema(target.value_schema_full_name.as_deref())
            .with_cleanup_policy(target.cleanup_policy.as_deref())
            .with_timestamp(target.timestamp_column.as_deref())
            .with_sink(&plan.sink)
            .with_retention(if !aggregate || tumbling {
                plan.sink.retention_ms
            } else {
                None
            });

        Ok((compose(&target.name, kind, &with, &clauses), kind))
    }

    fn group_by_clause(&self, model: &QueryModel) -> crate::Result<Option<String>> {
        let Some(key) = model.group_by() else {
            return Ok(None);
        };
        let aliases = ParamAliases::for_sources(
            &key.params,
            model.sources().len(),
            model.primary_source_requires_alias(),
        );
        let body = GroupByBuilder::new(self.translator(), &aliases, self.config.max_group_by_keys)
            .build(key)?;
        Ok(Some(body))
    }

    /// SELECT body and whether alias qualifiers must survive dealiasing.
    fn select_clause(
        &self,
        model: &QueryModel,
        plan: &CreatePlan<'_>,
        group_by: Option<&str>,
    ) -> crate::Result<(String, bool)> {
        let Some(projection) = plan.select else {
            return Ok(("*".to_string(), false));
        };
        let extras = model.extras();
        let aliases = ParamAliases::for_sources(
            &projection.params,
            model.sources().len(),
            model.primary_source_requires_alias(),
        );

        if let Some(result) = &plan.target.options.result_type {
            let body = SelectBuilder::new(self.translator(), &aliases)
                .with_group_keys(group_by)
                .with_type_hints(result)
                .build(projection)?;
            return Ok((body, false));
        }

        let caller = extras.caller_selection()?;
        let (selection, hub_input) = match extras.projection().filter(|m| m.is_hub_input) {
            Some(meta) => {
                let available = extras.hub_available_columns()?;
                let derived = extras.hub_selection_or_init(|| {
                    HubSelection::derive(meta, self.catalog, available.as_ref())
                });
                let mut merged = derived.clone();
                merged.merge(caller);
                trace!(
                    overrides = merged.overrides.len(),
                    excluded = merged.exclude.len(),
                    "hub selection resolved"
                );
                (merged, true)
            }
            None => (caller, false),
        };

        let builder = SelectBuilder::new(self.translator(), &aliases).with_group_keys(group_by);
        if hub_input || extras.contains(keys::SELECT_OVERRIDES) {
            let source_alias = if aliases.contains_alias(PRIMARY_ALIAS) {
                PRIMARY_ALIAS
            } else {
                ""
            };
            let body = builder.with_hub(&selection, source_alias).build(projection)?;
            Ok((body, !source_alias.is_empty()))
        } else if selection.exclude.is_empty() {
            Ok((builder.build(projection)?, false))
        } else {
            Ok((builder.with_exclude(&selection.exclude).build(projection)?, false))
        }
    }

    fn where_clause(&self, model: &QueryModel) -> crate::Result<Option<String>> {
        let Some(predicate) = model.where_condition() else {
            return Ok(None);
        };
        let aliases = ParamAliases::for_filter(&predicate.params, model.primary_source_requires_alias());
        Ok(Some(WhereBuilder::new(self.translator(), &aliases).build(predicate)?))
    }

    /// Partition columns kept for a GROUP BY rekey.
    ///
    /// Only a plain, single-source stream without grouping, windows or a
    /// final emit is rekeyed, and only when the columns are not already its
    /// declared key.
    fn retained_partition(&self, model: &QueryModel, plan: &CreatePlan<'_>) -> Option<String> {
        let partition = non_blank(plan.target.partition_by.as_deref())
            .map(normalize_partition)
            .filter(|p| !p.is_empty())?;

        let [source] = model.sources() else {
            debug!(partition = %partition, "partition dropped: joined sources");
            return None;
        };
        let plain = !source.is_table()
            && !model.has_group_by()
            && !plan.windowed
            && model.windows().is_empty()
            && !model.has_hopping()
            && !model.extras().has_emit_final();
        if !plain {
            debug!(partition = %partition, "partition dropped: grouped, windowed or final");
            return None;
        }

        let key_names = source.key_names();
        let requested = partition_keys(&partition);
        let matches_key = !key_names.is_empty()
            && requested.len() == key_names.len()
            && requested.iter().all(|k| key_names.contains(k));
        if matches_key {
            debug!(partition = %partition, "partition dropped: already keyed");
            return None;
        }
        Some(partition)
    }
}

fn compose(name: &str, kind: ObjectKind, with: &WithClause, clauses: &Clauses) -> String {
    let mut sql = format!(
        "CREATE {kind} IF NOT EXISTS {name} {with} AS\nSELECT {}\n{}",
        clauses.select, clauses.from
    );
    if let Some(w) = &clauses.where_clause {
        sql.push_str("\nWHERE ");
        sql.push_str(w);
    }
    if let Some(g) = &clauses.group_by {
        sql.push_str("\nGROUP BY ");
        sql.push_str(g);
    }
    if let Some(h) = &clauses.having {
        sql.push_str("\nHAVING ");
        sql.push_str(h);
    }
    sql.push_str("\nEMIT CHANGES;");
    sql
}
