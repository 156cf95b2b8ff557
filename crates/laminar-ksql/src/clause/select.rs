//! SELECT list builder.
//!
//! Renders a projection lambda into a comma-separated column list:
//!
//! ```text
//! g => new { g.Key.Symbol, Total = g.Sum(x => x.Price) }
//!   => SYMBOL AS Symbol, SUM(PRICE) AS Total
//! ```
//!
//! Two optional modes change the output. Type hints wrap decimal members in
//! an explicit `CAST`. Hub mode redirects aggregates onto the
//! pre-aggregated columns of a per-second rows stream.

use std::collections::BTreeSet;

use super::{ensure_output, validate_expression, validate_no_nested_aggregates, ClauseKind, ParamAliases};
use crate::config::{DecimalConfig, DecimalSetting};
use crate::error::TranslateError;
use crate::expr::{sanitize_upper, BinaryOp, Expr, Lambda, MemberAccess, MethodCall, RecordExpr, UnaryOp, ValueType};
use crate::model::{is_aggregate_call, HubSelection, SourceDescriptor};
use crate::translator::{ExpressionTranslator, MemberResolver};

const MIXED_AGGREGATES: &str =
    "SELECT clause cannot mix aggregate functions with non-aggregate columns without GROUP BY";

const KEY_ORDER_MISMATCH: &str = "The order of GroupBy keys does not match the output DTO definition. \
     Please ensure they are the same order.";

/// Output record shape used to derive per-member cast hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultType {
    /// Record type name, used for `"Type.Member"` decimal overrides
    pub name: String,
    /// Members in declaration order
    pub members: Vec<(String, ValueType)>,
    /// Precision/scale declared on individual members
    pub declared: Vec<(String, DecimalSetting)>,
}

impl ResultType {
    /// Creates an empty result type.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
            declared: Vec::new(),
        }
    }

    /// Result type mirroring the columns of `source`, carrying each
    /// column's declared decimal precision.
    #[must_use]
    pub fn from_source(source: &SourceDescriptor) -> Self {
        let mut result = Self::new(&source.type_name);
        for column in &source.columns {
            result.members.push((column.name.clone(), column.ty.clone()));
            if let Some(setting) = column.decimal {
                result.declared.push((column.name.clone(), setting));
            }
        }
        result
    }

    /// Adds a member.
    #[must_use]
    pub fn with_member(mut self, name: &str, ty: ValueType) -> Self {
        self.members.push((name.to_string(), ty));
        self
    }

    /// Cast hints for every member. A declared precision wins; otherwise
    /// precision and scale resolve through `decimal`.
    #[must_use]
    pub fn hints(&self, decimal: &DecimalConfig) -> Vec<(String, TypeHint)> {
        self.members
            .iter()
            .map(|(member, ty)| {
                let setting = self
                    .declared
                    .iter()
                    .find(|(name, _)| name == member)
                    .map_or_else(|| decimal.resolve(&self.name, member), |(_, s)| *s);
                (
                    member.clone(),
                    TypeHint {
                        ty: ty.clone(),
                        precision: setting.precision,
                        scale: setting.scale,
                    },
                )
            })
            .collect()
    }
}

/// Cast hint for one output member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeHint {
    /// Declared member type
    pub ty: ValueType,
    /// Decimal precision
    pub precision: u8,
    /// Decimal scale
    pub scale: u8,
}

impl TypeHint {
    fn apply(&self, column: &str) -> Option<String> {
        if !matches!(self.ty.underlying(), ValueType::Decimal) || column.starts_with("CAST(") {
            return None;
        }
        Some(format!(
            "CAST({column} AS DECIMAL({}, {}))",
            self.precision, self.scale
        ))
    }
}

#[derive(Debug, Clone)]
struct HubMode<'a> {
    selection: &'a HubSelection,
    source_alias: String,
}

/// Builds the SELECT column list.
#[derive(Debug, Clone)]
pub struct SelectBuilder<'a> {
    translator: ExpressionTranslator<'a>,
    aliases: &'a ParamAliases,
    hints: Vec<(String, TypeHint)>,
    hub: Option<HubMode<'a>>,
    exclude: BTreeSet<String>,
    group_keys: Option<String>,
}

impl<'a> SelectBuilder<'a> {
    /// Creates a builder with no hints, no hub mode and no exclusions.
    #[must_use]
    pub fn new(translator: ExpressionTranslator<'a>, aliases: &'a ParamAliases) -> Self {
        Self {
            translator,
            aliases,
            hints: Vec::new(),
            hub: None,
            exclude: BTreeSet::new(),
            group_keys: None,
        }
    }

    /// Wraps decimal members of `result` in explicit casts.
    #[must_use]
    pub fn with_type_hints(mut self, result: &ResultType) -> Self {
        self.hints = result.hints(self.translator.decimal());
        self
    }

    /// Enables hub mode. `source_alias` qualifies override columns; pass
    /// an empty string for an unaliased source.
    #[must_use]
    pub fn with_hub(mut self, selection: &'a HubSelection, source_alias: &str) -> Self {
        self.hub = Some(HubMode {
            selection,
            source_alias: source_alias.to_string(),
        });
        self
    }

    /// Drops the named output members.
    #[must_use]
    pub fn with_exclude(mut self, exclude: &BTreeSet<String>) -> Self {
        self.exclude.extend(exclude.iter().cloned());
        self
    }

    /// GROUP BY body, used to expand grouping-key members.
    #[must_use]
    pub fn with_group_keys(mut self, keys: Option<&str>) -> Self {
        self.group_keys = keys.map(str::to_string).filter(|k| !k.trim().is_empty());
        self
    }

    /// Renders `projection`.
    ///
    /// # Errors
    ///
    /// - [`TranslateError::InvalidExpression`] for oversized expressions and
    ///   member accesses not rooted at a source parameter
    /// - [`TranslateError::Clause`] for mixed aggregates, nested aggregates
    ///   and key-order mismatches
    /// - call translation failures
    pub fn build(&self, projection: &Lambda) -> Result<String, TranslateError> {
        validate_expression(&projection.body)?;
        validate_no_nested_aggregates(&projection.body, self.translator.catalog())?;

        let mut out = Projection::default();
        match projection.body.as_ref() {
            Expr::Parameter(_) => {}
            Expr::Record(record) => self.record(projection, record, &mut out)?,
            other => {
                let column = self.render(other, None)?;
                out.items.push(column);
            }
        }

        let body = if out.items.is_empty() {
            "*".to_string()
        } else {
            out.items.join(", ")
        };
        ensure_output(ClauseKind::Select, body)
    }

    fn record(
        &self,
        projection: &Lambda,
        record: &RecordExpr,
        out: &mut Projection,
    ) -> Result<(), TranslateError> {
        if !record.is_anonymous() {
            self.validate_key_order(record)?;
        }

        let grouping = projection.has_grouping_param();
        let catalog = self.translator.catalog();
        let mut seen_aggregate = false;
        let mut seen_plain = false;

        for (name, expr) in &record.members {
            if is_group_key_object(expr) {
                self.add_group_key_columns(out);
                continue;
            }

            if !grouping {
                let aggregate = is_aggregate_expression(expr, catalog);
                if (aggregate && seen_plain) || (!aggregate && seen_aggregate) {
                    return Err(TranslateError::Clause(MIXED_AGGREGATES.to_string()));
                }
                seen_aggregate |= aggregate;
                seen_plain |= !aggregate;
            }

            let column = self.render(expr, Some(name))?;
            let column = self.non_aggregate_override(column, expr, name);
            let alias = out.unique(name);
            if self.is_excluded(name) || self.is_excluded(&alias) {
                out.used.remove(&alias);
                continue;
            }
            out.items.push(self.apply_type_cast(&column, &alias));
        }
        Ok(())
    }

    fn is_excluded(&self, alias: &str) -> bool {
        self.exclude.iter().any(|e| e.eq_ignore_ascii_case(alias))
            || self.hub.as_ref().is_some_and(|h| h.selection.is_excluded(alias))
    }

    fn apply_type_cast(&self, column: &str, alias: &str) -> String {
        let cast = self
            .hints
            .iter()
            .find(|(member, _)| member == alias)
            .and_then(|(_, hint)| hint.apply(column));
        match cast {
            Some(cast) => format!("{cast} AS {alias}"),
            None => format!("{column} AS {alias}"),
        }
    }

    fn key_columns(&self) -> Vec<(String, String)> {
        let Some(keys) = &self.group_keys else {
            return Vec::new();
        };
        keys.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| (k.to_string(), trailing_identifier(k).to_string()))
            .collect()
    }

    fn add_group_key_columns(&self, out: &mut Projection) {
        for (expr, alias) in self.key_columns() {
            if self.is_excluded(&alias) || out.used.iter().any(|u| u.eq_ignore_ascii_case(&alias)) {
                continue;
            }
            out.items.push(format!("{expr} AS {alias}"));
            out.used.insert(alias);
        }
    }

    fn validate_key_order(&self, record: &RecordExpr) -> Result<(), TranslateError> {
        let keys = self.key_columns();
        if keys.is_empty() || record.members.iter().any(|(_, e)| is_group_key_object(e)) {
            return Ok(());
        }
        let dto_keys: Vec<&str> = record
            .members
            .iter()
            .filter(|(_, e)| is_group_key_member(e))
            .map(|(name, _)| name.as_str())
            .collect();
        let ordered = dto_keys.len() == keys.len()
            && dto_keys
                .iter()
                .zip(&keys)
                .all(|(dto, (_, alias))| dto.eq_ignore_ascii_case(alias));
        if ordered {
            Ok(())
        } else {
            Err(TranslateError::Clause(KEY_ORDER_MISMATCH.to_string()))
        }
    }

    fn scope<'s>(&'s self, current: Option<&str>) -> SelectScope<'s, 'a> {
        let hub_alias = self.hub.as_ref().and_then(|h| {
            let has_override = current.and_then(|c| h.selection.override_for(c)).is_some();
            (has_override && !h.source_alias.is_empty()).then_some(h.source_alias.as_str())
        });
        SelectScope {
            builder: self,
            hub_alias,
        }
    }

    fn render(&self, expr: &Expr, current: Option<&str>) -> Result<String, TranslateError> {
        let scope = self.scope(current);
        match expr {
            Expr::Call(call) => match self.hub_aggregate(call, current)? {
                Some(sql) => Ok(sql),
                None => self.translator.translate_call(call, &scope),
            },
            Expr::Member(m) => scope.resolve(m),
            Expr::Constant(lit) => Ok(lit.to_sql()),
            Expr::Parameter(_) => Ok("*".to_string()),
            Expr::Lambda(l) => self.render(&l.body, current),
            Expr::Unary { op, operand, .. } => {
                let inner = self.render(operand, current)?;
                Ok(match op {
                    UnaryOp::Convert => inner,
                    UnaryOp::Not => format!("NOT ({inner})"),
                    UnaryOp::Negate => format!("-{inner}"),
                })
            }
            Expr::Binary { op, left, right } => {
                let l = self.render(left, current)?;
                let r = self.render(right, current)?;
                Ok(match op {
                    BinaryOp::Coalesce => format!("COALESCE({l}, {r})"),
                    BinaryOp::NotEqual => format!("({l} <> {r})"),
                    _ => format!("({l} {} {r})", crate::translator::binary_operator(*op)),
                })
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                let t = self.render(test, current)?;
                let a = self.render(if_true, current)?;
                let b = self.render(if_false, current)?;
                Ok(format!("CASE WHEN {t} THEN {a} ELSE {b} END"))
            }
            Expr::Record(_) => Err(TranslateError::InvalidExpression(
                "Nested record construction is not supported in SELECT".to_string(),
            )),
        }
    }

    fn hub_aggregate(
        &self,
        call: &MethodCall,
        current: Option<&str>,
    ) -> Result<Option<String>, TranslateError> {
        let (Some(hub), Some(current)) = (&self.hub, current) else {
            return Ok(None);
        };
        let catalog = self.translator.catalog();
        let Some(mapping) = catalog.get(&call.name).filter(|_| catalog.is_aggregate(&call.name)) else {
            return Ok(None);
        };
        let Some(target) = hub
            .selection
            .override_for(current)
            .map(|o| o.target_column.trim())
            .filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };

        let column = if target.contains('.') || hub.source_alias.is_empty() {
            target.to_string()
        } else {
            format!("{}.{target}", hub.source_alias)
        };
        let name = call.name.to_ascii_uppercase();
        if name == "AVERAGE" || name == "AVG" {
            let leaf = column.rsplit('.').next().unwrap_or(&column);
            if leaf.to_ascii_uppercase().starts_with("SUM") {
                return Ok(Some(format!("(SUM({column}) / SUM(CNT))")));
            }
            return Ok(Some(format!("AVG({column})")));
        }
        mapping.render(&[column]).map(Some)
    }

    fn non_aggregate_override(&self, column: String, original: &Expr, alias: &str) -> String {
        let Some(hub) = &self.hub else {
            return column;
        };
        let catalog = self.translator.catalog();
        let inner = original.unwrap_convert();
        let mapped_aggregate = matches!(
            inner,
            Expr::Call(c) if catalog.get(&c.name).is_some() && catalog.is_aggregate(&c.name)
        );
        if mapped_aggregate || is_group_key_member(inner) {
            return column;
        }

        let Some(rule) = hub.selection.override_for(alias) else {
            return column;
        };
        let target = rule.target_column.trim();
        if target.is_empty() {
            return column;
        }
        let function = rule
            .aggregate_function
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        if is_aggregate_expression(inner, catalog)
            && (rule.aggregate_only || (target.eq_ignore_ascii_case(alias) && function.is_some()))
        {
            return column;
        }
        if rule.aggregate_only {
            return column;
        }

        match function.and_then(|f| catalog.get(f)) {
            Some(mapping) => mapping
                .render(&[target.to_string()])
                .unwrap_or_else(|_| format!("LATEST_BY_OFFSET({target})")),
            None => format!("LATEST_BY_OFFSET({target})"),
        }
    }
}

/// Output columns and the aliases already taken.
#[derive(Debug, Default)]
struct Projection {
    items: Vec<String>,
    used: BTreeSet<String>,
}

impl Projection {
    fn unique(&mut self, name: &str) -> String {
        let mut alias = name.to_string();
        let mut n = 1;
        while self.used.contains(&alias) {
            alias = format!("{name}_{n}");
            n += 1;
        }
        self.used.insert(alias.clone());
        alias
    }
}

/// Member rendering for one projected member.
struct SelectScope<'s, 'a> {
    builder: &'s SelectBuilder<'a>,
    hub_alias: Option<&'s str>,
}

impl MemberResolver for SelectScope<'_, '_> {
    fn resolve(&self, member: &MemberAccess) -> Result<String, TranslateError> {
        if member.name == "Length" && member.target.value_type().is_string() {
            let inner = self.builder.translator.translate(&member.target, self)?;
            return Ok(format!("LEN({inner})"));
        }

        let (Some(param), Some(path)) = (member.root_parameter(), member.path()) else {
            return Err(TranslateError::InvalidExpression(
                "Unqualified column access is not allowed. Use source parameter properties."
                    .to_string(),
            ));
        };
        let param_alias = self.builder.aliases.alias_for(&param.name);
        let prefix = param_alias.map(|a| format!("{a}.")).unwrap_or_default();

        if param.ty.is_grouping() && path.first() == Some(&"Key") {
            let rest: Vec<String> = path[1..].iter().map(|p| sanitize_upper(p)).collect();
            if rest.is_empty() {
                return Ok(self.builder.group_keys.clone().unwrap_or_default());
            }
            return Ok(format!("{prefix}{}", rest.join(".")));
        }
        if member.is_key {
            return Ok(format!("{prefix}{}", sanitize_upper(&member.name)));
        }

        let column = path.iter().map(|p| sanitize_upper(p)).collect::<Vec<_>>().join(".");
        let qualifier = param_alias
            .or(self.hub_alias)
            .or_else(|| self.builder.aliases.first_alias());
        Ok(match qualifier {
            Some(q) => format!("{q}.{column}"),
            None => column,
        })
    }
}

/// `g.Key` on a grouping parameter.
fn is_group_key_object(expr: &Expr) -> bool {
    matches!(
        expr.unwrap_convert(),
        Expr::Member(m) if m.name == "Key" && matches!(m.target.as_ref(), Expr::Parameter(p) if p.ty.is_grouping())
    )
}

/// `g.Key` or `g.Key.Field`.
fn is_group_key_member(expr: &Expr) -> bool {
    if is_group_key_object(expr) {
        return true;
    }
    matches!(expr.unwrap_convert(), Expr::Member(m) if is_group_key_object(&m.target))
}

/// True when `expr` aggregates at its top level (selector lambdas are not
/// searched).
fn is_aggregate_expression(expr: &Expr, catalog: &crate::catalog::FunctionCatalog) -> bool {
    match expr {
        Expr::Call(call) => {
            is_aggregate_call(call, catalog)
                || call
                    .receiver
                    .as_deref()
                    .is_some_and(|r| is_aggregate_expression(r, catalog))
                || call.args.iter().any(|a| is_aggregate_expression(a, catalog))
        }
        Expr::Unary { operand, .. } => is_aggregate_expression(operand, catalog),
        Expr::Binary { left, right, .. } => {
            is_aggregate_expression(left, catalog) || is_aggregate_expression(right, catalog)
        }
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => [test, if_true, if_false]
            .iter()
            .any(|e| is_aggregate_expression(e, catalog)),
        Expr::Record(r) => r.members.iter().any(|(_, e)| is_aggregate_expression(e, catalog)),
        Expr::Parameter(_) | Expr::Member(_) | Expr::Constant(_) | Expr::Lambda(_) => false,
    }
}

/// Trailing identifier of a key expression: `o.Symbol` gives `Symbol`,
/// `UPPER(Region)` gives `Region`.
fn trailing_identifier(key: &str) -> &str {
    let trimmed = key.strip_suffix(')').unwrap_or(key);
    let start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .last()
        .map_or(trimmed.len(), |(i, _)| i);
    let ident = trimmed[start..].trim_start_matches(|c: char| c.is_ascii_digit());
    if ident.is_empty() {
        key
    } else {
        ident
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FunctionCatalog;
    use crate::expr::Param;
    use crate::model::HubOverride;
    use std::sync::LazyLock;

    static DECIMAL: LazyLock<DecimalConfig> = LazyLock::new(DecimalConfig::default);
    static NO_ALIASES: LazyLock<ParamAliases> = LazyLock::new(ParamAliases::none);

    fn translator() -> ExpressionTranslator<'static> {
        ExpressionTranslator::new(FunctionCatalog::builtin(), &DECIMAL)
    }

    fn trade() -> Param {
        Param::new("t", ValueType::Record("Trade".into()))
    }

    fn grouping() -> Param {
        Param::new(
            "g",
            ValueType::Grouping {
                key: Box::new(ValueType::String),
                element: Box::new(ValueType::Record("Trade".into())),
            },
        )
    }

    fn aggregate(name: &str, field: &str, ty: ValueType) -> Expr {
        let x = trade();
        let selector = Expr::Lambda(Lambda::new(vec![x.clone()], x.field(field, ty.clone())));
        Expr::Call(MethodCall::extension(name, vec![grouping().expr(), selector], ty))
    }

    fn key_of(g: &Param) -> Expr {
        g.field("Key", ValueType::String)
    }

    #[test]
    fn test_plain_projection() {
        let t = trade();
        let select = Lambda::new(
            vec![t.clone()],
            Expr::record(vec![
                ("Symbol", t.field("Symbol", ValueType::String)),
                ("Price", t.field("Price", ValueType::Double)),
            ]),
        );
        let sql = SelectBuilder::new(translator(), &NO_ALIASES).build(&select).unwrap();
        assert_eq!(sql, "SYMBOL AS Symbol, PRICE AS Price");
    }

    #[test]
    fn test_parameter_selects_star() {
        let t = trade();
        let select = Lambda::new(vec![t.clone()], t.expr());
        let sql = SelectBuilder::new(translator(), &NO_ALIASES).build(&select).unwrap();
        assert_eq!(sql, "*");
    }

    #[test]
    fn test_duplicate_aliases_are_suffixed() {
        let t = trade();
        let select = Lambda::new(
            vec![t.clone()],
            Expr::Record(RecordExpr {
                type_name: None,
                members: vec![
                    ("Id".to_string(), t.field("Id", ValueType::Int)),
                    ("Id".to_string(), t.field("OrderId", ValueType::Int)),
                    ("Id".to_string(), t.field("Other", ValueType::Int)),
                ],
            }),
        );
        let sql = SelectBuilder::new(translator(), &NO_ALIASES).build(&select).unwrap();
        assert_eq!(sql, "ID AS Id, ORDERID AS Id_1, OTHER AS Id_2");
    }

    #[test]
    fn test_group_key_expansion() {
        let g = grouping();
        let select = Lambda::new(
            vec![g.clone()],
            Expr::record(vec![
                ("Symbol", key_of(&g)),
                ("Total", aggregate("Sum", "Price", ValueType::Double)),
            ]),
        );
        let sql = SelectBuilder::new(translator(), &NO_ALIASES)
            .with_group_keys(Some("Symbol"))
            .build(&select)
            .unwrap();
        assert_eq!(sql, "Symbol AS Symbol, SUM(PRICE) AS Total");
    }

    #[test]
    fn test_string_length() {
        let t = trade();
        let len = t
            .field("Symbol", ValueType::String)
            .field("Length", ValueType::Int);
        let select = Lambda::new(vec![t.clone()], Expr::record(vec![("SymbolLength", len)]));
        let sql = SelectBuilder::new(translator(), &NO_ALIASES).build(&select).unwrap();
        assert_eq!(sql, "LEN(SYMBOL) AS SymbolLength");
    }

    #[test]
    fn test_not_equal_and_coalesce() {
        let t = trade();
        let select = Lambda::new(
            vec![t.clone()],
            Expr::record(vec![
                (
                    "IsSell",
                    Expr::binary(BinaryOp::NotEqual, t.field("Side", ValueType::String), Expr::string("B")),
                ),
                (
                    "Venue",
                    Expr::binary(BinaryOp::Coalesce, t.field("Venue", ValueType::String), Expr::string("NA")),
                ),
            ]),
        );
        let sql = SelectBuilder::new(translator(), &NO_ALIASES).build(&select).unwrap();
        assert_eq!(sql, "(SIDE <> 'B') AS IsSell, COALESCE(VENUE, 'NA') AS Venue");
    }

    #[test]
    fn test_mixed_aggregates_rejected() {
        let t = trade();
        let total = Expr::Call(MethodCall::extension(
            "Sum",
            vec![t.expr(), t.field("Price", ValueType::Double)],
            ValueType::Double,
        ));
        let select = Lambda::new(
            vec![t.clone()],
            Expr::record(vec![("Symbol", t.field("Symbol", ValueType::String)), ("Total", total)]),
        );
        let err = SelectBuilder::new(translator(), &NO_ALIASES).build(&select).unwrap_err();
        assert_eq!(err.to_string(), MIXED_AGGREGATES);
    }

    #[test]
    fn test_decimal_type_hint() {
        let t = trade();
        let select = Lambda::new(
            vec![t.clone()],
            Expr::record(vec![
                ("Price", t.field("Price", ValueType::Decimal)),
                ("Symbol", t.field("Symbol", ValueType::String)),
            ]),
        );
        let result = ResultType::new("TradeView")
            .with_member("Price", ValueType::Decimal)
            .with_member("Symbol", ValueType::String);
        let sql = SelectBuilder::new(translator(), &NO_ALIASES)
            .with_type_hints(&result)
            .build(&select)
            .unwrap();
        assert_eq!(sql, "CAST(PRICE AS DECIMAL(18, 2)) AS Price, SYMBOL AS Symbol");
    }

    #[test]
    fn test_declared_decimal_wins() {
        let t = trade();
        let select = Lambda::new(
            vec![t.clone()],
            Expr::record(vec![
                ("Price", t.field("Price", ValueType::Decimal)),
                ("Fee", t.field("Fee", ValueType::Decimal)),
            ]),
        );
        let source = SourceDescriptor::new("Trade")
            .with_decimal("Price", 10, 4)
            .with_column("Fee", ValueType::Decimal);
        let result = ResultType::from_source(&source);
        let sql = SelectBuilder::new(translator(), &NO_ALIASES)
            .with_type_hints(&result)
            .build(&select)
            .unwrap();
        assert_eq!(
            sql,
            "CAST(PRICE AS DECIMAL(10, 4)) AS Price, CAST(FEE AS DECIMAL(18, 2)) AS Fee"
        );
    }

    #[test]
    fn test_exclusion() {
        let t = trade();
        let select = Lambda::new(
            vec![t.clone()],
            Expr::record(vec![
                ("Symbol", t.field("Symbol", ValueType::String)),
                ("Note", t.field("Note", ValueType::String)),
            ]),
        );
        let exclude = BTreeSet::from(["note".to_string()]);
        let sql = SelectBuilder::new(translator(), &NO_ALIASES)
            .with_exclude(&exclude)
            .build(&select)
            .unwrap();
        assert_eq!(sql, "SYMBOL AS Symbol");
    }

    #[test]
    fn test_hub_overrides() {
        let g = grouping();
        let select = Lambda::new(
            vec![g.clone()],
            Expr::record(vec![
                ("Symbol", key_of(&g)),
                ("AvgPrice", aggregate("Average", "Price", ValueType::Double)),
                ("High", aggregate("Max", "High", ValueType::Double)),
            ]),
        );
        let mut selection = HubSelection::default();
        selection
            .overrides
            .insert("AvgPrice".into(), HubOverride::for_aggregate("SUMPRICE", Some("Average")));
        selection
            .overrides
            .insert("High".into(), HubOverride::for_aggregate("MAXHIGH", Some("Max")));
        let sql = SelectBuilder::new(translator(), &NO_ALIASES)
            .with_hub(&selection, "")
            .with_group_keys(Some("Symbol"))
            .build(&select)
            .unwrap();
        assert_eq!(
            sql,
            "Symbol AS Symbol, (SUM(SUMPRICE) / SUM(CNT)) AS AvgPrice, MAX(MAXHIGH) AS High"
        );
    }

    #[test]
    fn test_hub_non_aggregate_override() {
        let g = grouping();
        let select = Lambda::new(
            vec![g.clone()],
            Expr::record(vec![
                ("Symbol", key_of(&g)),
                ("Close", Expr::convert(Expr::int(0), ValueType::Double)),
            ]),
        );
        let mut selection = HubSelection::default();
        selection.overrides.insert(
            "Close".into(),
            HubOverride {
                target_column: "LASTCLOSE".into(),
                aggregate_function: None,
                aggregate_only: false,
            },
        );
        let sql = SelectBuilder::new(translator(), &NO_ALIASES)
            .with_hub(&selection, "o")
            .with_group_keys(Some("Symbol"))
            .build(&select)
            .unwrap();
        assert_eq!(sql, "Symbol AS Symbol, LATEST_BY_OFFSET(LASTCLOSE) AS Close");
    }

    #[test]
    fn test_dto_key_order() {
        let g = Param::new(
            "g",
            ValueType::Grouping {
                key: Box::new(ValueType::Record("<anonymous>".into())),
                element: Box::new(ValueType::Record("Trade".into())),
            },
        );
        let key = g.field("Key", ValueType::Record("<anonymous>".into()));
        let ordered = Lambda::new(
            vec![g.clone()],
            Expr::named_record(
                "Bar",
                vec![
                    ("Broker", key.clone().field("Broker", ValueType::String)),
                    ("Symbol", key.clone().field("Symbol", ValueType::String)),
                ],
            ),
        );
        let builder = SelectBuilder::new(translator(), &NO_ALIASES).with_group_keys(Some("Broker, Symbol"));
        assert_eq!(
            builder.build(&ordered).unwrap(),
            "BROKER AS Broker, SYMBOL AS Symbol"
        );

        let reversed = Lambda::new(
            vec![g.clone()],
            Expr::named_record(
                "Bar",
                vec![
                    ("Symbol", key.clone().field("Symbol", ValueType::String)),
                    ("Broker", key.field("Broker", ValueType::String)),
                ],
            ),
        );
        let err = builder.build(&reversed).unwrap_err();
        assert!(err.to_string().starts_with("The order of GroupBy keys"));
    }

    #[test]
    fn test_unqualified_member_rejected() {
        let t = trade();
        let stray = Expr::Call(MethodCall::static_call("Clock", "Now", vec![], ValueType::DateTime))
            .field("Ticks", ValueType::Long);
        let select = Lambda::new(vec![t], Expr::record(vec![("Ticks", stray)]));
        let err = SelectBuilder::new(translator(), &NO_ALIASES).build(&select).unwrap_err();
        assert!(err.to_string().contains("Unqualified column access is not allowed"));
    }

    #[test]
    fn test_trailing_identifier() {
        assert_eq!(trailing_identifier("o.Symbol"), "Symbol");
        assert_eq!(trailing_identifier("UPPER(Region)"), "Region");
        assert_eq!(trailing_identifier("KEY->ID"), "ID");
        assert_eq!(trailing_identifier("Broker"), "Broker");
    }
}
