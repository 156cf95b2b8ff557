//! Windowed CREATE statements.
//!
//! A windowed statement is an ordinary CREATE with three edits applied to
//! the rendered text: an optional EMIT override, an optional FROM retarget
//! and the WINDOW clause injected right after the FROM source.

use regex::Regex;
use tracing::debug;

use super::create::CreatePlan;
use super::{non_blank, CreateTarget, HoppingTarget, StatementCompiler, WindowedTarget};
use crate::error::StatementError;
use crate::expr::{Expr, Lambda};
use crate::model::{adapt_hub_projection, ProjectionMetadata, QueryModel, SourceDescriptor};
use crate::scope::ModelScope;
use crate::translator::{SinkOptions, Timeframe, WindowClause};

const HOPPING_NEEDS_GROUP_BY: &str = "Hopping window requires GroupBy().";

impl StatementCompiler<'_> {
    /// Compiles a windowed `CREATE TABLE` over `target.timeframe`.
    ///
    /// The window is tumbling unless `target.hop_interval` is set. Unset
    /// sink partitions and replicas default to one. When the input is a
    /// per-second rows stream the projection is adapted to read hub columns.
    ///
    /// # Errors
    ///
    /// - [`StatementError::InvalidTarget`] for a blank name or timeframe
    /// - [`StatementError::Window`] for a hopping window without GROUP BY
    /// - everything [`Self::create`] returns
    pub fn create_windowed(
        &self,
        scope: &ModelScope,
        model: &QueryModel,
        target: &WindowedTarget,
    ) -> crate::Result<String> {
        scope.ensure(model)?;
        if target.name.trim().is_empty() {
            return Err(StatementError::InvalidTarget("name").into());
        }
        if target.timeframe.trim().is_empty() {
            return Err(StatementError::InvalidTarget("timeframe").into());
        }

        let window = match target.hop_interval {
            None => WindowClause::tumbling(target.timeframe.trim()),
            Some(advance) => {
                if !model.has_group_by() {
                    return Err(StatementError::Window(HOPPING_NEEDS_GROUP_BY.to_string()).into());
                }
                let size = Timeframe::parse(target.timeframe.trim()).to_duration();
                WindowClause::hopping(size, advance)
            }
        }
        .with_grace_seconds(model.grace_seconds());

        let adapted = self.hub_projection(model, target.input_override.as_deref());
        let select = adapted.as_ref().or(model.select());
        let create_target = CreateTarget::new(&target.name).with_options(target.options.clone());
        let plan = CreatePlan {
            target: &create_target,
            select,
            sink: SinkOptions::from_extras(model.extras()).with_default_sizing(),
            windowed: true,
            hopping: target.hop_interval.is_some(),
        };
        let (sql, kind) = self.assemble(model, &plan)?;
        let mut sql = decorate(
            sql,
            target.emit_override.as_deref(),
            target.input_override.as_deref(),
            &window,
        )?;
        if target.hop_interval.is_some() {
            sql = rewrite_window_start(&sql, select)?;
        }

        debug!(
            kind = %kind,
            target = %target.name,
            sources = model.sources().len(),
            windowed = true,
            timeframe = %target.timeframe,
            "compiled windowed CREATE statement"
        );
        Ok(sql)
    }

    /// Compiles a CREATE over the model's own hopping window.
    ///
    /// # Errors
    ///
    /// - [`StatementError::InvalidTarget`] for a blank name
    /// - [`StatementError::Window`] when the model has no hopping window or
    ///   no GROUP BY
    /// - everything [`Self::create`] returns
    pub fn create_hopping(
        &self,
        scope: &ModelScope,
        model: &QueryModel,
        target: &HoppingTarget,
    ) -> crate::Result<String> {
        scope.ensure(model)?;
        if target.target.name.trim().is_empty() {
            return Err(StatementError::InvalidTarget("name").into());
        }
        let hopping = model.hopping().ok_or_else(|| {
            StatementError::Window("Hopping window not specified on model".to_string())
        })?;
        if !model.has_group_by() {
            return Err(StatementError::Window(HOPPING_NEEDS_GROUP_BY.to_string()).into());
        }

        let plan = CreatePlan {
            target: &target.target,
            select: model.select(),
            sink: SinkOptions::from_extras(model.extras()).with_default_sizing(),
            windowed: true,
            hopping: true,
        };
        let (sql, kind) = self.assemble(model, &plan)?;
        let sql = decorate(
            sql,
            target.emit_override.as_deref(),
            target.input_override.as_deref(),
            &WindowClause::from(hopping),
        )?;
        let sql = rewrite_window_start(&sql, model.select())?;

        debug!(
            kind = %kind,
            target = %target.target.name,
            sources = model.sources().len(),
            windowed = true,
            "compiled hopping CREATE statement"
        );
        Ok(sql)
    }

    /// Compiles one tumbling statement per model timeframe, in model order.
    ///
    /// Returns `(timeframe, statement)` pairs; `name_for` names each
    /// statement from its timeframe.
    ///
    /// # Errors
    ///
    /// The first failure of [`Self::create_windowed`].
    pub fn create_all(
        &self,
        scope: &ModelScope,
        model: &QueryModel,
        name_for: impl Fn(&str) -> String,
    ) -> crate::Result<Vec<(String, String)>> {
        model
            .windows()
            .iter()
            .map(|timeframe| {
                let target = WindowedTarget::new(&name_for(timeframe), timeframe);
                let sql = self.create_windowed(scope, model, &target)?;
                Ok((timeframe.clone(), sql))
            })
            .collect()
    }

    /// Projection adapted for hub-rows input, memoizing its metadata.
    fn hub_projection(&self, model: &QueryModel, input_override: Option<&str>) -> Option<Lambda> {
        let select = model.select()?;
        let input = non_blank(input_override).map(str::to_string).or_else(|| {
            model.sources().first().map(SourceDescriptor::source_name)
        })?;
        if !self.config.is_hub_rows_source(&input) {
            return None;
        }
        let extras = model.extras();
        if extras.projection().is_some_and(|m| !m.is_hub_input) {
            return None;
        }

        let adapted = adapt_hub_projection(select);
        extras.projection_or_init(|| ProjectionMetadata::analyze(&adapted, self.catalog, true));
        debug!(input = %input, "projection adapted for hub rows input");
        Some(adapted)
    }
}

fn decorate(
    mut sql: String,
    emit: Option<&str>,
    input: Option<&str>,
    window: &WindowClause,
) -> Result<String, regex::Error> {
    if let Some(emit) = non_blank(emit) {
        sql = sql.replace("EMIT CHANGES", emit);
    }
    if let Some(input) = non_blank(input) {
        sql = retarget(&sql, input)?;
    }
    inject_window(&sql, &window.to_sql())
}

/// Replaces the identifier after the first FROM, keeping any alias.
fn retarget(sql: &str, input: &str) -> Result<String, regex::Error> {
    let from = Regex::new(r"(?i)\bFROM\s+([A-Za-z_]\w*)")?;
    let Some(ident) = from.captures(sql).and_then(|c| c.get(1)) else {
        return Ok(sql.to_string());
    };
    Ok(format!("{}{input}{}", &sql[..ident.start()], &sql[ident.end()..]))
}

/// Inserts `window` after the first FROM source (and its alias) that is
/// followed by a clause keyword or the statement end.
fn inject_window(sql: &str, window: &str) -> Result<String, regex::Error> {
    let from = Regex::new(r"(?i)\bFROM\s+([A-Za-z_]\w*)")?;
    let alias = Regex::new(r"^\s+([A-Za-z_]\w*)")?;
    let keyword = Regex::new(r"(?i)^\s+(JOIN|WINDOW|GROUP|EMIT|WHERE|ON|WITHIN)\b")?;
    let followed = |rest: &str| rest.starts_with(';') || keyword.is_match(rest);

    for caps in from.captures_iter(sql) {
        let Some(ident) = caps.get(1) else { continue };
        let rest = &sql[ident.end()..];
        let aliased_end = alias
            .captures(rest)
            .and_then(|c| c.get(1))
            .filter(|a| !keyword.is_match(&format!(" {}", a.as_str())))
            .map(|a| ident.end() + a.end())
            .filter(|end| followed(&sql[*end..]));
        let at = aliased_end.or_else(|| followed(rest).then_some(ident.end()));
        if let Some(at) = at {
            return Ok(format!("{} {window}{}", &sql[..at], &sql[at..]));
        }
    }
    Ok(sql.to_string())
}

/// Drops `WINDOWSTART AS x` projections and surfaces `EndTs` as the window
/// end. A projection that never calls `WindowStart()` loses every
/// `WINDOWSTART` column, `EndTs` included.
fn rewrite_window_start(sql: &str, select: Option<&Lambda>) -> Result<String, regex::Error> {
    let strip = Regex::new(r"(?i)WINDOWSTART\s+AS\s+[A-Za-z_]\w*[ \t]*,?[ \t]*")?;
    let end_ts = Regex::new(r"(?i)WINDOWSTART\s+(?:AS\s+)?ENDTS\b")?;
    let dangling = Regex::new(r",\s*\nFROM\b")?;

    let calls_window_start = select.is_some_and(|s| {
        s.body
            .any(&|e| matches!(e, Expr::Call(c) if c.name == "WindowStart"))
    });
    let mut sql = sql.to_string();
    if !calls_window_start {
        sql = strip.replace_all(&sql, "").into_owned();
    }
    sql = end_ts.replace_all(&sql, "WINDOWEND AS EndTs").into_owned();
    sql = strip.replace_all(&sql, "").into_owned();
    Ok(dangling.replace_all(&sql, "\nFROM").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_after_bare_source() {
        let sql = "SELECT *\nFROM Trades\nGROUP BY Symbol\nEMIT CHANGES;";
        assert_eq!(
            inject_window(sql, "WINDOW TUMBLING (SIZE 1 MINUTES)").unwrap(),
            "SELECT *\nFROM Trades WINDOW TUMBLING (SIZE 1 MINUTES)\nGROUP BY Symbol\nEMIT CHANGES;"
        );
    }

    #[test]
    fn test_inject_after_alias() {
        let sql = "SELECT o.Id\nFROM Trades o JOIN Quotes i WITHIN 300 SECONDS ON (o.Id = i.Id)\nEMIT CHANGES;";
        let out = inject_window(sql, "WINDOW TUMBLING (SIZE 5 MINUTES)").unwrap();
        assert!(out.contains("FROM Trades o WINDOW TUMBLING (SIZE 5 MINUTES) JOIN Quotes i"));
    }

    #[test]
    fn test_keyword_not_taken_for_alias() {
        let sql = "SELECT *\nFROM Trades\nWHERE (Price > 0)\nEMIT CHANGES;";
        let out = inject_window(sql, "WINDOW TUMBLING (SIZE 1 HOURS)").unwrap();
        assert!(out.contains("FROM Trades WINDOW TUMBLING (SIZE 1 HOURS)\nWHERE"));
    }

    #[test]
    fn test_no_injection_point_leaves_sql() {
        let sql = "SELECT 1 FROM";
        assert_eq!(inject_window(sql, "WINDOW X").unwrap(), sql);
    }

    #[test]
    fn test_retarget_first_from() {
        let sql = "SELECT *\nFROM RATES\nEMIT CHANGES;";
        assert_eq!(
            retarget(sql, "deduprates_1s_rows").unwrap(),
            "SELECT *\nFROM deduprates_1s_rows\nEMIT CHANGES;"
        );
    }

    #[test]
    fn test_window_start_projection_removed() {
        let sql = "SELECT UserId AS UserId, WINDOWSTART AS BucketStart, COUNT(*) AS Cnt\nFROM V\nEMIT CHANGES;";
        assert_eq!(
            rewrite_window_start(sql, None).unwrap(),
            "SELECT UserId AS UserId, COUNT(*) AS Cnt\nFROM V\nEMIT CHANGES;"
        );

        let trailing = "SELECT COUNT(*) AS Cnt, WINDOWSTART AS BucketStart\nFROM V\nEMIT CHANGES;";
        assert_eq!(
            rewrite_window_start(trailing, None).unwrap(),
            "SELECT COUNT(*) AS Cnt\nFROM V\nEMIT CHANGES;"
        );
    }

    #[test]
    fn test_end_ts_surfaces_window_end() {
        use crate::expr::{MethodCall, Param, ValueType};

        let g = Param::new(
            "g",
            ValueType::Grouping {
                key: Box::new(ValueType::String),
                element: Box::new(ValueType::Record("View".into())),
            },
        );
        let select = Lambda::new(
            vec![g.clone()],
            Expr::record(vec![(
                "EndTs",
                Expr::Call(MethodCall::extension("WindowStart", vec![g.expr()], ValueType::DateTime)),
            )]),
        );
        let sql = "SELECT WINDOWSTART AS EndTs\nFROM V\nEMIT CHANGES;";
        assert_eq!(
            rewrite_window_start(sql, Some(&select)).unwrap(),
            "SELECT WINDOWEND AS EndTs\nFROM V\nEMIT CHANGES;"
        );
    }
}
