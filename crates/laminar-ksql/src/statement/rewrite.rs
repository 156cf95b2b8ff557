//! Rewrites of rendered clause bodies.
//!
//! Two passes run after every clause is rendered:
//!
//! - key styling turns key-column references of table sources into key
//!   paths (`o.Id` becomes `KEY->ID`)
//! - dealiasing drops the short `o`/`i` qualifiers where they are not
//!   needed, or swaps them for the source name when a column exists on both
//!   sides of a join
//!
//! Both passes work on text, so the same key or alias appearing inside a
//! quoted identifier or as the target of an `AS` rename is left alone.

use std::collections::{BTreeMap, BTreeSet};

use regex::{Captures, Regex};

use super::partition::normalize_identifier;
use super::KeyPathStyle;
use crate::model::{QueryModel, SourceDescriptor};
use crate::translator::{FromClause, JOIN_ALIAS, PRIMARY_ALIAS};

const QUOTES: [char; 3] = ['`', '\'', '"'];

/// Key columns of one source alias and how to render them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyBinding {
    /// `o`, `i`, or empty for an unaliased primary source
    pub alias: String,
    /// Upper-cased key names in key order
    pub keys: Vec<String>,
    pub style: KeyPathStyle,
}

impl KeyBinding {
    fn for_source(alias: &str, source: &SourceDescriptor, requested: KeyPathStyle) -> Self {
        let style = match requested {
            KeyPathStyle::None if source.is_table() => KeyPathStyle::Arrow,
            other => other,
        };
        let mut keys: Vec<String> = Vec::new();
        for key in source.key_names() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Self {
            alias: alias.to_string(),
            keys,
            style,
        }
    }

    fn key_path(&self, key: &str) -> String {
        match self.style {
            KeyPathStyle::Arrow => format!("KEY->{key}"),
            KeyPathStyle::Dot => format!("key.{key}"),
            KeyPathStyle::None => key.to_string(),
        }
    }
}

/// Bindings for the primary source and the join target.
pub(crate) fn key_bindings(model: &QueryModel, requested: KeyPathStyle) -> Vec<KeyBinding> {
    let sources = model.sources();
    let mut bindings = Vec::with_capacity(2);
    if let Some(primary) = sources.first() {
        let alias = if model.primary_source_requires_alias() {
            PRIMARY_ALIAS
        } else {
            ""
        };
        bindings.push(KeyBinding::for_source(alias, primary, requested));
    }
    if let Some(joined) = sources.get(1) {
        bindings.push(KeyBinding::for_source(JOIN_ALIAS, joined, requested));
    }
    bindings
}

/// Rewrites key references of every styled binding.
///
/// A source with a single key also has a bare `KEY` reference expanded to
/// its key path. Unaliased keys are matched as whole words, except where
/// the word is the target of `AS`.
pub(crate) fn apply_key_style(clause: &str, bindings: &[KeyBinding]) -> Result<String, regex::Error> {
    let mut clause = clause.to_string();
    for binding in bindings {
        if binding.style == KeyPathStyle::None {
            continue;
        }

        if let [lone] = binding.keys.as_slice() {
            let standalone = Regex::new(r"(?i)\bKEY\b")?;
            let path = binding.key_path(lone);
            clause = replace_accepted(&clause, &standalone, &path, |h, start, end| {
                !h[end..].starts_with("->") && !renames(h, start)
            });
        }

        for key in &binding.keys {
            let path = binding.key_path(key);
            if binding.alias.is_empty() {
                let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(key)))?;
                clause = replace_accepted(&clause, &re, &path, |h, start, end| {
                    unprefixed(h, start, end) && !renames(h, start)
                });
            } else {
                let re = Regex::new(&format!(
                    r"(?i)\b{}\.{}\b",
                    regex::escape(&binding.alias),
                    regex::escape(key)
                ))?;
                clause = replace_accepted(&clause, &re, &path, unprefixed);
            }
        }
    }
    Ok(clause)
}

/// Replaces each match that `accept(haystack, start, end)` approves.
fn replace_accepted(
    haystack: &str,
    re: &Regex,
    replacement: &str,
    accept: impl Fn(&str, usize, usize) -> bool,
) -> String {
    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;
    for m in re.find_iter(haystack) {
        if accept(haystack, m.start(), m.end()) {
            out.push_str(&haystack[last..m.start()]);
            out.push_str(replacement);
            last = m.end();
        }
    }
    out.push_str(&haystack[last..]);
    out
}

/// Not already a key path and not inside quotes.
fn unprefixed(haystack: &str, start: usize, end: usize) -> bool {
    let before = &haystack[..start];
    !(ends_with_ignore_case(before, "KEY->")
        || ends_with_ignore_case(before, "key.")
        || before.ends_with(QUOTES)
        || haystack[end..].starts_with(QUOTES))
}

/// True when the word at `start` directly follows an `AS` keyword.
fn renames(haystack: &str, start: usize) -> bool {
    let before = haystack[..start].trim_end();
    if before.len() <= 1 {
        return false;
    }
    let word_start = before.trim_end_matches(char::is_alphabetic).len();
    before[word_start..].eq_ignore_ascii_case("AS")
}

fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.is_char_boundary(s.len() - suffix.len())
        && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// One alias with the source it names and that source's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AliasScope {
    pub alias: String,
    pub source_name: String,
    /// Normalized column identifiers
    pub columns: BTreeSet<String>,
}

/// Scopes for every alias bound by `from`.
pub(crate) fn alias_scopes(from: &FromClause, sources: &[SourceDescriptor]) -> Vec<AliasScope> {
    from.aliases
        .iter()
        .map(|a| {
            let source = match a.alias.as_str() {
                PRIMARY_ALIAS => sources.first(),
                JOIN_ALIAS => sources.get(1),
                _ => None,
            };
            AliasScope {
                alias: a.alias.clone(),
                source_name: a.source_name.clone(),
                columns: source
                    .map(|s| {
                        s.column_identifiers()
                            .iter()
                            .map(|c| normalize_identifier(c))
                            .filter(|c| !c.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// Removes or rewrites alias qualifiers.
#[derive(Debug)]
pub(crate) struct Dealias<'s> {
    scopes: &'s [AliasScope],
    ambiguous: BTreeSet<String>,
}

impl<'s> Dealias<'s> {
    pub(crate) fn new(scopes: &'s [AliasScope]) -> Self {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for column in scopes.iter().flat_map(|s| s.columns.iter()) {
            *counts.entry(column.as_str()).or_default() += 1;
        }
        let ambiguous = counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(c, _)| c.to_string())
            .collect();
        Self { scopes, ambiguous }
    }

    /// Columns present on more than one source.
    pub(crate) fn ambiguous(&self) -> &BTreeSet<String> {
        &self.ambiguous
    }

    /// Strips the alias from a single-source projection. Left unchanged
    /// when `preserve` is set, when several aliases are bound or when any
    /// column is ambiguous.
    pub(crate) fn select(&self, select: &str, preserve: bool) -> Result<String, regex::Error> {
        let [scope] = self.scopes else {
            return Ok(select.to_string());
        };
        if preserve || !self.ambiguous.is_empty() {
            return Ok(select.to_string());
        }

        let alias = regex::escape(&scope.alias);
        let backtick = Regex::new(&format!(r"(?i)\b{alias}\.`(?P<column>[^`]+)`"))?;
        let quoted = Regex::new(&format!(r#"(?i)\b{alias}\."(?P<column>[^"]+)""#))?;
        let plain = Regex::new(&format!(r"(?i)\b{alias}\.(?P<column>[A-Za-z_][A-Za-z0-9_]*)"))?;

        let out = backtick.replace_all(select, "`$column`");
        let out = quoted.replace_all(&out, "\"$column\"");
        Ok(plain.replace_all(&out, "$column").into_owned())
    }

    /// Rewrites `alias.col` to `col`, or to `SOURCE.col` when `col` is
    /// ambiguous.
    pub(crate) fn clause(&self, clause: &str) -> Result<String, regex::Error> {
        let mut clause = clause.to_string();
        for scope in self.scopes {
            let alias = regex::escape(&scope.alias);
            let patterns = [
                (format!(r"(?i)\b{alias}\.`(?P<column>[A-Za-z0-9_]+)`"), Some('`')),
                (format!(r#"(?i)\b{alias}\."(?P<column>[A-Za-z0-9_]+)""#), Some('"')),
                (format!(r"(?i)\b{alias}\.(?P<column>[A-Za-z0-9_]+)"), None),
            ];
            for (pattern, quote) in patterns {
                let re = Regex::new(&pattern)?;
                clause = re
                    .replace_all(&clause, |caps: &Captures<'_>| {
                        let column = caps.name("column").map_or("", |m| m.as_str());
                        let column_text = match quote {
                            Some(q) => format!("{q}{column}{q}"),
                            None => column.to_string(),
                        };
                        if self.ambiguous.contains(&normalize_identifier(column)) {
                            format!("{}.{column_text}", scope.source_name)
                        } else {
                            column_text
                        }
                    })
                    .into_owned();
            }
        }
        Ok(clause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ValueType;
    use crate::model::SourceKind;

    fn binding(alias: &str, keys: &[&str], style: KeyPathStyle) -> KeyBinding {
        KeyBinding {
            alias: alias.to_string(),
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            style,
        }
    }

    fn scope(alias: &str, source: &str, columns: &[&str]) -> AliasScope {
        AliasScope {
            alias: alias.to_string(),
            source_name: source.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    #[test]
    fn test_bindings_pick_arrow_for_tables() {
        let model = QueryModel::builder()
            .source(
                SourceDescriptor::new("OrderTable")
                    .with_kind(SourceKind::Table)
                    .with_key("Id", ValueType::Int),
            )
            .build();
        let bindings = key_bindings(&model, KeyPathStyle::None);
        assert_eq!(bindings, vec![binding("", &["ID"], KeyPathStyle::Arrow)]);

        let stream = QueryModel::builder()
            .source(SourceDescriptor::new("Order").with_key("Id", ValueType::Int))
            .build();
        assert_eq!(key_bindings(&stream, KeyPathStyle::None)[0].style, KeyPathStyle::None);
        assert_eq!(key_bindings(&stream, KeyPathStyle::Dot)[0].style, KeyPathStyle::Dot);
    }

    #[test]
    fn test_unaliased_key_skips_rename_target() {
        let b = [binding("", &["ID"], KeyPathStyle::Arrow)];
        assert_eq!(apply_key_style("ID AS ID", &b).unwrap(), "KEY->ID AS ID");
        assert_eq!(apply_key_style("(ID > 0)", &b).unwrap(), "(KEY->ID > 0)");
        assert_eq!(apply_key_style("Id, Name", &b).unwrap(), "KEY->ID, Name");
    }

    #[test]
    fn test_quoted_and_prefixed_keys_untouched() {
        let b = [binding("", &["ID"], KeyPathStyle::Arrow)];
        assert_eq!(apply_key_style("(Name = 'ID')", &b).unwrap(), "(Name = 'ID')");
        assert_eq!(apply_key_style("KEY->ID", &b).unwrap(), "KEY->ID");
        assert_eq!(apply_key_style("`ID`", &b).unwrap(), "`ID`");
    }

    #[test]
    fn test_standalone_key_expands_for_single_key() {
        let b = [binding("", &["ID"], KeyPathStyle::Arrow)];
        assert_eq!(apply_key_style("(Key > 1)", &b).unwrap(), "(KEY->ID > 1)");

        assert_eq!(apply_key_style("ID AS Key", &b).unwrap(), "KEY->ID AS Key");
        assert_eq!(apply_key_style("Key AS Key", &b).unwrap(), "KEY->ID AS Key");

        let composite = [binding("", &["BROKER", "SYMBOL"], KeyPathStyle::Arrow)];
        assert_eq!(
            apply_key_style("BROKER AS Broker, SYMBOL AS Symbol", &composite).unwrap(),
            "KEY->BROKER AS Broker, KEY->SYMBOL AS Symbol"
        );
    }

    #[test]
    fn test_aliased_keys() {
        let b = [
            binding("o", &["ID"], KeyPathStyle::Arrow),
            binding("i", &["ID"], KeyPathStyle::None),
        ];
        assert_eq!(
            apply_key_style("FROM T o JOIN C i WITHIN 300 SECONDS ON (o.Id = i.Id)", &b).unwrap(),
            "FROM T o JOIN C i WITHIN 300 SECONDS ON (KEY->ID = i.Id)"
        );

        let dot = [binding("o", &["ID"], KeyPathStyle::Dot)];
        assert_eq!(apply_key_style("o.Id > 0", &dot).unwrap(), "key.ID > 0");
    }

    #[test]
    fn test_none_style_is_noop() {
        let b = [binding("", &["ID"], KeyPathStyle::None)];
        assert_eq!(apply_key_style("ID AS ID", &b).unwrap(), "ID AS ID");
    }

    #[test]
    fn test_select_alias_stripped_for_single_source() {
        let scopes = [scope("o", "TRADES", &["PRICE", "SYM"])];
        let dealias = Dealias::new(&scopes);
        assert_eq!(
            dealias
                .select("o.`Sym` AS Sym, o.\"Venue\", o.Price AS Price", false)
                .unwrap(),
            "`Sym` AS Sym, \"Venue\", Price AS Price"
        );
        assert_eq!(dealias.select("o.Price", true).unwrap(), "o.Price");
    }

    #[test]
    fn test_ambiguous_columns_use_source_name() {
        let scopes = [
            scope("o", "TRADES", &["BROKER", "PRICE"]),
            scope("i", "QUOTES", &["BROKER", "BID"]),
        ];
        let dealias = Dealias::new(&scopes);
        assert!(dealias.ambiguous().contains("BROKER"));
        assert_eq!(
            dealias.clause("o.Broker, i.Broker").unwrap(),
            "TRADES.Broker, QUOTES.Broker"
        );
        assert_eq!(dealias.clause("(o.Price > i.Bid)").unwrap(), "(Price > Bid)");
        assert_eq!(dealias.clause("o.`Broker`").unwrap(), "TRADES.`Broker`");
        // joined projections keep their qualifiers
        assert_eq!(dealias.select("o.Price", false).unwrap(), "o.Price");
    }
}
