//! PARTITION BY handling.
//!
//! A caller-supplied partition list is either kept as a rekey of a plain
//! stream or folded into GROUP BY. Every comparison here works on the
//! unqualified, unquoted, upper-cased identifier, so `o.Symbol`,
//! `` `SYMBOL` `` and `KEY->SYMBOL` all compare equal.

use std::collections::BTreeSet;

/// Trims each comma-separated entry and drops empty ones.
pub(crate) fn normalize_partition(clause: &str) -> String {
    split_columns(clause).join(", ")
}

/// Comparison keys of every partition column, in order.
pub(crate) fn partition_keys(clause: &str) -> Vec<String> {
    split_columns(clause)
        .into_iter()
        .map(|c| normalize_identifier(unqualified(c)))
        .filter(|k| !k.is_empty())
        .collect()
}

/// Text after the last `->` and then after the last `.`.
pub(crate) fn unqualified(expr: &str) -> &str {
    let mut value = expr.trim();
    if let Some(i) = value.rfind("->") {
        value = &value[i + 2..];
    }
    if let Some(i) = value.rfind('.') {
        value = &value[i + 1..];
    }
    value.trim()
}

/// Text before the last `->` (or, failing that, the last `.`).
fn qualifier(expr: &str) -> &str {
    let value = expr.trim();
    if let Some(i) = value.rfind("->") {
        return value[..i].trim();
    }
    value.rfind('.').map_or("", |i| value[..i].trim())
}

/// Upper-cased identifier without a trailing `()` or surrounding quotes.
pub(crate) fn normalize_identifier(identifier: &str) -> String {
    let mut value = identifier.trim();
    if let Some(stripped) = value.strip_suffix("()") {
        value = stripped;
    }
    let quoted = value.len() >= 2
        && ((value.starts_with('`') && value.ends_with('`'))
            || (value.starts_with('"') && value.ends_with('"')));
    if quoted {
        value = &value[1..value.len() - 1];
    }
    value.to_ascii_uppercase()
}

/// Removes duplicate partition columns.
///
/// Columns are ordered by identifier, then qualifier, then position. Two
/// columns are duplicates when both match; a qualified column keeps its
/// qualifier in the output.
pub(crate) fn dedup_partition(clause: &str) -> String {
    struct Token<'c> {
        original: &'c str,
        unqualified: &'c str,
        normalized: String,
        qualifier: &'c str,
        index: usize,
    }

    let mut tokens: Vec<Token<'_>> = clause
        .split(',')
        .enumerate()
        .filter_map(|(index, part)| {
            let original = part.trim();
            let bare = unqualified(original);
            let normalized = normalize_identifier(bare);
            (!original.is_empty() && !normalized.is_empty()).then(|| Token {
                original,
                unqualified: bare,
                normalized,
                qualifier: qualifier(original),
                index,
            })
        })
        .collect();

    tokens.sort_by(|a, b| {
        a.normalized
            .cmp(&b.normalized)
            .then_with(|| {
                a.qualifier
                    .to_ascii_uppercase()
                    .cmp(&b.qualifier.to_ascii_uppercase())
            })
            .then(a.index.cmp(&b.index))
    });

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for t in &tokens {
        let key = if t.qualifier.is_empty() {
            t.normalized.clone()
        } else {
            format!("{}::{}", t.qualifier.to_ascii_uppercase(), t.normalized)
        };
        if seen.insert(key) {
            out.push(if t.qualifier.is_empty() {
                t.unqualified
            } else {
                t.original
            });
        }
    }
    out.join(", ")
}

/// Appends partition columns that GROUP BY does not already contain.
///
/// Returns the merged key list (`None` when empty) and whether the
/// partition contributed anything to the statement.
pub(crate) fn merge_into_group_by(group_by: Option<&str>, partition: &str) -> (Option<String>, bool) {
    let partition_columns = split_columns(partition);
    if partition_columns.is_empty() {
        return (group_by.map(str::to_string), false);
    }

    let mut columns: Vec<&str> = group_by.map(split_columns).unwrap_or_default();
    let mut known: BTreeSet<String> = columns.iter().map(|c| group_key(c)).collect();
    for column in partition_columns {
        if known.insert(group_key(column)) {
            columns.push(column);
        }
    }

    let merged = (!columns.is_empty()).then(|| columns.join(", "));
    (merged, true)
}

fn group_key(column: &str) -> String {
    normalize_identifier(unqualified(column))
}

fn split_columns(clause: &str) -> Vec<&str> {
    clause
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}
