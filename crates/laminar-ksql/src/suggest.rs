//! "Did you mean" hints for unknown function names.

/// Maximum edit distance accepted for a hint.
pub const MAX_HINT_DISTANCE: usize = 2;

/// Returns the candidate closest to `input` by case-insensitive edit
/// distance, if one lies within `max_distance`.
///
/// Exact (case-insensitive) matches are skipped; they are not typos.
#[must_use]
pub fn closest_match<'a, I>(input: &str, candidates: I, max_distance: usize) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = input.to_ascii_lowercase();
    let mut best: Option<(&'a str, usize)> = None;

    for candidate in candidates {
        let dist = edit_distance(needle.as_bytes(), candidate.to_ascii_lowercase().as_bytes());
        if dist == 0 || dist > max_distance {
            continue;
        }
        // ties keep the alphabetically smaller name so hints stay stable
        let better = best.is_none_or(|(name, d)| dist < d || (dist == d && candidate < name));
        if better {
            best = Some((candidate, dist));
        }
    }

    best.map(|(name, _)| name)
}

fn edit_distance(a: &[u8], b: &[u8]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diag + cost);
            diag = above;
        }
    }
    row[b.len()]
}
