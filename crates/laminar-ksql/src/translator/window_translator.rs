//! WINDOW clause formatting.
//!
//! Translates compact timeframe tokens (`"5m"`, `"1wk"`, `"1mo"`) and
//! hopping specifications into `WINDOW TUMBLING (...)` and
//! `WINDOW HOPPING (...)` clauses.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use crate::model::HoppingWindow;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_DAY: u64 = 86_400;

/// Unit of a compact timeframe token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeUnit {
    /// `s`
    Seconds,
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
    /// `wk`, rendered as seven days each
    Weeks,
    /// `mo`
    Months,
}

impl TimeframeUnit {
    fn token(self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
            Self::Days => "d",
            Self::Weeks => "wk",
            Self::Months => "mo",
        }
    }
}

/// Parsed timeframe token.
///
/// Parsing never fails: a missing or non-positive count becomes 1 and an
/// unknown unit letter is read as minutes.
///
/// ```
/// use laminar_ksql::translator::Timeframe;
///
/// assert_eq!(Timeframe::parse("1wk").size_sql(), "7 DAYS");
/// assert_eq!(Timeframe::parse("2mo").size_sql(), "2 MONTHS");
/// assert_eq!(Timeframe::parse("90s").to_seconds(), 90);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    /// Positive unit count
    pub value: u32,
    /// Unit
    pub unit: TimeframeUnit,
}

impl Timeframe {
    /// Parses a token such as `"5m"`, `"1h"`, `"1wk"` or `"1mo"`.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        let tf = token.trim();
        if tf.is_empty() {
            return Self::new(1, TimeframeUnit::Minutes);
        }

        let lower = tf.to_ascii_lowercase();
        for (suffix, unit) in [("wk", TimeframeUnit::Weeks), ("mo", TimeframeUnit::Months)] {
            if let Some(count) = lower.strip_suffix(suffix) {
                return Self::new(parse_count(count), unit);
            }
        }

        // the token is non-empty so there is always a last char
        let split = lower.char_indices().last().map_or(0, |(i, _)| i);
        let (count, letter) = lower.split_at(split);
        let unit = match letter {
            "s" => TimeframeUnit::Seconds,
            "h" => TimeframeUnit::Hours,
            "d" => TimeframeUnit::Days,
            _ => TimeframeUnit::Minutes,
        };
        Self::new(parse_count(count), unit)
    }

    fn new(value: u32, unit: TimeframeUnit) -> Self {
        Self {
            value: value.max(1),
            unit,
        }
    }

    /// Length in seconds; a month counts as 30 days.
    #[must_use]
    pub fn to_seconds(&self) -> u64 {
        let v = u64::from(self.value);
        match self.unit {
            TimeframeUnit::Seconds => v,
            TimeframeUnit::Minutes => v * SECONDS_PER_MINUTE,
            TimeframeUnit::Hours => v * SECONDS_PER_HOUR,
            TimeframeUnit::Days => v * SECONDS_PER_DAY,
            TimeframeUnit::Weeks => v * 7 * SECONDS_PER_DAY,
            TimeframeUnit::Months => v * 30 * SECONDS_PER_DAY,
        }
    }

    /// Length as a [`Duration`].
    #[must_use]
    pub fn to_duration(&self) -> Duration {
        Duration::from_secs(self.to_seconds())
    }

    /// `SIZE` operand for a tumbling window.
    #[must_use]
    pub fn size_sql(&self) -> String {
        let v = self.value;
        match self.unit {
            TimeframeUnit::Seconds => format!("{v} SECONDS"),
            TimeframeUnit::Minutes => format!("{v} MINUTES"),
            TimeframeUnit::Hours => format!("{v} HOURS"),
            TimeframeUnit::Days => format!("{v} DAYS"),
            TimeframeUnit::Weeks => format!("{} DAYS", u64::from(v) * 7),
            TimeframeUnit::Months => format!("{v} MONTHS"),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.token())
    }
}

fn parse_count(text: &str) -> u32 {
    text.trim().parse::<u32>().unwrap_or(0)
}

/// Orders timeframe tokens by length.
#[must_use]
pub fn compare_timeframes(a: &str, b: &str) -> Ordering {
    Timeframe::parse(a)
        .to_seconds()
        .cmp(&Timeframe::parse(b).to_seconds())
}

/// Renders a duration in the largest whole unit up to days.
///
/// Sub-second parts are dropped.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= SECONDS_PER_DAY && secs % SECONDS_PER_DAY == 0 {
        format!("{} DAYS", secs / SECONDS_PER_DAY)
    } else if secs >= SECONDS_PER_HOUR && secs % SECONDS_PER_HOUR == 0 {
        format!("{} HOURS", secs / SECONDS_PER_HOUR)
    } else if secs >= SECONDS_PER_MINUTE && secs % SECONDS_PER_MINUTE == 0 {
        format!("{} MINUTES", secs / SECONDS_PER_MINUTE)
    } else {
        format!("{secs} SECONDS")
    }
}

/// Type of window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Fixed-size non-overlapping windows
    Tumbling,
    /// Fixed-size windows advancing by a smaller step
    Hopping,
}

/// A WINDOW clause ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowClause {
    /// `WINDOW TUMBLING (SIZE .. [, GRACE PERIOD n SECONDS])`
    Tumbling {
        /// Window length
        size: Timeframe,
        /// Grace in seconds
        grace_seconds: Option<u64>,
    },
    /// `WINDOW HOPPING (SIZE .., ADVANCE BY .. [, GRACE PERIOD ..])`
    Hopping {
        /// Window length
        size: Duration,
        /// Step between window starts
        advance: Duration,
        /// Grace
        grace: Option<Duration>,
    },
}

impl WindowClause {
    /// Tumbling window over `timeframe`.
    #[must_use]
    pub fn tumbling(timeframe: &str) -> Self {
        Self::Tumbling {
            size: Timeframe::parse(timeframe),
            grace_seconds: None,
        }
    }

    /// Hopping window.
    #[must_use]
    pub fn hopping(size: Duration, advance: Duration) -> Self {
        Self::Hopping {
            size,
            advance,
            grace: None,
        }
    }

    /// Sets the grace period.
    #[must_use]
    pub fn with_grace_seconds(mut self, seconds: Option<u64>) -> Self {
        match &mut self {
            Self::Tumbling { grace_seconds, .. } => *grace_seconds = seconds,
            Self::Hopping { grace, .. } => *grace = seconds.map(Duration::from_secs),
        }
        self
    }

    /// Window type.
    #[must_use]
    pub fn window_type(&self) -> WindowType {
        match self {
            Self::Tumbling { .. } => WindowType::Tumbling,
            Self::Hopping { .. } => WindowType::Hopping,
        }
    }

    /// Dialect text.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Tumbling {
                size,
                grace_seconds,
            } => match grace_seconds {
                Some(g) => format!(
                    "WINDOW TUMBLING (SIZE {}, GRACE PERIOD {g} SECONDS)",
                    size.size_sql()
                ),
                None => format!("WINDOW TUMBLING (SIZE {})", size.size_sql()),
            },
            Self::Hopping {
                size,
                advance,
                grace,
            } => {
                let mut out = format!(
                    "WINDOW HOPPING (SIZE {}, ADVANCE BY {}",
                    format_duration(*size),
                    format_duration(*advance)
                );
                if let Some(g) = grace {
                    out.push_str(", GRACE PERIOD ");
                    out.push_str(&format_duration(*g));
                }
                out.push(')');
                out
            }
        }
    }
}

impl From<&HoppingWindow> for WindowClause {
    fn from(h: &HoppingWindow) -> Self {
        Self::Hopping {
            size: h.size,
            advance: h.advance,
            grace: h.grace,
        }
    }
}

impl fmt::Display for WindowClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tumbling_sizes() {
        let cases = [
            ("1m", "WINDOW TUMBLING (SIZE 1 MINUTES)"),
            ("5h", "WINDOW TUMBLING (SIZE 5 HOURS)"),
            ("30s", "WINDOW TUMBLING (SIZE 30 SECONDS)"),
            ("1d", "WINDOW TUMBLING (SIZE 1 DAYS)"),
            ("1wk", "WINDOW TUMBLING (SIZE 7 DAYS)"),
            ("2mo", "WINDOW TUMBLING (SIZE 2 MONTHS)"),
        ];
        for (tf, expected) in cases {
            assert_eq!(WindowClause::tumbling(tf).to_sql(), expected, "timeframe {tf}");
        }
    }

    #[test]
    fn test_degenerate_tokens() {
        assert_eq!(Timeframe::parse("").size_sql(), "1 MINUTES");
        assert_eq!(Timeframe::parse("0m").size_sql(), "1 MINUTES");
        assert_eq!(Timeframe::parse("xh").size_sql(), "1 HOURS");
        assert_eq!(Timeframe::parse("7q").size_sql(), "7 MINUTES");
        assert_eq!(Timeframe::parse("1WK").size_sql(), "7 DAYS");
    }

    #[test]
    fn test_tumbling_grace() {
        let clause = WindowClause::tumbling("5m").with_grace_seconds(Some(30));
        assert_eq!(
            clause.to_string(),
            "WINDOW TUMBLING (SIZE 5 MINUTES, GRACE PERIOD 30 SECONDS)"
        );
        assert_eq!(clause.window_type(), WindowType::Tumbling);
    }

    #[test]
    fn test_to_seconds_and_ordering() {
        assert_eq!(Timeframe::parse("1wk").to_seconds(), 604_800);
        assert_eq!(Timeframe::parse("1mo").to_seconds(), 2_592_000);
        let mut tfs = vec!["1mo", "1m", "30s", "1wk", "1h", "1d"];
        tfs.sort_by(|a, b| compare_timeframes(a, b));
        assert_eq!(tfs, ["30s", "1m", "1h", "1d", "1wk", "1mo"]);
    }

    #[test]
    fn test_display_round_trips_token() {
        assert_eq!(Timeframe::parse("15mo").to_string(), "15mo");
        assert_eq!(Timeframe::parse(" 5M ").to_string(), "5m");
    }

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration(Duration::from_secs(86_400 * 2)), "2 DAYS");
        assert_eq!(format_duration(Duration::from_secs(7_200)), "2 HOURS");
        assert_eq!(format_duration(Duration::from_secs(300)), "5 MINUTES");
        assert_eq!(format_duration(Duration::from_secs(90)), "90 SECONDS");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1 SECONDS");
    }

    #[test]
    fn test_hopping_clause() {
        let spec = HoppingWindow::new(Duration::from_secs(300), Duration::from_secs(60))
            .with_grace(Duration::from_secs(30));
        let clause = WindowClause::from(&spec);
        assert_eq!(
            clause.to_sql(),
            "WINDOW HOPPING (SIZE 5 MINUTES, ADVANCE BY 1 MINUTES, GRACE PERIOD 30 SECONDS)"
        );
        assert_eq!(clause.window_type(), WindowType::Hopping);
    }
}
