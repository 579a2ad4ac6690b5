//! Date filters derived from natural-language time expressions.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// A date constraint parsed from a query.
///
/// Produced by the temporal parser, consumed by the episodic query and by
/// score boosting. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemporalFilter {
    /// A single calendar day.
    Exact { date: NaiveDate },
    /// An inclusive span of days.
    Range { from: NaiveDate, to: NaiveDate },
}

impl TemporalFilter {
    pub fn exact(date: NaiveDate) -> Self {
        TemporalFilter::Exact { date }
    }

    pub fn range(from: NaiveDate, to: NaiveDate) -> Self {
        TemporalFilter::Range { from, to }
    }

    /// First day covered by the filter.
    pub fn start(&self) -> NaiveDate {
        match self {
            TemporalFilter::Exact { date } => *date,
            TemporalFilter::Range { from, .. } => *from,
        }
    }

    /// Last day covered by the filter (inclusive).
    pub fn end(&self) -> NaiveDate {
        match self {
            TemporalFilter::Exact { date } => *date,
            TemporalFilter::Range { to, .. } => *to,
        }
    }

    /// The day after the last covered day.
    pub fn end_exclusive(&self) -> NaiveDate {
        let end = self.end();
        end.checked_add_days(Days::new(1)).unwrap_or(end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, TemporalFilter::Exact { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_exact_end_exclusive_is_next_day() {
        let f = TemporalFilter::exact(d(2024, 1, 31));
        assert_eq!(f.end_exclusive(), d(2024, 2, 1));
        assert!(f.contains(d(2024, 1, 31)));
        assert!(!f.contains(d(2024, 2, 1)));
    }

    #[test]
    fn test_range_contains_bounds() {
        let f = TemporalFilter::range(d(2024, 1, 8), d(2024, 1, 15));
        assert!(f.contains(d(2024, 1, 8)));
        assert!(f.contains(d(2024, 1, 15)));
        assert!(!f.contains(d(2024, 1, 7)));
        assert_eq!(f.end_exclusive(), d(2024, 1, 16));
        assert!(!f.is_exact());
    }

    #[test]
    fn test_serde_shape() {
        let f = TemporalFilter::exact(d(2024, 1, 15));
        let json = serde_json::to_value(f).unwrap();
        assert_eq!(json["type"], "exact");
        assert_eq!(json["date"], "2024-01-15");
    }
}
