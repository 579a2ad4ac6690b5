//! Natural-language date filter parsing and temporal score boosting.
//!
//! `TemporalParser::parse` turns phrases such as "2024년 1월 15일", "어제",
//! "last week", "march 3rd", or "2024-01-15" into a [`TemporalFilter`].
//! Strategies run in a fixed order and the first one that produces a valid
//! calendar date wins. Anything unparseable or impossible yields `None`.

use std::sync::LazyLock;

use chrono::{Datelike, Days, Local, NaiveDate};
use regex::Regex;

use recall_types::temporal::TemporalFilter;

/// Default blend factor for [`boost_temporal_score`].
pub const DEFAULT_BOOST_FACTOR: f64 = 0.4;

/// Score a range match is blended toward (an exact match blends toward 1.0).
const RANGE_MATCH_TARGET: f64 = 0.8;

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Failed to compile temporal pattern");
            None
        }
    }
}

static KO_DATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?:(\d{4})년\s*)?(\d{1,2})월\s*(\d{1,2})일"));
static KO_DAY_ONLY: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(\d{1,2})일"));
static KO_TODAY: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"오늘"));
static KO_YESTERDAY: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"어제"));
static KO_DAY_BEFORE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"그저[께게]"));
static KO_LAST_WEEK: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"지난\s*주"));
static KO_LAST_N_DAYS: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"지난\s*(\d+)\s*일"));
static KO_N_DAYS_AGO: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(\d+)\s*일\s*전"));
static EN_DATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"(?i)(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec)\s+(\d{1,2})(?:st|nd|rd|th)?",
    )
});
static EN_TODAY: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)today"));
static EN_YESTERDAY: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)yesterday"));
static EN_LAST_WEEK: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)last\s+week"));
static EN_N_DAYS_AGO: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)(\d+)\s+days?\s+ago"));
static ISO_DATE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(\d{4})-(\d{2})-(\d{2})"));

fn is_match(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(text))
}

fn first_number(re: &LazyLock<Option<Regex>>, text: &str) -> Option<u64> {
    re.as_ref()?.captures(text)?.get(1)?.as_str().parse().ok()
}

fn english_month(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parses date filters relative to a reference "today".
#[derive(Debug, Clone, Default)]
pub struct TemporalParser {
    today: Option<NaiveDate>,
}

impl TemporalParser {
    /// Parser that evaluates relative expressions against the local date.
    pub fn new() -> Self {
        Self { today: None }
    }

    /// Parser pinned to a fixed reference date.
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today: Some(today) }
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Parse `text` into a date filter, or `None` when no strategy applies.
    pub fn parse(&self, text: &str) -> Option<TemporalFilter> {
        let today = self.today();
        let result = self
            .korean_date(text, today)
            .or_else(|| self.korean_relative(text, today))
            .or_else(|| self.english_date(text, today))
            .or_else(|| self.english_relative(text, today))
            .or_else(|| self.iso_date(text));

        if let Some(filter) = &result {
            tracing::debug!(
                query = %text.chars().take(50).collect::<String>(),
                exact = filter.is_exact(),
                "temporal parsed"
            );
        }
        result
    }

    fn korean_date(&self, text: &str, today: NaiveDate) -> Option<TemporalFilter> {
        if let Some(caps) = KO_DATE.as_ref().and_then(|re| re.captures(text)) {
            let explicit_year: Option<i32> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            let year = explicit_year.unwrap_or(today.year());

            let mut date = NaiveDate::from_ymd_opt(year, month, day)?;
            // "3월 5일" said in January means last March.
            if explicit_year.is_none() && date > today {
                date = NaiveDate::from_ymd_opt(year - 1, month, day)?;
            }
            return Some(TemporalFilter::exact(date));
        }

        let day = Self::bare_day(text)?;
        let (mut year, mut month) = (today.year(), today.month());
        if day > today.day() {
            if month == 1 {
                month = 12;
                year -= 1;
            } else {
                month -= 1;
            }
        }
        NaiveDate::from_ymd_opt(year, month, day).map(TemporalFilter::exact)
    }

    /// A "D일" mention that is not part of "M월 D일", "N일 전", or "지난 N일".
    fn bare_day(text: &str) -> Option<u32> {
        let re = KO_DAY_ONLY.as_ref()?;
        for caps in re.captures_iter(text) {
            let whole = caps.get(0)?;
            let before = &text[..whole.start()];
            let after = &text[whole.end()..];

            if before
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_digit() || c == '월')
            {
                continue;
            }
            if after.trim_start().starts_with('전') {
                continue;
            }
            if before.trim_end().ends_with("지난") {
                continue;
            }
            if let Some(day) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                return Some(day);
            }
        }
        None
    }

    fn korean_relative(&self, text: &str, today: NaiveDate) -> Option<TemporalFilter> {
        if is_match(&KO_TODAY, text) {
            return Some(TemporalFilter::exact(today));
        }
        if is_match(&KO_YESTERDAY, text) {
            return days_before(today, 1).map(TemporalFilter::exact);
        }
        if is_match(&KO_DAY_BEFORE, text) {
            return days_before(today, 2).map(TemporalFilter::exact);
        }
        if is_match(&KO_LAST_WEEK, text) {
            return days_before(today, 7).map(|from| TemporalFilter::range(from, today));
        }
        if let Some(n) = first_number(&KO_LAST_N_DAYS, text) {
            return days_before(today, n).map(|from| TemporalFilter::range(from, today));
        }
        if let Some(n) = first_number(&KO_N_DAYS_AGO, text) {
            return days_before(today, n).map(TemporalFilter::exact);
        }
        None
    }

    fn english_date(&self, text: &str, today: NaiveDate) -> Option<TemporalFilter> {
        let caps = EN_DATE.as_ref()?.captures(text)?;
        let month = english_month(caps.get(1)?.as_str())?;
        let day: u32 = caps.get(2)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(today.year(), month, day).map(TemporalFilter::exact)
    }

    fn english_relative(&self, text: &str, today: NaiveDate) -> Option<TemporalFilter> {
        if is_match(&EN_TODAY, text) {
            return Some(TemporalFilter::exact(today));
        }
        if is_match(&EN_YESTERDAY, text) {
            return days_before(today, 1).map(TemporalFilter::exact);
        }
        if is_match(&EN_LAST_WEEK, text) {
            return days_before(today, 7).map(|from| TemporalFilter::range(from, today));
        }
        if let Some(n) = first_number(&EN_N_DAYS_AGO, text) {
            return days_before(today, n).map(TemporalFilter::exact);
        }
        None
    }

    fn iso_date(&self, text: &str) -> Option<TemporalFilter> {
        let caps = ISO_DATE.as_ref()?.captures(text)?;
        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        let month: u32 = caps.get(2)?.as_str().parse().ok()?;
        let day: u32 = caps.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day).map(TemporalFilter::exact)
    }
}

fn days_before(date: NaiveDate, n: u64) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(n))
}

/// Blend `base` toward a fixed target when `memory_date` satisfies `filter`.
///
/// Exact matches blend toward 1.0, range matches toward 0.8. Without a
/// filter, or when the date does not match, `base` is returned unchanged.
pub fn boost_temporal_score(
    base: f64,
    memory_date: Option<NaiveDate>,
    filter: Option<&TemporalFilter>,
    factor: f64,
) -> f64 {
    let (Some(filter), Some(date)) = (filter, memory_date) else {
        return base;
    };

    let target = match filter {
        TemporalFilter::Exact { date: want } if *want == date => 1.0,
        TemporalFilter::Range { from, to } if *from <= date && date <= *to => RANGE_MATCH_TARGET,
        _ => return base,
    };

    let boosted = base * (1.0 - factor) + target * factor;
    tracing::trace!(score_before = base, score_after = boosted, "temporal boost");
    boosted
}
