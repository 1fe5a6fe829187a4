//! Date parsing for export columns.
//!
//! The same column can hold ISO timestamps, `23-Feb-24`, `2024-02-23`,
//! `23/02/2024` or a Unix epoch depending on who typed the row, so
//! [`parse_date`] tries each shape in a fixed order and returns the first
//! date that lands inside the supported range.
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const MIN_YEAR: i32 = 1901;
const MAX_YEAR: i32 = 2099;

// Epoch values at or above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

static MONTHS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    let names: [(&str, &str, u32); 12] = [
        ("jan", "january", 1),
        ("feb", "february", 2),
        ("mar", "march", 3),
        ("apr", "april", 4),
        ("may", "may", 5),
        ("jun", "june", 6),
        ("jul", "july", 7),
        ("aug", "august", 8),
        ("sep", "september", 9),
        ("oct", "october", 10),
        ("nov", "november", 11),
        ("dec", "december", 12),
    ];
    let mut map = HashMap::new();
    for (short, long, n) in names {
        map.insert(short, n);
        map.insert(long, n);
    }
    map.insert("sept", 9);
    map
});

static DAY_MONTH_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[-\s]([A-Za-z]+)[-\s](\d{2}|\d{4})$").unwrap());
static YEAR_MONTH_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})").unwrap());
static SLASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap());
// At least nine digits; shorter runs are quantities or spreadsheet serials.
static EPOCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9,15}$").unwrap());

const ISO_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse a free-form date cell. Returns `None` ("no date") when no strategy
/// produces a date between 1901 and 2099.
pub fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let strategies: [fn(&str) -> Option<NaiveDateTime>; 5] = [
        parse_iso,
        parse_day_month_name,
        parse_year_month_day,
        parse_slashed,
        parse_epoch,
    ];
    strategies
        .iter()
        .find_map(|parse| parse(s))
        .filter(|d| in_supported_range(d.date()))
}

/// [`parse_date`] for optional cells.
pub fn parse_date_opt(input: Option<&str>) -> Option<NaiveDateTime> {
    input.and_then(parse_date)
}

pub fn in_supported_range(date: NaiveDate) -> bool {
    use chrono::Datelike;
    (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    use chrono::Datelike;
    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_local())
        .ok()
        .or_else(|| {
            ISO_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        })
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(midnight))?;
    (1900..=2100).contains(&parsed.year()).then_some(parsed)
}

fn parse_day_month_name(s: &str) -> Option<NaiveDateTime> {
    let caps = DAY_MONTH_NAME.captures(s)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = *MONTHS.get(caps[2].to_ascii_lowercase().as_str())?;
    let mut year: i32 = caps[3].parse().ok()?;
    if caps[3].len() == 2 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day).map(midnight)
}

fn parse_year_month_day(s: &str) -> Option<NaiveDateTime> {
    let caps = YEAR_MONTH_DAY.captures(s)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(midnight)
}

fn parse_slashed(s: &str) -> Option<NaiveDateTime> {
    let caps = SLASHED.captures(s)?;
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    // Day-first is the house format; month-first rows come from US exports.
    [(second, first), (first, second)]
        .into_iter()
        .filter_map(|(month, day)| NaiveDate::from_ymd_opt(year, month, day))
        .find(|d| in_supported_range(*d))
        .map(midnight)
}

fn parse_epoch(s: &str) -> Option<NaiveDateTime> {
    if !EPOCH.is_match(s) {
        return None;
    }
    let n: i64 = s.parse().ok()?;
    let dt = if n >= EPOCH_MILLIS_THRESHOLD {
        DateTime::<Utc>::from_timestamp_millis(n)?
    } else {
        DateTime::<Utc>::from_timestamp(n, 0)?
    };
    Some(dt.naive_utc())
}
