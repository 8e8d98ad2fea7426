use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use thiserror::Error;

/// Timestamp format of arXiv's `submittedDate` range queries.
pub const ARXIV_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(second|minute|hour|day|week)s?\s+ago$").expect("valid regex")
});

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("Could not parse {0:?} as a date")]
    Unrecognized(String),
    #[error("Date {0:?} is out of range")]
    OutOfRange(String),
}

/// Parse a date-like string such as `"2021-01-01 in UTC"` or
/// `"1 day ago at midnight in UTC"`. Relative forms count back from `now`;
/// every result is in UTC.
pub fn parse_date(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, DateError> {
    let unrecognized = || DateError::Unrecognized(text.to_string());
    let mut rest = text.trim();
    if !rest.is_ascii() {
        return Err(unrecognized());
    }

    for suffix in [" in utc", " utc"] {
        if rest.to_ascii_lowercase().ends_with(suffix) {
            rest = rest[..rest.len() - suffix.len()].trim_end();
            break;
        }
    }

    let at_midnight = rest.to_ascii_lowercase().ends_with(" at midnight");
    if at_midnight {
        rest = rest[..rest.len() - " at midnight".len()].trim_end();
    }

    let date = parse_base(rest, now)
        .ok_or_else(unrecognized)?
        .map_err(|_| DateError::OutOfRange(text.to_string()))?;

    if at_midnight {
        Ok(date.date_naive().and_time(chrono::NaiveTime::MIN).and_utc())
    } else {
        Ok(date)
    }
}

/// `None` when the text matches no known form, `Some(Err(()))` when it does
/// but the result overflows.
fn parse_base(text: &str, now: DateTime<Utc>) -> Option<Result<DateTime<Utc>, ()>> {
    let lower = text.to_ascii_lowercase();
    match lower.as_str() {
        "now" | "today" => return Some(Ok(now)),
        "yesterday" => return Some(now.checked_sub_signed(TimeDelta::days(1)).ok_or(())),
        _ => {}
    }

    if let Some(caps) = RELATIVE.captures(&lower) {
        let count: i64 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => return Some(Err(())),
        };
        let unit_secs = match &caps[2] {
            "second" => 1,
            "minute" => 60,
            "hour" => 3_600,
            "day" => 86_400,
            _ => 604_800,
        };
        let delta = count
            .checked_mul(unit_secs)
            .and_then(TimeDelta::try_seconds);
        return Some(delta.and_then(|d| now.checked_sub_signed(d)).ok_or(()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Ok(dt.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Ok(date.and_time(chrono::NaiveTime::MIN).and_utc()));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| Ok(dt.and_utc()))
}

pub fn format_arxiv_date(date: &DateTime<Utc>) -> String {
    date.format(ARXIV_DATE_FORMAT).to_string()
}
