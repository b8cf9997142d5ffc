use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use super::base;
use super::ExtractError;
use crate::models::Occurrence;

/// Genitive month names as they appear in "27 lipca 2024".
pub const MONTHS_PL: [(&str, u32); 12] = [
    ("stycznia", 1),
    ("lutego", 2),
    ("marca", 3),
    ("kwietnia", 4),
    ("maja", 5),
    ("czerwca", 6),
    ("lipca", 7),
    ("sierpnia", 8),
    ("września", 9),
    ("października", 10),
    ("listopada", 11),
    ("grudnia", 12),
];

const RANGE_SEPARATORS: [char; 2] = ['-', '–'];

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("valid time regex"));

/// Builds one occurrence from a schedule row such as
/// `<p><strong>27 lipca 2024</strong> 12:00 - 15:00</p>`.
///
/// `paragraph_text` is the whole row, `date_text` the bolded part. The start
/// time is the last token before the first dash, the end time the last token
/// after it. Rows without a dash have no end time.
pub fn parse_occurrence(
    paragraph_text: &str,
    date_text: &str,
    tz: Tz,
) -> Result<Occurrence, ExtractError> {
    let date = parse_polish_date(date_text)?;

    let (before, after) = match paragraph_text.split_once(RANGE_SEPARATORS) {
        Some((before, after)) => (before, Some(after)),
        None => (paragraph_text, None),
    };

    let start_token = before
        .split_whitespace()
        .last()
        .ok_or_else(|| ExtractError::InvalidTime(base::clean_text(paragraph_text)))?;
    let start = localize(date, parse_time(start_token)?, tz)?;

    let end = match after.and_then(|text| text.split_whitespace().last()) {
        Some(token) => Some(localize(date, parse_time(token)?, tz)?),
        None => None,
    };

    Ok(Occurrence { start, end })
}

pub fn parse_polish_date(date_text: &str) -> Result<NaiveDate, ExtractError> {
    let cleaned = base::clean_text(date_text).to_lowercase();
    let (name, month) = MONTHS_PL
        .iter()
        .find(|(name, _)| cleaned.contains(name))
        .ok_or_else(|| ExtractError::UnknownMonth(cleaned.clone()))?;
    let numeric = cleaned.replacen(name, &format!("{month:02}"), 1);
    NaiveDate::parse_from_str(&numeric, "%d %m %Y").map_err(|_| ExtractError::InvalidDate(cleaned))
}

pub fn parse_time(token: &str) -> Result<NaiveTime, ExtractError> {
    let invalid = || ExtractError::InvalidTime(token.to_string());
    let caps = TIME_RE.captures(token.trim()).ok_or_else(invalid)?;
    let hour = caps[1].parse::<u32>().map_err(|_| invalid())?;
    let minute = caps[2].parse::<u32>().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

fn localize(
    date: NaiveDate,
    time: NaiveTime,
    tz: Tz,
) -> Result<chrono::DateTime<Tz>, ExtractError> {
    base::to_timezone_datetime(date, time, tz)
        .ok_or_else(|| ExtractError::NonexistentLocalTime(format!("{date} {time} {tz}")))
}
