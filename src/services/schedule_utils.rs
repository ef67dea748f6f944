use chrono::{
    offset::LocalResult, DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime,
    Offset, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::preferences::{Preferences, TimeOfDay};

static TIME_OF_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,2})(?::(\d{1,2}))?(?::\d{1,2}(?:\.\d+)?)?\s*([AaPp])?\.?[Mm]?\.?\s*$")
        .expect("time-of-day pattern is valid")
});

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Half-open busy or working interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl Interval {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

pub fn parse_datetime(value: &str) -> AppResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.trim()).map_err(|err| {
        AppError::validation_with_details(
            "invalid RFC 3339 timestamp",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

/// Accepts a full RFC 3339 instant, or a zone-less local timestamp read in `tz`.
pub fn parse_instant_in(value: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| localize(tz, naive))
}

pub fn format_datetime(dt: DateTime<FixedOffset>) -> String {
    dt.to_rfc3339()
}

/// Open-interval overlap: touching endpoints do not count.
pub fn overlaps(
    a_start: DateTime<FixedOffset>,
    a_end: DateTime<FixedOffset>,
    b_start: DateTime<FixedOffset>,
    b_end: DateTime<FixedOffset>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// `HH:MM`, `H`, `h:MM AM`; anything else is midnight.
pub fn parse_time_of_day(value: &str) -> TimeOfDay {
    try_parse_time_of_day(value).unwrap_or_else(|| {
        debug!(target: "app::time", value, "unparseable time of day, using 00:00");
        TimeOfDay::midnight()
    })
}

pub fn try_parse_time_of_day(value: &str) -> Option<TimeOfDay> {
    let captures = TIME_OF_DAY.captures(value)?;
    let hour = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let minute = match captures.get(2) {
        Some(m) => m.as_str().parse::<u32>().ok()?,
        None => 0,
    };

    let hour = match captures.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(_) if hour == 0 || hour > 12 => return None,
        Some(meridiem) if meridiem == "a" => hour % 12,
        Some(_) => hour % 12 + 12,
        None => hour,
    };

    TimeOfDay::new(hour, minute)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Saturday moves two days, Sunday one; weekdays are returned unchanged.
pub fn next_weekday(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Duration::days(2),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Resolves a wall-clock time in `tz`. Times inside a DST gap move forward to the first
/// valid half hour; ambiguous times take the earlier instant.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<FixedOffset> {
    let mut candidate = naive;
    for _ in 0..8 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return to_fixed(dt),
            LocalResult::Ambiguous(first, _) => return to_fixed(first),
            LocalResult::None => candidate += Duration::minutes(30),
        }
    }
    let utc = Utc.from_utc_datetime(&naive);
    utc.with_timezone(&utc.offset().fix())
}

fn to_fixed(dt: DateTime<Tz>) -> DateTime<FixedOffset> {
    let offset = dt.offset().fix();
    dt.with_timezone(&offset)
}

pub fn at_time(date: NaiveDate, time: TimeOfDay, tz: Tz) -> DateTime<FixedOffset> {
    localize(tz, date.and_time(time.to_naive_time()))
}

/// Calendar date of `instant` in `tz`.
pub fn local_date(instant: DateTime<FixedOffset>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

pub fn day_window(date: NaiveDate, prefs: &Preferences) -> Interval {
    Interval::new(
        at_time(date, prefs.working_hours.start, prefs.timezone),
        at_time(date, prefs.working_hours.end, prefs.timezone),
    )
}

pub fn lunch_window(date: NaiveDate, prefs: &Preferences) -> Option<Interval> {
    prefs.lunch_break.map(|lunch| {
        Interval::new(
            at_time(date, lunch.start, prefs.timezone),
            at_time(date, lunch.end, prefs.timezone),
        )
    })
}

/// Working-hour start of the first weekday strictly after `date`.
pub fn next_day_start(date: NaiveDate, prefs: &Preferences) -> DateTime<FixedOffset> {
    let next = next_weekday(date + Duration::days(1));
    day_window(next, prefs).start
}

/// First working-hour start, on a weekday, at or after `now`.
pub fn first_working_start(now: DateTime<FixedOffset>, prefs: &Preferences) -> DateTime<FixedOffset> {
    let today = local_date(now, prefs.timezone);
    let candidate = next_weekday(today);
    let start = day_window(candidate, prefs).start;
    if start >= now {
        start
    } else {
        next_day_start(candidate, prefs)
    }
}
