use chrono::{Datelike, Duration, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::models::meeting::{
    AvailabilityWindow, MeetingParams, MeetingSlot, ParticipantAvailability, SlotAvailability,
};
use crate::models::preferences::{DailyWindow, TimeOfDay};
use crate::services::schedule_utils::try_parse_time_of_day;

pub const SLOT_STEP_MINUTES: i64 = 30;
pub const DEFAULT_MEETING_MINUTES: i64 = 60;
pub const DEFAULT_MAX_SLOTS: usize = 5;
const DEFAULT_RANGE: DailyWindow = DailyWindow {
    start: TimeOfDay { hour: 9, minute: 0 },
    end: TimeOfDay {
        hour: 17,
        minute: 0,
    },
};

const WORKWEEK: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

static DURATION_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(h|hr|hrs|hour|hours|m|min|mins|minute|minutes)?\s*$")
        .expect("duration pattern is valid")
});

/// Best candidate meeting slots for one week, most inclusive first.
pub fn find_meeting_slots(
    availability: &ParticipantAvailability,
    params: &MeetingParams,
) -> Vec<MeetingSlot> {
    let total_count = availability.len();
    if total_count == 0 {
        return Vec::new();
    }

    let range = time_range(params);
    let duration = meeting_minutes(params.duration.as_ref(), range.minutes());
    if duration > range.minutes() {
        debug!(target: "app::meeting", duration, "meeting longer than the time range");
        return Vec::new();
    }

    let monday = week_start_for(params.week_start);
    let mut slots = Vec::new();

    for day in preferred_days(&params.preferred_days) {
        let date = monday + Duration::days(i64::from(day.num_days_from_monday()));
        let day_name = weekday_name(day);

        let mut start = range.start.minutes_from_midnight();
        while start + duration <= range.end.minutes_from_midnight() {
            let slot = DailyWindow {
                start: time_from_minutes(start),
                end: time_from_minutes(start + duration),
            };

            let available_participants: Vec<String> = availability
                .iter()
                .filter(|(_, days)| {
                    days.iter()
                        .filter(|(name, _)| name.eq_ignore_ascii_case(day_name))
                        .flat_map(|(_, windows)| windows.iter())
                        .any(|window| window_contains(window, &slot))
                })
                .map(|(participant, _)| participant.clone())
                .collect();

            if !available_participants.is_empty() {
                let available_count = available_participants.len();
                slots.push(MeetingSlot {
                    day: day_name.to_string(),
                    date,
                    start: slot.start,
                    end: slot.end,
                    time: format!(
                        "{} - {}",
                        slot.start.to_meridiem_label(),
                        slot.end.to_meridiem_label()
                    ),
                    availability: if available_count == total_count {
                        SlotAvailability::All
                    } else {
                        SlotAvailability::Partial
                    },
                    available_count,
                    total_count,
                    available_participants,
                });
            }

            start += SLOT_STEP_MINUTES;
        }
    }

    // Candidates are generated in chronological order and the sort is stable.
    slots.sort_by(|a, b| b.available_count.cmp(&a.available_count));
    slots.truncate(params.max_slots.filter(|max| *max > 0).unwrap_or(DEFAULT_MAX_SLOTS));
    slots
}

/// `"1.5 hours"`, `"30 minutes"`, `"Full day"`, or a bare number of minutes.
pub fn meeting_minutes(raw: Option<&JsonValue>, full_day_minutes: i64) -> i64 {
    let parsed = match raw {
        None | Some(JsonValue::Null) => return DEFAULT_MEETING_MINUTES,
        Some(JsonValue::Number(number)) => number.as_f64().map(|minutes| minutes.round() as i64),
        Some(JsonValue::String(text)) if text.trim().eq_ignore_ascii_case("full day") => {
            Some(full_day_minutes)
        }
        Some(JsonValue::String(text)) => DURATION_TEXT.captures(text).and_then(|captures| {
            let amount = captures.get(1)?.as_str().parse::<f64>().ok()?;
            let unit = captures
                .get(2)
                .map(|m| m.as_str().to_ascii_lowercase())
                .unwrap_or_default();
            let minutes = if unit.starts_with('h') { amount * 60.0 } else { amount };
            Some(minutes.round() as i64)
        }),
        Some(_) => None,
    };

    match parsed {
        Some(minutes) if minutes > 0 => minutes,
        _ => {
            warn!(target: "app::meeting", raw = ?raw, "unparseable meeting duration, using one hour");
            DEFAULT_MEETING_MINUTES
        }
    }
}

fn time_range(params: &MeetingParams) -> DailyWindow {
    let Some(range) = params.time_range.as_ref() else {
        return DEFAULT_RANGE;
    };

    match (try_parse_time_of_day(&range.from), try_parse_time_of_day(&range.to)) {
        (Some(start), Some(end)) if start < end => DailyWindow { start, end },
        _ => {
            warn!(target: "app::meeting", from = %range.from, to = %range.to, "invalid time range, using 9:00 AM - 5:00 PM");
            DEFAULT_RANGE
        }
    }
}

fn preferred_days(raw: &[String]) -> Vec<Weekday> {
    let mut days: Vec<Weekday> = raw
        .iter()
        .filter_map(|name| match name.trim().parse::<Weekday>() {
            Ok(day) => Some(day),
            Err(_) => {
                warn!(target: "app::meeting", day = %name, "unknown weekday ignored");
                None
            }
        })
        .collect();

    if days.is_empty() {
        return WORKWEEK.to_vec();
    }
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();
    days
}

fn window_contains(window: &AvailabilityWindow, slot: &DailyWindow) -> bool {
    match (try_parse_time_of_day(&window.start), try_parse_time_of_day(&window.end)) {
        (Some(start), Some(end)) => DailyWindow { start, end }.contains(slot),
        _ => false,
    }
}

fn time_from_minutes(minutes: i64) -> TimeOfDay {
    let minutes = minutes.clamp(0, 23 * 60 + 59) as u32;
    TimeOfDay::new(minutes / 60, minutes % 60).unwrap_or_else(TimeOfDay::midnight)
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Monday of the week containing `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}
