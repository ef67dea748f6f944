use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::models::event::{CalendarEvent, RawCalendarEvent};
use crate::models::preferences::{
    DailyWindow, Preferences, RawPreferences, TimeOfDay, DEFAULT_BREAK_MINUTES,
    DEFAULT_MAX_TASKS_PER_DAY, DEFAULT_SPLIT_THRESHOLD_HOURS, DEFAULT_TIMEZONE, DEFAULT_WORK_END,
    DEFAULT_WORK_START, MAX_BREAK_MINUTES, MIN_SPLIT_THRESHOLD_HOURS,
};
use crate::models::task::{Category, CategoryRef, PriorityRef, RawTask, Task, TimePreference};
use crate::services::schedule_utils;

pub const DEFAULT_PRIORITY: i64 = 2;
pub const DEFAULT_DURATION_HOURS: f64 = 1.0;
/// Upper bound on a single task's duration.
pub const MAX_DURATION_HOURS: f64 = 1000.0;
pub const DEFAULT_DEADLINE_DAYS: i64 = 7;
pub const DEFAULT_CATEGORY_ID: &str = "work";
pub const DEFAULT_CATEGORY_COLOR: &str = "#4CAF50";
pub const DEFAULT_EVENT_TITLE: &str = "Untitled Event";
const DEFAULT_DEADLINE_TIME: TimeOfDay = TimeOfDay {
    hour: 17,
    minute: 0,
};

const CATEGORY_PALETTE: [(&str, &str, &str); 5] = [
    ("work", "Work", "#4CAF50"),
    ("study", "Study", "#2196F3"),
    ("exercise", "Exercise", "#FF9800"),
    ("leisure", "Leisure", "#9C27B0"),
    ("personal", "Personal", "#607D8B"),
];

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?(?:\d+(?:\.\d*)?|\.\d+))").expect("leading number pattern is valid")
});
static LEADING_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]?\d+)").expect("leading integer pattern is valid"));

/// Coerces raw tasks and preferences into canonical form. Never fails: every unusable field
/// falls back to its default.
pub fn normalize(
    raw_tasks: &[RawTask],
    raw_preferences: &RawPreferences,
    now: DateTime<FixedOffset>,
) -> (Vec<Task>, Preferences) {
    let preferences = normalize_preferences(raw_preferences);
    let tasks = raw_tasks
        .iter()
        .enumerate()
        .map(|(idx, raw)| normalize_task(raw, idx + 1, &preferences, now))
        .collect();
    (tasks, preferences)
}

pub fn normalize_task(
    raw: &RawTask,
    position: usize,
    preferences: &Preferences,
    now: DateTime<FixedOffset>,
) -> Task {
    let id = raw
        .id
        .as_ref()
        .and_then(json_text)
        .unwrap_or_else(|| format!("task-{position}"));

    let title = raw
        .title
        .as_ref()
        .and_then(json_text)
        .or_else(|| raw.name.as_ref().and_then(json_text))
        .unwrap_or_else(|| format!("Task {id}"));

    let time_preference = match raw.time_preference.as_ref() {
        None | Some(JsonValue::Null) => TimePreference::Any,
        Some(value) => value
            .as_str()
            .and_then(TimePreference::from_label)
            .unwrap_or_else(|| {
                warn!(target: "app::normalize", task_id = %id, value = %value, "unknown time preference, using any");
                TimePreference::Any
            }),
    };

    Task {
        priority: normalize_priority(raw.priority.as_ref(), &id),
        duration_hours: normalize_duration(raw, &id),
        deadline: normalize_deadline(raw, &id, preferences.timezone, now),
        category: normalize_category(raw.category.as_ref()),
        time_preference,
        title,
        id,
    }
}

pub fn normalize_preferences(raw: &RawPreferences) -> Preferences {
    let timezone = match raw.timezone.as_ref() {
        None | Some(JsonValue::Null) => DEFAULT_TIMEZONE,
        Some(value) => value
            .as_str()
            .and_then(|name| name.trim().parse::<Tz>().ok())
            .unwrap_or_else(|| {
                warn!(target: "app::normalize", value = %value, "unknown timezone, using UTC");
                DEFAULT_TIMEZONE
            }),
    };

    let working_hours = normalize_working_hours(raw.working_hours.as_ref());
    let lunch_break = normalize_lunch(raw.lunch_break.as_ref(), &working_hours);

    let max_tasks_per_day = match raw.max_tasks_per_day.as_ref().and_then(loose_integer) {
        Some(value) if value > 0 => u32::try_from(value).unwrap_or(u32::MAX),
        other => {
            if raw.max_tasks_per_day.is_some() {
                warn!(target: "app::normalize", value = ?other, "invalid maxTasksPerDay, using default");
            }
            DEFAULT_MAX_TASKS_PER_DAY
        }
    };

    let break_between_tasks = match raw.break_between_tasks.as_ref().and_then(loose_integer) {
        Some(value) if value > MAX_BREAK_MINUTES => {
            warn!(target: "app::normalize", value, max = MAX_BREAK_MINUTES, "breakBetweenTasks too long, clamping");
            MAX_BREAK_MINUTES
        }
        Some(value) if value >= 0 => value,
        other => {
            if raw.break_between_tasks.is_some() {
                warn!(target: "app::normalize", value = ?other, "invalid breakBetweenTasks, using default");
            }
            DEFAULT_BREAK_MINUTES
        }
    };

    let split_task_threshold = match raw.split_task_threshold.as_ref().and_then(loose_number) {
        Some(value) if value > 0.0 && value < MIN_SPLIT_THRESHOLD_HOURS => {
            warn!(target: "app::normalize", value, "splitTaskThreshold below one minute, clamping");
            MIN_SPLIT_THRESHOLD_HOURS
        }
        Some(value) if value > 0.0 && value.is_finite() => value,
        other => {
            if raw.split_task_threshold.is_some() {
                warn!(target: "app::normalize", value = ?other, "invalid splitTaskThreshold, using default");
            }
            DEFAULT_SPLIT_THRESHOLD_HOURS
        }
    };

    Preferences {
        working_hours,
        lunch_break,
        max_tasks_per_day,
        break_between_tasks,
        split_task_threshold,
        timezone,
    }
}

/// Events are busy intervals; a broken one is repaired rather than dropped.
pub fn normalize_events(
    raw_events: &[RawCalendarEvent],
    preferences: &Preferences,
    now: DateTime<FixedOffset>,
) -> Vec<CalendarEvent> {
    raw_events
        .iter()
        .map(|raw| {
            let title = raw
                .title
                .as_ref()
                .and_then(json_text)
                .unwrap_or_else(|| DEFAULT_EVENT_TITLE.to_string());

            let start = raw
                .start
                .as_ref()
                .and_then(|value| json_instant(value, preferences.timezone))
                .unwrap_or_else(|| {
                    warn!(target: "app::normalize", %title, "event start unparseable, using now");
                    now
                });

            let end = match raw
                .end
                .as_ref()
                .and_then(|value| json_instant(value, preferences.timezone))
            {
                Some(end) if end > start => end,
                _ => {
                    warn!(target: "app::normalize", %title, "event end missing or not after start, using one hour");
                    start + Duration::hours(1)
                }
            };

            CalendarEvent { title, start, end }
        })
        .collect()
}

pub fn category_for_id(id: &str) -> Category {
    let trimmed = id.trim();
    let key = if trimmed.is_empty() {
        DEFAULT_CATEGORY_ID.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    };

    match CATEGORY_PALETTE
        .iter()
        .find(|(palette_id, _, _)| *palette_id == key)
    {
        Some((palette_id, name, color)) => Category {
            id: (*palette_id).to_string(),
            name: (*name).to_string(),
            color: (*color).to_string(),
        },
        None => Category {
            id: trimmed.to_string(),
            name: capitalize(trimmed),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
        },
    }
}

fn normalize_category(raw: Option<&CategoryRef>) -> Category {
    match raw {
        None => category_for_id(DEFAULT_CATEGORY_ID),
        Some(CategoryRef::Id(id)) => category_for_id(id),
        Some(CategoryRef::Rich { id, name, color }) => {
            let mut category = category_for_id(id);
            if let Some(name) = name.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                category.name = name.to_string();
            }
            if let Some(color) = color.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                category.color = color.to_string();
            }
            category
        }
        Some(CategoryRef::Other(value)) => {
            if !value.is_null() {
                warn!(target: "app::normalize", value = %value, "unrecognized category, using work");
            }
            category_for_id(DEFAULT_CATEGORY_ID)
        }
    }
}

fn normalize_priority(raw: Option<&PriorityRef>, task_id: &str) -> i64 {
    let parsed = match raw {
        None => return DEFAULT_PRIORITY,
        Some(PriorityRef::Number(value)) => {
            value.is_finite().then(|| value.trunc() as i64)
        }
        Some(PriorityRef::Text(text)) => leading_integer(text),
        Some(PriorityRef::Level { value }) => loose_integer(value),
        Some(PriorityRef::Other(JsonValue::Null)) => return DEFAULT_PRIORITY,
        Some(PriorityRef::Other(_)) => None,
    };

    parsed.unwrap_or_else(|| {
        warn!(target: "app::normalize", %task_id, "unparseable priority, using default");
        DEFAULT_PRIORITY
    })
}

fn normalize_duration(raw: &RawTask, task_id: &str) -> f64 {
    let sources = [
        ("duration", raw.duration.as_ref()),
        ("hoursPerDay", raw.hours_per_day.as_ref()),
        ("estimatedHours", raw.estimated_hours.as_ref()),
    ];

    let found = sources.iter().find_map(|(field, value)| {
        value
            .and_then(loose_number)
            .map(|hours| (*field, hours))
    });

    match found {
        Some((field, hours)) if hours > MAX_DURATION_HOURS => {
            warn!(
                target: "app::normalize",
                %task_id,
                field,
                hours,
                max = MAX_DURATION_HOURS,
                "duration too long, capping"
            );
            MAX_DURATION_HOURS
        }
        Some((_, hours)) if hours > 0.0 && hours.is_finite() => hours,
        Some((field, hours)) => {
            warn!(target: "app::normalize", %task_id, field, hours, "non-positive duration, using one hour");
            DEFAULT_DURATION_HOURS
        }
        None => {
            debug!(target: "app::normalize", %task_id, "no usable duration, using one hour");
            DEFAULT_DURATION_HOURS
        }
    }
}

fn normalize_deadline(
    raw: &RawTask,
    task_id: &str,
    tz: Tz,
    now: DateTime<FixedOffset>,
) -> DateTime<FixedOffset> {
    if let Some(instant) = raw
        .full_deadline
        .as_ref()
        .and_then(|value| json_instant(value, tz))
    {
        return instant;
    }

    if let Some(text) = raw.deadline.as_ref().and_then(json_text) {
        if let Some(instant) = schedule_utils::parse_instant_in(&text, tz) {
            return instant;
        }
        if let Ok(date) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
            let time = raw
                .deadline_time
                .as_ref()
                .and_then(json_text)
                .and_then(|value| schedule_utils::try_parse_time_of_day(&value))
                .unwrap_or(DEFAULT_DEADLINE_TIME);
            return schedule_utils::at_time(date, time, tz);
        }
    }

    if raw.full_deadline.is_some() || raw.deadline.is_some() {
        warn!(target: "app::normalize", %task_id, "unparseable deadline, using one week from now");
    }
    now + Duration::days(DEFAULT_DEADLINE_DAYS)
}

fn normalize_working_hours(raw: Option<&JsonValue>) -> DailyWindow {
    let default = DailyWindow {
        start: DEFAULT_WORK_START,
        end: DEFAULT_WORK_END,
    };
    let Some(fields) = raw.and_then(|value| window_fields(value, "workingHours")) else {
        return default;
    };

    let start = fields
        .get("start")
        .and_then(json_time)
        .unwrap_or(DEFAULT_WORK_START);
    let end = fields
        .get("end")
        .and_then(json_time)
        .unwrap_or(DEFAULT_WORK_END);

    if end <= start {
        warn!(target: "app::normalize", %start, %end, "working hours end before they start, using 09:00-17:00");
        return default;
    }
    DailyWindow { start, end }
}

fn normalize_lunch(raw: Option<&JsonValue>, working: &DailyWindow) -> Option<DailyWindow> {
    let Some(raw) = raw.filter(|value| !value.is_null()) else {
        return Preferences::default().lunch_break;
    };
    let fields = window_fields(raw, "lunchBreak")?;

    let start = fields.get("start").and_then(json_time);
    let end = fields.get("end").and_then(json_time);
    let (Some(start), Some(end)) = (start, end) else {
        debug!(target: "app::normalize", "lunch window incomplete, ignoring it");
        return None;
    };

    let lunch = DailyWindow { start, end };
    if end <= start || !working.contains(&lunch) || lunch.contains(working) {
        warn!(target: "app::normalize", %start, %end, "lunch window unusable, ignoring it");
        return None;
    }
    Some(lunch)
}

/// `{start, end}` object of a daily window; anything else is logged and ignored.
fn window_fields<'a>(value: &'a JsonValue, field: &str) -> Option<&'a serde_json::Map<String, JsonValue>> {
    match value {
        JsonValue::Null => None,
        JsonValue::Object(fields) => Some(fields),
        other => {
            warn!(target: "app::normalize", field, value = %other, "daily window is not an object, ignoring it");
            None
        }
    }
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn json_time(value: &JsonValue) -> Option<TimeOfDay> {
    let parsed = value
        .as_str()
        .and_then(schedule_utils::try_parse_time_of_day);
    if parsed.is_none() {
        warn!(target: "app::normalize", value = %value, "unparseable time of day, using default");
    }
    parsed
}

fn json_instant(value: &JsonValue, tz: Tz) -> Option<DateTime<FixedOffset>> {
    value
        .as_str()
        .and_then(|text| schedule_utils::parse_instant_in(text, tz))
}

/// Numbers, or strings that start with one (`"2.5"`, `"3 hours"`).
pub fn loose_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => leading_number(text),
        _ => None,
    }
}

fn loose_integer(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64)),
        JsonValue::String(text) => leading_integer(text),
        _ => None,
    }
}

fn leading_number(text: &str) -> Option<f64> {
    LEADING_NUMBER
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Saturates instead of failing when the digits do not fit an `i64`.
fn leading_integer(text: &str) -> Option<i64> {
    let digits = LEADING_INTEGER.captures(text)?.get(1)?.as_str();
    digits
        .parse::<i64>()
        .ok()
        .or_else(|| digits.parse::<f64>().ok().map(|value| value as i64))
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
