use std::fmt;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::services::schedule_utils;

pub const DEFAULT_WORK_START: TimeOfDay = TimeOfDay { hour: 9, minute: 0 };
pub const DEFAULT_WORK_END: TimeOfDay = TimeOfDay {
    hour: 17,
    minute: 0,
};
pub const DEFAULT_MAX_TASKS_PER_DAY: u32 = 5;
pub const DEFAULT_BREAK_MINUTES: i64 = 15;
/// Longest accepted break; anything above is clamped to a full day.
pub const MAX_BREAK_MINUTES: i64 = 24 * 60;
pub const DEFAULT_SPLIT_THRESHOLD_HOURS: f64 = 2.0;
/// Sessions are never split below one minute.
pub const MIN_SPLIT_THRESHOLD_HOURS: f64 = 1.0 / 60.0;
pub const DEFAULT_TIMEZONE: Tz = Tz::UTC;

/// Wall-clock time of day. Serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn midnight() -> Self {
        Self { hour: 0, minute: 0 }
    }

    pub fn minutes_from_midnight(self) -> i64 {
        i64::from(self.hour) * 60 + i64::from(self.minute)
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// `h:MM AM` style label.
    pub fn to_meridiem_label(self) -> String {
        let suffix = if self.hour < 12 { "AM" } else { "PM" };
        let hour = match self.hour % 12 {
            0 => 12,
            other => other,
        };
        format!("{hour}:{:02} {suffix}", self.minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl From<String> for TimeOfDay {
    fn from(value: String) -> Self {
        schedule_utils::parse_time_of_day(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl DailyWindow {
    pub fn minutes(&self) -> i64 {
        self.end.minutes_from_midnight() - self.start.minutes_from_midnight()
    }

    pub fn contains(&self, other: &DailyWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Preferences exactly as supplied. Anything may be missing or malformed; every field stays raw
/// JSON and is coerced on its own by the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPreferences {
    /// `{ "start": .., "end": .. }`
    pub working_hours: Option<JsonValue>,
    pub lunch_break: Option<JsonValue>,
    pub max_tasks_per_day: Option<JsonValue>,
    pub break_between_tasks: Option<JsonValue>,
    pub split_task_threshold: Option<JsonValue>,
    pub timezone: Option<JsonValue>,
}

/// Canonical scheduling preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub working_hours: DailyWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lunch_break: Option<DailyWindow>,
    pub max_tasks_per_day: u32,
    /// Minutes inserted after every placed session.
    pub break_between_tasks: i64,
    /// Hours; longer tasks are split into sessions of this length.
    pub split_task_threshold: f64,
    #[serde(with = "tz_name")]
    pub timezone: Tz,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            working_hours: DailyWindow {
                start: DEFAULT_WORK_START,
                end: DEFAULT_WORK_END,
            },
            lunch_break: Some(DailyWindow {
                start: TimeOfDay {
                    hour: 12,
                    minute: 0,
                },
                end: TimeOfDay {
                    hour: 13,
                    minute: 0,
                },
            }),
            max_tasks_per_day: DEFAULT_MAX_TASKS_PER_DAY,
            break_between_tasks: DEFAULT_BREAK_MINUTES,
            split_task_threshold: DEFAULT_SPLIT_THRESHOLD_HOURS,
            timezone: DEFAULT_TIMEZONE,
        }
    }
}

mod tz_name {
    use chrono_tz::Tz;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Tz, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse::<Tz>().unwrap_or(super::DEFAULT_TIMEZONE))
    }
}
