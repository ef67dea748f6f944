use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Task as the caller hands it over: every field optional, several of them duck-typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTask {
    pub id: Option<JsonValue>,
    pub title: Option<JsonValue>,
    pub name: Option<JsonValue>,
    pub priority: Option<PriorityRef>,
    pub duration: Option<JsonValue>,
    pub hours_per_day: Option<JsonValue>,
    pub estimated_hours: Option<JsonValue>,
    pub full_deadline: Option<JsonValue>,
    pub deadline: Option<JsonValue>,
    pub deadline_time: Option<JsonValue>,
    pub category: Option<CategoryRef>,
    #[serde(alias = "timeOfDayPreference")]
    pub time_preference: Option<JsonValue>,
}

/// Category as it may arrive: a bare id or a (possibly partial) rich object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CategoryRef {
    Id(String),
    Rich {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        color: Option<String>,
    },
    Other(JsonValue),
}

/// Priority as it may arrive: a number, a numeric string, or an object carrying `value`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PriorityRef {
    Number(f64),
    Text(String),
    Level { value: JsonValue },
    Other(JsonValue),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimePreference {
    #[default]
    Any,
    Morning,
    Afternoon,
    Evening,
}

impl TimePreference {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "any" | "" => Some(TimePreference::Any),
            "morning" => Some(TimePreference::Morning),
            "afternoon" => Some(TimePreference::Afternoon),
            "evening" => Some(TimePreference::Evening),
            _ => None,
        }
    }
}

/// Canonical task produced by the normalizer. Every field is resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub priority: i64,
    /// Hours, always positive.
    #[serde(rename = "duration")]
    pub duration_hours: f64,
    pub deadline: DateTime<FixedOffset>,
    pub category: Category,
    #[serde(default)]
    pub time_preference: TimePreference,
}
