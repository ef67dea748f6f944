use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::preferences::TimeOfDay;

/// `participant -> weekday name -> free windows`.
pub type ParticipantAvailability = BTreeMap<String, BTreeMap<String, Vec<AvailabilityWindow>>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeetingParams {
    /// "1 hour", "30 minutes", "Full day" or a number of minutes.
    #[serde(default)]
    pub duration: Option<JsonValue>,
    #[serde(default)]
    pub preferred_days: Vec<String>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// Monday of the week being searched; other days are offsets from it.
    pub week_start: NaiveDate,
    #[serde(default)]
    pub max_slots: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotAvailability {
    All,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSlot {
    pub day: String,
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// `10:00 AM - 11:00 AM`
    pub time: String,
    pub availability: SlotAvailability,
    pub available_count: usize,
    pub total_count: usize,
    pub available_participants: Vec<String>,
}
