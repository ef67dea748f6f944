use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::models::event::CalendarEvent;
use crate::models::preferences::Preferences;
use crate::models::task::{Category, Task};

/// One placed block of (a part of) a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSession {
    pub task_id: String,
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ScheduledSession {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Normalized input handed to every schedule provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub tasks: Vec<Task>,
    pub events: Vec<CalendarEvent>,
    pub preferences: Preferences,
    pub now: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ScheduleSource {
    Provider { name: String },
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    pub sessions: Vec<ScheduledSession>,
    pub source: ScheduleSource,
    #[serde(default)]
    pub rejected_attempts: Vec<ProviderAttempt>,
}

impl PlanOutcome {
    pub fn is_fallback(&self) -> bool {
        self.source == ScheduleSource::Fallback
    }
}
