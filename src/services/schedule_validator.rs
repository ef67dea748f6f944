use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::error::ScheduleRejection;
use crate::models::event::CalendarEvent;
use crate::models::schedule::ScheduledSession;
use crate::models::task::Task;
use crate::services::schedule_utils::{self, Interval};
use crate::services::task_normalizer::{category_for_id, DEFAULT_CATEGORY_ID};

/// Gatekeeper for schedules that did not come from the deterministic packer.
pub struct ScheduleValidator<'a> {
    tasks: HashMap<&'a str, &'a Task>,
    events: &'a [CalendarEvent],
    timezone: Tz,
}

struct CheckedRecord {
    index: usize,
    task_id: String,
    title: String,
    interval: Interval,
    notes: Option<String>,
}

impl<'a> ScheduleValidator<'a> {
    pub fn new(tasks: &'a [Task], events: &'a [CalendarEvent], timezone: Tz) -> Self {
        Self {
            tasks: tasks.iter().map(|task| (task.id.as_str(), task)).collect(),
            events,
            timezone,
        }
    }

    /// Accepts the candidate only if every record passes; the first violation rejects it whole.
    pub fn check(&self, candidate: &JsonValue) -> Result<Vec<ScheduledSession>, ScheduleRejection> {
        let records = candidate_records(candidate).ok_or(ScheduleRejection::NotAnArray)?;
        if records.is_empty() {
            return Err(ScheduleRejection::Empty);
        }

        let mut checked = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            checked.push(self.check_record(index, record)?);
        }

        let mut order: Vec<usize> = (0..checked.len()).collect();
        order.sort_by(|a, b| {
            checked[*a]
                .interval
                .start
                .cmp(&checked[*b].interval.start)
                .then_with(|| a.cmp(b))
        });
        for pair in order.windows(2) {
            let (first, second) = (&checked[pair[0]], &checked[pair[1]]);
            if first.interval.overlaps(&second.interval) {
                return Err(ScheduleRejection::Overlap {
                    first: first.index.min(second.index),
                    second: first.index.max(second.index),
                });
            }
        }

        for record in &checked {
            if let Some(event) = self
                .events
                .iter()
                .find(|event| record.interval.overlaps(&Interval::new(event.start, event.end)))
            {
                return Err(ScheduleRejection::EventConflict {
                    index: record.index,
                    event_title: event.title.clone(),
                });
            }
        }

        let mut sessions: Vec<ScheduledSession> = order
            .into_iter()
            .map(|idx| {
                let record = &checked[idx];
                let category = self
                    .tasks
                    .get(record.task_id.as_str())
                    .map(|task| task.category.clone())
                    .unwrap_or_else(|| category_for_id(DEFAULT_CATEGORY_ID));
                ScheduledSession {
                    task_id: record.task_id.clone(),
                    title: record.title.clone(),
                    start: record.interval.start,
                    end: record.interval.end,
                    category,
                    notes: record.notes.clone(),
                }
            })
            .collect();
        sessions.sort_by(|a, b| a.start.cmp(&b.start));

        debug!(target: "app::validation", sessions = sessions.len(), "candidate schedule accepted");
        Ok(sessions)
    }

    fn check_record(&self, index: usize, record: &JsonValue) -> Result<CheckedRecord, ScheduleRejection> {
        let Some(fields) = record.as_object() else {
            return Err(ScheduleRejection::MissingField { index, field: "id" });
        };

        let task_id = text_field(fields, &["taskId", "id"])
            .ok_or(ScheduleRejection::MissingField { index, field: "id" })?;
        let title = text_field(fields, &["title"])
            .ok_or(ScheduleRejection::MissingField { index, field: "title" })?;
        let start = self.instant_field(fields, index, "start")?;
        let end = self.instant_field(fields, index, "end")?;

        if start >= end {
            return Err(ScheduleRejection::NonPositiveInterval { index });
        }
        if !self.tasks.contains_key(task_id.as_str()) {
            return Err(ScheduleRejection::UnknownTask { index, task_id });
        }

        Ok(CheckedRecord {
            index,
            task_id,
            title,
            interval: Interval::new(start, end),
            notes: text_field(fields, &["notes"]),
        })
    }

    fn instant_field(
        &self,
        fields: &Map<String, JsonValue>,
        index: usize,
        field: &'static str,
    ) -> Result<DateTime<FixedOffset>, ScheduleRejection> {
        let raw = text_field(fields, &[field]).ok_or(ScheduleRejection::MissingField { index, field })?;
        schedule_utils::parse_instant_in(&raw, self.timezone).ok_or(ScheduleRejection::InvalidInstant {
            index,
            field,
            value: raw,
        })
    }
}

/// Boolean form of [`ScheduleValidator::check`] without calendar events, in UTC.
pub fn validate(candidate: &JsonValue, tasks: &[Task]) -> bool {
    ScheduleValidator::new(tasks, &[], Tz::UTC)
        .check(candidate)
        .is_ok()
}

/// A bare array, or an object wrapping one under `schedule` or `items`.
fn candidate_records(candidate: &JsonValue) -> Option<&Vec<JsonValue>> {
    match candidate {
        JsonValue::Array(records) => Some(records),
        JsonValue::Object(fields) => fields
            .get("schedule")
            .or_else(|| fields.get("items"))
            .and_then(JsonValue::as_array),
        _ => None,
    }
}

fn text_field(fields: &Map<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key) {
        Some(JsonValue::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(JsonValue::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}
