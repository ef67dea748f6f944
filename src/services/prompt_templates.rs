use serde_json::{json, Value as JsonValue};

use crate::models::schedule::PlanRequest;
use crate::models::preferences::Preferences;

/// System prompt for schedule generation. The rules mirror what the deterministic packer
/// enforces so that a well-behaved oracle passes validation.
pub fn schedule_system_prompt(preferences: &Preferences) -> String {
    let threshold = format_hours(preferences.split_task_threshold);
    let lunch_rule = match preferences.lunch_break {
        Some(lunch) => format!("- Do NOT schedule during lunch: {} to {}\n", lunch.start, lunch.end),
        None => String::new(),
    };

    format!(
        r#"You are a task scheduling assistant. Optimize the user's tasks based on priorities, deadlines, and existing calendar events.

SCHEDULING RULES:
1. Tasks must NEVER overlap with each other or with existing calendar events.
2. Higher priority tasks come first, then the ones with the earliest deadline.
3. If a task is longer than {threshold} hours, split it into parts of exactly {threshold} hours each; only the last part may be shorter.
4. Only schedule between {work_start} and {work_end} ({timezone}) on each day.
5. Leave a {break_minutes}-minute break after every session.
6. Schedule at most {max_per_day} sessions per day.
7. Skip weekends: only schedule Monday through Friday.
8. Label split sessions with notes "Part X of Y".
{lunch_rule}- Respect time-of-day preferences (morning: before 12:00, afternoon: 12:00-17:00, evening: after 17:00).

Respond with a JSON array only. Each element must have:
- id: the original task id
- title: the task title
- start: ISO-8601 start time with offset
- end: ISO-8601 end time with offset
- notes: "Part X of Y" for split tasks, otherwise omit

Example:
[
  {{"id": "123", "title": "Thesis", "start": "2025-04-30T09:00:00Z", "end": "2025-04-30T11:00:00Z", "notes": "Part 1 of 3"}},
  {{"id": "123", "title": "Thesis", "start": "2025-04-30T11:15:00Z", "end": "2025-04-30T13:15:00Z", "notes": "Part 2 of 3"}}
]"#,
        work_start = preferences.working_hours.start,
        work_end = preferences.working_hours.end,
        timezone = preferences.timezone.name(),
        break_minutes = preferences.break_between_tasks,
        max_per_day = preferences.max_tasks_per_day,
    )
}

/// User message for the oracle: the normalized request as JSON.
pub fn build_schedule_payload(request: &PlanRequest) -> JsonValue {
    json!({
        "operation": "planSchedule",
        "now": request.now.to_rfc3339(),
        "tasks": request.tasks,
        "events": request.events,
        "preferences": request.preferences,
    })
}

/// Body for the scheduling backend's `schedule-tasks` endpoint.
pub fn build_backend_payload(request: &PlanRequest) -> JsonValue {
    json!({
        "tasks": request.tasks,
        "events": request.events,
        "preferences": request.preferences,
    })
}

fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{}", hours as i64)
    } else {
        format!("{hours}")
    }
}
