use std::cmp::Ordering;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use tracing::{debug, info, warn};

use crate::models::event::CalendarEvent;
use crate::models::preferences::{
    DailyWindow, Preferences, MAX_BREAK_MINUTES, MIN_SPLIT_THRESHOLD_HOURS,
};
use crate::models::schedule::ScheduledSession;
use crate::models::task::Task;
use crate::services::schedule_utils::{self, Interval};
use crate::services::session_splitter;
use crate::services::task_normalizer::MAX_DURATION_HOURS;

/// Deterministic first-fit packer. It has no failure path: every task ends up scheduled.
pub struct GreedyPacker {
    preferences: Preferences,
    busy: Vec<Interval>,
}

/// Position of the packer in time.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    day: NaiveDate,
    at: DateTime<FixedOffset>,
    placed_today: u32,
}

impl GreedyPacker {
    pub fn new(preferences: &Preferences, events: &[CalendarEvent]) -> Self {
        let mut busy: Vec<Interval> = events
            .iter()
            .filter(|event| event.start < event.end)
            .map(|event| Interval::new(event.start, event.end))
            .collect();
        busy.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));

        Self {
            preferences: usable_preferences(preferences),
            busy,
        }
    }

    pub fn pack(&self, tasks: &[Task], now: DateTime<FixedOffset>) -> Vec<ScheduledSession> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let ordered = order_tasks(tasks);
        let limit = self.session_limit_seconds();
        let break_length = Duration::minutes(self.preferences.break_between_tasks);

        let start = schedule_utils::first_working_start(now, &self.preferences);
        let mut cursor = Cursor {
            day: schedule_utils::local_date(start, self.preferences.timezone),
            at: start,
            placed_today: 0,
        };

        let mut sessions = Vec::new();
        for task in ordered {
            let total = task_seconds(&task);
            let parts = session_splitter::split_seconds(total, limit);
            let count = parts.len();

            for (idx, seconds) in parts.into_iter().enumerate() {
                let slot = self.place(&mut cursor, Duration::seconds(seconds));
                debug!(
                    target: "app::planning",
                    task_id = %task.id,
                    part = idx + 1,
                    count,
                    start = %slot.start,
                    "session placed"
                );

                sessions.push(ScheduledSession {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    start: slot.start,
                    end: slot.end,
                    category: task.category.clone(),
                    notes: session_splitter::part_note(idx, count),
                });

                cursor.placed_today += 1;
                cursor.at = slot.end.checked_add_signed(break_length).unwrap_or(slot.end);
            }
        }

        debug_assert!(
            sessions.windows(2).all(|pair| pair[0].end <= pair[1].start),
            "cursor moved backwards"
        );
        info!(
            target: "app::planning",
            tasks = tasks.len(),
            sessions = sessions.len(),
            "deterministic schedule built"
        );
        sessions
    }

    fn place(&self, cursor: &mut Cursor, length: Duration) -> Interval {
        loop {
            if cursor.placed_today >= self.preferences.max_tasks_per_day {
                self.advance_day(cursor);
                continue;
            }

            let window = schedule_utils::day_window(cursor.day, &self.preferences);
            if cursor.at < window.start {
                cursor.at = window.start;
            }

            let tentative = Interval::new(cursor.at, cursor.at + length);
            if tentative.end > window.end {
                self.advance_day(cursor);
                continue;
            }

            match self.blocking_interval(cursor.day, &tentative) {
                Some(block) => cursor.at = block.end,
                None => return tentative,
            }
        }
    }

    fn advance_day(&self, cursor: &mut Cursor) {
        let next = schedule_utils::next_weekday(cursor.day + Duration::days(1));
        cursor.day = next;
        cursor.at = schedule_utils::day_window(next, &self.preferences).start;
        cursor.placed_today = 0;
    }

    fn blocking_interval(&self, day: NaiveDate, tentative: &Interval) -> Option<Interval> {
        let lunch = schedule_utils::lunch_window(day, &self.preferences)
            .filter(|lunch| lunch.overlaps(tentative));

        let event = self
            .busy
            .iter()
            .filter(|busy| busy.overlaps(tentative))
            .max_by(|a, b| a.end.cmp(&b.end))
            .copied();

        match (lunch, event) {
            (Some(lunch), Some(event)) => Some(if lunch.end >= event.end { lunch } else { event }),
            (lunch, event) => lunch.or(event),
        }
    }

    /// Split threshold capped to the longest stretch a working day can hold.
    fn session_limit_seconds(&self) -> i64 {
        let requested =
            session_splitter::hours_to_seconds(self.preferences.split_task_threshold).max(1);
        let free = longest_free_stretch(&self.preferences) * 60;
        if requested > free {
            warn!(
                target: "app::planning",
                requested_seconds = requested,
                free_seconds = free,
                "split threshold longer than any free stretch of the day, clamping"
            );
            free
        } else {
            requested
        }
    }
}

/// Convenience entry point over [`GreedyPacker`].
pub fn build_schedule(
    tasks: &[Task],
    events: &[CalendarEvent],
    preferences: &Preferences,
    now: DateTime<FixedOffset>,
) -> Vec<ScheduledSession> {
    GreedyPacker::new(preferences, events).pack(tasks, now)
}

/// Priority descending, then deadline ascending. `sort_by` is stable, so remaining ties keep
/// input order.
pub fn order_tasks(tasks: &[Task]) -> Vec<Task> {
    let mut ordered = tasks.to_vec();
    ordered.sort_by(compare_tasks);
    ordered
}

fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.deadline.cmp(&b.deadline))
}

fn task_seconds(task: &Task) -> i64 {
    let max = session_splitter::hours_to_seconds(MAX_DURATION_HOURS);
    let total = session_splitter::hours_to_seconds(task.duration_hours).max(1);
    if total > max {
        warn!(
            target: "app::planning",
            task_id = %task.id,
            hours = task.duration_hours,
            "task duration too long, capping"
        );
        return max;
    }
    total
}

/// Minutes of the longest lunch-free stretch inside the working window.
fn longest_free_stretch(preferences: &Preferences) -> i64 {
    let working = preferences.working_hours;
    match preferences.lunch_break {
        Some(lunch) => {
            let before = lunch.start.minutes_from_midnight() - working.start.minutes_from_midnight();
            let after = working.end.minutes_from_midnight() - lunch.end.minutes_from_midnight();
            before.max(after)
        }
        None => working.minutes(),
    }
}

/// Preferences built by hand can skip normalization; the packer still has to terminate.
fn usable_preferences(preferences: &Preferences) -> Preferences {
    let mut usable = preferences.clone();
    let defaults = Preferences::default();

    if usable.working_hours.minutes() <= 0 {
        warn!(target: "app::planning", "empty working window, using defaults");
        usable.working_hours = defaults.working_hours;
    }
    if let Some(lunch) = usable.lunch_break {
        if !lunch_fits(&usable.working_hours, &lunch) {
            warn!(target: "app::planning", "lunch window unusable, ignoring it");
            usable.lunch_break = None;
        }
    }
    if usable.max_tasks_per_day == 0 {
        usable.max_tasks_per_day = defaults.max_tasks_per_day;
    }
    if usable.break_between_tasks < 0 {
        usable.break_between_tasks = defaults.break_between_tasks;
    } else if usable.break_between_tasks > MAX_BREAK_MINUTES {
        warn!(target: "app::planning", "break longer than a day, clamping");
        usable.break_between_tasks = MAX_BREAK_MINUTES;
    }
    if !(usable.split_task_threshold.is_finite() && usable.split_task_threshold > 0.0) {
        usable.split_task_threshold = defaults.split_task_threshold;
    } else if usable.split_task_threshold < MIN_SPLIT_THRESHOLD_HOURS {
        usable.split_task_threshold = MIN_SPLIT_THRESHOLD_HOURS;
    }
    usable
}

fn lunch_fits(working: &DailyWindow, lunch: &DailyWindow) -> bool {
    lunch.minutes() > 0 && working.contains(lunch) && !lunch.contains(working)
}
