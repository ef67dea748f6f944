use std::collections::HashMap;

use autoplan_lib::models::event::CalendarEvent;
use autoplan_lib::models::preferences::{DailyWindow, Preferences, TimeOfDay, MAX_BREAK_MINUTES};
use autoplan_lib::models::schedule::ScheduledSession;
use autoplan_lib::models::task::{Task, TimePreference};
use autoplan_lib::services::schedule_optimizer::{build_schedule, order_tasks};
use autoplan_lib::services::schedule_utils::{self, Interval};
use autoplan_lib::services::session_splitter::hours_to_seconds;
use autoplan_lib::services::task_normalizer::{category_for_id, MAX_DURATION_HOURS};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SWEEPS: u64 = 64;

fn dt(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .expect("offset")
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid datetime")
}

fn time(hour: u32, minute: u32) -> TimeOfDay {
    TimeOfDay::new(hour, minute).expect("valid time")
}

fn task(id: &str, priority: i64, hours: f64, deadline: DateTime<FixedOffset>) -> Task {
    Task {
        id: id.to_string(),
        title: format!("Task {id}"),
        priority,
        duration_hours: hours,
        deadline,
        category: category_for_id("work"),
        time_preference: TimePreference::Any,
    }
}

fn random_preferences(rng: &mut StdRng) -> Preferences {
    let (start, end) = [(8, 16), (9, 17), (9, 18), (10, 19)][rng.gen_range(0..4)];
    Preferences {
        working_hours: DailyWindow {
            start: time(start, 0),
            end: time(end, 0),
        },
        lunch_break: rng.gen_bool(0.8).then(|| DailyWindow {
            start: time(12, 0),
            end: time(13, 0),
        }),
        max_tasks_per_day: rng.gen_range(1..=6),
        break_between_tasks: [0, 5, 15, 30][rng.gen_range(0..4)],
        split_task_threshold: [0.5, 1.0, 1.5, 2.0, 3.0][rng.gen_range(0..5)],
        ..Preferences::default()
    }
}

fn random_tasks(rng: &mut StdRng, now: DateTime<FixedOffset>) -> Vec<Task> {
    let count = rng.gen_range(1..=12);
    (0..count)
        .map(|idx| {
            let quarters: u32 = rng.gen_range(1..=24);
            task(
                &format!("t{idx}"),
                rng.gen_range(1..=3),
                f64::from(quarters) * 0.25,
                now + Duration::days(rng.gen_range(1..=14)),
            )
        })
        .collect()
}

fn random_events(rng: &mut StdRng, monday: NaiveDate) -> Vec<CalendarEvent> {
    let count = rng.gen_range(0..=6);
    (0..count)
        .map(|idx| {
            let date = monday + Duration::days(rng.gen_range(0..12));
            let start = dt(date.year(), date.month(), date.day(), rng.gen_range(7..18), 30 * rng.gen_range(0..2));
            CalendarEvent {
                title: format!("Event {idx}"),
                start,
                end: start + Duration::minutes(30 * rng.gen_range(1..=4)),
            }
        })
        .collect()
}

fn sessions_by_task(sessions: &[ScheduledSession]) -> HashMap<&str, Vec<&ScheduledSession>> {
    let mut grouped: HashMap<&str, Vec<&ScheduledSession>> = HashMap::new();
    for session in sessions {
        grouped.entry(session.task_id.as_str()).or_default().push(session);
    }
    grouped
}

fn assert_schedule_invariants(
    tasks: &[Task],
    events: &[CalendarEvent],
    prefs: &Preferences,
    sessions: &[ScheduledSession],
) {
    for pair in sessions.windows(2) {
        assert!(
            pair[0].end <= pair[1].start,
            "sessions overlap: {:?} / {:?}",
            pair[0],
            pair[1]
        );
    }

    let mut per_day: HashMap<NaiveDate, u32> = HashMap::new();
    for session in sessions {
        assert!(session.start < session.end);
        let date = schedule_utils::local_date(session.start, prefs.timezone);
        assert!(
            !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            "weekend session {session:?}"
        );

        let slot = Interval::new(session.start, session.end);
        let window = schedule_utils::day_window(date, prefs);
        assert!(window.contains(&slot), "outside working hours: {session:?}");

        if let Some(lunch) = schedule_utils::lunch_window(date, prefs) {
            assert!(!lunch.overlaps(&slot), "session during lunch: {session:?}");
        }
        for event in events {
            assert!(
                !Interval::new(event.start, event.end).overlaps(&slot),
                "session {session:?} overlaps {event:?}"
            );
        }

        *per_day.entry(date).or_default() += 1;
    }
    for (date, count) in per_day {
        assert!(
            count <= prefs.max_tasks_per_day,
            "{count} sessions on {date}, cap is {}",
            prefs.max_tasks_per_day
        );
    }

    let limit = hours_to_seconds(prefs.split_task_threshold);
    let grouped = sessions_by_task(sessions);
    for task in tasks {
        let parts = grouped.get(task.id.as_str()).expect("every task is scheduled");
        let total: i64 = parts.iter().map(|s| (s.end - s.start).num_seconds()).sum();
        assert_eq!(total, hours_to_seconds(task.duration_hours), "task {}", task.id);

        let expected_parts = (total + limit - 1) / limit;
        assert_eq!(parts.len() as i64, expected_parts, "task {}", task.id);
        for (idx, part) in parts.iter().enumerate() {
            let length = (part.end - part.start).num_seconds();
            if idx + 1 < parts.len() {
                assert_eq!(length, limit);
            }
            let expected_note = (parts.len() > 1).then(|| format!("Part {} of {}", idx + 1, parts.len()));
            assert_eq!(part.notes, expected_note);
        }
    }
}

#[test]
fn random_schedules_hold_invariants() {
    for seed in 0..SWEEPS {
        let mut rng = StdRng::seed_from_u64(seed);
        let now = dt(2025, 5, 5, rng.gen_range(6..20), 0);
        let prefs = random_preferences(&mut rng);
        let tasks = random_tasks(&mut rng, now);
        let events = random_events(&mut rng, NaiveDate::from_ymd_opt(2025, 5, 5).expect("date"));

        let sessions = build_schedule(&tasks, &events, &prefs, now);
        assert!(sessions.iter().all(|s| s.start >= now), "seed {seed}");
        assert_schedule_invariants(&tasks, &events, &prefs, &sessions);
    }
}

#[test]
fn placement_follows_task_order() {
    for seed in 0..SWEEPS {
        let mut rng = StdRng::seed_from_u64(1_000 + seed);
        let now = dt(2025, 5, 5, 8, 0);
        let prefs = random_preferences(&mut rng);
        let tasks = random_tasks(&mut rng, now);

        let sessions = build_schedule(&tasks, &[], &prefs, now);
        let grouped = sessions_by_task(&sessions);
        let ordered = order_tasks(&tasks);

        for pair in ordered.windows(2) {
            let earlier_last = grouped[pair[0].id.as_str()]
                .iter()
                .map(|s| s.start)
                .max()
                .expect("sessions");
            let later_first = grouped[pair[1].id.as_str()]
                .iter()
                .map(|s| s.start)
                .min()
                .expect("sessions");
            assert!(earlier_last < later_first, "seed {seed}: {} before {}", pair[0].id, pair[1].id);
        }
    }
}

#[test]
fn higher_priority_with_same_deadline_goes_first() {
    let now = dt(2025, 5, 5, 8, 0);
    let deadline = now + Duration::days(3);
    for seed in 0..SWEEPS {
        let mut rng = StdRng::seed_from_u64(2_000 + seed);
        let tasks: Vec<Task> = (0..rng.gen_range(2..8))
            .map(|idx| task(&format!("p{idx}"), rng.gen_range(1..=3), 1.0, deadline))
            .collect();
        let sessions = build_schedule(&tasks, &[], &Preferences::default(), now);
        let first_start = |id: &str| {
            sessions
                .iter()
                .find(|s| s.task_id == id)
                .map(|s| s.start)
                .expect("scheduled")
        };

        for a in &tasks {
            for b in &tasks {
                if a.priority > b.priority {
                    assert!(first_start(&a.id) <= first_start(&b.id), "seed {seed}");
                }
            }
        }
    }
}

#[test]
fn identical_input_gives_identical_output() {
    let mut rng = StdRng::seed_from_u64(42);
    let now = dt(2025, 5, 7, 10, 0);
    let prefs = random_preferences(&mut rng);
    let tasks = random_tasks(&mut rng, now);
    let events = random_events(&mut rng, NaiveDate::from_ymd_opt(2025, 5, 5).expect("date"));

    let first = serde_json::to_string(&build_schedule(&tasks, &events, &prefs, now)).expect("json");
    let second = serde_json::to_string(&build_schedule(&tasks, &events, &prefs, now)).expect("json");
    assert_eq!(first, second);
}

#[test]
fn five_hour_task_with_two_hour_threshold() {
    let now = dt(2025, 5, 5, 8, 0);
    let prefs = Preferences {
        lunch_break: None,
        ..Preferences::default()
    };
    let sessions = build_schedule(&[task("long", 2, 5.0, now + Duration::days(7))], &[], &prefs, now);

    let minutes: Vec<i64> = sessions.iter().map(ScheduledSession::duration_minutes).collect();
    assert_eq!(minutes, vec![120, 120, 60]);
}

#[test]
fn one_session_per_day_moves_second_task_to_next_weekday() {
    // Friday: the second task lands on Monday.
    let now = dt(2025, 5, 9, 8, 0);
    let prefs = Preferences {
        max_tasks_per_day: 1,
        ..Preferences::default()
    };
    let deadline = now + Duration::days(7);
    let sessions = build_schedule(
        &[task("a", 2, 1.0, deadline), task("b", 2, 1.0, deadline)],
        &[],
        &prefs,
        now,
    );

    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].task_id, "a");
    assert_eq!(sessions[0].start, dt(2025, 5, 9, 9, 0));
    assert_eq!(sessions[0].end, dt(2025, 5, 9, 10, 0));
    assert_eq!(sessions[1].task_id, "b");
    assert_eq!(sessions[1].start, dt(2025, 5, 12, 9, 0));
    assert_eq!(sessions[1].end, dt(2025, 5, 12, 10, 0));
}

#[test]
fn empty_task_list_gives_empty_schedule() {
    let sessions = build_schedule(&[], &[], &Preferences::default(), dt(2025, 5, 5, 8, 0));
    assert!(sessions.is_empty());
}

#[test]
fn extreme_preferences_still_hold_invariants() {
    for seed in 0..SWEEPS {
        let mut rng = StdRng::seed_from_u64(3_000 + seed);
        let now = dt(2025, 5, 5, 8, 0);
        let tasks = random_tasks(&mut rng, now);
        let events = random_events(&mut rng, NaiveDate::from_ymd_opt(2025, 5, 5).expect("date"));
        let prefs = Preferences {
            max_tasks_per_day: u32::MAX,
            break_between_tasks: [0, MAX_BREAK_MINUTES, i64::MAX][rng.gen_range(0..3)],
            ..random_preferences(&mut rng)
        };

        let sessions = build_schedule(&tasks, &events, &prefs, now);
        assert_schedule_invariants(&tasks, &events, &prefs, &sessions);
    }
}

#[test]
fn enormous_duration_is_capped_and_still_valid() {
    let now = dt(2025, 5, 5, 8, 0);
    let prefs = Preferences::default();
    let huge = task("huge", 2, 1e16, now + Duration::days(7));
    let sessions = build_schedule(&[huge.clone()], &[], &prefs, now);

    let capped = Task {
        duration_hours: MAX_DURATION_HOURS,
        ..huge
    };
    assert_schedule_invariants(&[capped], &[], &prefs, &sessions);
}
