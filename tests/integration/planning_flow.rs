use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use autoplan_lib::error::{AppError, AppResult, OracleErrorCode};
use autoplan_lib::models::ai_types::{CandidateSchedule, ScheduleProvider};
use autoplan_lib::models::schedule::{PlanRequest, ScheduleSource};
use autoplan_lib::services::ai_service::{BackendScheduleProvider, OracleConfig};
use autoplan_lib::services::planning_service::{PlannerConfig, SchedulePlanner};
use chrono::{DateTime, FixedOffset, TimeZone};
use httpmock::prelude::*;
use serde_json::{json, Value as JsonValue};

fn now() -> DateTime<FixedOffset> {
    // Monday 2025-05-05, before opening.
    FixedOffset::east_opt(0)
        .expect("offset")
        .with_ymd_and_hms(2025, 5, 5, 7, 0, 0)
        .single()
        .expect("now")
}

fn input() -> JsonValue {
    json!({
        "tasks": [
            {"id": "report", "title": "Quarterly report", "priority": 3, "duration": 2},
            {"id": "email", "title": "Inbox zero", "priority": 1, "duration": 0.5}
        ],
        "events": [
            {"title": "Standup", "start": "2025-05-05T09:00:00Z", "end": "2025-05-05T09:30:00Z"}
        ],
        "preferences": {"workingHours": {"start": "09:00", "end": "17:00"}}
    })
}

/// Replays a fixed answer and counts how often it was asked.
struct Scripted {
    name: &'static str,
    answer: Result<JsonValue, OracleErrorCode>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn boxed(
        name: &'static str,
        answer: Result<JsonValue, OracleErrorCode>,
    ) -> (Box<dyn ScheduleProvider>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Scripted {
            name,
            answer,
            calls: Arc::clone(&calls),
        };
        (Box::new(provider), calls)
    }
}

#[async_trait]
impl ScheduleProvider for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn propose(&self, _request: &PlanRequest) -> AppResult<CandidateSchedule> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Ok(items) => Ok(CandidateSchedule::new(items.clone())),
            Err(code) => Err(AppError::oracle(*code, "scripted failure")),
        }
    }
}

#[tokio::test]
async fn valid_provider_schedule_is_used_as_is() {
    let (provider, calls) = Scripted::boxed(
        "oracle",
        Ok(json!([
            {"id": "email", "title": "Inbox zero", "start": "2025-05-05T10:00:00Z", "end": "2025-05-05T10:30:00Z"},
            {"id": "report", "title": "Quarterly report", "start": "2025-05-05T09:30:00Z", "end": "2025-05-05T09:45:00Z"}
        ])),
    );
    let planner = SchedulePlanner::new(vec![provider], PlannerConfig::default());

    let outcome = planner.plan_json(&input(), now()).await.expect("plan");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        outcome.source,
        ScheduleSource::Provider {
            name: "oracle".into()
        }
    );
    assert!(outcome.rejected_attempts.is_empty());
    let ids: Vec<&str> = outcome.sessions.iter().map(|s| s.task_id.as_str()).collect();
    assert_eq!(ids, vec!["report", "email"]);
    assert_eq!(outcome.sessions[0].category.id, "work");
}

#[tokio::test]
async fn overlapping_candidate_falls_back_to_packer() {
    let (provider, _) = Scripted::boxed(
        "oracle",
        Ok(json!([
            {"id": "report", "title": "Quarterly report", "start": "2025-05-05T10:00:00Z", "end": "2025-05-05T12:00:00Z"},
            {"id": "email", "title": "Inbox zero", "start": "2025-05-05T11:00:00Z", "end": "2025-05-05T11:30:00Z"}
        ])),
    );
    let planner = SchedulePlanner::new(vec![provider], PlannerConfig::default());

    let outcome = planner.plan_json(&input(), now()).await.expect("plan");

    assert!(outcome.is_fallback());
    assert_eq!(outcome.rejected_attempts.len(), 1);
    assert!(outcome.rejected_attempts[0].error.contains("overlap"));

    // The packer starts after the standup, puts the high priority task first and skips lunch.
    let first = &outcome.sessions[0];
    assert_eq!(first.task_id, "report");
    assert_eq!(first.start.to_rfc3339(), "2025-05-05T09:30:00+00:00");
    assert_eq!(first.end.to_rfc3339(), "2025-05-05T11:30:00+00:00");
    let second = &outcome.sessions[1];
    assert_eq!(second.task_id, "email");
    assert_eq!(second.start.to_rfc3339(), "2025-05-05T13:00:00+00:00");
}

#[tokio::test]
async fn candidate_on_top_of_event_is_rejected() {
    let (provider, _) = Scripted::boxed(
        "oracle",
        Ok(json!([
            {"id": "report", "title": "Quarterly report", "start": "2025-05-05T09:00:00Z", "end": "2025-05-05T11:00:00Z"}
        ])),
    );
    let planner = SchedulePlanner::new(vec![provider], PlannerConfig::default());

    let outcome = planner.plan_json(&input(), now()).await.expect("plan");

    assert!(outcome.is_fallback());
    assert!(outcome.rejected_attempts[0].error.contains("Standup"));
}

#[tokio::test]
async fn provider_errors_move_down_the_chain() {
    let (failing, failing_calls) = Scripted::boxed("oracle", Err(OracleErrorCode::OracleUnavailable));
    let (backup, backup_calls) = Scripted::boxed(
        "backend",
        Ok(json!({"schedule": [
            {"taskId": "report", "title": "Quarterly report", "start": "2025-05-05T13:00:00Z", "end": "2025-05-05T15:00:00Z"}
        ]})),
    );
    let planner = SchedulePlanner::new(vec![failing, backup], PlannerConfig::default());

    let outcome = planner.plan_json(&input(), now()).await.expect("plan");

    assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backup_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        outcome.source,
        ScheduleSource::Provider {
            name: "backend".into()
        }
    );
    assert_eq!(outcome.rejected_attempts[0].provider, "oracle");
    assert_eq!(outcome.sessions.len(), 1);
}

#[tokio::test]
async fn unknown_task_in_candidate_is_rejected() {
    let (provider, _) = Scripted::boxed(
        "oracle",
        Ok(json!([
            {"id": "ghost", "title": "Ghost", "start": "2025-05-05T10:00:00Z", "end": "2025-05-05T11:00:00Z"}
        ])),
    );
    let planner = SchedulePlanner::new(vec![provider], PlannerConfig::default());

    let outcome = planner.plan_json(&input(), now()).await.expect("plan");
    assert!(outcome.is_fallback());
    assert!(outcome.rejected_attempts[0].error.contains("ghost"));
}

#[tokio::test]
async fn empty_task_list_fails_before_any_provider() {
    let (provider, calls) = Scripted::boxed("oracle", Ok(json!([])));
    let planner = SchedulePlanner::new(vec![provider], PlannerConfig::default());

    let error = planner
        .plan_json(&json!({"tasks": []}), now())
        .await
        .expect_err("no tasks");

    assert!(matches!(error, AppError::Validation { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deterministic_planner_is_repeatable() {
    let planner = SchedulePlanner::deterministic();
    let first = planner.plan_json(&input(), now()).await.expect("first");
    let second = planner.plan_json(&input(), now()).await.expect("second");

    assert!(first.is_fallback());
    assert_eq!(
        serde_json::to_string(&first).expect("json"),
        serde_json::to_string(&second).expect("json")
    );
}

#[tokio::test]
async fn backend_provider_over_http() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/schedule-tasks");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"schedule": [
                    {"id": "email", "title": "Inbox zero", "start": "2025-05-05T16:00:00Z", "end": "2025-05-05T16:30:00Z"},
                    {"id": "report", "title": "Quarterly report", "start": "2025-05-05T14:00:00Z", "end": "2025-05-05T16:00:00Z"}
                ]}));
        })
        .await;

    let backend = BackendScheduleProvider::try_new(&server.base_url(), StdDuration::from_secs(2))
        .expect("backend");
    let planner = SchedulePlanner::new(
        vec![Box::new(backend) as Box<dyn ScheduleProvider>],
        PlannerConfig::default(),
    );

    let outcome = planner.plan_json(&input(), now()).await.expect("plan");

    mock.assert_async().await;
    assert_eq!(
        outcome.source,
        ScheduleSource::Provider {
            name: "backend".into()
        }
    );
    assert_eq!(outcome.sessions[0].task_id, "report");
    assert_eq!(outcome.sessions[1].task_id, "email");
}

#[tokio::test]
async fn unreachable_backend_falls_back() {
    let config = OracleConfig {
        backend_url: Some("http://127.0.0.1:9".to_string()),
        http_timeout: StdDuration::from_millis(500),
        ..OracleConfig::default()
    };
    let providers = config.build_providers().expect("providers");
    assert_eq!(providers.len(), 1);

    let planner = SchedulePlanner::new(providers, PlannerConfig::default());
    assert_eq!(planner.provider_names(), vec!["backend"]);

    let outcome = planner.plan_json(&input(), now()).await.expect("plan");
    assert!(outcome.is_fallback());
    assert_eq!(outcome.rejected_attempts.len(), 1);
    assert_eq!(outcome.sessions.len(), 2);
}

#[tokio::test]
async fn extreme_numbers_still_plan() {
    let planner = SchedulePlanner::deterministic();
    let request = json!({
        "tasks": [
            {"id": "a", "title": "A", "priority": 3, "duration": 1},
            {"id": "b", "title": "B", "priority": 1, "duration": 1e16}
        ],
        "preferences": {"breakBetweenTasks": 1e18}
    });

    let outcome = planner.plan_json(&request, now()).await.expect("plan");

    assert!(outcome.is_fallback());
    assert_eq!(outcome.sessions[0].task_id, "a");
    assert_eq!(outcome.sessions[0].start.to_rfc3339(), "2025-05-05T09:00:00+00:00");
    // The break runs past the day, so the next session opens Tuesday.
    assert_eq!(outcome.sessions[1].start.to_rfc3339(), "2025-05-06T09:00:00+00:00");
    let capped: i64 = outcome
        .sessions
        .iter()
        .filter(|s| s.task_id == "b")
        .map(|s| (s.end - s.start).num_seconds())
        .sum();
    assert_eq!(capped, 1000 * 3600);
}

#[tokio::test]
async fn malformed_working_hours_keep_the_other_preferences() {
    let planner = SchedulePlanner::deterministic();
    let request = json!({
        "tasks": [
            {"id": "a", "title": "A", "priority": 3, "duration": 1},
            {"id": "b", "title": "B", "priority": 1, "duration": 1}
        ],
        "preferences": {"workingHours": "9-5", "maxTasksPerDay": 1, "breakBetweenTasks": 0}
    });

    let outcome = planner.plan_json(&request, now()).await.expect("plan");

    assert_eq!(outcome.sessions[0].task_id, "a");
    assert_eq!(outcome.sessions[0].start.to_rfc3339(), "2025-05-05T09:00:00+00:00");
    assert_eq!(outcome.sessions[0].end.to_rfc3339(), "2025-05-05T10:00:00+00:00");
    assert_eq!(outcome.sessions[1].task_id, "b");
    assert_eq!(outcome.sessions[1].start.to_rfc3339(), "2025-05-06T09:00:00+00:00");
}
