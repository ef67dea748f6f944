use std::time::Duration as StdDuration;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::ai_types::{CandidateSchedule, ScheduleProvider};
use crate::models::event::RawCalendarEvent;
use crate::models::preferences::RawPreferences;
use crate::models::schedule::{PlanOutcome, PlanRequest, ProviderAttempt, ScheduleSource};
use crate::models::task::RawTask;
use crate::services::ai_service::OracleConfig;
use crate::services::schedule_optimizer::build_schedule;
use crate::services::schedule_validator::ScheduleValidator;
use crate::services::task_normalizer::{normalize, normalize_events};

const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Raw planner input, as a caller would post it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanInput {
    pub tasks: Vec<RawTask>,
    pub events: Vec<RawCalendarEvent>,
    pub preferences: RawPreferences,
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Upper bound for a single provider call.
    pub provider_timeout: StdDuration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            provider_timeout: StdDuration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

/// Asks each provider in turn for a schedule and keeps the first one that validates. The
/// deterministic packer is the last link and always answers.
pub struct SchedulePlanner {
    providers: Vec<Box<dyn ScheduleProvider>>,
    config: PlannerConfig,
}

impl SchedulePlanner {
    pub fn new(providers: Vec<Box<dyn ScheduleProvider>>, config: PlannerConfig) -> Self {
        Self { providers, config }
    }

    /// Planner without providers: every run goes straight to the packer.
    pub fn deterministic() -> Self {
        Self::new(Vec::new(), PlannerConfig::default())
    }

    pub fn from_env() -> AppResult<Self> {
        let oracle = OracleConfig::from_env();
        let providers = oracle.build_providers()?;
        Ok(Self::new(
            providers,
            PlannerConfig {
                provider_timeout: oracle.http_timeout,
            },
        ))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    /// Untyped entry point; the task list must be a JSON array.
    pub async fn plan_json(&self, input: &JsonValue, now: DateTime<FixedOffset>) -> AppResult<PlanOutcome> {
        let input = parse_plan_input(input)?;
        self.plan(&input, now).await
    }

    pub async fn plan(&self, input: &PlanInput, now: DateTime<FixedOffset>) -> AppResult<PlanOutcome> {
        if input.tasks.is_empty() {
            return Err(AppError::validation("at least one task is required"));
        }

        let (tasks, preferences) = normalize(&input.tasks, &input.preferences, now);
        let events = normalize_events(&input.events, &preferences, now);
        let request = PlanRequest {
            tasks,
            events,
            preferences,
            now,
        };

        let validator = ScheduleValidator::new(
            &request.tasks,
            &request.events,
            request.preferences.timezone,
        );

        let mut rejected_attempts = Vec::new();
        for provider in &self.providers {
            let name = provider.name().to_string();
            debug!(target: "app::planning", provider = %name, "requesting candidate schedule");

            let error = match self.propose_with_timeout(provider.as_ref(), &request).await {
                Ok(candidate) => match validator.check(&candidate.items) {
                    Ok(sessions) => {
                        info!(
                            target: "app::planning",
                            provider = %name,
                            sessions = sessions.len(),
                            "provider schedule accepted"
                        );
                        return Ok(PlanOutcome {
                            sessions,
                            source: ScheduleSource::Provider { name },
                            rejected_attempts,
                        });
                    }
                    Err(reason) => AppError::rejected(reason),
                },
                Err(error) => error,
            };

            warn!(
                target: "app::planning",
                provider = %name,
                error = %error,
                "provider schedule unusable, trying next"
            );
            rejected_attempts.push(ProviderAttempt {
                provider: name,
                error: error.to_string(),
            });
        }

        let sessions = build_schedule(
            &request.tasks,
            &request.events,
            &request.preferences,
            request.now,
        );
        info!(
            target: "app::planning",
            sessions = sessions.len(),
            attempts = rejected_attempts.len(),
            "using deterministic schedule"
        );
        Ok(PlanOutcome {
            sessions,
            source: ScheduleSource::Fallback,
            rejected_attempts,
        })
    }

    async fn propose_with_timeout(
        &self,
        provider: &dyn ScheduleProvider,
        request: &PlanRequest,
    ) -> AppResult<CandidateSchedule> {
        let timeout = self.config.provider_timeout;
        match tokio::time::timeout(timeout, provider.propose(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::provider_timeout(provider.name(), timeout.as_millis())),
        }
    }
}

/// Tasks must arrive as an array; malformed elements are kept as empty tasks so that the
/// normalizer can default them.
fn parse_plan_input(input: &JsonValue) -> AppResult<PlanInput> {
    let tasks = match input.get("tasks") {
        Some(JsonValue::Array(items)) => items.iter().map(lenient::<RawTask>).collect(),
        Some(other) => {
            return Err(AppError::validation_with_details(
                "tasks must be an array",
                json!({ "received": json_kind(other) }),
            ))
        }
        None => return Err(AppError::validation("tasks are required")),
    };

    let events = match input.get("events") {
        Some(JsonValue::Array(items)) => items.iter().map(lenient::<RawCalendarEvent>).collect(),
        Some(JsonValue::Null) | None => Vec::new(),
        Some(other) => {
            warn!(target: "app::planning", received = json_kind(other), "events are not an array, ignoring them");
            Vec::new()
        }
    };

    let preferences = input
        .get("preferences")
        .map(lenient::<RawPreferences>)
        .unwrap_or_default();

    Ok(PlanInput {
        tasks,
        events,
        preferences,
    })
}

fn lenient<T>(value: &JsonValue) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    serde_json::from_value(value.clone()).unwrap_or_else(|err| {
        warn!(target: "app::normalize", error = %err, "malformed record, using defaults");
        T::default()
    })
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
