use std::collections::HashMap;
use std::time::{Duration as StdDuration, Instant};

use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, OracleErrorCode};
use crate::models::ai_types::{CandidateSchedule, ProviderMetadata, ScheduleProvider};
use crate::models::schedule::PlanRequest;
use crate::services::prompt_templates::{
    build_backend_payload, build_schedule_payload, schedule_system_prompt,
};
use crate::utils::redact::redact_sensitive_data;

pub const ENV_API_KEY: &str = "AUTOPLAN_ORACLE_API_KEY";
pub const ENV_BASE_URL: &str = "AUTOPLAN_ORACLE_BASE_URL";
pub const ENV_MODEL: &str = "AUTOPLAN_ORACLE_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "AUTOPLAN_ORACLE_TIMEOUT_SECS";
pub const ENV_BACKEND_URL: &str = "AUTOPLAN_BACKEND_URL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const ORACLE_TEMPERATURE: f32 = 0.2;
const ORACLE_MAX_TOKENS: u32 = 2500;

/// Where the HTTP schedule providers live and how long they may take.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub http_timeout: StdDuration,
    pub backend_url: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_timeout: StdDuration::from_secs(DEFAULT_TIMEOUT_SECS),
            backend_url: None,
        }
    }
}

impl OracleConfig {
    pub fn from_env() -> Self {
        let non_empty = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let http_timeout = match non_empty(ENV_TIMEOUT_SECS) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => StdDuration::from_secs(secs),
                _ => {
                    warn!(target: "app::oracle", value = %raw, "invalid oracle timeout, using default");
                    StdDuration::from_secs(DEFAULT_TIMEOUT_SECS)
                }
            },
            None => StdDuration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Self {
            api_key: non_empty(ENV_API_KEY),
            base_url: non_empty(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: non_empty(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            http_timeout,
            backend_url: non_empty(ENV_BACKEND_URL),
        }
    }

    /// Oracle first, then the backend; whichever is not configured is left out.
    pub fn build_providers(&self) -> AppResult<Vec<Box<dyn ScheduleProvider>>> {
        let mut providers: Vec<Box<dyn ScheduleProvider>> = Vec::new();

        if self.api_key.is_some() {
            providers.push(Box::new(OracleScheduleProvider::try_new(self)?));
        } else {
            debug!(target: "app::oracle", "no oracle api key configured");
        }

        if let Some(url) = self.backend_url.as_deref() {
            providers.push(Box::new(BackendScheduleProvider::try_new(url, self.http_timeout)?));
        }

        info!(
            target: "app::oracle",
            providers = providers.len(),
            "schedule providers configured"
        );
        Ok(providers)
    }
}

fn build_client(timeout: StdDuration) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Some(StdDuration::from_secs(90)))
        .build()
        .map_err(|err| AppError::other(format!("failed to build HTTP client: {err}")))
}

/// OpenAI-compatible chat-completion oracle.
pub struct OracleScheduleProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

struct ChatInvocationResult {
    content: JsonValue,
    tokens_used: HashMap<String, u64>,
    latency_ms: u128,
    correlation_id: String,
}

impl OracleScheduleProvider {
    pub fn try_new(config: &OracleConfig) -> AppResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::oracle(OracleErrorCode::MissingApiKey, "oracle api key is not configured"))?;

        let base_url = config.base_url.trim_end_matches('/');
        Ok(Self {
            client: build_client(config.http_timeout)?,
            api_key,
            endpoint: format!("{base_url}/v1/chat/completions"),
            model: config.model.clone(),
        })
    }

    async fn invoke_chat(&self, system_prompt: String, payload: JsonValue) -> AppResult<ChatInvocationResult> {
        let correlation_id = Uuid::new_v4().to_string();
        let sanitized = serde_json::to_string(&redact_sensitive_data(&payload))
            .unwrap_or_else(|_| "\"<redacted>\"".to_string());

        debug!(
            target: "app::oracle",
            correlation_id = %correlation_id,
            model = %self.model,
            payload = %sanitized,
            "invoking schedule oracle"
        );

        let request_body = self.build_request_body(system_prompt, &payload);
        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|err| error_from_reqwest(err, &correlation_id))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "app::oracle",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                "oracle returned non-success status"
            );
            return Err(map_http_error(status, &correlation_id));
        }
        let latency_ms = start.elapsed().as_millis();

        let body: JsonValue = response.json().await.map_err(|err| {
            AppError::oracle_with_details(
                OracleErrorCode::InvalidResponse,
                "oracle response is not JSON",
                Some(correlation_id.as_str()),
                Some(json!({ "reason": err.to_string() })),
            )
        })?;

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                AppError::oracle_with_details(
                    OracleErrorCode::InvalidResponse,
                    "oracle response is missing message.content",
                    Some(correlation_id.as_str()),
                    Some(json!({ "reason": "missing_message_content" })),
                )
            })?;

        let content = parse_content(content, &correlation_id)?;
        debug!(
            target: "app::oracle",
            correlation_id = %correlation_id,
            latency_ms,
            "oracle responded"
        );

        Ok(ChatInvocationResult {
            content,
            tokens_used: extract_tokens(&body),
            latency_ms,
            correlation_id,
        })
    }

    fn build_request_body(&self, system_prompt: String, payload: &JsonValue) -> JsonValue {
        let user_content = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        json!({
            "model": self.model,
            "temperature": ORACLE_TEMPERATURE,
            "max_tokens": ORACLE_MAX_TOKENS,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content }
            ]
        })
    }
}

#[async_trait::async_trait]
impl ScheduleProvider for OracleScheduleProvider {
    fn name(&self) -> &str {
        "oracle"
    }

    async fn propose(&self, request: &PlanRequest) -> AppResult<CandidateSchedule> {
        let result = self
            .invoke_chat(
                schedule_system_prompt(&request.preferences),
                build_schedule_payload(request),
            )
            .await?;

        Ok(CandidateSchedule {
            items: result.content,
            telemetry: Some(ProviderMetadata {
                provider_id: Some(self.name().to_string()),
                model: Some(self.model.clone()),
                latency_ms: Some(result.latency_ms),
                tokens_used: (!result.tokens_used.is_empty()).then_some(result.tokens_used),
                correlation_id: Some(result.correlation_id),
            }),
        })
    }
}

/// Scheduling backend exposing `POST /api/schedule-tasks`.
pub struct BackendScheduleProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl BackendScheduleProvider {
    pub fn try_new(base_url: &str, timeout: StdDuration) -> AppResult<Self> {
        let base_url = base_url.trim_end_matches('/');
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{base_url}/api/schedule-tasks"),
        })
    }
}

#[async_trait::async_trait]
impl ScheduleProvider for BackendScheduleProvider {
    fn name(&self) -> &str {
        "backend"
    }

    async fn propose(&self, request: &PlanRequest) -> AppResult<CandidateSchedule> {
        let correlation_id = Uuid::new_v4().to_string();
        debug!(
            target: "app::oracle::backend",
            correlation_id = %correlation_id,
            tasks = request.tasks.len(),
            "requesting schedule from backend"
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&build_backend_payload(request))
            .send()
            .await
            .map_err(|err| error_from_reqwest(err, &correlation_id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_http_error(status, &correlation_id));
        }

        let body: JsonValue = response.json().await.map_err(|err| {
            AppError::oracle_with_details(
                OracleErrorCode::InvalidResponse,
                "backend response is not JSON",
                Some(correlation_id.as_str()),
                Some(json!({ "reason": err.to_string() })),
            )
        })?;

        let items = body.get("schedule").cloned().ok_or_else(|| {
            AppError::oracle_with_details(
                OracleErrorCode::InvalidResponse,
                "backend response is missing `schedule`",
                Some(correlation_id.as_str()),
                Some(json!({ "reason": "missing_schedule" })),
            )
        })?;

        Ok(CandidateSchedule {
            items,
            telemetry: Some(ProviderMetadata {
                provider_id: Some(self.name().to_string()),
                latency_ms: Some(start.elapsed().as_millis()),
                correlation_id: Some(correlation_id),
                ..ProviderMetadata::default()
            }),
        })
    }
}

/// Oracles like to wrap JSON in a markdown fence; strip it before parsing.
fn parse_content(content: &str, correlation_id: &str) -> AppResult<JsonValue> {
    let trimmed = content.trim();
    let cleaned = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(cleaned).map_err(|err| {
        AppError::oracle_with_details(
            OracleErrorCode::InvalidResponse,
            format!("oracle content is not JSON: {err}"),
            Some(correlation_id),
            Some(json!({ "reason": "invalid_json" })),
        )
    })
}

fn extract_tokens(body: &JsonValue) -> HashMap<String, u64> {
    let mut tokens = HashMap::new();
    if let Some(usage) = body.get("usage") {
        for (field, key) in [
            ("prompt_tokens", "prompt"),
            ("completion_tokens", "completion"),
            ("total_tokens", "total"),
        ] {
            if let Some(value) = usage.get(field).and_then(JsonValue::as_u64) {
                tokens.insert(key.to_string(), value);
            }
        }
    }
    tokens
}

fn map_http_error(status: StatusCode, correlation_id: &str) -> AppError {
    let (code, message) = match status {
        StatusCode::UNAUTHORIZED => (
            OracleErrorCode::MissingApiKey,
            "api key rejected by provider".to_string(),
        ),
        StatusCode::FORBIDDEN => (
            OracleErrorCode::Forbidden,
            "provider refused access".to_string(),
        ),
        StatusCode::TOO_MANY_REQUESTS => (
            OracleErrorCode::RateLimited,
            "provider rate limit reached".to_string(),
        ),
        status if status.is_server_error() => (
            OracleErrorCode::OracleUnavailable,
            format!("provider unavailable (status {})", status.as_u16()),
        ),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => (
            OracleErrorCode::InvalidRequest,
            format!("provider rejected the request (status {})", status.as_u16()),
        ),
        status => (
            OracleErrorCode::Unknown,
            format!("provider returned status {}", status.as_u16()),
        ),
    };

    AppError::oracle_with_details(
        code,
        message,
        Some(correlation_id),
        Some(json!({ "status": status.as_u16() })),
    )
}

fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> AppError {
    if err.is_timeout() {
        AppError::oracle_with_details(
            OracleErrorCode::HttpTimeout,
            "provider request timed out",
            Some(correlation_id),
            None,
        )
    } else if err.is_connect() {
        AppError::oracle_with_details(
            OracleErrorCode::OracleUnavailable,
            "could not connect to provider",
            Some(correlation_id),
            None,
        )
    } else if let Some(status) = err.status() {
        map_http_error(status, correlation_id)
    } else {
        AppError::oracle_with_details(
            OracleErrorCode::Unknown,
            format!("provider request failed: {err}"),
            Some(correlation_id),
            None,
        )
    }
}

pub mod testing {
    use super::*;

    /// Status mapping, exposed for integration tests.
    pub fn map_http_error(status: StatusCode) -> AppError {
        super::map_http_error(status, "test-correlation-id")
    }

    pub fn parse_content(content: &str) -> AppResult<JsonValue> {
        super::parse_content(content, "test-correlation-id")
    }

    pub fn oracle_for(base_url: &str, timeout: StdDuration) -> AppResult<OracleScheduleProvider> {
        OracleScheduleProvider::try_new(&OracleConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            model: DEFAULT_MODEL.to_string(),
            http_timeout: timeout,
            backend_url: None,
        })
    }
}
