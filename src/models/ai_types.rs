use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AppResult;
use crate::models::schedule::PlanRequest;

/// Metadata describing the provider that produced a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<HashMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Untrusted schedule proposal. `items` is whatever the provider returned and must go through
/// the validator before any of it is used.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateSchedule {
    pub items: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<ProviderMetadata>,
}

impl CandidateSchedule {
    pub fn new(items: JsonValue) -> Self {
        Self {
            items,
            telemetry: None,
        }
    }
}

/// Anything that can propose a complete schedule for a normalized request.
#[async_trait::async_trait]
pub trait ScheduleProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn propose(&self, request: &PlanRequest) -> AppResult<CandidateSchedule>;
}
