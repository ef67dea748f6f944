use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleErrorCode {
    MissingApiKey,
    Forbidden,
    HttpTimeout,
    RateLimited,
    InvalidResponse,
    InvalidRequest,
    OracleUnavailable,
    Unknown,
}

impl OracleErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            OracleErrorCode::MissingApiKey => "MISSING_API_KEY",
            OracleErrorCode::Forbidden => "FORBIDDEN",
            OracleErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            OracleErrorCode::RateLimited => "RATE_LIMITED",
            OracleErrorCode::InvalidResponse => "INVALID_RESPONSE",
            OracleErrorCode::InvalidRequest => "INVALID_REQUEST",
            OracleErrorCode::OracleUnavailable => "ORACLE_UNAVAILABLE",
            OracleErrorCode::Unknown => "UNKNOWN_ORACLE_ERROR",
        }
    }
}

impl fmt::Display for OracleErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a candidate schedule was refused. A single violation rejects the whole candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleRejection {
    #[error("candidate schedule is not an array")]
    NotAnArray,

    #[error("candidate schedule is empty")]
    Empty,

    #[error("record {index} is missing field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("record {index} has an unparseable `{field}`: {value}")]
    InvalidInstant {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("record {index} does not end after it starts")]
    NonPositiveInterval { index: usize },

    #[error("records {first} and {second} overlap")]
    Overlap { first: usize, second: usize },

    #[error("record {index} references unknown task `{task_id}`")]
    UnknownTask { index: usize, task_id: String },

    #[error("record {index} overlaps calendar event `{event_title}`")]
    EventConflict { index: usize, event_title: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("{message}")]
    Oracle {
        code: OracleErrorCode,
        message: String,
        correlation_id: Option<String>,
        details: Option<JsonValue>,
    },

    #[error("candidate schedule rejected: {0}")]
    Rejected(#[from] ScheduleRejection),

    #[error("provider `{provider}` timed out after {timeout_ms} ms")]
    ProviderTimeout { provider: String, timeout_ms: u128 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn oracle(code: OracleErrorCode, message: impl Into<String>) -> Self {
        Self::oracle_with_details(code, message, None, None)
    }

    pub fn oracle_with_details(
        code: OracleErrorCode,
        message: impl Into<String>,
        correlation_id: Option<&str>,
        details: Option<JsonValue>,
    ) -> Self {
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match (&correlation, &details) {
            (Some(id), Some(payload)) => {
                warn!(
                    target: "app::oracle::error",
                    code = %code,
                    correlation_id = %id,
                    details = %payload,
                    %message
                );
            }
            (Some(id), None) => {
                warn!(
                    target: "app::oracle::error",
                    code = %code,
                    correlation_id = %id,
                    %message
                );
            }
            (None, Some(payload)) => {
                warn!(target: "app::oracle::error", code = %code, details = %payload, %message);
            }
            (None, None) => {
                warn!(target: "app::oracle::error", code = %code, %message);
            }
        }

        AppError::Oracle {
            code,
            message,
            correlation_id: correlation,
            details,
        }
    }

    pub fn oracle_code(&self) -> Option<OracleErrorCode> {
        match self {
            AppError::Oracle { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn oracle_correlation_id(&self) -> Option<&str> {
        match self {
            AppError::Oracle { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    pub fn oracle_details(&self) -> Option<&JsonValue> {
        match self {
            AppError::Oracle { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    pub fn rejected(reason: ScheduleRejection) -> Self {
        warn!(target: "app::validation", %reason, "candidate schedule rejected");
        AppError::Rejected(reason)
    }

    pub fn provider_timeout(provider: impl Into<String>, timeout_ms: u128) -> Self {
        let provider = provider.into();
        warn!(target: "app::planning", %provider, timeout_ms, "schedule provider timed out");
        AppError::ProviderTimeout {
            provider,
            timeout_ms,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}
