pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{AppError, AppResult, OracleErrorCode, ScheduleRejection};
pub use models::ai_types::{CandidateSchedule, ScheduleProvider};
pub use models::schedule::{PlanOutcome, PlanRequest, ScheduleSource, ScheduledSession};
pub use services::meeting_slots::find_meeting_slots;
pub use services::planning_service::{PlanInput, PlannerConfig, SchedulePlanner};
pub use services::schedule_optimizer::{build_schedule, GreedyPacker};
pub use services::schedule_validator::{validate, ScheduleValidator};
pub use services::task_normalizer::{normalize, normalize_events};
