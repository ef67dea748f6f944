pub mod ai_service;
pub mod meeting_slots;
pub mod planning_service;
pub mod prompt_templates;
pub mod schedule_optimizer;
pub mod schedule_utils;
pub mod schedule_validator;
pub mod session_splitter;
pub mod task_normalizer;
