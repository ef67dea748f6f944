pub mod ai_types;
pub mod event;
pub mod meeting;
pub mod preferences;
pub mod schedule;
pub mod task;
