//! Scheduler error types. Failures inside a single refresh or discovery
//! scan never propagate past these loops: each is logged and
//! the unit of work is skipped for that cycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
