//! Application error types, aggregating every sub-crate's error enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("registry error: {0}")]
    Registry(#[from] liqmon_registry::RegistryError),

    #[error("detector error: {0}")]
    Detector(#[from] liqmon_detector::DetectorError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] liqmon_telemetry::TelemetryError),

    #[error("persistence error: {0}")]
    Persistence(#[from] liqmon_persistence::PersistenceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
