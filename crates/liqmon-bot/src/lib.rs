//! Perpetual-futures liquidation monitor.
//!
//! Wires the fetcher, registry, cache, detector, scheduler, persistence, and
//! telemetry crates into one long-running process: a discovery loop grows
//! the wallet registry, a refresh loop watches tracked positions for state
//! changes, and a daily summary loop reports what's being watched.

pub mod app;
pub mod config;
pub mod error;
pub mod sinks;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
