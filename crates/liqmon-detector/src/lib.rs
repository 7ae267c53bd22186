//! State-change detection and alert emission.
//!
//! [`detector::StateChangeDetector`] classifies a refresh as one of the six
//! transition kinds; [`alert::Alerter`] deduplicates and emits it.

pub mod alert;
pub mod config;
pub mod detector;
pub mod error;

pub use alert::{AlertDedupStore, Alerter, MessageSink};
pub use config::DetectorConfig;
pub use detector::StateChangeDetector;
pub use error::{DetectorError, Result};
