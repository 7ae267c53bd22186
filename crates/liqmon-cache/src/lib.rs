//! In-memory cache of watched positions, classified into urgency tiers and
//! indexed for cheap deadline-ordered scheduling.

pub mod cache;

pub use cache::{ApplyOutcome, PositionCache};
