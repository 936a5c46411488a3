//! Broadcast job monitoring.
//!
//! One shared poll cycle tracks every job; there is never a timer per job
//! and the loop's lifetime is keyed to "any tracked job is non-terminal",
//! not to whether any view is observing it.

mod tracker;

pub use tracker::{JobMonitor, JobUpdate};
