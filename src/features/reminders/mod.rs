//! # Reminders Feature
//!
//! Automatic turn and setup reminders for watched game sessions.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: true

pub mod interval;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use interval::{
    Interval, IntervalUnit, DEFAULT_PING_INTERVAL, MAX_PING_INTERVAL, MIN_PING_INTERVAL,
};
pub use registry::{TaskHandle, TaskRegistry};
pub use scheduler::ReminderScheduler;
pub use store::{JsonFileStore, MemoryStore, PingConfig, PingStore, RecordStore};
