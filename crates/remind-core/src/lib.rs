//! `remind-core` — shared data model, settings and errors for the reminder
//! scheduler.
//!
//! The reminder is an event-sourced scheduler for long-horizon tasks:
//! entries describe what to deliver, to whom, and when; state is an
//! immutable map of pending entries; `Scheduled`/`Completed` events are the
//! durable source of truth the engine replays after a crash.

pub mod config;
pub mod error;
pub mod types;

pub use config::ReminderSettings;
pub use error::{ReminderError, Result};
pub use types::{Delivery, Entry, Event, Schedule, ScheduleKind, State};
