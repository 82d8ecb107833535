//! `remind-cron` — cron expression engine for the reminder scheduler.
//!
//! Parses textual cron syntax (5 or 6 fields, named aliases, `L`/`W`/`#`
//! extensions) into compact per-field bitmasks and computes the next matching
//! instant from an arbitrary starting timestamp. Pure calendar arithmetic:
//! no I/O, no async.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use remind_cron::CronExpression;
//!
//! let expr = CronExpression::parse("0 30 9 * * mon").unwrap();
//! let from = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
//! let next = expr.next_execution_date(from).unwrap();
//! assert_eq!(next, Utc.with_ymd_and_hms(2019, 1, 7, 9, 30, 0).unwrap());
//! ```

pub mod bitset;
pub mod error;
pub mod expr;
pub mod field;

pub use error::{CronError, Result};
pub use expr::{CronExpression, ExecutionSequence};
