use thiserror::Error;

/// Errors raised while parsing a cron expression or searching for its next
/// occurrence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("cron expression '{expr}' must have 5 or 6 fields, found {count}")]
    FieldCount { expr: String, count: usize },

    #[error("couldn't parse '{field}' component of cron expression: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("value '{value}' of cron field '{field}' doesn't fit in range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: u32,
        max: u32,
    },

    #[error("cron field '{field}' range '{value}': min value must be lower than max value")]
    InvalidRange { field: &'static str, value: String },

    #[error("cron field '{field}' range '{value}': step is beyond the bounds of the min-max range")]
    InvalidStep { field: &'static str, value: String },

    #[error("cron expression '{expr}' has no matching instant within the search horizon")]
    NoMatch { expr: String },
}

pub type Result<T> = std::result::Result<T, CronError>;
