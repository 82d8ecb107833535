use thiserror::Error;

/// Errors surfaced by the reminder scheduler.
#[derive(Debug, Error)]
pub enum ReminderError {
    /// Malformed cron expression. Raised before any event is persisted — a
    /// bad expression never enters the durable log.
    #[error("Cron error: {0}")]
    Cron(#[from] remind_cron::CronError),

    /// The durable log or snapshot store reported a failure. State is left
    /// unchanged; the core does not retry.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Corrupt or unreadable snapshot/log entry during startup. Fatal for
    /// the instance — starting from empty state would resurrect completed
    /// tasks or drop pending ones.
    #[error("Recovery failed: {0}")]
    Recovery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The engine's command mailbox is gone (instance stopped).
    #[error("Reminder instance is not running")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, ReminderError>;
