use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Invalid argument {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown schedule type: {0}")]
    UnknownSchedule(String),

    #[error("Invalid now: {0}")]
    InvalidNow(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {jid} not running (state is {state})")]
    JobNotRunning { jid: String, state: String },

    #[error("Job {jid} is held by worker {actual}, not {claimed}")]
    WorkerMismatch {
        jid: String,
        actual: String,
        claimed: String,
    },

    #[error("Job {jid} is in queue {actual}, not {claimed}")]
    QueueMismatch {
        jid: String,
        actual: String,
        claimed: String,
    },

    #[error("Job {jid}: {reason}")]
    InvalidTransition { jid: String, reason: String },

    #[error("Recurring job interval must be positive, got {0}")]
    RecurInvalidInterval(f64),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl QuarryError {
    /// Shorthand for the most common validation failure.
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        QuarryError::InvalidArguments {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QuarryError>;
