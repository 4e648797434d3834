use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagehandError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to bind API server to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("System error: {message}")]
    System { message: String },
}

impl StagehandError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Failures observed while talking to the coordinator control plane
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("{message}")]
    Unreachable { message: String },

    #[error("Invalid response from control plane: {details}")]
    InvalidResponse { details: String },

    #[error("{message}")]
    WakeRejected { message: String },

    #[error("Coordinator did not become ready within {}", describe_duration(.waited))]
    Timeout { waited: Duration },

    #[error("A wake request is already in progress")]
    AlreadyWaking,
}

impl CoordinatorError {
    pub fn unreachable<S: Into<String>>(message: S) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    pub fn invalid_response<S: Into<String>>(details: S) -> Self {
        Self::InvalidResponse {
            details: details.into(),
        }
    }

    /// Whether the caller may try again later
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CoordinatorError::AlreadyWaking)
    }
}

/// Render a duration the way operators read it: whole minutes when exact
pub(crate) fn describe_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        60 => "1 minute".to_string(),
        s if s > 0 && s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{} seconds", s),
    }
}

pub type Result<T> = std::result::Result<T, StagehandError>;
