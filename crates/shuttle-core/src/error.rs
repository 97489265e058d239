use thiserror::Error;

/// A poll or respond call to the orchestration service failed.
///
/// Always fatal for the loop that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("orchestration service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected by orchestration service: {0}")]
    Rejected(String),

    #[error("unknown or already redeemed task token: {0}")]
    UnknownToken(String),

    #[error("orchestration service connection closed")]
    Closed,
}

/// An activity handler could not finish its work.
///
/// `Display` is reported verbatim as the activity failure reason.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("handler not found for activity={0}")]
    HandlerNotFound(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// The caller-supplied decision continuation failed.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ContinuationError {
    message: String,
}

impl ContinuationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The notifier could not deliver an alert. Logged, never escalated.
#[derive(Debug, Error)]
#[error("notification to {to} failed: {message}")]
pub struct NotifyError {
    pub to: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler for activity '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Why a polling loop stopped on its own.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
