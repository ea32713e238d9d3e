use thiserror::Error;

/// Failure of a single notification delivery.
///
/// Never propagated into the tick loop; the channel worker logs it and
/// publishes it as the channel status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The transport was never initialized. Permanent for the session.
    #[error("channel unavailable")]
    Unavailable,
    /// One delivery failed (timeout, disconnect, unreachable device).
    /// Not retried; the next state change tries again.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

impl NotifyError {
    pub fn transient(reason: impl Into<String>) -> Self {
        NotifyError::Transient(reason.into())
    }
}

impl From<std::io::Error> for NotifyError {
    fn from(err: std::io::Error) -> Self {
        NotifyError::Transient(err.to_string())
    }
}

/// Raised by a classifier. The loop treats the frame as having no detections.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("frame {frame_id} has no pixels")]
    EmptyFrame { frame_id: u64 },
    #[error("malformed detection script at line {line}: {source}")]
    Script {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Construction-time configuration failure. The only error allowed to abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
