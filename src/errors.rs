use thiserror::Error;

/// Errors produced while starting, running or configuring a stream.
///
/// Only [`StreamError::ConfigurationError`] and [`StreamError::PreflightError`]
/// prevent a session from starting. Everything raised inside a running session
/// is absorbed by the controller and reported through tick outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Pre-flight check failed: {reason}")]
    PreflightError { status: Option<u16>, reason: String },
    #[error("Encoding error: {0}")]
    EncodeError(String),
    #[error("Upload rejected with HTTP {0}")]
    UploadRejected(u16),
    #[error("Transport error: {0}")]
    TransportError(String),
    #[error("A stream session is already active")]
    AlreadyActive,
    #[error("Stream is not live")]
    NotLive,
    #[error("Config file error: {0}")]
    ConfigFileError(String),
    #[error("Camera error: {0}")]
    CameraError(String),
}

impl StreamError {
    /// True for the failures that keep a session from starting.
    pub fn blocks_start(&self) -> bool {
        matches!(
            self,
            StreamError::ConfigurationError(_) | StreamError::PreflightError { .. }
        )
    }

    /// Short operator-facing text for the status line.
    pub fn status_message(&self) -> String {
        match self {
            StreamError::ConfigurationError(msg) => format!("ERROR: {}", msg),
            StreamError::PreflightError {
                status: Some(code), ..
            } => format!("ERROR: server returned {}", code),
            StreamError::PreflightError { status: None, reason } => {
                format!("OFFLINE: {}", truncate_reason(reason, 30))
            }
            StreamError::UploadRejected(code) => format!("WARNING: server returned {}", code),
            other => format!("ERROR: {}", other),
        }
    }
}

fn truncate_reason(reason: &str, max_chars: usize) -> String {
    reason.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_start_failures_block_start() {
        assert!(StreamError::ConfigurationError("enter server URL".into()).blocks_start());
        assert!(StreamError::PreflightError {
            status: Some(500),
            reason: "bad".into()
        }
        .blocks_start());
        assert!(!StreamError::EncodeError("x".into()).blocks_start());
        assert!(!StreamError::UploadRejected(503).blocks_start());
        assert!(!StreamError::TransportError("timeout".into()).blocks_start());
    }

    #[test]
    fn test_offline_message_is_truncated() {
        let err = StreamError::PreflightError {
            status: None,
            reason: "connection refused by the remote host at 10.0.0.1".into(),
        };
        let msg = err.status_message();
        assert_eq!(msg, "OFFLINE: connection refused by the remo");
        assert_eq!(msg.len(), "OFFLINE: ".len() + 30);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_reason("ünïcödé", 3), "ünï");
    }
}
