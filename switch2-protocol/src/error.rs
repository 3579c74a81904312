//! Protocol engine error types

use thiserror::Error;

/// Errors reported by a command-path or data-path collaborator
///
/// The engine treats every variant as non-fatal: the state that depended on
/// the send simply does not advance and the next triggering event retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No collaborator is bound for the path the operation needs
    #[error("Path not connected")]
    NotConnected,

    /// The transport refused the submission (queue full, device busy, ...)
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    /// Payload exceeds the 56 bytes a frame can carry
    #[error("Payload too large: {0} bytes (max 56)")]
    PayloadTooLarge(usize),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors raised while handling inbound frames and reports
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input too short or internally inconsistent
    #[error("Malformed frame: expected at least {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    /// Report id not handled by any decoder table
    #[error("Unsupported report id 0x{0:02X}")]
    UnsupportedReport(u8),

    /// Command attempted with no bound command path
    #[error("Command path not connected")]
    NotConnected,

    /// Submission failure from the transport
    #[error("Transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for ProtocolError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConnected => ProtocolError::NotConnected,
            other => ProtocolError::Transport(other),
        }
    }
}

/// Errors from the input-sink collaborator
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to create input device: {0}")]
    Create(#[source] std::io::Error),

    #[error("Failed to emit events: {0}")]
    Emit(#[source] std::io::Error),

    #[error("Controller type has no input layout")]
    Unsupported,
}

/// Convenience alias for engine results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_connected_maps_to_protocol_not_connected() {
        let err: ProtocolError = TransportError::NotConnected.into();
        assert_eq!(err, ProtocolError::NotConnected);
    }

    #[test]
    fn test_submission_failure_is_wrapped() {
        let err: ProtocolError = TransportError::SubmissionFailed("queue full".into()).into();
        assert!(matches!(
            err,
            ProtocolError::Transport(TransportError::SubmissionFailed(_))
        ));
    }

    #[test]
    fn test_malformed_frame_display() {
        let err = ProtocolError::MalformedFrame {
            expected: 8,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Malformed frame: expected at least 8 bytes, got 3"
        );
    }
}
