/// Errors that can occur when talking to the sensor or decoding its replies.
///
/// Every variant is recoverable by the caller. The client never retries on its
/// own; a polling loop decides whether to try again on the next frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("No transport attached or transport closed")]
    NotConnected,

    #[error("Timeout waiting for reply")]
    Timeout,

    #[error("Reply truncated: {len} bytes, need at least 6")]
    Truncated { len: usize },

    #[error("Checksum mismatch: expected 0x{expected:02x}, got 0x{actual:02x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Unknown command byte 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown algorithm mode 0x{0:02x}")]
    UnknownMode(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Polling stream stopped")]
    StreamStopped,

    #[error("Failed to spawn poller thread: {0}")]
    Spawn(String),
}

impl ProtocolError {
    /// Whether the failure concerns a single reply, so polling again next frame
    /// is reasonable. Connection and setup failures return `false`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout
                | ProtocolError::Truncated { .. }
                | ProtocolError::ChecksumMismatch { .. }
                | ProtocolError::UnknownCommand(_)
                | ProtocolError::MalformedPayload(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProtocolError::Timeout.is_transient());
        assert!(ProtocolError::ChecksumMismatch { expected: 1, actual: 2 }.is_transient());
        assert!(ProtocolError::Truncated { len: 3 }.is_transient());
        assert!(!ProtocolError::NotConnected.is_transient());
        assert!(!ProtocolError::StreamStopped.is_transient());
    }

    #[test]
    fn test_display_includes_bytes() {
        let err = ProtocolError::ChecksumMismatch { expected: 0x1f, actual: 0xa0 };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0x1f, got 0xa0");
        assert_eq!(
            ProtocolError::UnknownCommand(0x99).to_string(),
            "Unknown command byte 0x99"
        );
    }
}
