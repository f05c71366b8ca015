//! Protocol error types.

use thiserror::Error;

/// Errors raised while extracting frames from a response byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("response frame must start with 'D' or 'Z', got {0:#04x}")]
    InvalidMarker(u8),

    #[error("response frame exceeds {max} bytes without a boundary")]
    MaxFrameSizeExceeded { max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidMarker(b'l');
        assert!(err.to_string().contains("0x6c"));

        let err = ProtocolError::MaxFrameSizeExceeded { max: 5120 };
        assert!(err.to_string().contains("5120"));
    }
}
