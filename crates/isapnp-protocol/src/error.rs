//! ISA PnP protocol error types.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PnpError {
    #[error("Identifier checksum mismatch: expected {expected:#04X}, got {actual:#04X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Invalid resource header (all {fill:#04X})")]
    InvalidHeader { fill: u8 },

    #[error("Malformed resource tag {tag:#04X}")]
    MalformedTag { tag: u8 },

    #[error("Resource byte {offset} was not ready before the retry limit")]
    ReadTimeout { offset: usize },
}

pub type PnpResult<T> = Result<T, PnpError>;

/// A resource data byte that never became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("resource data byte not ready")]
pub struct ReadTimeout;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PnpError::ChecksumMismatch {
            expected: 0xF2,
            actual: 0x12,
        };
        assert_eq!(
            err.to_string(),
            "Identifier checksum mismatch: expected 0xF2, got 0x12"
        );
        let err = PnpError::InvalidHeader { fill: 0xFF };
        assert_eq!(err.to_string(), "Invalid resource header (all 0xFF)");
    }
}
