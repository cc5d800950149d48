//! Error types for the ISA PnP scanner.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Cannot access I/O ports through {path}: {source}")]
    PortAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Port I/O is not available on this platform")]
    PortIoUnsupported,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

pub type ProbeResult<T> = Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProbeError::InvalidConfiguration("stride must be non-zero".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: stride must be non-zero"
        );
    }
}
