//! Error types for the analysis pipeline

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the analysis pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown builder: {0}")]
    UnknownBuilder(String),

    // Precondition failures
    #[error("Required input not found: {0}")]
    MissingInput(String),

    #[error("Invalid input file {path}: {reason}")]
    InvalidInput { path: String, reason: String },

    // Info API errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP request timed out: {0}")]
    HttpTimeout(String),

    #[error("Info API returned status {status}")]
    HttpStatus { status: u16 },

    #[error("Access denied (403) by info API")]
    AccessDenied,

    #[error("Snapshot fetch failed for {address}: {reason}")]
    SnapshotFetch { address: String, reason: String },

    // Data errors
    #[error("CSV error: {0}")]
    Csv(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::HttpTimeout(_) => true,
            Error::HttpStatus { status } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Check if this error means a required input was absent or unusable
    pub fn is_precondition_failure(&self) -> bool {
        matches!(self, Error::MissingInput(_) | Error::InvalidInput { .. })
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::HttpTimeout(e.to_string())
        } else if let Some(status) = e.status() {
            Error::HttpStatus {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            Error::Serialization(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from csv errors
impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Http("connection reset".into()).is_retryable());
        assert!(Error::HttpTimeout("30s".into()).is_retryable());
        assert!(Error::HttpStatus { status: 502 }.is_retryable());
        assert!(Error::HttpStatus { status: 429 }.is_retryable());
        assert!(!Error::HttpStatus { status: 400 }.is_retryable());
        assert!(!Error::AccessDenied.is_retryable());
        assert!(!Error::MissingInput("users.json".into()).is_retryable());
    }

    #[test]
    fn test_precondition_failure() {
        assert!(Error::MissingInput("a.json".into()).is_precondition_failure());
        assert!(Error::InvalidInput {
            path: "a.json".into(),
            reason: "no users".into()
        }
        .is_precondition_failure());
        assert!(!Error::Io("disk".into()).is_precondition_failure());
    }
}
