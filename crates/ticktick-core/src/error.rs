//! Error types for ticktick-tools.

use thiserror::Error;

/// Main error type for ticktick operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (missing field, bad enum value). Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A date string matched none of the accepted ISO-8601 shapes
    #[error("Invalid date format: '{0}'. Use ISO format: YYYY-MM-DDTHH:mm:ss or with timezone")]
    InvalidDateFormat(String),

    /// A timezone name is present but not a resolvable IANA zone
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Inconsistent or out-of-range filter arguments
    #[error("Invalid filter argument: {0}")]
    InvalidFilterArgument(String),

    /// Expired or invalid token; eligible for exactly one refresh attempt
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// API returned a non-2xx response
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Map an HTTP status code to the right error class.
    ///
    /// 401 becomes [`Error::Auth`] so the client can trigger its single
    /// refresh-and-retry; everything else is a plain API error.
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 401 {
            Error::Auth(if message.is_empty() {
                "access token rejected".to_string()
            } else {
                message
            })
        } else {
            Error::Api { status, message }
        }
    }
}

/// Result type alias for ticktick operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_401_is_auth() {
        let err = Error::from_status(401, "token expired".to_string());
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_from_status_401_empty_message() {
        let err = Error::from_status(401, String::new());
        assert!(err.to_string().contains("access token rejected"));
    }

    #[test]
    fn test_from_status_other() {
        let err = Error::from_status(500, "boom".to_string());
        assert!(matches!(err, Error::Api { status: 500, .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_date_format_message() {
        let err = Error::InvalidDateFormat("tomorrow-ish".to_string());
        assert!(err.to_string().contains("tomorrow-ish"));
        assert!(err.to_string().contains("ISO format"));
    }
}
