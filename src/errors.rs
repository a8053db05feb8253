//! Error categorization and top-level error types.
//!
//! Transport failures and non-2xx responses are not run-fatal: they are
//! recorded as Observations and the run continues. This module
//! gives them a stable category for logging and for the "last exception"/
//! "last non-2xx" surfacing the reporter does at the end of a run.

use std::fmt;
use thiserror::Error;

/// Categories of errors that can occur while issuing load-test requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP 4xx errors (client errors)
    ClientError,

    /// HTTP 5xx errors (server errors)
    ServerError,

    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// Request timeout errors
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize an HTTP status code. Returns `None` for success/redirect.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200..=399 => None,
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    /// Categorize a transport-level reqwest error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() {
            ErrorCategory::NetworkError
        } else if error.is_request() || error.is_body() || error.is_decode() {
            ErrorCategory::NetworkError
        } else {
            let msg = error.to_string().to_lowercase();
            if msg.contains("certificate") || msg.contains("tls") || msg.contains("ssl") {
                ErrorCategory::TlsError
            } else if msg.contains("timeout") {
                ErrorCategory::TimeoutError
            } else if msg.contains("dns") || msg.contains("resolve") || msg.contains("connect") {
                ErrorCategory::NetworkError
            } else {
                ErrorCategory::OtherError
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A transport-level failure retained for end-of-run surfacing: the last one
/// observed during a run is what gets printed in the final summary.
#[derive(Debug, Clone)]
pub struct LastTransportError {
    pub category: ErrorCategory,
    pub message: String,
}

impl fmt::Display for LastTransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category.label(), self.message)
    }
}

/// A non-2xx response retained for end-of-run surfacing.
#[derive(Debug, Clone)]
pub struct LastNon2xx {
    pub status_code: u16,
    pub url: String,
}

impl fmt::Display for LastNon2xx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} from {}", self.status_code, self.url)
    }
}

/// Configuration errors, surfaced before any request is sent.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required argument: {0}")]
    MissingArg(String),

    #[error("{flag_a} and {flag_b} are mutually exclusive; exactly one must be given")]
    MutuallyExclusive { flag_a: String, flag_b: String },

    #[error("exactly one of {group} must be given: {options}")]
    MissingOneOf { group: String, options: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("body file not found: {0}")]
    BodyFileNotFound(String),

    #[error("failed to read body file '{path}': {source}")]
    BodyFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the Sink's bulk-write path. Final failure after retries is
/// fatal to the process — the run's observations would otherwise be lost.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("bulk write to {url} failed: {message}")]
    BulkWriteFailed { url: String, message: String },

    #[error("bulk write to {url} returned non-success status {status}: {body}")]
    BulkWriteRejected {
        url: String,
        status: u16,
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_success_as_none() {
        assert_eq!(ErrorCategory::from_status_code(200), None);
        assert_eq!(ErrorCategory::from_status_code(301), None);
    }

    #[test]
    fn categorizes_4xx_and_5xx() {
        assert_eq!(
            ErrorCategory::from_status_code(404),
            Some(ErrorCategory::ClientError)
        );
        assert_eq!(
            ErrorCategory::from_status_code(503),
            Some(ErrorCategory::ServerError)
        );
    }

    #[test]
    fn last_transport_error_display() {
        let e = LastTransportError {
            category: ErrorCategory::NetworkError,
            message: "connection refused".into(),
        };
        assert_eq!(format!("{}", e), "[network_error] connection refused");
    }

    #[test]
    fn last_non2xx_display() {
        let e = LastNon2xx {
            status_code: 503,
            url: "http://x/y".into(),
        };
        assert_eq!(format!("{}", e), "HTTP 503 from http://x/y");
    }
}
