// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Palaver
//!
//! This module defines all error types used throughout the crate, including
//! the shared provider error taxonomy that every vendor adapter maps onto.

use thiserror::Error;

/// Main error type for Palaver operations
#[derive(Error, Debug)]
pub enum PalaverError {
    /// Provider-related errors (vendor API failures)
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Tool execution errors
    #[error("Tool error: {0}")]
    Tool(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session errors
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Shared error taxonomy for vendor adapters.
///
/// Every adapter maps its vendor-specific failures onto one of these codes so
/// callers only ever branch on `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Vendor throttling; the caller may retry with backoff
    RateLimited,
    /// Bad or expired credentials; not retryable without operator action
    AuthFailed,
    /// Malformed parameters or unsupported modality; a caller/config bug
    InvalidRequest,
    /// Vendor or tool call exceeded its deadline; safe to retry once
    Timeout,
    /// Unclassified vendor exception
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Error raised by a provider adapter.
///
/// `message` is safe to show to an end user; `detail` carries the technical
/// vendor payload and belongs in logs only.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Classification within the shared taxonomy
    pub code: ErrorCode,
    /// User-facing message
    pub message: String,
    /// Technical detail for logging
    pub detail: String,
}

impl ProviderError {
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// Vendor throttling
    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RateLimited,
            "the model is receiving too many requests right now. Please try again shortly.",
            detail,
        )
    }

    /// Credential failure
    pub fn auth_failed(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AuthFailed,
            "the model provider rejected our credentials.",
            detail,
        )
    }

    /// Caller or configuration bug
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidRequest,
            "the request was not accepted by the model provider.",
            detail,
        )
    }

    /// Deadline exceeded
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::Timeout,
            "the model took too long to respond.",
            detail,
        )
    }

    /// Anything unclassified
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::Unknown,
            "something went wrong while generating a response.",
            detail,
        )
    }
}

/// Result type alias for Palaver operations
pub type Result<T> = std::result::Result<T, PalaverError>;

impl From<toml::de::Error> for PalaverError {
    fn from(err: toml::de::Error) -> Self {
        PalaverError::Toml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::RateLimited.to_string(), "RATE_LIMITED");
        assert_eq!(ErrorCode::AuthFailed.to_string(), "AUTH_FAILED");
        assert_eq!(ErrorCode::InvalidRequest.to_string(), "INVALID_REQUEST");
        assert_eq!(ErrorCode::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ErrorCode::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new(ErrorCode::RateLimited, "slow down", "429 from vendor");
        assert!(err.to_string().contains("RATE_LIMITED"));
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn test_provider_error_constructors() {
        assert_eq!(ProviderError::rate_limited("x").code, ErrorCode::RateLimited);
        assert_eq!(ProviderError::auth_failed("x").code, ErrorCode::AuthFailed);
        assert_eq!(
            ProviderError::invalid_request("x").code,
            ErrorCode::InvalidRequest
        );
        assert_eq!(ProviderError::timeout("x").code, ErrorCode::Timeout);
        assert_eq!(ProviderError::unknown("x").code, ErrorCode::Unknown);
    }

    #[test]
    fn test_provider_error_detail_preserved() {
        let err = ProviderError::unknown("stack trace goes here");
        assert_eq!(err.detail, "stack trace goes here");
        // Detail never leaks into the user-facing display
        assert!(!err.to_string().contains("stack trace"));
    }

    #[test]
    fn test_palaver_error_from_provider() {
        let err: PalaverError = ProviderError::timeout("deadline").into();
        assert!(err.to_string().contains("Provider error"));
    }

    #[test]
    fn test_palaver_error_config() {
        let err = PalaverError::Config("bad module".to_string());
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_palaver_error_session() {
        let err = PalaverError::Session("not found".to_string());
        assert!(err.to_string().contains("Session error"));
    }

    #[test]
    fn test_palaver_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PalaverError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn ok() -> Result<u32> {
            Ok(7)
        }
        assert_eq!(ok().unwrap(), 7);
    }
}
