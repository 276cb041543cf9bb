//! Error types for the smoke run

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmokeError {
    #[error("Authentication failed with HTTP {status}: {body}")]
    Authentication { status: u16, body: String },

    #[error("Login succeeded but no '{cookie}' session cookie was issued")]
    MissingCredential { cookie: String },

    #[error("Session could not be established: {0}")]
    SessionEstablishment(String),

    #[error("Timed out after {timeout_ms} ms waiting for {selector}")]
    SelectorTimeout { selector: String, timeout_ms: u64 },

    #[error("No element matches {0}")]
    ElementNotFound(String),

    #[error("Navigation to '{target}' failed: {reason}")]
    Navigation { target: String, reason: String },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Timed out after {timeout_ms} ms waiting for {what}")]
    ResponseTimeout { what: String, timeout_ms: u64 },

    #[error("{method} {url} returned HTTP {status}")]
    RequestFailed {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type SmokeResult<T> = Result<T, SmokeError>;

impl From<chromiumoxide::error::CdpError> for SmokeError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        SmokeError::Browser(e.to_string())
    }
}

/// Coarse classification used in the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Authentication,
    SessionEstablishment,
    SelectorTimeout,
    Navigation,
    Assertion,
    Timeout,
    Infrastructure,
}

impl SmokeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SmokeError::Authentication { .. } | SmokeError::MissingCredential { .. } => {
                FailureKind::Authentication
            }
            SmokeError::SessionEstablishment(_) => FailureKind::SessionEstablishment,
            SmokeError::SelectorTimeout { .. } | SmokeError::ElementNotFound(_) => {
                FailureKind::SelectorTimeout
            }
            SmokeError::Navigation { .. } => FailureKind::Navigation,
            SmokeError::Assertion(_) | SmokeError::RequestFailed { .. } => FailureKind::Assertion,
            SmokeError::ResponseTimeout { .. } => FailureKind::Timeout,
            _ => FailureKind::Infrastructure,
        }
    }

    /// Whether a best-effort section may log this error and move on
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            SmokeError::SelectorTimeout { .. }
                | SmokeError::ElementNotFound(_)
                | SmokeError::Navigation { .. }
        )
    }

    /// Failures a bounded UI retry loop absorbs before giving up
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SmokeError::SelectorTimeout { .. }
                | SmokeError::ElementNotFound(_)
                | SmokeError::ResponseTimeout { .. }
        )
    }
}
