//! # Error Definitions
//!
//! Failures that can occur while turning frames into messages and back.

/// Wire-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The frame was not valid JSON, or did not have the shape of any message.
    Json(String),
    /// The frame parsed, but breaks a protocol rule (e.g. a reply without a status).
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "JSON error: {}", msg),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
