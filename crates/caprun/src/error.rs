//! # Error Definitions
//!
//! The runtime's failure taxonomy. Request-handling failures never cross the
//! transport as errors; they are turned into failed replies and surface on
//! the calling side as `RemoteRejected`.

use crate::transport;

/// Misuse of runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A proxy was requested before the scope was given a host identity.
    NoHostId,
    /// A set-once setting was set a second time.
    AlreadyConfigured(&'static str),
    /// A setting was used before being set.
    NotConfigured(&'static str),
}

#[derive(Debug, Clone)]
pub enum Error {
    /// No export behind the requested id.
    ObjectNotFound(String),
    /// The export exists but has no member with this name.
    MissingMember(String),
    /// A handler failed; carries the failure description.
    Invocation(String),
    /// The peer answered with a non-success status.
    RemoteRejected { status: i32, trace: Option<String> },
    InvalidState(StateError),
    /// A descriptor named a member kind this runtime does not understand.
    UnsupportedMember { name: String, kind: String },
    /// A live capability reached the encoder without being wrapped as a proxy.
    NotSerializable(&'static str),
    /// A value had a different shape than the caller asked for.
    UnexpectedValue { expected: &'static str, found: &'static str },
    Transport(transport::Error),
    Wire(capwire::Error),
    /// The pending call was dropped without ever receiving a reply.
    ChannelClosed,
    /// The optional client timeout elapsed before the reply arrived.
    Timeout,
}

impl Error {
    /// Recovers a runtime error that travelled through an application
    /// handler; any other failure becomes `Invocation`.
    pub fn from_handler(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(e) => e,
            Err(other) => Self::Invocation(format!("{:#}", other)),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ObjectNotFound(id) => write!(f, "Object not found: {}", id),
            Self::MissingMember(name) => write!(f, "No member named '{}'", name),
            Self::Invocation(msg) => write!(f, "{}", msg),
            Self::RemoteRejected { status, trace } => match trace {
                Some(trace) => write!(f, "Remote rejected call (status {}): {}", status, trace),
                None => write!(f, "Remote rejected call (status {})", status),
            },
            Self::InvalidState(StateError::NoHostId) => write!(f, "Invalid state: host id is not set"),
            Self::InvalidState(StateError::AlreadyConfigured(what)) => {
                write!(f, "Invalid state: {} already set", what)
            }
            Self::InvalidState(StateError::NotConfigured(what)) => {
                write!(f, "Invalid state: {} not set", what)
            }
            Self::UnsupportedMember { name, kind } => {
                write!(f, "Unsupported member '{}' of kind '{}'", name, kind)
            }
            Self::NotSerializable(kind) => write!(f, "A {} cannot be sent as plain data", kind),
            Self::UnexpectedValue { expected, found } => {
                write!(f, "Expected {}, found {}", expected, found)
            }
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
            Self::ChannelClosed => write!(f, "Pending call dropped before its reply arrived"),
            Self::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StateError> for Error {
    fn from(e: StateError) -> Self {
        Self::InvalidState(e)
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<capwire::Error> for Error {
    fn from(e: capwire::Error) -> Self {
        Self::Wire(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Wire(capwire::Error::from(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
