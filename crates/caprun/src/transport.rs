//! # Byte Transport
//!
//! The duplex channel a `Peer` runs over. A transport moves whole frames
//! and never looks inside them; framing into JSON messages happens in
//! `peer`.
//!
//! ## Invariants
//!
//! - `send` delivers one frame or fails; frames are never split or merged.
//! - `recv` yields `Ok(None)` exactly when the remote end is gone and no
//!   more frames will arrive.
//! - After `close`, local sends fail and the remote end's `recv` drains to
//!   `Ok(None)`.

use std::fmt;

/// Failures of the underlying channel.
#[derive(Debug, Clone)]
pub enum Error {
    /// The other end hung up.
    ConnectionLost(String),
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A bidirectional frame channel. Object safe, so peers hold `Box<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, frame: &[u8]) -> Result<()>;

    /// Waits for the next inbound frame.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;

    /// Hangs up this end. Idempotent.
    fn close(&self);
}
