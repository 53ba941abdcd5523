//! In-process transports.
//!
//! `MemoryTransport::pair` gives two connected ends backed by tokio
//! channels: whatever one end sends, the other receives. Used to wire hosts
//! together inside a single process, which is how the test suites run
//! multi-host scenarios.

use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Transport;

/// One end of an in-memory duplex channel.
pub struct MemoryTransport {
    /// `None` once closed. Dropping the only sender ends the other side's
    /// stream.
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::unbounded_channel();
        let (right_tx, left_rx) = mpsc::unbounded_channel();
        (Self::new(left_tx, left_rx), Self::new(right_tx, right_rx))
    }

    fn new(outbound: mpsc::UnboundedSender<Vec<u8>>, inbound: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            outbound: Mutex::new(Some(outbound)),
            inbound: tokio::sync::Mutex::new(inbound),
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: &[u8]) -> transport::Result<()> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(outbound) = outbound.as_ref() else {
            return Err(transport::Error::ConnectionLost("transport closed".into()));
        };
        outbound
            .send(frame.to_vec())
            .map_err(|_| transport::Error::ConnectionLost("memory peer dropped".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut inbound = self.inbound.lock().await;
        Ok(inbound.recv().await)
    }

    fn close(&self) {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
