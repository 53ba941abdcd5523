//! # Peer
//!
//! Binds a dispatcher to a byte transport. Outbound messages are encoded as
//! JSON frames; a pump task decodes inbound frames and hands each one to
//! the dispatcher on its own task, so a slow handler never stalls
//! reception.
//!
//! A frame that fails to decode is logged and skipped. The pump stops when
//! the transport closes or fails; there is no reconnection. Calls still
//! waiting on the connection then fail with `ChannelClosed`. Dropping the
//! `Peer` stops the pump, hangs up the transport and fails its calls the
//! same way.

use std::sync::Arc;

use capwire::Message;
use tokio::task::JoinHandle;

use crate::client::Client;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::sender::Sender;
use crate::transport::Transport;
use crate::value::Value;

/// Frames messages onto a transport.
struct TransportSender {
    transport: Arc<dyn Transport>,
}

#[async_trait::async_trait]
impl Sender for TransportSender {
    async fn send(&self, message: Message) -> Result<()> {
        let frame = message.to_bytes()?;
        self.transport.send(&frame).await?;
        Ok(())
    }
}

/// One live connection to a remote host.
pub struct Peer {
    client: Client,
    transport: Arc<dyn Transport>,
    pump: JoinHandle<()>,
}

impl Peer {
    /// Starts serving `dispatcher` over `transport`.
    pub fn connect(dispatcher: Arc<Dispatcher>, transport: Box<dyn Transport>) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::from(transport);
        let client = Client::new(Arc::clone(dispatcher.scope()));
        client.set_sender(TransportSender { transport: Arc::clone(&transport) })?;

        let pump = tokio::spawn(pump(dispatcher, Arc::clone(&transport), client.clone()));
        Ok(Self { client, transport, pump })
    }

    /// The client that calls into the remote host over this connection.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get_main(&self) -> Result<Value> {
        self.client.get_main().await
    }

    pub async fn get_object(&self, id: &str) -> Result<Value> {
        self.client.get_object(id).await
    }

    /// False once the transport has closed or failed.
    pub fn is_running(&self) -> bool {
        !self.pump.is_finished()
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.pump.abort();
        self.transport.close();
        self.client.close();
    }
}

async fn pump(dispatcher: Arc<Dispatcher>, transport: Arc<dyn Transport>, client: Client) {
    let host = dispatcher.scope().host_id().unwrap_or("<unnamed>").to_string();

    loop {
        let frame = match transport.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(%host, "Transport closed, pump stopping");
                break;
            }
            Err(e) => {
                tracing::warn!(%host, error = %e, "Transport failed, pump stopping");
                break;
            }
        };

        let message = match Message::from_bytes(&frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%host, error = %e, len = frame.len(), "Skipping undecodable frame");
                continue;
            }
        };

        let dispatcher = Arc::clone(&dispatcher);
        let client = client.clone();
        tokio::spawn(async move {
            dispatcher.on_receive_message(message, &client).await;
        });
    }

    client.close();
}
