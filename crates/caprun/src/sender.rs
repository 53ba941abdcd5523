//! # Senders
//!
//! The write half a `Client` hands its messages to. A `Peer` installs a
//! sender that frames messages onto a transport; `LoopbackSender` skips the
//! bytes entirely and feeds another in-process dispatcher.

use std::sync::Arc;

use capwire::Message;

use crate::client::Client;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

#[async_trait::async_trait]
pub trait Sender: Send + Sync + 'static {
    async fn send(&self, message: Message) -> Result<()>;
}

/// Delivers every message to `target`, which answers through `reply_to`.
///
/// Each message is dispatched on its own task, the same way a transport
/// pump would, so a send never waits for the handler it triggers.
pub struct LoopbackSender {
    target: Arc<Dispatcher>,
    reply_to: Client,
}

impl LoopbackSender {
    pub fn new(target: Arc<Dispatcher>, reply_to: Client) -> Self {
        Self { target, reply_to }
    }
}

#[async_trait::async_trait]
impl Sender for LoopbackSender {
    async fn send(&self, message: Message) -> Result<()> {
        let target = Arc::clone(&self.target);
        let reply_to = self.reply_to.clone();
        tokio::spawn(async move {
            target.on_receive_message(message, &reply_to).await;
        });
        Ok(())
    }
}

/// Wires two in-process hosts together.
///
/// Returns `(client_of_a, client_of_b)`: `client_of_a` lives in `a`'s scope
/// and calls into `b`, and vice versa. Each one is also the client the other
/// side replies through.
///
/// The two clients reference each other through their senders, so they live
/// until the process ends. Fine for simulated hosts, not for connections
/// that come and go; use `Peer` for those.
pub fn connect_loopback(a: &Arc<Dispatcher>, b: &Arc<Dispatcher>) -> Result<(Client, Client)> {
    let client_of_a = Client::new(Arc::clone(a.scope()));
    let client_of_b = Client::new(Arc::clone(b.scope()));

    client_of_a.set_sender(LoopbackSender::new(Arc::clone(b), client_of_b.clone()))?;
    client_of_b.set_sender(LoopbackSender::new(Arc::clone(a), client_of_a.clone()))?;
    Ok((client_of_a, client_of_b))
}
