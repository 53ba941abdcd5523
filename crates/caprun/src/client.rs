//! # Client
//!
//! The call originator. Sends requests through a configured `Sender`,
//! parks a pending entry per request id, and wakes the caller when the
//! dispatcher routes the correlated reply back.
//!
//! ## Invariants
//!
//! - The pending entry is registered before the request leaves, so a reply
//!   can never overtake its own registration.
//! - Replies are matched by id alone. Arrival order means nothing.
//! - No lock is held across an await.
//! - Once the client is closed, every call it still has in flight resolves
//!   with `ChannelClosed`, and new calls fail the same way.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use capwire::ArgumentEnvelope;
use capwire::BOOTSTRAP_ID;
use capwire::BOOTSTRAP_METHOD;
use capwire::MAIN_ID;
use capwire::Message;
use capwire::RequestMessage;
use dashmap::DashSet;
use tokio::sync::oneshot;

use crate::codec;
use crate::codec::AutoWrapper;
use crate::error::Error;
use crate::error::Result;
use crate::error::StateError;
use crate::id::next_id;
use crate::scope::HostScope;
use crate::sender::Sender;
use crate::value::Value;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// A cheap handle; clones share sender, settings and scope.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    scope: Arc<HostScope>,
    connection: u64,
    sender: OnceLock<Arc<dyn Sender>>,
    args_wrapper: RwLock<AutoWrapper>,
    timeout: RwLock<Option<Duration>>,
    in_flight: DashSet<String>,
    closed: AtomicBool,
}

impl Client {
    pub fn new(scope: Arc<HostScope>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                scope,
                connection: NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed),
                sender: OnceLock::new(),
                args_wrapper: RwLock::new(codec::shallow_auto_wrapper()),
                timeout: RwLock::new(None),
                in_flight: DashSet::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Identifies the connection this client speaks over. Shared by clones,
    /// distinct for every `Client::new`.
    pub fn connection(&self) -> u64 {
        self.inner.connection
    }

    pub fn scope(&self) -> &Arc<HostScope> {
        &self.inner.scope
    }

    pub fn host_id(&self) -> Option<&str> {
        self.inner.scope.host_id()
    }

    pub fn set_sender(&self, sender: impl Sender) -> Result<()> {
        self.set_shared_sender(Arc::new(sender))
    }

    /// Fails with `AlreadyConfigured` on the second call.
    pub fn set_shared_sender(&self, sender: Arc<dyn Sender>) -> Result<()> {
        self.inner
            .sender
            .set(sender)
            .map_err(|_| StateError::AlreadyConfigured("sender").into())
    }

    pub fn sender(&self) -> Result<Arc<dyn Sender>> {
        self.inner
            .sender
            .get()
            .cloned()
            .ok_or_else(|| StateError::NotConfigured("sender").into())
    }

    pub fn set_args_auto_wrapper(&self, wrapper: AutoWrapper) {
        *self.inner.args_wrapper.write().unwrap_or_else(PoisonError::into_inner) = wrapper;
    }

    /// Bounds how long `send` waits for a reply. `None`, the default, waits
    /// for as long as it takes.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.inner.timeout.write().unwrap_or_else(PoisonError::into_inner) = timeout;
    }

    pub fn timeout(&self) -> Option<Duration> {
        *self.inner.timeout.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn args_wrapper(&self) -> AutoWrapper {
        Arc::clone(&self.inner.args_wrapper.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn from_envelope(&self, envelope: ArgumentEnvelope) -> Result<Value> {
        codec::from_envelope(envelope, self)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Marks the connection dead. Every call still waiting on it fails with
    /// `ChannelClosed`, and so does every later one.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        let pending = self.inner.scope.pending();
        let ids: Vec<String> = self.inner.in_flight.iter().map(|id| id.key().clone()).collect();
        for id in ids {
            self.inner.in_flight.remove(&id);
            if let Some(resolver) = pending.take(&id) {
                let _ = resolver.send(Err(Error::ChannelClosed));
            }
        }
    }

    /// Sends `request` and waits for its reply.
    pub async fn send(&self, request: RequestMessage) -> Result<Value> {
        let sender = self.sender()?;
        let id = request.id.clone();

        let reply = self.inner.scope.pending().register(id.clone());
        self.inner.in_flight.insert(id.clone());
        let outcome = self.exchange(sender, request, reply).await;
        self.inner.in_flight.remove(&id);
        outcome
    }

    async fn exchange(
        &self,
        sender: Arc<dyn Sender>,
        request: RequestMessage,
        reply: oneshot::Receiver<Result<Value>>,
    ) -> Result<Value> {
        let pending = self.inner.scope.pending();
        let id = request.id.clone();

        // After registering, so `close` either sees this call or we see it.
        if self.is_closed() {
            pending.withdraw(&id);
            return Err(Error::ChannelClosed);
        }
        if let Err(e) = sender.send(Message::Request(request)).await {
            pending.withdraw(&id);
            return Err(e);
        }

        let outcome = match self.timeout() {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    pending.withdraw(&id);
                    tracing::warn!(request = %id, ?limit, "Request timed out");
                    return Err(Error::Timeout);
                }
            },
            None => reply.await,
        };

        outcome.map_err(|_| Error::ChannelClosed)?
    }

    /// Sends a message that expects no answer, such as a reply.
    pub async fn post(&self, message: Message) -> Result<()> {
        self.sender()?.send(message).await
    }

    /// Invokes `method` on the remote export `object_id`. Arguments pass
    /// through the auto-wrap policy before encoding.
    pub async fn call(&self, object_id: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let args = {
            let wrapper = self.args_wrapper();
            args.into_iter()
                .map(|arg| wrapper(self, arg).and_then(codec::to_envelope))
                .collect::<Result<Vec<_>>>()?
        };

        let request = RequestMessage {
            id: next_id(),
            object_id: object_id.to_string(),
            method: method.to_string(),
            args,
        };
        self.send(request).await
    }

    /// Fetches the export `id` from the peer through its bootstrap object.
    pub async fn get_object(&self, id: &str) -> Result<Value> {
        let found = self.call(BOOTSTRAP_ID, BOOTSTRAP_METHOD, vec![Value::from(id)]).await?;
        if found.is_null() {
            return Err(Error::ObjectNotFound(id.to_string()));
        }
        Ok(found)
    }

    /// The peer's designated entry point.
    pub async fn get_main(&self) -> Result<Value> {
        self.get_object(MAIN_ID).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host_id", &self.host_id())
            .field("connection", &self.inner.connection)
            .field("connected", &self.inner.sender.get().is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}
