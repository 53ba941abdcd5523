//! # Dispatcher
//!
//! The per-host receive side. Every inbound message lands in
//! `on_receive_message`:
//!
//! - A request is decoded, routed to its export, optionally run through the
//!   interceptor chain, and always answered with exactly one reply.
//! - A reply resolves the pending call it names, or is logged and dropped
//!   when nothing is waiting for it.
//!
//! ## Reply statuses
//!
//! | Outcome                         | status | trace              |
//! |---------------------------------|--------|--------------------|
//! | success                         | 200    | none               |
//! | unknown export id               | 100    | `object not found` |
//! | bad argument, missing member,   | -1     | error description  |
//! | failed handler, bad result      |        |                    |
//!
//! Handler failures never escape as errors; the dispatcher keeps serving.

use std::future::Future;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::Weak;

use capwire::ArgumentEnvelope;
use capwire::BOOTSTRAP_ID;
use capwire::BOOTSTRAP_METHOD;
use capwire::MAIN_ID;
use capwire::Message;
use capwire::OBJECT_NOT_FOUND_TRACE;
use capwire::ReplyMessage;
use capwire::RequestMessage;
use capwire::status;
use dashmap::DashSet;

use crate::client::Client;
use crate::codec;
use crate::codec::AutoWrapper;
use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::id::next_id;
use crate::interceptor;
use crate::interceptor::Interceptor;
use crate::interceptor::Next;
use crate::registry::Capability;
use crate::scope::HostScope;
use crate::value::Invocation;
use crate::value::Object;
use crate::value::Value;

/// Why a request could not be served.
struct Failure {
    status: i32,
    trace: String,
}

impl Failure {
    fn not_found() -> Self {
        Self { status: status::OBJECT_NOT_FOUND, trace: OBJECT_NOT_FOUND_TRACE.to_string() }
    }

    fn invocation(err: Error) -> Self {
        Self { status: status::INVOCATION_FAILED, trace: err.to_string() }
    }
}

pub struct Dispatcher {
    scope: Arc<HostScope>,
    interceptors: RwLock<Vec<Interceptor>>,
    with_context: DashSet<String>,
    result_wrapper: RwLock<AutoWrapper>,
}

impl Dispatcher {
    /// Creates the dispatcher for `scope` and exports the bootstrap object
    /// under `main0`.
    pub fn new(scope: Arc<HostScope>) -> Arc<Self> {
        let bootstrap = bootstrap_object(Arc::downgrade(&scope));
        scope.registry().insert(BOOTSTRAP_ID, Capability::Object(bootstrap));

        Arc::new(Self {
            scope,
            interceptors: RwLock::new(Vec::new()),
            with_context: DashSet::new(),
            result_wrapper: RwLock::new(codec::shallow_auto_wrapper()),
        })
    }

    pub fn scope(&self) -> &Arc<HostScope> {
        &self.scope
    }

    /// Exports `value` as the application entry point, `main`.
    pub fn set_main(&self, value: impl Into<Value>) -> Result<()> {
        self.set_object(MAIN_ID, value, false)
    }

    /// Exports `value` under `id`. With `with_context`, every call on it runs
    /// through the interceptor chain with a fresh `Context`.
    pub fn set_object(&self, id: impl Into<String>, value: impl Into<Value>, with_context: bool) -> Result<()> {
        let id = id.into();
        let capability = Capability::from_value(value.into())?;
        self.scope.registry().insert(id.clone(), capability);

        if with_context {
            self.with_context.insert(id);
        } else {
            self.with_context.remove(&id);
        }
        Ok(())
    }

    /// Appends to the interceptor chain.
    pub fn add_interceptor<F, Fut>(&self, f: F)
    where
        F: Fn(Context, Arc<RequestMessage>, Client, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor::interceptor(f));
    }

    pub fn set_result_auto_wrapper(&self, wrapper: AutoWrapper) {
        *self.result_wrapper.write().unwrap_or_else(PoisonError::into_inner) = wrapper;
    }

    fn result_wrapper(&self) -> AutoWrapper {
        Arc::clone(&self.result_wrapper.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn chain(&self) -> Arc<[Interceptor]> {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Handles one inbound message. `client` is the one replies and
    /// stand-ins created while decoding go through.
    pub async fn on_receive_message(&self, message: Message, client: &Client) {
        let host = self.scope.host_id().unwrap_or("<unnamed>");
        if self.scope.debug() {
            tracing::info!(host, ?message, "Received message");
        } else {
            tracing::debug!(host, id = message.id(), reply = message.is_reply(), "Received message");
        }

        match message {
            Message::Request(request) => self.handle_request(request, client).await,
            Message::Reply(reply) => self.handle_reply(reply, client),
        }
    }

    async fn handle_request(&self, request: RequestMessage, client: &Client) {
        let request = Arc::new(request);

        let reply = match self.serve(&request, client).await {
            Ok(data) => ReplyMessage::ok(next_id(), &request.id, data),
            Err(failure) => {
                tracing::warn!(
                    request = %request.id,
                    object = %request.object_id,
                    method = %request.method,
                    status = failure.status,
                    trace = %failure.trace,
                    "Request failed"
                );
                ReplyMessage::failure(next_id(), &request.id, failure.status, failure.trace)
            }
        };

        if let Err(e) = client.post(Message::Reply(reply)).await {
            tracing::warn!(request = %request.id, error = %e, "Failed to send reply");
        }
    }

    async fn serve(
        &self,
        request: &Arc<RequestMessage>,
        client: &Client,
    ) -> std::result::Result<ArgumentEnvelope, Failure> {
        let args = request
            .args
            .iter()
            .cloned()
            .map(|envelope| client.from_envelope(envelope))
            .collect::<Result<Vec<_>>>()
            .map_err(Failure::invocation)?;

        let target = self
            .scope
            .registry()
            .lookup(&request.object_id)
            .ok_or_else(Failure::not_found)?;
        let function = target.member(&request.method).map_err(Failure::invocation)?;

        let outcome = if self.with_context.contains(&request.object_id) {
            let chain = self.chain();
            let next = Next::new(chain, Context::new(), Arc::clone(request), client.clone(), function, args);
            next.run().await.map_err(Error::from_handler)
        } else {
            function.call(args).await
        };
        let result = outcome.map_err(Failure::invocation)?;

        let wrapper = self.result_wrapper();
        wrapper(client, result)
            .and_then(codec::to_envelope)
            .map_err(Failure::invocation)
    }

    fn handle_reply(&self, reply: ReplyMessage, client: &Client) {
        let Some(resolver) = self.scope.pending().take(&reply.id_for) else {
            tracing::warn!(reply = %reply.id, id_for = %reply.id_for, "Ignoring reply with no pending call");
            return;
        };

        let outcome = if reply.is_ok() {
            match reply.data {
                Some(data) => client.from_envelope(data),
                None => Ok(Value::null()),
            }
        } else {
            Err(Error::RemoteRejected { status: reply.status, trace: reply.trace })
        };

        // The caller may have stopped waiting.
        let _ = resolver.send(outcome);
    }
}

/// The `main0` accessor: resolves any export id of this host to a proxy,
/// or null when nothing is exported under it.
fn bootstrap_object(scope: Weak<HostScope>) -> Object {
    Object::builder()
        .method(BOOTSTRAP_METHOD, move |invocation: Invocation| {
            let scope = scope.upgrade();
            async move {
                let Some(scope) = scope else {
                    anyhow::bail!("host scope is gone");
                };
                let id: String = invocation.data(0)?;
                match scope.registry().lookup(&id) {
                    Some(capability) => anyhow::Ok(scope.as_proxy(capability.into_value())?),
                    None => anyhow::Ok(Value::null()),
                }
            }
        })
        .build()
}
