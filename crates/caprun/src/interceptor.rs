//! # Interceptor Chain
//!
//! Middleware around with-context dispatch. Interceptors run in
//! registration order on the way in. Each one decides whether to continue
//! by calling `Next::run`, and whatever it writes after that call runs on
//! the way out, in reverse order.
//!
//! `Next` is consumed by `run`, so the rest of the chain runs at most once
//! per interceptor. An interceptor that never calls `run` short-circuits:
//! later interceptors and the target are skipped and its own return value
//! becomes the result.

use std::future::Future;
use std::sync::Arc;

use capwire::RequestMessage;
use futures::future::BoxFuture;

use crate::client::Client;
use crate::context::Context;
use crate::value::Function;
use crate::value::Invocation;
use crate::value::Value;

pub type Interceptor = Arc<
    dyn Fn(Context, Arc<RequestMessage>, Client, Next) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync,
>;

/// Boxes an async closure into an `Interceptor`.
pub fn interceptor<F, Fut>(f: F) -> Interceptor
where
    F: Fn(Context, Arc<RequestMessage>, Client, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(
        move |context: Context,
              request: Arc<RequestMessage>,
              client: Client,
              next: Next|
              -> BoxFuture<'static, anyhow::Result<Value>> {
            Box::pin(f(context, request, client, next))
        },
    )
}

/// Everything downstream of the current interceptor.
pub struct Next {
    chain: Arc<[Interceptor]>,
    index: usize,
    context: Context,
    request: Arc<RequestMessage>,
    client: Client,
    target: Function,
    args: Vec<Value>,
}

impl Next {
    pub(crate) fn new(
        chain: Arc<[Interceptor]>,
        context: Context,
        request: Arc<RequestMessage>,
        client: Client,
        target: Function,
        args: Vec<Value>,
    ) -> Self {
        Self { chain, index: 0, context, request, client, target, args }
    }

    pub fn request(&self) -> &RequestMessage {
        &self.request
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Decoded arguments the target will receive.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Runs the next interceptor, or the target once the chain is exhausted.
    pub async fn run(self) -> anyhow::Result<Value> {
        match self.chain.get(self.index).cloned() {
            Some(interceptor) => {
                let context = self.context.clone();
                let request = Arc::clone(&self.request);
                let client = self.client.clone();
                let next = Next { index: self.index + 1, ..self };
                interceptor(context, request, client, next).await
            }
            None => {
                let invocation = Invocation::with_context(self.context, self.args);
                Ok(self.target.invoke(invocation).await?)
            }
        }
    }
}
