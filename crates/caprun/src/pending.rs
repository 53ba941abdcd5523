//! Outstanding requests awaiting their replies.
//!
//! Each entry is consumed exactly once: by `take` when the correlated reply
//! arrives, or by `withdraw` when the caller gives up (send failure or
//! timeout). A second reply for the same id finds nothing.

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::value::Value;

pub(crate) type Resolver = oneshot::Sender<Result<Value>>;

#[derive(Default)]
pub struct PendingCalls {
    calls: DashMap<String, Resolver>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: impl Into<String>) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(id.into(), tx);
        rx
    }

    pub(crate) fn take(&self, id: &str) -> Option<Resolver> {
        self.calls.remove(id).map(|(_, tx)| tx)
    }

    pub(crate) fn withdraw(&self, id: &str) -> bool {
        self.calls.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.calls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
