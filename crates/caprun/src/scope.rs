//! # Host Scope
//!
//! Everything that belongs to one host identity: the identity itself, the
//! local object registry, the remote proxy cache, the pending call table,
//! and the debug toggle. Clients and dispatchers are constructed with an
//! `Arc<HostScope>`, so several simulated hosts can live in one process
//! without any global lookup.
//!
//! ## Invariants
//!
//! - The host id is set at most once.
//! - Proxies can only be made once the host id is set.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::cache::ProxyCache;
use crate::codec;
use crate::error::Result;
use crate::error::StateError;
use crate::pending::PendingCalls;
use crate::registry::Capability;
use crate::registry::LocalRegistry;
use crate::value::Value;

pub struct HostScope {
    host_id: OnceLock<String>,
    debug: AtomicBool,
    registry: LocalRegistry,
    proxies: ProxyCache,
    pending: PendingCalls,
}

impl HostScope {
    pub fn new(host_id: impl Into<String>) -> Arc<Self> {
        Self::with_host_id(OnceLock::from(host_id.into()))
    }

    /// A scope whose identity is provided later with `set_host_id`.
    pub fn unnamed() -> Arc<Self> {
        Self::with_host_id(OnceLock::new())
    }

    fn with_host_id(host_id: OnceLock<String>) -> Arc<Self> {
        Arc::new(Self {
            host_id,
            debug: AtomicBool::new(false),
            registry: LocalRegistry::new(),
            proxies: ProxyCache::new(),
            pending: PendingCalls::new(),
        })
    }

    pub fn set_host_id(&self, host_id: impl Into<String>) -> Result<()> {
        self.host_id
            .set(host_id.into())
            .map_err(|_| StateError::AlreadyConfigured("host id").into())
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.get().map(String::as_str)
    }

    /// Logs every message and dispatch at `info` instead of `debug`.
    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> &LocalRegistry {
        &self.registry
    }

    pub fn proxies(&self) -> &ProxyCache {
        &self.proxies
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Exports `value` and returns it marked for transmission by reference.
    pub fn as_proxy(&self, value: Value) -> Result<Value> {
        codec::as_proxy(self, value)
    }

    /// Unexports whatever is registered under `id`.
    pub fn delete_proxy(&self, id: &str) -> Option<Capability> {
        self.registry.delete(id)
    }
}

impl std::fmt::Debug for HostScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostScope")
            .field("host_id", &self.host_id())
            .field("exports", &self.registry.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
