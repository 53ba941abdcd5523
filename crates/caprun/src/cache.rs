//! # Remote Proxy Cache
//!
//! Remote export to the stand-in materialized for it. Entries are keyed by
//! the owning host and the export id together: every host numbers its own
//! exports, and every host calls its entry point `main`.
//!
//! Entries are weak: the cache never keeps a stand-in alive. A miss after a
//! `put` means the stand-in was dropped, and the caller materializes a fresh
//! one.

use std::sync::Weak;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::Result;
use crate::registry::Capability;
use crate::value::Function;
use crate::value::FunctionInner;
use crate::value::Object;
use crate::value::ObjectInner;

enum WeakCapability {
    Function(Weak<FunctionInner>),
    Object(Weak<ObjectInner>),
}

impl WeakCapability {
    fn new(capability: &Capability) -> Self {
        match capability {
            Capability::Function(function) => Self::Function(function.downgrade()),
            Capability::Object(object) => Self::Object(object.downgrade()),
        }
    }

    fn upgrade(&self) -> Option<Capability> {
        match self {
            Self::Function(weak) => Function::upgrade(weak).map(Capability::Function),
            Self::Object(weak) => Object::upgrade(weak).map(Capability::Object),
        }
    }

    fn is_dead(&self) -> bool {
        match self {
            Self::Function(weak) => weak.strong_count() == 0,
            Self::Object(weak) => weak.strong_count() == 0,
        }
    }
}

type Key = (String, String);

fn key(host_id: &str, id: &str) -> Key {
    (host_id.to_string(), id.to_string())
}

#[derive(Default)]
pub struct ProxyCache {
    entries: DashMap<Key, WeakCapability>,
}

impl ProxyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live stand-in for export `id` of `host_id`, if any. Dead entries
    /// are pruned on the way.
    pub fn get(&self, host_id: &str, id: &str) -> Option<Capability> {
        let key = key(host_id, id);
        let live = self.entries.get(&key).and_then(|entry| entry.upgrade());
        if live.is_none() {
            self.entries.remove_if(&key, |_, entry| entry.is_dead());
        }
        live
    }

    pub fn put(&self, host_id: &str, id: &str, stand_in: &Capability) {
        self.entries.insert(key(host_id, id), WeakCapability::new(stand_in));
    }

    /// The live stand-in for the export, or the one `materialize` builds.
    /// The entry stays locked meanwhile, so concurrent decodes of one
    /// descriptor agree on a single stand-in.
    pub fn get_or_materialize(
        &self,
        host_id: &str,
        id: &str,
        materialize: impl FnOnce() -> Result<Capability>,
    ) -> Result<Capability> {
        match self.entries.entry(key(host_id, id)) {
            Entry::Occupied(mut entry) => {
                if let Some(live) = entry.get().upgrade() {
                    return Ok(live);
                }
                let stand_in = materialize()?;
                entry.insert(WeakCapability::new(&stand_in));
                Ok(stand_in)
            }
            Entry::Vacant(entry) => {
                let stand_in = materialize()?;
                entry.insert(WeakCapability::new(&stand_in));
                Ok(stand_in)
            }
        }
    }

    /// Entry count, dead ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
