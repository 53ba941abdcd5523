//! # Local Object Registry
//!
//! Export id to strongly held capability, plus the reverse map from
//! capability identity to id.
//!
//! ## Invariants
//!
//! - Exporting the same identity twice returns the same id.
//! - Two distinct exports never share an id.
//! - `delete` removes both directions under one lock.
//! - Identities are allocation addresses. The registry holds a strong
//!   reference to every registered capability, so an address can not be
//!   reused while it is still mapped.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use capwire::CALL_MEMBER;
use capwire::MemberDescriptor;
use capwire::ProxyDescriptor;

use crate::error::Error;
use crate::error::Result;
use crate::id::next_id;
use crate::value::Function;
use crate::value::Object;
use crate::value::Value;

/// Something that can be exported.
#[derive(Clone, Debug)]
pub enum Capability {
    Function(Function),
    Object(Object),
}

impl Capability {
    /// Exportable form of a value. Lists and maps become objects whose
    /// members are their entries; other plain data becomes an opaque object
    /// with no members.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Function(function) => Ok(Self::Function(function)),
            Value::Object(object) => Ok(Self::Object(object)),
            Value::List(items) => Ok(Self::Object(Object::from_entries(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), item)),
            ))),
            Value::Map(entries) => Ok(Self::Object(Object::from_entries(entries))),
            Value::Data(data) if !data.is_null() => Ok(Self::Object(Object::builder().build())),
            other => Err(Error::UnexpectedValue { expected: "exportable value", found: other.kind() }),
        }
    }

    pub(crate) fn addr(&self) -> usize {
        match self {
            Self::Function(function) => function.addr(),
            Self::Object(object) => object.addr(),
        }
    }

    /// The descriptor a stand-in was materialized from.
    pub fn remote(&self) -> Option<&ProxyDescriptor> {
        match self {
            Self::Function(function) => function.remote(),
            Self::Object(object) => object.remote(),
        }
    }

    /// The connection a stand-in forwards over.
    pub(crate) fn connection(&self) -> Option<u64> {
        match self {
            Self::Function(function) => function.connection(),
            Self::Object(object) => object.connection(),
        }
    }

    /// The invocable surface advertised in a proxy descriptor.
    pub fn members(&self) -> Vec<MemberDescriptor> {
        match self {
            Self::Function(_) => vec![MemberDescriptor::function(CALL_MEMBER)],
            Self::Object(object) => object.members(),
        }
    }

    /// Resolves the callable behind `name`. For a bare function only
    /// `__call__` exists.
    pub fn member(&self, name: &str) -> Result<Function> {
        let found = match self {
            Self::Function(function) if name == CALL_MEMBER => Some(function.clone()),
            Self::Function(_) => None,
            Self::Object(object) => object.member(name).cloned(),
        };
        found.ok_or_else(|| Error::MissingMember(name.to_string()))
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Function(function) => Value::Function(function),
            Self::Object(object) => Value::Object(object),
        }
    }
}

#[derive(Default)]
struct Tables {
    by_id: HashMap<String, Capability>,
    by_addr: HashMap<usize, String>,
}

#[derive(Default)]
pub struct LocalRegistry {
    tables: Mutex<Tables>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exports `capability`, reusing its id if it is already registered.
    pub fn export(&self, capability: Capability) -> String {
        let addr = capability.addr();
        let mut tables = self.tables();
        if let Some(id) = tables.by_addr.get(&addr) {
            return id.clone();
        }

        let id = next_id();
        tables.by_addr.insert(addr, id.clone());
        tables.by_id.insert(id.clone(), capability);
        id
    }

    /// Registers under a fixed id, replacing whatever held it before. The
    /// reverse map points at the most recent id for an identity.
    pub fn insert(&self, id: impl Into<String>, capability: Capability) {
        let id = id.into();
        let addr = capability.addr();
        let mut tables = self.tables();

        if let Some(previous) = tables.by_id.insert(id.clone(), capability) {
            let previous_addr = previous.addr();
            if tables.by_addr.get(&previous_addr) == Some(&id) {
                tables.by_addr.remove(&previous_addr);
            }
        }
        tables.by_addr.insert(addr, id);
    }

    pub fn lookup(&self, id: &str) -> Option<Capability> {
        self.tables().by_id.get(id).cloned()
    }

    pub fn id_of(&self, capability: &Capability) -> Option<String> {
        self.tables().by_addr.get(&capability.addr()).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tables().by_id.contains_key(id)
    }

    /// Unexports `id`, releasing the registry's ownership.
    pub fn delete(&self, id: &str) -> Option<Capability> {
        let mut tables = self.tables();
        let removed = tables.by_id.remove(id)?;
        let addr = removed.addr();
        if tables.by_addr.get(&addr).map(String::as_str) == Some(id) {
            tables.by_addr.remove(&addr);
        }
        Some(removed)
    }

    /// Unexports by identity. Returns the id it was registered under.
    pub fn delete_object(&self, capability: &Capability) -> Option<String> {
        let mut tables = self.tables();
        let id = tables.by_addr.remove(&capability.addr())?;
        tables.by_id.remove(&id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.tables().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
