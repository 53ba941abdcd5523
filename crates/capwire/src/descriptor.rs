//! # Capability Descriptors
//!
//! A `ProxyDescriptor` is the wire form of a live reference: the export id,
//! the host that owns the export, and the surface a peer may invoke on it.
//!
//! ## Invariants
//!
//! - A descriptor whose only member is `__call__` of kind `function` names a
//!   bare callable, not an object with a method called `__call__`.
//! - Unknown member kinds survive decoding as `MemberKind::Other` so the
//!   runtime can reject them with a precise error instead of failing the
//!   whole frame.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Member name used when the exported value itself is the callable.
pub const CALL_MEMBER: &str = "__call__";

/// The kind of an invocable member.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Function,
    Property,
    /// A kind this protocol version does not understand.
    Other(String),
}

impl MemberKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Function => "function",
            Self::Property => "property",
            Self::Other(kind) => kind,
        }
    }
}

impl Serialize for MemberKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MemberKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        Ok(match kind.as_str() {
            "function" => Self::Function,
            "property" => Self::Property,
            _ => Self::Other(kind),
        })
    }
}

/// One entry of a descriptor's invocable surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MemberKind,
}

impl MemberDescriptor {
    pub fn function(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: MemberKind::Function }
    }

    pub fn property(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: MemberKind::Property }
    }
}

/// Wire-level capability reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub id: String,
    #[serde(rename = "hostId")]
    pub host_id: String,
    pub members: Vec<MemberDescriptor>,
}

impl ProxyDescriptor {
    /// Describes an export that is itself directly callable.
    pub fn callable(id: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host_id: host_id.into(),
            members: vec![MemberDescriptor::function(CALL_MEMBER)],
        }
    }

    /// True when the members are exactly `[__call__: function]`.
    pub fn is_callable(&self) -> bool {
        matches!(
            self.members.as_slice(),
            [only] if only.name == CALL_MEMBER && only.kind == MemberKind::Function
        )
    }
}
