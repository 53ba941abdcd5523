//! # Protocol Messages
//!
//! Defines the request/reply envelope shapes and the argument envelope that
//! wraps every argument and result.
//!
//! ## Invariants
//! - A frame carrying a non-null `idFor` is a reply; every other frame is a request.
//! - Replies are correlated by `idFor` only, never by arrival order.
//! - Decoding never panics on unexpected input; it returns `Error`.

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;

use crate::descriptor::ProxyDescriptor;
use crate::error::Error;
use crate::error::Result;

/// Reply status codes.
pub mod status {
    /// The call succeeded and `data` holds the result.
    pub const OK: i32 = 200;
    /// The request targeted an id with no export behind it.
    pub const OBJECT_NOT_FOUND: i32 = 100;
    /// The target ran and failed; `trace` describes the failure.
    pub const INVOCATION_FAILED: i32 = -1;
}

/// Trace text sent with `status::OBJECT_NOT_FOUND`.
pub const OBJECT_NOT_FOUND_TRACE: &str = "object not found";

/// A call argument or result, tagged so the receiver can tell plain data
/// from a capability reference without inspecting the value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ArgumentEnvelope {
    Data(serde_json::Value),
    /// `None` is the null descriptor: an absent object, passed through as such.
    Proxy(Option<ProxyDescriptor>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub id: String,
    #[serde(rename = "objectId")]
    pub object_id: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<ArgumentEnvelope>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub id: String,
    #[serde(rename = "idFor")]
    pub id_for: String,
    pub status: i32,
    pub trace: Option<String>,
    pub data: Option<ArgumentEnvelope>,
}

impl ReplyMessage {
    /// A successful reply carrying `data`.
    pub fn ok(id: impl Into<String>, id_for: impl Into<String>, data: ArgumentEnvelope) -> Self {
        Self {
            id: id.into(),
            id_for: id_for.into(),
            status: status::OK,
            trace: None,
            data: Some(data),
        }
    }

    /// A failed reply. The data slot carries a null data envelope.
    pub fn failure(
        id: impl Into<String>,
        id_for: impl Into<String>,
        status: i32,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            id_for: id_for.into(),
            status,
            trace: Some(trace.into()),
            data: Some(ArgumentEnvelope::Data(serde_json::Value::Null)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == status::OK
    }
}

/// Any frame travelling between two hosts.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawMessage")]
pub enum Message {
    Request(RequestMessage),
    Reply(ReplyMessage),
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Self::Request(request) => &request.id,
            Self::Reply(reply) => &reply.id,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply(_))
    }

    /// Encodes the message as a JSON frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a JSON frame, classifying it by the presence of `idFor`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Request(request) => request.serialize(serializer),
            Self::Reply(reply) => reply.serialize(serializer),
        }
    }
}

impl From<RequestMessage> for Message {
    fn from(request: RequestMessage) -> Self {
        Self::Request(request)
    }
}

impl From<ReplyMessage> for Message {
    fn from(reply: ReplyMessage) -> Self {
        Self::Reply(reply)
    }
}

/// Union of every field either message kind may carry.
#[derive(Deserialize)]
struct RawMessage {
    id: String,
    #[serde(rename = "idFor")]
    id_for: Option<String>,
    #[serde(rename = "objectId")]
    object_id: Option<String>,
    method: Option<String>,
    args: Option<Vec<ArgumentEnvelope>>,
    status: Option<i32>,
    trace: Option<String>,
    data: Option<ArgumentEnvelope>,
}

impl TryFrom<RawMessage> for Message {
    type Error = Error;

    fn try_from(raw: RawMessage) -> Result<Self> {
        let Some(id_for) = raw.id_for else {
            let object_id = raw.object_id.ok_or_else(|| missing("request", "objectId"))?;
            let method = raw.method.ok_or_else(|| missing("request", "method"))?;
            return Ok(Self::Request(RequestMessage {
                id: raw.id,
                object_id,
                method,
                args: raw.args.unwrap_or_default(),
            }));
        };

        Ok(Self::Reply(ReplyMessage {
            id: raw.id,
            id_for,
            status: raw.status.ok_or_else(|| missing("reply", "status"))?,
            trace: raw.trace,
            data: raw.data,
        }))
    }
}

fn missing(kind: &str, field: &str) -> Error {
    Error::ProtocolViolation(format!("{} without '{}'", kind, field))
}
