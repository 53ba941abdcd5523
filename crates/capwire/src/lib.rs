//! # capwire
//!
//! Wire shapes for an object-capability RPC protocol spoken over any duplex
//! channel that can carry JSON frames.
//!
//! ## Architecture
//!
//! Every frame is either a `RequestMessage` (invoke `method` on the export
//! named `objectId`) or a `ReplyMessage` (the outcome of the request named by
//! `idFor`). Arguments and results travel inside `ArgumentEnvelope`s, which
//! either hold plain JSON data or a `ProxyDescriptor` for a live reference.
//!
//! Two export ids are reserved: `main0` is the bootstrap accessor every host
//! exposes, and `main` is the application's entry point.

pub mod descriptor;
pub mod error;
pub mod message;

pub use descriptor::CALL_MEMBER;
pub use descriptor::MemberDescriptor;
pub use descriptor::MemberKind;
pub use descriptor::ProxyDescriptor;
pub use error::Error;
pub use error::Result;
pub use message::ArgumentEnvelope;
pub use message::Message;
pub use message::OBJECT_NOT_FOUND_TRACE;
pub use message::ReplyMessage;
pub use message::RequestMessage;
pub use message::status;

/// Export id of the application's designated entry point.
pub const MAIN_ID: &str = "main";
/// Export id of the bootstrap accessor.
pub const BOOTSTRAP_ID: &str = "main0";
/// The bootstrap accessor's only method: resolve an export id to a proxy.
pub const BOOTSTRAP_METHOD: &str = "getMain";
