//! # caprun
//!
//! A bidirectional object-capability RPC runtime. Either side of a
//! connection can export functions and objects, hand references to them to
//! the other side, and call whatever it has been handed. Capabilities
//! passed as arguments or results travel as proxy descriptors, and come out
//! the other end as stand-ins that forward their calls back.
//!
//! ## Architecture
//!
//! - `HostScope` owns one host's identity, export registry, proxy cache and
//!   pending calls.
//! - `Client` originates calls; `Dispatcher` serves them and routes replies.
//! - `codec` decides what travels by value and what by reference.
//! - `Peer` runs a dispatcher over any byte `Transport`; `connect_loopback`
//!   wires two in-process hosts together without one.

pub mod cache;
pub mod client;
pub mod codec;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod id;
pub mod interceptor;
pub mod memory_transport;
pub mod peer;
pub mod pending;
pub mod registry;
pub mod scope;
pub mod sender;
pub mod transport;
pub mod value;

pub use client::Client;
pub use codec::AutoWrapper;
pub use context::Context;
pub use dispatcher::Dispatcher;
pub use error::Error;
pub use error::Result;
pub use error::StateError;
pub use interceptor::Interceptor;
pub use interceptor::Next;
pub use memory_transport::MemoryTransport;
pub use peer::Peer;
pub use registry::Capability;
pub use scope::HostScope;
pub use sender::LoopbackSender;
pub use sender::Sender;
pub use sender::connect_loopback;
pub use transport::Transport;
pub use value::Function;
pub use value::Invocation;
pub use value::Object;
pub use value::ObjectBuilder;
pub use value::Value;

#[cfg(test)]
mod tests;
