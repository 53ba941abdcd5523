//! # Argument and Result Codec
//!
//! Moves `Value`s across the wire.
//!
//! Encoding is two steps. An auto-wrap policy first decides which values
//! travel by reference and turns them into `Value::Proxy` with `as_proxy`.
//! Then `to_envelope` turns a proxy marker into a proxy envelope and
//! everything else into a data envelope.
//!
//! Decoding resolves a proxy envelope in this order:
//!
//! 1. Descriptor owned by this host: the original export from the local
//!    registry, so identity survives a round trip.
//! 2. A live stand-in already cached for the remote host and id.
//! 3. A freshly materialized stand-in, cached weakly before it is returned.
//!
//! ## Invariants
//!
//! - A descriptor whose only member is `__call__` materializes to a
//!   `Function`, never to an object with a `__call__` method.
//! - A stand-in headed back over the connection it forwards through keeps
//!   the descriptor it came from, so its owner resolves the original. Sent
//!   anywhere else it is exported like any local value, and this host relays
//!   the calls; a third host can never receive a descriptor that names an
//!   export it cannot reach.

use std::sync::Arc;

use capwire::ArgumentEnvelope;
use capwire::CALL_MEMBER;
use capwire::MemberKind;
use capwire::ProxyDescriptor;

use crate::client::Client;
use crate::error::Error;
use crate::error::Result;
use crate::error::StateError;
use crate::registry::Capability;
use crate::scope::HostScope;
use crate::value::Function;
use crate::value::Invocation;
use crate::value::Object;
use crate::value::Remote;
use crate::value::Value;

/// Decides, per argument or result leaving over `client`, what is sent by
/// reference.
pub type AutoWrapper = Arc<dyn Fn(&Client, Value) -> Result<Value> + Send + Sync>;

/// Proxies functions, objects, and lists or maps holding at least one
/// callable. Only the top level is inspected.
pub fn shallow_auto_wrapper() -> AutoWrapper {
    Arc::new(|client: &Client, value: Value| {
        let by_reference = matches!(value, Value::Function(_) | Value::Object(_))
            || value.contains_callable();
        if by_reference { as_proxy_for(client, value) } else { Ok(value) }
    })
}

/// Leaves every value as it is. Anything live must then be proxied by hand.
pub fn no_auto_wrapper() -> AutoWrapper {
    Arc::new(|_: &Client, value: Value| Ok(value))
}

/// Exports `value` in `scope` and returns its proxy marker. Stand-ins are
/// exported too; see `as_proxy_for` for handing one back to its owner.
pub fn as_proxy(scope: &HostScope, value: Value) -> Result<Value> {
    let host_id = scope.host_id().ok_or(StateError::NoHostId)?;

    if matches!(value, Value::Proxy(_)) {
        return Ok(value);
    }
    if value.is_null() {
        return Ok(Value::Proxy(None));
    }

    let capability = Capability::from_value(value)?;
    let members = capability.members();
    let id = scope.registry().export(capability);
    Ok(Value::Proxy(Some(ProxyDescriptor {
        id,
        host_id: host_id.to_string(),
        members,
    })))
}

/// `as_proxy` for a value about to leave over `client`. A stand-in that
/// forwards over that same connection points at the receiving host, so its
/// original descriptor goes out unchanged.
pub fn as_proxy_for(client: &Client, value: Value) -> Result<Value> {
    let connection = Some(client.connection());
    let homeward = match &value {
        Value::Function(function) if function.connection() == connection => function.remote().cloned(),
        Value::Object(object) if object.connection() == connection => object.remote().cloned(),
        _ => None,
    };

    match homeward {
        Some(descriptor) => {
            client.scope().host_id().ok_or(StateError::NoHostId)?;
            Ok(Value::Proxy(Some(descriptor)))
        }
        None => as_proxy(client.scope(), value),
    }
}

pub fn to_envelope(value: Value) -> Result<ArgumentEnvelope> {
    match value {
        Value::Proxy(descriptor) => Ok(ArgumentEnvelope::Proxy(descriptor)),
        other => Ok(ArgumentEnvelope::Data(other.into_json()?)),
    }
}

/// Decodes an envelope, resolving references against `client`'s scope.
/// Stand-ins forward their calls through `client`.
pub fn from_envelope(envelope: ArgumentEnvelope, client: &Client) -> Result<Value> {
    match envelope {
        ArgumentEnvelope::Data(data) => Ok(Value::Data(data)),
        ArgumentEnvelope::Proxy(None) => Ok(Value::null()),
        ArgumentEnvelope::Proxy(Some(descriptor)) => resolve(descriptor, client),
    }
}

fn resolve(descriptor: ProxyDescriptor, client: &Client) -> Result<Value> {
    let scope = client.scope();

    if scope.host_id() == Some(descriptor.host_id.as_str()) {
        return scope
            .registry()
            .lookup(&descriptor.id)
            .map(Capability::into_value)
            .ok_or(Error::ObjectNotFound(descriptor.id));
    }

    let host_id = descriptor.host_id.clone();
    let id = descriptor.id.clone();
    let stand_in = scope
        .proxies()
        .get_or_materialize(&host_id, &id, || materialize(descriptor, client))?;
    Ok(stand_in.into_value())
}

/// Builds a stand-in whose members forward to the remote export through
/// `client`.
pub fn materialize(descriptor: ProxyDescriptor, client: &Client) -> Result<Capability> {
    if let Some(member) = descriptor
        .members
        .iter()
        .find(|member| matches!(member.kind, MemberKind::Other(_)))
    {
        return Err(Error::UnsupportedMember {
            name: member.name.clone(),
            kind: member.kind.as_str().to_string(),
        });
    }

    let connection = client.connection();
    if descriptor.is_callable() {
        let function = forwarder(client, &descriptor.id, CALL_MEMBER)
            .into_stand_in(Remote { descriptor, connection });
        return Ok(Capability::Function(function));
    }

    let builder = descriptor.members.iter().fold(Object::builder(), |builder, member| {
        let function = forwarder(client, &descriptor.id, &member.name);
        builder.member(member.name.clone(), member.kind.clone(), function)
    });
    Ok(Capability::Object(builder.build_stand_in(Remote { descriptor, connection })))
}

fn forwarder(client: &Client, object_id: &str, method: &str) -> Function {
    let client = client.clone();
    let object_id = object_id.to_string();
    let method = method.to_string();

    Function::new(move |invocation: Invocation| {
        let client = client.clone();
        let object_id = object_id.clone();
        let method = method.clone();
        async move { anyhow::Ok(client.call(&object_id, &method, invocation.into_args()).await?) }
    })
}
