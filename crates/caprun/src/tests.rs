use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use capwire::ArgumentEnvelope;
use capwire::CALL_MEMBER;
use capwire::MAIN_ID;
use capwire::MemberDescriptor;
use capwire::MemberKind;
use capwire::Message;
use capwire::ProxyDescriptor;
use capwire::ReplyMessage;
use capwire::RequestMessage;
use serde_json::json;

use crate::codec;
use crate::*;

/// Records everything sent through it.
#[derive(Clone, Default)]
struct Outbox(Arc<Mutex<Vec<Message>>>);

impl Outbox {
    fn replies(&self) -> Vec<ReplyMessage> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|message| match message {
                Message::Reply(reply) => Some(reply.clone()),
                Message::Request(_) => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Sender for Outbox {
    async fn send(&self, message: Message) -> Result<()> {
        self.0.lock().unwrap().push(message);
        Ok(())
    }
}

fn echo() -> Function {
    Function::new(|invocation: Invocation| async move {
        anyhow::Ok(invocation.arg(0).cloned().unwrap_or_else(Value::null))
    })
}

fn descriptor(value: Value) -> ProxyDescriptor {
    match value {
        Value::Proxy(Some(desc)) => desc,
        other => panic!("expected a proxy, got {:?}", other),
    }
}

#[test]
fn test_export_is_idempotent_by_identity() {
    let registry = registry::LocalRegistry::new();
    let f = echo();
    let g = echo();

    let first = registry.export(Capability::Function(f.clone()));
    let again = registry.export(Capability::Function(f.clone()));
    let other = registry.export(Capability::Function(g));

    assert_eq!(first, again);
    assert_ne!(first, other);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_delete_removes_both_directions() {
    let registry = registry::LocalRegistry::new();
    let f = Capability::Function(echo());
    let id = registry.export(f.clone());

    assert!(registry.delete(&id).is_some());
    assert!(registry.lookup(&id).is_none());
    assert!(registry.id_of(&f).is_none());

    // Re-exporting after a delete allocates a new id.
    let fresh = registry.export(f.clone());
    assert_ne!(fresh, id);
    assert_eq!(registry.delete_object(&f), Some(fresh.clone()));
    assert!(registry.lookup(&fresh).is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_fixed_id_replacement() {
    let registry = registry::LocalRegistry::new();
    let old = Capability::Function(echo());
    let new = Capability::Function(echo());

    registry.insert("main", old.clone());
    registry.insert("main", new.clone());

    assert!(registry.id_of(&old).is_none());
    assert_eq!(registry.id_of(&new).as_deref(), Some("main"));
    assert_eq!(registry.export(new), "main");
}

#[test]
fn test_cache_does_not_keep_stand_ins_alive() {
    let cache = cache::ProxyCache::new();
    let f = Capability::Function(echo());

    cache.put("a", "7", &f);
    assert!(cache.get("a", "7").is_some());

    drop(f);
    assert!(cache.get("a", "7").is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_cache_keeps_hosts_apart() {
    let client = Client::new(HostScope::new("a"));
    let from_b = ArgumentEnvelope::Proxy(Some(ProxyDescriptor::callable(MAIN_ID, "b")));
    let from_c = ArgumentEnvelope::Proxy(Some(ProxyDescriptor::callable(MAIN_ID, "c")));

    let b_main = client.from_envelope(from_b).unwrap().into_function().unwrap();
    let c_main = client.from_envelope(from_c).unwrap().into_function().unwrap();

    assert!(!b_main.ptr_eq(&c_main));
    assert_eq!(c_main.remote().map(|d| d.host_id.as_str()), Some("c"));
    assert!(client.scope().proxies().get("b", MAIN_ID).is_some());
    assert!(client.scope().proxies().get("c", MAIN_ID).is_some());
}

#[test]
fn test_scope_construction() {
    assert_eq!(HostScope::new("a").host_id(), Some("a"));
    let err = HostScope::new("a").set_host_id("b").unwrap_err();
    assert!(matches!(err, Error::InvalidState(StateError::AlreadyConfigured("host id"))));
}

#[test]
fn test_host_id_is_set_once() {
    let scope = HostScope::unnamed();
    assert_eq!(scope.host_id(), None);

    scope.set_host_id("a").unwrap();
    let err = scope.set_host_id("b").unwrap_err();
    assert!(matches!(err, Error::InvalidState(StateError::AlreadyConfigured("host id"))));
    assert_eq!(scope.host_id(), Some("a"));
}

#[test]
fn test_as_proxy_needs_host_id() {
    let scope = HostScope::unnamed();
    let err = scope.as_proxy(echo().into()).unwrap_err();
    assert!(matches!(err, Error::InvalidState(StateError::NoHostId)));
}

#[test]
fn test_as_proxy_descriptors() {
    let scope = HostScope::new("a");

    let desc = descriptor(scope.as_proxy(echo().into()).unwrap());
    assert_eq!(desc.host_id, "a");
    assert!(desc.is_callable());

    let object = Object::builder()
        .method("ping", |_| async { anyhow::Ok(Value::from("pong")) })
        .property("name", "svc")
        .build();
    let desc = descriptor(scope.as_proxy(object.into()).unwrap());
    assert_eq!(
        desc.members,
        vec![MemberDescriptor::property("name"), MemberDescriptor::function("ping")]
    );

    let mut map = BTreeMap::new();
    map.insert("cb".to_string(), Value::from(echo()));
    map.insert("n".to_string(), Value::from(1));
    let desc = descriptor(scope.as_proxy(Value::Map(map)).unwrap());
    assert_eq!(desc.members, vec![MemberDescriptor::function("cb"), MemberDescriptor::property("n")]);

    assert!(matches!(scope.as_proxy(Value::null()).unwrap(), Value::Proxy(None)));

    let marked = Value::Proxy(Some(ProxyDescriptor::callable("99", "z")));
    assert_eq!(descriptor(scope.as_proxy(marked).unwrap()).id, "99");
}

#[test]
fn test_shallow_auto_wrapper() {
    let client = Client::new(HostScope::new("a"));
    let wrap = codec::shallow_auto_wrapper();

    assert!(matches!(wrap(&client, Value::from(3)).unwrap(), Value::Data(_)));
    assert!(matches!(wrap(&client, echo().into()).unwrap(), Value::Proxy(Some(_))));
    assert!(matches!(
        wrap(&client, Value::List(vec![Value::from(1), echo().into()])).unwrap(),
        Value::Proxy(Some(_))
    ));
    // Only the top level is inspected.
    let nested = Value::List(vec![Value::List(vec![echo().into()])]);
    assert!(matches!(wrap(&client, nested).unwrap(), Value::List(_)));
}

#[test]
fn test_to_envelope_rejects_live_capabilities() {
    let err = codec::to_envelope(echo().into()).unwrap_err();
    assert!(matches!(err, Error::NotSerializable("function")));

    let nested = Value::List(vec![Value::from(1), Object::builder().build().into()]);
    assert!(matches!(codec::to_envelope(nested), Err(Error::NotSerializable("object"))));

    let envelope = codec::to_envelope(Value::List(vec![Value::from(1), Value::from("x")])).unwrap();
    assert_eq!(envelope, ArgumentEnvelope::Data(json!([1, "x"])));
}

#[test]
fn test_local_descriptor_resolves_to_original() {
    let scope = HostScope::new("a");
    let client = Client::new(scope.clone());
    let f = echo();

    let envelope = codec::to_envelope(scope.as_proxy(f.clone().into()).unwrap()).unwrap();
    let back = client.from_envelope(envelope).unwrap();

    assert!(back.as_function().unwrap().ptr_eq(&f));
}

#[test]
fn test_unknown_local_descriptor() {
    let client = Client::new(HostScope::new("a"));
    let envelope = ArgumentEnvelope::Proxy(Some(ProxyDescriptor::callable("424242", "a")));
    assert!(matches!(client.from_envelope(envelope), Err(Error::ObjectNotFound(id)) if id == "424242"));
}

#[test]
fn test_remote_materialization_is_cached_weakly() {
    let client = Client::new(HostScope::new("b"));
    let envelope = ArgumentEnvelope::Proxy(Some(ProxyDescriptor::callable("5", "a")));

    let first = client.from_envelope(envelope.clone()).unwrap().into_function().unwrap();
    let second = client.from_envelope(envelope.clone()).unwrap().into_function().unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(first.remote().map(|d| d.id.as_str()), Some("5"));

    drop(first);
    drop(second);
    assert!(client.scope().proxies().get("a", "5").is_none());

    let third = client.from_envelope(envelope).unwrap().into_function().unwrap();
    assert_eq!(third.remote().map(|d| d.host_id.as_str()), Some("a"));
}

#[test]
fn test_callable_collapse() {
    let client = Client::new(HostScope::new("b"));

    let callable = client
        .from_envelope(ArgumentEnvelope::Proxy(Some(ProxyDescriptor::callable("1", "a"))))
        .unwrap();
    assert!(callable.is_callable());

    let object = client
        .from_envelope(ArgumentEnvelope::Proxy(Some(ProxyDescriptor {
            id: "2".into(),
            host_id: "a".into(),
            members: vec![MemberDescriptor::function(CALL_MEMBER), MemberDescriptor::function("stop")],
        })))
        .unwrap()
        .into_object()
        .unwrap();
    assert!(object.member(CALL_MEMBER).is_some());
    assert!(object.member("stop").is_some());
}

#[test]
fn test_unsupported_member_kind() {
    let client = Client::new(HostScope::new("b"));
    let envelope = ArgumentEnvelope::Proxy(Some(ProxyDescriptor {
        id: "3".into(),
        host_id: "a".into(),
        members: vec![MemberDescriptor { name: "on".into(), kind: MemberKind::Other("event".into()) }],
    }));

    let err = client.from_envelope(envelope).unwrap_err();
    assert!(matches!(err, Error::UnsupportedMember { ref name, ref kind } if name == "on" && kind == "event"));
}

#[test]
fn test_stand_in_goes_home_with_its_descriptor() {
    let client = Client::new(HostScope::new("b"));
    let desc = ProxyDescriptor::callable("8", "a");
    let stand_in = client.from_envelope(ArgumentEnvelope::Proxy(Some(desc.clone()))).unwrap();

    let again = codec::as_proxy_for(&client, stand_in).unwrap();
    assert_eq!(descriptor(again), desc);
    assert_eq!(client.scope().registry().len(), 0);
}

#[test]
fn test_stand_in_is_exported_for_other_connections() {
    let scope = HostScope::new("b");
    let from_a = Client::new(scope.clone());
    let to_c = Client::new(scope.clone());
    let stand_in = from_a
        .from_envelope(ArgumentEnvelope::Proxy(Some(ProxyDescriptor::callable("8", "a"))))
        .unwrap();

    let relayed = descriptor(codec::as_proxy_for(&to_c, stand_in.clone()).unwrap());
    assert_eq!(relayed.host_id, "b");
    assert!(scope.registry().lookup(&relayed.id).is_some());

    // Explicit proxying exports too, under the same id.
    assert_eq!(descriptor(scope.as_proxy(stand_in).unwrap()).id, relayed.id);
}

#[test]
fn test_sender_configuration() {
    let client = Client::new(HostScope::new("a"));
    assert!(matches!(client.sender(), Err(Error::InvalidState(StateError::NotConfigured("sender")))));

    client.set_sender(Outbox::default()).unwrap();
    let err = client.set_sender(Outbox::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidState(StateError::AlreadyConfigured("sender"))));
}

#[tokio::test]
async fn test_send_without_sender_leaves_nothing_pending() {
    let client = Client::new(HostScope::new("a"));
    let err = client.call("main", "x", vec![]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(StateError::NotConfigured("sender"))));
    assert!(client.scope().pending().is_empty());
}

#[tokio::test]
async fn test_close_fails_calls_in_flight() {
    let client = Client::new(HostScope::new("a"));
    let outbox = Outbox::default();
    client.set_sender(outbox.clone()).unwrap();

    let waiting = tokio::spawn({
        let client = client.clone();
        async move { client.call("main", "x", vec![]).await }
    });
    while outbox.0.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }

    client.close();
    assert!(matches!(waiting.await.unwrap(), Err(Error::ChannelClosed)));
    assert!(client.scope().pending().is_empty());

    let err = client.call("main", "x", vec![]).await.unwrap_err();
    assert!(matches!(err, Error::ChannelClosed));
    assert!(client.scope().pending().is_empty());
}

#[tokio::test]
async fn test_identity_wrapper_refuses_bare_callbacks() {
    let client = Client::new(HostScope::new("a"));
    client.set_sender(Outbox::default()).unwrap();
    client.set_args_auto_wrapper(codec::no_auto_wrapper());

    let err = client.call("main", "x", vec![echo().into()]).await.unwrap_err();
    assert!(matches!(err, Error::NotSerializable("function")));
}

#[tokio::test]
async fn test_object_call_and_property() {
    let object = Object::builder()
        .method("add", |invocation: Invocation| async move {
            let a: i64 = invocation.data(0)?;
            let b: i64 = invocation.data(1)?;
            anyhow::Ok(Value::from(a + b))
        })
        .property("version", 2)
        .build();

    assert_eq!(object.call("add", vec![1.into(), 2.into()]).await.unwrap().as_i64(), Some(3));
    assert_eq!(object.get("version").await.unwrap().as_i64(), Some(2));
    assert!(matches!(object.call("nope", vec![]).await, Err(Error::MissingMember(_))));
}

#[tokio::test]
async fn test_handler_errors_keep_their_type() {
    let f = Function::new(|_| async { Err::<Value, _>(anyhow::Error::new(Error::ObjectNotFound("x".into()))) });
    assert!(matches!(f.call(vec![]).await, Err(Error::ObjectNotFound(_))));

    let g = Function::new(|_| async { Err::<Value, _>(anyhow::anyhow!("boom")) });
    assert!(matches!(g.call(vec![]).await, Err(Error::Invocation(msg)) if msg == "boom"));
}

#[test]
fn test_invocation_helpers() {
    let invocation = Invocation::new(vec![Value::from(4), Value::null()]);

    assert_eq!(invocation.data::<u8>(0).unwrap(), 4);
    assert_eq!(invocation.data::<Option<u8>>(5).unwrap(), None);
    let err = invocation.function(1).unwrap_err();
    assert!(matches!(err, Error::UnexpectedValue { expected: "function", found: "null" }));
}

fn request(object_id: &str, method: &str, args: Vec<ArgumentEnvelope>) -> Message {
    Message::Request(RequestMessage {
        id: id::next_id(),
        object_id: object_id.into(),
        method: method.into(),
        args,
    })
}

#[tokio::test]
async fn test_request_for_unknown_object() {
    let dispatcher = Dispatcher::new(HostScope::new("b"));
    let outbox = Outbox::default();
    let client = Client::new(dispatcher.scope().clone());
    client.set_sender(outbox.clone()).unwrap();

    dispatcher.on_receive_message(request("nope", "x", vec![]), &client).await;

    let replies = outbox.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].status, 100);
    assert_eq!(replies[0].trace.as_deref(), Some("object not found"));
}

#[tokio::test]
async fn test_request_for_missing_member() {
    let dispatcher = Dispatcher::new(HostScope::new("b"));
    dispatcher.set_main(Object::builder().method("ping", |_| async { anyhow::Ok(Value::null()) }).build()).unwrap();
    let outbox = Outbox::default();
    let client = Client::new(dispatcher.scope().clone());
    client.set_sender(outbox.clone()).unwrap();

    dispatcher.on_receive_message(request("main", "pong", vec![]), &client).await;

    let replies = outbox.replies();
    assert_eq!(replies[0].status, -1);
    assert!(replies[0].trace.as_deref().unwrap().contains("pong"));
}

#[tokio::test]
async fn test_bootstrap_answers_with_proxy() {
    let dispatcher = Dispatcher::new(HostScope::new("b"));
    dispatcher.set_main(echo()).unwrap();
    let outbox = Outbox::default();
    let client = Client::new(dispatcher.scope().clone());
    client.set_sender(outbox.clone()).unwrap();

    let lookup = |id: &str| request("main0", "getMain", vec![ArgumentEnvelope::Data(json!(id))]);
    dispatcher.on_receive_message(lookup("main"), &client).await;
    dispatcher.on_receive_message(lookup("missing"), &client).await;

    let replies = outbox.replies();
    assert_eq!(
        replies[0].data,
        Some(ArgumentEnvelope::Proxy(Some(ProxyDescriptor::callable("main", "b"))))
    );
    assert_eq!(replies[1].status, 200);
    assert_eq!(replies[1].data, Some(ArgumentEnvelope::Data(serde_json::Value::Null)));
}

#[tokio::test]
async fn test_stale_reply_is_ignored() {
    let dispatcher = Dispatcher::new(HostScope::new("a"));
    let outbox = Outbox::default();
    let client = Client::new(dispatcher.scope().clone());
    client.set_sender(outbox.clone()).unwrap();

    let reply = ReplyMessage::ok("1", "never-sent", ArgumentEnvelope::Data(json!(1)));
    dispatcher.on_receive_message(Message::Reply(reply), &client).await;

    assert!(outbox.0.lock().unwrap().is_empty());
    assert!(dispatcher.scope().pending().is_empty());
}

#[test]
fn test_context_is_shared_between_clones() {
    let context = Context::new();
    let view = context.clone();

    context.insert("a", "mike");
    assert_eq!(view.get("a").unwrap().as_str(), Some("mike"));
    assert_eq!(view.remove("a").unwrap().as_str(), Some("mike"));
    assert!(context.is_empty());
}
