//! # Values and Capabilities
//!
//! `Value` is everything that can be passed to or returned from a call. It is
//! an exhaustive sum, so deciding what must travel as a proxy and what can
//! travel as plain data is a match, not a runtime guess.
//!
//! Live references come in two shapes:
//!
//! - `Function`: a single async callable.
//! - `Object`: an explicitly registered table of named members. Members are
//!   either methods or properties (zero-argument getters).
//!
//! Both are cheap shared handles whose identity is their allocation. A
//! stand-in for a remote export is an ordinary `Function`/`Object` whose
//! handlers forward over a `Client`, and which remembers the descriptor it
//! was materialized from and the connection it forwards over.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::Weak;

use capwire::MemberDescriptor;
use capwire::MemberKind;
use capwire::ProxyDescriptor;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::Error;
use crate::error::Result;

pub(crate) type Handler =
    Arc<dyn Fn(Invocation) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// The far end of a stand-in.
#[derive(Clone)]
pub(crate) struct Remote {
    pub(crate) descriptor: ProxyDescriptor,
    /// The `Client::connection` its calls travel over.
    pub(crate) connection: u64,
}

/// A call argument or result.
#[derive(Clone)]
pub enum Value {
    /// Plain JSON data.
    Data(serde_json::Value),
    Function(Function),
    Object(Object),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Marked for transmission as a capability reference. `None` is the null
    /// descriptor.
    Proxy(Option<ProxyDescriptor>),
}

impl Value {
    pub fn null() -> Self {
        Self::Data(serde_json::Value::Null)
    }

    /// Serializes any serde value into plain data.
    pub fn data<T: Serialize>(value: T) -> Result<Self> {
        Ok(Self::Data(serde_json::to_value(value)?))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(serde_json::Value::Null) => "null",
            Self::Data(_) => "data",
            Self::Function(_) => "function",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Proxy(_) => "proxy",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Data(serde_json::Value::Null))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// True for a list or map holding at least one callable element.
    pub fn contains_callable(&self) -> bool {
        match self {
            Self::List(items) => items.iter().any(Value::is_callable),
            Self::Map(entries) => entries.values().any(Value::is_callable),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Data(value) => value.as_str(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Data(value) => value.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Data(value) => value.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Data(value) => value.as_bool(),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn into_function(self) -> Result<Function> {
        match self {
            Self::Function(function) => Ok(function),
            other => Err(Error::UnexpectedValue { expected: "function", found: other.kind() }),
        }
    }

    pub fn into_object(self) -> Result<Object> {
        match self {
            Self::Object(object) => Ok(object),
            other => Err(Error::UnexpectedValue { expected: "object", found: other.kind() }),
        }
    }

    /// Converts to JSON. Fails if a live capability or proxy marker is found
    /// anywhere inside.
    pub fn into_json(self) -> Result<serde_json::Value> {
        match self {
            Self::Data(value) => Ok(value),
            Self::List(items) => {
                let items = items
                    .into_iter()
                    .map(Value::into_json)
                    .collect::<Result<Vec<_>>>()?;
                Ok(serde_json::Value::Array(items))
            }
            Self::Map(entries) => {
                let entries = entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, value.into_json()?)))
                    .collect::<Result<serde_json::Map<_, _>>>()?;
                Ok(serde_json::Value::Object(entries))
            }
            other => Err(Error::NotSerializable(other.kind())),
        }
    }

    /// Deserializes plain data into `T`.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_json()?)?)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(value) => write!(f, "Data({})", value),
            Self::Function(function) => fmt::Debug::fmt(function, f),
            Self::Object(object) => fmt::Debug::fmt(object, f),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Self::Proxy(desc) => f.debug_tuple("Proxy").field(desc).finish(),
        }
    }
}

macro_rules! impl_from_data {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Data(serde_json::Value::from(value))
                }
            }
        )*
    };
}

impl_from_data!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, String, &str, ());

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Data(value)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

/// What a handler receives: the decoded arguments and, for with-context
/// dispatch, the per-call interceptor context.
pub struct Invocation {
    args: Vec<Value>,
    context: Option<Context>,
}

impl Invocation {
    pub fn new(args: Vec<Value>) -> Self {
        Self { args, context: None }
    }

    pub fn with_context(context: Context, args: Vec<Value>) -> Self {
        Self { args, context: Some(context) }
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Deserializes argument `index`. A missing argument reads as null.
    pub fn data<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        self.arg(index).cloned().unwrap_or_else(Value::null).parse()
    }

    /// Argument `index` as a callable. Missing or null arguments are errors.
    pub fn function(&self, index: usize) -> Result<Function> {
        self.arg(index).cloned().unwrap_or_else(Value::null).into_function()
    }

    pub fn object(&self, index: usize) -> Result<Object> {
        self.arg(index).cloned().unwrap_or_else(Value::null).into_object()
    }
}

/// A shared async callable.
#[derive(Clone)]
pub struct Function {
    inner: Arc<FunctionInner>,
}

pub(crate) struct FunctionInner {
    handler: Handler,
    remote: Option<Remote>,
}

impl Function {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |invocation: Invocation| -> BoxFuture<'static, anyhow::Result<Value>> {
                Box::pin(f(invocation))
            },
        );
        Self::from_parts(handler, None)
    }

    fn from_parts(handler: Handler, remote: Option<Remote>) -> Self {
        Self { inner: Arc::new(FunctionInner { handler, remote }) }
    }

    /// A new identity sharing this handler, marked as the stand-in for `remote`.
    pub(crate) fn into_stand_in(self, remote: Remote) -> Self {
        Self::from_parts(Arc::clone(&self.inner.handler), Some(remote))
    }

    /// The descriptor this stand-in forwards to, if it is one.
    pub fn remote(&self) -> Option<&ProxyDescriptor> {
        self.inner.remote.as_ref().map(|remote| &remote.descriptor)
    }

    pub(crate) fn connection(&self) -> Option<u64> {
        self.inner.remote.as_ref().map(|remote| remote.connection)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<FunctionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<FunctionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.invoke(Invocation::new(args)).await
    }

    pub async fn invoke(&self, invocation: Invocation) -> Result<Value> {
        (self.inner.handler)(invocation)
            .await
            .map_err(Error::from_handler)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("remote", &self.remote().map(|desc| &desc.id))
            .finish()
    }
}

#[derive(Clone)]
struct Member {
    kind: MemberKind,
    function: Function,
}

/// A shared table of named members.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

pub(crate) struct ObjectInner {
    members: BTreeMap<String, Member>,
    remote: Option<Remote>,
}

impl Object {
    pub fn builder() -> ObjectBuilder {
        ObjectBuilder::default()
    }

    /// Callable entries become methods, everything else a property.
    pub(crate) fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        entries
            .into_iter()
            .fold(Self::builder(), |builder, (name, value)| match value {
                Value::Function(function) => builder.function(name, function),
                other => builder.property(name, other),
            })
            .build()
    }

    pub fn member(&self, name: &str) -> Option<&Function> {
        self.inner.members.get(name).map(|member| &member.function)
    }

    pub fn member_kind(&self, name: &str) -> Option<&MemberKind> {
        self.inner.members.get(name).map(|member| &member.kind)
    }

    /// The invocable surface, in name order.
    pub fn members(&self) -> Vec<MemberDescriptor> {
        self.inner
            .members
            .iter()
            .map(|(name, member)| MemberDescriptor {
                name: name.clone(),
                kind: member.kind.clone(),
            })
            .collect()
    }

    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let function = self
            .member(method)
            .ok_or_else(|| Error::MissingMember(method.to_string()))?;
        function.call(args).await
    }

    /// Reads a property.
    pub async fn get(&self, property: &str) -> Result<Value> {
        self.call(property, Vec::new()).await
    }

    pub fn remote(&self) -> Option<&ProxyDescriptor> {
        self.inner.remote.as_ref().map(|remote| &remote.descriptor)
    }

    pub(crate) fn connection(&self) -> Option<u64> {
        self.inner.remote.as_ref().map(|remote| remote.connection)
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ObjectInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("members", &self.inner.members.keys().collect::<Vec<_>>())
            .field("remote", &self.remote().map(|desc| &desc.id))
            .finish()
    }
}

/// Explicit registration of an object's exported members.
#[derive(Default)]
pub struct ObjectBuilder {
    members: BTreeMap<String, Member>,
}

impl ObjectBuilder {
    pub fn method<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.function(name, Function::new(f))
    }

    pub fn function(self, name: impl Into<String>, function: Function) -> Self {
        self.member(name, MemberKind::Function, function)
    }

    /// Registers a read-only property, served as a zero-argument getter.
    pub fn property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let getter = Function::new(move |_| {
            let value = value.clone();
            async move { anyhow::Ok(value) }
        });
        self.member(name, MemberKind::Property, getter)
    }

    pub(crate) fn member(mut self, name: impl Into<String>, kind: MemberKind, function: Function) -> Self {
        self.members.insert(name.into(), Member { kind, function });
        self
    }

    pub fn build(self) -> Object {
        Object {
            inner: Arc::new(ObjectInner { members: self.members, remote: None }),
        }
    }

    pub(crate) fn build_stand_in(self, remote: Remote) -> Object {
        Object {
            inner: Arc::new(ObjectInner { members: self.members, remote: Some(remote) }),
        }
    }
}
