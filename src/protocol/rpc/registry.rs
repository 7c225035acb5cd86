//! Method registry.
//!
//! Methods are registered explicitly, one typed handler per method, grouped
//! into a [`Service`] per exposed object. A [`RegistryBuilder`] collects
//! services and produces an immutable [`Registry`]; once built, nothing can
//! add, remove or replace a method, so the registry can be shared by every
//! connection task without locking.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::{RegistryError, StrError};
use crate::protocol::xdr::rpc::{CapabilityMap, RpcClass};
use crate::protocol::xdr::value::Value;

/// Readable byte stream returned by a [`RpcClass::ReadStream`] method.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Writable byte stream returned by a [`RpcClass::WriteStream`] method.
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

pub type NormalFn =
    Arc<dyn Fn(Args) -> BoxFuture<'static, Result<Vec<Value>, StrError>> + Send + Sync>;
pub type ReadFn = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<ByteSource, StrError>> + Send + Sync>;
pub type WriteFn = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<ByteSink, StrError>> + Send + Sync>;

/// An invocable method. The variant fixes the method's [`RpcClass`].
#[derive(Clone)]
pub enum Handler {
    Normal(NormalFn),
    Read(ReadFn),
    Write(WriteFn),
}

impl Handler {
    /// Wraps an async function returning the method's result values.
    pub fn normal<F, Fut>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Value>, StrError>> + Send + 'static,
    {
        Handler::Normal(Arc::new(move |args| f(args).boxed()))
    }

    /// Wraps an async function returning a source whose bytes are streamed
    /// to the caller.
    pub fn read<F, Fut, S>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, StrError>> + Send + 'static,
        S: AsyncRead + Send + Unpin + 'static,
    {
        Handler::Read(Arc::new(move |args| {
            f(args).map(|res| res.map(|source| Box::new(source) as ByteSource)).boxed()
        }))
    }

    /// Wraps an async function returning a sink that receives the caller's
    /// bytes. The sink is shut down once the caller's data ends.
    pub fn write<F, Fut, S>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, StrError>> + Send + 'static,
        S: AsyncWrite + Send + Unpin + 'static,
    {
        Handler::Write(Arc::new(move |args| {
            f(args).map(|res| res.map(|sink| Box::new(sink) as ByteSink)).boxed()
        }))
    }

    /// The class implied by the handler's shape.
    pub fn class(&self) -> RpcClass {
        match self {
            Handler::Normal(_) => RpcClass::Normal,
            Handler::Read(_) => RpcClass::ReadStream,
            Handler::Write(_) => RpcClass::WriteStream,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler({})", self.class())
    }
}

/// Decoded positional arguments of a call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    /// Wraps decoded positional arguments.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of arguments the caller sent.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the call carried no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts a copy of argument `index`.
    pub fn get<T>(&self, index: usize) -> Result<T, StrError>
    where
        T: TryFrom<Value, Error = StrError>,
    {
        let value = self
            .0
            .get(index)
            .cloned()
            .ok_or_else(|| StrError::new(format!("missing argument {index}")))?;
        T::try_from(value).map_err(|e| StrError::new(format!("argument {index}: {e}")))
    }

    /// Converts the whole list at once, checking the arity.
    pub fn parse<T: FromArgs>(self) -> Result<T, StrError> {
        T::from_args(self.0)
    }

    /// Returns the raw argument values.
    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

/// Conversion of a complete argument list, implemented for tuples.
pub trait FromArgs: Sized {
    fn from_args(values: Vec<Value>) -> Result<Self, StrError>;
}

macro_rules! impl_from_args {
    ($count:expr; $($name:ident),*) => {
        impl<$($name),*> FromArgs for ($($name,)*)
        where
            $($name: TryFrom<Value, Error = StrError>,)*
        {
            #[allow(unused_variables, unused_mut)]
            fn from_args(values: Vec<Value>) -> Result<Self, StrError> {
                if values.len() != $count {
                    return Err(StrError::new(format!(
                        "expected {} arguments, got {}",
                        $count,
                        values.len()
                    )));
                }
                let mut values = values.into_iter();
                Ok(($(
                    $name::try_from(values.next().unwrap_or_default())?,
                )*))
            }
        }
    };
}

impl_from_args!(0;);
impl_from_args!(1; A);
impl_from_args!(2; A, B);
impl_from_args!(3; A, B, C);
impl_from_args!(4; A, B, C, D);

/// The methods of one exposed object, before registration.
#[derive(Default)]
pub struct Service {
    methods: Vec<(String, Handler)>,
}

impl Service {
    /// Creates a service with no methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a [`RpcClass::Normal`] method.
    pub fn normal<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Value>, StrError>> + Send + 'static,
    {
        self.with(name, Handler::normal(f))
    }

    /// Adds a [`RpcClass::ReadStream`] method.
    pub fn read<F, Fut, S>(self, name: &str, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, StrError>> + Send + 'static,
        S: AsyncRead + Send + Unpin + 'static,
    {
        self.with(name, Handler::read(f))
    }

    /// Adds a [`RpcClass::WriteStream`] method.
    pub fn write<F, Fut, S>(self, name: &str, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, StrError>> + Send + 'static,
        S: AsyncWrite + Send + Unpin + 'static,
    {
        self.with(name, Handler::write(f))
    }

    /// Adds a method named by the `Normal_`/`Read_`/`Write_` prefix
    /// convention. Names without a recognised prefix, or whose prefix does
    /// not match the handler's class, are skipped.
    pub fn method(self, raw_name: &str, handler: Handler) -> Self {
        match RpcClass::from_method_name(raw_name) {
            Some((class, name)) if class == handler.class() => self.with(name, handler),
            _ => {
                debug!("Skipping method {} with {:?}", raw_name, handler);
                self
            }
        }
    }

    /// Adds a method under its exposed name.
    pub fn with(mut self, name: &str, handler: Handler) -> Self {
        self.methods.push((name.to_string(), handler));
        self
    }
}

/// A registered method.
#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    name: String,
    handler: Handler,
}

impl MethodDescriptor {
    /// Qualified name, `Type.Method`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class advertised for this method.
    pub fn class(&self) -> RpcClass {
        self.handler.class()
    }

    /// The function the dispatcher invokes for this method.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

/// Collects services and produces a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    methods: BTreeMap<String, MethodDescriptor>,
    services: Vec<String>,
}

impl RegistryBuilder {
    /// Creates a builder with no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every method of `service` as `<name>.<Method>`.
    ///
    /// Registration is all-or-nothing: on error the builder is unchanged.
    pub fn register(&mut self, name: &str, service: Service) -> Result<&mut Self, RegistryError> {
        if !valid_name(name) {
            return Err(RegistryError::InvalidServiceName(name.to_string()));
        }
        if self.services.iter().any(|s| s == name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }

        let mut added = BTreeMap::new();
        for (method, handler) in service.methods {
            if !valid_name(&method) {
                return Err(RegistryError::InvalidMethodName(method));
            }
            let qualified = format!("{name}.{method}");
            let descriptor = MethodDescriptor { name: qualified.clone(), handler };
            if added.insert(qualified.clone(), descriptor).is_some() {
                return Err(RegistryError::DuplicateMethod(qualified));
            }
        }

        debug!("Registered service {} with {} methods", name, added.len());
        self.services.push(name.to_string());
        self.methods.extend(added);
        Ok(self)
    }

    /// Freezes the registered methods. The result is immutable and can be
    /// shared between connections without locking.
    pub fn build(self) -> Registry {
        Registry { methods: self.methods }
    }
}

/// Immutable map from qualified method name to [`MethodDescriptor`].
#[derive(Clone, Debug, Default)]
pub struct Registry {
    methods: BTreeMap<String, MethodDescriptor>,
}

impl Registry {
    /// Starts an empty registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Looks up a method by its qualified name.
    ///
    /// # Arguments
    ///
    /// * `name` - `Type.Method` as sent in the call envelope
    ///
    /// # Returns
    ///
    /// The method's descriptor, or `None` when no such method is registered.
    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// The name to class map sent to clients during the handshake.
    pub fn capabilities(&self) -> CapabilityMap {
        self.methods.iter().map(|(name, m)| (name.clone(), m.class())).collect()
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// True when no method is registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Iterates over the methods in name order.
    pub fn iter(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values()
    }
}
