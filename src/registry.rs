//! Handler registration and dispatch
//!
//! A handler type lists its remotely callable methods as [`MethodDef`]s.
//! Registration turns each definition into a shared callable bound to the
//! handler instance, once; the resulting [`Registry`] is immutable and is
//! consulted per request by full method name (`namespace.method`).

use crate::errors::{HostError, HostResult};
use crate::fault::{RpcResult, ServiceError};
use crate::value::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Separator between namespace and method name.
pub const NAMESPACE_DELIMITER: char = '.';

/// Number of positional parameters a method accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// Any number; the method ignores or inspects them itself.
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => *n == count,
            Arity::Any => true,
        }
    }
}

/// Typed method body of handler `H`.
pub type MethodFn<H> = fn(&H, &[Value]) -> RpcResult<Value>;

/// One remotely callable method of handler `H`
pub struct MethodDef<H> {
    pub name: &'static str,
    pub arity: Arity,
    pub help: &'static str,
    /// Return type followed by parameter types.
    pub signature: &'static [&'static str],
    pub func: MethodFn<H>,
}

/// An object exposing a fixed set of named methods.
pub trait Handler: Send + Sync + 'static {
    fn methods() -> Vec<MethodDef<Self>>
    where
        Self: Sized;
}

type Callable = Arc<dyn Fn(&[Value]) -> RpcResult<Value> + Send + Sync>;

/// A registered method, erased from its handler type.
#[derive(Clone)]
pub struct Method {
    pub full_name: String,
    pub arity: Arity,
    pub help: &'static str,
    pub signature: &'static [&'static str],
    call: Callable,
}

impl Method {
    /// Build a method from a closure. Used for methods that need the
    /// registry itself, such as `system.*`.
    pub fn from_fn<F>(
        full_name: impl Into<String>,
        arity: Arity,
        help: &'static str,
        signature: &'static [&'static str],
        call: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> RpcResult<Value> + Send + Sync + 'static,
    {
        Self {
            full_name: full_name.into(),
            arity,
            help,
            signature,
            call: Arc::new(call),
        }
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("full_name", &self.full_name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Immutable mapping from namespace to its methods
#[derive(Debug, Clone, Default)]
pub struct Registry {
    namespaces: BTreeMap<String, BTreeMap<String, Method>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Split `namespace.method` at the last delimiter.
    pub fn split_name(full_name: &str) -> Option<(&str, &str)> {
        full_name
            .rsplit_once(NAMESPACE_DELIMITER)
            .filter(|(ns, method)| !ns.is_empty() && !method.is_empty())
    }

    pub fn lookup(&self, full_name: &str) -> Option<&Method> {
        let (namespace, method) = Self::split_name(full_name)?;
        self.namespaces.get(namespace)?.get(method)
    }

    /// Every registered method, sorted by full name.
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.namespaces.values().flat_map(|methods| methods.values())
    }

    /// Resolve and invoke a method. Always yields a value or a `ServiceError`;
    /// a panic inside the method body is reported as an uncaught failure.
    pub fn dispatch(&self, full_name: &str, params: &[Value]) -> RpcResult<Value> {
        let method = match self.lookup(full_name) {
            Some(m) if m.arity.accepts(params.len()) => m,
            _ => {
                info!(method = full_name, params = params.len(), "method missing");
                return Err(ServiceError::method_not_found(full_name));
            }
        };

        debug!(method = full_name, params = params.len(), "dispatching");
        match catch_unwind(AssertUnwindSafe(|| (method.call)(params))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                error!(method = full_name, %message, "method panicked");
                Err(ServiceError::internal(full_name, message))
            }
        }
    }
}

/// Collects handlers before freezing them into a [`Registry`]
#[derive(Default)]
pub struct RegistryBuilder {
    namespaces: BTreeMap<String, BTreeMap<String, Method>>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    /// Register `handler` under `namespace`. Each of its methods becomes
    /// callable as `namespace.method`.
    pub fn add_handler<H: Handler>(mut self, namespace: &str, handler: H) -> Self {
        if namespace.is_empty() {
            self.errors.push("namespace must not be empty".to_string());
            return self;
        }
        if self.namespaces.contains_key(namespace) {
            self.errors
                .push(format!("namespace '{namespace}' is already registered"));
            return self;
        }

        let handler = Arc::new(handler);
        let methods = H::methods()
            .into_iter()
            .map(|def| {
                let bound = Arc::clone(&handler);
                let func = def.func;
                let method = Method::from_fn(
                    format!("{namespace}{NAMESPACE_DELIMITER}{}", def.name),
                    def.arity,
                    def.help,
                    def.signature,
                    move |params| func(bound.as_ref(), params),
                );
                (def.name.to_string(), method)
            })
            .collect();
        self.namespaces.insert(namespace.to_string(), methods);
        self
    }

    /// Register a prebuilt method under its full name.
    pub fn add_method(mut self, method: Method) -> Self {
        let split = Registry::split_name(&method.full_name)
            .map(|(namespace, name)| (namespace.to_string(), name.to_string()));
        match split {
            Some((namespace, name)) => {
                self.namespaces
                    .entry(namespace)
                    .or_default()
                    .insert(name, method);
            }
            None => self.errors.push(format!(
                "method name '{}' lacks a namespace",
                method.full_name
            )),
        }
        self
    }

    pub fn build(self) -> HostResult<Registry> {
        if !self.errors.is_empty() {
            return Err(HostError::registration(self.errors.join("; ")));
        }
        Ok(Registry {
            namespaces: self.namespaces,
        })
    }
}
