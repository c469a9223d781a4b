//! Capability hosting.
//!
//! Capabilities are pre-registered module factories. The registry asks the
//! [`CapabilityHost`] for a module on first dispatch, the host builds it once
//! and caches it, and the callable is then resolved by name (one level of
//! `object.method` nesting).

pub mod builtin;

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::types::Args;

/// Failure reported by a capability.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// Arguments do not fit the callable (wrong arity or type).
    #[error("call mismatch: {0}")]
    Mismatch(String),
    #[error("{0}")]
    Failed(String),
}

#[async_trait::async_trait]
pub trait Callable: Send + Sync {
    async fn call(&self, args: Args) -> Result<Value, CallError>;
}

/// Adapts an async closure into a [`Callable`].
pub struct FnCallable<F>(F);

impl<F> FnCallable<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait::async_trait]
impl<F, Fut> Callable for FnCallable<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
{
    async fn call(&self, args: Args) -> Result<Value, CallError> {
        (self.0)(args).await
    }
}

/// Named set of callables and sub-objects.
pub trait CapabilityModule: Send + Sync {
    fn name(&self) -> &str;

    fn callable(&self, name: &str) -> Option<Arc<dyn Callable>>;

    fn object(&self, _name: &str) -> Option<Arc<dyn CapabilityModule>> {
        None
    }
}

/// Resolve `fn` or `object.fn` inside a module.
pub fn resolve_callable(module: &dyn CapabilityModule, function_name: &str) -> Option<Arc<dyn Callable>> {
    match function_name.split_once('.') {
        Some((object, attr)) => module.object(object)?.callable(attr),
        None => module.callable(function_name),
    }
}

/// Table-backed module assembled with a builder.
#[derive(Clone, Default)]
pub struct StaticModule {
    name: String,
    functions: HashMap<String, Arc<dyn Callable>>,
    objects: HashMap<String, Arc<dyn CapabilityModule>>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_function<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
    {
        self.with_callable(name, Arc::new(FnCallable::new(f)))
    }

    pub fn with_callable(mut self, name: &str, callable: Arc<dyn Callable>) -> Self {
        self.functions.insert(name.to_string(), callable);
        self
    }

    pub fn with_object(mut self, name: &str, object: impl CapabilityModule + 'static) -> Self {
        self.objects.insert(name.to_string(), Arc::new(object));
        self
    }
}

impl CapabilityModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn callable(&self, name: &str) -> Option<Arc<dyn Callable>> {
        self.functions.get(name).cloned()
    }

    fn object(&self, name: &str) -> Option<Arc<dyn CapabilityModule>> {
        self.objects.get(name).cloned()
    }
}

type Factory = Arc<dyn Fn() -> Arc<dyn CapabilityModule> + Send + Sync>;

/// Module factories plus the lazily filled module cache.
#[derive(Default)]
pub struct CapabilityHost {
    by_name: HashMap<String, Factory>,
    by_location: HashMap<String, Factory>,
    loaded: Mutex<HashMap<String, Arc<dyn CapabilityModule>>>,
}

impl CapabilityHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with the bundled vehicle modules registered.
    pub fn with_builtins() -> Self {
        let mut host = Self::new();
        builtin::register_all(&mut host);
        host
    }

    pub fn register<F, M>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: CapabilityModule + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Arc<dyn CapabilityModule>);
        self.by_name.insert(name.into(), factory);
    }

    /// Register under a name and a location reference (`module_path`).
    pub fn register_at<F, M>(&mut self, name: impl Into<String>, location: impl Into<String>, factory: F)
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: CapabilityModule + 'static,
    {
        let name = name.into();
        self.register(name.clone(), factory);
        if let Some(f) = self.by_name.get(&name) {
            self.by_location.insert(location.into(), Arc::clone(f));
        }
    }

    /// Cached module, building it on first use. Location wins over name.
    pub fn load(&self, name: &str, location: &str) -> Option<Arc<dyn CapabilityModule>> {
        let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(module) = loaded.get(name) {
            return Some(Arc::clone(module));
        }
        let factory = self.by_location.get(location).or_else(|| self.by_name.get(name))?;
        let module = factory();
        tracing::info!(module = name, location, "capability module loaded");
        loaded.insert(name.to_string(), Arc::clone(&module));
        Some(module)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner()).contains_key(name)
    }

    /// Registered module names, sorted.
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

/// Panic payload text of a failed task, or the join error itself.
pub fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

// ── Argument helpers ────────────────────────────────────────────

fn mismatch(name: &str, expected: &str, found: &Value) -> CallError {
    CallError::Mismatch(format!("argument '{name}' should be {expected}, got {}", json_type_name(found)))
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

pub fn arg<'a>(args: &'a Args, name: &str) -> Result<&'a Value, CallError> {
    args.get(name)
        .ok_or_else(|| CallError::Mismatch(format!("missing argument '{name}'")))
}

pub fn str_arg<'a>(args: &'a Args, name: &str) -> Result<&'a str, CallError> {
    let v = arg(args, name)?;
    v.as_str().ok_or_else(|| mismatch(name, "str", v))
}

pub fn f64_arg(args: &Args, name: &str) -> Result<f64, CallError> {
    let v = arg(args, name)?;
    v.as_f64().ok_or_else(|| mismatch(name, "float", v))
}

pub fn i64_arg(args: &Args, name: &str) -> Result<i64, CallError> {
    let v = arg(args, name)?;
    v.as_i64().ok_or_else(|| mismatch(name, "int", v))
}

pub fn bool_arg(args: &Args, name: &str) -> Result<bool, CallError> {
    let v = arg(args, name)?;
    v.as_bool().ok_or_else(|| mismatch(name, "bool", v))
}
