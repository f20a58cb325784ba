//! Context: one isolated execution environment inside a runtime
//!
//! A [`Context`] owns the handle store through which native trampolines
//! reach host callbacks and bound objects. It is cheap to clone; every
//! clone refers to the same context.

use crate::class::{dispatch, HostEntry, MethodFn};
use crate::convert::IntoJs;
use crate::error::{Error, Result};
use crate::handle::HandleStore;
use crate::registry;
use crate::runtime::BindingMode;
use crate::value::Value;
use hostjs_engine::{
    ContextToken, EngineContext, EngineError, ErrorKind, FunctionKind, JsResult, PropertyFlags,
    RawValue, RuntimeToken,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct ContextInner {
    engine: EngineContext,
    runtime: RuntimeToken,
    binding_mode: BindingMode,
    handles: HandleStore<HostEntry>,
    closed: AtomicBool,
}

/// Host wrapper around an engine context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl Context {
    pub(crate) fn new(engine: EngineContext, runtime: RuntimeToken, binding_mode: BindingMode) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                engine,
                runtime,
                binding_mode,
                handles: HandleStore::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ContextInner> {
        &self.inner
    }

    pub(crate) fn handles(&self) -> &HandleStore<HostEntry> {
        &self.inner.handles
    }

    /// Token of the underlying engine context.
    pub fn token(&self) -> ContextToken {
        self.inner.engine.token()
    }

    /// Token of the runtime this context belongs to.
    pub fn runtime_token(&self) -> RuntimeToken {
        self.inner.runtime
    }

    /// The underlying engine context.
    pub fn engine(&self) -> &EngineContext {
        &self.inner.engine
    }

    pub fn binding_mode(&self) -> BindingMode {
        self.inner.binding_mode
    }

    /// Number of live handle store entries (callbacks and bound objects).
    pub fn handle_count(&self) -> usize {
        self.inner.handles.count()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Tear the context down.
    ///
    /// Host objects still bound through the handle store are finalized, the
    /// store is cleared and the context leaves the registry and its runtime.
    /// Instances collected afterwards find no context and are skipped.
    /// Closing twice is a no-op.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handles = &self.inner.handles;
        for id in handles.ids() {
            if let Some(HostEntry::Object(object)) = handles.take(id) {
                object.finalize();
            }
        }
        handles.clear();
        registry::unregister_context(self.token());
        if let Ok(runtime) = registry::get_runtime(self.runtime_token()) {
            runtime.forget_context(self.token());
        }
        self.inner.engine.free();
        log::debug!("context {} closed", self.token());
    }

    // ========================================================================
    // Engine results and exceptions
    // ========================================================================

    /// Convert an engine result, taking the pending exception on failure.
    pub(crate) fn check<T>(&self, result: JsResult<T>) -> Result<T> {
        result.map_err(|err| match err {
            EngineError::Thrown => self.exception_error(),
            EngineError::ContextFreed(_) => Error::ContextClosed,
            EngineError::UnknownClass(_) => Error::ClassIdNotFound,
        })
    }

    /// Take the pending exception as an [`Error::Exception`].
    fn exception_error(&self) -> Error {
        let Some(exception) = self.take_exception() else {
            return Error::Exception {
                name: "InternalError".to_string(),
                message: "exception pending but not found".to_string(),
            };
        };
        if !exception.is_object() {
            return Error::Exception {
                name: "Error".to_string(),
                message: exception.to_string(),
            };
        }
        let field = |name: &str| {
            exception
                .get(name)
                .ok()
                .filter(|v| !v.is_undefined())
                .map(|v| v.to_string())
        };
        Error::Exception {
            name: field("name").unwrap_or_else(|| "Error".to_string()),
            message: field("message").unwrap_or_default(),
        }
    }

    /// Detach the pending exception, if any.
    pub fn take_exception(&self) -> Option<Value> {
        self.inner
            .engine
            .take_exception()
            .map(|raw| Value::from_owned(self, raw))
    }

    pub fn has_exception(&self) -> bool {
        self.inner.engine.has_exception()
    }

    /// An error that is thrown into the script as a `kind` exception when
    /// returned from a host callback.
    pub fn throw_error(&self, kind: ErrorKind, message: impl Into<String>) -> Error {
        Error::Exception {
            name: kind.name().to_string(),
            message: message.into(),
        }
    }

    /// Throw `err` into this context; returns the exception marker.
    pub(crate) fn throw(&self, err: &Error) -> RawValue {
        throw_into(&self.inner.engine, err)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// The global object.
    pub fn globals(&self) -> Result<Value> {
        let raw = self.check(self.inner.engine.global_object())?;
        Ok(Value::from_owned(self, raw))
    }

    pub fn undefined(&self) -> Value {
        Value::from_owned(self, RawValue::Undefined)
    }

    pub fn null(&self) -> Value {
        Value::from_owned(self, RawValue::Null)
    }

    pub fn bool(&self, b: bool) -> Value {
        Value::from_owned(self, RawValue::Bool(b))
    }

    pub fn int(&self, n: i32) -> Value {
        Value::from_owned(self, RawValue::Int(n))
    }

    pub fn float(&self, n: f64) -> Value {
        Value::from_owned(self, RawValue::number(n))
    }

    pub fn string(&self, s: &str) -> Value {
        Value::from_owned(self, RawValue::string(s))
    }

    /// A new plain object.
    pub fn object(&self) -> Result<Value> {
        let raw = self.check(self.inner.engine.new_object())?;
        Ok(Value::from_owned(self, raw))
    }

    /// Convert any host value.
    pub fn value<T: IntoJs>(&self, value: T) -> Result<Value> {
        value.into_js(self)
    }

    // ========================================================================
    // Host functions
    // ========================================================================

    /// Expose a host closure as a script function.
    ///
    /// The closure lives in this context's handle store until the context
    /// closes.
    pub fn function<F, R>(&self, name: &str, f: F) -> Result<Value>
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<R> + Send + Sync + 'static,
        R: IntoJs,
    {
        self.function_with_length(name, 0, f)
    }

    /// [`function`](Self::function) with an explicit `length`.
    pub fn function_with_length<F, R>(&self, name: &str, length: u32, f: F) -> Result<Value>
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<R> + Send + Sync + 'static,
        R: IntoJs,
    {
        let callback: MethodFn = Arc::new(move |ctx: &Context, this: &Value, args: &[Value]| {
            f(ctx, this, args)?.into_js(ctx)
        });
        let id = self.inner.handles.try_store(HostEntry::Function(callback))?;
        let created = self.inner.engine.new_function(
            dispatch::function_proxy,
            name,
            length,
            FunctionKind::Generic,
            id.as_i32(),
        );
        match self.check(created) {
            Ok(raw) => Ok(Value::from_owned(self, raw)),
            Err(err) => {
                self.inner.handles.delete(id);
                Err(err)
            }
        }
    }

    /// Script-side subclass of a constructor (`class name extends base {}`).
    pub fn subclass(&self, base: &Value, name: &str) -> Result<Value> {
        let raw = self.check(self.inner.engine.new_subclass(base.raw(), name))?;
        Ok(Value::from_owned(self, raw))
    }

    /// Define a global binding.
    pub fn set_global<T: IntoJs>(&self, name: &str, value: T) -> Result<()> {
        let value = value.into_js(self)?;
        let globals = self.globals()?;
        self.check(self.inner.engine.define_property_value(
            globals.raw(),
            name,
            value.raw(),
            PropertyFlags::HIDDEN,
        ))
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// `f.call(this, ...args)`
    pub fn call(&self, f: &Value, this: &Value, args: &[Value]) -> Result<Value> {
        f.call(this, args)
    }

    /// `new ctor(...args)`
    pub fn construct(&self, ctor: &Value, args: &[Value]) -> Result<Value> {
        ctor.construct(args)
    }

    /// Run a collection on the owning runtime.
    pub fn run_gc(&self) -> usize {
        self.inner.engine.runtime().run_gc()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("token", &self.token())
            .field("runtime", &self.inner.runtime)
            .field("handles", &self.inner.handles.count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Engine error constructor matching an error name.
fn error_kind(name: &str) -> ErrorKind {
    match name {
        "TypeError" => ErrorKind::TypeError,
        "RangeError" => ErrorKind::RangeError,
        "ReferenceError" => ErrorKind::ReferenceError,
        "InternalError" => ErrorKind::InternalError,
        _ => ErrorKind::Error,
    }
}

/// Throw `err` into an engine context as an error object.
///
/// Used directly by trampolines that could not recover a host context.
pub(crate) fn throw_into(engine: &EngineContext, err: &Error) -> RawValue {
    let name = err.script_error_name();
    let message = err.script_message();
    let kind = error_kind(name);
    match engine.new_error(kind, &message) {
        Ok(exception) => {
            if kind.name() != name {
                let renamed = engine.define_property_value(
                    &exception,
                    "name",
                    &RawValue::string(name),
                    PropertyFlags::HIDDEN,
                );
                if renamed.is_err() {
                    log::warn!("could not rename exception to '{}'", name);
                }
            }
            engine.throw(exception)
        }
        Err(_) => engine.throw_error(kind, &message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn test_value_constructors() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        assert!(ctx.undefined().is_undefined());
        assert!(ctx.null().is_null());
        assert!(ctx.bool(true).to_bool());
        assert_eq!(ctx.int(7).to_i32(), Ok(7));
        assert_eq!(ctx.float(1.5).to_f64(), Ok(1.5));
        assert_eq!(ctx.string("hi").to_string(), "hi");
        assert!(ctx.object().unwrap().is_object());
    }

    #[test]
    fn test_function_round_trip() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let add = ctx
            .function("add", |_ctx: &Context, _this: &Value, args: &[Value]| {
                Ok(args[0].to_f64()? + args[1].to_f64()?)
            })
            .unwrap();
        assert_eq!(ctx.handle_count(), 1);

        let result = ctx
            .call(&add, &ctx.undefined(), &[ctx.int(2), ctx.float(0.5)])
            .unwrap();
        assert_eq!(result.to_f64(), Ok(2.5));
    }

    #[test]
    fn test_host_error_becomes_exception() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let fail = ctx
            .function("fail", |ctx: &Context, _this: &Value, _args: &[Value]| -> Result<()> {
                Err(ctx.throw_error(ErrorKind::RangeError, "out of range"))
            })
            .unwrap();
        let err = fail.call(&ctx.undefined(), &[]).unwrap_err();
        assert_eq!(
            err,
            Error::Exception {
                name: "RangeError".into(),
                message: "out of range".into()
            }
        );
        assert!(!ctx.has_exception());
    }

    #[test]
    fn test_custom_error_name_survives() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let err = Error::Exception {
            name: "ValidationError".into(),
            message: "bad input".into(),
        };
        ctx.throw(&err);
        let exception = ctx.take_exception().unwrap();
        assert_eq!(exception.get("name").unwrap().to_string(), "ValidationError");
        assert_eq!(exception.get("message").unwrap().to_string(), "bad input");
    }

    #[test]
    fn test_globals() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        ctx.set_global("answer", 42).unwrap();
        assert_eq!(ctx.globals().unwrap().get("answer").unwrap().to_i32(), Ok(42));
    }

    #[test]
    fn test_close_is_idempotent() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        ctx.function("f", |_: &Context, _: &Value, _: &[Value]| Ok(())).unwrap();
        ctx.close();
        assert!(ctx.is_closed());
        assert_eq!(ctx.handle_count(), 0);
        assert_eq!(ctx.object().unwrap_err(), Error::ContextClosed);
        ctx.close();
    }
}
