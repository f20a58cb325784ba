//! Native trampolines
//!
//! Every native function created by the bridge points at one of these
//! proxies, with its handle ID as the function's `magic`. A proxy:
//!
//! 1. recovers the host [`Context`] from the engine context token, which
//!    is always the context the function was created in,
//! 2. loads the callback stored under `magic`,
//! 3. checks that the entry has the kind the proxy serves,
//! 4. wraps the arguments, runs the callback and turns its result into a
//!    return value or a thrown exception.
//!
//! Host panics never cross into the engine: they are caught and thrown as
//! `InternalError`.

use super::{binder, ConstructorEntry, HostEntry};
use crate::context::{throw_into, Context};
use crate::error::{CallbackKind, Error, Result};
use crate::handle::HandleId;
use crate::registry;
use crate::value::Value;
use hostjs_engine::{EngineContext, EngineRuntime, ErrorKind, FinalizeInfo, Opaque, RawValue};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

// ============================================================================
// Recovery protocol
// ============================================================================

/// Run a trampoline body, turning a host panic into an `InternalError`.
fn guarded(engine: &EngineContext, kind: CallbackKind, body: impl FnOnce() -> RawValue) -> RawValue {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::warn!("panic in host {} callback: {}", kind, message);
            engine.throw_error(ErrorKind::InternalError, &message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "host callback panicked".to_string()
    }
}

/// Step 1: the host context behind an engine context.
fn recover_context(engine: &EngineContext, kind: CallbackKind) -> std::result::Result<Context, RawValue> {
    registry::get_context(engine.token()).map_err(|err| {
        log::warn!("{} callback for unknown context {}", kind, engine.token());
        throw_into(engine, &err)
    })
}

/// Steps 2 and 3: the entry stored under `magic`, checked against `kind`.
fn lookup(ctx: &Context, magic: i32, kind: CallbackKind) -> Result<HostEntry> {
    let entry = ctx
        .handles()
        .load(HandleId::from_i32(magic))
        .ok_or(Error::CallbackNotFound { kind })?;
    if entry.callback_kind() != Some(kind) {
        return Err(Error::InvalidCallbackType { kind });
    }
    log::trace!("dispatch {} handle {}", kind, magic);
    Ok(entry)
}

/// Step 4: turn a callback result into a native return value.
fn settle(ctx: &Context, result: Result<Value>) -> RawValue {
    match result {
        Ok(value) => value.into_raw(),
        Err(err) => ctx.throw(&err),
    }
}

fn wrap_args(ctx: &Context, args: &[RawValue]) -> Vec<Value> {
    args.iter().map(|arg| Value::from_borrowed(ctx, arg)).collect()
}

// ============================================================================
// Callable proxies
// ============================================================================

/// Plain host functions (`Context::function`).
pub(crate) fn function_proxy(engine: &EngineContext, this: &RawValue, args: &[RawValue], magic: i32) -> RawValue {
    call_proxy(engine, this, args, magic, CallbackKind::Function)
}

/// Instance and static methods.
pub(crate) fn method_proxy(engine: &EngineContext, this: &RawValue, args: &[RawValue], magic: i32) -> RawValue {
    call_proxy(engine, this, args, magic, CallbackKind::Method)
}

fn call_proxy(engine: &EngineContext, this: &RawValue, args: &[RawValue], magic: i32, kind: CallbackKind) -> RawValue {
    guarded(engine, kind, || {
        let ctx = match recover_context(engine, kind) {
            Ok(ctx) => ctx,
            Err(exception) => return exception,
        };
        let result = lookup(&ctx, magic, kind).and_then(|entry| {
            let callback = match entry {
                HostEntry::Function(f) | HostEntry::Method(f) => f,
                _ => return Err(Error::InvalidCallbackType { kind }),
            };
            let this = Value::from_borrowed(&ctx, this);
            let args = wrap_args(&ctx, args);
            callback(&ctx, &this, &args)
        });
        settle(&ctx, result)
    })
}

/// Accessor getters
pub(crate) fn getter_proxy(engine: &EngineContext, this: &RawValue, _args: &[RawValue], magic: i32) -> RawValue {
    let kind = CallbackKind::Getter;
    guarded(engine, kind, || {
        let ctx = match recover_context(engine, kind) {
            Ok(ctx) => ctx,
            Err(exception) => return exception,
        };
        let result = lookup(&ctx, magic, kind).and_then(|entry| {
            let HostEntry::Getter(getter) = entry else {
                return Err(Error::InvalidCallbackType { kind });
            };
            let this = Value::from_borrowed(&ctx, this);
            getter(&ctx, &this)
        });
        settle(&ctx, result)
    })
}

/// Accessor setters
pub(crate) fn setter_proxy(engine: &EngineContext, this: &RawValue, args: &[RawValue], magic: i32) -> RawValue {
    let kind = CallbackKind::Setter;
    guarded(engine, kind, || {
        let ctx = match recover_context(engine, kind) {
            Ok(ctx) => ctx,
            Err(exception) => return exception,
        };
        let result = lookup(&ctx, magic, kind).and_then(|entry| {
            let HostEntry::Setter(setter) = entry else {
                return Err(Error::InvalidCallbackType { kind });
            };
            let this = Value::from_borrowed(&ctx, this);
            let value = match args.first() {
                Some(arg) => Value::from_borrowed(&ctx, arg),
                None => ctx.undefined(),
            };
            setter(&ctx, &this, &value)?;
            Ok(ctx.undefined())
        });
        settle(&ctx, result)
    })
}

// ============================================================================
// Construction
// ============================================================================

/// Class constructors
///
/// `new_target` is the constructor `new` was applied to; its `prototype`
/// becomes the instance prototype so script-side subclasses keep their
/// chain.
pub(crate) fn constructor_proxy(
    engine: &EngineContext,
    new_target: &RawValue,
    args: &[RawValue],
    magic: i32,
) -> RawValue {
    let kind = CallbackKind::Constructor;
    guarded(engine, kind, || {
        let ctx = match recover_context(engine, kind) {
            Ok(ctx) => ctx,
            Err(exception) => return exception,
        };
        let result = lookup(&ctx, magic, kind).and_then(|entry| {
            let HostEntry::Constructor(class) = entry else {
                return Err(Error::InvalidCallbackType { kind });
            };
            construct(&ctx, &class, new_target, args)
        });
        settle(&ctx, result)
    })
}

fn construct(ctx: &Context, class: &Arc<ConstructorEntry>, new_target: &RawValue, args: &[RawValue]) -> Result<Value> {
    let engine = ctx.engine();
    let target_proto = ctx.check(engine.get_property(new_target, "prototype"))?;
    let proto = if target_proto.is_object() {
        Value::from_owned(ctx, target_proto)
    } else {
        Value::from_owned(ctx, ctx.check(engine.class_proto(class.class_id))?)
    };
    let raw = ctx.check(engine.new_object_proto_class(proto.raw(), class.class_id))?;
    let instance = Value::from_owned(ctx, raw);

    let args = wrap_args(ctx, args);
    let object = (class.callback)(ctx, &instance, &args)?;
    binder::bind(ctx, instance.raw(), object)?;

    for prop in &class.instance_properties {
        let defined = engine.define_property_value(instance.raw(), &prop.name, &prop.value, prop.flags);
        if let Err(err) = ctx.check(defined) {
            binder::unbind(ctx, instance.raw());
            return Err(err);
        }
    }
    Ok(instance)
}

// ============================================================================
// Finalization
// ============================================================================

/// Class finalizer, run by the collector for every unreachable instance.
///
/// The owning context is looked up by its token and must belong to the
/// collecting runtime. Handle bindings of a context that is gone are
/// skipped; direct bindings carry their object and are finalized
/// regardless.
pub(crate) fn finalizer_proxy(rt: &EngineRuntime, info: FinalizeInfo) {
    let class_id = info.class_id;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let Some(opaque) = info.opaque else {
            return;
        };
        let ctx = registry::get_context(info.owner)
            .ok()
            .filter(|ctx| ctx.runtime_token() == rt.token());
        if ctx.is_none() && matches!(opaque, Opaque::Word(_)) {
            log::warn!("finalizer for class {}: context {} is gone", class_id, info.owner);
            return;
        }
        if let Some(object) = binder::release(ctx.as_ref(), opaque) {
            object.finalize();
            log::trace!("instance of class {} finalized", class_id);
        }
    }));
    if outcome.is_err() {
        log::warn!("panic while finalizing an instance of class {}", class_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{BoundObject, HostObject, MethodFn};
    use crate::runtime::Runtime;
    use hostjs_engine::FunctionKind;

    struct Unit;
    impl HostObject for Unit {}

    fn method_value(ctx: &Context, id: HandleId) -> Value {
        let raw = ctx
            .engine()
            .new_function(method_proxy, "method", 0, FunctionKind::Generic, id.as_i32())
            .unwrap();
        Value::from_owned(ctx, raw)
    }

    fn message(err: Error) -> String {
        match err {
            Error::Exception { message, .. } => message,
            other => panic!("expected a script exception, got {:?}", other),
        }
    }

    #[test]
    fn test_method_dispatch() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let callback: MethodFn = Arc::new(|ctx: &Context, _this: &Value, args: &[Value]| {
            Ok(ctx.int(args.len() as i32))
        });
        let id = ctx.handles().store(HostEntry::Method(callback));
        let f = method_value(&ctx, id);
        let result = f.call(&ctx.undefined(), &[ctx.int(1), ctx.int(2)]).unwrap();
        assert_eq!(result.to_i32(), Ok(2));
    }

    #[test]
    fn test_missing_callback() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let callback: MethodFn = Arc::new(|ctx: &Context, _: &Value, _: &[Value]| Ok(ctx.undefined()));
        let id = ctx.handles().store(HostEntry::Method(callback));
        let f = method_value(&ctx, id);

        ctx.handles().delete(id);
        let err = f.call(&ctx.undefined(), &[]).unwrap_err();
        assert_eq!(message(err), "Method function not found");
    }

    #[test]
    fn test_wrong_entry_kind() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let id = ctx.handles().store(HostEntry::Object(BoundObject::new(Unit)));
        let f = method_value(&ctx, id);
        let err = f.call(&ctx.undefined(), &[]).unwrap_err();
        assert_eq!(
            err,
            Error::Exception {
                name: "InternalError".into(),
                message: "Invalid method function type".into()
            }
        );
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let f = ctx
            .function("explode", |_: &Context, _: &Value, _: &[Value]| -> Result<()> {
                panic!("kaboom")
            })
            .unwrap();
        let err = f.call(&ctx.undefined(), &[]).unwrap_err();
        assert_eq!(
            err,
            Error::Exception {
                name: "InternalError".into(),
                message: "kaboom".into()
            }
        );
    }

    #[test]
    fn test_unknown_context() {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let f = ctx
            .function("f", |_: &Context, _: &Value, _: &[Value]| Ok(1))
            .unwrap();
        registry::unregister_context(ctx.token());
        assert_eq!(message(f.call(&ctx.undefined(), &[]).unwrap_err()), "Context not found");

        registry::register_context(&ctx);
        assert_eq!(f.call(&ctx.undefined(), &[]).unwrap().to_i32(), Ok(1));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(boxed.as_ref()), "host callback panicked");
    }
}
