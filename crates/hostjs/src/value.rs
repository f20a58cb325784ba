//! Script values held by the host
//!
//! A [`Value`] pairs an engine value with the context it belongs to and
//! owns one host reference on it: cloning takes another reference,
//! dropping releases it. Immediates (numbers, strings, booleans) carry no
//! reference.

use crate::class::{binder, BoundObject, HostObject};
use crate::context::Context;
use crate::convert::IntoJs;
use crate::error::{Error, Result};
use crate::registry;
use hostjs_engine::{ClassId, RawValue};
use std::fmt;

/// A script value owned by the host.
pub struct Value {
    ctx: Context,
    raw: RawValue,
}

impl Value {
    /// Wrap a value whose host reference is transferred to the wrapper.
    pub(crate) fn from_owned(ctx: &Context, raw: RawValue) -> Self {
        Self {
            ctx: ctx.clone(),
            raw,
        }
    }

    /// Wrap a borrowed value, taking a new host reference.
    pub(crate) fn from_borrowed(ctx: &Context, raw: &RawValue) -> Self {
        let raw = ctx.engine().runtime().dup_value(raw);
        Self::from_owned(ctx, raw)
    }

    /// Give up the wrapper, handing its host reference to the caller.
    pub(crate) fn into_raw(mut self) -> RawValue {
        std::mem::take(&mut self.raw)
    }

    /// The underlying engine value (borrowed, no reference taken).
    pub fn raw(&self) -> &RawValue {
        &self.raw
    }

    /// The context this value belongs to.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    // ===== Predicates =====

    pub fn is_undefined(&self) -> bool {
        self.raw.is_undefined()
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.raw, RawValue::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        self.raw.is_number()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.raw, RawValue::String(_))
    }

    pub fn is_object(&self) -> bool {
        self.raw.is_object()
    }

    pub fn is_function(&self) -> bool {
        self.ctx.engine().is_function(&self.raw)
    }

    pub fn is_constructor(&self) -> bool {
        self.ctx.engine().is_constructor(&self.raw)
    }

    /// Script-level type name (`"number"`, `"object"`, ...).
    pub fn type_name(&self) -> &'static str {
        if self.is_function() {
            "function"
        } else {
            self.raw.type_name()
        }
    }

    // ===== Coercions =====

    /// The number this value holds.
    pub fn to_f64(&self) -> Result<f64> {
        self.raw
            .as_f64()
            .ok_or_else(|| Error::type_mismatch("number", self.type_name()))
    }

    /// The number this value holds, truncated toward zero.
    ///
    /// Non-finite numbers become 0; out-of-range numbers saturate.
    pub fn to_i32(&self) -> Result<i32> {
        match self.raw {
            RawValue::Int(n) => Ok(n),
            _ => {
                let n = self.to_f64()?;
                Ok(if n.is_finite() { n as i32 } else { 0 })
            }
        }
    }

    /// Truthiness
    pub fn to_bool(&self) -> bool {
        self.raw.is_truthy()
    }

    /// The string this value holds (no coercion).
    pub fn as_str(&self) -> Option<&str> {
        match &self.raw {
            RawValue::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    // ===== Properties =====

    /// `value[name]`
    pub fn get(&self, name: &str) -> Result<Value> {
        let raw = self.ctx.check(self.ctx.engine().get_property(&self.raw, name))?;
        Ok(Value::from_owned(&self.ctx, raw))
    }

    /// `value[name] = v`.
    pub fn set<T: IntoJs>(&self, name: &str, value: T) -> Result<()> {
        let value = value.into_js(&self.ctx)?;
        self.ctx
            .check(self.ctx.engine().set_property(&self.raw, name, value.raw()))
    }

    /// `name in value`.
    pub fn has(&self, name: &str) -> bool {
        self.ctx.engine().has_property(&self.raw, name)
    }

    /// `delete value[name]`
    pub fn delete(&self, name: &str) -> bool {
        self.ctx.engine().delete_property(&self.raw, name)
    }

    /// Enumerable own property names.
    pub fn keys(&self) -> Vec<String> {
        self.ctx.engine().own_enumerable_keys(&self.raw)
    }

    // ===== Calls =====

    /// `value.call(this, ...args)`
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        let args = raw_args(args);
        let raw = self
            .ctx
            .check(self.ctx.engine().call(&self.raw, &this.raw, &args))?;
        Ok(Value::from_owned(&self.ctx, raw))
    }

    /// `value[name](...args)`
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.get(name)?;
        method.call(self, args)
    }

    /// `new value(...args)`
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        let args = raw_args(args);
        let raw = self
            .ctx
            .check(self.ctx.engine().call_constructor(&self.raw, &args))?;
        Ok(Value::from_owned(&self.ctx, raw))
    }

    /// `Reflect.construct(value, args, new_target)`.
    pub fn construct_with_new_target(&self, new_target: &Value, args: &[Value]) -> Result<Value> {
        let args = raw_args(args);
        let raw = self.ctx.check(self.ctx.engine().call_constructor_with_target(
            &self.raw,
            &new_target.raw,
            &args,
        ))?;
        Ok(Value::from_owned(&self.ctx, raw))
    }

    /// Construct an instance of a class built by a
    /// [`ClassBuilder`](crate::ClassBuilder).
    ///
    /// Fails with [`Error::ClassIdNotFound`] for any other value.
    pub fn call_constructor(&self, args: &[Value]) -> Result<Value> {
        if registry::class_id_of(self).is_none() {
            return Err(Error::ClassIdNotFound);
        }
        self.construct(args)
    }

    /// `value instanceof ctor`.
    pub fn instance_of(&self, ctor: &Value) -> Result<bool> {
        self.ctx
            .check(self.ctx.engine().instance_of(&self.raw, &ctor.raw))
    }

    // ===== Class instances =====

    /// Engine class of this value ([`ClassId::INVALID`] for immediates).
    pub fn class_id(&self) -> ClassId {
        self.ctx.engine().class_id(&self.raw)
    }

    /// Whether this value is an instance with a bound host object.
    pub fn has_instance_data(&self) -> bool {
        binder::resolve(&self.ctx, &self.raw).is_ok()
    }

    /// The host object bound to this instance.
    pub fn bound_object(&self) -> Result<BoundObject> {
        binder::resolve(&self.ctx, &self.raw)
    }

    /// Run `f` on the bound host object, checking its type.
    pub fn with_bound<T: HostObject, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.bound_object()?.with(f)
    }
}

/// Borrow the engine values of `args`.
fn raw_args(args: &[Value]) -> Vec<RawValue> {
    args.iter().map(|arg| arg.raw.clone()).collect()
}

impl Clone for Value {
    fn clone(&self) -> Self {
        Value::from_borrowed(&self.ctx, &self.raw)
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        if self.raw.is_object() {
            self.ctx.engine().runtime().free_value(&self.raw);
        }
    }
}

impl PartialEq for Value {
    /// Strict equality: same object, or equal primitives.
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.raw).finish()
    }
}

impl fmt::Display for Value {
    /// Script `String(value)` for primitives; objects render as
    /// `[object Object]`, errors as `Name: message`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            RawValue::Undefined => f.write_str("undefined"),
            RawValue::Null => f.write_str("null"),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Int(n) => write!(f, "{}", n),
            RawValue::Float(n) => write_number(f, *n),
            RawValue::String(s) => f.write_str(s),
            RawValue::Exception => f.write_str("[exception]"),
            RawValue::Object(_) => {
                if self.class_id() == ClassId::ERROR {
                    let part = |name: &str| self.get(name).ok().and_then(|v| v.as_str().map(String::from));
                    let name = part("name").unwrap_or_else(|| "Error".to_string());
                    match part("message") {
                        Some(message) if !message.is_empty() => write!(f, "{}: {}", name, message),
                        _ => f.write_str(&name),
                    }
                } else if self.is_function() {
                    f.write_str("function () { [native code] }")
                } else {
                    f.write_str("[object Object]")
                }
            }
        }
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == n.trunc() && n.abs() < 1e21 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}
