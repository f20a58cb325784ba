//! Conversions between host values and script values
//!
//! [`IntoJs`] and [`FromJs`] cover the primitive types host callbacks
//! usually exchange. Numbers follow script semantics: every numeric type
//! goes through `f64`, integers are exact up to 2^53.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::Value;

/// Convert a host value into a script value.
pub trait IntoJs {
    fn into_js(self, ctx: &Context) -> Result<Value>;
}

/// Convert a script value into a host value.
pub trait FromJs: Sized {
    fn from_js(value: &Value) -> Result<Self>;
}

// ============================================================================
// IntoJs
// ============================================================================

impl IntoJs for Value {
    fn into_js(self, _ctx: &Context) -> Result<Value> {
        Ok(self)
    }
}

impl IntoJs for &Value {
    fn into_js(self, _ctx: &Context) -> Result<Value> {
        Ok(self.clone())
    }
}

impl IntoJs for () {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.undefined())
    }
}

impl IntoJs for bool {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.bool(self))
    }
}

impl IntoJs for i32 {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.int(self))
    }
}

impl IntoJs for u32 {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.float(self as f64))
    }
}

impl IntoJs for i64 {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.float(self as f64))
    }
}

impl IntoJs for f32 {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.float(self as f64))
    }
}

impl IntoJs for f64 {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.float(self))
    }
}

impl IntoJs for String {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.string(&self))
    }
}

impl IntoJs for &str {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        Ok(ctx.string(self))
    }
}

impl<T: IntoJs> IntoJs for Option<T> {
    fn into_js(self, ctx: &Context) -> Result<Value> {
        match self {
            Some(value) => value.into_js(ctx),
            None => Ok(ctx.null()),
        }
    }
}

// ============================================================================
// FromJs
// ============================================================================

impl FromJs for Value {
    fn from_js(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromJs for () {
    fn from_js(_value: &Value) -> Result<Self> {
        Ok(())
    }
}

impl FromJs for bool {
    fn from_js(value: &Value) -> Result<Self> {
        if value.is_bool() {
            Ok(value.to_bool())
        } else {
            Err(Error::type_mismatch("boolean", value.type_name()))
        }
    }
}

impl FromJs for f64 {
    fn from_js(value: &Value) -> Result<Self> {
        value.to_f64()
    }
}

impl FromJs for f32 {
    fn from_js(value: &Value) -> Result<Self> {
        Ok(value.to_f64()? as f32)
    }
}

impl FromJs for i32 {
    fn from_js(value: &Value) -> Result<Self> {
        value.to_i32()
    }
}

impl FromJs for i64 {
    fn from_js(value: &Value) -> Result<Self> {
        let n = value.to_f64()?;
        Ok(if n.is_finite() { n as i64 } else { 0 })
    }
}

impl FromJs for u32 {
    fn from_js(value: &Value) -> Result<Self> {
        let n = value.to_f64()?;
        Ok(if n.is_finite() { n as u32 } else { 0 })
    }
}

impl FromJs for String {
    fn from_js(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| Error::type_mismatch("string", value.type_name()))
    }
}

impl<T: FromJs> FromJs for Option<T> {
    fn from_js(value: &Value) -> Result<Self> {
        if value.is_undefined() || value.is_null() {
            Ok(None)
        } else {
            T::from_js(value).map(Some)
        }
    }
}
