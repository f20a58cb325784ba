//! Engine value representation
//!
//! A [`RawValue`] is either an immediate (undefined, null, bool, number,
//! string) or a reference to a heap object by [`ObjectId`]. The
//! `Exception` variant is the sentinel native functions return to signal
//! that an exception is pending on their context.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a heap object.
///
/// Object IDs are unique across the process, so a value can never alias an
/// object of another runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh object ID.
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ObjectId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque token identifying an engine runtime.
///
/// This is the value native trampolines receive in place of a runtime
/// pointer; host wrappers are recovered from it through a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeToken(u64);

impl RuntimeToken {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        RuntimeToken(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw token value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RuntimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rt:{}", self.0)
    }
}

/// Opaque token identifying an engine context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextToken(u64);

impl ContextToken {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextToken(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw token value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx:{}", self.0)
    }
}

/// A script value as seen by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer number
    Int(i32),
    /// Floating point number
    Float(f64),
    /// Immutable string
    String(Arc<str>),
    /// Reference to a heap object
    Object(ObjectId),
    /// Sentinel: an exception is pending on the current context
    Exception,
}

impl RawValue {
    /// Create a string value.
    pub fn string(s: &str) -> Self {
        RawValue::String(Arc::from(s))
    }

    /// Create a number, using the integer representation when exact.
    pub fn number(n: f64) -> Self {
        let negative_zero = n == 0.0 && n.is_sign_negative();
        if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 && !negative_zero {
            RawValue::Int(n as i32)
        } else {
            RawValue::Float(n)
        }
    }

    /// Get the object ID if this is an object.
    #[inline]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            RawValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Check if this value references a heap object.
    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, RawValue::Object(_))
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        matches!(self, RawValue::Exception)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, RawValue::Undefined)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Check if this is a number (integer or float).
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, RawValue::Int(_) | RawValue::Float(_))
    }

    /// Get the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Int(i) => Some(*i as f64),
            RawValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Script `typeof` name of the value (objects report `"object"`).
    pub fn type_name(&self) -> &'static str {
        match self {
            RawValue::Undefined => "undefined",
            RawValue::Null => "null",
            RawValue::Bool(_) => "boolean",
            RawValue::Int(_) | RawValue::Float(_) => "number",
            RawValue::String(_) => "string",
            RawValue::Object(_) => "object",
            RawValue::Exception => "exception",
        }
    }

    /// Truthiness of an immediate value (objects are always truthy).
    pub fn is_truthy(&self) -> bool {
        match self {
            RawValue::Undefined | RawValue::Null | RawValue::Exception => false,
            RawValue::Bool(b) => *b,
            RawValue::Int(i) => *i != 0,
            RawValue::Float(f) => *f != 0.0 && !f.is_nan(),
            RawValue::String(s) => !s.is_empty(),
            RawValue::Object(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ids_unique() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_number_normalization() {
        assert_eq!(RawValue::number(5.0), RawValue::Int(5));
        assert_eq!(RawValue::number(2.5), RawValue::Float(2.5));
        assert!(matches!(RawValue::number(-0.0), RawValue::Float(_)));
        assert!(matches!(RawValue::number(1e12), RawValue::Float(_)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!RawValue::Undefined.is_truthy());
        assert!(!RawValue::Int(0).is_truthy());
        assert!(RawValue::string("x").is_truthy());
        assert!(!RawValue::Float(f64::NAN).is_truthy());
    }
}
