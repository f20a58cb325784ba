//! hostjs-engine: the native script engine behind hostjs
//!
//! This crate provides the small native contract the bridge is written
//! against:
//! - class registration with per-class finalizers and opaque instance slots
//! - native functions dispatched by an integer `magic` identifier
//! - a mark-sweep collector that runs finalizers for unreachable instances
//! - an interrupt hook polled at every call boundary
//! - exceptions that are thrown and caught across the native boundary
//!
//! It has no parser; script-level behavior (property lookup, `new`,
//! `instanceof`, subclassing) is reached through [`EngineContext`].
//!
//! # Ownership
//!
//! Every function that creates or returns a [`RawValue`] hands the caller
//! one host reference on it. Arguments are borrowed. Host references are
//! released with [`EngineRuntime::free_value`]. Values stored in object
//! properties are kept alive by tracing, not by host references.

pub mod class;
pub mod context;
pub mod error;
pub mod gc;
pub mod heap;
pub mod object;
pub mod runtime;
pub mod value;

pub use class::{ClassDef, ClassFinalizer, ClassId, FinalizeInfo};
pub use context::{EngineContext, ErrorKind, PropertyDescriptor};
pub use error::{EngineError, JsResult};
pub use gc::GcStats;
pub use object::{CFunction, FunctionKind, Opaque, PropertyFlags};
pub use runtime::{EngineRuntime, InterruptHandler, RuntimeLimits};
pub use value::{ContextToken, ObjectId, RawValue, RuntimeToken};
