//! hostjs: expose host objects, functions and classes to an embedded
//! script engine
//!
//! The engine only understands native callbacks keyed by an integer. This
//! crate bridges that gap:
//!
//! - [`handle`]: per-context store mapping integer IDs to host values
//! - [`registry`]: process-wide maps from engine tokens back to host
//!   contexts/runtimes, and from constructors to their class IDs
//! - [`class`]: [`ClassBuilder`], the native trampolines and instance
//!   binding
//! - [`reflect`]: binding a struct as a class from its [`Reflect`]
//!   description
//! - [`Runtime`], [`Context`], [`Value`] and the [`IntoJs`] / [`FromJs`]
//!   conversions
//!
//! # Example
//!
//! ```ignore
//! use hostjs::{ClassBuilder, Context, HostObject, Runtime, Value};
//!
//! struct Point { x: f64, y: f64 }
//! impl HostObject for Point {}
//!
//! let rt = Runtime::new();
//! let ctx = rt.new_context()?;
//! let point = ClassBuilder::new("Point")
//!     .constructor(|_ctx: &Context, _this: &Value, args: &[Value]| {
//!         Ok(Point { x: args[0].to_f64()?, y: args[1].to_f64()? })
//!     })
//!     .method("norm", |_ctx: &Context, this: &Value, _args: &[Value]| {
//!         this.with_bound(|p: &mut Point| (p.x * p.x + p.y * p.y).sqrt())
//!     })
//!     .build(&ctx)?;
//!
//! let p = point.constructor.construct(&[ctx.int(3), ctx.int(4)])?;
//! assert_eq!(p.call_method("norm", &[])?.to_f64()?, 5.0);
//! ```

extern crate self as hostjs;

pub mod class;
pub mod context;
pub mod convert;
pub mod error;
pub mod handle;
pub mod reflect;
pub mod registry;
pub mod runtime;
pub mod value;

pub use class::{
    getter, setter, BoundObject, BuiltClass, ClassBuilder, ConstructorFn, GetterFn, HostEntry,
    HostObject, MethodFn, PropertyValue, SetterFn,
};
pub use context::Context;
pub use convert::{FromJs, IntoJs};
pub use error::{CallbackKind, Error, MemberScope, Result};
pub use handle::{HandleId, HandleStore};
pub use reflect::{plan, FieldInfo, Member, MethodInfo, Reflect, ReflectOptions};
pub use registry::class_id_of;
pub use runtime::{BindingMode, InterruptFn, Runtime, RuntimeOptions};
pub use value::Value;

pub use hostjs_engine::{ClassId, ErrorKind, PropertyFlags};
pub use hostjs_macros::Reflect;
