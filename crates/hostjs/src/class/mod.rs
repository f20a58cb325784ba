//! Class binding
//!
//! Host types become script classes through a [`ClassBuilder`]. Every
//! callable member is stored in the context's handle store as a
//! [`HostEntry`]; the engine only sees the entry's ID, passed back to the
//! trampolines in [`dispatch`] as the native function's `magic`.
//!
//! Instances carry their host object either as a handle ID or as a direct
//! shared pointer in their opaque slot (see [`BindingMode`](crate::BindingMode)).

pub mod builder;
pub(crate) mod binder;
pub(crate) mod dispatch;

pub use builder::{BuiltClass, ClassBuilder, PropertyValue};

use crate::context::Context;
use crate::convert::IntoJs;
use crate::error::{CallbackKind, Error, Result};
use crate::value::Value;
use hostjs_engine::{ClassId, EngineRuntime, PropertyFlags, RawValue};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Host objects
// ============================================================================

/// Upcast helper implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A host value that can be bound to a script instance.
///
/// `finalize` is called once, from the collector's finalizer, when the
/// script instance becomes unreachable.
pub trait HostObject: AsAny + Send {
    fn finalize(&mut self) {}
}

struct BoundInner {
    object: Mutex<Box<dyn HostObject>>,
    type_name: &'static str,
    finalized: AtomicBool,
}

/// Shared handle to the host object bound to an instance.
///
/// The instance owns the binding; other clones are lookups into it and
/// must not outlive the instance's usefulness.
#[derive(Clone)]
pub struct BoundObject {
    inner: Arc<BoundInner>,
}

impl BoundObject {
    pub fn new<T: HostObject>(object: T) -> Self {
        Self {
            inner: Arc::new(BoundInner {
                object: Mutex::new(Box::new(object)),
                type_name: std::any::type_name::<T>(),
                finalized: AtomicBool::new(false),
            }),
        }
    }

    /// Type name of the bound host object.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// Check the concrete type of the bound object.
    pub fn is<T: HostObject>(&self) -> bool {
        let guard = self.inner.object.lock();
        let object: &dyn HostObject = &**guard;
        object.as_any().is::<T>()
    }

    /// Run `f` with exclusive access to the bound object.
    ///
    /// The object stays locked while `f` runs; calling back into the same
    /// instance's bound object from inside `f` deadlocks.
    pub fn with<T: HostObject, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.inner.object.lock();
        let object: &mut dyn HostObject = &mut **guard;
        let object = object
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(Error::ObjectTypeMismatch {
                expected: std::any::type_name::<T>(),
            })?;
        Ok(f(object))
    }

    /// Call the object's `finalize` hook unless it already ran.
    pub(crate) fn finalize(&self) -> bool {
        if self.inner.finalized.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut guard = self.inner.object.lock();
        let object: &mut dyn HostObject = &mut **guard;
        object.finalize();
        true
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.finalized.load(Ordering::SeqCst)
    }

    /// Whether two handles refer to the same bound object.
    pub fn ptr_eq(&self, other: &BoundObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for BoundObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundObject")
            .field("type", &self.inner.type_name)
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Constructor callback: `(ctx, instance, args) -> host object`.
pub type ConstructorFn = Arc<dyn Fn(&Context, &Value, &[Value]) -> Result<BoundObject> + Send + Sync>;

/// Plain function, method and static method callback: `(ctx, this, args)`.
pub type MethodFn = Arc<dyn Fn(&Context, &Value, &[Value]) -> Result<Value> + Send + Sync>;

/// Getter callback: `(ctx, this)`.
pub type GetterFn = Arc<dyn Fn(&Context, &Value) -> Result<Value> + Send + Sync>;

/// Setter callback: `(ctx, this, value)`.
pub type SetterFn = Arc<dyn Fn(&Context, &Value, &Value) -> Result<()> + Send + Sync>;

/// Build a [`GetterFn`] from a closure returning any convertible value.
pub fn getter<F, R>(f: F) -> GetterFn
where
    F: Fn(&Context, &Value) -> Result<R> + Send + Sync + 'static,
    R: IntoJs,
{
    Arc::new(move |ctx: &Context, this: &Value| f(ctx, this)?.into_js(ctx))
}

/// Build a [`SetterFn`] from a closure.
pub fn setter<F>(f: F) -> SetterFn
where
    F: Fn(&Context, &Value, &Value) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Data property defined on every new instance.
#[derive(Debug)]
pub(crate) struct InstanceProperty {
    pub name: String,
    /// Holds one host reference for the lifetime of the class
    pub value: RawValue,
    pub flags: PropertyFlags,
}

/// Everything the construction trampoline needs about a class.
pub struct ConstructorEntry {
    pub(crate) callback: ConstructorFn,
    pub(crate) class_id: ClassId,
    pub(crate) class_name: String,
    pub(crate) instance_properties: Vec<InstanceProperty>,
    /// Releases the instance property values on drop
    pub(crate) runtime: EngineRuntime,
}

impl ConstructorEntry {
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

impl Drop for ConstructorEntry {
    fn drop(&mut self) {
        for prop in &self.instance_properties {
            self.runtime.free_value(&prop.value);
        }
    }
}

/// A handle store entry.
///
/// The closed set of things native code can refer to by handle ID. Each
/// trampoline expects exactly one variant and treats any other as a type
/// error.
#[derive(Clone)]
pub enum HostEntry {
    Function(MethodFn),
    Constructor(Arc<ConstructorEntry>),
    Method(MethodFn),
    Getter(GetterFn),
    Setter(SetterFn),
    Object(BoundObject),
}

impl HostEntry {
    /// Callback kind of this entry (`None` for bound objects).
    pub fn callback_kind(&self) -> Option<CallbackKind> {
        match self {
            HostEntry::Function(_) => Some(CallbackKind::Function),
            HostEntry::Constructor(_) => Some(CallbackKind::Constructor),
            HostEntry::Method(_) => Some(CallbackKind::Method),
            HostEntry::Getter(_) => Some(CallbackKind::Getter),
            HostEntry::Setter(_) => Some(CallbackKind::Setter),
            HostEntry::Object(_) => None,
        }
    }
}

impl fmt::Debug for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEntry::Function(_) => f.write_str("Function"),
            HostEntry::Constructor(entry) => write!(f, "Constructor({})", entry.class_name),
            HostEntry::Method(_) => f.write_str("Method"),
            HostEntry::Getter(_) => f.write_str("Getter"),
            HostEntry::Setter(_) => f.write_str("Setter"),
            HostEntry::Object(object) => write!(f, "Object({})", object.type_name()),
        }
    }
}
