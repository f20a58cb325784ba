//! Heap objects
//!
//! An object is a class tag, a prototype link, an ordered property list and
//! optional native parts: a callable (for functions) and an opaque slot (for
//! instances of embedder classes).

use crate::class::ClassId;
use crate::context::EngineContext;
use crate::value::{ContextToken, ObjectId, RawValue};
use bitflags::bitflags;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Property attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u8 {
        const WRITABLE = 1 << 0;
        const ENUMERABLE = 1 << 1;
        const CONFIGURABLE = 1 << 2;
    }
}

impl PropertyFlags {
    /// Writable, enumerable and configurable.
    pub const DEFAULT: PropertyFlags = PropertyFlags::all();

    /// Writable and configurable, not enumerable (methods, built-in slots).
    pub const HIDDEN: PropertyFlags = PropertyFlags::WRITABLE.union(PropertyFlags::CONFIGURABLE);
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Native function signature.
///
/// `this` is the receiver for plain calls, getters and setters; for
/// constructor functions it is the `new.target` of the construction.
/// The return value is owned by the caller. Returning
/// [`RawValue::Exception`] signals that an exception is pending on `ctx`.
pub type CFunction = fn(ctx: &EngineContext, this: &RawValue, args: &[RawValue], magic: i32) -> RawValue;

/// How a native function may be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Ordinary function, callable but not constructible
    Generic,
    /// Constructor, only invocable with `new`
    Constructor,
    /// Property getter, called with no arguments
    Getter,
    /// Property setter, called with exactly one argument
    Setter,
}

/// A function implemented by the embedder.
#[derive(Debug, Clone)]
pub struct NativeFunction {
    pub func: CFunction,
    pub kind: FunctionKind,
    pub magic: i32,
    pub name: Arc<str>,
}

/// Callable part of a function object.
#[derive(Debug, Clone)]
pub enum Callable {
    Native(NativeFunction),
    /// Constructor of a script-side subclass; construction is delegated to
    /// `base` with the subclass as `new.target`
    Derived { base: ObjectId, name: Arc<str> },
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Native(f) => &f.name,
            Callable::Derived { name, .. } => name,
        }
    }

    pub fn is_constructor(&self) -> bool {
        match self {
            Callable::Native(f) => f.kind == FunctionKind::Constructor,
            Callable::Derived { .. } => true,
        }
    }
}

/// Embedder data attached to an instance.
#[derive(Clone)]
pub enum Opaque {
    /// Plain integer payload (handle IDs and the like)
    Word(usize),
    /// Shared pointer to arbitrary host data
    Shared(Arc<dyn Any + Send + Sync>),
}

impl Opaque {
    pub fn as_word(&self) -> Option<usize> {
        match self {
            Opaque::Word(w) => Some(*w),
            Opaque::Shared(_) => None,
        }
    }

    pub fn as_shared(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        match self {
            Opaque::Word(_) => None,
            Opaque::Shared(ptr) => Some(ptr),
        }
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opaque::Word(w) => f.debug_tuple("Word").field(w).finish(),
            Opaque::Shared(ptr) => write!(f, "Shared({:p})", Arc::as_ptr(ptr)),
        }
    }
}

/// Storage of a single property.
#[derive(Debug, Clone)]
pub enum PropertySlot {
    Data(RawValue),
    Accessor {
        getter: Option<ObjectId>,
        setter: Option<ObjectId>,
    },
}

#[derive(Debug, Clone)]
pub struct Property {
    pub flags: PropertyFlags,
    pub slot: PropertySlot,
}

/// A heap object.
#[derive(Debug)]
pub struct Object {
    pub class_id: ClassId,
    pub proto: Option<ObjectId>,
    /// Context the object was created in
    pub owner: ContextToken,
    pub callable: Option<Callable>,
    pub opaque: Option<Opaque>,
    properties: Vec<(Arc<str>, Property)>,
    /// Number of references held by the host
    pub host_refs: u32,
    /// Mark bit for GC (true = reachable)
    pub marked: bool,
}

impl Object {
    pub fn new(class_id: ClassId, proto: Option<ObjectId>, owner: ContextToken) -> Self {
        Self {
            class_id,
            proto,
            owner,
            callable: None,
            opaque: None,
            properties: Vec::new(),
            host_refs: 0,
            marked: false,
        }
    }

    pub fn with_callable(mut self, callable: Callable) -> Self {
        self.callable = Some(callable);
        self
    }

    /// Look up an own property.
    pub fn own(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, prop)| prop)
    }

    /// Define or replace an own property, keeping its insertion position.
    pub fn define(&mut self, name: &str, prop: Property) {
        match self.properties.iter_mut().find(|(key, _)| &**key == name) {
            Some((_, existing)) => *existing = prop,
            None => self.properties.push((Arc::from(name), prop)),
        }
    }

    /// Remove an own property, returning it.
    pub fn remove(&mut self, name: &str) -> Option<Property> {
        let index = self.properties.iter().position(|(key, _)| &**key == name)?;
        Some(self.properties.remove(index).1)
    }

    /// Iterate own properties in insertion order.
    pub fn properties(&self) -> impl Iterator<Item = (&Arc<str>, &Property)> {
        self.properties.iter().map(|(key, prop)| (key, prop))
    }

    /// Every object this object references.
    pub fn references(&self) -> Vec<ObjectId> {
        let mut refs = Vec::new();
        if let Some(proto) = self.proto {
            refs.push(proto);
        }
        if let Some(Callable::Derived { base, .. }) = &self.callable {
            refs.push(*base);
        }
        for (_, prop) in &self.properties {
            match &prop.slot {
                PropertySlot::Data(value) => refs.extend(value.as_object()),
                PropertySlot::Accessor { getter, setter } => {
                    refs.extend(*getter);
                    refs.extend(*setter);
                }
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> ContextToken {
        ContextToken::next()
    }

    #[test]
    fn test_define_keeps_order() {
        let mut obj = Object::new(ClassId::OBJECT, None, owner());
        let data = |v| Property {
            flags: PropertyFlags::DEFAULT,
            slot: PropertySlot::Data(RawValue::Int(v)),
        };
        obj.define("a", data(1));
        obj.define("b", data(2));
        obj.define("a", data(3));

        let names: Vec<&str> = obj.properties().map(|(k, _)| &**k).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(matches!(
            obj.own("a").map(|p| &p.slot),
            Some(PropertySlot::Data(RawValue::Int(3)))
        ));
    }

    #[test]
    fn test_references() {
        let proto = ObjectId::next();
        let getter = ObjectId::next();
        let held = ObjectId::next();
        let mut obj = Object::new(ClassId::OBJECT, Some(proto), owner());
        obj.define(
            "x",
            Property {
                flags: PropertyFlags::DEFAULT,
                slot: PropertySlot::Accessor {
                    getter: Some(getter),
                    setter: None,
                },
            },
        );
        obj.define(
            "y",
            Property {
                flags: PropertyFlags::DEFAULT,
                slot: PropertySlot::Data(RawValue::Object(held)),
            },
        );
        let refs = obj.references();
        assert_eq!(refs, vec![proto, getter, held]);
    }

    #[test]
    fn test_default_flags() {
        assert!(PropertyFlags::default().contains(PropertyFlags::WRITABLE));
        assert!(!PropertyFlags::HIDDEN.contains(PropertyFlags::ENUMERABLE));
    }
}
