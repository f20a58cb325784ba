//! Class table
//!
//! A class gives instances a stable tag ([`ClassId`]), a default prototype
//! per context, and an optional finalizer the collector calls when an
//! instance becomes unreachable.

use crate::object::Opaque;
use crate::runtime::EngineRuntime;
use crate::value::ContextToken;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Engine-assigned class tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Reserved "no class" tag.
    pub const INVALID: ClassId = ClassId(0);
    /// Plain objects
    pub const OBJECT: ClassId = ClassId(1);
    /// Function objects
    pub const FUNCTION: ClassId = ClassId(2);
    /// Error objects
    pub const ERROR: ClassId = ClassId(3);

    const FIRST_USER: u32 = 16;

    /// Allocate a new class ID.
    ///
    /// IDs are process-wide, so one ID may be registered with several
    /// runtimes.
    pub fn new() -> Self {
        static NEXT_ID: AtomicU32 = AtomicU32::new(ClassId::FIRST_USER);
        ClassId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild a class ID from its raw value.
    pub fn from_u32(raw: u32) -> Self {
        ClassId(raw)
    }

    /// Get the raw ID value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Check if this is a class registered by an embedder.
    pub fn is_user(&self) -> bool {
        self.0 >= Self::FIRST_USER
    }
}

impl Default for ClassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Information handed to a class finalizer.
#[derive(Debug, Clone)]
pub struct FinalizeInfo {
    /// Class of the collected instance
    pub class_id: ClassId,
    /// Context the instance was created in
    pub owner: ContextToken,
    /// The instance's opaque slot, if it was set
    pub opaque: Option<Opaque>,
}

/// Finalizer called by the collector for each unreachable instance.
///
/// Runs after the sweep, outside of any engine lock. The instance no longer
/// exists when the finalizer is called.
pub type ClassFinalizer = fn(rt: &EngineRuntime, info: FinalizeInfo);

/// Class definition passed to [`EngineRuntime::new_class`].
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub finalizer: Option<ClassFinalizer>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            finalizer: None,
        }
    }

    pub fn with_finalizer(mut self, finalizer: ClassFinalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }
}

/// Per-runtime table of registered classes.
#[derive(Debug, Default)]
pub struct ClassTable {
    classes: FxHashMap<ClassId, ClassDef>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class; returns false if the ID was already registered.
    pub fn register(&mut self, id: ClassId, def: ClassDef) -> bool {
        if self.classes.contains_key(&id) {
            return false;
        }
        self.classes.insert(id, def);
        true
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(&id)
    }

    pub fn contains(&self, id: ClassId) -> bool {
        self.classes.contains_key(&id)
    }

    pub fn finalizer(&self, id: ClassId) -> Option<ClassFinalizer> {
        self.classes.get(&id).and_then(|def| def.finalizer)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ids_are_user_range() {
        let a = ClassId::new();
        let b = ClassId::new();
        assert!(a.is_user());
        assert!(b.as_u32() > a.as_u32());
        assert!(!ClassId::OBJECT.is_user());
    }

    #[test]
    fn test_register_twice() {
        let mut table = ClassTable::new();
        let id = ClassId::new();
        assert!(table.register(id, ClassDef::new("Point")));
        assert!(!table.register(id, ClassDef::new("Other")));
        assert_eq!(table.get(id).map(|d| d.name.as_str()), Some("Point"));
        assert_eq!(table.len(), 1);
    }
}
