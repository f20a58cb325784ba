//! Handle store
//!
//! Maps sequential integer IDs to host values so that native code, which
//! can only carry an integer (a function's `magic`, an instance's opaque
//! word), can refer to them. One store exists per context and is cleared
//! when the context closes.

use crate::error::{Error, Result};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of a handle store entry.
///
/// Always positive; `0` is reserved as the invalid ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(i32);

impl HandleId {
    /// Reserved "no handle" ID.
    pub const INVALID: HandleId = HandleId(0);

    /// Largest ID a store will hand out.
    pub const MAX: HandleId = HandleId(i32::MAX);

    /// Rebuild a handle ID from its raw value (e.g. a function's magic).
    pub fn from_i32(raw: i32) -> Self {
        HandleId(raw)
    }

    /// Rebuild a handle ID from an opaque word.
    pub fn from_word(word: usize) -> Self {
        HandleId(i32::try_from(word).unwrap_or(0))
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// Encode as an opaque word.
    pub fn as_word(&self) -> usize {
        self.0.max(0) as usize
    }

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concurrent registry of host values keyed by [`HandleId`].
pub struct HandleStore<T> {
    /// Map of handle ID to stored value
    entries: DashMap<HandleId, T>,

    /// Next ID to hand out
    next: AtomicU32,
}

impl<T> HandleStore<T> {
    /// Create an empty store whose first ID is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create an empty store whose first ID is `next`.
    ///
    /// Values below 1 are raised to 1.
    pub fn starting_at(next: i32) -> Self {
        Self {
            entries: DashMap::new(),
            next: AtomicU32::new(next.max(1) as u32),
        }
    }

    /// Store a value and return its new ID.
    ///
    /// # Panics
    ///
    /// Panics when the ID space is exhausted. IDs are never reused, so
    /// wrapping around would alias live entries.
    pub fn store(&self, value: T) -> HandleId {
        match self.try_store(value) {
            Ok(id) => id,
            Err(err) => panic!("{}", err),
        }
    }

    /// Store a value, failing instead of panicking when the ID space is
    /// exhausted.
    pub fn try_store(&self, value: T) -> Result<HandleId> {
        let max = HandleId::MAX.0 as u32;
        let raw = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next != 0 && next <= max).then(|| next + 1)
            })
            .map_err(|_| Error::HandleOverflow { max: HandleId::MAX.0 })?;

        let id = HandleId(raw as i32);
        self.entries.insert(id, value);
        log::trace!("handle {} stored", id);
        Ok(id)
    }

    /// Run `f` on the value stored under `id`.
    pub fn with<R>(&self, id: HandleId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.entries.get(&id).map(|entry| f(entry.value()))
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Remove an entry; returns whether it existed.
    pub fn delete(&self, id: HandleId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            log::trace!("handle {} deleted", id);
        }
        removed
    }

    /// Remove an entry and return its value.
    pub fn take(&self, id: HandleId) -> Option<T> {
        self.entries.remove(&id).map(|(_, value)| value)
    }

    /// Swap the value of a live entry, returning the old value.
    ///
    /// Absent IDs are left absent.
    pub fn replace(&self, id: HandleId, value: T) -> Option<T> {
        self.entries
            .get_mut(&id)
            .map(|mut entry| std::mem::replace(entry.value_mut(), value))
    }

    /// Remove every entry.
    ///
    /// The ID counter is not reset, so IDs handed out before the clear are
    /// never reused.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted snapshot of the live IDs.
    pub fn ids(&self) -> Vec<HandleId> {
        let mut ids: Vec<_> = self.entries.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}

impl<T: Clone> HandleStore<T> {
    /// Get a clone of the value stored under `id`.
    pub fn load(&self, id: HandleId) -> Option<T> {
        self.with(id, T::clone)
    }
}

impl<T> Default for HandleStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleStore")
            .field("count", &self.count())
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_creation() {
        let store: HandleStore<String> = HandleStore::new();
        assert_eq!(store.count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_ids_sequential_from_one() {
        let store = HandleStore::new();
        let a = store.store("a");
        let b = store.store("b");
        assert_eq!(a.as_i32(), 1);
        assert_eq!(b.as_i32(), 2);
        assert_eq!(store.ids(), vec![a, b]);
    }

    #[test]
    fn test_load_delete() {
        let store = HandleStore::new();
        let id = store.store(42u64);
        assert_eq!(store.load(id), Some(42));
        assert!(store.delete(id));
        assert_eq!(store.load(id), None);
        assert!(!store.delete(id));
        assert!(!store.delete(HandleId::INVALID));
    }

    #[test]
    fn test_replace_and_take() {
        let store = HandleStore::new();
        let id = store.store(1);
        assert_eq!(store.replace(id, 2), Some(1));
        assert_eq!(store.load(id), Some(2));
        assert_eq!(store.take(id), Some(2));
        assert_eq!(store.replace(id, 3), None);
        assert!(!store.contains(id));
    }

    #[test]
    fn test_clear_does_not_reuse_ids() {
        let store = HandleStore::new();
        let first = store.store(());
        store.clear();
        assert_eq!(store.count(), 0);
        let second = store.store(());
        assert!(second > first);
    }

    #[test]
    fn test_overflow_fails_fast() {
        let store = HandleStore::starting_at(i32::MAX - 1);
        assert_eq!(store.store(1).as_i32(), i32::MAX - 1);
        assert_eq!(store.store(2).as_i32(), i32::MAX);
        assert_eq!(
            store.try_store(3),
            Err(Error::HandleOverflow { max: i32::MAX })
        );
        // A failed store does not advance the counter or insert anything
        assert_eq!(store.count(), 2);
        assert!(store.try_store(4).is_err());
    }

    #[test]
    #[should_panic(expected = "handle store exhausted")]
    fn test_store_panics_on_overflow() {
        let store = HandleStore::starting_at(i32::MAX);
        store.store(1);
        store.store(2);
    }

    #[test]
    fn test_word_round_trip() {
        let id = HandleId::from_i32(17);
        assert_eq!(HandleId::from_word(id.as_word()), id);
        assert!(!HandleId::from_word(usize::MAX).is_valid());
    }
}
