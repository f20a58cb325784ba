//! Object heap
//!
//! One heap per runtime, shared by all of its contexts. Objects are owned by
//! the heap and addressed by [`ObjectId`]; the collector is the only code
//! that removes them.

use crate::object::Object;
use crate::value::ObjectId;
use rustc_hash::FxHashMap;

/// Object storage for a runtime.
#[derive(Debug, Default)]
pub struct Heap {
    objects: FxHashMap<ObjectId, Object>,

    /// Allocations since the last collection
    allocated_since_gc: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object and return its ID.
    pub fn alloc(&mut self, object: Object) -> ObjectId {
        let id = ObjectId::next();
        self.objects.insert(id, object);
        self.allocated_since_gc += 1;
        id
    }

    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Iterate over live objects.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter().map(|(id, object)| (*id, object))
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn allocated_since_gc(&self) -> usize {
        self.allocated_since_gc
    }

    pub(crate) fn reset_allocation_counter(&mut self) {
        self.allocated_since_gc = 0;
    }

    pub(crate) fn objects_mut(&mut self) -> &mut FxHashMap<ObjectId, Object> {
        &mut self.objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassId;
    use crate::value::ContextToken;

    #[test]
    fn test_alloc_and_lookup() {
        let mut heap = Heap::new();
        let owner = ContextToken::next();
        let id = heap.alloc(Object::new(ClassId::OBJECT, None, owner));
        assert!(heap.contains(id));
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.allocated_since_gc(), 1);
        assert_eq!(heap.get(id).map(|o| o.owner), Some(owner));

        heap.reset_allocation_counter();
        assert_eq!(heap.allocated_since_gc(), 0);
    }
}
