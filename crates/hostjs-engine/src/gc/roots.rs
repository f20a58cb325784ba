//! GC root tracking

use crate::value::{ObjectId, RawValue};

/// Root set for garbage collection.
///
/// Rebuilt for every collection from the runtime state.
#[derive(Debug, Default)]
pub struct RootSet {
    /// Values on the native call stack
    stack_roots: Vec<ObjectId>,

    /// Context intrinsics, globals and pending exceptions
    context_roots: Vec<ObjectId>,

    /// Objects referenced by the host
    host_roots: Vec<ObjectId>,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stack root (immediates are ignored).
    pub fn add_stack_root(&mut self, value: &RawValue) {
        if let Some(id) = value.as_object() {
            self.stack_roots.push(id);
        }
    }

    pub fn add_context_root(&mut self, id: ObjectId) {
        self.context_roots.push(id);
    }

    pub fn add_host_root(&mut self, id: ObjectId) {
        self.host_roots.push(id);
    }

    /// Iterate over all roots.
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.stack_roots
            .iter()
            .chain(self.context_roots.iter())
            .chain(self.host_roots.iter())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.stack_roots.len() + self.context_roots.len() + self.host_roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediates_not_rooted() {
        let mut roots = RootSet::new();
        roots.add_stack_root(&RawValue::Int(1));
        roots.add_stack_root(&RawValue::string("s"));
        assert!(roots.is_empty());

        let id = ObjectId::next();
        roots.add_stack_root(&RawValue::Object(id));
        roots.add_host_root(id);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots.iter().collect::<Vec<_>>(), vec![id, id]);
    }
}
