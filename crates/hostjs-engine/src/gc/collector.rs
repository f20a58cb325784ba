//! Mark-sweep garbage collector

use super::roots::RootSet;
use crate::class::{ClassFinalizer, ClassTable, FinalizeInfo};
use crate::heap::Heap;
use std::time::{Duration, Instant};

/// Garbage collector statistics.
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total finalizers scheduled
    pub finalizers_scheduled: usize,

    /// Total pause time across all collections
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,

    /// Maximum pause time
    pub max_pause_time: Duration,

    /// Objects marked in last collection
    pub last_marked_count: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Live objects after last collection
    pub live_objects: usize,
}

impl GcStats {
    /// Update statistics after a collection.
    fn update(&mut self, pause_time: Duration, marked: usize, freed: usize, finalizers: usize, live: usize) {
        self.collections += 1;
        self.objects_freed += freed;
        self.finalizers_scheduled += finalizers;
        self.total_pause_time += pause_time;
        self.last_pause_time = pause_time;
        if pause_time > self.max_pause_time {
            self.max_pause_time = pause_time;
        }
        self.last_marked_count = marked;
        self.last_freed_count = freed;
        self.live_objects = live;
    }

    /// Average pause time over all collections.
    pub fn avg_pause_time(&self) -> Duration {
        if self.collections == 0 {
            return Duration::ZERO;
        }
        self.total_pause_time / self.collections as u32
    }
}

/// Result of one collection.
///
/// Finalizers are returned rather than run so the caller can invoke them
/// after releasing the runtime lock.
#[derive(Debug, Default)]
pub struct GcOutcome {
    pub freed: usize,
    pub pending_finalizers: Vec<(ClassFinalizer, FinalizeInfo)>,
}

/// Run one mark-sweep collection over `heap`.
pub fn collect(heap: &mut Heap, roots: &RootSet, classes: &ClassTable, stats: &mut GcStats) -> GcOutcome {
    let start = Instant::now();

    let marked = mark(heap, roots);
    let outcome = sweep(heap, classes);

    heap.reset_allocation_counter();
    stats.update(
        start.elapsed(),
        marked,
        outcome.freed,
        outcome.pending_finalizers.len(),
        heap.len(),
    );
    outcome
}

/// Mark phase: flag everything reachable from the roots.
fn mark(heap: &mut Heap, roots: &RootSet) -> usize {
    let mut marked = 0;
    let mut worklist: Vec<_> = roots.iter().collect();

    while let Some(id) = worklist.pop() {
        let Some(object) = heap.get_mut(id) else {
            continue;
        };
        if object.marked {
            continue;
        }
        object.marked = true;
        marked += 1;
        worklist.extend(object.references());
    }

    marked
}

/// Sweep phase: free unmarked objects and clear the mark on survivors.
fn sweep(heap: &mut Heap, classes: &ClassTable) -> GcOutcome {
    let mut outcome = GcOutcome::default();
    let objects = heap.objects_mut();

    let dead: Vec<_> = objects
        .iter()
        .filter(|(_, object)| !object.marked)
        .map(|(id, _)| *id)
        .collect();

    for object in objects.values_mut() {
        object.marked = false;
    }

    for id in dead {
        let Some(object) = objects.remove(&id) else {
            continue;
        };
        outcome.freed += 1;
        if let Some(finalizer) = classes.finalizer(object.class_id) {
            outcome.pending_finalizers.push((
                finalizer,
                FinalizeInfo {
                    class_id: object.class_id,
                    owner: object.owner,
                    opaque: object.opaque,
                },
            ));
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, ClassId};
    use crate::object::{Object, Property, PropertyFlags, PropertySlot};
    use crate::runtime::EngineRuntime;
    use crate::value::{ContextToken, RawValue};

    fn noop_finalizer(_rt: &EngineRuntime, _info: FinalizeInfo) {}

    #[test]
    fn test_unreachable_objects_freed() {
        let mut heap = Heap::new();
        let owner = ContextToken::next();
        let root = heap.alloc(Object::new(ClassId::OBJECT, None, owner));
        let child = heap.alloc(Object::new(ClassId::OBJECT, None, owner));
        let orphan = heap.alloc(Object::new(ClassId::OBJECT, None, owner));
        if let Some(obj) = heap.get_mut(root) {
            obj.define(
                "child",
                Property {
                    flags: PropertyFlags::DEFAULT,
                    slot: PropertySlot::Data(RawValue::Object(child)),
                },
            );
        }

        let mut roots = RootSet::new();
        roots.add_host_root(root);
        let mut stats = GcStats::default();
        let outcome = collect(&mut heap, &roots, &ClassTable::new(), &mut stats);

        assert_eq!(outcome.freed, 1);
        assert!(heap.contains(root));
        assert!(heap.contains(child));
        assert!(!heap.contains(orphan));
        assert_eq!(stats.collections, 1);
        assert_eq!(stats.last_marked_count, 2);
        assert_eq!(stats.live_objects, 2);
    }

    #[test]
    fn test_finalizers_scheduled_for_dead_instances() {
        let mut heap = Heap::new();
        let mut classes = ClassTable::new();
        let class_id = ClassId::new();
        classes.register(class_id, ClassDef::new("Res").with_finalizer(noop_finalizer));

        let owner = ContextToken::next();
        let mut instance = Object::new(class_id, None, owner);
        instance.opaque = Some(crate::object::Opaque::Word(7));
        heap.alloc(instance);

        let mut stats = GcStats::default();
        let outcome = collect(&mut heap, &RootSet::new(), &classes, &mut stats);
        assert_eq!(outcome.pending_finalizers.len(), 1);
        let (_, info) = &outcome.pending_finalizers[0];
        assert_eq!(info.class_id, class_id);
        assert_eq!(info.owner, owner);
        assert_eq!(info.opaque.as_ref().and_then(|o| o.as_word()), Some(7));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_marks_cleared_between_cycles() {
        let mut heap = Heap::new();
        let id = heap.alloc(Object::new(ClassId::OBJECT, None, ContextToken::next()));
        let mut roots = RootSet::new();
        roots.add_host_root(id);
        let mut stats = GcStats::default();

        collect(&mut heap, &roots, &ClassTable::new(), &mut stats);
        assert_eq!(heap.get(id).map(|o| o.marked), Some(false));

        let outcome = collect(&mut heap, &RootSet::new(), &ClassTable::new(), &mut stats);
        assert_eq!(outcome.freed, 1);
        assert_eq!(stats.collections, 2);
    }
}
