//! Engine runtime
//!
//! A runtime owns the heap, the class table and every context created from
//! it. All of that state lives behind one `parking_lot` mutex. The lock is
//! never held while calling out to embedder code (native functions,
//! finalizers, the interrupt handler), so those callbacks may re-enter the
//! engine freely.

use crate::class::{ClassDef, ClassId, ClassTable};
use crate::context::EngineContext;
use crate::error::{EngineError, JsResult};
use crate::gc::{self, GcStats, RootSet};
use crate::heap::Heap;
use crate::object::Object;
use crate::value::{ContextToken, ObjectId, RawValue, RuntimeToken};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Interrupt poll hook.
///
/// Called at every function call boundary. Returning `true` aborts the
/// current call with an `InternalError: interrupted` exception.
pub type InterruptHandler = fn(rt: &EngineRuntime, opaque: usize) -> bool;

/// Resource limits for a runtime.
#[derive(Debug, Clone)]
pub struct RuntimeLimits {
    /// Maximum number of live objects (None = unlimited)
    pub memory_limit: Option<usize>,

    /// Maximum native call depth
    pub max_stack_depth: usize,

    /// Collect automatically after this many allocations (None = only on
    /// explicit request or memory pressure)
    pub gc_threshold: Option<usize>,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_depth: 256,
            gc_threshold: None,
        }
    }
}

/// Per-context engine state.
#[derive(Debug)]
pub(crate) struct ContextState {
    pub global: ObjectId,
    pub object_proto: ObjectId,
    pub function_proto: ObjectId,
    pub error_proto: ObjectId,
    pub class_protos: FxHashMap<ClassId, ObjectId>,
    pub exception: Option<RawValue>,
}

impl ContextState {
    fn roots(&self) -> impl Iterator<Item = ObjectId> + '_ {
        [self.global, self.object_proto, self.function_proto, self.error_proto]
            .into_iter()
            .chain(self.class_protos.values().copied())
            .chain(self.exception.as_ref().and_then(RawValue::as_object))
    }
}

/// Mutable runtime state guarded by the runtime lock.
#[derive(Debug)]
pub(crate) struct RuntimeState {
    pub heap: Heap,
    pub classes: ClassTable,
    pub contexts: FxHashMap<ContextToken, ContextState>,
    /// Values rooted by active native calls
    pub stack: Vec<RawValue>,
    pub depth: usize,
    pub limits: RuntimeLimits,
    pub interrupt: Option<(InterruptHandler, usize)>,
    pub stats: GcStats,
    pub in_gc: bool,
}

impl RuntimeState {
    fn root_set(&self) -> RootSet {
        let mut roots = RootSet::new();
        for value in &self.stack {
            roots.add_stack_root(value);
        }
        for context in self.contexts.values() {
            for id in context.roots() {
                roots.add_context_root(id);
            }
        }
        for (id, object) in self.heap.iter() {
            if object.host_refs > 0 {
                roots.add_host_root(id);
            }
        }
        roots
    }
}

struct RuntimeCore {
    token: RuntimeToken,
    state: Mutex<RuntimeState>,
}

/// Handle to an engine runtime.
///
/// Cheap to clone; all clones refer to the same runtime.
#[derive(Clone)]
pub struct EngineRuntime {
    core: Arc<RuntimeCore>,
}

impl std::fmt::Debug for EngineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRuntime").field("token", &self.core.token).finish()
    }
}

impl Default for EngineRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRuntime {
    /// Create a runtime with default limits.
    pub fn new() -> Self {
        Self::with_limits(RuntimeLimits::default())
    }

    /// Create a runtime with the given limits.
    pub fn with_limits(limits: RuntimeLimits) -> Self {
        let token = RuntimeToken::next();
        log::debug!("engine runtime {} created", token);
        Self {
            core: Arc::new(RuntimeCore {
                token,
                state: Mutex::new(RuntimeState {
                    heap: Heap::new(),
                    classes: ClassTable::new(),
                    contexts: FxHashMap::default(),
                    stack: Vec::new(),
                    depth: 0,
                    limits,
                    interrupt: None,
                    stats: GcStats::default(),
                    in_gc: false,
                }),
            }),
        }
    }

    /// Token identifying this runtime.
    pub fn token(&self) -> RuntimeToken {
        self.core.token
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.core.state.lock()
    }

    // ===== Classes =====

    /// Allocate a class ID and register `def` under it.
    pub fn new_class(&self, def: ClassDef) -> ClassId {
        let id = ClassId::new();
        log::debug!("runtime {}: class '{}' registered as {}", self.token(), def.name, id);
        self.lock().classes.register(id, def);
        id
    }

    /// Register `def` under an existing class ID.
    pub fn register_class(&self, id: ClassId, def: ClassDef) -> bool {
        self.lock().classes.register(id, def)
    }

    pub fn has_class(&self, id: ClassId) -> bool {
        self.lock().classes.contains(id)
    }

    /// Number of registered classes.
    pub fn class_count(&self) -> usize {
        self.lock().classes.len()
    }

    pub fn class_name(&self, id: ClassId) -> Option<String> {
        self.lock().classes.get(id).map(|def| def.name.clone())
    }

    // ===== Limits =====

    pub fn limits(&self) -> RuntimeLimits {
        self.lock().limits.clone()
    }

    pub fn set_memory_limit(&self, limit: Option<usize>) {
        self.lock().limits.memory_limit = limit;
    }

    pub fn set_max_stack_depth(&self, depth: usize) {
        self.lock().limits.max_stack_depth = depth;
    }

    pub fn set_gc_threshold(&self, threshold: Option<usize>) {
        self.lock().limits.gc_threshold = threshold;
    }

    // ===== Interrupts =====

    /// Install or remove the interrupt poll hook.
    pub fn set_interrupt_handler(&self, handler: Option<(InterruptHandler, usize)>) {
        self.lock().interrupt = handler;
    }

    /// Poll the interrupt hook.
    pub fn should_interrupt(&self) -> bool {
        let handler = self.lock().interrupt;
        match handler {
            Some((handler, opaque)) => handler(self, opaque),
            None => false,
        }
    }

    // ===== Contexts =====

    /// Create a new context with its own global object and intrinsics.
    pub fn new_context(&self) -> EngineContext {
        let token = ContextToken::next();
        {
            let mut state = self.lock();
            let object_proto = state.heap.alloc(Object::new(ClassId::OBJECT, None, token));
            let function_proto = state
                .heap
                .alloc(Object::new(ClassId::OBJECT, Some(object_proto), token));
            let error_proto = state
                .heap
                .alloc(Object::new(ClassId::OBJECT, Some(object_proto), token));
            let global = state
                .heap
                .alloc(Object::new(ClassId::OBJECT, Some(object_proto), token));
            state.contexts.insert(
                token,
                ContextState {
                    global,
                    object_proto,
                    function_proto,
                    error_proto,
                    class_protos: FxHashMap::default(),
                    exception: None,
                },
            );
        }
        log::debug!("runtime {}: context {} created", self.token(), token);
        EngineContext::from_parts(self.clone(), token)
    }

    /// Free a context.
    ///
    /// Its global object and intrinsics stop being roots; objects that are
    /// only reachable from them are reclaimed by the next collection.
    pub fn free_context(&self, token: ContextToken) -> bool {
        let removed = self.lock().contexts.remove(&token).is_some();
        if removed {
            log::debug!("runtime {}: context {} freed", self.token(), token);
        }
        removed
    }

    pub fn has_context(&self, token: ContextToken) -> bool {
        self.lock().contexts.contains_key(&token)
    }

    pub fn context_count(&self) -> usize {
        self.lock().contexts.len()
    }

    // ===== Host references =====

    /// Take an additional host reference on `value`.
    pub fn dup_value(&self, value: &RawValue) -> RawValue {
        if let Some(id) = value.as_object() {
            if let Some(object) = self.lock().heap.get_mut(id) {
                object.host_refs += 1;
            }
        }
        value.clone()
    }

    /// Release one host reference on `value`.
    ///
    /// Releasing a reference to an object that was already collected is a
    /// no-op.
    pub fn free_value(&self, value: &RawValue) {
        if let Some(id) = value.as_object() {
            if let Some(object) = self.lock().heap.get_mut(id) {
                object.host_refs = object.host_refs.saturating_sub(1);
            }
        }
    }

    /// Number of host references on an object (0 for immediates).
    pub fn host_refs(&self, value: &RawValue) -> u32 {
        value
            .as_object()
            .and_then(|id| self.lock().heap.get(id).map(|o| o.host_refs))
            .unwrap_or(0)
    }

    // ===== Garbage collection =====

    /// Run a full collection and then the finalizers of every freed
    /// instance. Returns the number of freed objects.
    pub fn run_gc(&self) -> usize {
        let outcome = {
            let mut state = self.lock();
            if state.in_gc {
                return 0;
            }
            state.in_gc = true;
            let roots = state.root_set();
            let RuntimeState {
                heap, classes, stats, ..
            } = &mut *state;
            gc::collect(heap, &roots, classes, stats)
        };
        let _guard = GcGuard { rt: self };

        log::debug!(
            "runtime {}: gc freed {} objects, {} finalizers pending",
            self.token(),
            outcome.freed,
            outcome.pending_finalizers.len()
        );
        for (finalizer, info) in outcome.pending_finalizers {
            finalizer(self, info);
        }
        outcome.freed
    }

    /// Collect if the allocation threshold has been reached.
    pub(crate) fn maybe_gc(&self) {
        let due = {
            let state = self.lock();
            !state.in_gc
                && state
                    .limits
                    .gc_threshold
                    .is_some_and(|threshold| state.heap.allocated_since_gc() >= threshold)
        };
        if due {
            self.run_gc();
        }
    }

    pub fn gc_stats(&self) -> GcStats {
        self.lock().stats.clone()
    }

    /// Number of live heap objects.
    pub fn object_count(&self) -> usize {
        self.lock().heap.len()
    }

    /// Tear the runtime down.
    ///
    /// Frees every context, drops all host references and collects
    /// everything, so each remaining instance is finalized exactly once.
    pub fn free(&self) {
        {
            let mut state = self.lock();
            state.contexts.clear();
            state.stack.clear();
            for object in state.heap.objects_mut().values_mut() {
                object.host_refs = 0;
            }
        }
        self.run_gc();
        log::debug!("engine runtime {} freed", self.token());
    }

    // ===== Call frames =====

    /// Root `values` for the duration of a native call.
    ///
    /// Returns `None` when the depth limit is reached; the caller throws
    /// the range error.
    pub(crate) fn push_frame(&self, values: &[&RawValue]) -> Option<Frame<'_>> {
        let mut state = self.lock();
        if state.depth >= state.limits.max_stack_depth {
            return None;
        }
        state.depth += 1;
        let stack_len = state.stack.len();
        state.stack.extend(values.iter().map(|v| (*v).clone()));
        Some(Frame { rt: self, stack_len })
    }

    pub(crate) fn check_context(&self, token: ContextToken) -> JsResult<()> {
        if self.lock().contexts.contains_key(&token) {
            Ok(())
        } else {
            Err(EngineError::ContextFreed(token))
        }
    }
}

/// Clears the collection flag once finalizers have run.
struct GcGuard<'a> {
    rt: &'a EngineRuntime,
}

impl Drop for GcGuard<'_> {
    fn drop(&mut self) {
        self.rt.lock().in_gc = false;
    }
}

/// An active native call; pops its stack roots when dropped.
pub(crate) struct Frame<'a> {
    rt: &'a EngineRuntime,
    stack_len: usize,
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        let mut state = self.rt.lock();
        state.stack.truncate(self.stack_len);
        state.depth = state.depth.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::FinalizeInfo;
    use crate::object::Opaque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FINALIZED: AtomicUsize = AtomicUsize::new(0);

    fn count_finalizer(_rt: &EngineRuntime, info: FinalizeInfo) {
        if info.opaque.and_then(|o| o.as_word()) == Some(42) {
            FINALIZED.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_context_lifecycle() {
        let rt = EngineRuntime::new();
        let ctx = rt.new_context();
        assert!(rt.has_context(ctx.token()));
        assert_eq!(rt.context_count(), 1);
        assert!(rt.free_context(ctx.token()));
        assert!(!rt.free_context(ctx.token()));
        assert_eq!(rt.context_count(), 0);
    }

    #[test]
    fn test_host_refs_keep_objects_alive() {
        let rt = EngineRuntime::new();
        let ctx = rt.new_context();
        let obj = ctx.new_object().unwrap();
        assert_eq!(rt.host_refs(&obj), 1);

        rt.run_gc();
        assert!(ctx.is_live(&obj));

        rt.free_value(&obj);
        rt.run_gc();
        assert!(!ctx.is_live(&obj));
    }

    #[test]
    fn test_free_runs_finalizers() {
        let rt = EngineRuntime::new();
        let class_id = rt.new_class(ClassDef::new("Res").with_finalizer(count_finalizer));
        let ctx = rt.new_context();
        let obj = ctx.new_object_class(class_id).unwrap();
        assert!(ctx.set_opaque(&obj, Opaque::Word(42)));

        let before = FINALIZED.load(Ordering::SeqCst);
        rt.free();
        assert_eq!(FINALIZED.load(Ordering::SeqCst), before + 1);
        assert_eq!(rt.object_count(), 0);
    }

    #[test]
    fn test_stack_depth_limit() {
        let rt = EngineRuntime::with_limits(RuntimeLimits {
            max_stack_depth: 1,
            ..Default::default()
        });
        let first = rt.push_frame(&[]);
        assert!(first.is_some());
        assert!(rt.push_frame(&[]).is_none());
        drop(first);
        assert!(rt.push_frame(&[]).is_some());
    }
}
