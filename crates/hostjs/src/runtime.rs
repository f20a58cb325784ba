//! Runtime: the resource arena owning contexts
//!
//! A [`Runtime`] wraps an engine runtime together with its configuration,
//! the contexts created from it and the interrupt state. It is the owner:
//! dropping it closes every context and frees the engine runtime, which
//! finalizes all remaining instances.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::registry;
use hostjs_engine::{ContextToken, EngineRuntime, GcStats, RuntimeLimits, RuntimeToken};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How instances reference their bound host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingMode {
    /// The instance stores a handle ID; the object lives in the context's
    /// handle store until the instance is finalized
    #[default]
    HandleStore,
    /// The instance stores a shared pointer to the object directly
    Direct,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Interrupt execution once this much time has passed since the
    /// runtime was created (None = no timeout)
    pub execute_timeout: Option<Duration>,

    /// Maximum number of live engine objects (None = unlimited)
    pub memory_limit: Option<usize>,

    /// Collect automatically after this many allocations
    pub gc_threshold: Option<usize>,

    /// Maximum native call depth
    pub max_stack_depth: usize,

    /// Binding used for class instances
    pub binding_mode: BindingMode,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            execute_timeout: None,
            memory_limit: None,
            gc_threshold: None,
            max_stack_depth: RuntimeLimits::default().max_stack_depth,
            binding_mode: BindingMode::default(),
        }
    }
}

impl RuntimeOptions {
    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = Some(timeout);
        self
    }

    pub fn with_memory_limit(mut self, objects: usize) -> Self {
        self.memory_limit = Some(objects);
        self
    }

    pub fn with_gc_threshold(mut self, allocations: usize) -> Self {
        self.gc_threshold = Some(allocations);
        self
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_binding_mode(mut self, mode: BindingMode) -> Self {
        self.binding_mode = mode;
        self
    }

    fn limits(&self) -> RuntimeLimits {
        RuntimeLimits {
            memory_limit: self.memory_limit,
            max_stack_depth: self.max_stack_depth,
            gc_threshold: self.gc_threshold,
        }
    }
}

/// Host interrupt callback; returning `true` aborts the running script.
pub type InterruptFn = Arc<dyn Fn() -> bool + Send + Sync>;

pub(crate) struct RuntimeInner {
    engine: EngineRuntime,
    binding_mode: BindingMode,
    contexts: Mutex<Vec<Context>>,
    deadline: Mutex<Option<Instant>>,
    interrupt: Mutex<Option<InterruptFn>>,
    closed: AtomicBool,
}

impl RuntimeInner {
    /// Drop a closed context from the runtime's list.
    pub(crate) fn forget_context(&self, token: ContextToken) {
        self.contexts.lock().retain(|ctx| ctx.token() != token);
    }

    /// Polled by the engine through [`interrupt_proxy`].
    pub(crate) fn should_interrupt(&self) -> bool {
        if let Some(deadline) = *self.deadline.lock() {
            if Instant::now() >= deadline {
                log::debug!("runtime {}: execution timeout reached", self.engine.token());
                return true;
            }
        }
        let handler = self.interrupt.lock().clone();
        handler.is_some_and(|handler| handler())
    }
}

/// Interrupt trampoline installed on every engine runtime.
///
/// A runtime that is no longer registered is never interrupted.
fn interrupt_proxy(rt: &EngineRuntime, _opaque: usize) -> bool {
    match registry::get_runtime(rt.token()) {
        Ok(runtime) => runtime.should_interrupt(),
        Err(_) => false,
    }
}

/// An engine runtime and the contexts it owns.
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with default options.
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Create a runtime with the given options.
    pub fn with_options(options: RuntimeOptions) -> Self {
        let engine = EngineRuntime::with_limits(options.limits());
        engine.set_interrupt_handler(Some((interrupt_proxy, 0)));

        let inner = Arc::new(RuntimeInner {
            engine,
            binding_mode: options.binding_mode,
            contexts: Mutex::new(Vec::new()),
            deadline: Mutex::new(options.execute_timeout.map(|t| Instant::now() + t)),
            interrupt: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        registry::register_runtime(inner.engine.token(), &inner);
        Self { inner }
    }

    /// Token identifying this runtime to native code.
    pub fn token(&self) -> RuntimeToken {
        self.inner.engine.token()
    }

    /// The underlying engine runtime.
    pub fn engine(&self) -> &EngineRuntime {
        &self.inner.engine
    }

    pub fn binding_mode(&self) -> BindingMode {
        self.inner.binding_mode
    }

    /// Create a new context owned by this runtime.
    pub fn new_context(&self) -> Result<Context> {
        if self.is_closed() {
            return Err(Error::ContextClosed);
        }
        let engine = self.inner.engine.new_context();
        let ctx = Context::new(engine, self.token(), self.inner.binding_mode);
        registry::register_context(&ctx);
        self.inner.contexts.lock().push(ctx.clone());
        Ok(ctx)
    }

    /// Live contexts of this runtime.
    pub fn contexts(&self) -> Vec<Context> {
        self.inner.contexts.lock().clone()
    }

    // ===== Limits and interrupts =====

    /// Interrupt execution once `timeout` has elapsed from now.
    pub fn set_execute_timeout(&self, timeout: Duration) {
        *self.inner.deadline.lock() = Some(Instant::now() + timeout);
    }

    pub fn clear_execute_timeout(&self) {
        *self.inner.deadline.lock() = None;
    }

    /// Install a host interrupt callback, polled at every call boundary.
    pub fn set_interrupt_handler<F>(&self, handler: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        *self.inner.interrupt.lock() = Some(Arc::new(handler));
    }

    pub fn clear_interrupt_handler(&self) {
        *self.inner.interrupt.lock() = None;
    }

    pub fn set_memory_limit(&self, objects: Option<usize>) {
        self.inner.engine.set_memory_limit(objects);
    }

    pub fn set_gc_threshold(&self, allocations: Option<usize>) {
        self.inner.engine.set_gc_threshold(allocations);
    }

    pub fn set_max_stack_depth(&self, depth: usize) {
        self.inner.engine.set_max_stack_depth(depth);
    }

    // ===== Garbage collection =====

    /// Run a full engine collection; finalizers of unreachable instances
    /// run before this returns. Returns the number of freed objects.
    pub fn run_gc(&self) -> usize {
        self.inner.engine.run_gc()
    }

    pub fn gc_stats(&self) -> GcStats {
        self.inner.engine.gc_stats()
    }

    pub fn object_count(&self) -> usize {
        self.inner.engine.object_count()
    }

    // ===== Lifecycle =====

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Free the engine runtime, finalizing every remaining instance, then
    /// close every context and drop this runtime's class registrations.
    /// Closing twice is a no-op.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Instances are finalized while their contexts can still be found
        self.inner.engine.free();
        let contexts: Vec<Context> = std::mem::take(&mut *self.inner.contexts.lock());
        for ctx in &contexts {
            ctx.close();
        }
        let forgotten = registry::forget_runtime_classes(self.token());
        registry::unregister_runtime(self.token());
        log::debug!(
            "runtime {} closed ({} contexts, {} classes)",
            self.token(),
            contexts.len(),
            forgotten
        );
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("token", &self.token())
            .field("closed", &self.is_closed())
            .finish()
    }
}
