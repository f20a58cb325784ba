//! Process-wide registries
//!
//! Native trampolines receive engine tokens, never host wrappers. These
//! registries map the tokens back:
//!
//! - contexts: `ContextToken -> Context`
//! - runtimes: `RuntimeToken -> runtime state`
//! - classes: constructor object -> `ClassId`
//!
//! Lifecycle: a runtime is registered by `Runtime::new` and unregistered by
//! `Runtime::close`; a context is registered by `Runtime::new_context` and
//! unregistered by `Context::close`; class entries are added by
//! `ClassBuilder::build` and dropped when their runtime closes. Entries hold
//! weak references, so the registries never keep a wrapper alive.
//! Unregistering twice is a no-op.

use crate::context::{Context, ContextInner};
use crate::error::{Error, Result};
use crate::runtime::RuntimeInner;
use crate::value::Value;
use dashmap::DashMap;
use hostjs_engine::{ClassId, ContextToken, ObjectId, RawValue, RuntimeToken};
use once_cell::sync::Lazy;
use std::sync::{Arc, Weak};

static CONTEXTS: Lazy<DashMap<ContextToken, Weak<ContextInner>>> = Lazy::new(DashMap::new);

static RUNTIMES: Lazy<DashMap<RuntimeToken, Weak<RuntimeInner>>> = Lazy::new(DashMap::new);

static CLASSES: Lazy<DashMap<ObjectId, ClassEntry>> = Lazy::new(DashMap::new);

#[derive(Debug, Clone, Copy)]
struct ClassEntry {
    class_id: ClassId,
    runtime: RuntimeToken,
}

// ============================================================================
// Contexts
// ============================================================================

/// Make a context reachable from its token.
///
/// Registering an already-registered context replaces the entry.
pub fn register_context(ctx: &Context) {
    CONTEXTS.insert(ctx.token(), Arc::downgrade(ctx.inner()));
    log::debug!("context {} registered", ctx.token());
}

/// Remove a context from the registry; returns whether it was present.
pub fn unregister_context(token: ContextToken) -> bool {
    let removed = CONTEXTS.remove(&token).is_some();
    if removed {
        log::debug!("context {} unregistered", token);
    }
    removed
}

/// Recover the context wrapper for a native context token.
pub fn get_context(token: ContextToken) -> Result<Context> {
    CONTEXTS
        .get(&token)
        .and_then(|entry| entry.value().upgrade())
        .map(Context::from_inner)
        .ok_or(Error::ContextNotFound)
}

/// Live registered contexts of a runtime.
pub fn contexts_of(runtime: RuntimeToken) -> Vec<Context> {
    CONTEXTS
        .iter()
        .filter_map(|entry| entry.value().upgrade())
        .map(Context::from_inner)
        .filter(|ctx| ctx.runtime_token() == runtime)
        .collect()
}

// ============================================================================
// Runtimes
// ============================================================================

pub(crate) fn register_runtime(token: RuntimeToken, runtime: &Arc<RuntimeInner>) {
    RUNTIMES.insert(token, Arc::downgrade(runtime));
    log::debug!("runtime {} registered", token);
}

/// Remove a runtime from the registry; returns whether it was present.
pub fn unregister_runtime(token: RuntimeToken) -> bool {
    let removed = RUNTIMES.remove(&token).is_some();
    if removed {
        log::debug!("runtime {} unregistered", token);
    }
    removed
}

pub(crate) fn get_runtime(token: RuntimeToken) -> Result<Arc<RuntimeInner>> {
    RUNTIMES
        .get(&token)
        .and_then(|entry| entry.value().upgrade())
        .ok_or(Error::RuntimeNotFound)
}

/// Whether a runtime token resolves to a live runtime.
pub fn runtime_registered(token: RuntimeToken) -> bool {
    get_runtime(token).is_ok()
}

// ============================================================================
// Classes
// ============================================================================

/// Record the class of a constructor.
pub(crate) fn register_class(constructor: &RawValue, class_id: ClassId, runtime: RuntimeToken) {
    if let Some(id) = constructor.as_object() {
        CLASSES.insert(id, ClassEntry { class_id, runtime });
    }
}

/// Class ID of a constructor built by `ClassBuilder::build`.
pub fn class_id_of(constructor: &Value) -> Option<ClassId> {
    raw_class_id_of(constructor.raw())
}

pub(crate) fn raw_class_id_of(constructor: &RawValue) -> Option<ClassId> {
    let id = constructor.as_object()?;
    CLASSES.get(&id).map(|entry| entry.class_id)
}

/// Drop every class entry of a runtime; returns the number removed.
pub(crate) fn forget_runtime_classes(runtime: RuntimeToken) -> usize {
    let before = CLASSES.len();
    CLASSES.retain(|_, entry| entry.runtime != runtime);
    before.saturating_sub(CLASSES.len())
}

/// Number of registered constructors across all runtimes.
pub fn class_count() -> usize {
    CLASSES.len()
}
