//! Instance binding
//!
//! Attaches a host object to a freshly constructed instance through the
//! instance's opaque slot, and detaches it again on finalization. In
//! handle-store mode the slot holds a handle ID; in direct mode it holds
//! the shared [`BoundObject`] itself.

use super::{BoundObject, HostEntry};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::handle::HandleId;
use crate::registry;
use crate::runtime::BindingMode;
use hostjs_engine::{Opaque, RawValue};
use std::sync::Arc;

/// Bind `object` to `instance`.
pub(crate) fn bind(ctx: &Context, instance: &RawValue, object: BoundObject) -> Result<()> {
    let engine = ctx.engine();
    match ctx.binding_mode() {
        BindingMode::HandleStore => {
            let id = ctx.handles().try_store(HostEntry::Object(object))?;
            if !engine.set_opaque(instance, Opaque::Word(id.as_word())) {
                ctx.handles().delete(id);
                return Err(Error::NotAnInstance);
            }
            log::trace!("instance bound to handle {}", id);
        }
        BindingMode::Direct => {
            if !engine.set_opaque(instance, Opaque::Shared(Arc::new(object))) {
                return Err(Error::NotAnInstance);
            }
        }
    }
    Ok(())
}

/// The host object bound to `instance`.
pub(crate) fn resolve(ctx: &Context, instance: &RawValue) -> Result<BoundObject> {
    if !instance.is_object() {
        return Err(Error::NotAnObject);
    }
    let Some((_, opaque)) = ctx.engine().opaque(instance) else {
        return Err(if ctx.engine().class_id(instance).is_user() {
            Error::NoInstanceData
        } else {
            Error::NotAnInstance
        });
    };
    match opaque {
        Opaque::Word(word) => {
            let entry = home(ctx, instance)?
                .handles()
                .load(HandleId::from_word(word))
                .ok_or(Error::NoInstanceData)?;
            match entry {
                HostEntry::Object(object) => Ok(object),
                _ => Err(Error::NotAnInstance),
            }
        }
        Opaque::Shared(shared) => shared
            .downcast_ref::<BoundObject>()
            .cloned()
            .ok_or(Error::NotAnInstance),
    }
}

/// Detach the binding described by an opaque slot.
///
/// `ctx` is only needed for handle IDs; a direct binding carries its object.
pub(crate) fn release(ctx: Option<&Context>, opaque: Opaque) -> Option<BoundObject> {
    match opaque {
        Opaque::Word(word) => match ctx?.handles().take(HandleId::from_word(word))? {
            HostEntry::Object(object) => Some(object),
            _ => None,
        },
        Opaque::Shared(shared) => shared.downcast_ref::<BoundObject>().cloned(),
    }
}

/// Undo [`bind`] on a live instance.
pub(crate) fn unbind(ctx: &Context, instance: &RawValue) -> Option<BoundObject> {
    let home = home(ctx, instance).ok()?;
    let opaque = ctx.engine().take_opaque(instance)?;
    release(Some(&home), opaque)
}

/// The context whose handle store holds the binding of `instance`: the
/// one the instance was created in.
fn home(ctx: &Context, instance: &RawValue) -> Result<Context> {
    match ctx.engine().owner_of(instance) {
        Some(owner) if owner != ctx.token() => registry::get_context(owner),
        _ => Ok(ctx.clone()),
    }
}
