//! Engine context
//!
//! A context is one global scope plus its pending-exception slot inside a
//! runtime. [`EngineContext`] is the API the embedder drives: object and
//! function creation, property access with prototype-chain semantics,
//! calls, construction, opaque slots and exceptions.
//!
//! A native function always runs with the context it was created in, even
//! when another context of the same runtime calls it.
//!
//! Methods returning [`JsResult`] report script failures as
//! [`EngineError::Thrown`] with the exception pending on this context.

use crate::class::ClassId;
use crate::error::{EngineError, JsResult};
use crate::heap::Heap;
use crate::object::{
    CFunction, Callable, FunctionKind, NativeFunction, Object, Opaque, Property, PropertyFlags,
    PropertySlot,
};
use crate::runtime::{ContextState, EngineRuntime};
use crate::value::{ContextToken, ObjectId, RawValue};
use std::sync::Arc;

/// Bound on prototype chain walks; longer chains are treated as cyclic.
const MAX_PROTO_CHAIN: usize = 1024;

/// Built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    InternalError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

/// Snapshot of an own property.
///
/// Values in a descriptor carry no host reference.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyDescriptor {
    Data {
        value: RawValue,
        flags: PropertyFlags,
    },
    Accessor {
        getter: Option<RawValue>,
        setter: Option<RawValue>,
        flags: PropertyFlags,
    },
}

impl PropertyDescriptor {
    pub fn flags(&self) -> PropertyFlags {
        match self {
            PropertyDescriptor::Data { flags, .. } | PropertyDescriptor::Accessor { flags, .. } => *flags,
        }
    }
}

/// Outcome of resolving a property write.
enum WritePlan {
    Done,
    Ignore,
    CallSetter(ObjectId),
}

/// Handle to an engine context.
#[derive(Debug, Clone)]
pub struct EngineContext {
    rt: EngineRuntime,
    token: ContextToken,
}

impl PartialEq for EngineContext {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for EngineContext {}

impl EngineContext {
    pub(crate) fn from_parts(rt: EngineRuntime, token: ContextToken) -> Self {
        Self { rt, token }
    }

    /// The runtime this context belongs to.
    pub fn runtime(&self) -> &EngineRuntime {
        &self.rt
    }

    pub fn token(&self) -> ContextToken {
        self.token
    }

    /// Free this context (see [`EngineRuntime::free_context`]).
    pub fn free(&self) -> bool {
        self.rt.free_context(self.token)
    }

    /// Check whether an object value still exists (immediates always do).
    pub fn is_live(&self, value: &RawValue) -> bool {
        match value.as_object() {
            Some(id) => self.rt.lock().heap.contains(id),
            None => true,
        }
    }

    // ===== Exceptions =====

    /// Make `value` the pending exception, taking over its host reference.
    ///
    /// Always returns [`RawValue::Exception`] so native functions can
    /// `return ctx.throw(v)`.
    pub fn throw(&self, value: RawValue) -> RawValue {
        let mut guard = self.rt.lock();
        let state = &mut *guard;
        match state.contexts.get_mut(&self.token) {
            Some(context) => {
                if let Some(old) = context.exception.replace(value) {
                    release(&mut state.heap, &old);
                }
            }
            None => release(&mut state.heap, &value),
        }
        RawValue::Exception
    }

    /// Create an error object and throw it.
    pub fn throw_error(&self, kind: ErrorKind, message: &str) -> RawValue {
        match self.new_error(kind, message) {
            Ok(error) => self.throw(error),
            Err(_) => RawValue::Exception,
        }
    }

    fn thrown<T>(&self, kind: ErrorKind, message: &str) -> JsResult<T> {
        self.throw_error(kind, message);
        Err(EngineError::Thrown)
    }

    /// Take the pending exception, transferring its host reference.
    pub fn take_exception(&self) -> Option<RawValue> {
        self.rt
            .lock()
            .contexts
            .get_mut(&self.token)
            .and_then(|context| context.exception.take())
    }

    pub fn has_exception(&self) -> bool {
        self.rt
            .lock()
            .contexts
            .get(&self.token)
            .is_some_and(|context| context.exception.is_some())
    }

    // ===== Allocation =====

    /// Run any due collection and enforce the memory limit.
    fn reserve(&self) -> JsResult<()> {
        self.rt.check_context(self.token)?;
        self.rt.maybe_gc();
        if self.over_memory_limit() {
            self.rt.run_gc();
            if self.over_memory_limit() {
                log::warn!("context {}: memory limit reached", self.token);
                return self.thrown(ErrorKind::InternalError, "out of memory");
            }
        }
        Ok(())
    }

    fn over_memory_limit(&self) -> bool {
        let state = self.rt.lock();
        state
            .limits
            .memory_limit
            .is_some_and(|limit| state.heap.len() >= limit)
    }

    /// Allocate an object built from this context's state, returning it
    /// with one host reference.
    fn alloc(&self, build: impl FnOnce(&ContextState) -> Object) -> JsResult<RawValue> {
        let mut guard = self.rt.lock();
        let state = &mut *guard;
        let context = state
            .contexts
            .get(&self.token)
            .ok_or(EngineError::ContextFreed(self.token))?;
        let mut object = build(context);
        object.host_refs = 1;
        Ok(RawValue::Object(state.heap.alloc(object)))
    }

    fn check_class(&self, class_id: ClassId) -> JsResult<()> {
        if class_id == ClassId::OBJECT || self.rt.has_class(class_id) {
            Ok(())
        } else {
            Err(EngineError::UnknownClass(class_id))
        }
    }

    /// Create a plain object.
    pub fn new_object(&self) -> JsResult<RawValue> {
        self.reserve()?;
        let token = self.token;
        self.alloc(|context| Object::new(ClassId::OBJECT, Some(context.object_proto), token))
    }

    /// Create an instance of `class_id` using the class prototype of this
    /// context.
    pub fn new_object_class(&self, class_id: ClassId) -> JsResult<RawValue> {
        self.check_class(class_id)?;
        self.reserve()?;
        let token = self.token;
        self.alloc(|context| {
            let proto = context
                .class_protos
                .get(&class_id)
                .copied()
                .unwrap_or(context.object_proto);
            Object::new(class_id, Some(proto), token)
        })
    }

    /// Create an instance of `class_id` with an explicit prototype.
    ///
    /// A non-object `proto` gives the instance a null prototype.
    pub fn new_object_proto_class(&self, proto: &RawValue, class_id: ClassId) -> JsResult<RawValue> {
        self.check_class(class_id)?;
        self.reserve()?;
        let token = self.token;
        let proto = proto.as_object();
        self.alloc(|_| Object::new(class_id, proto, token))
    }

    /// Create an error object with `name` and `message` properties.
    ///
    /// Error objects are exempt from the memory limit so that "out of
    /// memory" itself can always be thrown.
    pub fn new_error(&self, kind: ErrorKind, message: &str) -> JsResult<RawValue> {
        let token = self.token;
        self.alloc(|context| {
            let mut error = Object::new(ClassId::ERROR, Some(context.error_proto), token);
            error.define("name", data(RawValue::string(kind.name()), PropertyFlags::HIDDEN));
            error.define("message", data(RawValue::string(message), PropertyFlags::HIDDEN));
            error
        })
    }

    /// Create a native function object.
    pub fn new_function(
        &self,
        func: CFunction,
        name: &str,
        length: u32,
        kind: FunctionKind,
        magic: i32,
    ) -> JsResult<RawValue> {
        self.reserve()?;
        let token = self.token;
        self.alloc(|context| {
            let callable = Callable::Native(NativeFunction {
                func,
                kind,
                magic,
                name: Arc::from(name),
            });
            let mut function = Object::new(ClassId::FUNCTION, Some(context.function_proto), token)
                .with_callable(callable);
            define_function_props(&mut function, name, length);
            function
        })
    }

    /// Create the constructor of a script-side subclass of `base`.
    ///
    /// Equivalent to `class <name> extends base {}`: instances are built by
    /// `base` with the subclass as `new.target`, the subclass prototype
    /// inherits from `base.prototype` and static members are inherited
    /// through the constructor's own prototype.
    pub fn new_subclass(&self, base: &RawValue, name: &str) -> JsResult<RawValue> {
        if !self.is_constructor(base) {
            return self.thrown(ErrorKind::TypeError, "parent class must be a constructor");
        }
        let Some(base_id) = base.as_object() else {
            return self.thrown(ErrorKind::TypeError, "parent class must be a constructor");
        };
        let base_proto = self.get_property(base, "prototype")?;
        let proto = self.new_object_proto_class(&base_proto, ClassId::OBJECT);
        self.rt.free_value(&base_proto);
        let proto = proto?;

        self.reserve()?;
        let token = self.token;
        let ctor = self.alloc(|_| {
            let callable = Callable::Derived {
                base: base_id,
                name: Arc::from(name),
            };
            let mut function = Object::new(ClassId::FUNCTION, Some(base_id), token).with_callable(callable);
            define_function_props(&mut function, name, 0);
            function
        });
        let result = match ctor {
            Ok(ctor) => self.set_constructor(&ctor, &proto).map(|_| ctor),
            Err(err) => Err(err),
        };
        self.rt.free_value(&proto);
        result
    }

    /// Link a constructor and its prototype object.
    pub fn set_constructor(&self, ctor: &RawValue, proto: &RawValue) -> JsResult<()> {
        self.define_property_value(ctor, "prototype", proto, PropertyFlags::empty())?;
        self.define_property_value(proto, "constructor", ctor, PropertyFlags::HIDDEN)
    }

    /// Set the default prototype for instances of `class_id` in this context.
    pub fn set_class_proto(&self, class_id: ClassId, proto: &RawValue) -> JsResult<()> {
        let Some(proto) = proto.as_object() else {
            return self.thrown(ErrorKind::TypeError, "class prototype must be an object");
        };
        let mut state = self.rt.lock();
        let context = state
            .contexts
            .get_mut(&self.token)
            .ok_or(EngineError::ContextFreed(self.token))?;
        context.class_protos.insert(class_id, proto);
        Ok(())
    }

    /// Get the class prototype registered in this context (`null` if none).
    pub fn class_proto(&self, class_id: ClassId) -> JsResult<RawValue> {
        let proto = {
            let state = self.rt.lock();
            let context = state
                .contexts
                .get(&self.token)
                .ok_or(EngineError::ContextFreed(self.token))?;
            context.class_protos.get(&class_id).copied()
        };
        Ok(match proto {
            Some(id) => self.rt.dup_value(&RawValue::Object(id)),
            None => RawValue::Null,
        })
    }

    /// The global object of this context.
    pub fn global_object(&self) -> JsResult<RawValue> {
        let global = {
            let state = self.rt.lock();
            state
                .contexts
                .get(&self.token)
                .map(|context| context.global)
                .ok_or(EngineError::ContextFreed(self.token))?
        };
        Ok(self.rt.dup_value(&RawValue::Object(global)))
    }

    // ===== Properties =====

    /// `obj[name]`, walking the prototype chain and invoking getters.
    pub fn get_property(&self, obj: &RawValue, name: &str) -> JsResult<RawValue> {
        let target = match obj {
            RawValue::Object(id) => *id,
            RawValue::Undefined | RawValue::Null => {
                let message = format!("cannot read property '{}' of {}", name, obj.type_name());
                return self.thrown(ErrorKind::TypeError, &message);
            }
            _ => return Ok(RawValue::Undefined),
        };

        let getter = {
            let mut state = self.rt.lock();
            let slot = lookup(&state.heap, target, name).map(|(_, prop)| prop.slot);
            match slot {
                None => return Ok(RawValue::Undefined),
                Some(PropertySlot::Data(value)) => {
                    retain(&mut state.heap, &value);
                    return Ok(value);
                }
                Some(PropertySlot::Accessor { getter, .. }) => getter,
            }
        };

        match getter {
            Some(getter) => self.call(&RawValue::Object(getter), obj, &[]),
            None => Ok(RawValue::Undefined),
        }
    }

    /// `obj[name] = value` with non-strict semantics.
    ///
    /// Writes to read-only data properties and to accessors without a setter
    /// are silently ignored.
    pub fn set_property(&self, obj: &RawValue, name: &str, value: &RawValue) -> JsResult<()> {
        let target = match obj {
            RawValue::Object(id) => *id,
            RawValue::Undefined | RawValue::Null => {
                let message = format!("cannot set property '{}' of {}", name, obj.type_name());
                return self.thrown(ErrorKind::TypeError, &message);
            }
            _ => return Ok(()),
        };

        let plan = {
            let mut state = self.rt.lock();
            plan_write(&mut state.heap, target, name, value)
        };

        match plan {
            WritePlan::Done | WritePlan::Ignore => Ok(()),
            WritePlan::CallSetter(setter) => {
                let result = self.call(&RawValue::Object(setter), obj, std::slice::from_ref(value))?;
                self.rt.free_value(&result);
                Ok(())
            }
        }
    }

    /// Define or replace an own data property.
    pub fn define_property_value(
        &self,
        obj: &RawValue,
        name: &str,
        value: &RawValue,
        flags: PropertyFlags,
    ) -> JsResult<()> {
        self.define_own(obj, name, data(value.clone(), flags))
    }

    /// Define or replace an own accessor property.
    pub fn define_property_accessor(
        &self,
        obj: &RawValue,
        name: &str,
        getter: Option<&RawValue>,
        setter: Option<&RawValue>,
        flags: PropertyFlags,
    ) -> JsResult<()> {
        let slot = PropertySlot::Accessor {
            getter: getter.and_then(RawValue::as_object),
            setter: setter.and_then(RawValue::as_object),
        };
        self.define_own(obj, name, Property { flags, slot })
    }

    fn define_own(&self, obj: &RawValue, name: &str, prop: Property) -> JsResult<()> {
        let Some(target) = obj.as_object() else {
            return self.thrown(ErrorKind::TypeError, "cannot define property on non-object");
        };
        let mut state = self.rt.lock();
        if let Some(object) = state.heap.get_mut(target) {
            object.define(name, prop);
        }
        Ok(())
    }

    /// Describe an own property.
    pub fn get_own_property(&self, obj: &RawValue, name: &str) -> Option<PropertyDescriptor> {
        let target = obj.as_object()?;
        let state = self.rt.lock();
        let prop = state.heap.get(target)?.own(name)?;
        Some(match &prop.slot {
            PropertySlot::Data(value) => PropertyDescriptor::Data {
                value: value.clone(),
                flags: prop.flags,
            },
            PropertySlot::Accessor { getter, setter } => PropertyDescriptor::Accessor {
                getter: getter.map(RawValue::Object),
                setter: setter.map(RawValue::Object),
                flags: prop.flags,
            },
        })
    }

    /// `name in obj`.
    pub fn has_property(&self, obj: &RawValue, name: &str) -> bool {
        match obj.as_object() {
            Some(target) => lookup(&self.rt.lock().heap, target, name).is_some(),
            None => false,
        }
    }

    /// `delete obj[name]`; fails for non-configurable properties.
    pub fn delete_property(&self, obj: &RawValue, name: &str) -> bool {
        let Some(target) = obj.as_object() else {
            return false;
        };
        let mut state = self.rt.lock();
        let Some(object) = state.heap.get_mut(target) else {
            return false;
        };
        match object.own(name) {
            Some(prop) if !prop.flags.contains(PropertyFlags::CONFIGURABLE) => false,
            Some(_) => object.remove(name).is_some(),
            None => true,
        }
    }

    /// Names of the enumerable own properties, in definition order.
    pub fn own_enumerable_keys(&self, obj: &RawValue) -> Vec<String> {
        let Some(target) = obj.as_object() else {
            return Vec::new();
        };
        let state = self.rt.lock();
        state
            .heap
            .get(target)
            .map(|object| {
                object
                    .properties()
                    .filter(|(_, prop)| prop.flags.contains(PropertyFlags::ENUMERABLE))
                    .map(|(key, _)| key.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `Object.getPrototypeOf(obj)` (`null` if none).
    pub fn get_prototype(&self, obj: &RawValue) -> RawValue {
        let proto = obj
            .as_object()
            .and_then(|id| self.rt.lock().heap.get(id).and_then(|o| o.proto));
        match proto {
            Some(id) => self.rt.dup_value(&RawValue::Object(id)),
            None => RawValue::Null,
        }
    }

    // ===== Classes and opaque slots =====

    /// Class of an object ([`ClassId::INVALID`] for immediates).
    pub fn class_id(&self, value: &RawValue) -> ClassId {
        value
            .as_object()
            .and_then(|id| self.rt.lock().heap.get(id).map(|o| o.class_id))
            .unwrap_or(ClassId::INVALID)
    }

    /// Context an object was created in.
    pub fn owner_of(&self, value: &RawValue) -> Option<ContextToken> {
        let id = value.as_object()?;
        self.rt.lock().heap.get(id).map(|o| o.owner)
    }

    /// Attach embedder data to an instance of a user class.
    pub fn set_opaque(&self, obj: &RawValue, opaque: Opaque) -> bool {
        let Some(id) = obj.as_object() else {
            return false;
        };
        let mut state = self.rt.lock();
        match state.heap.get_mut(id) {
            Some(object) if object.class_id.is_user() => {
                object.opaque = Some(opaque);
                true
            }
            _ => false,
        }
    }

    /// Read the opaque slot, checking the instance's class.
    pub fn get_opaque(&self, obj: &RawValue, class_id: ClassId) -> Option<Opaque> {
        let id = obj.as_object()?;
        let state = self.rt.lock();
        let object = state.heap.get(id)?;
        if object.class_id != class_id {
            return None;
        }
        object.opaque.clone()
    }

    /// Read the opaque slot together with the instance's class.
    pub fn opaque(&self, obj: &RawValue) -> Option<(ClassId, Opaque)> {
        let id = obj.as_object()?;
        let state = self.rt.lock();
        let object = state.heap.get(id)?;
        object.opaque.clone().map(|opaque| (object.class_id, opaque))
    }

    /// Detach and return the opaque slot.
    pub fn take_opaque(&self, obj: &RawValue) -> Option<Opaque> {
        let id = obj.as_object()?;
        self.rt.lock().heap.get_mut(id)?.opaque.take()
    }

    // ===== Calls =====

    pub fn is_function(&self, value: &RawValue) -> bool {
        value
            .as_object()
            .is_some_and(|id| self.rt.lock().heap.get(id).is_some_and(|o| o.callable.is_some()))
    }

    pub fn is_constructor(&self, value: &RawValue) -> bool {
        value.as_object().is_some_and(|id| {
            self.rt
                .lock()
                .heap
                .get(id)
                .and_then(|o| o.callable.as_ref())
                .is_some_and(Callable::is_constructor)
        })
    }

    /// `func.call(this, ...args)`
    pub fn call(&self, func: &RawValue, this: &RawValue, args: &[RawValue]) -> JsResult<RawValue> {
        self.invoke(func, this, args, false)
    }

    /// `new func(...args)`
    pub fn call_constructor(&self, func: &RawValue, args: &[RawValue]) -> JsResult<RawValue> {
        self.invoke(func, func, args, true)
    }

    /// `Reflect.construct(func, args, new_target)`.
    pub fn call_constructor_with_target(
        &self,
        func: &RawValue,
        new_target: &RawValue,
        args: &[RawValue],
    ) -> JsResult<RawValue> {
        if !self.is_constructor(new_target) {
            return self.thrown(ErrorKind::TypeError, "new.target is not a constructor");
        }
        self.invoke(func, new_target, args, true)
    }

    fn invoke(&self, func: &RawValue, this: &RawValue, args: &[RawValue], construct: bool) -> JsResult<RawValue> {
        self.rt.check_context(self.token)?;
        if self.rt.should_interrupt() {
            return self.thrown(ErrorKind::InternalError, "interrupted");
        }

        let target = func.as_object().and_then(|id| {
            let state = self.rt.lock();
            let object = state.heap.get(id)?;
            object.callable.clone().map(|callable| (callable, object.owner))
        });
        let Some((callable, owner)) = target else {
            let message = if construct { "not a constructor" } else { "not a function" };
            return self.thrown(ErrorKind::TypeError, message);
        };

        let mut roots = vec![func, this];
        roots.extend(args.iter());
        let Some(_frame) = self.rt.push_frame(&roots) else {
            return self.thrown(ErrorKind::RangeError, "Maximum call stack size exceeded");
        };

        match callable {
            Callable::Derived { base, name } => {
                if !construct {
                    let message = format!("Class constructor {} cannot be invoked without 'new'", name);
                    return self.thrown(ErrorKind::TypeError, &message);
                }
                self.invoke(&RawValue::Object(base), this, args, true)
            }
            Callable::Native(native) => {
                let realm = self.realm(owner)?;
                let result = match (native.kind, construct) {
                    (FunctionKind::Constructor, true) => (native.func)(&realm, this, args, native.magic),
                    (FunctionKind::Constructor, false) => {
                        let message =
                            format!("Class constructor {} cannot be invoked without 'new'", native.name);
                        return self.thrown(ErrorKind::TypeError, &message);
                    }
                    (_, true) => {
                        let message = format!("{} is not a constructor", native.name);
                        return self.thrown(ErrorKind::TypeError, &message);
                    }
                    (FunctionKind::Getter, false) => (native.func)(&realm, this, &[], native.magic),
                    (FunctionKind::Setter, false) => {
                        let value = args.first().cloned().unwrap_or_default();
                        (native.func)(&realm, this, std::slice::from_ref(&value), native.magic)
                    }
                    (FunctionKind::Generic, false) => (native.func)(&realm, this, args, native.magic),
                };
                self.settle(&realm, result)
            }
        }
    }

    /// The context a native function runs with: the one it was created in,
    /// whichever context calls it.
    fn realm(&self, owner: ContextToken) -> JsResult<EngineContext> {
        if owner == self.token {
            return Ok(self.clone());
        }
        if !self.rt.has_context(owner) {
            return self.thrown(ErrorKind::InternalError, "function context has been freed");
        }
        Ok(EngineContext::from_parts(self.rt.clone(), owner))
    }

    /// Turn a native function's return value into a result, moving an
    /// exception thrown in the function's own context to this one.
    fn settle(&self, realm: &EngineContext, result: RawValue) -> JsResult<RawValue> {
        if !result.is_exception() {
            return Ok(result);
        }
        if realm.token != self.token {
            if let Some(exception) = realm.take_exception() {
                self.throw(exception);
            }
        }
        if !self.has_exception() {
            self.throw_error(ErrorKind::InternalError, "native function failed without an exception");
        }
        Err(EngineError::Thrown)
    }

    /// `obj instanceof ctor`.
    pub fn instance_of(&self, obj: &RawValue, ctor: &RawValue) -> JsResult<bool> {
        if !self.is_function(ctor) {
            return self.thrown(ErrorKind::TypeError, "invalid 'instanceof' right operand");
        }
        let Some(target) = obj.as_object() else {
            return Ok(false);
        };
        let proto = self.get_property(ctor, "prototype")?;
        let found = match proto.as_object() {
            Some(proto_id) => {
                let state = self.rt.lock();
                let found = proto_chain(&state.heap, target).skip(1).any(|id| id == proto_id);
                found
            }
            None => {
                self.rt.free_value(&proto);
                return self.thrown(ErrorKind::TypeError, "constructor prototype is not an object");
            }
        };
        self.rt.free_value(&proto);
        Ok(found)
    }
}

// ===== Helpers =====

fn data(value: RawValue, flags: PropertyFlags) -> Property {
    Property {
        flags,
        slot: PropertySlot::Data(value),
    }
}

fn define_function_props(function: &mut Object, name: &str, length: u32) {
    function.define("name", data(RawValue::string(name), PropertyFlags::CONFIGURABLE));
    function.define(
        "length",
        data(RawValue::number(length as f64), PropertyFlags::CONFIGURABLE),
    );
}

fn retain(heap: &mut Heap, value: &RawValue) {
    if let Some(object) = value.as_object().and_then(|id| heap.get_mut(id)) {
        object.host_refs += 1;
    }
}

fn release(heap: &mut Heap, value: &RawValue) {
    if let Some(object) = value.as_object().and_then(|id| heap.get_mut(id)) {
        object.host_refs = object.host_refs.saturating_sub(1);
    }
}

/// The object followed by its prototypes.
fn proto_chain(heap: &Heap, start: ObjectId) -> impl Iterator<Item = ObjectId> + '_ {
    std::iter::successors(Some(start), move |id| heap.get(*id).and_then(|o| o.proto)).take(MAX_PROTO_CHAIN)
}

/// Find a property on `start` or its prototypes.
fn lookup(heap: &Heap, start: ObjectId, name: &str) -> Option<(ObjectId, Property)> {
    proto_chain(heap, start).find_map(|id| heap.get(id)?.own(name).map(|prop| (id, prop.clone())))
}

fn plan_write(heap: &mut Heap, target: ObjectId, name: &str, value: &RawValue) -> WritePlan {
    match lookup(heap, target, name) {
        Some((holder, prop)) => match prop.slot {
            PropertySlot::Accessor { setter: Some(setter), .. } => WritePlan::CallSetter(setter),
            PropertySlot::Accessor { setter: None, .. } => WritePlan::Ignore,
            PropertySlot::Data(_) if !prop.flags.contains(PropertyFlags::WRITABLE) => WritePlan::Ignore,
            PropertySlot::Data(_) => {
                let flags = if holder == target { prop.flags } else { PropertyFlags::DEFAULT };
                if let Some(object) = heap.get_mut(target) {
                    object.define(name, data(value.clone(), flags));
                }
                WritePlan::Done
            }
        },
        None => {
            if let Some(object) = heap.get_mut(target) {
                object.define(name, data(value.clone(), PropertyFlags::DEFAULT));
            }
            WritePlan::Done
        }
    }
}
