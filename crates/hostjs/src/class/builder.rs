//! Class builder
//!
//! Accumulates a class description and registers it with the engine:
//!
//! ```text
//! let point = ClassBuilder::new("Point")
//!     .constructor(|_ctx, _this, args| Ok(Point::new(&args)?))
//!     .method("norm", |_ctx, this, _args| this.with_bound(|p: &mut Point| p.norm()))
//!     .accessor("x", Some(getter(..)), Some(setter(..)))
//!     .build(&ctx)?;
//! ```
//!
//! Methods and accessors live on the class prototype and are not
//! enumerable. Instance properties are defined as own properties of every
//! new instance; static members live on the constructor.

use super::{
    dispatch, BoundObject, ConstructorEntry, ConstructorFn, GetterFn, HostEntry,
    HostObject, InstanceProperty, MethodFn, SetterFn,
};
use crate::context::Context;
use crate::convert::IntoJs;
use crate::error::{Error, MemberScope, Result};
use crate::handle::HandleId;
use crate::registry;
use crate::value::Value;
use hostjs_engine::{ClassDef, ClassId, FunctionKind, PropertyFlags, RawValue};
use std::collections::HashSet;
use std::sync::Arc;

/// Initial value of a data property.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    String(String),
    Value(Value),
}

impl PropertyValue {
    /// Engine value carrying one host reference.
    fn to_raw(&self, ctx: &Context) -> RawValue {
        match self {
            PropertyValue::Undefined => RawValue::Undefined,
            PropertyValue::Null => RawValue::Null,
            PropertyValue::Bool(b) => RawValue::Bool(*b),
            PropertyValue::Int(n) => RawValue::Int(*n),
            PropertyValue::Float(n) => RawValue::number(*n),
            PropertyValue::String(s) => RawValue::string(s),
            PropertyValue::Value(v) => ctx.engine().runtime().dup_value(v.raw()),
        }
    }
}

impl From<()> for PropertyValue {
    fn from(_: ()) -> Self {
        PropertyValue::Undefined
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Int(n)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Float(n)
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<Value> for PropertyValue {
    fn from(v: Value) -> Self {
        PropertyValue::Value(v)
    }
}

struct MethodDef {
    name: String,
    callback: MethodFn,
    length: u32,
}

struct AccessorDef {
    name: String,
    getter: Option<GetterFn>,
    setter: Option<SetterFn>,
}

struct PropertyDef {
    name: String,
    value: PropertyValue,
    flags: PropertyFlags,
}

/// A class registered with the engine.
#[derive(Debug, Clone)]
pub struct BuiltClass {
    /// The class constructor
    pub constructor: Value,
    /// Engine class of its instances
    pub class_id: ClassId,
}

/// Fluent class description.
pub struct ClassBuilder {
    name: String,
    constructor: Option<ConstructorFn>,
    constructor_length: u32,
    methods: Vec<MethodDef>,
    static_methods: Vec<MethodDef>,
    accessors: Vec<AccessorDef>,
    static_accessors: Vec<AccessorDef>,
    properties: Vec<PropertyDef>,
    static_properties: Vec<PropertyDef>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
            constructor_length: 0,
            methods: Vec::new(),
            static_methods: Vec::new(),
            accessors: Vec::new(),
            static_accessors: Vec::new(),
            properties: Vec::new(),
            static_properties: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ===== Constructor =====

    /// Set the constructor.
    ///
    /// It receives the pre-allocated instance and returns the host object
    /// to bind to it.
    pub fn constructor<F, T>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<T> + Send + Sync + 'static,
        T: HostObject,
    {
        let callback: ConstructorFn = Arc::new(move |ctx: &Context, this: &Value, args: &[Value]| {
            f(ctx, this, args).map(BoundObject::new)
        });
        self.constructor = Some(callback);
        self
    }

    /// Declared constructor arity (`Ctor.length`).
    pub fn constructor_length(mut self, length: u32) -> Self {
        self.constructor_length = length;
        self
    }

    // ===== Methods =====

    pub fn method<F, R>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<R> + Send + Sync + 'static,
        R: IntoJs,
    {
        self.method_with_length(name, 0, f)
    }

    pub fn method_with_length<F, R>(mut self, name: &str, length: u32, f: F) -> Self
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<R> + Send + Sync + 'static,
        R: IntoJs,
    {
        self.methods.push(MethodDef {
            name: name.to_string(),
            callback: method_fn(f),
            length,
        });
        self
    }

    pub fn static_method<F, R>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<R> + Send + Sync + 'static,
        R: IntoJs,
    {
        self.static_method_with_length(name, 0, f)
    }

    pub fn static_method_with_length<F, R>(mut self, name: &str, length: u32, f: F) -> Self
    where
        F: Fn(&Context, &Value, &[Value]) -> Result<R> + Send + Sync + 'static,
        R: IntoJs,
    {
        self.static_methods.push(MethodDef {
            name: name.to_string(),
            callback: method_fn(f),
            length,
        });
        self
    }

    // ===== Accessors =====

    /// Add an instance accessor; at least one side must be present.
    ///
    /// See [`getter`](super::getter) and [`setter`](super::setter) for
    /// building the callbacks from closures.
    pub fn accessor(mut self, name: &str, getter: Option<GetterFn>, setter: Option<SetterFn>) -> Self {
        self.accessors.push(AccessorDef {
            name: name.to_string(),
            getter,
            setter,
        });
        self
    }

    pub fn read_only_accessor<F, R>(self, name: &str, getter: F) -> Self
    where
        F: Fn(&Context, &Value) -> Result<R> + Send + Sync + 'static,
        R: IntoJs,
    {
        self.accessor(name, Some(super::getter(getter)), None)
    }

    pub fn write_only_accessor<F>(self, name: &str, setter: F) -> Self
    where
        F: Fn(&Context, &Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.accessor(name, None, Some(super::setter(setter)))
    }

    /// Add an accessor on the constructor.
    pub fn static_accessor(mut self, name: &str, getter: Option<GetterFn>, setter: Option<SetterFn>) -> Self {
        self.static_accessors.push(AccessorDef {
            name: name.to_string(),
            getter,
            setter,
        });
        self
    }

    pub fn static_read_only_accessor<F, R>(self, name: &str, getter: F) -> Self
    where
        F: Fn(&Context, &Value) -> Result<R> + Send + Sync + 'static,
        R: IntoJs,
    {
        self.static_accessor(name, Some(super::getter(getter)), None)
    }

    pub fn static_write_only_accessor<F>(self, name: &str, setter: F) -> Self
    where
        F: Fn(&Context, &Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.static_accessor(name, None, Some(super::setter(setter)))
    }

    // ===== Data properties =====

    /// Writable, enumerable, configurable data property on every instance.
    pub fn property(self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.property_with_flags(name, value, PropertyFlags::DEFAULT)
    }

    /// Data property on every instance with exactly `flags`.
    pub fn property_with_flags(mut self, name: &str, value: impl Into<PropertyValue>, flags: PropertyFlags) -> Self {
        self.properties.push(PropertyDef {
            name: name.to_string(),
            value: value.into(),
            flags,
        });
        self
    }

    pub fn static_property(self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.static_property_with_flags(name, value, PropertyFlags::DEFAULT)
    }

    pub fn static_property_with_flags(
        mut self,
        name: &str,
        value: impl Into<PropertyValue>,
        flags: PropertyFlags,
    ) -> Self {
        self.static_properties.push(PropertyDef {
            name: name.to_string(),
            value: value.into(),
            flags,
        });
        self
    }

    // ===== Build =====

    /// Check the description without touching the engine.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::EmptyClassName);
        }
        if self.constructor.is_none() {
            return Err(Error::MissingConstructor);
        }
        for accessor in self.accessors.iter().chain(&self.static_accessors) {
            if accessor.getter.is_none() && accessor.setter.is_none() {
                return Err(Error::EmptyAccessor(accessor.name.clone()));
            }
        }
        check_unique(
            MemberScope::Instance,
            self.methods
                .iter()
                .map(|m| &m.name)
                .chain(self.accessors.iter().map(|a| &a.name))
                .chain(self.properties.iter().map(|p| &p.name)),
        )?;
        check_unique(
            MemberScope::Static,
            self.static_methods
                .iter()
                .map(|m| &m.name)
                .chain(self.static_accessors.iter().map(|a| &a.name))
                .chain(self.static_properties.iter().map(|p| &p.name)),
        )
    }

    /// Register the class in `ctx`.
    ///
    /// The engine class and its prototype are only registered once every
    /// member exists. On failure every handle created by the attempt is
    /// deleted again and the engine knows nothing of the class.
    pub fn build(&self, ctx: &Context) -> Result<BuiltClass> {
        self.validate()?;
        let constructor = self.constructor.clone().ok_or(Error::MissingConstructor)?;
        let class_id = ClassId::new();

        let mut created = Vec::new();
        let result = self.build_members(ctx, class_id, constructor, &mut created);
        match &result {
            Ok(_) => log::debug!(
                "class '{}' built as {} ({} handles)",
                self.name,
                class_id,
                created.len()
            ),
            Err(err) => {
                for id in created {
                    ctx.handles().delete(id);
                }
                log::debug!("class '{}' failed to build: {}", self.name, err);
            }
        }
        result
    }

    fn build_members(
        &self,
        ctx: &Context,
        class_id: ClassId,
        constructor: ConstructorFn,
        created: &mut Vec<HandleId>,
    ) -> Result<BuiltClass> {
        let engine = ctx.engine();
        let proto = ctx.object()?;

        for method in &self.methods {
            define_method(ctx, &proto, method, created)?;
        }
        for accessor in &self.accessors {
            define_accessor(ctx, &proto, accessor, created)?;
        }

        let instance_properties = self
            .properties
            .iter()
            .map(|prop| InstanceProperty {
                name: prop.name.clone(),
                value: prop.value.to_raw(ctx),
                flags: prop.flags,
            })
            .collect();
        let entry = ConstructorEntry {
            callback: constructor,
            class_id,
            class_name: self.name.clone(),
            instance_properties,
            runtime: engine.runtime().clone(),
        };
        let id = store(ctx, HostEntry::Constructor(Arc::new(entry)), created)?;
        let ctor = ctx.check(engine.new_function(
            dispatch::constructor_proxy,
            &self.name,
            self.constructor_length,
            FunctionKind::Constructor,
            id.as_i32(),
        ))?;
        let ctor = Value::from_owned(ctx, ctor);
        ctx.check(engine.set_constructor(ctor.raw(), proto.raw()))?;

        for method in &self.static_methods {
            define_method(ctx, &ctor, method, created)?;
        }
        for accessor in &self.static_accessors {
            define_accessor(ctx, &ctor, accessor, created)?;
        }
        for prop in &self.static_properties {
            let value = Value::from_owned(ctx, prop.value.to_raw(ctx));
            ctx.check(engine.define_property_value(ctor.raw(), &prop.name, value.raw(), prop.flags))?;
        }

        ctx.check(engine.set_class_proto(class_id, proto.raw()))?;
        let def = ClassDef::new(self.name.clone()).with_finalizer(dispatch::finalizer_proxy);
        engine.runtime().register_class(class_id, def);
        registry::register_class(ctor.raw(), class_id, ctx.runtime_token());
        Ok(BuiltClass {
            constructor: ctor,
            class_id,
        })
    }
}

impl std::fmt::Debug for ClassBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassBuilder")
            .field("name", &self.name)
            .field("has_constructor", &self.constructor.is_some())
            .field("methods", &self.methods.len())
            .field("static_methods", &self.static_methods.len())
            .field("accessors", &self.accessors.len())
            .field("static_accessors", &self.static_accessors.len())
            .field("properties", &self.properties.len())
            .field("static_properties", &self.static_properties.len())
            .finish()
    }
}

fn method_fn<F, R>(f: F) -> MethodFn
where
    F: Fn(&Context, &Value, &[Value]) -> Result<R> + Send + Sync + 'static,
    R: IntoJs,
{
    Arc::new(move |ctx: &Context, this: &Value, args: &[Value]| f(ctx, this, args)?.into_js(ctx))
}

fn check_unique<'a>(scope: MemberScope, names: impl Iterator<Item = &'a String>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(Error::DuplicateMember {
                scope,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

fn store(ctx: &Context, entry: HostEntry, created: &mut Vec<HandleId>) -> Result<HandleId> {
    let id = ctx.handles().try_store(entry)?;
    created.push(id);
    Ok(id)
}

/// Non-enumerable method on `target`.
fn define_method(ctx: &Context, target: &Value, method: &MethodDef, created: &mut Vec<HandleId>) -> Result<()> {
    let engine = ctx.engine();
    let id = store(ctx, HostEntry::Method(method.callback.clone()), created)?;
    let f = ctx.check(engine.new_function(
        dispatch::method_proxy,
        &method.name,
        method.length,
        FunctionKind::Generic,
        id.as_i32(),
    ))?;
    let f = Value::from_owned(ctx, f);
    ctx.check(engine.define_property_value(target.raw(), &method.name, f.raw(), PropertyFlags::HIDDEN))
}

/// Non-enumerable accessor on `target`.
fn define_accessor(
    ctx: &Context,
    target: &Value,
    accessor: &AccessorDef,
    created: &mut Vec<HandleId>,
) -> Result<()> {
    let engine = ctx.engine();
    let getter = match accessor.getter.clone() {
        Some(callback) => {
            let id = store(ctx, HostEntry::Getter(callback), created)?;
            let name = format!("get {}", accessor.name);
            let raw = ctx.check(engine.new_function(dispatch::getter_proxy, &name, 0, FunctionKind::Getter, id.as_i32()))?;
            Some(Value::from_owned(ctx, raw))
        }
        None => None,
    };
    let setter = match accessor.setter.clone() {
        Some(callback) => {
            let id = store(ctx, HostEntry::Setter(callback), created)?;
            let name = format!("set {}", accessor.name);
            let raw = ctx.check(engine.new_function(dispatch::setter_proxy, &name, 1, FunctionKind::Setter, id.as_i32()))?;
            Some(Value::from_owned(ctx, raw))
        }
        None => None,
    };

    ctx.check(engine.define_property_accessor(
        target.raw(),
        &accessor.name,
        getter.as_ref().map(Value::raw),
        setter.as_ref().map(Value::raw),
        PropertyFlags::CONFIGURABLE,
    ))
}
