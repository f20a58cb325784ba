//! Reflection binder
//!
//! Turns a struct described by [`Reflect`] (usually through
//! `#[derive(Reflect)]`) into a class: every reflected field becomes a
//! read/write accessor, every listed method a prototype method, and the
//! constructor builds `T::default()` and fills it from its arguments.
//!
//! [`plan`] is the pure part: it decides which members a class gets.
//! [`ClassBuilder::reflect`] turns the plan into builder calls.

use crate::class::{getter, setter, BuiltClass, ClassBuilder, HostObject};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::value::Value;
use hostjs_engine::ClassId;
use std::fmt;
use std::sync::Arc;

/// Method names never bound, whatever the options say.
const SPECIAL_METHODS: &[&str] = &["finalize", "to_string", "drop", "clone", "fmt"];

/// A reflected field.
pub struct FieldInfo<T> {
    /// Script-side name
    pub name: &'static str,
    /// Rust field name
    pub field: &'static str,
    pub get: fn(&T, &Context) -> Result<Value>,
    pub set: fn(&mut T, &Value) -> Result<()>,
}

/// A reflected method.
pub struct MethodInfo<T> {
    pub name: &'static str,
    /// Declared arity (`fn.length`)
    pub length: u32,
    pub call: fn(&mut T, &Context, &[Value]) -> Result<Value>,
}

impl<T> MethodInfo<T> {
    pub fn new(name: &'static str, length: u32, call: fn(&mut T, &Context, &[Value]) -> Result<Value>) -> Self {
        Self { name, length, call }
    }
}

// Manual impls: derives would require `T: Clone`
impl<T> Clone for FieldInfo<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldInfo<T> {}

impl<T> Clone for MethodInfo<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MethodInfo<T> {}

impl<T> fmt::Debug for FieldInfo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("name", &self.name)
            .field("field", &self.field)
            .finish()
    }
}

impl<T> fmt::Debug for MethodInfo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInfo")
            .field("name", &self.name)
            .field("length", &self.length)
            .finish()
    }
}

/// A host type that can be bound by reflection.
pub trait Reflect: HostObject + Default {
    /// Default script-side class name.
    fn class_name() -> &'static str;

    /// Reflected fields, in declaration order.
    fn fields() -> Vec<FieldInfo<Self>>;

    /// Bound methods
    fn methods() -> Vec<MethodInfo<Self>> {
        Vec::new()
    }
}

/// Reflection binding configuration.
#[derive(Debug, Clone, Default)]
pub struct ReflectOptions {
    /// Class name overriding [`Reflect::class_name`]
    pub class_name: Option<String>,

    /// Only bind methods whose name starts with this prefix
    pub method_prefix: Option<String>,

    /// Method names to leave out
    pub ignored_methods: Vec<String>,

    /// Field names (Rust or script-side) to leave out of the accessors
    pub ignored_fields: Vec<String>,
}

impl ReflectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    pub fn with_method_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.method_prefix = Some(prefix.into());
        self
    }

    pub fn ignore_method(mut self, name: impl Into<String>) -> Self {
        self.ignored_methods.push(name.into());
        self
    }

    pub fn ignore_field(mut self, name: impl Into<String>) -> Self {
        self.ignored_fields.push(name.into());
        self
    }

    fn skips_method(&self, name: &str) -> bool {
        if let Some(prefix) = &self.method_prefix {
            if !prefix.is_empty() && !name.starts_with(prefix.as_str()) {
                return true;
            }
        }
        self.ignored_methods.iter().any(|m| m == name) || SPECIAL_METHODS.contains(&name)
    }

    fn skips_field(&self, field: &FieldInfo<impl Sized>) -> bool {
        self.ignored_fields
            .iter()
            .any(|f| f == field.field || f == field.name)
    }
}

/// A member the binder will add to a class.
#[derive(Debug)]
pub enum Member<T> {
    /// Read/write accessor backed by a field
    Accessor(FieldInfo<T>),
    /// Prototype method
    Method(MethodInfo<T>),
}

impl<T> Member<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Member::Accessor(field) => field.name,
            Member::Method(method) => method.name,
        }
    }
}

/// Decide which members `T` is bound with: accessors first, then methods.
pub fn plan<T: Reflect>(options: &ReflectOptions) -> Vec<Member<T>> {
    let accessors = T::fields()
        .into_iter()
        .filter(|field| !options.skips_field(field))
        .map(Member::Accessor);
    let methods = T::methods()
        .into_iter()
        .filter(|method| !options.skips_method(method.name))
        .map(Member::Method);
    accessors.chain(methods).collect()
}

/// A single plain object argument means named initialization.
fn is_plain_object(value: &Value) -> bool {
    value.is_object() && !value.is_function() && value.class_id() == ClassId::OBJECT
}

/// Fill a fresh object from constructor arguments.
///
/// `new T(a, b)` assigns reflected fields in order; `new T({ x: 1 })`
/// assigns the fields named in the object.
fn initialize<T>(object: &mut T, fields: &[FieldInfo<T>], args: &[Value]) -> Result<()> {
    let field_error = |field: &FieldInfo<T>, err: Error| {
        Error::host(format!("failed to set field {}: {}", field.field, err))
    };
    if let [single] = args {
        if is_plain_object(single) {
            for field in fields {
                if single.has(field.name) {
                    let value = single.get(field.name)?;
                    (field.set)(object, &value).map_err(|err| field_error(field, err))?;
                }
            }
            return Ok(());
        }
    }
    for (field, arg) in fields.iter().zip(args) {
        (field.set)(object, arg).map_err(|err| field_error(field, err))?;
    }
    Ok(())
}

impl ClassBuilder {
    /// Describe `T` as a class by reflection.
    pub fn reflect<T: Reflect>(options: &ReflectOptions) -> ClassBuilder {
        let name = options
            .class_name
            .clone()
            .unwrap_or_else(|| T::class_name().to_string());
        let fields: Arc<[FieldInfo<T>]> = T::fields().into();

        let mut builder = ClassBuilder::new(name).constructor(move |_ctx: &Context, _this: &Value, args: &[Value]| {
            let mut object = T::default();
            initialize(&mut object, &fields, args)?;
            Ok(object)
        });

        for member in plan::<T>(options) {
            builder = match member {
                Member::Accessor(field) => builder.accessor(
                    field.name,
                    Some(getter(move |ctx: &Context, this: &Value| {
                        this.with_bound(|object: &mut T| (field.get)(object, ctx))?
                    })),
                    Some(setter(move |_ctx: &Context, this: &Value, value: &Value| {
                        this.with_bound(|object: &mut T| (field.set)(object, value))?
                    })),
                ),
                Member::Method(method) => builder.method_with_length(
                    method.name,
                    method.length,
                    move |ctx: &Context, this: &Value, args: &[Value]| {
                        this.with_bound(|object: &mut T| (method.call)(object, ctx, args))?
                    },
                ),
            };
        }
        builder
    }
}

impl Context {
    /// Reflect `T` into a class and build it in this context.
    pub fn bind_class<T: Reflect>(&self, options: &ReflectOptions) -> Result<BuiltClass> {
        ClassBuilder::reflect::<T>(options).build(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{FromJs, IntoJs};

    #[derive(Default)]
    struct Sample {
        label: String,
        hits: i32,
    }

    impl HostObject for Sample {}

    impl Reflect for Sample {
        fn class_name() -> &'static str {
            "Sample"
        }

        fn fields() -> Vec<FieldInfo<Self>> {
            vec![
                FieldInfo {
                    name: "label",
                    field: "label",
                    get: |this: &Self, ctx: &Context| this.label.clone().into_js(ctx),
                    set: |this: &mut Self, value: &Value| {
                        this.label = String::from_js(value)?;
                        Ok(())
                    },
                },
                FieldInfo {
                    name: "hitCount",
                    field: "hits",
                    get: |this: &Self, ctx: &Context| this.hits.into_js(ctx),
                    set: |this: &mut Self, value: &Value| {
                        this.hits = i32::from_js(value)?;
                        Ok(())
                    },
                },
            ]
        }

        fn methods() -> Vec<MethodInfo<Self>> {
            vec![
                MethodInfo::new("hit", 0, |this: &mut Self, ctx: &Context, _args: &[Value]| {
                    this.hits += 1;
                    this.hits.into_js(ctx)
                }),
                MethodInfo::new("reset", 0, |this: &mut Self, ctx: &Context, _args: &[Value]| {
                    this.hits = 0;
                    Ok(ctx.undefined())
                }),
                MethodInfo::new("to_string", 0, |this: &mut Self, ctx: &Context, _args: &[Value]| {
                    this.label.clone().into_js(ctx)
                }),
            ]
        }
    }

    fn names(members: &[Member<Sample>]) -> Vec<&'static str> {
        members.iter().map(Member::name).collect()
    }

    #[test]
    fn test_plan_defaults() {
        let members = plan::<Sample>(&ReflectOptions::default());
        assert_eq!(names(&members), vec!["label", "hitCount", "hit", "reset"]);
    }

    #[test]
    fn test_plan_filters() {
        let options = ReflectOptions::new()
            .with_method_prefix("h")
            .ignore_field("hits");
        assert_eq!(names(&plan::<Sample>(&options)), vec!["label", "hit"]);

        let options = ReflectOptions::new()
            .ignore_method("reset")
            .ignore_field("label");
        assert_eq!(names(&plan::<Sample>(&options)), vec!["hitCount", "hit"]);
    }

    #[test]
    fn test_positional_initialization() {
        let rt = crate::Runtime::new();
        let ctx = rt.new_context().unwrap();
        let mut sample = Sample::default();
        initialize(&mut sample, &Sample::fields(), &[ctx.string("a"), ctx.int(3)]).unwrap();
        assert_eq!(sample.label, "a");
        assert_eq!(sample.hits, 3);
    }

    #[test]
    fn test_named_initialization() {
        let rt = crate::Runtime::new();
        let ctx = rt.new_context().unwrap();
        let args = ctx.object().unwrap();
        args.set("hitCount", 9).unwrap();
        let mut sample = Sample::default();
        initialize(&mut sample, &Sample::fields(), &[args]).unwrap();
        assert_eq!(sample.label, "");
        assert_eq!(sample.hits, 9);
    }

    #[test]
    fn test_initialization_type_error() {
        let rt = crate::Runtime::new();
        let ctx = rt.new_context().unwrap();
        let mut sample = Sample::default();
        let err = initialize(&mut sample, &Sample::fields(), &[ctx.int(1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to set field label: Type mismatch: expected string, got number"
        );
    }
}
