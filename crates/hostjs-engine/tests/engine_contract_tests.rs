//! Integration tests for the native engine contract
//!
//! Covers the pieces the bridge depends on:
//! - classes, opaque slots and finalizers driven by the collector
//! - accessors and non-strict property writes
//! - construction with `new.target` and script-side subclassing
//! - the interrupt hook

use hostjs_engine::{
    ClassDef, ClassId, EngineContext, EngineError, EngineRuntime, ErrorKind, FinalizeInfo,
    FunctionKind, Opaque, PropertyFlags, RawValue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ===== Helpers =====

static FINALIZED_WORDS: AtomicUsize = AtomicUsize::new(0);

fn sum_finalizer(_rt: &EngineRuntime, info: FinalizeInfo) {
    if let Some(word) = info.opaque.and_then(|o| o.as_word()) {
        FINALIZED_WORDS.fetch_add(word, Ordering::SeqCst);
    }
}

/// Constructor storing its first argument in the opaque slot
fn counter_ctor(ctx: &EngineContext, new_target: &RawValue, args: &[RawValue], magic: i32) -> RawValue {
    let class_id = ClassId::from_u32(magic as u32);
    let proto = match ctx.get_property(new_target, "prototype") {
        Ok(proto) => proto,
        Err(_) => return RawValue::Exception,
    };
    let obj = ctx.new_object_proto_class(&proto, class_id);
    ctx.runtime().free_value(&proto);
    let Ok(obj) = obj else {
        return RawValue::Exception;
    };
    let word = args.first().and_then(RawValue::as_f64).unwrap_or(0.0) as usize;
    ctx.set_opaque(&obj, Opaque::Word(word));
    obj
}

/// Getter reading the opaque slot back as a number
fn counter_value(ctx: &EngineContext, this: &RawValue, _args: &[RawValue], _magic: i32) -> RawValue {
    match ctx.opaque(this).and_then(|(_, o)| o.as_word()) {
        Some(word) => RawValue::number(word as f64),
        None => ctx.throw_error(ErrorKind::TypeError, "not a counter"),
    }
}

fn define_counter(ctx: &EngineContext, class_id: ClassId) -> RawValue {
    let proto = ctx.new_object().unwrap();
    let getter = ctx
        .new_function(counter_value, "get value", 0, FunctionKind::Getter, 0)
        .unwrap();
    ctx.define_property_accessor(&proto, "value", Some(&getter), None, PropertyFlags::CONFIGURABLE)
        .unwrap();
    let ctor = ctx
        .new_function(counter_ctor, "Counter", 1, FunctionKind::Constructor, class_id.as_u32() as i32)
        .unwrap();
    ctx.set_constructor(&ctor, &proto).unwrap();
    ctx.set_class_proto(class_id, &proto).unwrap();
    ctor
}

// ===== Class and Accessor Tests =====

#[test]
fn test_construct_and_read_accessor() {
    let rt = EngineRuntime::new();
    let class_id = rt.new_class(ClassDef::new("Counter"));
    let ctx = rt.new_context();
    let ctor = define_counter(&ctx, class_id);

    let obj = ctx.call_constructor(&ctor, &[RawValue::Int(5)]).unwrap();
    assert_eq!(ctx.class_id(&obj), class_id);
    assert_eq!(ctx.get_property(&obj, "value").unwrap(), RawValue::Int(5));
    assert!(ctx.instance_of(&obj, &ctor).unwrap());

    // No setter: the write is ignored
    ctx.set_property(&obj, "value", &RawValue::Int(9)).unwrap();
    assert_eq!(ctx.get_property(&obj, "value").unwrap(), RawValue::Int(5));
}

#[test]
fn test_subclass_uses_new_target_prototype() {
    let rt = EngineRuntime::new();
    let class_id = rt.new_class(ClassDef::new("Counter"));
    let ctx = rt.new_context();
    let base = define_counter(&ctx, class_id);
    let sub = ctx.new_subclass(&base, "SubCounter").unwrap();

    let obj = ctx.call_constructor(&sub, &[RawValue::Int(3)]).unwrap();
    assert_eq!(ctx.class_id(&obj), class_id);
    assert!(ctx.instance_of(&obj, &sub).unwrap());
    assert!(ctx.instance_of(&obj, &base).unwrap());
    assert_eq!(ctx.get_property(&obj, "value").unwrap(), RawValue::Int(3));

    // Calling a class constructor without `new` is a TypeError
    assert_eq!(
        ctx.call(&sub, &RawValue::Undefined, &[]),
        Err(EngineError::Thrown)
    );
    assert!(ctx.take_exception().is_some());
}

// ===== Collector Tests =====

#[test]
fn test_finalizer_runs_only_for_unreachable_instances() {
    let rt = EngineRuntime::new();
    let class_id = rt.new_class(ClassDef::new("Tracked").with_finalizer(sum_finalizer));
    let ctx = rt.new_context();

    let kept = ctx.new_object_class(class_id).unwrap();
    ctx.set_opaque(&kept, Opaque::Word(1000));
    let dropped = ctx.new_object_class(class_id).unwrap();
    ctx.set_opaque(&dropped, Opaque::Word(1));

    // Reachable through the global object only
    let global = ctx.global_object().unwrap();
    let by_global = ctx.new_object_class(class_id).unwrap();
    ctx.set_opaque(&by_global, Opaque::Word(100_000));
    ctx.set_property(&global, "held", &by_global).unwrap();
    rt.free_value(&by_global);

    let before = FINALIZED_WORDS.load(Ordering::SeqCst);
    rt.free_value(&dropped);
    rt.run_gc();
    rt.run_gc();
    let after = FINALIZED_WORDS.load(Ordering::SeqCst);
    assert_eq!(after - before, 1);
    assert!(ctx.is_live(&kept));
    assert!(ctx.is_live(&by_global));
    assert!(!ctx.is_live(&dropped));
}

#[test]
fn test_gc_threshold_collects_automatically() {
    let rt = EngineRuntime::new();
    rt.set_gc_threshold(Some(8));
    let ctx = rt.new_context();
    for _ in 0..64 {
        let obj = ctx.new_object().unwrap();
        rt.free_value(&obj);
    }
    assert!(rt.gc_stats().collections > 0);
    assert!(rt.object_count() < 64);
}

#[test]
fn test_shared_opaque_survives_until_collected() {
    let rt = EngineRuntime::new();
    let class_id = rt.new_class(ClassDef::new("Shared"));
    let ctx = rt.new_context();
    let payload: Arc<dyn std::any::Any + Send + Sync> = Arc::new(String::from("payload"));

    let obj = ctx.new_object_class(class_id).unwrap();
    assert!(ctx.set_opaque(&obj, Opaque::Shared(payload.clone())));
    assert_eq!(Arc::strong_count(&payload), 2);

    let fetched = ctx.get_opaque(&obj, class_id).unwrap();
    let text = fetched
        .as_shared()
        .and_then(|p| p.downcast_ref::<String>())
        .cloned();
    assert_eq!(text.as_deref(), Some("payload"));
    assert!(ctx.get_opaque(&obj, ClassId::OBJECT).is_none());
    drop(fetched);

    rt.free_value(&obj);
    rt.run_gc();
    assert_eq!(Arc::strong_count(&payload), 1);
}

// ===== Interrupt Tests =====

fn always_interrupt(_rt: &EngineRuntime, opaque: usize) -> bool {
    opaque == 1
}

fn noop(_ctx: &EngineContext, _this: &RawValue, _args: &[RawValue], _magic: i32) -> RawValue {
    RawValue::Undefined
}

#[test]
fn test_interrupt_handler_aborts_calls() {
    let rt = EngineRuntime::new();
    let ctx = rt.new_context();
    let f = ctx.new_function(noop, "noop", 0, FunctionKind::Generic, 0).unwrap();

    rt.set_interrupt_handler(Some((always_interrupt, 0)));
    assert!(ctx.call(&f, &RawValue::Undefined, &[]).is_ok());

    rt.set_interrupt_handler(Some((always_interrupt, 1)));
    assert_eq!(ctx.call(&f, &RawValue::Undefined, &[]), Err(EngineError::Thrown));
    let exc = ctx.take_exception().unwrap();
    assert_eq!(
        ctx.get_property(&exc, "message").unwrap(),
        RawValue::string("interrupted")
    );

    rt.set_interrupt_handler(None);
    assert!(ctx.call(&f, &RawValue::Undefined, &[]).is_ok());
}
