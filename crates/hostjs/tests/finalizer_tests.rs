//! Integration tests for instance finalization
//!
//! A bound host object is finalized exactly once, only after its script
//! instance became unreachable (or its runtime/context was torn down),
//! and its handle store slot is released with it.

use hostjs::registry::{register_context, unregister_context};
use hostjs::{BindingMode, BuiltClass, ClassBuilder, Context, HostObject, Runtime, RuntimeOptions, Value};
use parking_lot::Mutex;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<i32>>>;

struct Tracked {
    id: i32,
    log: Log,
}

impl HostObject for Tracked {
    fn finalize(&mut self) {
        self.log.lock().push(self.id);
    }
}

fn tracked_class(ctx: &Context, log: &Log) -> BuiltClass {
    let log = Arc::clone(log);
    ClassBuilder::new("Tracked")
        .constructor(move |_ctx: &Context, _this: &Value, args: &[Value]| {
            Ok(Tracked {
                id: args.first().map(Value::to_i32).transpose()?.unwrap_or(0),
                log: Arc::clone(&log),
            })
        })
        .method("id", |_ctx: &Context, this: &Value, _args: &[Value]| {
            this.with_bound(|t: &mut Tracked| t.id)
        })
        .build(ctx)
        .unwrap()
}

fn sorted(log: &Log) -> Vec<i32> {
    let mut ids = log.lock().clone();
    ids.sort_unstable();
    ids
}

// ===== Reachability Tests =====

#[test]
fn test_finalized_once_after_unreachable() {
    let rt = Runtime::new();
    let ctx = rt.new_context().unwrap();
    let log = Log::default();
    let class = tracked_class(&ctx, &log);
    let handles = ctx.handle_count();

    let kept = class.constructor.construct(&[ctx.int(1)]).unwrap();
    let dropped = class.constructor.construct(&[ctx.int(2)]).unwrap();
    assert_eq!(ctx.handle_count(), handles + 2);

    drop(dropped);
    rt.run_gc();
    assert_eq!(sorted(&log), vec![2]);
    assert_eq!(ctx.handle_count(), handles + 1);

    // Collecting again does not finalize twice
    rt.run_gc();
    assert_eq!(sorted(&log), vec![2]);

    // The kept instance is still fully usable
    assert_eq!(kept.call_method("id", &[]).unwrap().to_i32().unwrap(), 1);

    drop(kept);
    rt.run_gc();
    assert_eq!(sorted(&log), vec![1, 2]);
    assert_eq!(ctx.handle_count(), handles);
}

#[test]
fn test_reachable_from_globals_is_not_finalized() {
    let rt = Runtime::new();
    let ctx = rt.new_context().unwrap();
    let log = Log::default();
    let class = tracked_class(&ctx, &log);

    let instance = class.constructor.construct(&[ctx.int(7)]).unwrap();
    ctx.set_global("keep", &instance).unwrap();
    drop(instance);

    for _ in 0..3 {
        rt.run_gc();
    }
    assert!(log.lock().is_empty());

    let instance = ctx.globals().unwrap().get("keep").unwrap();
    assert_eq!(instance.call_method("id", &[]).unwrap().to_i32().unwrap(), 7);
    drop(instance);

    assert!(ctx.globals().unwrap().delete("keep"));
    rt.run_gc();
    assert_eq!(sorted(&log), vec![7]);
}

#[test]
fn test_reachable_through_another_instance_property() {
    let rt = Runtime::new();
    let ctx = rt.new_context().unwrap();
    let log = Log::default();
    let class = tracked_class(&ctx, &log);

    let outer = class.constructor.construct(&[ctx.int(1)]).unwrap();
    let inner = class.constructor.construct(&[ctx.int(2)]).unwrap();
    outer.set("child", inner).unwrap();

    rt.run_gc();
    assert!(log.lock().is_empty());

    drop(outer);
    rt.run_gc();
    assert_eq!(sorted(&log), vec![1, 2]);
}

#[test]
fn test_gc_threshold_finalizes_automatically() {
    let rt = Runtime::with_options(RuntimeOptions::default().with_gc_threshold(16));
    let ctx = rt.new_context().unwrap();
    let log = Log::default();
    let class = tracked_class(&ctx, &log);

    for i in 0..64 {
        class.constructor.construct(&[ctx.int(i)]).unwrap();
    }
    assert!(!log.lock().is_empty());
    assert!(rt.gc_stats().collections > 0);

    rt.run_gc();
    assert_eq!(sorted(&log), (0..64).collect::<Vec<_>>());
}

// ===== Teardown Tests =====

#[test]
fn test_runtime_close_finalizes_everything_once() {
    let rt = Runtime::new();
    let ctx = rt.new_context().unwrap();
    let log = Log::default();
    let class = tracked_class(&ctx, &log);

    let held = class.constructor.construct(&[ctx.int(1)]).unwrap();
    let global = class.constructor.construct(&[ctx.int(2)]).unwrap();
    ctx.set_global("g", &global).unwrap();
    drop(global);

    rt.close();
    assert_eq!(sorted(&log), vec![1, 2]);
    assert!(ctx.is_closed());

    // Dropping host values after teardown is harmless
    drop(held);
    drop(class);
    assert_eq!(sorted(&log), vec![1, 2]);
}

#[test]
fn test_dropping_runtime_closes_it() {
    let log = Log::default();
    {
        let rt = Runtime::new();
        let ctx = rt.new_context().unwrap();
        let class = tracked_class(&ctx, &log);
        let _a = class.constructor.construct(&[ctx.int(1)]).unwrap();
        let _b = class.constructor.construct(&[ctx.int(2)]).unwrap();
    }
    assert_eq!(sorted(&log), vec![1, 2]);
}

#[test]
fn test_context_close_finalizes_bound_objects() {
    let rt = Runtime::new();
    let ctx = rt.new_context().unwrap();
    let other = rt.new_context().unwrap();
    let log = Log::default();
    let class = tracked_class(&ctx, &log);
    let other_class = tracked_class(&other, &log);

    let _a = class.constructor.construct(&[ctx.int(1)]).unwrap();
    let _b = other_class.constructor.construct(&[other.int(2)]).unwrap();

    ctx.close();
    assert_eq!(sorted(&log), vec![1]);
    assert_eq!(ctx.handle_count(), 0);
    assert_eq!(rt.contexts(), vec![other.clone()]);

    // A later collection does not finalize the closed context's objects again
    rt.run_gc();
    assert_eq!(sorted(&log), vec![1]);

    rt.close();
    assert_eq!(sorted(&log), vec![1, 2]);
}

#[test]
fn test_missing_context_skips_finalization() {
    let rt = Runtime::new();
    let ctx = rt.new_context().unwrap();
    let log = Log::default();
    let class = tracked_class(&ctx, &log);
    let handles = ctx.handle_count();

    let instance = class.constructor.construct(&[ctx.int(1)]).unwrap();
    drop(instance);

    unregister_context(ctx.token());
    rt.run_gc();
    assert!(log.lock().is_empty());
    // The handle could not be released either
    assert_eq!(ctx.handle_count(), handles + 1);

    register_context(&ctx);
    // Context::close still finalizes what the collector could not
    ctx.close();
    assert_eq!(sorted(&log), vec![1]);
}

// ===== Direct Binding Tests =====

#[test]
fn test_direct_binding_finalizes_once() {
    let rt = Runtime::with_options(RuntimeOptions::default().with_binding_mode(BindingMode::Direct));
    let ctx = rt.new_context().unwrap();
    assert_eq!(ctx.binding_mode(), BindingMode::Direct);
    let log = Log::default();
    let class = tracked_class(&ctx, &log);

    let kept = class.constructor.construct(&[ctx.int(1)]).unwrap();
    class.constructor.construct(&[ctx.int(2)]).unwrap();
    rt.run_gc();
    assert_eq!(sorted(&log), vec![2]);

    drop(kept);
    rt.run_gc();
    assert_eq!(sorted(&log), vec![1, 2]);
    rt.run_gc();
    assert_eq!(sorted(&log), vec![1, 2]);
}

#[test]
fn test_direct_binding_survives_missing_context() {
    let rt = Runtime::with_options(RuntimeOptions::default().with_binding_mode(BindingMode::Direct));
    let ctx = rt.new_context().unwrap();
    let log = Log::default();
    let class = tracked_class(&ctx, &log);

    class.constructor.construct(&[ctx.int(3)]).unwrap();
    unregister_context(ctx.token());
    rt.run_gc();
    assert_eq!(sorted(&log), vec![3]);
    register_context(&ctx);
}
