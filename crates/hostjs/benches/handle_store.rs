use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hostjs::{ClassBuilder, Context, HandleStore, HostObject, Runtime, RuntimeOptions, Value};
use std::sync::Arc;

fn bench_store_load_delete(c: &mut Criterion) {
    let store = HandleStore::new();

    c.bench_function("handle_store_cycle", |b| {
        b.iter(|| {
            let id = store.store(black_box(42u64));
            let value = store.load(id);
            store.delete(id);
            value
        });
    });
}

fn bench_concurrent_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_store_threads");

    for threads in [1usize, 2, 4, 8] {
        group.throughput(Throughput::Elements((threads * 1000) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let store = Arc::new(HandleStore::new());
                std::thread::scope(|scope| {
                    for _ in 0..threads {
                        let store = Arc::clone(&store);
                        scope.spawn(move || {
                            for i in 0..1000u64 {
                                let id = store.store(i);
                                store.delete(id);
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

struct Point {
    x: f64,
    y: f64,
}

impl HostObject for Point {}

fn bench_method_dispatch(c: &mut Criterion) {
    let rt = Runtime::with_options(RuntimeOptions::default().with_gc_threshold(10_000));
    let ctx = rt.new_context().unwrap();
    let point = ClassBuilder::new("Point")
        .constructor(|_ctx: &Context, _this: &Value, args: &[Value]| {
            Ok(Point {
                x: args[0].to_f64()?,
                y: args[1].to_f64()?,
            })
        })
        .method("norm", |_ctx: &Context, this: &Value, _args: &[Value]| {
            this.with_bound(|p: &mut Point| (p.x * p.x + p.y * p.y).sqrt())
        })
        .build(&ctx)
        .unwrap();
    let p = point.constructor.construct(&[ctx.int(3), ctx.int(4)]).unwrap();

    c.bench_function("method_dispatch", |b| {
        b.iter(|| p.call_method(black_box("norm"), &[]).unwrap());
    });

    c.bench_function("construct_instance", |b| {
        b.iter(|| point.constructor.construct(&[ctx.int(1), ctx.int(2)]).unwrap());
    });
}

criterion_group!(benches, bench_store_load_delete, bench_concurrent_store, bench_method_dispatch);
criterion_main!(benches);
