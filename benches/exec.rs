use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tuplespace::*;

fn bench_exec_put_read_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("exec");
    group.bench_function("put_read_get", |b| {
        b.iter_batched(
            TupleSpace::new,
            |space| {
                for i in 0..1000u32 {
                    let k = format!("k{}", i);
                    let v = format!("v{}", i);
                    black_box(space.exec(Request::Insert(k.as_str().into(), v)));
                    black_box(space.exec(Request::Read(k.as_str().into())));
                    black_box(space.exec(Request::Remove(k.into())));
                }
                black_box(space)
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_exec_put_read_get);
criterion_main!(benches);
