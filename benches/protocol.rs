use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tuplespace::*;

fn bench_parse_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol");
    group.bench_function("parse_many_1k", |b| {
        let mut buf = BytesMut::new();
        for i in 0..1000 {
            let key = format!("key{}", i);
            buf.extend_from_slice(encode_request("PUT", &key, Some("some value")).as_bytes());
        }
        b.iter(|| {
            let mut tmp = buf.clone();
            let mut out = Vec::new();
            protocol::parse_many(&mut tmp, &mut out);
            black_box(out.len());
        });
    });
    group.bench_function("encode_response", |b| {
        let resp = Response::success(OpKind::Read, "key", "some value");
        let mut out = BytesMut::with_capacity(64);
        b.iter(|| {
            out.clear();
            write_response(black_box(&resp), ErrorLength::Fixed, &mut out);
            black_box(out.len());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_parse_many);
criterion_main!(benches);
