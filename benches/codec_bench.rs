use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use tlb_runtime::{compile, Builder, Value};

const SCHEMA: &str = "
    leaf v:#8 = Leaf;
    node$_ n:#5 v:(## n) extra:(Maybe uint8) child:(Maybe ^Cell) = Node;
";

fn sample_cell() -> Arc<tlb_runtime::Cell> {
    let mut inner = Builder::new();
    inner.store_uint(0x2A, 8).unwrap();
    let mut b = Builder::new();
    b.store_uint(7, 5).unwrap();
    b.store_uint(0x55, 7).unwrap();
    b.store_bit(true).unwrap();
    b.store_uint(9, 8).unwrap();
    b.store_bit(true).unwrap();
    b.store_ref(Arc::new(inner.finish())).unwrap();
    Arc::new(b.finish())
}

fn decode_bench(c: &mut Criterion) {
    let rt = compile(SCHEMA).unwrap();
    let cell = sample_cell();
    c.bench_function("decode_node", |bench| {
        bench.iter(|| black_box(rt.decode(black_box(&cell)).unwrap()))
    });
}

fn encode_bench(c: &mut Criterion) {
    let rt = compile(SCHEMA).unwrap();
    let cell = sample_cell();
    let value = rt.decode(&cell).unwrap();
    c.bench_function("encode_node", |bench| {
        bench.iter(|| black_box(rt.encode(black_box(&value)).unwrap()))
    });
}

fn compile_bench(c: &mut Criterion) {
    c.bench_function("compile_schema", |bench| {
        bench.iter(|| black_box(compile(black_box(SCHEMA)).unwrap()))
    });
}

criterion_group! {
    name = codec_benches;
    config = Criterion::default();
    targets = decode_bench, encode_bench, compile_bench
}

criterion_main!(codec_benches);
