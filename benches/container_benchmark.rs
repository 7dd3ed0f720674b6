// SPDX-License-Identifier: MIT
//! Benchmark for packing and unpacking composite containers.

use blockpack::{CompositeContainer, Container, BLOCK_SIZE_BYTE};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn make_child(bytes: usize) -> Container {
    let mut child = Container::new();
    child.allocate(bytes, BLOCK_SIZE_BYTE).unwrap();
    child.write_payload(&vec![0xAB; bytes]).unwrap();
    child
}

fn benchmark_pack(c: &mut Criterion) {
    let children: Vec<Container> = (0..16).map(|_| make_child(1024)).collect();

    c.bench_function("composite_pack", |b| {
        b.iter(|| {
            let mut composite = CompositeContainer::new();
            composite
                .allocate_with_capacity(32 * 1024, 32, BLOCK_SIZE_BYTE)
                .unwrap();
            for child in &children {
                composite.add(black_box(child)).unwrap();
            }
            black_box(composite.size());
        })
    });
}

fn benchmark_unpack(c: &mut Criterion) {
    let mut composite = CompositeContainer::new();
    composite
        .allocate_with_capacity(32 * 1024, 32, BLOCK_SIZE_BYTE)
        .unwrap();
    for _ in 0..16 {
        composite.add(&make_child(1024)).unwrap();
    }

    c.bench_function("composite_get", |b| {
        b.iter(|| {
            for index in 0..16 {
                let view = composite.get(black_box(index)).unwrap();
                black_box(view.payload().unwrap().len());
            }
        })
    });
}

criterion_group!(benches, benchmark_pack, benchmark_unpack);
criterion_main!(benches);
