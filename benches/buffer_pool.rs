//! Buffer pool hit/miss throughput and B+ tree range scan benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbcore::common::PageId;
use dbcore::index::{IndexManager, IndexValue};
use dbcore::BufferPoolManager;
use std::cell::RefCell;
use std::rc::Rc;
use tempfile::TempDir;

fn bench_buffer_pool_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool_get_page");
    for capacity in [16usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("resident_pages", capacity), &capacity, |b, &capacity| {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("bench.db");
            let mut bpm = BufferPoolManager::with_capacity(capacity);
            bpm.create_file(&path).unwrap();
            let handle = bpm.open_file(&path).unwrap();
            for p in 0..capacity {
                bpm.get_page(handle, PageId::new(p as i32)).unwrap();
            }
            b.iter(|| {
                for p in 0..capacity {
                    black_box(bpm.get_page(handle, PageId::new(p as i32)).unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_buffer_pool_eviction_churn(c: &mut Criterion) {
    c.bench_function("buffer_pool_eviction_churn", |b| {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench.db");
        let mut bpm = BufferPoolManager::with_capacity(8);
        bpm.create_file(&path).unwrap();
        let handle = bpm.open_file(&path).unwrap();
        b.iter(|| {
            for p in 0..64 {
                black_box(bpm.get_page(handle, PageId::new(p)).unwrap());
            }
        });
    });
}

fn bench_index_range_scan(c: &mut Criterion) {
    c.bench_function("index_range_scan_1000", |b| {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench.idx");
        let bpm = Rc::new(RefCell::new(BufferPoolManager::with_capacity(512)));
        let mut index = IndexManager::new(bpm);
        index.initialize(&path, 1).unwrap();
        for i in 0..1000 {
            index.insert(&path, IndexValue::new(PageId::new(i / 100), (i % 100) as u32, vec![i])).unwrap();
        }
        b.iter(|| {
            black_box(index.range_search(&path, &[200], &[700]).unwrap());
        });
    });
}

criterion_group!(benches, bench_buffer_pool_hits, bench_buffer_pool_eviction_churn, bench_index_range_scan);
criterion_main!(benches);
