//! Basic benchmarks for the `slot_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use slot_pool::{SharedHandle, SlotAllocator, SlotPool};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;
const CAPACITY: usize = 1024;
const ITEM_SIZE: usize = size_of::<TestItem>();

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("slot_basic");

    let allocs_op = allocs.operation("build");
    group.bench_function("build", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(SlotPool::new(CAPACITY, ITEM_SIZE)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("allocate_deallocate_empty");
    group.bench_function("allocate_deallocate_empty", |b| {
        b.iter_custom(|iters| {
            let pool = SlotPool::new(CAPACITY, ITEM_SIZE);
            let allocator = SlotAllocator::<TestItem>::new(&pool).unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let ptr = allocator.allocate(ITEM_SIZE).unwrap();
                allocator.deallocate(black_box(ptr), ITEM_SIZE).unwrap();
            }

            start.elapsed()
        });
    });

    // Allocation scans for the first available slot, so a nearly full pool is the worst case.
    let allocs_op = allocs.operation("allocate_deallocate_nearly_full");
    group.bench_function("allocate_deallocate_nearly_full", |b| {
        b.iter_custom(|iters| {
            let pool = SlotPool::new(CAPACITY, ITEM_SIZE);
            let allocator = SlotAllocator::<TestItem>::new(&pool).unwrap();

            let filler = (1..CAPACITY)
                .map(|_| allocator.allocate(ITEM_SIZE).unwrap())
                .collect::<Vec<_>>();

            let span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let ptr = allocator.allocate(ITEM_SIZE).unwrap();
                allocator.deallocate(black_box(ptr), ITEM_SIZE).unwrap();
            }

            let elapsed = start.elapsed();

            drop(span);

            for ptr in filler {
                allocator.deallocate(ptr, ITEM_SIZE).unwrap();
            }

            elapsed
        });
    });

    group.finish();

    let mut group = c.benchmark_group("slot_shared");

    // The payload comes from the pool but the control block comes from the heap.
    let allocs_op = allocs.operation("new_in_pool");
    group.bench_function("new_in_pool", |b| {
        b.iter_custom(|iters| {
            let pool = SlotPool::new(CAPACITY, ITEM_SIZE);
            let allocator = SlotAllocator::<TestItem>::new(&pool).unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(
                    SharedHandle::new_in(black_box(TEST_VALUE), allocator).unwrap(),
                ));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("new_on_heap");
    group.bench_function("new_on_heap", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(SharedHandle::new(black_box(TEST_VALUE)).unwrap()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("clone_drop");
    group.bench_function("clone_drop", |b| {
        b.iter_custom(|iters| {
            let pool = SlotPool::new(CAPACITY, ITEM_SIZE);
            let allocator = SlotAllocator::<TestItem>::new(&pool).unwrap();
            let handle = SharedHandle::new_in(TEST_VALUE, allocator).unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(handle.clone()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("read");
    group.bench_function("read", |b| {
        b.iter_custom(|iters| {
            let handle = SharedHandle::new(TEST_VALUE).unwrap();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(*black_box(&handle).value().unwrap());
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
