//! Throughput of the ring queue and pool hot paths

use cef_mem::{MemoryPool, PoolId, RingQueue};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_ring_queue(c: &mut Criterion) {
    c.bench_function("ring_queue_put_get", |b| {
        let mut queue: RingQueue<u16, 16> = RingQueue::new();
        b.iter(|| {
            for value in 0..16u16 {
                let _ = queue.put(black_box(value));
            }
            while let Some(value) = queue.get() {
                black_box(value);
            }
        });
    });

    c.bench_function("ring_queue_remove_middle", |b| {
        b.iter(|| {
            let mut queue: RingQueue<u16, 16> = RingQueue::new();
            for value in 0..16u16 {
                let _ = queue.put(value);
            }
            black_box(queue.remove(&black_box(8)));
        });
    });
}

fn bench_pool(c: &mut Criterion) {
    c.bench_function("pool_allocate_free", |b| {
        let mut pool: MemoryPool<[u8; 64], 8> = MemoryPool::new(PoolId(0));
        b.iter(|| {
            if let Some(handle) = pool.allocate(64, black_box([0u8; 64])) {
                let _ = black_box(pool.free(handle));
            }
        });
    });
}

criterion_group!(benches, bench_ring_queue, bench_pool);
criterion_main!(benches);
