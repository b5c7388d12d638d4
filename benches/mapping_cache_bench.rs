//! # 映射缓存性能基准测试
//!
//! 测试命中路径、读穿透回填以及并发查询

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use prx_gateway::cache::MappingCache;
use prx_gateway::config::TenantIdentity;
use prx_gateway::store::{ClusterStore, MemoryStore};

fn tenant() -> Arc<TenantIdentity> {
    Arc::new(TenantIdentity::new("bench", "bench", "secret"))
}

/// 创建预置 `entries` 条映射的缓存
fn create_cache(entries: usize) -> MappingCache {
    let tenant = tenant();
    let store = Arc::new(MemoryStore::new("prx"));
    for i in 0..entries {
        store.seed_mapping(&tenant, &format!("host-{i}.example.com"), &format!("http://svc-{i}:8080"));
    }
    MappingCache::new(store as Arc<dyn ClusterStore>, tenant)
}

/// 缓存命中
fn bench_lookup_hit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("mapping_lookup_hit");

    for entries in [10, 1_000, 10_000] {
        let cache = create_cache(entries);
        rt.block_on(cache.lookup_all()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(entries), &entries, |b, &entries| {
            let host = format!("host-{}.example.com", entries / 2);
            b.to_async(&rt)
                .iter(|| async { black_box(cache.lookup(black_box(&host)).await.unwrap()) });
        });
    }
    group.finish();
}

/// 未命中后从存储读取并回填
fn bench_lookup_miss(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = create_cache(1_000);

    c.bench_function("mapping_lookup_read_through", |b| {
        b.to_async(&rt).iter(|| async {
            cache.clear();
            black_box(cache.lookup("host-500.example.com").await.unwrap())
        });
    });
}

/// 多任务并发查询
fn bench_concurrent_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = Arc::new(create_cache(1_000));
    rt.block_on(cache.lookup_all()).unwrap();

    c.bench_function("mapping_lookup_concurrent_16", |b| {
        b.to_async(&rt).iter(|| {
            let cache = Arc::clone(&cache);
            async move {
                let handles: Vec<_> = (0..16)
                    .map(|i| {
                        let cache = Arc::clone(&cache);
                        tokio::spawn(async move {
                            cache.lookup(&format!("host-{}.example.com", i * 50)).await
                        })
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.await.unwrap().unwrap());
                }
            }
        });
    });
}

criterion_group!(benches, bench_lookup_hit, bench_lookup_miss, bench_concurrent_lookup);
criterion_main!(benches);
