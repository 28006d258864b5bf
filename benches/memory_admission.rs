use std::{hint::black_box, sync::Arc};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use respectful::{MemoryQuotaStore, RealmName, Respectful, RespectfulConfig};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn respectful() -> Respectful {
    let config = RespectfulConfig {
        safety_threshold: 0,
        ..RespectfulConfig::default()
    };

    Respectful::with_store(Arc::new(MemoryQuotaStore::new()), config).unwrap()
}

fn realm(name: &str) -> RealmName {
    RealmName::try_from(name).unwrap()
}

fn bench_occupancy(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory/occupancy");
    group.sample_size(50);

    let rt = runtime();

    for markers in [100_usize, 1_000, 10_000] {
        let rr = respectful();
        let r = realm("svc");

        rt.block_on(async {
            rr.register_realm(&r, u64::MAX, 3600).await.unwrap();
            for _ in 0..markers {
                rr.try_admit(std::slice::from_ref(&r)).await.unwrap();
            }
        });

        group.bench_function(format!("count/markers={markers}"), |b| {
            b.iter(|| rt.block_on(async { black_box(rr.occupancy(black_box(&r)).await) }));
        });
    }

    group.finish();
}

fn bench_try_admit(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory/try_admit");
    group.sample_size(100);

    let rt = runtime();

    group.bench_function("admitted/fresh_realm", |b| {
        b.iter_batched(
            || {
                let rr = respectful();
                rt.block_on(async {
                    rr.register_realm(&realm("svc"), 100, 60).await.unwrap();
                });
                rr
            },
            |rr| {
                rt.block_on(async {
                    black_box(rr.try_admit(&[realm("svc")]).await)
                })
            },
            BatchSize::SmallInput,
        );
    });

    let rr = respectful();
    let full = realm("full");
    rt.block_on(async {
        rr.register_realm(&full, 100, 3600).await.unwrap();
        for _ in 0..100 {
            rr.try_admit(std::slice::from_ref(&full)).await.unwrap();
        }
    });

    group.bench_function("denied/full_realm", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(rr.try_admit(black_box(std::slice::from_ref(&full))).await) })
        });
    });

    let realms: Vec<RealmName> = (0..5).map(|i| realm(&format!("multi_{i}"))).collect();
    group.bench_function("admitted/five_realms", |b| {
        b.iter_batched(
            || {
                let rr = respectful();
                rt.block_on(async {
                    for r in &realms {
                        rr.register_realm(r, 100, 60).await.unwrap();
                    }
                });
                rr
            },
            |rr| rt.block_on(async { black_box(rr.try_admit(&realms).await) }),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_occupancy, bench_try_admit);
criterion_main!(benches);
