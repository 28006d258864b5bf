use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing_subscriber::EnvFilter;

use respectful::{
    AdmissionDecision, MemoryQuotaStore, RealmName, Respectful, RespectfulConfig,
    RespectfulError, WaitPolicy,
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Provider {
    Memory,
    Redis,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Operation {
    /// Single admission attempts, no waiting.
    TryAdmit,
    /// Dispatch a no-op call, polling until admitted or `--max-wait-ms`.
    Dispatch,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RealmDist {
    Hot,
    Uniform,
    Skewed,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    Max,
    TargetQps,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "respectful-stress",
    about = "Load test harness for respectful admission control"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Provider::Memory)]
    provider: Provider,

    #[arg(long, value_enum, default_value_t = Operation::TryAdmit)]
    operation: Operation,

    #[arg(long, value_enum, default_value_t = RealmDist::Hot)]
    realm_dist: RealmDist,

    #[arg(long, value_enum, default_value_t = Mode::Max)]
    mode: Mode,

    /// Concurrent tasks issuing requests.
    #[arg(long, default_value_t = 8)]
    tasks: usize,

    #[arg(long, default_value_t = 30)]
    duration_s: u64,

    #[arg(long, default_value_t = 16)]
    realm_count: usize,

    #[arg(long, default_value_t = 0.8)]
    hot_fraction: f64,

    #[arg(long, default_value_t = 100)]
    max_requests: u64,

    #[arg(long, default_value_t = 10)]
    timespan_s: u64,

    #[arg(long, default_value_t = 0)]
    safety_threshold: u64,

    #[arg(long, default_value_t = 50)]
    poll_interval_ms: u64,

    #[arg(long, default_value_t = 2_000)]
    max_wait_ms: u64,

    #[arg(long, default_value_t = 1)]
    sample_every: u64,

    #[arg(long)]
    target_qps: Option<u64>,

    #[arg(long, default_value = "127.0.0.1")]
    redis_host: String,

    #[arg(long, default_value_t = 16379)]
    redis_port: u16,

    #[arg(long, default_value_t = 4)]
    redis_connections: usize,

    #[arg(long, default_value = "stress")]
    key_prefix: String,
}

#[derive(Default)]
struct Counts {
    admitted: AtomicU64,
    denied: AtomicU64,
    timed_out: AtomicU64,
    errors: AtomicU64,
    peak_occupancy: AtomicU64,
}

fn build_realms(args: &Args) -> Vec<RealmName> {
    let n = match args.realm_dist {
        RealmDist::Hot => 1,
        _ => args.realm_count.max(1),
    };
    (0..n)
        .map(|i| RealmName::try_from(format!("realm_{i}")).unwrap())
        .collect()
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn pick_realm(args: &Args, realms: &[RealmName], rng: &mut impl FnMut() -> u64) -> usize {
    match args.realm_dist {
        RealmDist::Hot => 0,
        RealmDist::Uniform => (rng() as usize) % realms.len(),
        RealmDist::Skewed => {
            let r = (rng() % 10_000) as f64 / 10_000.0;
            if r < args.hot_fraction {
                0
            } else {
                let tail = realms.len().saturating_sub(1).max(1);
                (1 + (rng() as usize) % tail) % realms.len()
            }
        }
    }
}

fn print_results(args: &Args, elapsed: Duration, ops: u64, hist: &Histogram<u64>, counts: &Counts) {
    println!(
        "provider={:?} operation={:?} mode={:?}",
        args.provider, args.operation, args.mode
    );
    println!(
        "tasks={} duration_s={} realm_dist={:?} realms={} max_requests={} timespan_s={} safety_threshold={}",
        args.tasks,
        args.duration_s,
        args.realm_dist,
        args.realm_count,
        args.max_requests,
        args.timespan_s,
        args.safety_threshold
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64()
    );
    println!(
        "admitted={} denied={} timed_out={} errors={}",
        counts.admitted.load(Ordering::Relaxed),
        counts.denied.load(Ordering::Relaxed),
        counts.timed_out.load(Ordering::Relaxed),
        counts.errors.load(Ordering::Relaxed)
    );
    println!(
        "hot_realm peak_occupancy={} budget={}",
        counts.peak_occupancy.load(Ordering::Relaxed),
        args.max_requests.saturating_sub(args.safety_threshold)
    );
    if !hist.is_empty() {
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

fn config(args: &Args) -> RespectfulConfig {
    let mut config = RespectfulConfig {
        key_prefix: args.key_prefix.clone(),
        safety_threshold: args.safety_threshold,
        poll_interval_ms: args.poll_interval_ms,
        max_wait_ms: Some(args.max_wait_ms),
        connection_count: args.redis_connections,
        ..RespectfulConfig::default()
    };
    config.redis.host = args.redis_host.clone();
    config.redis.port = args.redis_port;

    config
}

#[cfg(feature = "redis-tokio")]
async fn connect_redis(config: RespectfulConfig) -> Result<Respectful, RespectfulError> {
    Respectful::connect(config).await
}

#[cfg(not(feature = "redis-tokio"))]
async fn connect_redis(_: RespectfulConfig) -> Result<Respectful, RespectfulError> {
    eprintln!("redis provider requires: cargo run -p respectful-stress --features redis-tokio -- ...");
    std::process::exit(2);
}

async fn run(args: Args) -> Result<(), RespectfulError> {
    let config = config(&args);
    let rr = match args.provider {
        Provider::Memory => Respectful::with_store(Arc::new(MemoryQuotaStore::new()), config)?,
        Provider::Redis => connect_redis(config).await?,
    };
    let rr = Arc::new(rr);

    let realms = build_realms(&args);
    for realm in &realms {
        rr.unregister_realm(realm).await?;
        rr.register_realm(realm, args.max_requests, args.timespan_s).await?;
    }
    tracing::info!(realms = realms.len(), "realms registered");

    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());
    let total_ops = Arc::new(AtomicU64::new(0));

    let started = Instant::now();
    let per_task_qps = args
        .target_qps
        .filter(|_| args.mode == Mode::TargetQps)
        .map(|qps| (qps / args.tasks.max(1) as u64).max(1));

    let sampler = {
        let rr = Arc::clone(&rr);
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let hot = realms[0].clone();

        tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                match rr.occupancy(&hot).await {
                    Ok(n) => {
                        counts.peak_occupancy.fetch_max(n, Ordering::Relaxed);
                    }
                    Err(err) => tracing::warn!(error = %err, "occupancy sample failed"),
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
    };

    let mut join = Vec::with_capacity(args.tasks);
    for t in 0..args.tasks {
        let rr = Arc::clone(&rr);
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let total_ops = Arc::clone(&total_ops);
        let args = args.clone();
        let realms = realms.clone();

        join.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0x9E37_79B9_7F4A_7C15;
            let mut next_deadline = Instant::now();

            let mut rng_u64 = || {
                // xorshift64*
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while !stop.load(Ordering::Relaxed) {
                if let Some(qps) = per_task_qps {
                    let now = Instant::now();
                    if now < next_deadline {
                        tokio::time::sleep(next_deadline - now).await;
                    }
                    next_deadline += Duration::from_nanos(1_000_000_000 / qps);
                }

                i = i.wrapping_add(1);
                let realm = &realms[pick_realm(&args, &realms, &mut rng_u64)];
                let t0 = should_sample(i, args.sample_every).then(Instant::now);

                let outcome = match args.operation {
                    Operation::TryAdmit => rr.try_admit(std::slice::from_ref(realm)).await,
                    Operation::Dispatch => rr
                        .dispatch_with(
                            || async {},
                            std::slice::from_ref(realm),
                            WaitPolicy::Wait {
                                poll_interval: Duration::from_millis(args.poll_interval_ms),
                                max_wait: Some(Duration::from_millis(args.max_wait_ms)),
                            },
                        )
                        .await
                        .map(|()| AdmissionDecision::Admitted),
                };

                if let Some(t0) = t0 {
                    let us = t0.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }

                total_ops.fetch_add(1, Ordering::Relaxed);
                match outcome {
                    Ok(AdmissionDecision::Admitted) => {
                        counts.admitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(AdmissionDecision::Denied { .. }) => {
                        counts.denied.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(RespectfulError::WaitTimedOut { .. }) => {
                        counts.timed_out.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "request failed");
                        counts.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            hist
        }));
    }

    tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
    stop.store(true, Ordering::Relaxed);

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for j in join {
        let hist = j.await.unwrap();
        merged.add(&hist).unwrap();
    }
    let _ = sampler.await;

    let elapsed = started.elapsed();
    let ops = total_ops.load(Ordering::Relaxed);
    print_results(&args, elapsed, ops, &merged, &counts);

    for realm in &realms {
        rr.unregister_realm(realm).await?;
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.tasks.clamp(2, 16))
        .build()
        .unwrap();

    if let Err(err) = rt.block_on(run(args)) {
        eprintln!("stress run failed: {err}");
        std::process::exit(1);
    }
}
