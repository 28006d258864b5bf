use std::future::Future;

/// Run `f` on a current-thread runtime whose clock starts paused: sleeps
/// complete instantly and marker TTLs in the memory store elapse with them.
pub(super) fn block_on<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
        .block_on(f)
}

/// Run `f` on a multi-thread runtime, for tests racing tasks against each
/// other.
pub(super) fn block_on_threaded<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_time()
        .build()
        .unwrap()
        .block_on(f)
}

/// Run `f` against the real clock, for tests talking to a live server.
#[cfg(feature = "redis-tokio")]
pub(super) fn block_on_real_time<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::runtime::Runtime::new().unwrap().block_on(f)
}
