//! Redis-backed [`QuotaStore`](crate::QuotaStore).
//!
//! Requires the `redis-tokio` feature. Any Redis-protocol server with Lua
//! scripting works; keys follow the layout documented on the crate root.

mod redis_client;
pub use redis_client::*;

mod redis_quota_store;
pub use redis_quota_store::*;
