use std::time::Duration;

use crate::RealmName;

/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum RespectfulError {
    /// The quota store could not be reached when connecting.
    #[error("quota store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid configuration shape, type or range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation referenced a realm that was never registered.
    #[error("realm '{0}' hasn't been registered")]
    UnknownRealm(RealmName),

    /// Admission was denied and the caller asked not to wait.
    #[error("currently rate-limited on realm(s): {}", join_realms(.realms))]
    RateLimited {
        /// Realms that were over budget.
        realms: Vec<RealmName>,
    },

    /// A bounded wait ran out before admission was granted.
    #[error("gave up waiting for realm(s) {} after {waited:?}", join_realms(.realms))]
    WaitTimedOut {
        /// Realms that were still over budget on the last attempt.
        realms: Vec<RealmName>,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// Admission was requested for an empty realm list.
    #[error("at least one realm is required")]
    NoRealms,

    /// Realm name failed validation.
    #[error("invalid realm name: {0}")]
    InvalidRealmName(String),

    /// Timespan failed validation.
    #[error("invalid timespan: {0}")]
    InvalidTimespan(String),

    /// Key prefix failed validation.
    #[error("invalid key prefix: {0}")]
    InvalidKeyPrefix(String),

    /// A stored realm entry has a field that cannot be parsed.
    #[error("realm '{realm}' has a corrupt '{field}' entry")]
    CorruptRealmEntry {
        /// Realm whose entry is corrupt.
        realm: RealmName,
        /// Offending field.
        field: &'static str,
    },

    /// Redis error.
    #[cfg(feature = "redis-tokio")]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Error reported by a custom [`QuotaStore`](crate::QuotaStore) implementation.
    #[error("store backend error: {0}")]
    Backend(String),
}

fn join_realms(realms: &[RealmName]) -> String {
    realms
        .iter()
        .map(|realm| &**realm)
        .collect::<Vec<_>>()
        .join(", ")
}
