//! Capability interface over the shared quota store.
//!
//! Every admission decision is recomputed from the store; nothing in this crate
//! keeps authoritative state in-process. Any backend offering per-key expiry,
//! hashes, sets and a prefix scan can implement [`QuotaStore`].
//!
//! Each method must be individually atomic. Only the realm entry methods
//! (`set_fields_if_absent`, `delete_with_member`) span two keys; nothing spans
//! a whole admission decision.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use crate::RespectfulError;

mod memory_quota_store;
pub use memory_quota_store::*;

/// Operations the admission layer needs from a shared store.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Liveness check, used once when connecting.
    async fn ping(&self) -> Result<(), RespectfulError>;

    /// Write `key = value` expiring after `ttl_secs` seconds.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), RespectfulError>;

    /// Whether hash `key` has `field`.
    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool, RespectfulError>;

    /// All fields of hash `key`; empty when the key does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RespectfulError>;

    /// Write every `fields` entry into hash `key` and add `member` to set
    /// `set_key`, unless the hash already has `guard_field`. One atomic step:
    /// the membership and the hash never disagree. Returns whether anything was
    /// written.
    async fn set_fields_if_absent(
        &self,
        key: &str,
        guard_field: &str,
        fields: &[(&str, String)],
        set_key: &str,
        member: &str,
    ) -> Result<bool, RespectfulError>;

    /// Write every `fields` entry into hash `key` only if it already has
    /// `guard_field`, as one atomic step. Returns whether anything was written.
    async fn set_fields_if_present(
        &self,
        key: &str,
        guard_field: &str,
        fields: &[(&str, String)],
    ) -> Result<bool, RespectfulError>;

    /// Remove `member` from set `set_key` and delete `key`, as one atomic step.
    async fn delete_with_member(
        &self,
        key: &str,
        set_key: &str,
        member: &str,
    ) -> Result<(), RespectfulError>;

    /// Members of set `key`.
    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, RespectfulError>;

    /// Delete `keys`, ignoring the ones that do not exist.
    async fn delete_keys(&self, keys: &[String]) -> Result<(), RespectfulError>;

    /// Live keys starting with `prefix`.
    ///
    /// This walks the keyspace: cost is proportional to the number of keys in
    /// the store, not to the number of matches. The result may contain
    /// duplicates.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, RespectfulError>;
}
