use std::sync::Arc;

use crate::{MemoryQuotaStore, RealmName, Respectful, RespectfulConfig};

pub(super) fn realm(name: &str) -> RealmName {
    RealmName::try_from(name).unwrap()
}

pub(super) fn config(safety_threshold: u64) -> RespectfulConfig {
    RespectfulConfig {
        safety_threshold,
        ..RespectfulConfig::default()
    }
}

pub(super) fn build(safety_threshold: u64) -> (Respectful, MemoryQuotaStore) {
    build_with(config(safety_threshold))
}

pub(super) fn build_with(config: RespectfulConfig) -> (Respectful, MemoryQuotaStore) {
    let store = MemoryQuotaStore::new();
    let rr = Respectful::with_store(Arc::new(store.clone()), config).unwrap();

    (rr, store)
}
