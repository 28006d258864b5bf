use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;

use super::{
    runtime::block_on,
    support::{build, config, realm},
};
use crate::{AdmissionDecision, MemoryQuotaStore, QuotaStore, Respectful, RespectfulError};

#[test]
fn admits_up_to_budget_minus_threshold() {
    block_on(async {
        let (rr, _store) = build(2);
        let r = realm("svc");

        rr.register_realm(&r, 5, 1).await.unwrap();

        for _ in 0..3 {
            assert_eq!(
                rr.try_admit(std::slice::from_ref(&r)).await.unwrap(),
                AdmissionDecision::Admitted
            );
        }
        assert_eq!(
            rr.try_admit(std::slice::from_ref(&r)).await.unwrap(),
            AdmissionDecision::Denied {
                realms: vec![r.clone()]
            }
        );
        assert_eq!(rr.occupancy(&r).await.unwrap(), 3);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rr.occupancy(&r).await.unwrap(), 0);
        assert!(
            rr.try_admit(std::slice::from_ref(&r))
                .await
                .unwrap()
                .is_admitted()
        );
    });
}

#[test]
fn threshold_at_or_above_budget_always_denies() {
    block_on(async {
        let (rr, _store) = build(10);
        let equal = realm("equal");
        let below = realm("below");

        rr.register_realm(&equal, 10, 60).await.unwrap();
        rr.register_realm(&below, 3, 60).await.unwrap();

        assert!(
            !rr.try_admit(std::slice::from_ref(&equal))
                .await
                .unwrap()
                .is_admitted()
        );
        assert!(
            !rr.try_admit(std::slice::from_ref(&below))
                .await
                .unwrap()
                .is_admitted()
        );
        assert_eq!(rr.occupancy(&equal).await.unwrap(), 0);
        assert_eq!(rr.occupancy(&below).await.unwrap(), 0);
    });
}

#[test]
fn multi_realm_admission_is_all_or_nothing() {
    block_on(async {
        let (rr, _store) = build(0);
        let a = realm("A");
        let b = realm("B");

        rr.register_realm(&a, 10, 60).await.unwrap();
        rr.register_realm(&b, 1, 60).await.unwrap();

        assert!(rr.try_admit(std::slice::from_ref(&b)).await.unwrap().is_admitted());

        assert_eq!(
            rr.try_admit(&[a.clone(), b.clone()]).await.unwrap(),
            AdmissionDecision::Denied {
                realms: vec![b.clone()]
            }
        );
        assert_eq!(rr.occupancy(&a).await.unwrap(), 0);
        assert_eq!(rr.occupancy(&b).await.unwrap(), 1);
    });
}

#[test]
fn denial_lists_every_full_realm_in_request_order() {
    block_on(async {
        let (rr, _store) = build(0);
        let names = [realm("x"), realm("y"), realm("z")];

        rr.register_realm(&names[0], 0, 60).await.unwrap();
        rr.register_realm(&names[1], 5, 60).await.unwrap();
        rr.register_realm(&names[2], 0, 60).await.unwrap();

        assert_eq!(
            rr.try_admit(&[names[2].clone(), names[1].clone(), names[0].clone()])
                .await
                .unwrap(),
            AdmissionDecision::Denied {
                realms: vec![names[2].clone(), names[0].clone()]
            }
        );
    });
}

#[test]
fn successful_multi_realm_admission_stamps_each_realm() {
    block_on(async {
        let (rr, _store) = build(0);
        let a = realm("A");
        let b = realm("B");

        rr.register_realm(&a, 10, 60).await.unwrap();
        rr.register_realm(&b, 10, 5).await.unwrap();

        assert!(rr.try_admit(&[a.clone(), b.clone()]).await.unwrap().is_admitted());
        assert_eq!(rr.occupancy(&a).await.unwrap(), 1);
        assert_eq!(rr.occupancy(&b).await.unwrap(), 1);

        // Each marker lives for its own realm's timespan.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rr.occupancy(&a).await.unwrap(), 1);
        assert_eq!(rr.occupancy(&b).await.unwrap(), 0);
    });
}

#[test]
fn unknown_realm_fails_without_side_effects() {
    block_on(async {
        let (rr, _store) = build(0);
        let a = realm("A");
        let ghost = realm("ghost");

        rr.register_realm(&a, 10, 60).await.unwrap();

        assert!(matches!(
            rr.try_admit(&[a.clone(), ghost.clone()]).await,
            Err(RespectfulError::UnknownRealm(name)) if name == ghost
        ));
        assert_eq!(rr.occupancy(&a).await.unwrap(), 0);
    });
}

#[test]
fn empty_realm_list_is_rejected() {
    block_on(async {
        let (rr, _store) = build(0);

        assert!(matches!(rr.try_admit(&[]).await, Err(RespectfulError::NoRealms)));
    });
}

#[test]
fn duplicate_realms_count_once() {
    block_on(async {
        let (rr, _store) = build(0);
        let r = realm("svc");

        rr.register_realm(&r, 1, 60).await.unwrap();

        assert!(
            rr.try_admit(&[r.clone(), r.clone(), r.clone()])
                .await
                .unwrap()
                .is_admitted()
        );
        assert_eq!(rr.occupancy(&r).await.unwrap(), 1);
    });
}

#[test]
fn marker_value_is_its_token() {
    block_on(async {
        let (rr, store) = build(0);
        let r = realm("svc");

        rr.register_realm(&r, 10, 60).await.unwrap();
        rr.try_admit(std::slice::from_ref(&r)).await.unwrap();

        let keys = store
            .scan_prefix("RespectfulRequester:REQUEST:svc:")
            .await
            .unwrap();
        assert_eq!(keys.len(), 1);

        let token = keys[0]
            .strip_prefix("RespectfulRequester:REQUEST:svc:")
            .unwrap();
        assert!(uuid::Uuid::try_parse(token).is_ok());
        assert_eq!(store.get(&keys[0]).as_deref(), Some(token));
    });
}

#[test]
fn separate_prefixes_do_not_share_quota() {
    block_on(async {
        let store = MemoryQuotaStore::new();
        let mut other = config(0);
        other.key_prefix = "other".to_string();

        let first = Respectful::with_store(Arc::new(store.clone()), config(0)).unwrap();
        let second = Respectful::with_store(Arc::new(store.clone()), other).unwrap();
        let r = realm("svc");

        first.register_realm(&r, 1, 60).await.unwrap();
        second.register_realm(&r, 1, 60).await.unwrap();

        assert!(first.try_admit(std::slice::from_ref(&r)).await.unwrap().is_admitted());
        assert!(second.try_admit(std::slice::from_ref(&r)).await.unwrap().is_admitted());
        assert!(!first.try_admit(std::slice::from_ref(&r)).await.unwrap().is_admitted());
    });
}

#[test]
fn instances_sharing_a_store_share_quota() {
    block_on(async {
        let store = MemoryQuotaStore::new();
        let first = Respectful::with_store(Arc::new(store.clone()), config(0)).unwrap();
        let second = Respectful::with_store(Arc::new(store.clone()), config(0)).unwrap();
        let r = realm("svc");

        first.register_realm(&r, 2, 60).await.unwrap();

        assert!(first.try_admit(std::slice::from_ref(&r)).await.unwrap().is_admitted());
        assert!(second.try_admit(std::slice::from_ref(&r)).await.unwrap().is_admitted());
        assert!(!first.try_admit(std::slice::from_ref(&r)).await.unwrap().is_admitted());
        assert_eq!(second.occupancy(&r).await.unwrap(), 2);
    });
}

/// Memory store that refuses to write markers containing `poisoned`.
struct FlakyStore {
    inner: MemoryQuotaStore,
    poisoned: &'static str,
}

#[async_trait]
impl QuotaStore for FlakyStore {
    async fn ping(&self) -> Result<(), RespectfulError> {
        self.inner.ping().await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), RespectfulError> {
        if key.contains(self.poisoned) {
            return Err(RespectfulError::Backend("connection reset".to_string()));
        }
        self.inner.set_with_expiry(key, value, ttl_secs).await
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool, RespectfulError> {
        self.inner.hash_field_exists(key, field).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RespectfulError> {
        self.inner.hash_get_all(key).await
    }

    async fn set_fields_if_absent(
        &self,
        key: &str,
        guard_field: &str,
        fields: &[(&str, String)],
        set_key: &str,
        member: &str,
    ) -> Result<bool, RespectfulError> {
        self.inner
            .set_fields_if_absent(key, guard_field, fields, set_key, member)
            .await
    }

    async fn set_fields_if_present(
        &self,
        key: &str,
        guard_field: &str,
        fields: &[(&str, String)],
    ) -> Result<bool, RespectfulError> {
        self.inner.set_fields_if_present(key, guard_field, fields).await
    }

    async fn delete_with_member(
        &self,
        key: &str,
        set_key: &str,
        member: &str,
    ) -> Result<(), RespectfulError> {
        self.inner.delete_with_member(key, set_key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, RespectfulError> {
        self.inner.set_members(key).await
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), RespectfulError> {
        self.inner.delete_keys(keys).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, RespectfulError> {
        self.inner.scan_prefix(prefix).await
    }
}

#[test]
fn interrupted_stamping_rolls_back_written_markers() {
    block_on(async {
        let inner = MemoryQuotaStore::new();
        let store = FlakyStore {
            inner: inner.clone(),
            poisoned: ":REQUEST:B:",
        };
        let rr = Respectful::with_store(Arc::new(store), config(0)).unwrap();
        let a = realm("A");
        let b = realm("B");

        rr.register_realm(&a, 10, 60).await.unwrap();
        rr.register_realm(&b, 10, 60).await.unwrap();

        assert!(matches!(
            rr.try_admit(&[a.clone(), b.clone()]).await,
            Err(RespectfulError::Backend(_))
        ));
        assert_eq!(rr.occupancy(&a).await.unwrap(), 0);
        assert!(
            inner
                .scan_prefix("RespectfulRequester:REQUEST:")
                .await
                .unwrap()
                .is_empty()
        );
    });
}
