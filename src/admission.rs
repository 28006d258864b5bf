use std::sync::Arc;

use uuid::Uuid;

use crate::{
    AdmissionDecision, OccupancyCounter, QuotaStore, RealmLimits, RealmName, RealmRegistry,
    RespectfulError, keys::KeyGenerator,
};

/// All-or-nothing admission across a set of realms.
///
/// # Algorithm
///
/// 1. **Lookup:** fetch every realm's limits; an unknown realm fails the whole
///    call before anything is written
/// 2. **Check:** a realm is available when
///    `occupancy < max_requests - safety_threshold`
/// 3. **Stamp:** only if every realm is available, write one marker per realm
///    with TTL = that realm's timespan
///
/// # Consistency
///
/// - The check and the stamp are separate store operations, so concurrent
///   admitters can all pass the check and overshoot a budget by up to the
///   number of racers. `safety_threshold` is the headroom reserved for that.
/// - If a store error interrupts stamping, markers already written by the call
///   are deleted before the error is returned. A crash in the same spot leaves
///   them in place until they expire.
pub struct AdmissionController {
    store: Arc<dyn QuotaStore>,
    keys: Arc<KeyGenerator>,
    registry: Arc<RealmRegistry>,
    occupancy: Arc<OccupancyCounter>,
    safety_threshold: u64,
}

impl AdmissionController {
    pub(crate) fn new(
        store: Arc<dyn QuotaStore>,
        keys: Arc<KeyGenerator>,
        registry: Arc<RealmRegistry>,
        occupancy: Arc<OccupancyCounter>,
        safety_threshold: u64,
    ) -> Self {
        Self {
            store,
            keys,
            registry,
            occupancy,
            safety_threshold,
        }
    }

    /// Headroom subtracted from every budget.
    pub fn safety_threshold(&self) -> u64 {
        self.safety_threshold
    }

    /// Decide admission for `realms` together.
    ///
    /// Duplicate names count once. Returns [`AdmissionDecision::Denied`] listing
    /// every over-budget realm, in request order, when any of them is full.
    pub async fn try_admit(
        &self,
        realms: &[RealmName],
    ) -> Result<AdmissionDecision, RespectfulError> {
        let realms = dedup(realms);
        if realms.is_empty() {
            return Err(RespectfulError::NoRealms);
        }

        let mut limits = Vec::with_capacity(realms.len());
        for realm in &realms {
            limits.push(self.registry.get_limits(realm).await?);
        }

        let mut over_budget = Vec::new();
        for (realm, realm_limits) in realms.iter().zip(&limits) {
            if !self.is_available(realm, realm_limits).await? {
                over_budget.push(realm.clone());
            }
        }

        if !over_budget.is_empty() {
            tracing::debug!(realms = ?over_budget, "admission denied");
            return Ok(AdmissionDecision::Denied {
                realms: over_budget,
            });
        }

        self.stamp(&realms, &limits).await?;
        tracing::info!(realms = ?realms, "admission granted");

        Ok(AdmissionDecision::Admitted)
    }

    /// Whether `realm` could take one more admission right now.
    pub async fn is_available(
        &self,
        realm: &RealmName,
        limits: &RealmLimits,
    ) -> Result<bool, RespectfulError> {
        // A threshold at or above the budget leaves no room at all.
        let Some(capacity) = limits.max_requests.checked_sub(self.safety_threshold) else {
            tracing::debug!(%realm, max_requests = limits.max_requests, "no capacity left after safety threshold");
            return Ok(false);
        };

        let occupancy = self.occupancy.count(realm).await?;
        tracing::debug!(%realm, occupancy, capacity, "realm availability");

        Ok(occupancy < capacity)
    }

    async fn stamp(
        &self,
        realms: &[RealmName],
        limits: &[RealmLimits],
    ) -> Result<(), RespectfulError> {
        let mut stamped = Vec::with_capacity(realms.len());

        for (realm, realm_limits) in realms.iter().zip(limits) {
            let token = Uuid::new_v4();
            let marker = self.keys.marker_key(realm, &token);

            let written = self
                .store
                .set_with_expiry(
                    &marker,
                    &token.hyphenated().to_string(),
                    *realm_limits.timespan,
                )
                .await;

            if let Err(err) = written {
                if !stamped.is_empty() {
                    tracing::warn!(
                        %realm,
                        stamped = stamped.len(),
                        error = %err,
                        "stamping interrupted, rolling back markers"
                    );
                    if let Err(rollback_err) = self.store.delete_keys(&stamped).await {
                        tracing::warn!(error = %rollback_err, "marker rollback failed");
                    }
                }

                return Err(err);
            }

            stamped.push(marker);
        }

        Ok(())
    }
}

fn dedup(realms: &[RealmName]) -> Vec<RealmName> {
    let mut unique: Vec<RealmName> = Vec::with_capacity(realms.len());
    for realm in realms {
        if !unique.contains(realm) {
            unique.push(realm.clone());
        }
    }
    unique
}
