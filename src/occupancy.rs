use std::{collections::HashSet, sync::Arc};

use crate::{QuotaStore, RealmName, RespectfulError, keys::KeyGenerator};

/// Counts the live occupancy markers of a realm.
///
/// Markers expire on their own, so whatever the scan finds is exactly the set
/// of admissions still inside the window; there is no cleanup pass.
///
/// # Cost
///
/// Each call walks the store's keyspace (`SCAN` on Redis): O(keys in store),
/// not O(1). High-frequency callers should budget for it, and may shard realms
/// across stores when it becomes the bottleneck.
pub struct OccupancyCounter {
    store: Arc<dyn QuotaStore>,
    keys: Arc<KeyGenerator>,
}

impl OccupancyCounter {
    pub(crate) fn new(store: Arc<dyn QuotaStore>, keys: Arc<KeyGenerator>) -> Self {
        Self { store, keys }
    }

    /// Number of markers of `realm` currently alive.
    ///
    /// Does not check registration: an unknown realm simply counts 0.
    pub async fn count(&self, realm: &RealmName) -> Result<u64, RespectfulError> {
        let scanned = self.store.scan_prefix(&self.keys.marker_prefix(realm)).await?;

        // SCAN may report a key more than once.
        let live: HashSet<String> = scanned
            .into_iter()
            .filter(|key| self.keys.is_marker_of(realm, key))
            .collect();

        Ok(live.len() as u64)
    }
}
