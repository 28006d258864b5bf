use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::{KeyPrefix, RealmName};

/// Builds the store keys shared by every process using the same prefix.
///
/// Layout, with prefix `P`:
/// - `P:REALMS`: set of registered realm names
/// - `P:REALMS:<realm>`: hash with `max_requests` and `timespan`
/// - `P:REQUEST:<realm>:<uuid>`: one self-expiring marker per admitted request
#[derive(Debug)]
pub(crate) struct KeyGenerator {
    prefix: KeyPrefix,
    realms_key: Arc<str>,

    // caches
    realm_key_cache: DashMap<RealmName, Arc<str>>,
    marker_prefix_cache: DashMap<RealmName, Arc<str>>,
}

impl KeyGenerator {
    pub(crate) const MAX_REQUESTS_FIELD: &'static str = "max_requests";
    pub(crate) const TIMESPAN_FIELD: &'static str = "timespan";

    pub(crate) fn new(prefix: KeyPrefix) -> Self {
        let realms_key: Arc<str> = Arc::from(format!("{}:REALMS", &*prefix));

        Self {
            prefix,
            realms_key,
            realm_key_cache: DashMap::new(),
            marker_prefix_cache: DashMap::new(),
        }
    }

    pub(crate) fn realms_key(&self) -> Arc<str> {
        self.realms_key.clone()
    }

    pub(crate) fn realm_key(&self, realm: &RealmName) -> Arc<str> {
        match self.realm_key_cache.get(realm) {
            Some(value) => value.clone(),
            None => {
                let value: Arc<str> = Arc::from(format!("{}:{}", self.realms_key, &**realm));
                self.realm_key_cache.insert(realm.clone(), value.clone());

                value
            }
        }
    }

    /// Everything before the token in a marker key, trailing colon included.
    pub(crate) fn marker_prefix(&self, realm: &RealmName) -> Arc<str> {
        match self.marker_prefix_cache.get(realm) {
            Some(value) => value.clone(),
            None => {
                let value: Arc<str> =
                    Arc::from(format!("{}:REQUEST:{}:", &*self.prefix, &**realm));
                self.marker_prefix_cache.insert(realm.clone(), value.clone());

                value
            }
        }
    }

    pub(crate) fn marker_key(&self, realm: &RealmName, token: &Uuid) -> String {
        format!("{}{}", self.marker_prefix(realm), token.hyphenated())
    }

    /// Whether `key`, found under `realm`'s marker prefix, is one of its markers
    /// rather than a marker of a longer realm name sharing the prefix.
    pub(crate) fn is_marker_of(&self, realm: &RealmName, key: &str) -> bool {
        key.strip_prefix(&*self.marker_prefix(realm))
            .is_some_and(|token| Uuid::try_parse(token).is_ok())
    }

    pub(crate) fn forget(&self, realm: &RealmName) {
        self.realm_key_cache.remove(realm);
        self.marker_prefix_cache.remove(realm);
    }
}
