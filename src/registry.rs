use std::{collections::BTreeSet, sync::Arc};

use crate::{
    QuotaStore, RealmLimits, RealmName, RealmUpdate, RespectfulError, Timespan,
    keys::KeyGenerator,
};

/// CRUD over realm definitions held in the store.
///
/// # Semantics
///
/// - **First write wins:** registering an existing realm leaves its limits
///   alone. The check-and-write is a single atomic store operation.
/// - **Permissive updates:** updating an unregistered realm writes nothing and
///   still succeeds.
/// - **Idempotent removal:** unregistering an unknown realm succeeds.
pub struct RealmRegistry {
    store: Arc<dyn QuotaStore>,
    keys: Arc<KeyGenerator>,
}

impl RealmRegistry {
    pub(crate) fn new(store: Arc<dyn QuotaStore>, keys: Arc<KeyGenerator>) -> Self {
        Self { store, keys }
    }

    /// Register `realm` unless it already exists. Always returns `true`.
    pub async fn register(
        &self,
        realm: &RealmName,
        max_requests: u64,
        timespan: Timespan,
    ) -> Result<bool, RespectfulError> {
        let written = self
            .store
            .set_fields_if_absent(
                &self.keys.realm_key(realm),
                KeyGenerator::MAX_REQUESTS_FIELD,
                &[
                    (KeyGenerator::MAX_REQUESTS_FIELD, max_requests.to_string()),
                    (KeyGenerator::TIMESPAN_FIELD, timespan.to_string()),
                ],
                &self.keys.realms_key(),
                realm,
            )
            .await?;

        if written {
            tracing::debug!(%realm, max_requests, timespan = *timespan, "realm registered");
        } else {
            tracing::debug!(%realm, "realm already registered, keeping existing limits");
        }

        Ok(true)
    }

    /// Apply the supplied fields of `update` to an existing realm.
    ///
    /// Fields that are absent, or an out-of-range timespan, are ignored.
    /// Unregistered realms are left untouched. Always returns `true`.
    pub async fn update(
        &self,
        realm: &RealmName,
        update: RealmUpdate,
    ) -> Result<bool, RespectfulError> {
        let mut fields = Vec::with_capacity(2);
        if let Some(max_requests) = update.max_requests {
            fields.push((KeyGenerator::MAX_REQUESTS_FIELD, max_requests.to_string()));
        }
        if let Some(timespan) = update.valid_timespan() {
            fields.push((KeyGenerator::TIMESPAN_FIELD, timespan.to_string()));
        }

        if fields.is_empty() {
            return Ok(true);
        }

        let written = self
            .store
            .set_fields_if_present(
                &self.keys.realm_key(realm),
                KeyGenerator::MAX_REQUESTS_FIELD,
                &fields,
            )
            .await?;

        if written {
            tracing::debug!(%realm, ?update, "realm updated");
        } else {
            tracing::debug!(%realm, "ignoring update of unregistered realm");
        }

        Ok(true)
    }

    /// Remove `realm`, its set membership and every live marker it owns.
    /// Always returns `true`.
    ///
    /// Markers are swept before the entry goes away, so a registration racing
    /// the removal never loses markers of its own. Admissions racing it may
    /// leave markers behind; they expire with their window.
    pub async fn unregister(&self, realm: &RealmName) -> Result<bool, RespectfulError> {
        let markers: Vec<String> = self
            .store
            .scan_prefix(&self.keys.marker_prefix(realm))
            .await?
            .into_iter()
            .filter(|key| self.keys.is_marker_of(realm, key))
            .collect();

        self.store.delete_keys(&markers).await?;
        self.store
            .delete_with_member(&self.keys.realm_key(realm), &self.keys.realms_key(), realm)
            .await?;
        self.keys.forget(realm);

        tracing::debug!(%realm, markers = markers.len(), "realm unregistered");

        Ok(true)
    }

    /// Names of every registered realm.
    pub async fn list_registered(&self) -> Result<BTreeSet<RealmName>, RespectfulError> {
        let members = self.store.set_members(&self.keys.realms_key()).await?;

        Ok(members
            .into_iter()
            .filter_map(|name| RealmName::try_from(name).ok())
            .collect())
    }

    /// Whether `realm` has a limits entry.
    pub async fn is_registered(&self, realm: &RealmName) -> Result<bool, RespectfulError> {
        self.store
            .hash_field_exists(&self.keys.realm_key(realm), KeyGenerator::MAX_REQUESTS_FIELD)
            .await
    }

    /// Limits of `realm`, or [`RespectfulError::UnknownRealm`].
    pub async fn get_limits(&self, realm: &RealmName) -> Result<RealmLimits, RespectfulError> {
        let fields = self.store.hash_get_all(&self.keys.realm_key(realm)).await?;

        let Some(max_requests) = fields.get(KeyGenerator::MAX_REQUESTS_FIELD) else {
            return Err(RespectfulError::UnknownRealm(realm.clone()));
        };

        let max_requests =
            max_requests
                .parse::<u64>()
                .map_err(|_| RespectfulError::CorruptRealmEntry {
                    realm: realm.clone(),
                    field: KeyGenerator::MAX_REQUESTS_FIELD,
                })?;

        let timespan = fields
            .get(KeyGenerator::TIMESPAN_FIELD)
            .and_then(|t| t.parse::<u64>().ok())
            .and_then(|t| Timespan::try_from(t).ok())
            .ok_or_else(|| RespectfulError::CorruptRealmEntry {
                realm: realm.clone(),
                field: KeyGenerator::TIMESPAN_FIELD,
            })?;

        Ok(RealmLimits {
            max_requests,
            timespan,
        })
    }

    /// Budget of `realm`.
    pub async fn max_requests(&self, realm: &RealmName) -> Result<u64, RespectfulError> {
        Ok(self.get_limits(realm).await?.max_requests)
    }

    /// Window length of `realm`.
    pub async fn timespan(&self, realm: &RealmName) -> Result<Timespan, RespectfulError> {
        Ok(self.get_limits(realm).await?.timespan)
    }
}
