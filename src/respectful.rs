//! Top-level entrypoint that wires the components together.
//!
//! A [`Respectful`] owns one configuration snapshot and one store handle. It is
//! `Send + Sync`; share it behind an `Arc` across tasks. Independent processes
//! coordinate through the store as long as they use the same key prefix.

use std::{collections::BTreeSet, future::Future, sync::Arc};

use crate::{
    AdmissionController, AdmissionDecision, Dispatcher, OccupancyCounter, QuotaStore,
    RealmLimits, RealmName, RealmRegistry, RealmUpdate, RespectfulConfig, RespectfulError,
    Timespan, WaitPolicy, keys::KeyGenerator,
};

#[cfg(feature = "redis-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
use crate::RedisQuotaStore;

/// Distributed admission controller.
///
/// # Examples
///
/// ```ignore
/// use respectful::{RealmName, Respectful, RespectfulConfig};
///
/// let rr = Respectful::connect(RespectfulConfig::load()?).await?;
/// let github = RealmName::try_from("github")?;
///
/// rr.register_realm(&github, 5000, 3600).await?;
///
/// let body = rr
///     .dispatch(|| async { fetch("https://api.github.com/").await }, &[github], true)
///     .await?;
/// ```
pub struct Respectful {
    config: RespectfulConfig,
    store: Arc<dyn QuotaStore>,
    registry: Arc<RealmRegistry>,
    occupancy: Arc<OccupancyCounter>,
    admission: Arc<AdmissionController>,
    dispatcher: Dispatcher,
}

impl Respectful {
    /// Connect to the Redis server named in `config` and ping it.
    ///
    /// Fails fast with [`RespectfulError::StoreUnavailable`] when the server
    /// cannot be reached, and with [`RespectfulError::Config`] on an invalid
    /// configuration.
    #[cfg(feature = "redis-tokio")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
    pub async fn connect(config: RespectfulConfig) -> Result<Self, RespectfulError> {
        config.validate()?;

        let store = RedisQuotaStore::connect(
            &config.redis,
            config.connection_count,
            config.scan_batch_size,
        )
        .await?;

        tracing::info!(
            redis = %config.redis.redis_url(),
            key_prefix = %config.key_prefix,
            safety_threshold = config.safety_threshold,
            "connected to quota store"
        );

        Self::with_store(Arc::new(store), config)
    }

    /// Ping `store`, then build on top of it.
    pub async fn connect_with(
        store: Arc<dyn QuotaStore>,
        config: RespectfulConfig,
    ) -> Result<Self, RespectfulError> {
        store.ping().await.map_err(|err| match err {
            RespectfulError::StoreUnavailable(_) => err,
            other => RespectfulError::StoreUnavailable(other.to_string()),
        })?;

        Self::with_store(store, config)
    }

    /// Build on top of an existing store without probing it.
    pub fn with_store(
        store: Arc<dyn QuotaStore>,
        config: RespectfulConfig,
    ) -> Result<Self, RespectfulError> {
        config.validate()?;

        let keys = Arc::new(KeyGenerator::new(config.prefix()?));
        let registry = Arc::new(RealmRegistry::new(store.clone(), keys.clone()));
        let occupancy = Arc::new(OccupancyCounter::new(store.clone(), keys.clone()));
        let admission = Arc::new(AdmissionController::new(
            store.clone(),
            keys,
            registry.clone(),
            occupancy.clone(),
            config.safety_threshold,
        ));
        let dispatcher = Dispatcher::new(
            admission.clone(),
            config.poll_interval(),
            config.max_wait(),
            Arc::from(config.call_module.as_str()),
        );

        Ok(Self {
            config,
            store,
            registry,
            occupancy,
            admission,
            dispatcher,
        })
    }

    /// The configuration snapshot this instance runs with.
    pub fn config(&self) -> &RespectfulConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn QuotaStore> {
        &self.store
    }

    /// Realm CRUD.
    pub fn registry(&self) -> &RealmRegistry {
        &self.registry
    }

    /// Marker counting.
    pub fn occupancy_counter(&self) -> &OccupancyCounter {
        &self.occupancy
    }

    /// Admission decisions.
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Call dispatching.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Register `realm` with a budget of `max_requests` per `timespan` seconds.
    ///
    /// An existing realm keeps its limits. Fails with
    /// [`RespectfulError::InvalidTimespan`] when `timespan` is 0.
    pub async fn register_realm(
        &self,
        realm: &RealmName,
        max_requests: u64,
        timespan: u64,
    ) -> Result<bool, RespectfulError> {
        self.registry
            .register(realm, max_requests, Timespan::try_from(timespan)?)
            .await
    }

    /// Change some limits of an existing realm. See [`RealmRegistry::update`].
    pub async fn update_realm(
        &self,
        realm: &RealmName,
        update: RealmUpdate,
    ) -> Result<bool, RespectfulError> {
        self.registry.update(realm, update).await
    }

    /// Remove `realm` and its markers. See [`RealmRegistry::unregister`].
    pub async fn unregister_realm(&self, realm: &RealmName) -> Result<bool, RespectfulError> {
        self.registry.unregister(realm).await
    }

    /// Every registered realm.
    pub async fn list_registered_realms(&self) -> Result<BTreeSet<RealmName>, RespectfulError> {
        self.registry.list_registered().await
    }

    /// Limits of `realm`.
    pub async fn realm_limits(&self, realm: &RealmName) -> Result<RealmLimits, RespectfulError> {
        self.registry.get_limits(realm).await
    }

    /// Budget of `realm`.
    pub async fn realm_max_requests(&self, realm: &RealmName) -> Result<u64, RespectfulError> {
        self.registry.max_requests(realm).await
    }

    /// Window length of `realm`, in seconds.
    pub async fn realm_timespan(&self, realm: &RealmName) -> Result<u64, RespectfulError> {
        Ok(*self.registry.timespan(realm).await?)
    }

    /// Admissions of `realm` still inside its window. Walks the keyspace; see
    /// [`OccupancyCounter`].
    pub async fn occupancy(&self, realm: &RealmName) -> Result<u64, RespectfulError> {
        self.occupancy.count(realm).await
    }

    /// One admission attempt across `realms`. See [`AdmissionController`].
    pub async fn try_admit(
        &self,
        realms: &[RealmName],
    ) -> Result<AdmissionDecision, RespectfulError> {
        self.admission.try_admit(realms).await
    }

    /// Run `call` once `realms` admit it. See [`Dispatcher::dispatch`].
    pub async fn dispatch<F, Fut, T>(
        &self,
        call: F,
        realms: &[RealmName],
        wait: bool,
    ) -> Result<T, RespectfulError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.dispatcher.dispatch(call, realms, wait).await
    }

    /// Run `call` once `realms` admit it, waiting per `policy`.
    pub async fn dispatch_with<F, Fut, T>(
        &self,
        call: F,
        realms: &[RealmName],
        policy: WaitPolicy,
    ) -> Result<T, RespectfulError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.dispatcher.dispatch_with(call, realms, policy).await
    }
}
