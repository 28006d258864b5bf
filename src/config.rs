//! Configuration for a [`Respectful`](crate::Respectful) instance.
//!
//! The configuration is a plain value: build it (from defaults, a YAML file or
//! partial updates), then hand it to [`Respectful::connect`](crate::Respectful::connect).
//! The instance keeps its own snapshot, so changing a config afterwards never
//! affects a running controller.
//!
//! File format (`respectful.config.yml`):
//!
//! ```yaml
//! redis:
//!   host: localhost
//!   port: 6379
//!   database: 0
//! safety_threshold: 10
//! call_module: http
//! ```

use std::{fs, io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{KeyPrefix, RespectfulError};

/// File read by [`RespectfulConfig::load`].
pub const DEFAULT_CONFIG_FILE: &str = "respectful.config.yml";

/// Where the shared store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Logical database index.
    pub database: i64,
}

impl StoreConfig {
    /// `redis://host:port/database`.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.database)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            database: 0,
        }
    }
}

/// Full configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespectfulConfig {
    /// Store connection info.
    pub redis: StoreConfig,
    /// Prefix of every key written to the store. Processes sharing quotas must
    /// agree on it.
    pub key_prefix: String,
    /// Headroom subtracted from each realm's budget to absorb racing
    /// admissions and scan staleness.
    pub safety_threshold: u64,
    /// Label of the library performing the wrapped calls, recorded on dispatch
    /// spans.
    pub call_module: String,
    /// Delay between admission attempts while waiting.
    pub poll_interval_ms: u64,
    /// Upper bound on a waiting dispatch. `None` waits until admitted.
    pub max_wait_ms: Option<u64>,
    /// Redis connections kept in the pool.
    pub connection_count: usize,
    /// `COUNT` hint for each `SCAN` round trip.
    pub scan_batch_size: usize,
}

impl Default for RespectfulConfig {
    fn default() -> Self {
        Self {
            redis: StoreConfig::default(),
            key_prefix: KeyPrefix::default_prefix().to_string(),
            safety_threshold: 10,
            call_module: "http".to_string(),
            poll_interval_ms: 1000,
            max_wait_ms: None,
            connection_count: 1,
            scan_batch_size: 1000,
        }
    }
}

/// Shape of the config file: unlike the in-memory value, `redis` is required.
#[derive(Deserialize)]
struct ConfigFile {
    redis: StoreConfig,
    key_prefix: Option<String>,
    safety_threshold: Option<u64>,
    call_module: Option<String>,
    poll_interval_ms: Option<u64>,
    max_wait_ms: Option<u64>,
    connection_count: Option<usize>,
    scan_batch_size: Option<usize>,
}

/// Partial configuration change applied by [`RespectfulConfig::configure`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// New store connection info.
    pub redis: Option<StoreConfig>,
    /// New key prefix.
    pub key_prefix: Option<String>,
    /// New safety threshold.
    pub safety_threshold: Option<u64>,
    /// New call module label.
    pub call_module: Option<String>,
    /// New poll interval.
    pub poll_interval_ms: Option<u64>,
    /// New wait bound. `Some(None)` removes the bound.
    pub max_wait_ms: Option<Option<u64>>,
    /// New pool size.
    pub connection_count: Option<usize>,
    /// New scan batch size.
    pub scan_batch_size: Option<usize>,
}

impl RespectfulConfig {
    /// Parse a YAML document.
    ///
    /// The `redis` key and its `host`, `port` and `database` entries are
    /// required; every other key falls back to its default.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RespectfulError> {
        let file: ConfigFile = serde_yaml::from_str(yaml)
            .map_err(|err| RespectfulError::Config(err.to_string()))?;

        let mut config = Self::default();
        config.configure(ConfigUpdate {
            redis: Some(file.redis),
            key_prefix: file.key_prefix,
            safety_threshold: file.safety_threshold,
            call_module: file.call_module,
            poll_interval_ms: file.poll_interval_ms,
            max_wait_ms: file.max_wait_ms.map(Some),
            connection_count: file.connection_count,
            scan_batch_size: file.scan_batch_size,
        })?;

        Ok(config)
    }

    /// Read and parse a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RespectfulError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|err| {
            RespectfulError::Config(format!("cannot read {}: {err}", path.display()))
        })?;

        Self::from_yaml_str(&yaml)
    }

    /// Read [`DEFAULT_CONFIG_FILE`] from the working directory, falling back to
    /// defaults when it does not exist.
    pub fn load() -> Result<Self, RespectfulError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Like [`load`](Self::load) with an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, RespectfulError> {
        match fs::read_to_string(path.as_ref()) {
            Ok(yaml) => Self::from_yaml_str(&yaml),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(RespectfulError::Config(format!(
                "cannot read {}: {err}",
                path.as_ref().display()
            ))),
        }
    }

    /// Apply `update`. Every supplied field is validated first; on any failure
    /// nothing is changed.
    pub fn configure(&mut self, update: ConfigUpdate) -> Result<&Self, RespectfulError> {
        if let Some(prefix) = &update.key_prefix {
            KeyPrefix::try_from(prefix.clone())
                .map_err(|err| RespectfulError::Config(format!("'key_prefix': {err}")))?;
        }
        if let Some(redis) = &update.redis {
            if redis.host.trim().is_empty() {
                return Err(RespectfulError::Config(
                    "'redis.host' must not be empty".to_string(),
                ));
            }
            if redis.database < 0 {
                return Err(RespectfulError::Config(
                    "'redis.database' must be a non-negative integer".to_string(),
                ));
            }
        }
        if update.call_module.as_deref().is_some_and(str::is_empty) {
            return Err(RespectfulError::Config(
                "'call_module' must not be empty".to_string(),
            ));
        }
        if update.poll_interval_ms == Some(0) {
            return Err(RespectfulError::Config(
                "'poll_interval_ms' must be greater than 0".to_string(),
            ));
        }
        if update.max_wait_ms == Some(Some(0)) {
            return Err(RespectfulError::Config(
                "'max_wait_ms' must be greater than 0".to_string(),
            ));
        }
        if update.connection_count == Some(0) {
            return Err(RespectfulError::Config(
                "'connection_count' must be greater than 0".to_string(),
            ));
        }
        if update.scan_batch_size == Some(0) {
            return Err(RespectfulError::Config(
                "'scan_batch_size' must be greater than 0".to_string(),
            ));
        }

        if let Some(redis) = update.redis {
            self.redis = redis;
        }
        if let Some(key_prefix) = update.key_prefix {
            self.key_prefix = key_prefix;
        }
        if let Some(safety_threshold) = update.safety_threshold {
            self.safety_threshold = safety_threshold;
        }
        if let Some(call_module) = update.call_module {
            self.call_module = call_module;
        }
        if let Some(poll_interval_ms) = update.poll_interval_ms {
            self.poll_interval_ms = poll_interval_ms;
        }
        if let Some(max_wait_ms) = update.max_wait_ms {
            self.max_wait_ms = max_wait_ms;
        }
        if let Some(connection_count) = update.connection_count {
            self.connection_count = connection_count;
        }
        if let Some(scan_batch_size) = update.scan_batch_size {
            self.scan_batch_size = scan_batch_size;
        }

        Ok(self)
    }

    /// Restore every field to its default.
    pub fn reset_to_default(&mut self) -> &Self {
        *self = Self::default();
        self
    }

    /// Validate the whole snapshot, as [`Respectful`](crate::Respectful) does
    /// before using it.
    pub fn validate(&self) -> Result<(), RespectfulError> {
        self.clone().configure(ConfigUpdate {
            redis: Some(self.redis.clone()),
            key_prefix: Some(self.key_prefix.clone()),
            safety_threshold: Some(self.safety_threshold),
            call_module: Some(self.call_module.clone()),
            poll_interval_ms: Some(self.poll_interval_ms),
            max_wait_ms: Some(self.max_wait_ms),
            connection_count: Some(self.connection_count),
            scan_batch_size: Some(self.scan_batch_size),
        })?;

        Ok(())
    }

    pub(crate) fn prefix(&self) -> Result<KeyPrefix, RespectfulError> {
        KeyPrefix::try_from(self.key_prefix.clone())
            .map_err(|err| RespectfulError::Config(format!("'key_prefix': {err}")))
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}
