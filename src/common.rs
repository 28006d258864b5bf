use std::{fmt, ops::Deref, sync::Arc};

use crate::RespectfulError;

/// Name of a quota realm.
///
/// Any non-empty unicode string is accepted, including colons, spaces and glob
/// metacharacters; key construction and scanning escape what they need to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RealmName(Arc<str>);

impl RealmName {
    /// Create a realm name, rejecting the empty string.
    pub fn new(name: impl Into<String>) -> Result<Self, RespectfulError> {
        Self::try_from(name.into())
    }
}

impl TryFrom<String> for RealmName {
    type Error = RespectfulError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(RespectfulError::InvalidRealmName(
                "Realm name must not be empty".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for RealmName {
    type Error = RespectfulError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl Deref for RealmName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for RealmName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RealmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rolling window length of a realm, in whole seconds.
///
/// Must be between 1 and [`Timespan::MAX_SECS`]: a marker with a zero TTL would
/// never be observable, and stores reject expiries far in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timespan(u64);

impl Timespan {
    /// Longest accepted window: ten years.
    pub const MAX_SECS: u64 = 10 * 365 * 24 * 60 * 60;
}

impl Deref for Timespan {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for Timespan {
    type Error = RespectfulError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err(RespectfulError::InvalidTimespan(
                "Timespan must be at least 1 second".to_string(),
            ))
        } else if value > Self::MAX_SECS {
            Err(RespectfulError::InvalidTimespan(format!(
                "Timespan must not exceed {} seconds",
                Self::MAX_SECS
            )))
        } else {
            Ok(Self(value))
        }
    }
}

/// Validated prefix shared by every key this crate writes.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPrefix(Arc<str>);

impl KeyPrefix {
    /// The prefix used when none is configured.
    pub fn default_prefix() -> Self {
        Self(Arc::from("RespectfulRequester"))
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::default_prefix()
    }
}

impl Deref for KeyPrefix {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = RespectfulError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(RespectfulError::InvalidKeyPrefix(
                "Key prefix must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(RespectfulError::InvalidKeyPrefix(
                "Key prefix must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(RespectfulError::InvalidKeyPrefix(
                "Key prefix must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

/// Configured limits of a registered realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealmLimits {
    /// Admissions allowed per window. Zero denies everything.
    pub max_requests: u64,
    /// Window length.
    pub timespan: Timespan,
}

/// Partial update of a realm's limits. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RealmUpdate {
    /// New budget, if any.
    pub max_requests: Option<u64>,
    /// New window length in seconds, if any.
    pub timespan: Option<u64>,
}

impl RealmUpdate {
    /// Update only the budget.
    pub fn max_requests(max_requests: u64) -> Self {
        Self {
            max_requests: Some(max_requests),
            timespan: None,
        }
    }

    /// Update only the window length.
    pub fn timespan(timespan: u64) -> Self {
        Self {
            max_requests: None,
            timespan: Some(timespan),
        }
    }

    /// Build an update from raw text values.
    ///
    /// Values that are not non-negative integers are dropped silently; the
    /// remaining fields still apply. An out-of-range timespan survives parsing
    /// but is ignored when the update is applied.
    pub fn parse(max_requests: Option<&str>, timespan: Option<&str>) -> Self {
        Self {
            max_requests: max_requests.and_then(|v| v.trim().parse::<u64>().ok()),
            timespan: timespan.and_then(|v| v.trim().parse::<u64>().ok()),
        }
    }

    pub(crate) fn valid_timespan(&self) -> Option<Timespan> {
        self.timespan.and_then(|t| Timespan::try_from(t).ok())
    }
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Every requested realm had room; one marker per realm was stamped.
    Admitted,
    /// At least one realm was over budget; nothing was stamped.
    Denied {
        /// The over-budget realms, in request order.
        realms: Vec<RealmName>,
    },
}

impl AdmissionDecision {
    /// Whether the decision admits the call.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}
