#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod respectful;
pub use respectful::*;

mod store;
pub use store::*;

#[cfg(feature = "redis-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
mod redis;
#[cfg(feature = "redis-tokio")]
pub use self::redis::*;

mod error;
pub use error::*;

mod common;
pub use common::{AdmissionDecision, KeyPrefix, RealmLimits, RealmName, RealmUpdate, Timespan};

mod config;
pub use config::*;

mod keys;

mod registry;
pub use registry::*;

mod occupancy;
pub use occupancy::*;

mod admission;
pub use admission::*;

mod dispatcher;
pub use dispatcher::*;

#[cfg(test)]
mod tests;
