use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;

use crate::{QuotaStore, RespectfulError};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Record {
    value: Value,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process [`QuotaStore`].
///
/// Keys expire against the tokio clock, so a paused test runtime can advance
/// time without real sleeps. Expired records are reclaimed by the prefix scans
/// that admission runs anyway, and by [`purge_expired`](Self::purge_expired).
/// State is shared only by clones of the same instance: use it for
/// single-process deployments, tests and benches.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuotaStore {
    records: Arc<DashMap<String, Record>>,
    // held by the operations touching both a realm hash and the realm set
    entries: Arc<Mutex<()>>,
}

impl MemoryQuotaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| r.is_live(now)).count()
    }

    /// Whether no live key exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired records.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.records.retain(|_, record| record.is_live(now));
    }

    /// Records held in memory, expired ones included.
    #[cfg(test)]
    pub(crate) fn stored_records(&self) -> usize {
        self.records.len()
    }

    fn lock_entries(&self) -> MutexGuard<'_, ()> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let record = self.records.get(key)?;
        if record.is_live(now) {
            Some(record.value.clone())
        } else {
            drop(record);
            self.records.remove_if(key, |_, r| !r.is_live(now));
            None
        }
    }

    /// Plain string value of `key`, if live.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.live(key)? {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    fn add_member(&self, set_key: &str, member: &str) -> Result<(), RespectfulError> {
        let now = Instant::now();
        let mut record = self
            .records
            .entry(set_key.to_string())
            .or_insert_with(new_set);

        if !record.is_live(now) {
            *record = new_set();
        }

        match &mut record.value {
            Value::Set(set) => {
                set.insert(member.to_string());
                Ok(())
            }
            _ => Err(wrong_type(set_key)),
        }
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn ping(&self) -> Result<(), RespectfulError> {
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), RespectfulError> {
        // A TTL past the clock's range never expires in practice.
        let expires_at = Instant::now().checked_add(Duration::from_secs(ttl_secs));

        self.records.insert(
            key.to_string(),
            Record {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );

        Ok(())
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool, RespectfulError> {
        Ok(matches!(self.live(key), Some(Value::Hash(hash)) if hash.contains_key(field)))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RespectfulError> {
        match self.live(key) {
            Some(Value::Hash(hash)) => Ok(hash),
            _ => Ok(HashMap::new()),
        }
    }

    async fn set_fields_if_absent(
        &self,
        key: &str,
        guard_field: &str,
        fields: &[(&str, String)],
        set_key: &str,
        member: &str,
    ) -> Result<bool, RespectfulError> {
        let _entries = self.lock_entries();
        let now = Instant::now();

        if let Some(record) = self.records.get(set_key) {
            if record.is_live(now) && !matches!(record.value, Value::Set(_)) {
                return Err(wrong_type(set_key));
            }
        }

        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                match &mut occupied.get_mut().value {
                    Value::Hash(hash) if hash.contains_key(guard_field) => return Ok(false),
                    Value::Hash(hash) => {
                        for (field, value) in fields {
                            hash.insert(field.to_string(), value.clone());
                        }
                    }
                    _ => return Err(wrong_type(key)),
                }
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(new_hash(fields));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(new_hash(fields));
            }
        }

        self.add_member(set_key, member)?;

        Ok(true)
    }

    async fn set_fields_if_present(
        &self,
        key: &str,
        guard_field: &str,
        fields: &[(&str, String)],
    ) -> Result<bool, RespectfulError> {
        let now = Instant::now();
        let Some(mut record) = self.records.get_mut(key) else {
            return Ok(false);
        };
        if !record.is_live(now) {
            return Ok(false);
        }

        match &mut record.value {
            Value::Hash(hash) if hash.contains_key(guard_field) => {
                for (field, value) in fields {
                    hash.insert(field.to_string(), value.clone());
                }
                Ok(true)
            }
            Value::Hash(_) => Ok(false),
            _ => Err(wrong_type(key)),
        }
    }

    async fn delete_with_member(
        &self,
        key: &str,
        set_key: &str,
        member: &str,
    ) -> Result<(), RespectfulError> {
        let _entries = self.lock_entries();

        if let Some(mut record) = self.records.get_mut(set_key) {
            if let Value::Set(set) = &mut record.value {
                set.remove(member);
            }
        }
        self.records.remove(key);

        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, RespectfulError> {
        match self.live(key) {
            Some(Value::Set(set)) => Ok(set),
            _ => Ok(BTreeSet::new()),
        }
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), RespectfulError> {
        for key in keys {
            self.records.remove(key);
        }

        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, RespectfulError> {
        let now = Instant::now();
        let mut live = Vec::new();
        let mut expired = Vec::new();

        for record in self.records.iter() {
            if !record.key().starts_with(prefix) {
                continue;
            }
            if record.is_live(now) {
                live.push(record.key().clone());
            } else {
                expired.push(record.key().clone());
            }
        }

        // Iteration holds shard read locks; reclaim only once it is done.
        for key in expired {
            self.records.remove_if(&key, |_, r| !r.is_live(now));
        }

        Ok(live)
    }
}

fn new_hash(fields: &[(&str, String)]) -> Record {
    Record {
        value: Value::Hash(
            fields
                .iter()
                .map(|(field, value)| (field.to_string(), value.clone()))
                .collect(),
        ),
        expires_at: None,
    }
}

fn new_set() -> Record {
    Record {
        value: Value::Set(BTreeSet::new()),
        expires_at: None,
    }
}

fn wrong_type(key: &str) -> RespectfulError {
    RespectfulError::Backend(format!(
        "operation against a key holding the wrong kind of value: {key}"
    ))
}
