use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::{QuotaStore, RespectfulError, RespectfulRedisClient, StoreConfig};

const DELETE_CHUNK: usize = 500;

/// [`QuotaStore`] backed by Redis.
///
/// Markers are plain keys with `SET .. EX`, so expiry is handled by Redis
/// itself. Realm entry writes, which must keep the realm hash and the realm set in
/// step, run as Lua scripts; everything else is a single command.
///
/// # Examples
///
/// ```ignore
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let store = RedisQuotaStore::new(
///     RespectfulRedisClient::default_from_client(client).await?,
///     1000,
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RedisQuotaStore {
    client: RespectfulRedisClient,
    scan_batch_size: usize,
    fields_if_absent_script: redis::Script,
    fields_if_present_script: redis::Script,
    delete_with_member_script: redis::Script,
}

impl RedisQuotaStore {
    /// Wrap an existing client. `scan_batch_size` is the `COUNT` hint passed to
    /// each `SCAN` round trip.
    pub fn new(client: RespectfulRedisClient, scan_batch_size: usize) -> Self {
        let fields_if_absent_script = redis::Script::new(
            r#"
            local key = KEYS[1]
            local set_key = KEYS[2]
            local guard_field = ARGV[1]
            local member = ARGV[2]

            if redis.call("HEXISTS", key, guard_field) == 1 then
                return 0
            end

            for i = 3, #ARGV, 2 do
                redis.call("HSET", key, ARGV[i], ARGV[i + 1])
            end
            redis.call("SADD", set_key, member)

            return 1
        "#,
        );

        let fields_if_present_script = redis::Script::new(
            r#"
            local key = KEYS[1]
            local guard_field = ARGV[1]

            if redis.call("HEXISTS", key, guard_field) == 0 then
                return 0
            end

            for i = 2, #ARGV, 2 do
                redis.call("HSET", key, ARGV[i], ARGV[i + 1])
            end

            return 1
        "#,
        );

        let delete_with_member_script = redis::Script::new(
            r#"
            redis.call("SREM", KEYS[2], ARGV[1])
            redis.call("DEL", KEYS[1])

            return 1
        "#,
        );

        Self {
            client,
            scan_batch_size: scan_batch_size.max(1),
            fields_if_absent_script,
            fields_if_present_script,
            delete_with_member_script,
        }
    }

    /// Open a pool against `config` and ping it.
    ///
    /// Fails with [`RespectfulError::StoreUnavailable`] when the server cannot
    /// be reached. There is no retry.
    pub async fn connect(
        config: &StoreConfig,
        connection_count: usize,
        scan_batch_size: usize,
    ) -> Result<Self, RespectfulError> {
        let client = redis::Client::open(config.redis_url())
            .map_err(|err| RespectfulError::Config(format!("invalid redis address: {err}")))?;
        let client = RespectfulRedisClient::from_client(client, connection_count).await?;
        let store = Self::new(client, scan_batch_size);

        store.ping().await?;

        Ok(store)
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn ping(&self) -> Result<(), RespectfulError> {
        let mut connection_manager = self.client.get();

        let _: String = redis::cmd("PING")
            .query_async(&mut connection_manager)
            .await
            .map_err(|err| {
                RespectfulError::StoreUnavailable(format!(
                    "could not establish a connection to the redis server: {err}"
                ))
            })?;

        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), RespectfulError> {
        let mut connection_manager = self.client.get();

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut connection_manager)
            .await?;

        Ok(())
    }

    async fn hash_field_exists(&self, key: &str, field: &str) -> Result<bool, RespectfulError> {
        let mut connection_manager = self.client.get();
        let exists: bool = connection_manager.hexists(key, field).await?;

        Ok(exists)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RespectfulError> {
        let mut connection_manager = self.client.get();
        let fields: HashMap<String, String> = connection_manager.hgetall(key).await?;

        Ok(fields)
    }

    async fn set_fields_if_absent(
        &self,
        key: &str,
        guard_field: &str,
        fields: &[(&str, String)],
        set_key: &str,
        member: &str,
    ) -> Result<bool, RespectfulError> {
        let mut connection_manager = self.client.get();

        let mut invocation = self.fields_if_absent_script.prepare_invoke();
        invocation.key(key).key(set_key).arg(guard_field).arg(member);
        for (field, value) in fields {
            invocation.arg(*field).arg(value.as_str());
        }

        let written: bool = invocation.invoke_async(&mut connection_manager).await?;

        Ok(written)
    }

    async fn set_fields_if_present(
        &self,
        key: &str,
        guard_field: &str,
        fields: &[(&str, String)],
    ) -> Result<bool, RespectfulError> {
        let mut connection_manager = self.client.get();

        let mut invocation = self.fields_if_present_script.prepare_invoke();
        invocation.key(key).arg(guard_field);
        for (field, value) in fields {
            invocation.arg(*field).arg(value.as_str());
        }

        let written: bool = invocation.invoke_async(&mut connection_manager).await?;

        Ok(written)
    }

    async fn delete_with_member(
        &self,
        key: &str,
        set_key: &str,
        member: &str,
    ) -> Result<(), RespectfulError> {
        let mut connection_manager = self.client.get();

        let _: () = self
            .delete_with_member_script
            .key(key)
            .key(set_key)
            .arg(member)
            .invoke_async(&mut connection_manager)
            .await?;

        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, RespectfulError> {
        let mut connection_manager = self.client.get();
        let members: BTreeSet<String> = connection_manager.smembers(key).await?;

        Ok(members)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), RespectfulError> {
        let mut connection_manager = self.client.get();

        for chunk in keys.chunks(DELETE_CHUNK) {
            let mut cmd = redis::cmd("DEL");
            for key in chunk {
                cmd.arg(key.as_str());
            }

            let _: () = cmd.query_async(&mut connection_manager).await?;
        }

        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, RespectfulError> {
        let mut connection_manager = self.client.get();
        let pattern = format!("{}*", escape_glob(prefix));

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch_size)
                .query_async(&mut connection_manager)
                .await?;

            keys.extend(batch);

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        Ok(keys)
    }
}

/// Escape the characters `SCAN MATCH` treats as glob syntax.
pub(crate) fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());

    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}
