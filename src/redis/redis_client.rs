use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{Client, aio::ConnectionManager};

use crate::RespectfulError;

/// A round-robin pool of [`redis::aio::ConnectionManager`]s.
pub struct RespectfulRedisClient {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl RespectfulRedisClient {
    /// Create a client holding a single connection manager.
    pub async fn default_from_client(client: Client) -> Result<Self, RespectfulError> {
        Self::from_client(client, 1).await
    }

    /// Create a client holding `connection_count` connection managers.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, RespectfulError> {
        if connection_count == 0 {
            return Err(RespectfulError::Config(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(
                client
                    .get_connection_manager()
                    .await
                    .map_err(|err| RespectfulError::StoreUnavailable(err.to_string()))?,
            );
        }

        Ok(Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        })
    }

    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    }
}

impl fmt::Debug for RespectfulRedisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespectfulRedisClient")
            .field("connections", &self.connection_managers.len())
            .finish_non_exhaustive()
    }
}

impl Clone for RespectfulRedisClient {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}
