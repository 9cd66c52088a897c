//! Redis-compatible networked backend (`Dragonfly` in production).
//!
//! Commands are issued through a bounded [`fred`] connection pool; the
//! pool size caps concurrent in-flight store and query operations. Each
//! event write is queued in a single `MULTI`/`EXEC` block. Timeouts are
//! delegated to the client configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use fred::prelude::*;

use super::{BackendKind, EventBackend};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::index::{RemovePlan, WritePlan};

/// Pooled connection handle to a Redis-compatible instance.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Connect to the store at `config.url`.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Connection`] if the store does not answer
    /// within the connect timeout, or [`StoreError::Redis`] if the
    /// connection is refused.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let redis_config = Config::from_url(&config.url)
            .map_err(|e| StoreError::Config(format!("invalid store URL: {e}")))?;

        let connect_timeout = config.connect_timeout();
        let command_timeout = config.command_timeout();
        let pool = Builder::from_config(redis_config)
            .with_connection_config(|c| {
                c.connection_timeout = connect_timeout;
            })
            .with_performance_config(|p| {
                p.default_command_timeout = command_timeout;
            })
            .build_pool(config.pool_size.max(1))?;

        match tokio::time::timeout(connect_timeout, pool.init()).await {
            Ok(Ok(_handle)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => {
                return Err(StoreError::Connection(format!(
                    "no answer from {} within {}ms",
                    config.url, config.connect_timeout_ms
                )));
            }
        }

        tracing::info!(pool_size = config.pool_size, "Connected to backing store");
        Ok(Self { pool })
    }

    /// Flush all keys from the instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        let _: () = self.pool.next().flushall(false).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl EventBackend for RedisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn write(&self, plan: &WritePlan) -> Result<(), StoreError> {
        let trx = self.pool.next().multi();
        let member = plan.event_id.as_str();

        for key in &plan.stale_index_keys {
            let _: () = trx.srem(key.as_str(), member).await?;
        }
        for key in &plan.index_keys {
            let _: () = trx.sadd(key.as_str(), member).await?;
            if let Some(ttl) = plan.ttl_seconds {
                let _: () = trx.expire(key.as_str(), ttl, None).await?;
            }
        }
        let _: () = trx
            .sadd(plan.registry_key.as_str(), plan.simulation_id.as_str())
            .await?;
        if plan.append_stream {
            let stream = &plan.stream;
            let _: () = trx
                .xadd(
                    stream.key.as_str(),
                    false,
                    None,
                    "*",
                    vec![("event_id", member), ("timestamp", stream.timestamp.as_str())],
                )
                .await?;
            if let Some(ttl) = plan.ttl_seconds {
                let _: () = trx.expire(stream.key.as_str(), ttl, None).await?;
            }
        }
        let _: () = trx
            .set(
                plan.primary_key.as_str(),
                plan.payload.clone(),
                None,
                None,
                false,
            )
            .await?;
        if let Some(ttl) = plan.ttl_seconds {
            let _: () = trx.expire(plan.primary_key.as_str(), ttl, None).await?;
        }

        let _: () = trx.exec(true).await?;
        Ok(())
    }

    async fn fetch(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<Vec<u8>>> = self.pool.next().mget(keys.to_vec()).await?;
        Ok(values)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let members: Vec<String> = self.pool.next().smembers(key).await?;
        Ok(members)
    }

    async fn stream_ids(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let entries: Vec<(String, HashMap<String, String>)> =
            self.pool.next().xrange(key, "-", "+", None).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, mut fields)| fields.remove("event_id"))
            .collect())
    }

    async fn remove(&self, plan: &RemovePlan) -> Result<(), StoreError> {
        let trx = self.pool.next().multi();
        for key in &plan.index_keys {
            let _: () = trx.srem(key.as_str(), plan.event_id.as_str()).await?;
        }
        let _: () = trx.del(plan.primary_key.as_str()).await?;
        let _: () = trx.exec(true).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let _: i64 = self.pool.next().publish(channel, payload).await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        for client in self.pool.clients() {
            client.quit().await?;
        }
        tracing::info!("Backing store connections closed");
        Ok(())
    }
}
