use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};

use seatline_core::cache::{LockCache, RateLimiter};
use seatline_core::{CoreError, CoreResult};

fn cache_err(err: redis::RedisError) -> CoreError {
    CoreError::InternalError(format!("redis error: {}", err))
}

fn millis(ttl: Duration) -> u64 {
    ttl.as_millis().max(1) as u64
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl LockCache for RedisClient {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<bool> {
        let mut conn = self.conn.clone();

        // SET NX: Only set if key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;

        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(cache_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(cache_err)
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(cache_err)
    }

    async fn release(&self, key: &str, owner: &str) -> CoreResult<bool> {
        let mut conn = self.conn.clone();
        // Compare-and-delete so an expired holder never removes a newer holder's lock.
        let script = redis::Script::new(r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#);

        let removed: i64 = script
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(removed == 1)
    }

    async fn publish(&self, channel: &str, payload: &str) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, payload).await.map_err(cache_err)?;
        debug!("Published to {} ({} receivers)", channel, receivers);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> CoreResult<BoxStream<'static, String>> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(cache_err)?;
        pubsub.subscribe(channel).await.map_err(cache_err)?;
        info!("Subscribed to {}", channel);

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl RateLimiter for RedisClient {
    async fn check_rate_limit(&self, key: &str, limit: i64, window: Duration) -> CoreResult<bool> {
        let mut conn = self.conn.clone();

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window.as_secs().max(1) as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;

        Ok(count <= limit)
    }
}
