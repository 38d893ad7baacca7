//! Redis 最新值缓存实现

use crate::error::StorageError;
use crate::models::LastValueRecord;
use crate::traits::RealtimeStore;
use domain::{Reading, TagId, now_epoch_ms};
use redis::AsyncCommands;

fn last_value_key(tag_id: TagId) -> String {
    format!("scada:tag:{}:last_value", tag_id)
}

/// Redis 最新值存储
pub struct RedisRealtimeStore {
    client: redis::Client,
    last_value_ttl_seconds: Option<u64>,
}

impl RedisRealtimeStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            last_value_ttl_seconds: None,
        }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client))
    }

    /// ttl 为 0 时视为不过期。
    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.last_value_ttl_seconds = (ttl_seconds > 0).then_some(ttl_seconds);
        self
    }
}

#[async_trait::async_trait]
impl RealtimeStore for RedisRealtimeStore {
    async fn upsert_last_value(&self, reading: &Reading) -> Result<(), StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let record = LastValueRecord::from_reading(reading, now_epoch_ms());
        let data = serde_json::to_string(&record)?;
        let key = last_value_key(reading.tag_id);
        if let Some(ttl) = self.last_value_ttl_seconds {
            connection.set_ex::<_, _, ()>(key, data, ttl).await?;
        } else {
            connection.set::<_, _, ()>(key, data).await?;
        }
        Ok(())
    }

    async fn get_last_value(&self, tag_id: TagId) -> Result<Option<LastValueRecord>, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let data: Option<String> = connection.get(last_value_key(tag_id)).await?;
        let Some(data) = data else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&data)?))
    }
}
