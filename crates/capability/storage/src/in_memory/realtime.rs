//! 最新值缓存内存实现

use crate::error::StorageError;
use crate::models::LastValueRecord;
use crate::traits::RealtimeStore;
use domain::{Reading, TagId, now_epoch_ms};
use std::collections::HashMap;
use std::sync::RwLock;

/// 最新值内存存储
#[derive(Default)]
pub struct InMemoryRealtimeStore {
    last_values: RwLock<HashMap<TagId, LastValueRecord>>,
}

impl InMemoryRealtimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// last_value 数量（用于测试）
    pub fn len(&self) -> usize {
        self.last_values.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl RealtimeStore for InMemoryRealtimeStore {
    async fn upsert_last_value(&self, reading: &Reading) -> Result<(), StorageError> {
        let mut values = self
            .last_values
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let record = LastValueRecord::from_reading(reading, now_epoch_ms());
        match values.get(&reading.tag_id) {
            // 乱序到达的旧读数不覆盖新值
            Some(existing) if existing.ts_ms > reading.ts_ms => {}
            _ => {
                values.insert(reading.tag_id, record);
            }
        }
        Ok(())
    }

    async fn get_last_value(&self, tag_id: TagId) -> Result<Option<LastValueRecord>, StorageError> {
        let values = self
            .last_values
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(values.get(&tag_id).cloned())
    }
}
