//! 时序读数内存实现

use crate::error::StorageError;
use crate::traits::ReadingStore;
use domain::{Reading, TagId};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 时序读数内存存储（按 (tag_id, ts_ms) 去重，先到者保留）。
#[derive(Default)]
pub struct InMemoryReadingStore {
    values: RwLock<BTreeMap<(TagId, i64), Reading>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前累计的读数数量（用于测试）
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn append_readings(&self, readings: &[Reading]) -> Result<usize, StorageError> {
        let mut store = self
            .values
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        for reading in readings {
            store
                .entry((reading.tag_id, reading.ts_ms))
                .or_insert_with(|| reading.clone());
        }
        Ok(readings.len())
    }

    async fn query_readings(
        &self,
        tag_id: TagId,
        from_ms: Option<i64>,
        to_ms: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Reading>, StorageError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let values = self
            .values
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let start = (tag_id, from_ms.unwrap_or(i64::MIN));
        let end = (tag_id, to_ms.unwrap_or(i64::MAX));
        if start > end {
            return Ok(Vec::new());
        }
        Ok(values
            .range(start..=end)
            .map(|(_, reading)| reading.clone())
            .take(limit as usize)
            .collect())
    }
}
