//! 存储层数据模型

use domain::{Quality, Reading, ReadingValue, TagId};
use serde::{Deserialize, Serialize};

/// 点位最新值记录（last_value 缓存）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastValueRecord {
    pub tag_id: TagId,
    pub ts_ms: i64,
    pub value: Option<ReadingValue>,
    pub quality: Quality,
    /// 写入缓存的时间。
    pub updated_at_ms: i64,
}

impl LastValueRecord {
    pub fn from_reading(reading: &Reading, updated_at_ms: i64) -> Self {
        Self {
            tag_id: reading.tag_id,
            ts_ms: reading.ts_ms,
            value: reading.value,
            quality: reading.quality,
            updated_at_ms,
        }
    }
}
