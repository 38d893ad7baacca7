//! 存储接口定义
//!
//! - ReadingStore：时序读数追加与历史查询
//! - TagStore：点位配置读取（核心只读）
//! - RealtimeStore：点位最新值缓存

use crate::error::StorageError;
use crate::models::LastValueRecord;
use async_trait::async_trait;
use domain::{Reading, Tag, TagId};

/// 时序读数存储。
///
/// 以 (tag_id, ts) 为键追加写入；乱序与重复写入不报错。
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// 批量追加，返回提交的条数。
    async fn append_readings(&self, readings: &[Reading]) -> Result<usize, StorageError>;

    /// 按时间升序查询某点位的历史读数（limit <= 0 返回空）。
    async fn query_readings(
        &self,
        tag_id: TagId,
        from_ms: Option<i64>,
        to_ms: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Reading>, StorageError>;
}

/// 点位配置来源。
#[async_trait]
pub trait TagStore: Send + Sync {
    /// 返回全部点位（含禁用点位），按 id 升序。
    async fn list_tags(&self) -> Result<Vec<Tag>, StorageError>;
}

/// 最新值缓存。
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn upsert_last_value(&self, reading: &Reading) -> Result<(), StorageError>;

    async fn get_last_value(&self, tag_id: TagId) -> Result<Option<LastValueRecord>, StorageError>;
}
