//! 点位状态看板

use domain::{Quality, SourceKind, TagId};
use scada_protocol::BridgeHealth;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// 等待下一节拍
    Idle,
    /// 读取或交付中
    Reading,
    /// 连接配置无效，未调度
    Invalid,
}

/// 单个点位的调度状态
#[derive(Debug, Clone, Serialize)]
pub struct TagStatus {
    pub tag_id: TagId,
    pub tag_name: String,
    pub source_kind: SourceKind,
    pub scan_interval_ms: u64,
    pub state: CycleState,
    pub health: BridgeHealth,
    pub cycles: u64,
    pub cycles_skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_quality: Option<Quality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ts_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// 区分同一点位前后两代 worker
    #[serde(skip)]
    pub(crate) generation: u64,
}

/// 所有调度点位的状态（可克隆，共享同一份数据）。
#[derive(Debug, Clone, Default)]
pub struct TagStatusBoard {
    inner: Arc<RwLock<BTreeMap<TagId, TagStatus>>>,
}

impl TagStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按 tag_id 排序的快照。
    pub async fn snapshot(&self) -> Vec<TagStatus> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn get(&self, tag_id: TagId) -> Option<TagStatus> {
        self.inner.read().await.get(&tag_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub(crate) async fn insert(&self, status: TagStatus) {
        self.inner.write().await.insert(status.tag_id, status);
    }

    pub(crate) async fn remove(&self, tag_id: TagId) {
        self.inner.write().await.remove(&tag_id);
    }

    /// 仅更新同代条目；已被替换或移除的 worker 的迟到更新直接忽略。
    pub(crate) async fn update(
        &self,
        tag_id: TagId,
        generation: u64,
        apply: impl FnOnce(&mut TagStatus),
    ) {
        let mut inner = self.inner.write().await;
        if let Some(status) = inner.get_mut(&tag_id)
            && status.generation == generation
        {
            apply(status);
        }
    }
}
