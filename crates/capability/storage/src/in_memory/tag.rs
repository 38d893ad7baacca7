//! 点位配置内存实现

use crate::error::StorageError;
use crate::traits::TagStore;
use domain::Tag;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 点位配置内存存储（可由点位文件初始化）。
#[derive(Default)]
pub struct InMemoryTagStore {
    tags: RwLock<BTreeMap<i64, Tag>>,
}

impl InMemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(tags: Vec<Tag>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.tags.write() {
            for tag in tags {
                map.insert(tag.id, tag);
            }
        }
        store
    }

    /// 新增或覆盖点位。
    pub fn upsert(&self, tag: Tag) -> Result<(), StorageError> {
        let mut tags = self
            .tags
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        tags.insert(tag.id, tag);
        Ok(())
    }

    pub fn remove(&self, tag_id: i64) -> Result<bool, StorageError> {
        let mut tags = self
            .tags
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(tags.remove(&tag_id).is_some())
    }
}

#[async_trait::async_trait]
impl TagStore for InMemoryTagStore {
    async fn list_tags(&self) -> Result<Vec<Tag>, StorageError> {
        let tags = self
            .tags
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(tags.values().cloned().collect())
    }
}
