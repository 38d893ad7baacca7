//! Postgres 点位配置读取

use crate::error::StorageError;
use crate::traits::TagStore;
use domain::{SourceKind, Tag, TagDataType, TagId};
use scada_telemetry::TelemetryMetrics;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

pub struct PgTagStore {
    pub pool: PgPool,
    metrics: Arc<TelemetryMetrics>,
}

impl PgTagStore {
    pub fn new(pool: PgPool, metrics: Arc<TelemetryMetrics>) -> Self {
        Self { pool, metrics }
    }
}

fn tag_from_row(row: &PgRow) -> Result<Tag, StorageError> {
    let source_kind: String = row.try_get("source_kind")?;
    let source_kind = source_kind
        .parse::<SourceKind>()
        .map_err(|err| StorageError::new(err.to_string()))?;
    let data_type: Option<String> = row.try_get("data_type")?;
    let data_type = match data_type {
        Some(value) => value.parse::<TagDataType>().map_err(StorageError::new)?,
        None => TagDataType::default(),
    };
    let config: Option<String> = row.try_get("connection_config")?;
    let connection_config = match config {
        Some(text) => match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => map,
            _ => return Err(StorageError::new("connection_config is not an object")),
        },
        None => Map::new(),
    };
    let scan_interval_ms: i64 = row.try_get("scan_interval_ms")?;
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        unit: row.try_get("unit")?,
        data_type,
        source_kind,
        connection_config,
        scan_interval_ms: scan_interval_ms.max(0) as u64,
        publish_topic: row.try_get("publish_topic")?,
        enabled: row.try_get("enabled")?,
        value_min: row.try_get("value_min")?,
        value_max: row.try_get("value_max")?,
    })
}

#[async_trait::async_trait]
impl TagStore for PgTagStore {
    async fn list_tags(&self) -> Result<Vec<Tag>, StorageError> {
        let rows = sqlx::query(
            "select id, name, description, unit, data_type, source_kind, \
             connection_config::text as connection_config, scan_interval_ms, \
             publish_topic, enabled, value_min, value_max \
             from tags order by id",
        )
        .fetch_all(&self.pool)
        .await?;
        let parsed = rows
            .iter()
            .map(|row| (row.try_get::<TagId, _>("id").unwrap_or_default(), tag_from_row(row)))
            .collect();
        Ok(keep_valid(parsed, &self.metrics))
    }
}

/// 单个点位配置损坏不影响其余点位；损坏行记日志并计入 `tags_invalid`。
fn keep_valid(
    parsed: Vec<(TagId, Result<Tag, StorageError>)>,
    metrics: &TelemetryMetrics,
) -> Vec<Tag> {
    let mut tags = Vec::with_capacity(parsed.len());
    for (tag_id, result) in parsed {
        match result {
            Ok(tag) => tags.push(tag),
            Err(err) => {
                metrics.record_tag_invalid();
                tracing::warn!(
                    target: "scada.storage",
                    tag_id,
                    error = %err,
                    "tag_row_invalid"
                );
            }
        }
    }
    tags
}
