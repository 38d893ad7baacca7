//! Postgres 时序写入实现

use crate::error::StorageError;
use crate::traits::ReadingStore;
use domain::{Quality, Reading, ReadingValue, TagId};
use sqlx::{PgPool, Row};

pub struct PgReadingStore {
    pub pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

/// 拆分为 (数值列, 布尔列)。
fn split_value(value: Option<ReadingValue>) -> (Option<f64>, Option<bool>) {
    match value {
        Some(ReadingValue::Number(v)) => (Some(v), None),
        Some(ReadingValue::Bool(v)) => (None, Some(v)),
        None => (None, None),
    }
}

fn join_value(number: Option<f64>, flag: Option<bool>) -> Option<ReadingValue> {
    match (number, flag) {
        (_, Some(v)) => Some(ReadingValue::Bool(v)),
        (Some(v), None) => Some(ReadingValue::Number(v)),
        (None, None) => None,
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn append_readings(&self, readings: &[Reading]) -> Result<usize, StorageError> {
        if readings.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for reading in readings {
            let (number, flag) = split_value(reading.value);
            let metadata = match &reading.metadata {
                Some(value) => Some(serde_json::to_string(value)?),
                None => None,
            };
            sqlx::query(
                "insert into metrics (tag_id, ts, value, value_bool, quality, error, metadata) \
                 values ($1, to_timestamp($2 / 1000.0), $3, $4, $5, $6, $7::jsonb) \
                 on conflict (tag_id, ts) do nothing",
            )
            .bind(reading.tag_id)
            .bind(reading.ts_ms as f64)
            .bind(number)
            .bind(flag)
            .bind(reading.quality.as_str())
            .bind(&reading.error)
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
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
        let rows = sqlx::query(
            "select tag_id, (extract(epoch from ts) * 1000)::bigint as ts_ms, \
             value, value_bool, quality, error, metadata::text as metadata \
             from metrics \
             where tag_id = $1 \
             and ($2::bigint is null or ts >= to_timestamp($2 / 1000.0)) \
             and ($3::bigint is null or ts <= to_timestamp($3 / 1000.0)) \
             order by ts asc \
             limit $4",
        )
        .bind(tag_id)
        .bind(from_ms)
        .bind(to_ms)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let quality: String = row.try_get("quality")?;
            let metadata: Option<String> = row.try_get("metadata")?;
            let metadata = match metadata {
                Some(text) => Some(serde_json::from_str(&text)?),
                None => None,
            };
            items.push(Reading {
                tag_id: row.try_get("tag_id")?,
                ts_ms: row.try_get("ts_ms")?,
                value: join_value(row.try_get("value")?, row.try_get("value_bool")?),
                quality: Quality::parse(&quality)
                    .ok_or_else(|| StorageError::new(format!("invalid quality: {}", quality)))?,
                error: row.try_get("error")?,
                metadata,
            });
        }
        Ok(items)
    }
}
