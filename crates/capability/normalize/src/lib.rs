//! 读数标准化
//!
//! RawReading → Reading：按点位声明的数据类型强制转换，并做量程校验。
//! 类型不符、越界、非有限值都产出 quality=error 读数；
//! 只有引用了未知点位的读数会被拒绝。

use domain::{Quality, RawReading, RawValue, Reading, ReadingValue, Tag, TagDataType, TagId};
use scada_telemetry::TelemetryMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 规范化错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("unknown tag {0}")]
    UnknownTag(TagId),
    #[error("cannot coerce {value} to {expected}")]
    TypeMismatch { value: String, expected: &'static str },
    #[error("value {value} outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("value is not finite")]
    NonFinite,
}

/// 当前活动点位集合（可并发读，刷新时整体替换）。
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: Arc<RwLock<HashMap<TagId, Arc<Tag>>>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, tags: &[Tag]) {
        let next = tags
            .iter()
            .map(|tag| (tag.id, Arc::new(tag.clone())))
            .collect::<HashMap<_, _>>();
        *self.tags.write().await = next;
    }

    pub async fn get(&self, tag_id: TagId) -> Option<Arc<Tag>> {
        self.tags.read().await.get(&tag_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.tags.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tags.read().await.is_empty()
    }
}

#[derive(Clone)]
pub struct Normalizer {
    registry: TagRegistry,
    metrics: Arc<TelemetryMetrics>,
}

impl Normalizer {
    pub fn new(registry: TagRegistry, metrics: Arc<TelemetryMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// 解析点位并转换；未知点位计数后返回错误。
    pub async fn normalize(&self, raw: RawReading) -> Result<(Arc<Tag>, Reading), NormalizeError> {
        let Some(tag) = self.registry.get(raw.tag_id).await else {
            self.metrics.record_unknown_tag();
            debug!(target: "scada.pipeline", tag_id = raw.tag_id, "reading_unknown_tag");
            return Err(NormalizeError::UnknownTag(raw.tag_id));
        };
        let reading = coerce(&tag, raw);
        Ok((tag, reading))
    }
}

/// 按点位类型与量程转换一条原始读数。
pub fn coerce(tag: &Tag, raw: RawReading) -> Reading {
    let RawReading {
        tag_id,
        ts_ms,
        value,
        quality,
        error,
        metadata,
    } = raw;
    let mut reading = match (quality, value) {
        (Quality::Good, Some(value)) => match coerce_value(tag, &value) {
            Ok(value) => Reading::good(tag_id, ts_ms, value),
            Err(err) => Reading::error(tag_id, ts_ms, err.to_string()),
        },
        (Quality::Good, None) => Reading::error(tag_id, ts_ms, "missing value"),
        (Quality::Stale, _) => Reading {
            tag_id,
            ts_ms,
            value: None,
            quality: Quality::Stale,
            error: None,
            metadata: None,
        },
        (Quality::Error, _) => {
            Reading::error(tag_id, ts_ms, error.unwrap_or_else(|| "read failed".to_string()))
        }
    };
    reading.metadata = metadata;
    reading
}

fn coerce_value(tag: &Tag, value: &RawValue) -> Result<ReadingValue, NormalizeError> {
    let coerced = match tag.data_type {
        TagDataType::Boolean => ReadingValue::Bool(to_bool(value)?),
        TagDataType::Integer => ReadingValue::Number(to_number(value)?.round()),
        TagDataType::Float => ReadingValue::Number(to_number(value)?),
    };
    if let ReadingValue::Number(number) = coerced {
        check_range(tag, number)?;
    }
    Ok(coerced)
}

fn to_number(value: &RawValue) -> Result<f64, NormalizeError> {
    let number = match value {
        RawValue::Number(v) => *v,
        RawValue::Integer(v) => *v as f64,
        RawValue::Bool(v) => {
            if *v {
                1.0
            } else {
                0.0
            }
        }
        RawValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| mismatch(value, "number"))?,
    };
    if !number.is_finite() {
        return Err(NormalizeError::NonFinite);
    }
    Ok(number)
}

fn to_bool(value: &RawValue) -> Result<bool, NormalizeError> {
    match value {
        RawValue::Bool(v) => Ok(*v),
        RawValue::Integer(0) => Ok(false),
        RawValue::Integer(1) => Ok(true),
        RawValue::Number(v) if *v == 0.0 => Ok(false),
        RawValue::Number(v) if *v == 1.0 => Ok(true),
        RawValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(true),
            "false" | "0" | "off" => Ok(false),
            _ => Err(mismatch(value, "boolean")),
        },
        _ => Err(mismatch(value, "boolean")),
    }
}

fn check_range(tag: &Tag, value: f64) -> Result<(), NormalizeError> {
    let min = tag.value_min.unwrap_or(f64::NEG_INFINITY);
    let max = tag.value_max.unwrap_or(f64::INFINITY);
    if value < min || value > max {
        return Err(NormalizeError::OutOfRange { value, min, max });
    }
    Ok(())
}

fn mismatch(value: &RawValue, expected: &'static str) -> NormalizeError {
    NormalizeError::TypeMismatch {
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::SourceKind;

    fn tag(data_type: TagDataType) -> Tag {
        let mut tag = Tag::new(1, "t", SourceKind::Simulated);
        tag.data_type = data_type;
        tag
    }

    #[test]
    fn float_accepts_numeric_forms() {
        let tag = tag(TagDataType::Float);
        for (raw, expected) in [
            (RawValue::Number(2.5), 2.5),
            (RawValue::Integer(3), 3.0),
            (RawValue::Bool(true), 1.0),
            (RawValue::Text(" 4.25 ".to_string()), 4.25),
        ] {
            let reading = coerce(&tag, RawReading::good(1, 10, raw));
            assert_eq!(reading.value, Some(ReadingValue::Number(expected)));
        }
    }

    #[test]
    fn integer_rounds_and_boolean_is_strict() {
        let reading = coerce(&tag(TagDataType::Integer), RawReading::good(1, 10, RawValue::Number(2.6)));
        assert_eq!(reading.value, Some(ReadingValue::Number(3.0)));

        let boolean = tag(TagDataType::Boolean);
        let reading = coerce(&boolean, RawReading::good(1, 10, RawValue::Integer(1)));
        assert_eq!(reading.value, Some(ReadingValue::Bool(true)));
        let reading = coerce(&boolean, RawReading::good(1, 10, RawValue::Number(0.5)));
        assert_eq!(reading.quality, Quality::Error);
        assert_eq!(reading.value, None);
    }

    #[test]
    fn non_finite_and_text_garbage_become_errors() {
        let tag = tag(TagDataType::Float);
        let reading = coerce(&tag, RawReading::good(1, 10, RawValue::Number(f64::NAN)));
        assert_eq!(reading.error.as_deref(), Some("value is not finite"));
        let reading = coerce(&tag, RawReading::good(1, 10, RawValue::Text("abc".to_string())));
        assert!(reading.is_error());
    }
}
