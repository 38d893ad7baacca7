use crate::tag::TagId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 读数质量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Stale,
    Error,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Stale => "stale",
            Quality::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "good" => Some(Quality::Good),
            "stale" => Some(Quality::Stale),
            "error" => Some(Quality::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 协议层返回的原始值（未做类型强制）。
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(v) => write!(f, "{}", v),
            RawValue::Integer(v) => write!(f, "{}", v),
            RawValue::Bool(v) => write!(f, "{}", v),
            RawValue::Text(v) => f.write_str(v),
        }
    }
}

/// 协议层/监听器产出的原始读数。
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub tag_id: TagId,
    /// 采集时间（能确定时为源端时间，否则为接收时间）。
    pub ts_ms: i64,
    pub value: Option<RawValue>,
    pub quality: Quality,
    /// 失败原因（quality=error 时）。
    pub error: Option<String>,
    pub metadata: Option<Value>,
}

impl RawReading {
    pub fn good(tag_id: TagId, ts_ms: i64, value: RawValue) -> Self {
        Self {
            tag_id,
            ts_ms,
            value: Some(value),
            quality: Quality::Good,
            error: None,
            metadata: None,
        }
    }

    pub fn error(tag_id: TagId, ts_ms: i64, reason: impl Into<String>) -> Self {
        Self {
            tag_id,
            ts_ms,
            value: None,
            quality: Quality::Error,
            error: Some(reason.into()),
            metadata: None,
        }
    }

    pub fn stale(tag_id: TagId, ts_ms: i64) -> Self {
        Self {
            tag_id,
            ts_ms,
            value: None,
            quality: Quality::Stale,
            error: None,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// 规范化后的值：数值统一为 f64，布尔保持布尔。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Bool(bool),
}

impl ReadingValue {
    /// 数值表示（布尔映射为 1/0）。
    pub fn as_f64(&self) -> f64 {
        match self {
            ReadingValue::Number(v) => *v,
            ReadingValue::Bool(true) => 1.0,
            ReadingValue::Bool(false) => 0.0,
        }
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Number(v) => write!(f, "{}", v),
            ReadingValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// 规范化读数（创建后不可变）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub tag_id: TagId,
    pub ts_ms: i64,
    pub value: Option<ReadingValue>,
    pub quality: Quality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Reading {
    pub fn good(tag_id: TagId, ts_ms: i64, value: ReadingValue) -> Self {
        Self {
            tag_id,
            ts_ms,
            value: Some(value),
            quality: Quality::Good,
            error: None,
            metadata: None,
        }
    }

    /// error 读数不携带值。
    pub fn error(tag_id: TagId, ts_ms: i64, reason: impl Into<String>) -> Self {
        Self {
            tag_id,
            ts_ms,
            value: None,
            quality: Quality::Error,
            error: Some(reason.into()),
            metadata: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.quality == Quality::Error
    }
}

/// 当前 Unix 时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
