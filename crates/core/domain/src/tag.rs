use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 点位标识。
pub type TagId = i64;

/// 最小扫描周期（毫秒）。
pub const MIN_SCAN_INTERVAL_MS: u64 = 100;

/// 默认扫描周期（毫秒）。
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 1000;

/// 点位数据来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[serde(alias = "simulator")]
    Simulated,
    #[serde(alias = "modbus")]
    ModbusTcp,
    #[serde(alias = "opc_ua")]
    Opcua,
    #[serde(alias = "mqtt")]
    MqttExternal,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Simulated,
        SourceKind::ModbusTcp,
        SourceKind::Opcua,
        SourceKind::MqttExternal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Simulated => "simulated",
            SourceKind::ModbusTcp => "modbus_tcp",
            SourceKind::Opcua => "opcua",
            SourceKind::MqttExternal => "mqtt_external",
        }
    }

    /// 是否由调度器轮询（外部 MQTT 为推送模式）。
    pub fn is_pollable(&self) -> bool {
        !matches!(self, SourceKind::MqttExternal)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知来源类型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source kind: {0}")]
pub struct UnknownSourceKind(pub String);

impl FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" | "simulator" => Ok(SourceKind::Simulated),
            "modbus_tcp" | "modbus" => Ok(SourceKind::ModbusTcp),
            "opcua" | "opc_ua" => Ok(SourceKind::Opcua),
            "mqtt_external" | "mqtt" => Ok(SourceKind::MqttExternal),
            other => Err(UnknownSourceKind(other.to_string())),
        }
    }
}

/// 点位声明的数据类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagDataType {
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "int")]
    Integer,
    #[default]
    #[serde(alias = "double", alias = "number")]
    Float,
}

impl TagDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagDataType::Boolean => "boolean",
            TagDataType::Integer => "integer",
            TagDataType::Float => "float",
        }
    }
}

impl FromStr for TagDataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(TagDataType::Boolean),
            "integer" | "int" => Ok(TagDataType::Integer),
            "float" | "double" | "number" => Ok(TagDataType::Float),
            other => Err(format!("unknown data type: {}", other)),
        }
    }
}

/// 采集点位配置（由外部配置源维护，核心只读）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub data_type: TagDataType,
    #[serde(alias = "source_protocol")]
    pub source_kind: SourceKind,
    /// 按来源类型解释的连接参数。
    #[serde(default)]
    pub connection_config: Map<String, Value>,
    #[serde(default = "default_scan_interval_ms", alias = "scan_rate_ms")]
    pub scan_interval_ms: u64,
    #[serde(default, alias = "mqtt_topic")]
    pub publish_topic: Option<String>,
    #[serde(default = "default_enabled", alias = "is_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub value_min: Option<f64>,
    #[serde(default)]
    pub value_max: Option<f64>,
}

fn default_scan_interval_ms() -> u64 {
    DEFAULT_SCAN_INTERVAL_MS
}

fn default_enabled() -> bool {
    true
}

impl Tag {
    /// 构造最小点位（其余字段取默认值）。
    pub fn new(id: TagId, name: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            unit: None,
            data_type: TagDataType::Float,
            source_kind,
            connection_config: Map::new(),
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            publish_topic: None,
            enabled: true,
            value_min: None,
            value_max: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.connection_config = map;
        }
        self
    }

    pub fn with_scan_interval_ms(mut self, scan_interval_ms: u64) -> Self {
        self.scan_interval_ms = scan_interval_ms;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.value_min = Some(min);
        self.value_max = Some(max);
        self
    }

    pub fn is_pollable(&self) -> bool {
        self.source_kind.is_pollable()
    }

    /// 实际扫描周期（下限 100ms）。
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(MIN_SCAN_INTERVAL_MS))
    }

    /// 内部总线 topic：显式配置优先，否则 `{namespace}/tags/{名称}`。
    pub fn internal_topic(&self, namespace: &str) -> String {
        if let Some(topic) = self.publish_topic.as_deref().filter(|topic| !topic.is_empty()) {
            return topic.to_string();
        }
        format!(
            "{}/tags/{}",
            namespace.trim_end_matches('/'),
            sanitize_topic_segment(&self.name)
        )
    }
}

/// 保留名称原样（topic 区分大小写），只把 MQTT 保留字符 `+` `#` `/` 替换为 `_`。
pub fn sanitize_topic_segment(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '+' | '#' | '/') { '_' } else { c })
        .collect()
}
