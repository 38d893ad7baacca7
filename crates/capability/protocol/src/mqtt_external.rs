//! 外部 MQTT 设备
//!
//! 推送模式：值只经由外部监听器到达，桥接本身不轮询。

use crate::conn_config::ConfigReader;
use crate::error::ConfigError;
use domain::{RawReading, Tag, TagId, now_epoch_ms};

/// 外部 MQTT 点位配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttExternalConfig {
    /// 订阅 topic（可含 `+` / `#` 通配符）
    pub topic: String,
    /// JSON payload 中的字段路径（`a.b.c`）；为空时按纯文本解析
    pub json_key: Option<String>,
}

impl MqttExternalConfig {
    pub fn from_tag(tag: &Tag) -> Result<Self, ConfigError> {
        let reader = ConfigReader::new(tag);
        let topic = reader.required_str(&["topic", "mqtt_topic"])?;
        validate_filter(topic).map_err(|reason| reader.invalid("topic", reason))?;
        let json_key = reader
            .optional_str(&["json_key", "value_key"])?
            .map(str::to_string);
        if let Some(key) = &json_key {
            if key.split('.').any(str::is_empty) {
                return Err(reader.invalid("json_key", "empty path segment"));
            }
        }
        Ok(Self {
            topic: topic.to_string(),
            json_key,
        })
    }
}

/// 校验订阅过滤器：`#` 只能作为最后一级，通配符必须独占一级。
pub fn validate_filter(filter: &str) -> Result<(), String> {
    if filter.is_empty() {
        return Err("empty topic".to_string());
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || index != levels.len() - 1) {
            return Err("`#` must be the last level".to_string());
        }
        if level.contains('+') && *level != "+" {
            return Err("`+` must occupy a whole level".to_string());
        }
    }
    Ok(())
}

pub struct MqttExternalBridge {
    tag_id: TagId,
    config: MqttExternalConfig,
}

impl MqttExternalBridge {
    pub fn new(tag_id: TagId, config: MqttExternalConfig) -> Self {
        Self { tag_id, config }
    }

    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    pub fn config(&self) -> &MqttExternalConfig {
        &self.config
    }

    /// 不参与调度；被调用时返回 stale 读数。
    pub fn read(&self) -> RawReading {
        RawReading::stale(self.tag_id, now_epoch_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::SourceKind;
    use serde_json::json;

    #[test]
    fn filter_validation() {
        assert!(validate_filter("devices/+/humidity").is_ok());
        assert!(validate_filter("devices/#").is_ok());
        assert!(validate_filter("devices/#/x").is_err());
        assert!(validate_filter("devices/a+").is_err());
        assert!(validate_filter("").is_err());
    }

    #[test]
    fn topic_is_required() {
        let tag = Tag::new(4, "h", SourceKind::MqttExternal).with_config(json!({"json_key": "v"}));
        let err = MqttExternalConfig::from_tag(&tag).unwrap_err();
        assert_eq!(err.field(), Some("topic"));
    }

    #[test]
    fn json_key_path_is_checked() {
        let tag = Tag::new(4, "h", SourceKind::MqttExternal)
            .with_config(json!({"topic": "a/b", "json_key": "data..value"}));
        let err = MqttExternalConfig::from_tag(&tag).unwrap_err();
        assert_eq!(err.field(), Some("json_key"));
    }
}
