//! topic → 点位路由（支持 `+` / `#` 通配符）

use crate::decode::DecodeRule;
use domain::{SourceKind, Tag, TagId};
use scada_protocol::{ConfigError, MqttExternalConfig};
use std::collections::BTreeSet;

/// 单个外部点位的路由项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub tag_id: TagId,
    pub filter: String,
    pub rule: DecodeRule,
}

#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    routes: Vec<Route>,
}

impl TopicRouter {
    /// 由启用的 mqtt_external 点位构建；配置无效的点位单独返回。
    pub fn from_tags(tags: &[Tag]) -> (Self, Vec<(TagId, ConfigError)>) {
        let mut routes = Vec::new();
        let mut rejected = Vec::new();
        for tag in tags
            .iter()
            .filter(|tag| tag.enabled && tag.source_kind == SourceKind::MqttExternal)
        {
            match MqttExternalConfig::from_tag(tag) {
                Ok(config) => routes.push(Route {
                    tag_id: tag.id,
                    rule: DecodeRule::from_json_key(config.json_key.as_deref()),
                    filter: config.topic,
                }),
                Err(err) => rejected.push((tag.id, err)),
            }
        }
        (Self { routes }, rejected)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// 去重后的订阅过滤器
    pub fn filters(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|route| route.filter.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 匹配 topic 的全部路由（同一 topic 可映射多个点位）。
    pub fn resolve(&self, topic: &str) -> Vec<Route> {
        self.routes
            .iter()
            .filter(|route| topic_matches(&route.filter, topic))
            .cloned()
            .collect()
    }
}

/// MQTT 过滤器匹配：`+` 匹配一级，`#` 匹配其余所有级（含零级）。
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(level)) if expected == level => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_matching() {
        assert!(topic_matches("devices/+/humidity", "devices/esp32_01/humidity"));
        assert!(!topic_matches("devices/+/humidity", "devices/a/b/humidity"));
        assert!(topic_matches("devices/#", "devices"));
        assert!(topic_matches("devices/#", "devices/a/b"));
        assert!(topic_matches("sala1/temp", "sala1/temp"));
        assert!(!topic_matches("sala1/temp", "sala1/temp/x"));
        assert!(!topic_matches("sala1/temp/x", "sala1/temp"));
    }

    #[test]
    fn only_enabled_external_tags_are_routed() {
        let mut disabled = Tag::new(5, "Old Sensor", SourceKind::MqttExternal)
            .with_config(json!({"topic": "old/temp"}));
        disabled.enabled = false;
        let tags = vec![
            Tag::new(4, "Room Humidity", SourceKind::MqttExternal)
                .with_config(json!({"topic": "devices/+/humidity", "json_key": "data.humidity"})),
            Tag::new(6, "Room Humidity Raw", SourceKind::MqttExternal)
                .with_config(json!({"topic": "devices/+/humidity"})),
            Tag::new(7, "Broken", SourceKind::MqttExternal).with_config(json!({})),
            disabled,
            Tag::new(1, "Demo_Sinewave", SourceKind::Simulated),
        ];
        let (router, rejected) = TopicRouter::from_tags(&tags);
        assert_eq!(router.len(), 2);
        assert_eq!(router.filters(), vec!["devices/+/humidity".to_string()]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, 7);

        let routes = router.resolve("devices/esp32_01/humidity");
        assert_eq!(
            routes.iter().map(|route| route.tag_id).collect::<Vec<_>>(),
            vec![4, 6]
        );
        assert!(router.resolve("old/temp").is_empty());
    }
}
