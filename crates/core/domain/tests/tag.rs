use domain::{SourceKind, Tag, TagDataType};
use std::time::Duration;

#[test]
fn tag_deserializes_with_source_aliases() {
    let tag: Tag = serde_json::from_value(serde_json::json!({
        "id": 7,
        "name": "Demo_Sinewave",
        "source_protocol": "simulated",
        "connection_config": {"signal_type": "sine", "min": 0, "max": 100},
        "scan_rate_ms": 1000,
        "is_enabled": true
    }))
    .expect("tag");

    assert_eq!(tag.id, 7);
    assert_eq!(tag.source_kind, SourceKind::Simulated);
    assert_eq!(tag.data_type, TagDataType::Float);
    assert_eq!(tag.scan_interval(), Duration::from_millis(1000));
    assert!(tag.enabled);
    assert!(tag.is_pollable());
}

#[test]
fn source_kind_parses_legacy_names() {
    assert_eq!("modbus".parse::<SourceKind>().unwrap(), SourceKind::ModbusTcp);
    assert_eq!("simulator".parse::<SourceKind>().unwrap(), SourceKind::Simulated);
    assert_eq!("mqtt".parse::<SourceKind>().unwrap(), SourceKind::MqttExternal);
    assert!("bacnet".parse::<SourceKind>().is_err());
}

#[test]
fn tag_list_accepts_legacy_kind_and_type_names() {
    let tags: Vec<Tag> = serde_json::from_value(serde_json::json!([
        {"id": 1, "name": "a", "source_kind": "simulator", "data_type": "double"},
        {"id": 2, "name": "b", "source_kind": "modbus", "data_type": "int"},
        {"id": 3, "name": "c", "source_kind": "mqtt", "data_type": "bool"},
        {"id": 4, "name": "d", "source_kind": "opc_ua"}
    ]))
    .expect("tags");

    let kinds: Vec<SourceKind> = tags.iter().map(|tag| tag.source_kind).collect();
    assert_eq!(
        kinds,
        vec![
            SourceKind::Simulated,
            SourceKind::ModbusTcp,
            SourceKind::MqttExternal,
            SourceKind::Opcua
        ]
    );
    assert_eq!(tags[0].data_type, TagDataType::Float);
    assert_eq!(tags[1].data_type, TagDataType::Integer);
    assert_eq!(tags[2].data_type, TagDataType::Boolean);
    assert_eq!(
        serde_json::to_value(tags[1].source_kind).expect("serialize"),
        serde_json::json!("modbus_tcp")
    );
}

#[test]
fn internal_topic_keeps_name_case() {
    let tag = Tag::new(1, "Demo_Sinewave", SourceKind::Simulated);
    assert_eq!(tag.internal_topic("scada"), "scada/tags/Demo_Sinewave");

    let tag = Tag::new(1, "Tank 1/Level+#", SourceKind::Simulated);
    assert_eq!(tag.internal_topic("scada"), "scada/tags/Tank 1_Level__");

    let mut explicit = Tag::new(2, "Pump", SourceKind::Simulated);
    explicit.publish_topic = Some("plant/pump".to_string());
    assert_eq!(explicit.internal_topic("scada/"), "plant/pump");
}

#[test]
fn scan_interval_has_floor() {
    let tag = Tag::new(1, "fast", SourceKind::Simulated).with_scan_interval_ms(5);
    assert_eq!(tag.scan_interval(), Duration::from_millis(100));
}

#[test]
fn mqtt_external_is_not_pollable() {
    let tag = Tag::new(1, "esp32", SourceKind::MqttExternal);
    assert!(!tag.is_pollable());
}
