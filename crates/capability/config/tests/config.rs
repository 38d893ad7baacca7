use domain::SourceKind;
use scada_config::{AppConfig, ConfigError, load_tags_file, parse_tags};

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("SCADA_HTTP_ADDR", "127.0.0.1:8091");
        std::env::set_var("SCADA_MQTT_PORT", "1884");
        std::env::set_var("SCADA_SINK_BATCH_SIZE", "50");
        std::env::set_var("SCADA_STORE_BAD_QUALITY", "true");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8091");
    assert_eq!(config.mqtt_port, 1884);
    assert_eq!(config.sink_batch_size, 50);
    assert!(config.store_bad_quality);
    assert_eq!(config.bus_namespace, "scada");
    assert_eq!(config.reconnect_base_ms, 500);
    assert_eq!(config.reconnect_max_ms, 30_000);
    assert_eq!(config.degraded_after, 3);
}

#[test]
fn parse_tags_accepts_legacy_field_names() {
    let content = r#"[
        {"id": 1, "name": "Demo_Sinewave", "source_protocol": "simulator",
         "scan_rate_ms": 500, "connection_config": {"signal_type": "sine"}},
        {"id": 2, "name": "Boiler Temp", "source_kind": "modbus_tcp",
         "connection_config": {"host": "10.0.0.5", "register": 40001}}
    ]"#;
    let tags = parse_tags(content).expect("tags");
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].source_kind, SourceKind::Simulated);
    assert_eq!(tags[0].scan_interval_ms, 500);
    assert_eq!(tags[1].scan_interval_ms, 1000);
}

#[test]
fn parse_tags_rejects_duplicate_ids() {
    let content = r#"[
        {"id": 7, "name": "a", "source_kind": "simulated"},
        {"id": 7, "name": "b", "source_kind": "simulated"}
    ]"#;
    let err = parse_tags(content).expect_err("duplicate");
    assert!(err.contains("duplicate tag id 7"));
}

#[test]
fn missing_tags_file_is_reported() {
    let err = load_tags_file("/nonexistent/scada/tags.json").expect_err("missing");
    assert!(matches!(err, ConfigError::TagsFile(_, _)));
}
