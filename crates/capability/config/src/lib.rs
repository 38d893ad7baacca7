//! 应用运行配置加载。

use domain::Tag;
use std::env;
use std::path::Path;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("tags file {0}: {1}")]
    TagsFile(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub tags_file: Option<String>,
    pub tag_refresh_seconds: u64,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    pub mqtt_qos: u8,
    pub bus_namespace: String,
    pub listener_buffer: usize,
    pub read_timeout_cap_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub degraded_after: u32,
    pub sink_batch_size: usize,
    pub sink_buffer: usize,
    pub sink_flush_ms: u64,
    pub sink_max_retries: usize,
    pub sink_retry_backoff_ms: u64,
    pub store_bad_quality: bool,
    pub cache_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("SCADA_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
        let database_url = read_optional("SCADA_DATABASE_URL");
        let redis_url = read_optional("SCADA_REDIS_URL");
        let tags_file = read_optional("SCADA_TAGS_FILE");
        let tag_refresh_seconds = read_u64_with_default("SCADA_TAG_REFRESH_SECONDS", 10)?.max(1);
        let mqtt_host = env::var("SCADA_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("SCADA_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("SCADA_MQTT_USERNAME");
        let mqtt_password = read_optional("SCADA_MQTT_PASSWORD");
        let mqtt_client_id =
            env::var("SCADA_MQTT_CLIENT_ID").unwrap_or_else(|_| "scada-daq".to_string());
        let mqtt_qos = read_u8_with_default("SCADA_MQTT_QOS", 0)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "SCADA_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }
        let bus_namespace =
            env::var("SCADA_BUS_NAMESPACE").unwrap_or_else(|_| "scada".to_string());
        let listener_buffer = read_usize_with_default("SCADA_LISTENER_BUFFER", 1024)?.max(1);
        let read_timeout_cap_ms = read_u64_with_default("SCADA_READ_TIMEOUT_CAP_MS", 5000)?;
        let connect_timeout_ms = read_u64_with_default("SCADA_CONNECT_TIMEOUT_MS", 3000)?;
        let reconnect_base_ms = read_u64_with_default("SCADA_RECONNECT_BASE_MS", 500)?;
        let reconnect_max_ms = read_u64_with_default("SCADA_RECONNECT_MAX_MS", 30_000)?;
        let degraded_after = read_u32_with_default("SCADA_DEGRADED_AFTER", 3)?.max(1);
        let sink_batch_size = read_usize_with_default("SCADA_SINK_BATCH_SIZE", 500)?.max(1);
        let sink_buffer = read_usize_with_default("SCADA_SINK_BUFFER", 10_000)?.max(1);
        let sink_flush_ms = read_u64_with_default("SCADA_SINK_FLUSH_MS", 1000)?.max(1);
        let sink_max_retries = read_usize_with_default("SCADA_SINK_MAX_RETRIES", 3)?;
        let sink_retry_backoff_ms = read_u64_with_default("SCADA_SINK_RETRY_BACKOFF_MS", 200)?;
        let store_bad_quality = read_bool_with_default("SCADA_STORE_BAD_QUALITY", false);
        let cache_timeout_ms = read_u64_with_default("SCADA_CACHE_TIMEOUT_MS", 500)?;
        let shutdown_grace_ms = read_u64_with_default("SCADA_SHUTDOWN_GRACE_MS", 10_000)?;

        Ok(Self {
            http_addr,
            database_url,
            redis_url,
            tags_file,
            tag_refresh_seconds,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_qos,
            bus_namespace,
            listener_buffer,
            read_timeout_cap_ms,
            connect_timeout_ms,
            reconnect_base_ms,
            reconnect_max_ms,
            degraded_after,
            sink_batch_size,
            sink_buffer,
            sink_flush_ms,
            sink_max_retries,
            sink_retry_backoff_ms,
            store_bad_quality,
            cache_timeout_ms,
            shutdown_grace_ms,
        })
    }
}

/// 读取 JSON 点位文件（数组形式）。
pub fn load_tags_file(path: impl AsRef<Path>) -> Result<Vec<Tag>, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::TagsFile(display.clone(), err.to_string()))?;
    parse_tags(&content).map_err(|err| ConfigError::TagsFile(display, err))
}

/// 解析点位列表，拒绝重复 id。
pub fn parse_tags(content: &str) -> Result<Vec<Tag>, String> {
    let tags: Vec<Tag> = serde_json::from_str(content).map_err(|err| err.to_string())?;
    let mut seen = std::collections::HashSet::new();
    for tag in &tags {
        if !seen.insert(tag.id) {
            return Err(format!("duplicate tag id {}", tag.id));
        }
    }
    Ok(tags)
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
