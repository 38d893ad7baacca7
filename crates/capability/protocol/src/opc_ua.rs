//! OPC UA 桥接
//!
//! opcua 客户端为同步 API，连接与读取都放在 `spawn_blocking` 中执行。

use crate::conn_config::ConfigReader;
use crate::error::{ConfigError, ProtocolError};
use crate::health::{
    BridgeHealth, ConnectionHealth, ReconnectPolicy, SESSION_CLOSE_LIMIT, close_within,
};
use crate::types::apply_scaling;
use async_trait::async_trait;
use domain::{RawReading, RawValue, Tag, TagId, now_epoch_ms};
use opcua::client::prelude::{
    AttributeId, AttributeService, ClientBuilder, DataValue, EndpointDescription, IdentityToken,
    MessageSecurityMode, NodeId, QualifiedName, ReadValueId, SecurityPolicy, Session, StatusCode,
    TimestampsToReturn, UAString, UserTokenPolicy, Variant,
};
use opcua::sync::RwLock;
use scada_telemetry::TelemetryMetrics;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// OPC UA 点位配置
#[derive(Debug, Clone, PartialEq)]
pub struct OpcUaConfig {
    pub url: String,
    pub node_id: NodeId,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scale: f64,
    pub offset: f64,
}

impl OpcUaConfig {
    pub fn from_tag(tag: &Tag) -> Result<Self, ConfigError> {
        let reader = ConfigReader::new(tag);
        let url = reader.required_str(&["url", "endpoint", "endpoint_url"])?;
        if !url.starts_with("opc.tcp://") {
            return Err(reader.invalid("url", "must start with opc.tcp://"));
        }
        let node_text = reader.required_str(&["node_id", "node"])?;
        let node_id = NodeId::from_str(node_text)
            .map_err(|_| reader.invalid("node_id", format!("cannot parse `{}`", node_text)))?;
        let username = reader.optional_str(&["username", "user"])?.map(str::to_string);
        let password = reader.optional_str(&["password"])?.map(str::to_string);
        if username.is_some() != password.is_some() {
            let field = if username.is_some() { "password" } else { "username" };
            return Err(reader.missing(field));
        }
        Ok(Self {
            url: url.to_string(),
            node_id,
            username,
            password,
            scale: reader.f64_or(&["scale"], 1.0)?,
            offset: reader.f64_or(&["offset"], 0.0)?,
        })
    }
}

/// 单次读取结果
#[derive(Debug, Clone, PartialEq)]
pub struct OpcUaSample {
    pub value: Option<RawValue>,
    /// 非 Good 状态码的文本
    pub bad_status: Option<String>,
    pub source_ts_ms: Option<i64>,
}

/// 已建立的 OPC UA 会话
#[async_trait]
pub trait OpcUaSession: Send {
    async fn read_value(&mut self, node_id: &NodeId) -> Result<OpcUaSample, ProtocolError>;

    async fn close(&mut self) {}
}

/// 建立 OPC UA 会话
#[async_trait]
pub trait OpcUaConnector: Send + Sync {
    async fn connect(&self, config: &OpcUaConfig) -> Result<Box<dyn OpcUaSession>, ProtocolError>;
}

/// 基于 opcua 客户端的连接器（SecurityPolicy::None）
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientOpcUaConnector;

struct ClientSession {
    session: Arc<RwLock<Session>>,
}

#[async_trait]
impl OpcUaConnector for ClientOpcUaConnector {
    async fn connect(&self, config: &OpcUaConfig) -> Result<Box<dyn OpcUaSession>, ProtocolError> {
        let config = config.clone();
        let session = tokio::task::spawn_blocking(move || connect_blocking(&config))
            .await
            .map_err(|e| ProtocolError::Connection(format!("connect task failed: {}", e)))??;
        Ok(Box::new(ClientSession { session }))
    }
}

fn connect_blocking(config: &OpcUaConfig) -> Result<Arc<RwLock<Session>>, ProtocolError> {
    // 重连由桥接自身的退避策略负责
    let mut client = ClientBuilder::new()
        .application_name("scada-daq")
        .application_uri("urn:scada-daq")
        .product_uri("urn:scada-daq")
        .trust_server_certs(true)
        .create_sample_keypair(false)
        .session_retry_limit(0)
        .client()
        .ok_or_else(|| ProtocolError::Connection("invalid opcua client config".to_string()))?;
    let endpoint: EndpointDescription = (
        config.url.as_str(),
        SecurityPolicy::None.to_str(),
        MessageSecurityMode::None,
        UserTokenPolicy::anonymous(),
    )
        .into();
    let identity = match (&config.username, &config.password) {
        (Some(user), Some(pass)) => IdentityToken::UserName(user.clone(), pass.clone()),
        _ => IdentityToken::Anonymous,
    };
    client
        .connect_to_endpoint(endpoint, identity)
        .map_err(|status| ProtocolError::Connection(format!("{}: {:?}", config.url, status)))
}

#[async_trait]
impl OpcUaSession for ClientSession {
    async fn read_value(&mut self, node_id: &NodeId) -> Result<OpcUaSample, ProtocolError> {
        let session = self.session.clone();
        let request = ReadValueId {
            node_id: node_id.clone(),
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            data_encoding: QualifiedName::null(),
        };
        let results = tokio::task::spawn_blocking(move || {
            let session = session.read();
            session.read(&[request], TimestampsToReturn::Source, 0.0)
        })
        .await
        .map_err(|e| ProtocolError::Connection(format!("read task failed: {}", e)))?
        .map_err(|status| ProtocolError::Connection(format!("read service: {:?}", status)))?;

        let data = results
            .into_iter()
            .next()
            .ok_or_else(|| ProtocolError::DataParse("empty read response".to_string()))?;
        sample_from_data_value(data)
    }

    async fn close(&mut self) {
        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || session.write().disconnect()).await;
    }
}

fn sample_from_data_value(data: DataValue) -> Result<OpcUaSample, ProtocolError> {
    let source_ts_ms = data
        .source_timestamp
        .as_ref()
        .map(|ts| ts.as_chrono().timestamp_millis());
    let status = data.status.unwrap_or(StatusCode::Good);
    if !status.is_good() {
        return Ok(OpcUaSample {
            value: None,
            bad_status: Some(format!("{:?}", status)),
            source_ts_ms,
        });
    }
    let value = match data.value {
        Some(variant) => Some(variant_to_raw(variant)?),
        None => None,
    };
    Ok(OpcUaSample {
        value,
        bad_status: None,
        source_ts_ms,
    })
}

fn variant_to_raw(variant: Variant) -> Result<RawValue, ProtocolError> {
    let value = match variant {
        Variant::Boolean(v) => RawValue::Bool(v),
        Variant::SByte(v) => RawValue::Integer(v as i64),
        Variant::Byte(v) => RawValue::Integer(v as i64),
        Variant::Int16(v) => RawValue::Integer(v as i64),
        Variant::UInt16(v) => RawValue::Integer(v as i64),
        Variant::Int32(v) => RawValue::Integer(v as i64),
        Variant::UInt32(v) => RawValue::Integer(v as i64),
        Variant::Int64(v) => RawValue::Integer(v),
        Variant::UInt64(v) => RawValue::Number(v as f64),
        Variant::Float(v) => RawValue::Number(v as f64),
        Variant::Double(v) => RawValue::Number(v),
        Variant::String(v) => RawValue::Text(v.value().clone().unwrap_or_default()),
        other => {
            return Err(ProtocolError::DataParse(format!(
                "unsupported variant {:?}",
                other
            )));
        }
    };
    Ok(value)
}

/// OPC UA 桥接
pub struct OpcUaBridge {
    tag_id: TagId,
    config: OpcUaConfig,
    connector: Arc<dyn OpcUaConnector>,
    session: Option<Box<dyn OpcUaSession>>,
    health: ConnectionHealth,
    metrics: Arc<TelemetryMetrics>,
    attempted: bool,
}

impl OpcUaBridge {
    pub fn new(
        tag_id: TagId,
        config: OpcUaConfig,
        connector: Arc<dyn OpcUaConnector>,
        policy: ReconnectPolicy,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        Self {
            tag_id,
            config,
            connector,
            session: None,
            health: ConnectionHealth::new(policy),
            metrics,
            attempted: false,
        }
    }

    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    pub fn config(&self) -> &OpcUaConfig {
        &self.config
    }

    pub fn health(&self) -> BridgeHealth {
        self.health.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub async fn connect(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        if self.session.is_some() {
            return Ok(());
        }
        if let Some(wait) = self.health.wait_remaining(Instant::now()) {
            return Err(ProtocolError::Backoff(wait.as_millis() as u64));
        }
        if self.attempted {
            self.metrics.record_reconnect();
        }
        self.attempted = true;

        let result = match tokio::time::timeout(timeout, self.connector.connect(&self.config)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout(format!(
                "connect to {} after {} ms",
                self.config.url,
                timeout.as_millis()
            ))),
        };
        match result {
            Ok(session) => {
                self.session = Some(session);
                self.health.on_connected();
                info!(
                    target: "scada.bridge",
                    tag_id = self.tag_id,
                    endpoint = %self.config.url,
                    "bridge_connected"
                );
                Ok(())
            }
            Err(err) => {
                let failures = self.health.consecutive_failures() + 1;
                if self.health.on_connect_failure(err.to_string(), Instant::now()) {
                    self.metrics.record_degraded();
                    warn!(
                        target: "scada.bridge",
                        tag_id = self.tag_id,
                        endpoint = %self.config.url,
                        failures,
                        error = %err,
                        "bridge_degraded"
                    );
                } else {
                    warn!(
                        target: "scada.bridge",
                        tag_id = self.tag_id,
                        endpoint = %self.config.url,
                        failures,
                        error = %err,
                        "bridge_connect_failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// 读取一次；源端时间戳可用时作为采集时间。
    pub async fn read(&mut self, timeout: Duration) -> RawReading {
        match self.try_read(timeout).await {
            Ok(sample) => self.reading_from_sample(sample),
            Err(err) => {
                if err.is_transport() {
                    self.drop_session(&err, timeout).await;
                }
                RawReading::error(self.tag_id, now_epoch_ms(), err.to_string())
            }
        }
    }

    async fn try_read(&mut self, timeout: Duration) -> Result<OpcUaSample, ProtocolError> {
        self.connect(timeout).await?;
        let node_id = &self.config.node_id;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ProtocolError::Connection("session not established".to_string()))?;
        match tokio::time::timeout(timeout, session.read_value(node_id)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_read_timeout();
                Err(ProtocolError::Timeout(format!(
                    "read {} after {} ms",
                    node_id,
                    timeout.as_millis()
                )))
            }
        }
    }

    fn reading_from_sample(&mut self, sample: OpcUaSample) -> RawReading {
        let ts_ms = sample.source_ts_ms.unwrap_or_else(now_epoch_ms);
        if let Some(status) = sample.bad_status {
            // 会话正常，节点状态不良
            self.health.on_read_success();
            return RawReading::error(self.tag_id, ts_ms, format!("bad status: {}", status));
        }
        let Some(value) = sample.value else {
            return RawReading::error(self.tag_id, ts_ms, "empty value");
        };
        self.health.on_read_success();
        let value = match value {
            RawValue::Number(v) => {
                RawValue::Number(apply_scaling(v, self.config.scale, self.config.offset))
            }
            RawValue::Integer(v) if self.config.scale != 1.0 || self.config.offset != 0.0 => {
                RawValue::Number(apply_scaling(v as f64, self.config.scale, self.config.offset))
            }
            other => other,
        };
        RawReading::good(self.tag_id, ts_ms, value)
    }

    async fn drop_session(&mut self, err: &ProtocolError, timeout: Duration) {
        if let Some(mut session) = self.session.take() {
            if !close_within(timeout, session.close()).await {
                debug!(target: "scada.bridge", tag_id = self.tag_id, "session_close_abandoned");
            }
            warn!(
                target: "scada.bridge",
                tag_id = self.tag_id,
                endpoint = %self.config.url,
                error = %err,
                "bridge_session_lost"
            );
            self.health.on_link_lost(err.to_string());
        }
    }

    /// 启动握手失败后标记 degraded。
    pub fn mark_degraded(&mut self) {
        if self.health.mark_degraded() {
            self.metrics.record_degraded();
            warn!(
                target: "scada.bridge",
                tag_id = self.tag_id,
                endpoint = %self.config.url,
                "bridge_degraded"
            );
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            if close_within(SESSION_CLOSE_LIMIT, session.close()).await {
                debug!(target: "scada.bridge", tag_id = self.tag_id, "bridge_closed");
            } else {
                debug!(target: "scada.bridge", tag_id = self.tag_id, "session_close_abandoned");
            }
        }
        self.health.on_link_lost("closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::SourceKind;
    use serde_json::json;

    #[test]
    fn parse_config_with_endpoint_alias() {
        let tag = Tag::new(3, "Line Pressure", SourceKind::Opcua)
            .with_config(json!({"endpoint": "opc.tcp://plc:4840", "node_id": "ns=2;s=Line.Pressure"}));
        let config = OpcUaConfig::from_tag(&tag).unwrap();
        assert_eq!(config.url, "opc.tcp://plc:4840");
        assert_eq!(config.node_id, NodeId::new(2, "Line.Pressure"));
        assert_eq!(config.scale, 1.0);
    }

    #[test]
    fn reject_non_opc_scheme_and_bad_node() {
        let tag = Tag::new(3, "x", SourceKind::Opcua)
            .with_config(json!({"url": "http://plc", "node_id": "ns=2;s=A"}));
        assert_eq!(OpcUaConfig::from_tag(&tag).unwrap_err().field(), Some("url"));

        let tag = Tag::new(3, "x", SourceKind::Opcua)
            .with_config(json!({"url": "opc.tcp://plc:4840", "node_id": "garbage"}));
        assert_eq!(OpcUaConfig::from_tag(&tag).unwrap_err().field(), Some("node_id"));
    }

    #[test]
    fn bad_status_becomes_sample_without_value() {
        let data = DataValue {
            value: Some(Variant::Double(1.0)),
            status: Some(StatusCode::BadNodeIdUnknown),
            ..Default::default()
        };
        let sample = sample_from_data_value(data).unwrap();
        assert!(sample.value.is_none());
        assert!(sample.bad_status.is_some());
    }

    #[test]
    fn variants_map_to_raw_values() {
        assert_eq!(variant_to_raw(Variant::Boolean(true)).unwrap(), RawValue::Bool(true));
        assert_eq!(variant_to_raw(Variant::Int32(-7)).unwrap(), RawValue::Integer(-7));
        assert_eq!(variant_to_raw(Variant::Float(1.5)).unwrap(), RawValue::Number(1.5));
    }
}
