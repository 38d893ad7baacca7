//! Modbus TCP 桥接
//!
//! 每个点位独占一个 TCP 会话；会话断开后在下次读取时按退避策略重连。
//!
//! ```json
//! { "host": "192.168.1.100", "port": 502, "slave_id": 1,
//!   "register": 100, "register_type": "holding", "data_type": "uint16", "scale": 0.1 }
//! ```

use crate::conn_config::ConfigReader;
use crate::error::{ConfigError, ProtocolError};
use crate::health::{
    BridgeHealth, ConnectionHealth, ReconnectPolicy, SESSION_CLOSE_LIMIT, close_within,
};
use crate::types::{ModbusDataType, RegisterKind, WordOrder, apply_scaling, decode_registers};
use async_trait::async_trait;
use domain::{RawReading, RawValue, Tag, TagId, now_epoch_ms};
use scada_telemetry::TelemetryMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

/// Modbus TCP 点位配置
#[derive(Debug, Clone, PartialEq)]
pub struct ModbusTcpConfig {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub register: u16,
    pub register_kind: RegisterKind,
    pub data_type: ModbusDataType,
    pub word_order: WordOrder,
    pub scale: f64,
    pub offset: f64,
}

impl ModbusTcpConfig {
    pub fn from_tag(tag: &Tag) -> Result<Self, ConfigError> {
        let reader = ConfigReader::new(tag);
        let host = reader.required_str(&["host", "ip"])?.to_string();
        let port = reader.optional_int(&["port"], 1, u16::MAX as i64)?.unwrap_or(502) as u16;
        let slave_id = reader
            .optional_int(&["slave_id", "unit_id"], 0, 247)?
            .unwrap_or(1) as u8;
        let register =
            reader.required_int(&["register", "register_address", "address"], 0, u16::MAX as i64)?
                as u16;

        let register_kind = match reader.optional_str(&["register_type"])? {
            Some(name) => name
                .parse::<RegisterKind>()
                .map_err(|reason| reader.invalid("register_type", reason))?,
            None => match reader.optional_int(&["function_code"], i64::MIN, i64::MAX)? {
                Some(code) => RegisterKind::from_function_code(code).ok_or_else(|| {
                    reader.invalid("function_code", format!("unsupported read function {}", code))
                })?,
                None => RegisterKind::Holding,
            },
        };
        let data_type = match reader.optional_str(&["data_type"])? {
            Some(name) => name
                .parse::<ModbusDataType>()
                .map_err(|reason| reader.invalid("data_type", reason))?,
            None => ModbusDataType::default(),
        };
        let word_order = match reader.optional_str(&["word_order", "byte_order"])? {
            Some(name) => name
                .parse::<WordOrder>()
                .map_err(|reason| reader.invalid("word_order", reason))?,
            None => WordOrder::default(),
        };
        let count = data_type.register_count() as u32;
        if !register_kind.is_bit() && register as u32 + count > u16::MAX as u32 + 1 {
            return Err(reader.invalid("register", "register range exceeds address space"));
        }

        Ok(Self {
            host,
            port,
            slave_id,
            register,
            register_kind,
            data_type,
            word_order,
            scale: reader.f64_or(&["scale"], 1.0)?,
            offset: reader.f64_or(&["offset"], 0.0)?,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn read_count(&self) -> u16 {
        if self.register_kind.is_bit() {
            1
        } else {
            self.data_type.register_count()
        }
    }
}

/// 一次读取的原始结果
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValues {
    Words(Vec<u16>),
    Bits(Vec<bool>),
}

/// 已建立的 Modbus 会话
#[async_trait]
pub trait RegisterClient: Send {
    async fn read(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<RegisterValues, ProtocolError>;

    async fn close(&mut self) {}
}

/// 建立 Modbus 会话
#[async_trait]
pub trait ModbusConnector: Send + Sync {
    async fn connect(
        &self,
        config: &ModbusTcpConfig,
    ) -> Result<Box<dyn RegisterClient>, ProtocolError>;
}

/// 基于 tokio-modbus 的 TCP 连接器
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpModbusConnector;

struct TokioModbusClient {
    ctx: tokio_modbus::client::Context,
}

#[async_trait]
impl ModbusConnector for TcpModbusConnector {
    async fn connect(
        &self,
        config: &ModbusTcpConfig,
    ) -> Result<Box<dyn RegisterClient>, ProtocolError> {
        let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await?
            .next()
            .ok_or_else(|| {
                ProtocolError::Connection(format!("cannot resolve {}", config.endpoint()))
            })?;
        let ctx = tcp::connect_slave(addr, Slave(config.slave_id))
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        Ok(Box::new(TokioModbusClient { ctx }))
    }
}

#[async_trait]
impl RegisterClient for TokioModbusClient {
    async fn read(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<RegisterValues, ProtocolError> {
        let values = match kind {
            RegisterKind::Holding => RegisterValues::Words(
                self.ctx
                    .read_holding_registers(address, count)
                    .await
                    .map_err(|e| ProtocolError::Connection(e.to_string()))?
                    .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?,
            ),
            RegisterKind::Input => RegisterValues::Words(
                self.ctx
                    .read_input_registers(address, count)
                    .await
                    .map_err(|e| ProtocolError::Connection(e.to_string()))?
                    .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?,
            ),
            RegisterKind::Coil => RegisterValues::Bits(
                self.ctx
                    .read_coils(address, count)
                    .await
                    .map_err(|e| ProtocolError::Connection(e.to_string()))?
                    .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?,
            ),
            RegisterKind::Discrete => RegisterValues::Bits(
                self.ctx
                    .read_discrete_inputs(address, count)
                    .await
                    .map_err(|e| ProtocolError::Connection(e.to_string()))?
                    .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?,
            ),
        };
        Ok(values)
    }
}

/// Modbus TCP 桥接（会话与退避状态为本桥接独占）
pub struct ModbusTcpBridge {
    tag_id: TagId,
    config: ModbusTcpConfig,
    connector: Arc<dyn ModbusConnector>,
    client: Option<Box<dyn RegisterClient>>,
    health: ConnectionHealth,
    metrics: Arc<TelemetryMetrics>,
    attempted: bool,
}

impl ModbusTcpBridge {
    pub fn new(
        tag_id: TagId,
        config: ModbusTcpConfig,
        connector: Arc<dyn ModbusConnector>,
        policy: ReconnectPolicy,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        Self {
            tag_id,
            config,
            connector,
            client: None,
            health: ConnectionHealth::new(policy),
            metrics,
            attempted: false,
        }
    }

    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    pub fn config(&self) -> &ModbusTcpConfig {
        &self.config
    }

    pub fn health(&self) -> BridgeHealth {
        self.health.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// 建立会话（已连接时直接返回；退避窗口内返回 Backoff）。
    pub async fn connect(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        if self.client.is_some() {
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
                self.config.endpoint(),
                timeout.as_millis()
            ))),
        };
        match result {
            Ok(client) => {
                self.client = Some(client);
                self.health.on_connected();
                info!(
                    target: "scada.bridge",
                    tag_id = self.tag_id,
                    endpoint = %self.config.endpoint(),
                    "bridge_connected"
                );
                Ok(())
            }
            Err(err) => {
                self.record_connect_failure(&err);
                Err(err)
            }
        }
    }

    fn record_connect_failure(&mut self, err: &ProtocolError) {
        let failures = self.health.consecutive_failures() + 1;
        if self.health.on_connect_failure(err.to_string(), Instant::now()) {
            self.metrics.record_degraded();
            warn!(
                target: "scada.bridge",
                tag_id = self.tag_id,
                endpoint = %self.config.endpoint(),
                failures,
                error = %err,
                "bridge_degraded"
            );
        } else {
            warn!(
                target: "scada.bridge",
                tag_id = self.tag_id,
                endpoint = %self.config.endpoint(),
                failures,
                error = %err,
                "bridge_connect_failed"
            );
        }
    }

    /// 读取一次；所有失败都编码为 quality=error 的读数。
    pub async fn read(&mut self, timeout: Duration) -> RawReading {
        match self.try_read(timeout).await {
            Ok(value) => {
                self.health.on_read_success();
                RawReading::good(self.tag_id, now_epoch_ms(), value)
            }
            Err(err) => {
                if err.is_transport() {
                    self.drop_session(&err, timeout).await;
                }
                RawReading::error(self.tag_id, now_epoch_ms(), err.to_string())
            }
        }
    }

    async fn try_read(&mut self, timeout: Duration) -> Result<RawValue, ProtocolError> {
        self.connect(timeout).await?;
        let kind = self.config.register_kind;
        let address = self.config.register;
        let count = self.config.read_count();
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| ProtocolError::Connection("session not established".to_string()))?;

        let values = match tokio::time::timeout(timeout, client.read(kind, address, count)).await {
            Ok(result) => result?,
            Err(_) => {
                self.metrics.record_read_timeout();
                return Err(ProtocolError::Timeout(format!(
                    "read {:?} {} after {} ms",
                    kind,
                    address,
                    timeout.as_millis()
                )));
            }
        };
        debug!(
            target: "scada.bridge",
            tag_id = self.tag_id,
            slave = self.config.slave_id,
            register = address,
            values = ?values,
            "read modbus registers"
        );
        self.decode(values)
    }

    fn decode(&self, values: RegisterValues) -> Result<RawValue, ProtocolError> {
        match values {
            RegisterValues::Bits(bits) => bits
                .first()
                .copied()
                .map(RawValue::Bool)
                .ok_or_else(|| ProtocolError::DataParse("empty coil response".to_string())),
            RegisterValues::Words(words) => {
                let raw = decode_registers(&words, self.config.data_type, self.config.word_order)?;
                Ok(RawValue::Number(apply_scaling(
                    raw,
                    self.config.scale,
                    self.config.offset,
                )))
            }
        }
    }

    async fn drop_session(&mut self, err: &ProtocolError, timeout: Duration) {
        if let Some(mut client) = self.client.take() {
            if !close_within(timeout, client.close()).await {
                debug!(target: "scada.bridge", tag_id = self.tag_id, "session_close_abandoned");
            }
            warn!(
                target: "scada.bridge",
                tag_id = self.tag_id,
                endpoint = %self.config.endpoint(),
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
                endpoint = %self.config.endpoint(),
                "bridge_degraded"
            );
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            if close_within(SESSION_CLOSE_LIMIT, client.close()).await {
                debug!(target: "scada.bridge", tag_id = self.tag_id, "bridge_closed");
            } else {
                debug!(target: "scada.bridge", tag_id = self.tag_id, "session_close_abandoned");
            }
        }
        self.health.on_link_lost("closed");
    }
}
