//! # 协议桥接能力模块
//!
//! 每个可采集点位对应一个桥接实例，支持：
//! - **Simulated**：按波形生成仿真值，无传输
//! - **Modbus TCP**：读取从站寄存器/线圈
//! - **OPC UA**：读取节点当前值
//! - **MQTT External**：推送模式，值由外部监听器送达
//!
//! ## 架构设计
//!
//! ```text
//! Tag (source_kind + connection_config)
//!       │
//!       ▼
//! BridgeFactory ── REGISTRY ──┬── SimulatedBridge
//!                             ├── ModbusTcpBridge ── ModbusConnector
//!                             ├── OpcUaBridge ────── OpcUaConnector
//!                             └── MqttExternalBridge
//!       │
//!       ▼
//! Bridge::read → RawReading → Pipeline
//! ```
//!
//! 桥接独占自己的连接状态；传输失败编码为 quality=error 的读数，
//! 不向调用方抛出。

mod bridge;
mod conn_config;
mod error;
mod factory;
mod health;
mod modbus_tcp;
mod mqtt_external;
mod opc_ua;
mod simulated;
mod types;

pub use bridge::Bridge;
pub use error::{ConfigError, ProtocolError};
pub use factory::{BridgeFactory, BridgeSettings};
pub use health::{BridgeHealth, BridgeStatus, ConnectionHealth, ReconnectPolicy};
pub use modbus_tcp::{
    ModbusConnector, ModbusTcpBridge, ModbusTcpConfig, RegisterClient, RegisterValues,
    TcpModbusConnector,
};
pub use mqtt_external::{MqttExternalBridge, MqttExternalConfig, validate_filter};
pub use opc_ua::{
    ClientOpcUaConnector, OpcUaBridge, OpcUaConfig, OpcUaConnector, OpcUaSample, OpcUaSession,
};
pub use simulated::{SimulatedBridge, SimulatedConfig, Waveform};
pub use types::*;

/// 自定义 OpcUaConnector 需要 NodeId。
pub use ::opcua::client::prelude::NodeId;
