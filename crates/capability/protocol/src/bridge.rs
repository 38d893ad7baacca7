//! 桥接统一入口：封闭的变体集合，按来源类型静态分发。

use crate::error::ProtocolError;
use crate::health::BridgeHealth;
use crate::modbus_tcp::ModbusTcpBridge;
use crate::mqtt_external::MqttExternalBridge;
use crate::opc_ua::OpcUaBridge;
use crate::simulated::SimulatedBridge;
use domain::{RawReading, SourceKind, TagId};
use std::time::Duration;

pub enum Bridge {
    Simulated(SimulatedBridge),
    ModbusTcp(ModbusTcpBridge),
    OpcUa(OpcUaBridge),
    MqttExternal(MqttExternalBridge),
}

impl Bridge {
    pub fn kind(&self) -> SourceKind {
        match self {
            Bridge::Simulated(_) => SourceKind::Simulated,
            Bridge::ModbusTcp(_) => SourceKind::ModbusTcp,
            Bridge::OpcUa(_) => SourceKind::Opcua,
            Bridge::MqttExternal(_) => SourceKind::MqttExternal,
        }
    }

    pub fn tag_id(&self) -> TagId {
        match self {
            Bridge::Simulated(bridge) => bridge.tag_id(),
            Bridge::ModbusTcp(bridge) => bridge.tag_id(),
            Bridge::OpcUa(bridge) => bridge.tag_id(),
            Bridge::MqttExternal(bridge) => bridge.tag_id(),
        }
    }

    /// 建立底层传输（幂等）；无传输的变体直接成功。
    pub async fn connect(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        match self {
            Bridge::ModbusTcp(bridge) => bridge.connect(timeout).await,
            Bridge::OpcUa(bridge) => bridge.connect(timeout).await,
            Bridge::Simulated(_) | Bridge::MqttExternal(_) => Ok(()),
        }
    }

    /// 读取一次当前值；传输失败、超时、否定应答都以 quality=error 返回。
    pub async fn read(&mut self, timeout: Duration) -> RawReading {
        match self {
            Bridge::Simulated(bridge) => bridge.read(),
            Bridge::ModbusTcp(bridge) => bridge.read(timeout).await,
            Bridge::OpcUa(bridge) => bridge.read(timeout).await,
            Bridge::MqttExternal(bridge) => bridge.read(),
        }
    }

    /// 释放传输资源。
    pub async fn close(&mut self) {
        match self {
            Bridge::ModbusTcp(bridge) => bridge.close().await,
            Bridge::OpcUa(bridge) => bridge.close().await,
            Bridge::Simulated(_) | Bridge::MqttExternal(_) => {}
        }
    }

    pub fn health(&self) -> BridgeHealth {
        match self {
            Bridge::ModbusTcp(bridge) => bridge.health(),
            Bridge::OpcUa(bridge) => bridge.health(),
            Bridge::Simulated(_) | Bridge::MqttExternal(_) => BridgeHealth::passive(),
        }
    }

    pub(crate) fn mark_degraded(&mut self) {
        match self {
            Bridge::ModbusTcp(bridge) => bridge.mark_degraded(),
            Bridge::OpcUa(bridge) => bridge.mark_degraded(),
            Bridge::Simulated(_) | Bridge::MqttExternal(_) => {}
        }
    }
}
