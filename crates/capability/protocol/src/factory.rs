//! 桥接工厂
//!
//! 按来源类型查注册表构造桥接。配置在构造时校验；
//! 启动握手受超时约束，失败的桥接以 degraded 状态返回。

use crate::bridge::Bridge;
use crate::error::ConfigError;
use crate::health::ReconnectPolicy;
use crate::modbus_tcp::{ModbusConnector, ModbusTcpBridge, ModbusTcpConfig, TcpModbusConnector};
use crate::mqtt_external::{MqttExternalBridge, MqttExternalConfig};
use crate::opc_ua::{ClientOpcUaConnector, OpcUaBridge, OpcUaConfig, OpcUaConnector};
use crate::simulated::{SimulatedBridge, SimulatedConfig};
use domain::{SourceKind, Tag};
use scada_telemetry::TelemetryMetrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 桥接运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// 启动时握手的超时上限
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

type Constructor = fn(&BridgeFactory, &Tag) -> Result<Bridge, ConfigError>;

/// 已登记的桥接变体
const REGISTRY: [(SourceKind, Constructor); 4] = [
    (SourceKind::Simulated, build_simulated),
    (SourceKind::ModbusTcp, build_modbus_tcp),
    (SourceKind::Opcua, build_opcua),
    (SourceKind::MqttExternal, build_mqtt_external),
];

fn build_simulated(_: &BridgeFactory, tag: &Tag) -> Result<Bridge, ConfigError> {
    let config = SimulatedConfig::from_tag(tag)?;
    Ok(Bridge::Simulated(SimulatedBridge::new(tag.id, config)))
}

fn build_modbus_tcp(factory: &BridgeFactory, tag: &Tag) -> Result<Bridge, ConfigError> {
    let config = ModbusTcpConfig::from_tag(tag)?;
    Ok(Bridge::ModbusTcp(ModbusTcpBridge::new(
        tag.id,
        config,
        factory.modbus.clone(),
        factory.settings.reconnect,
        factory.metrics.clone(),
    )))
}

fn build_opcua(factory: &BridgeFactory, tag: &Tag) -> Result<Bridge, ConfigError> {
    let config = OpcUaConfig::from_tag(tag)?;
    Ok(Bridge::OpcUa(OpcUaBridge::new(
        tag.id,
        config,
        factory.opcua.clone(),
        factory.settings.reconnect,
        factory.metrics.clone(),
    )))
}

fn build_mqtt_external(_: &BridgeFactory, tag: &Tag) -> Result<Bridge, ConfigError> {
    let config = MqttExternalConfig::from_tag(tag)?;
    Ok(Bridge::MqttExternal(MqttExternalBridge::new(tag.id, config)))
}

/// 桥接工厂（持有共享的传输连接器）
#[derive(Clone)]
pub struct BridgeFactory {
    settings: BridgeSettings,
    metrics: Arc<TelemetryMetrics>,
    modbus: Arc<dyn ModbusConnector>,
    opcua: Arc<dyn OpcUaConnector>,
}

impl BridgeFactory {
    pub fn new(settings: BridgeSettings, metrics: Arc<TelemetryMetrics>) -> Self {
        Self {
            settings,
            metrics,
            modbus: Arc::new(TcpModbusConnector),
            opcua: Arc::new(ClientOpcUaConnector),
        }
    }

    pub fn with_modbus_connector(mut self, connector: Arc<dyn ModbusConnector>) -> Self {
        self.modbus = connector;
        self
    }

    pub fn with_opcua_connector(mut self, connector: Arc<dyn OpcUaConnector>) -> Self {
        self.opcua = connector;
        self
    }

    pub fn settings(&self) -> BridgeSettings {
        self.settings
    }

    /// 只校验配置并构造，不做任何 I/O。
    pub fn build(&self, tag: &Tag) -> Result<Bridge, ConfigError> {
        let constructor = REGISTRY
            .iter()
            .find(|(kind, _)| *kind == tag.source_kind)
            .map(|(_, constructor)| *constructor)
            .ok_or_else(|| ConfigError::UnsupportedKind(tag.source_kind.to_string()))?;
        constructor(self, tag)
    }

    /// 构造并尝试握手；握手失败或超时时桥接以 degraded 状态返回。
    pub async fn create(&self, tag: &Tag) -> Result<Bridge, ConfigError> {
        let mut bridge = self.build(tag)?;
        self.connect_eager(&mut bridge).await;
        Ok(bridge)
    }

    /// 有界的启动握手；失败时标记 degraded，之后由读取路径按退避重连。
    pub async fn connect_eager(&self, bridge: &mut Bridge) {
        let tag_id = bridge.tag_id();
        let kind = bridge.kind();
        let timeout = self.settings.connect_timeout;
        match tokio::time::timeout(timeout, bridge.connect(timeout)).await {
            Ok(Ok(())) => {
                debug!(target: "scada.bridge", tag_id, kind = %kind, "bridge_ready");
            }
            Ok(Err(err)) => {
                warn!(
                    target: "scada.bridge",
                    tag_id,
                    kind = %kind,
                    error = %err,
                    "bridge_eager_connect_failed"
                );
                bridge.mark_degraded();
            }
            Err(_) => {
                warn!(
                    target: "scada.bridge",
                    tag_id,
                    kind = %kind,
                    timeout_ms = timeout.as_millis() as u64,
                    "bridge_eager_connect_timeout"
                );
                bridge.mark_degraded();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_source_kind_is_registered() {
        for kind in SourceKind::ALL {
            assert!(REGISTRY.iter().any(|(registered, _)| *registered == kind));
        }
    }
}
