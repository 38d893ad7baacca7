//! 协议错误类型定义

use domain::SourceKind;

/// 连接配置错误（只影响该点位的桥接构造）。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{kind}: missing field `{field}`")]
    MissingField { kind: SourceKind, field: String },

    #[error("{kind}: invalid field `{field}`: {reason}")]
    InvalidField {
        kind: SourceKind,
        field: String,
        reason: String,
    },

    /// 来源类型未在桥接注册表中登记
    #[error("unsupported source kind: {0}")]
    UnsupportedKind(String),
}

impl ConfigError {
    /// 出错的字段名（UnsupportedKind 无字段）。
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::MissingField { field, .. } | ConfigError::InvalidField { field, .. } => {
                Some(field)
            }
            ConfigError::UnsupportedKind(_) => None,
        }
    }
}

/// 协议通信错误（可恢复，驱动重连/退避）
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Modbus 从站异常应答
    #[error("modbus error: {0}")]
    Modbus(String),

    /// OPC UA 服务端返回的非 Good 状态
    #[error("opcua error: {0}")]
    Opcua(String),

    /// 数据解析错误
    #[error("data parse error: {0}")]
    DataParse(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 处于重连退避窗口内
    #[error("not connected, next attempt in {0} ms")]
    Backoff(u64),
}

impl ProtocolError {
    /// 是否意味着底层会话已不可用（需要重连）。
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Connection(_) | ProtocolError::Io(_) | ProtocolError::Timeout(_)
        )
    }
}
