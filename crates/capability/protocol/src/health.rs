//! 连接健康状态与重连退避

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// 关闭会话的等待上限；超时后放弃等待，由后台任务自行结束。
pub(crate) const SESSION_CLOSE_LIMIT: Duration = Duration::from_secs(1);

/// 在 `limit` 内关闭会话，返回是否按时完成。
pub(crate) async fn close_within<F>(limit: Duration, close: F) -> bool
where
    F: Future<Output = ()>,
{
    tokio::time::timeout(limit.min(SESSION_CLOSE_LIMIT), close)
        .await
        .is_ok()
}

/// 重连策略：指数退避（封顶），连续失败 N 次标记 degraded。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub degraded_after: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            degraded_after: 3,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration, degraded_after: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            degraded_after: degraded_after.max(1),
        }
    }

    /// 第 `failures` 次连续失败后的等待时间：base * 2^(failures-1)，不超过 max。
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(20);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }
}

/// 桥接连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    /// 无传输（仿真、外部 MQTT）
    Passive,
    Disconnected,
    Connected,
    Degraded,
}

/// 对外暴露的健康快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeHealth {
    pub status: BridgeStatus,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl BridgeHealth {
    pub fn passive() -> Self {
        Self {
            status: BridgeStatus::Passive,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == BridgeStatus::Degraded
    }
}

/// 单个桥接独占的连接状态机。
#[derive(Debug, Clone)]
pub struct ConnectionHealth {
    policy: ReconnectPolicy,
    status: BridgeStatus,
    consecutive_failures: u32,
    next_attempt_at: Option<Instant>,
    last_error: Option<String>,
}

impl ConnectionHealth {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            status: BridgeStatus::Disconnected,
            consecutive_failures: 0,
            next_attempt_at: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> BridgeStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// 退避窗口内返回剩余等待时间。
    pub fn wait_remaining(&self, now: Instant) -> Option<Duration> {
        match self.next_attempt_at {
            Some(at) if now < at => Some(at - now),
            _ => None,
        }
    }

    pub fn on_connected(&mut self) {
        self.consecutive_failures = 0;
        self.next_attempt_at = None;
        if self.status != BridgeStatus::Degraded {
            self.status = BridgeStatus::Connected;
        }
    }

    /// 记录一次连接失败；返回是否刚进入 degraded。
    pub fn on_connect_failure(&mut self, error: impl Into<String>, now: Instant) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.next_attempt_at = Some(now + self.policy.backoff(self.consecutive_failures));
        self.last_error = Some(error.into());
        if self.status == BridgeStatus::Degraded {
            return false;
        }
        if self.consecutive_failures >= self.policy.degraded_after {
            self.status = BridgeStatus::Degraded;
            return true;
        }
        self.status = BridgeStatus::Disconnected;
        false
    }

    /// 直接标记 degraded（启动时握手失败）；返回是否发生转换。
    pub fn mark_degraded(&mut self) -> bool {
        if self.status == BridgeStatus::Degraded {
            return false;
        }
        self.status = BridgeStatus::Degraded;
        true
    }

    /// 读成功清除 degraded。
    pub fn on_read_success(&mut self) {
        self.status = BridgeStatus::Connected;
        self.consecutive_failures = 0;
        self.next_attempt_at = None;
        self.last_error = None;
    }

    /// 会话丢失，下次调用立即重连。
    pub fn on_link_lost(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.next_attempt_at = None;
        if self.status != BridgeStatus::Degraded {
            self.status = BridgeStatus::Disconnected;
        }
    }

    pub fn snapshot(&self) -> BridgeHealth {
        BridgeHealth {
            status: self.status,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
        }
    }
}
