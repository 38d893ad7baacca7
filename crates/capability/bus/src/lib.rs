//! 内部消息总线
//!
//! 一个显式持有的 MQTT 连接同时服务两个方向：
//! - 流水线经 [`Publisher`] 发布规范化读数；
//! - 外部监听器从 [`MqttBus::connect`] 返回的接收端读取设备上报。
//!
//! 断线后由事件循环按退避重连，并在 ConnAck 后重新订阅。
//! 断线期间发布到设备 topic 的消息不做缓冲（至多一次）。

use async_trait::async_trait;
use domain::now_epoch_ms;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS, SubscribeFilter};
use scada_telemetry::TelemetryMetrics;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);
/// 请求队列容量（发布与订阅共用）
const REQUEST_QUEUE: usize = 64;
/// 重连后重订阅等待入队的上限
const RESUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 总线错误（发布失败只计数，不阻塞存储）。
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish error: {0}")]
    Publish(String),
    #[error("subscribe error: {0}")]
    Subscribe(String),
}

/// 读数发布抽象。
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// 空发布器（未配置总线时使用）。
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), BusError> {
        Ok(())
    }
}

/// 订阅到的一条消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

/// MQTT 总线配置。
#[derive(Debug, Clone)]
pub struct MqttBusConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub qos: u8,
    /// 入站消息缓冲（满时丢弃并计数）
    pub inbound_buffer: usize,
}

/// 共享 MQTT 连接。
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    qos: QoS,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
}

impl MqttBus {
    /// 建立连接并启动事件循环；返回入站消息接收端。
    pub fn connect(
        config: MqttBusConfig,
        metrics: Arc<TelemetryMetrics>,
    ) -> (Self, mpsc::Receiver<InboundMessage>, tokio::task::JoinHandle<()>) {
        let client_id = format!("{}-{}", config.client_id, uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_QUEUE);
        let (tx, rx) = mpsc::channel(config.inbound_buffer.max(1));
        let qos = qos_from_u8(config.qos);
        let subscriptions = Arc::new(Mutex::new(BTreeSet::<String>::new()));

        // 每次 ConnAck 递增；重订阅在事件循环之外等待请求队列腾出空间
        let (connected_tx, connected_rx) = watch::channel(0u64);
        tokio::spawn(resubscribe_on_connect(
            client.clone(),
            subscriptions.clone(),
            qos,
            connected_rx,
        ));

        let endpoint = format!("{}:{}", config.host, config.port);
        let handle = tokio::spawn(async move {
            let mut backoff = RECONNECT_BASE;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        backoff = RECONNECT_BASE;
                        info!(target: "scada.bus", endpoint = %endpoint, "bus_connected");
                        connected_tx.send_modify(|count| *count += 1);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                            received_at_ms: now_epoch_ms(),
                        };
                        match tx.try_send(message) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(message)) => {
                                metrics.record_listener_overflow();
                                debug!(
                                    target: "scada.bus",
                                    topic = %message.topic,
                                    "inbound_overflow"
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {}
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!(target: "scada.bus", endpoint = %endpoint, "bus_disconnected");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(
                            target: "scada.bus",
                            endpoint = %endpoint,
                            error = %err,
                            retry_in_ms = backoff.as_millis() as u64,
                            "bus_connection_lost"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(RECONNECT_MAX);
                    }
                }
            }
        });

        (
            Self {
                client,
                qos,
                subscriptions,
            },
            rx,
            handle,
        )
    }

    /// 把订阅集合调整为 `filters`（只增删差异部分）。
    ///
    /// 入队失败的过滤器不计入已订阅集合，下次调用时重试。
    pub async fn set_subscriptions<I>(&self, filters: I) -> Result<(), BusError>
    where
        I: IntoIterator<Item = String>,
    {
        let desired: BTreeSet<String> = filters.into_iter().collect();
        let mut current = self.subscriptions.lock().await;
        let (added, removed) = diff_subscriptions(&current, &desired);
        let mut failed = Vec::new();
        for filter in &removed {
            match self.client.try_unsubscribe(filter.clone()) {
                Ok(()) => {
                    current.remove(filter);
                }
                Err(err) => failed.push(format!("{filter}: {err}")),
            }
        }
        for filter in &added {
            match self.client.try_subscribe(filter.clone(), self.qos) {
                Ok(()) => {
                    current.insert(filter.clone());
                }
                Err(err) => failed.push(format!("{filter}: {err}")),
            }
        }
        if !added.is_empty() || !removed.is_empty() {
            info!(
                target: "scada.bus",
                added = added.len(),
                removed = removed.len(),
                failed = failed.len(),
                total = current.len(),
                "bus_subscriptions_updated"
            );
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(BusError::Subscribe(failed.join("; ")))
        }
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.iter().cloned().collect()
    }

    /// 主动断开，事件循环随后退出。
    pub async fn disconnect(&self) {
        if let Err(err) = self.client.disconnect().await {
            debug!(target: "scada.bus", error = %err, "bus_disconnect_failed");
        }
    }
}

#[async_trait]
impl Publisher for MqttBus {
    /// 非阻塞入队；连接不可用且队列已满时立即返回错误。
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .try_publish(topic, self.qos, false, payload)
            .map_err(|err| BusError::Publish(err.to_string()))
    }
}

/// 每次连接建立后整体重订阅；失败时清空已订阅集合，由下次
/// [`MqttBus::set_subscriptions`] 补齐。事件循环退出后随之结束。
async fn resubscribe_on_connect(
    client: AsyncClient,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    qos: QoS,
    mut connected: watch::Receiver<u64>,
) {
    while connected.changed().await.is_ok() {
        let mut current = subscriptions.lock().await;
        if current.is_empty() {
            continue;
        }
        let filters: Vec<SubscribeFilter> = current
            .iter()
            .map(|filter| SubscribeFilter::new(filter.clone(), qos))
            .collect();
        let error = match tokio::time::timeout(RESUBSCRIBE_TIMEOUT, client.subscribe_many(filters))
            .await
        {
            Ok(Ok(())) => {
                info!(target: "scada.bus", subscriptions = current.len(), "bus_resubscribed");
                continue;
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => "request queue full".to_string(),
        };
        warn!(
            target: "scada.bus",
            subscriptions = current.len(),
            error = %error,
            "bus_resubscribe_failed"
        );
        current.clear();
    }
}

/// 计算需要新增与取消的订阅。
fn diff_subscriptions(
    current: &BTreeSet<String>,
    desired: &BTreeSet<String>,
) -> (Vec<String>, Vec<String>) {
    let added = desired.difference(current).cloned().collect();
    let removed = current.difference(desired).cloned().collect();
    (added, removed)
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn subscription_diff_only_touches_changes() {
        let (added, removed) = diff_subscriptions(
            &set(&["devices/+/humidity", "plant/#"]),
            &set(&["plant/#", "line/1/pressure"]),
        );
        assert_eq!(added, vec!["line/1/pressure".to_string()]);
        assert_eq!(removed, vec!["devices/+/humidity".to_string()]);
    }

    #[test]
    fn qos_mapping() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
        assert_eq!(qos_from_u8(9), QoS::AtMostOnce);
    }
}
