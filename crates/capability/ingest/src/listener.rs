//! 外部 MQTT 设备监听器
//!
//! 从总线入站通道按到达顺序逐条处理：路由到点位、解码、交给处理器。
//! 断线期间的消息不做补偿（至多一次）。

use crate::decode::decode_payload;
use crate::handler::ReadingHandler;
use crate::router::TopicRouter;
use domain::{RawReading, Tag};
use scada_bus::InboundMessage;
use scada_telemetry::TelemetryMetrics;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ExternalListener {
    router: Arc<RwLock<TopicRouter>>,
    handler: Arc<dyn ReadingHandler>,
    metrics: Arc<TelemetryMetrics>,
}

impl ExternalListener {
    pub fn new(handler: Arc<dyn ReadingHandler>, metrics: Arc<TelemetryMetrics>) -> Self {
        Self {
            router: Arc::new(RwLock::new(TopicRouter::default())),
            handler,
            metrics,
        }
    }

    /// 按当前点位集合重建路由，返回需要订阅的过滤器。
    pub async fn update_routes(&self, tags: &[Tag]) -> Vec<String> {
        let (router, rejected) = TopicRouter::from_tags(tags);
        for (tag_id, err) in rejected {
            warn!(target: "scada.listener", tag_id, error = %err, "listener_tag_invalid");
        }
        let filters = router.filters();
        info!(
            target: "scada.listener",
            routes = router.len(),
            filters = filters.len(),
            "listener_routes_updated"
        );
        *self.router.write().await = router;
        filters
    }

    /// 处理一条入站消息，返回产出的读数条数。
    pub async fn handle_message(&self, message: InboundMessage) -> usize {
        let routes = self.router.read().await.resolve(&message.topic);
        if routes.is_empty() {
            self.metrics.record_unmatched();
            debug!(target: "scada.listener", topic = %message.topic, "listener_unmatched");
            return 0;
        }
        for route in &routes {
            let reading = match decode_payload(&message.payload, &route.rule) {
                Ok(decoded) => RawReading::good(
                    route.tag_id,
                    decoded.ts_ms.unwrap_or(message.received_at_ms),
                    decoded.value,
                ),
                Err(err) => {
                    self.metrics.record_malformed();
                    warn!(
                        target: "scada.listener",
                        tag_id = route.tag_id,
                        topic = %message.topic,
                        error = %err,
                        "listener_payload_malformed"
                    );
                    RawReading::error(route.tag_id, message.received_at_ms, err.to_string())
                }
            };
            let reading = reading.with_metadata(json!({ "topic": message.topic }));
            self.handler.handle(reading).await;
        }
        routes.len()
    }

    /// 消费入站通道直到通道关闭或收到停止信号。
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut stop: watch::Receiver<bool>,
    ) {
        info!(target: "scada.listener", "listener_started");
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                message = inbound.recv() => {
                    match message {
                        Some(message) => {
                            self.handle_message(message).await;
                        }
                        None => break,
                    }
                }
            }
        }
        info!(target: "scada.listener", "listener_stopped");
    }
}
