//! 标准化与发布流水线
//!
//! 每条原始读数：标准化 → 同时进行总线发布与存储转发。
//! 两条路径互不阻塞，任一失败只计数。

use crate::sink::StorageSink;
use async_trait::async_trait;
use domain::{Quality, RawReading, Reading, ReadingValue, Tag, TagId};
use scada_bus::Publisher;
use scada_ingest::ReadingHandler;
use scada_normalize::Normalizer;
use scada_storage::RealtimeStore;
use scada_telemetry::TelemetryMetrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 流水线参数
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 内部 topic 前缀：`{namespace}/tags/{tag}`
    pub namespace: String,
    /// 是否持久化非 good 读数
    pub store_bad_quality: bool,
    /// 最新值缓存单次写入上限
    pub cache_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            namespace: "scada".to_string(),
            store_bad_quality: false,
            cache_timeout: Duration::from_millis(500),
        }
    }
}

/// 总线 payload
#[derive(Debug, Serialize)]
struct PublishPayload<'a> {
    tag_id: TagId,
    tag_name: &'a str,
    value: Option<ReadingValue>,
    quality: Quality,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Clone)]
pub struct Pipeline {
    normalizer: Normalizer,
    publisher: Arc<dyn Publisher>,
    sink: StorageSink,
    realtime: Option<Arc<dyn RealtimeStore>>,
    config: PipelineConfig,
    metrics: Arc<TelemetryMetrics>,
}

impl Pipeline {
    pub fn new(
        normalizer: Normalizer,
        publisher: Arc<dyn Publisher>,
        sink: StorageSink,
        config: PipelineConfig,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        Self {
            normalizer,
            publisher,
            sink,
            realtime: None,
            config,
            metrics,
        }
    }

    /// 附加最新值缓存。
    pub fn with_realtime(mut self, realtime: Arc<dyn RealtimeStore>) -> Self {
        self.realtime = Some(realtime);
        self
    }

    pub fn sink(&self) -> &StorageSink {
        &self.sink
    }

    /// 处理一条原始读数；调用方在返回后即可开始下一周期。
    pub async fn process(&self, raw: RawReading) {
        let Ok((tag, reading)) = self.normalizer.normalize(raw).await else {
            return;
        };
        self.metrics.record_reading(reading.quality == Quality::Good);
        tokio::join!(
            self.publish(&tag, &reading),
            self.cache(&reading),
            self.store(&reading)
        );
    }

    async fn publish(&self, tag: &Tag, reading: &Reading) {
        let topic = tag.internal_topic(&self.config.namespace);
        let payload = PublishPayload {
            tag_id: tag.id,
            tag_name: &tag.name,
            value: reading.value,
            quality: reading.quality,
            timestamp: reading.ts_ms,
            unit: tag.unit.as_deref(),
            error: reading.error.as_deref(),
        };
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.metrics.record_publish(false);
                warn!(
                    target: "scada.pipeline",
                    tag_id = tag.id,
                    error = %err,
                    "publish_encode_failed"
                );
                return;
            }
        };
        match self.publisher.publish(&topic, bytes).await {
            Ok(()) => {
                self.metrics.record_publish(true);
                debug!(
                    target: "scada.pipeline",
                    tag_id = tag.id,
                    topic = %topic,
                    "reading_published"
                );
            }
            Err(err) => {
                self.metrics.record_publish(false);
                warn!(
                    target: "scada.pipeline",
                    tag_id = tag.id,
                    topic = %topic,
                    error = %err,
                    "publish_failed"
                );
            }
        }
    }

    async fn cache(&self, reading: &Reading) {
        let Some(realtime) = &self.realtime else {
            return;
        };
        let error = match tokio::time::timeout(
            self.config.cache_timeout,
            realtime.upsert_last_value(reading),
        )
        .await
        {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("timed out after {} ms", self.config.cache_timeout.as_millis()),
        };
        self.metrics.record_cache_failure();
        warn!(
            target: "scada.pipeline",
            tag_id = reading.tag_id,
            error = %error,
            "last_value_cache_failed"
        );
    }

    async fn store(&self, reading: &Reading) {
        if reading.quality != Quality::Good && !self.config.store_bad_quality {
            self.metrics.record_bad_quality_not_stored();
            return;
        }
        if let Err(err) = self.sink.append(reading.clone()).await {
            warn!(
                target: "scada.pipeline",
                tag_id = reading.tag_id,
                error = %err,
                "sink_append_failed"
            );
        }
    }
}

#[async_trait]
impl ReadingHandler for Pipeline {
    async fn handle(&self, reading: RawReading) {
        self.process(reading).await;
    }
}
