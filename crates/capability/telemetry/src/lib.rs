//! 追踪初始化、采集计数器与请求 ID 生成。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照（供状态接口与测试读取）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub readings_produced: u64,
    pub readings_good: u64,
    pub readings_error: u64,
    pub cycles_skipped: u64,
    pub read_timeouts: u64,
    pub bridge_reconnects: u64,
    pub bridge_degraded: u64,
    pub listener_unmatched: u64,
    pub listener_malformed: u64,
    pub listener_overflow: u64,
    pub publish_success: u64,
    pub publish_failure: u64,
    pub batches_written: u64,
    pub readings_written: u64,
    pub batches_dropped: u64,
    pub readings_dropped: u64,
    pub store_retries: u64,
    pub cache_failures: u64,
    pub backpressure: u64,
    pub dropped_unknown_tag: u64,
    pub bad_quality_not_stored: u64,
    pub tags_invalid: u64,
}

/// 采集计数器（原子累加，可并发共享）。
#[derive(Debug, Default)]
pub struct TelemetryMetrics {
    readings_produced: AtomicU64,
    readings_good: AtomicU64,
    readings_error: AtomicU64,
    cycles_skipped: AtomicU64,
    read_timeouts: AtomicU64,
    bridge_reconnects: AtomicU64,
    bridge_degraded: AtomicU64,
    listener_unmatched: AtomicU64,
    listener_malformed: AtomicU64,
    listener_overflow: AtomicU64,
    publish_success: AtomicU64,
    publish_failure: AtomicU64,
    batches_written: AtomicU64,
    readings_written: AtomicU64,
    batches_dropped: AtomicU64,
    readings_dropped: AtomicU64,
    store_retries: AtomicU64,
    cache_failures: AtomicU64,
    backpressure: AtomicU64,
    dropped_unknown_tag: AtomicU64,
    bad_quality_not_stored: AtomicU64,
    tags_invalid: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings_produced: self.readings_produced.load(Ordering::Relaxed),
            readings_good: self.readings_good.load(Ordering::Relaxed),
            readings_error: self.readings_error.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            bridge_reconnects: self.bridge_reconnects.load(Ordering::Relaxed),
            bridge_degraded: self.bridge_degraded.load(Ordering::Relaxed),
            listener_unmatched: self.listener_unmatched.load(Ordering::Relaxed),
            listener_malformed: self.listener_malformed.load(Ordering::Relaxed),
            listener_overflow: self.listener_overflow.load(Ordering::Relaxed),
            publish_success: self.publish_success.load(Ordering::Relaxed),
            publish_failure: self.publish_failure.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            readings_written: self.readings_written.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            readings_dropped: self.readings_dropped.load(Ordering::Relaxed),
            store_retries: self.store_retries.load(Ordering::Relaxed),
            cache_failures: self.cache_failures.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
            dropped_unknown_tag: self.dropped_unknown_tag.load(Ordering::Relaxed),
            bad_quality_not_stored: self.bad_quality_not_stored.load(Ordering::Relaxed),
            tags_invalid: self.tags_invalid.load(Ordering::Relaxed),
        }
    }

    /// 记录一次产出的读数（按质量分类）。
    pub fn record_reading(&self, good: bool) {
        self.readings_produced.fetch_add(1, Ordering::Relaxed);
        if good {
            self.readings_good.fetch_add(1, Ordering::Relaxed);
        } else {
            self.readings_error.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 记录因上一周期未完成而跳过的周期数。
    pub fn record_cycles_skipped(&self, count: u64) {
        self.cycles_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_read_timeout(&self) {
        self.read_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次重连尝试。
    pub fn record_reconnect(&self) {
        self.bridge_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录桥接进入 degraded 状态。
    pub fn record_degraded(&self) {
        self.bridge_degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unmatched(&self) {
        self.listener_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.listener_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listener_overflow(&self) {
        self.listener_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self, ok: bool) {
        if ok {
            self.publish_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.publish_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 记录成功写入的批次。
    pub fn record_batch_written(&self, readings: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.readings_written
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    /// 记录重试耗尽后丢弃的批次（数据丢失）。
    pub fn record_batch_dropped(&self, readings: usize) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.readings_dropped
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    pub fn record_store_retry(&self) {
        self.store_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_failure(&self) {
        self.cache_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backpressure(&self) {
        self.backpressure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_tag(&self) {
        self.dropped_unknown_tag.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bad_quality_not_stored(&self) {
        self.bad_quality_not_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录配置源中无法解析的点位（如未知来源类型）。
    pub fn record_tag_invalid(&self) {
        self.tags_invalid.fetch_add(1, Ordering::Relaxed);
    }
}

static METRICS: OnceLock<Arc<TelemetryMetrics>> = OnceLock::new();

/// 获取进程级共享指标实例。
pub fn shared_metrics() -> Arc<TelemetryMetrics> {
    METRICS
        .get_or_init(|| Arc::new(TelemetryMetrics::new()))
        .clone()
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}
