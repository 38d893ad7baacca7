//! 稳定的 DTO 与 API 响应契约。

use serde::Serialize;

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查响应。
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// 单个点位的采集状态。
#[derive(Debug, Serialize)]
pub struct TagStatusDto {
    pub tag_id: i64,
    pub tag_name: String,
    pub source_kind: String,
    pub scan_interval_ms: u64,
    /// idle / reading / invalid
    pub state: String,
    /// passive / disconnected / connected / degraded
    pub bridge_status: String,
    pub consecutive_failures: u32,
    pub cycles: u64,
    pub cycles_skipped: u64,
    pub last_quality: Option<String>,
    pub last_ts_ms: Option<i64>,
    pub last_error: Option<String>,
}

/// 计数器快照。
#[derive(Debug, Default, Serialize)]
pub struct MetricsSnapshotDto {
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

/// `GET /api/status` 的数据体。
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub tags: Vec<TagStatusDto>,
    pub metrics: MetricsSnapshotDto,
}
