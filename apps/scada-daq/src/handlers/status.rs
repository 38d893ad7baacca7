//! 采集状态快照
//!
//! - GET /api/status：点位调度状态 + 计数器

use api_contract::{ApiResponse, MetricsSnapshotDto, StatusResponse, TagStatusDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scada_protocol::BridgeStatus;
use scada_scheduler::{CycleState, TagStatus};
use scada_telemetry::MetricsSnapshot;

use crate::AppState;

pub async fn get_status(State(state): State<AppState>) -> Response {
    let tags = state
        .board
        .snapshot()
        .await
        .into_iter()
        .map(tag_status_to_dto)
        .collect();
    let metrics = metrics_to_dto(state.metrics.snapshot());
    (
        StatusCode::OK,
        Json(ApiResponse::success(StatusResponse { tags, metrics })),
    )
        .into_response()
}

fn tag_status_to_dto(status: TagStatus) -> TagStatusDto {
    let state = match status.state {
        CycleState::Idle => "idle",
        CycleState::Reading => "reading",
        CycleState::Invalid => "invalid",
    };
    TagStatusDto {
        tag_id: status.tag_id,
        tag_name: status.tag_name,
        source_kind: status.source_kind.as_str().to_string(),
        scan_interval_ms: status.scan_interval_ms,
        state: state.to_string(),
        bridge_status: bridge_status_str(&status.health.status).to_string(),
        consecutive_failures: status.health.consecutive_failures,
        cycles: status.cycles,
        cycles_skipped: status.cycles_skipped,
        last_quality: status.last_quality.map(|quality| quality.as_str().to_string()),
        last_ts_ms: status.last_ts_ms,
        last_error: status.last_error.or(status.health.last_error),
    }
}

fn bridge_status_str(status: &BridgeStatus) -> &'static str {
    match status {
        BridgeStatus::Passive => "passive",
        BridgeStatus::Disconnected => "disconnected",
        BridgeStatus::Connected => "connected",
        BridgeStatus::Degraded => "degraded",
    }
}

fn metrics_to_dto(snapshot: MetricsSnapshot) -> MetricsSnapshotDto {
    MetricsSnapshotDto {
        readings_produced: snapshot.readings_produced,
        readings_good: snapshot.readings_good,
        readings_error: snapshot.readings_error,
        cycles_skipped: snapshot.cycles_skipped,
        read_timeouts: snapshot.read_timeouts,
        bridge_reconnects: snapshot.bridge_reconnects,
        bridge_degraded: snapshot.bridge_degraded,
        listener_unmatched: snapshot.listener_unmatched,
        listener_malformed: snapshot.listener_malformed,
        listener_overflow: snapshot.listener_overflow,
        publish_success: snapshot.publish_success,
        publish_failure: snapshot.publish_failure,
        batches_written: snapshot.batches_written,
        readings_written: snapshot.readings_written,
        batches_dropped: snapshot.batches_dropped,
        readings_dropped: snapshot.readings_dropped,
        store_retries: snapshot.store_retries,
        cache_failures: snapshot.cache_failures,
        backpressure: snapshot.backpressure,
        dropped_unknown_tag: snapshot.dropped_unknown_tag,
        bad_quality_not_stored: snapshot.bad_quality_not_stored,
        tags_invalid: snapshot.tags_invalid,
    }
}
