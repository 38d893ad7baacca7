//! 路由定义
//!
//! - 健康检查：/health
//! - 采集状态：/api/status

use super::AppState;
use super::handlers::*;
use crate::middleware::request_context;
use axum::{Router, middleware, routing::get};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(get_status))
        .with_state(state)
        .layer(middleware::from_fn(request_context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use domain::{RawReading, SourceKind, Tag};
    use http_body_util::BodyExt;
    use scada_ingest::ReadingHandler;
    use scada_protocol::{BridgeFactory, BridgeSettings};
    use scada_scheduler::{Scheduler, SchedulerConfig, TagStatusBoard};
    use scada_telemetry::TelemetryMetrics;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Discard;

    #[async_trait]
    impl ReadingHandler for Discard {
        async fn handle(&self, _reading: RawReading) {}
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Option<String>, Value) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).expect("json");
        (status, request_id, body)
    }

    #[tokio::test]
    async fn health_reports_ok_with_request_id() {
        let state = AppState {
            board: TagStatusBoard::new(),
            metrics: Arc::new(TelemetryMetrics::new()),
        };
        let (status, request_id, body) = get_json(create_router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"ok": true}));
        assert!(request_id.is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn status_lists_scheduled_and_rejected_tags() {
        let metrics = Arc::new(TelemetryMetrics::new());
        let mut scheduler = Scheduler::new(
            BridgeFactory::new(BridgeSettings::default(), metrics.clone()),
            Arc::new(Discard),
            SchedulerConfig::default(),
            metrics.clone(),
        );
        scheduler
            .apply(&[
                Tag::new(1, "Demo_Sinewave", SourceKind::Simulated),
                Tag::new(2, "No Host", SourceKind::ModbusTcp),
            ])
            .await;
        let state = AppState {
            board: scheduler.board(),
            metrics,
        };

        let (status, _, body) = get_json(create_router(state), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let tags = body["data"]["tags"].as_array().expect("tags");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0]["source_kind"], "simulated");
        assert_eq!(tags[0]["bridge_status"], "passive");
        assert_eq!(tags[1]["state"], "invalid");
        assert!(body["data"]["metrics"]["readings_produced"].is_number());

        scheduler.shutdown(std::time::Duration::from_secs(1)).await;
    }
}
