use std::sync::Arc;

use axum::{routing::get, Router};
use crony_scheduler::{JobRegistry, PrometheusMetrics};

/// Shared state handed to every HTTP handler.
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub metrics: Arc<PrometheusMetrics>,
}

impl AppState {
    pub fn new(registry: Arc<JobRegistry>, metrics: Arc<PrometheusMetrics>) -> Self {
        Self { registry, metrics }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/metrics", get(crate::http::metrics::metrics_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use crony_core::{NotificationPolicy, Workload, WorkloadId};
    use crony_scheduler::{Job, JobCallback, JobHandle, MetricsRecorder, Scheduler};
    use std::time::Duration;
    use tower::ServiceExt;

    struct Noop;

    #[async_trait]
    impl Job for Noop {
        async fn execute(&self, _workload: &Workload) {}
    }

    impl Scheduler for Noop {
        fn register(
            &self,
            _expression: &str,
            _callback: JobCallback,
        ) -> crony_scheduler::Result<JobHandle> {
            Ok(JobHandle::new())
        }

        fn cancel(&self, _handle: JobHandle) {}
    }

    fn state() -> Arc<AppState> {
        let registry = Arc::new(JobRegistry::new(Arc::new(Noop), Arc::new(Noop)));
        registry
            .add(Workload {
                id: WorkloadId::from("abc"),
                name: "backup".into(),
                schedule: "0 3 * * *".into(),
                policy: NotificationPolicy::Never,
                heartbeat_id: None,
            })
            .unwrap();
        let metrics = Arc::new(PrometheusMetrics::new().unwrap());
        Arc::new(AppState::new(registry, metrics))
    }

    async fn fetch(state: Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let resp = build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_reports_job_count() {
        let (status, body) = fetch(state(), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["jobs"], 1);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn metrics_exposes_execution_series() {
        let state = state();
        state
            .metrics
            .record("backup", true, Duration::from_secs(4), Utc::now());

        let (status, body) = fetch(state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("crony_executed_count{container_name=\"backup\",success=\"true\"} 1"));
        assert!(body.contains("crony_last_duration_sec"));
    }
}
