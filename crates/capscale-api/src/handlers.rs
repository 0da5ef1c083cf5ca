//! REST API handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::debug;

use capscale_core::{TableId, epoch_millis};
use capscale_ingest::Notification;
use capscale_ledger::WindowSizes;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Body of `/api/v1/windows`.
#[derive(Serialize)]
pub struct WindowsView {
    pub tables: Vec<WindowSizes>,
    pub in_flight: Vec<TableId>,
}

/// POST /api/v1/notifications
///
/// 202 when the exception was recorded, 200 when the notification was
/// about something else, 400 when it could not be used.
pub async fn post_notification(
    State(state): State<ApiState>,
    body: Result<Json<Notification>, JsonRejection>,
) -> impl IntoResponse {
    let Json(notification) = match body {
        Ok(body) => body,
        Err(e) => {
            debug!(error = %e, "rejected notification body");
            return error_response(&e.body_text(), StatusCode::BAD_REQUEST).into_response();
        }
    };

    match state.adapter.ingest(&notification) {
        Ok(Some(event)) => (StatusCode::ACCEPTED, ApiResponse::ok(event)).into_response(),
        Ok(None) => ApiResponse::ok("ignored").into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response(),
    }
}

/// GET /api/v1/throughput
pub async fn get_throughput(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.reporter.report(epoch_millis()).await)
}

/// GET /api/v1/windows
pub async fn get_windows(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(WindowsView {
        tables: state.ledger.window_sizes(),
        in_flight: state.controller.in_flight_tables(),
    })
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use capscale_controller::CapacityController;
    use capscale_core::config::ReportSettings;
    use capscale_core::{
        ConsumedDatapoint, InMemoryBackend, Operation, ProvisionedCapacity, epoch_millis,
    };
    use capscale_ingest::IngestionAdapter;
    use capscale_ledger::ExceptionLedger;
    use capscale_report::ThroughputReporter;

    use crate::{ApiState, build_router};

    fn state() -> (InMemoryBackend, ApiState) {
        let backend = InMemoryBackend::with_tables([("Orders", ProvisionedCapacity::new(10, 10))]);
        let ledger = Arc::new(ExceptionLedger::new());
        ledger.register("Orders");
        let state = ApiState {
            adapter: IngestionAdapter::new(Arc::clone(&ledger)),
            ledger,
            controller: CapacityController::new(Arc::new(backend.clone()), Duration::from_secs(1)),
            reporter: ThroughputReporter::new(
                Arc::new(backend.clone()),
                Arc::new(backend.clone()),
                &ReportSettings::default(),
            ),
        };
        (backend, state)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/notifications")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn notification_is_recorded() {
        let (_, state) = state();
        let ledger = Arc::clone(&state.ledger);
        let router = build_router(state);

        let resp = router
            .oneshot(post(r#"{"table":"Orders","operation":"write","timestamp":"77"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body = json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["timestamp"], 77);
        assert_eq!(ledger.snapshot("Orders", Operation::Write), vec![77]);
    }

    #[tokio::test]
    async fn unrelated_notification_is_ignored() {
        let (_, state) = state();
        let ledger = Arc::clone(&state.ledger);
        let resp = build_router(state)
            .oneshot(post(
                r#"{"table":"Orders","operation":"read","exception":"ValidationException"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn malformed_notifications_are_rejected() {
        let (_, state) = state();
        let router = build_router(state);

        for body in [
            r#"{"table":"Ghost","operation":"read"}"#,
            r#"{"table":"Orders","operation":"scan"}"#,
            r#"{"table":"Orders","operation":"read","timestamp":"noon"}"#,
            r#"{"table":"Orders"}"#,
            "not json",
        ] {
            let resp = router.clone().oneshot(post(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(json(resp).await["success"], false);
        }
    }

    #[tokio::test]
    async fn windows_show_sizes_and_in_flight() {
        let (_, state) = state();
        state.ledger.append("Orders", Operation::Read, 1);
        let _guard = state.controller.try_begin("Orders").unwrap();

        let resp = build_router(state).oneshot(get("/api/v1/windows")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["data"]["tables"][0]["table"], "Orders");
        assert_eq!(body["data"]["tables"][0]["read"], 1);
        assert_eq!(body["data"]["in_flight"][0], "Orders");
    }

    #[tokio::test]
    async fn throughput_report_is_served() {
        let (backend, state) = state();
        backend.push_datapoint(
            "Orders",
            Operation::Read,
            ConsumedDatapoint {
                timestamp: epoch_millis() - 60_000,
                sum: 1_500.0,
            },
        );

        let resp = build_router(state).oneshot(get("/api/v1/throughput")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["data"]["tables"]["Orders"]["read"][0]["value"], 0.5);
    }

    #[tokio::test]
    async fn healthz_responds() {
        let (_, state) = state();
        let resp = build_router(state).oneshot(get("/healthz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
