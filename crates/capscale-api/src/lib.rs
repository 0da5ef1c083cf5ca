//! capscale-api — HTTP surface for capscale.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/notifications` | Ingest one throttling notification |
//! | GET | `/api/v1/throughput` | Normalized throughput report for every table |
//! | GET | `/api/v1/windows` | Ledger window sizes and tables with an update in flight |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use capscale_controller::CapacityController;
use capscale_ingest::IngestionAdapter;
use capscale_ledger::ExceptionLedger;
use capscale_report::ThroughputReporter;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub adapter: IngestionAdapter,
    pub ledger: Arc<ExceptionLedger>,
    pub controller: CapacityController,
    pub reporter: ThroughputReporter,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/notifications", post(handlers::post_notification))
        .route("/throughput", get(handlers::get_throughput))
        .route("/windows", get(handlers::get_windows))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
