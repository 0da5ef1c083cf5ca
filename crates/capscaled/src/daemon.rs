//! Subsystem wiring.

use std::sync::Arc;

use tracing::{info, warn};

use capscale_analyzer::EmaPeak;
use capscale_api::ApiState;
use capscale_autoscale::{LoopSettings, ScalingLoop};
use capscale_controller::CapacityController;
use capscale_core::{CapscaleConfig, InMemoryBackend};
use capscale_ingest::IngestionAdapter;
use capscale_ledger::ExceptionLedger;
use capscale_report::ThroughputReporter;

/// Every subsystem of a running daemon.
pub struct Daemon {
    pub backend: InMemoryBackend,
    pub ledger: Arc<ExceptionLedger>,
    pub scaler: ScalingLoop,
    pub api: ApiState,
}

/// Build the subsystems described by `config`.
///
/// Tables come from the in-memory backend seeded by `[[tables]]`. Fails
/// when the initial table listing fails.
pub async fn assemble(config: &CapscaleConfig) -> anyhow::Result<Daemon> {
    let scaling = &config.scaling;
    if scaling.threshold.is_some() {
        warn!("scaling.threshold is no longer used and is ignored");
    }

    let backend = InMemoryBackend::with_tables(
        config
            .tables
            .iter()
            .map(|t| (t.name.clone(), t.capacity())),
    );
    info!(tables = config.tables.len(), "in-memory table backend seeded");

    let ledger = Arc::new(ExceptionLedger::new());
    let controller = CapacityController::new(Arc::new(backend.clone()), scaling.call_timeout())
        .with_max_capacity(scaling.max_capacity);
    let model = Arc::new(EmaPeak::new(scaling.ema_window));

    let scaler = ScalingLoop::connect(
        Arc::new(backend.clone()),
        Arc::clone(&ledger),
        controller.clone(),
        model,
        LoopSettings::from(scaling),
    )
    .await?;

    let reporter = ThroughputReporter::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        &config.report,
    )
    .with_call_timeout(scaling.call_timeout());

    let api = ApiState {
        adapter: IngestionAdapter::new(Arc::clone(&ledger)),
        ledger: Arc::clone(&ledger),
        controller,
        reporter,
    };

    Ok(Daemon {
        backend,
        ledger,
        scaler,
        api,
    })
}
