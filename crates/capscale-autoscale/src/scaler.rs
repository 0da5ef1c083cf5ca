//! Scaling loop — drives the ledger → model → controller pipeline.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use capscale_analyzer::TrendModel;
use capscale_controller::{CapacityController, ScaleOutcome};
use capscale_core::config::{ScalingSettings, WindowMode};
use capscale_core::{
    Operation, RemoteError, ScaleRecommendation, TableId, TableService, Timestamp, Trend,
    epoch_millis,
};
use capscale_ledger::{ExceptionLedger, RateSeries};

/// Raised when the loop cannot be started.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("initial table listing failed: {0}")]
    ListTables(#[from] RemoteError),

    #[error("initial table listing timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Ticking,
}

/// Timing parameters of the loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interval: Duration,
    pub bucket: Duration,
    pub window_mode: WindowMode,
    /// Bound on the per-tick `list_tables` call.
    pub list_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&ScalingSettings::default())
    }
}

impl From<&ScalingSettings> for LoopSettings {
    fn from(s: &ScalingSettings) -> Self {
        Self {
            interval: s.interval(),
            bucket: s.bucket_size(),
            window_mode: s.window_mode,
            list_timeout: s.call_timeout(),
        }
    }
}

/// What the model saw and said for one (table, operation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAnalysis {
    pub table: TableId,
    pub operation: Operation,
    /// Events in the snapshot handed to the model.
    pub events: usize,
    pub trend: Trend,
}

/// Everything one tick did.
///
/// `dispatched` holds the spawned controller calls, at most one per table.
/// Dropping the report detaches them; [`TickReport::join`] waits for their
/// outcomes.
#[derive(Debug)]
pub struct TickReport {
    pub at: Timestamp,
    pub analyzed: Vec<KeyAnalysis>,
    /// Recommendations dropped because the table already had an update
    /// in flight.
    pub dropped: Vec<ScaleOutcome>,
    pub dispatched: Vec<JoinHandle<Vec<ScaleOutcome>>>,
}

impl TickReport {
    pub fn analysis(&self, table: &str, operation: Operation) -> Option<&KeyAnalysis> {
        self.analyzed
            .iter()
            .find(|a| a.table == table && a.operation == operation)
    }

    /// Wait for every dispatched update and return all outcomes, dropped
    /// recommendations first.
    pub async fn join(self) -> Vec<ScaleOutcome> {
        let mut outcomes = self.dropped;
        for handle in self.dispatched {
            match handle.await {
                Ok(done) => outcomes.extend(done),
                Err(e) => warn!(error = %e, "scale task did not complete"),
            }
        }
        outcomes
    }
}

/// The periodic evaluation loop.
pub struct ScalingLoop {
    tables: Arc<dyn TableService>,
    ledger: Arc<ExceptionLedger>,
    controller: CapacityController,
    model: Arc<dyn TrendModel>,
    settings: LoopSettings,
    known_tables: Vec<TableId>,
    state: watch::Sender<LoopState>,
    outcomes: Option<mpsc::UnboundedSender<ScaleOutcome>>,
}

impl ScalingLoop {
    /// List the tables once and build the loop.
    ///
    /// Fails when the listing errors or does not answer within
    /// `settings.list_timeout`; the caller decides whether to retry.
    pub async fn connect(
        tables: Arc<dyn TableService>,
        ledger: Arc<ExceptionLedger>,
        controller: CapacityController,
        model: Arc<dyn TrendModel>,
        settings: LoopSettings,
    ) -> Result<Self, BootstrapError> {
        let known_tables = tokio::time::timeout(settings.list_timeout, tables.list_tables())
            .await
            .map_err(|_| BootstrapError::Timeout(settings.list_timeout))??;

        ledger.sync_tables(&known_tables);
        info!(
            tables = known_tables.len(),
            model = model.name(),
            interval_ms = settings.interval.as_millis() as u64,
            "scaling loop connected"
        );

        let (state, _) = watch::channel(LoopState::Idle);
        Ok(Self {
            tables,
            ledger,
            controller,
            model,
            settings,
            known_tables,
            state,
            outcomes: None,
        })
    }

    /// Forward every outcome (dispatched or dropped) to `tx`.
    pub fn with_outcome_sender(mut self, tx: mpsc::UnboundedSender<ScaleOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub fn known_tables(&self) -> &[TableId] {
        &self.known_tables
    }

    pub fn controller(&self) -> &CapacityController {
        &self.controller
    }

    fn cutoff(&self, now: Timestamp) -> Timestamp {
        match self.settings.window_mode {
            WindowMode::Sliding => now.saturating_sub(self.settings.interval.as_millis() as u64),
            WindowMode::Reset => now,
        }
    }

    async fn refresh_tables(&mut self) {
        match tokio::time::timeout(self.settings.list_timeout, self.tables.list_tables()).await {
            Ok(Ok(tables)) => self.known_tables = tables,
            Ok(Err(e)) => {
                warn!(error = %e, kept = self.known_tables.len(), "table listing failed, keeping last known tables")
            }
            Err(_) => {
                warn!(kept = self.known_tables.len(), "table listing timed out, keeping last known tables")
            }
        }
        self.ledger.sync_tables(&self.known_tables);
    }

    /// Run one evaluation as of `now`.
    pub async fn tick_at(&mut self, now: Timestamp) -> TickReport {
        self.state.send_replace(LoopState::Ticking);
        self.refresh_tables().await;

        let cutoff = self.cutoff(now);
        let mut report = TickReport {
            at: now,
            analyzed: Vec::new(),
            dropped: Vec::new(),
            dispatched: Vec::new(),
        };

        for table in &self.known_tables {
            let mut raises = Vec::new();
            for operation in Operation::ALL {
                let stamps = self.ledger.snapshot_and_trim(table, operation, cutoff);
                let series = RateSeries::from_window(
                    &stamps,
                    now,
                    self.settings.interval,
                    self.settings.bucket,
                );
                let trend = self.model.recommend(&series);
                report.analyzed.push(KeyAnalysis {
                    table: table.clone(),
                    operation,
                    events: stamps.len(),
                    trend,
                });

                let rec = ScaleRecommendation::new(table, operation, trend);
                if rec.is_actionable() {
                    debug!(%table, %operation, delta = rec.delta, events = stamps.len(), "throttling trend rising");
                    raises.push((operation, rec.delta));
                }
            }
            if raises.is_empty() {
                continue;
            }

            // Both operations of a table go out in one update.
            match self.controller.try_begin(table) {
                Some(guard) => {
                    let controller = self.controller.clone();
                    let sender = self.outcomes.clone();
                    report.dispatched.push(tokio::spawn(async move {
                        let outcomes = controller.apply_claimed_many(guard, &raises).await;
                        if let Some(tx) = sender {
                            for outcome in &outcomes {
                                let _ = tx.send(outcome.clone());
                            }
                        }
                        outcomes
                    }));
                }
                None => {
                    for (operation, delta) in raises {
                        info!(%table, %operation, delta, "update already in flight, dropping recommendation");
                        let outcome = ScaleOutcome::AlreadyInFlight {
                            table: table.clone(),
                            operation,
                            delta,
                        };
                        if let Some(tx) = &self.outcomes {
                            let _ = tx.send(outcome.clone());
                        }
                        report.dropped.push(outcome);
                    }
                }
            }
        }

        debug!(
            tables = self.known_tables.len(),
            dispatched = report.dispatched.len(),
            dropped = report.dropped.len(),
            cutoff,
            "tick complete"
        );
        self.state.send_replace(LoopState::Idle);
        report
    }

    /// Tick every `interval` until shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            "scaling loop started"
        );

        let mut timer = tokio::time::interval_at(
            tokio::time::Instant::now() + self.settings.interval,
            self.settings.interval,
        );
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let report = self.tick_at(epoch_millis()).await;
                    if !report.dispatched.is_empty() || !report.dropped.is_empty() {
                        info!(
                            dispatched = report.dispatched.len(),
                            dropped = report.dropped.len(),
                            "scale actions issued"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("scaling loop shutting down");
                    break;
                }
            }
        }
    }
}
