//! Throughput reporter.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use capscale_core::config::ReportSettings;
use capscale_core::{
    ConsumedDatapoint, Operation, ProvisionedCapacity, RemoteError, StatisticsService, TableId,
    TableService, Timestamp,
};

/// One consumed-capacity datapoint as a fraction of provisioned capacity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPoint {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// Normalized series for both operations of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct TableThroughput {
    pub read: Vec<NormalizedPoint>,
    pub write: Vec<NormalizedPoint>,
}

/// Report across all tables. Tables that could not be read appear in
/// `errors` instead of `tables`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ThroughputReport {
    pub generated_at: Timestamp,
    pub tables: BTreeMap<TableId, TableThroughput>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<TableId, String>,
}

/// Builds [`ThroughputReport`]s from the table and statistics services.
#[derive(Clone)]
pub struct ThroughputReporter {
    tables: Arc<dyn TableService>,
    stats: Arc<dyn StatisticsService>,
    lookback: Duration,
    period_secs: u64,
    call_timeout: Duration,
}

impl ThroughputReporter {
    pub fn new(
        tables: Arc<dyn TableService>,
        stats: Arc<dyn StatisticsService>,
        settings: &ReportSettings,
    ) -> Self {
        Self {
            tables,
            stats,
            lookback: Duration::from_secs(settings.lookback_minutes.saturating_mul(60)),
            period_secs: settings.period_secs.max(1),
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Build the report for the lookback window ending at `now`.
    pub async fn report(&self, now: Timestamp) -> ThroughputReport {
        let mut report = ThroughputReport {
            generated_at: now,
            ..ThroughputReport::default()
        };

        let names = match self.bounded(self.tables.list_tables()).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "throughput report could not list tables");
                report.errors.insert("*".to_string(), e.to_string());
                return report;
            }
        };

        let mut tasks = JoinSet::new();
        for table in names {
            let reporter = self.clone();
            tasks.spawn(async move {
                let result = reporter.table_throughput(&table, now).await;
                (table, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((table, Ok(throughput))) => {
                    report.tables.insert(table, throughput);
                }
                Ok((table, Err(e))) => {
                    warn!(%table, error = %e, "throughput report failed for table");
                    report.errors.insert(table, e.to_string());
                }
                Err(e) => warn!(error = %e, "throughput task did not complete"),
            }
        }

        debug!(
            tables = report.tables.len(),
            errors = report.errors.len(),
            "throughput report built"
        );
        report
    }

    async fn table_throughput(
        &self,
        table: &str,
        now: Timestamp,
    ) -> Result<TableThroughput, RemoteError> {
        let capacity = self.bounded(self.tables.describe_capacity(table)).await?;
        let lookback_ms = u64::try_from(self.lookback.as_millis()).unwrap_or(u64::MAX);
        let start = now.saturating_sub(lookback_ms);

        let mut throughput = TableThroughput::default();
        for operation in Operation::ALL {
            let points = self
                .bounded(
                    self.stats
                        .consumed_capacity(table, operation, start, now, self.period_secs),
                )
                .await?;
            let normalized = normalize(&points, self.period_secs, capacity, operation);
            match operation {
                Operation::Read => throughput.read = normalized,
                Operation::Write => throughput.write = normalized,
            }
        }
        Ok(throughput)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| {
                RemoteError::Unavailable(format!(
                    "no answer within {}ms",
                    self.call_timeout.as_millis()
                ))
            })?
    }
}

/// Express datapoints as a fraction of provisioned capacity.
///
/// A zero capacity yields zero rather than infinity.
pub fn normalize(
    points: &[ConsumedDatapoint],
    period_secs: u64,
    capacity: ProvisionedCapacity,
    operation: Operation,
) -> Vec<NormalizedPoint> {
    let provisioned = capacity.get(operation) as f64;
    let period = period_secs.max(1) as f64;
    points
        .iter()
        .map(|p| NormalizedPoint {
            timestamp: p.timestamp,
            value: if provisioned > 0.0 {
                (p.sum / period) / provisioned
            } else {
                0.0
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use capscale_core::InMemoryBackend;

    const NOW: Timestamp = 100_000_000;

    fn reporter(backend: &InMemoryBackend) -> ThroughputReporter {
        ThroughputReporter::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            &ReportSettings::default(),
        )
    }

    fn point(timestamp: Timestamp, sum: f64) -> ConsumedDatapoint {
        ConsumedDatapoint { timestamp, sum }
    }

    #[test]
    fn normalize_divides_by_period_and_capacity() {
        let cap = ProvisionedCapacity::new(10, 4);
        let out = normalize(&[point(1, 1_500.0)], 300, cap, Operation::Read);
        assert_eq!(out, vec![NormalizedPoint { timestamp: 1, value: 0.5 }]);
        let out = normalize(&[point(1, 1_200.0)], 300, cap, Operation::Write);
        assert_eq!(out[0].value, 1.0);
        let out = normalize(&[point(1, 1.0)], 300, ProvisionedCapacity::new(0, 0), Operation::Read);
        assert_eq!(out[0].value, 0.0);
    }

    #[tokio::test]
    async fn report_covers_every_table() {
        let backend = InMemoryBackend::with_tables([
            ("Orders", ProvisionedCapacity::new(10, 20)),
            ("Feed", ProvisionedCapacity::new(5, 5)),
        ]);
        backend.push_datapoint("Orders", Operation::Read, point(NOW - 600_000, 3_000.0));
        backend.push_datapoint("Orders", Operation::Write, point(NOW - 300_000, 3_000.0));
        // Outside the 600 minute lookback.
        backend.push_datapoint("Orders", Operation::Read, point(NOW - 36_000_001, 9.0));

        let report = reporter(&backend).report(NOW).await;
        assert!(report.errors.is_empty());
        assert_eq!(report.tables.len(), 2);

        let orders = &report.tables["Orders"];
        assert_eq!(orders.read, vec![NormalizedPoint { timestamp: NOW - 600_000, value: 1.0 }]);
        assert_eq!(orders.write[0].value, 0.5);
        assert_eq!(report.tables["Feed"], TableThroughput::default());
    }

    #[tokio::test]
    async fn failing_table_is_contained() {
        let backend = InMemoryBackend::with_tables([
            ("Orders", ProvisionedCapacity::new(10, 10)),
            ("Feed", ProvisionedCapacity::new(5, 5)),
        ]);
        backend.fail_statistics("Feed", RemoteError::Unavailable("throttled".into()));

        let report = reporter(&backend).report(NOW).await;
        assert!(report.tables.contains_key("Orders"));
        assert!(!report.tables.contains_key("Feed"));
        assert!(report.errors["Feed"].contains("throttled"));
    }

    #[tokio::test]
    async fn list_failure_yields_empty_report() {
        let backend = InMemoryBackend::with_tables([("Orders", ProvisionedCapacity::new(1, 1))]);
        backend.fail_list(Some(RemoteError::Unavailable("down".into())));

        let report = reporter(&backend).report(NOW).await;
        assert!(report.tables.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn report_serializes_table_map() {
        let backend = InMemoryBackend::with_tables([("Orders", ProvisionedCapacity::new(1, 1))]);
        let report = reporter(&backend).report(NOW).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["generated_at"], NOW);
        assert!(json["tables"]["Orders"]["read"].is_array());
        assert!(json.get("errors").is_none());
    }

    #[tokio::test]
    async fn oversized_lookback_reaches_back_to_epoch() {
        let backend = InMemoryBackend::with_tables([("Orders", ProvisionedCapacity::new(1, 1))]);
        backend.push_datapoint("Orders", Operation::Write, point(0, 300.0));
        let settings = ReportSettings {
            lookback_minutes: u64::MAX,
            ..ReportSettings::default()
        };
        let reporter =
            ThroughputReporter::new(Arc::new(backend.clone()), Arc::new(backend.clone()), &settings);

        let report = reporter.report(NOW).await;
        assert_eq!(
            report.tables["Orders"].write,
            vec![NormalizedPoint { timestamp: 0, value: 1.0 }]
        );
    }
}
