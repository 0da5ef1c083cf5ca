//! capscale.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::ProvisionedCapacity;

/// Upper bound on buckets per window (one day of one-second buckets).
pub const MAX_BUCKETS: u64 = 86_400;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapscaleConfig {
    pub scaling: ScalingSettings,
    pub report: ReportSettings,
    pub api: ApiSettings,
    /// Tables seeded into the in-memory backend when running simulated.
    pub tables: Vec<SeedTable>,
}

/// How the exception window is trimmed after each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// Keep events newer than `now - interval`.
    #[default]
    Sliding,
    /// Drop everything older than the tick instant.
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingSettings {
    /// Tick period in milliseconds.
    pub interval_ms: u64,
    /// Legacy count threshold. Parsed for compatibility, never consulted.
    pub threshold: Option<u64>,
    /// EMA smoothing window length.
    pub ema_window: usize,
    /// Seconds per rate-series bucket.
    pub bucket_size_secs: u64,
    pub window_mode: WindowMode,
    /// Upper bound for any single remote call made by the controller.
    pub call_timeout_ms: u64,
    /// Provisioned capacity is never raised above this value.
    pub max_capacity: Option<u64>,
}

impl Default for ScalingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            threshold: None,
            ema_window: 5,
            bucket_size_secs: 1,
            window_mode: WindowMode::Sliding,
            call_timeout_ms: 10_000,
            max_capacity: None,
        }
    }
}

impl ScalingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn bucket_size(&self) -> Duration {
        Duration::from_secs(self.bucket_size_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// How far back the throughput report looks.
    pub lookback_minutes: u64,
    /// Statistics period in seconds.
    pub period_secs: u64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            lookback_minutes: 600,
            period_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTable {
    pub name: String,
    pub read: u64,
    pub write: u64,
}

impl SeedTable {
    pub fn capacity(&self) -> ProvisionedCapacity {
        ProvisionedCapacity::new(self.read, self.write)
    }
}

impl CapscaleConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CapscaleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a starter capscale.toml with one simulated table.
    pub fn scaffold(table: &str) -> Self {
        CapscaleConfig {
            tables: vec![SeedTable {
                name: table.to_string(),
                read: 5,
                write: 5,
            }],
            ..Default::default()
        }
    }

    /// Reject settings the scaling loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scaling;
        if s.interval_ms == 0 {
            return Err(ConfigError::Invalid("scaling.interval_ms must be > 0".into()));
        }
        if s.bucket_size_secs == 0 {
            return Err(ConfigError::Invalid(
                "scaling.bucket_size_secs must be > 0".into(),
            ));
        }
        if s.bucket_size_secs.saturating_mul(1000) > s.interval_ms {
            return Err(ConfigError::Invalid(format!(
                "scaling.bucket_size_secs ({}s) exceeds the interval ({}ms)",
                s.bucket_size_secs, s.interval_ms
            )));
        }
        let buckets = s.interval_ms.div_ceil(s.bucket_size_secs.saturating_mul(1000));
        if buckets > MAX_BUCKETS {
            return Err(ConfigError::Invalid(format!(
                "scaling.interval_ms / bucket_size_secs gives {buckets} buckets, more than {MAX_BUCKETS}"
            )));
        }
        if s.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "scaling.call_timeout_ms must be > 0".into(),
            ));
        }
        if self.report.period_secs == 0 {
            return Err(ConfigError::Invalid("report.period_secs must be > 0".into()));
        }
        for table in &self.tables {
            if table.read == 0 || table.write == 0 {
                return Err(ConfigError::Invalid(format!(
                    "table {} must have positive read and write capacity",
                    table.name
                )));
            }
        }
        Ok(())
    }
}
