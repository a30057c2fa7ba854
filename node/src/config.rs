//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use tangle_types::ConsensusParams;

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a tangle consensus node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Consensus tuning lives in the
/// `[consensus]` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Consensus parameters; missing keys fall back to their defaults.
    #[serde(default)]
    pub consensus: ConsensusParams,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How often the scheduler looks for a transaction to validate.
    #[serde(default = "default_scheduler_interval_ms")]
    pub scheduler_interval_ms: u64,

    /// How often idle rounds are re-sampled and overdue ones given up.
    #[serde(default = "default_round_watchdog_interval_secs")]
    pub round_watchdog_interval_secs: u64,

    /// How often stale validation leases are dropped.
    #[serde(default = "default_lease_purge_interval_secs")]
    pub lease_purge_interval_secs: u64,

    /// How often the mutex queue is checked for stuck jobs.
    #[serde(default = "default_deadlock_check_interval_secs")]
    pub deadlock_check_interval_secs: u64,

    /// Whether to run the periodic gauge refresh.
    #[serde(default)]
    pub enable_metrics: bool,

    /// How often gauges are refreshed when metrics are enabled.
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_scheduler_interval_ms() -> u64 {
    500
}

fn default_round_watchdog_interval_secs() -> u64 {
    5
}

fn default_lease_purge_interval_secs() -> u64 {
    10
}

fn default_deadlock_check_interval_secs() -> u64 {
    30
}

fn default_metrics_interval_secs() -> u64 {
    15
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let c = &self.consensus;
        if c.round_node_count == 0 {
            return Err(NodeError::Config("consensus.round_node_count must be > 0".into()));
        }
        if c.parallel_process_max == 0 {
            return Err(NodeError::Config(
                "consensus.parallel_process_max must be > 0".into(),
            ));
        }
        if c.validation_required == 0 || c.validation_required > c.validation_max {
            return Err(NodeError::Config(format!(
                "consensus.validation_required ({}) must be in 1..=validation_max ({})",
                c.validation_required, c.validation_max
            )));
        }
        if self.scheduler_interval_ms == 0 {
            return Err(NodeError::Config("scheduler_interval_ms must be > 0".into()));
        }
        self.log_format().map(|_| ())
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse().map_err(NodeError::Config)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }

    pub fn round_watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.round_watchdog_interval_secs.max(1))
    }

    pub fn lease_purge_interval(&self) -> Duration {
        Duration::from_secs(self.lease_purge_interval_secs.max(1))
    }

    pub fn deadlock_check_interval(&self) -> Duration {
        Duration::from_secs(self.deadlock_check_interval_secs.max(1))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            consensus: ConsensusParams::default(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            scheduler_interval_ms: default_scheduler_interval_ms(),
            round_watchdog_interval_secs: default_round_watchdog_interval_secs(),
            lease_purge_interval_secs: default_lease_purge_interval_secs(),
            deadlock_check_interval_secs: default_deadlock_check_interval_secs(),
            enable_metrics: false,
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.consensus, config.consensus);
        assert_eq!(parsed.scheduler_interval_ms, config.scheduler_interval_ms);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.consensus, ConsensusParams::default());
        assert_eq!(config.scheduler_interval_ms, 500);
        assert_eq!(config.log_format, "human");
        assert_eq!(config.log_format().unwrap(), LogFormat::Human);
    }

    #[test]
    fn partial_consensus_table_overrides() {
        let toml = r#"
            log_format = "json"

            [consensus]
            round_node_count = 5
            parallel_process_max = 4
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.consensus.round_node_count, 5);
        assert_eq!(config.consensus.parallel_process_max, 4);
        assert_eq!(config.consensus.validation_max, 5); // default
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
    }

    #[test]
    fn unusable_settings_are_rejected() {
        for toml in [
            "[consensus]\nround_node_count = 0",
            "[consensus]\nvalidation_required = 6",
            "scheduler_interval_ms = 0",
            "log_format = \"xml\"",
        ] {
            assert!(
                matches!(NodeConfig::from_toml_str(toml), Err(NodeError::Config(_))),
                "{toml} should be rejected"
            );
        }
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/tangle.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
