//! Service configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use tally_ledger::LedgerConfig;

use crate::{LogFormat, NodeError};

/// One ledger endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    /// Vote contract on this endpoint. Falls back to
    /// [`ServiceConfig::fallback_contract_address`] when absent.
    #[serde(default)]
    pub contract_address: Option<String>,
}

/// Configuration for the vote service.
///
/// Can be loaded from a TOML file via [`ServiceConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Fixed for the life of the process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_primary")]
    pub primary: EndpointConfig,

    #[serde(default = "default_secondary")]
    pub secondary: EndpointConfig,

    /// Contract address shared by endpoints that do not name their own.
    #[serde(default)]
    pub fallback_contract_address: Option<String>,

    /// Operator secret the ledger key is derived from. Usually supplied via
    /// the `TALLY_LEDGER_SECRET` environment variable rather than the file.
    #[serde(default, skip_serializing)]
    pub encryption_secret: Option<String>,

    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Consecutive failed writes that force an endpoint offline.
    #[serde(default = "default_failure_ceiling")]
    pub failure_ceiling: u32,

    /// Cap on the recovery backoff exponent.
    #[serde(default = "default_sync_retry_ceiling")]
    pub sync_retry_ceiling: u32,

    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Upper bound on every contract call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause between per-ballot resubmissions during reconciliation.
    #[serde(default = "default_resync_delay_ms")]
    pub resync_delay_ms: u64,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Consecutive failed ticks after which the failure counter starts over.
    #[serde(default = "default_max_consecutive_tick_failures")]
    pub max_consecutive_tick_failures: u32,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_primary() -> EndpointConfig {
    EndpointConfig {
        name: "primary".to_string(),
        url: "http://127.0.0.1:8545".to_string(),
        contract_address: None,
    }
}

fn default_secondary() -> EndpointConfig {
    EndpointConfig {
        name: "secondary".to_string(),
        url: "http://127.0.0.1:8546".to_string(),
        contract_address: None,
    }
}

fn default_failure_ceiling() -> u32 {
    3
}

fn default_sync_retry_ceiling() -> u32 {
    5
}

fn default_sync_interval_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_resync_delay_ms() -> u64 {
    50
}

fn default_history_capacity() -> usize {
    100
}

fn default_max_consecutive_tick_failures() -> u32 {
    5
}

fn default_rpc_port() -> u16 {
    7080
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string. The secret is omitted.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Check the settings the service cannot run without.
    ///
    /// Contract address *format* is not checked here: a malformed address
    /// marks that endpoint `invalid_address` at runtime instead.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.secret().is_none() {
            return Err(NodeError::Config("encryption_secret is not set".into()));
        }
        for endpoint in [&self.primary, &self.secondary] {
            if endpoint.url.trim().is_empty() {
                return Err(NodeError::Config(format!("endpoint {} has no url", endpoint.name)));
            }
            if self.contract_address_for(endpoint).is_none() {
                return Err(NodeError::Config(format!(
                    "endpoint {} has no contract_address and no fallback_contract_address is set",
                    endpoint.name
                )));
            }
        }
        if self.primary.name == self.secondary.name {
            return Err(NodeError::Config("endpoint names must differ".into()));
        }
        if self.failure_ceiling == 0 {
            return Err(NodeError::Config("failure_ceiling must be at least 1".into()));
        }
        if self.sync_interval_secs == 0 || self.probe_timeout_secs == 0 || self.request_timeout_secs == 0
        {
            return Err(NodeError::Config("intervals and timeouts must be non-zero".into()));
        }
        self.log_format()?;
        Ok(())
    }

    /// The non-empty operator secret, if configured.
    pub fn secret(&self) -> Option<&str> {
        self.encryption_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn contract_address_for<'a>(&'a self, endpoint: &'a EndpointConfig) -> Option<&'a str> {
        endpoint
            .contract_address
            .as_deref()
            .or(self.fallback_contract_address.as_deref())
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn resync_delay(&self) -> Duration {
        Duration::from_millis(self.resync_delay_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
            fallback_contract_address: None,
            encryption_secret: None,
            ledger: LedgerConfig::default(),
            failure_ceiling: default_failure_ceiling(),
            sync_retry_ceiling: default_sync_retry_ceiling(),
            sync_interval_secs: default_sync_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            resync_delay_ms: default_resync_delay_ms(),
            history_capacity: default_history_capacity(),
            max_consecutive_tick_failures: default_max_consecutive_tick_failures(),
            rpc_port: default_rpc_port(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_crypto::CipherMode;
    use tally_ledger::CorruptionPolicy;

    const ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn valid() -> ServiceConfig {
        ServiceConfig {
            fallback_contract_address: Some(ADDRESS.into()),
            encryption_secret: Some("s3cret".into()),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = ServiceConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.failure_ceiling, 3);
        assert_eq!(config.sync_interval_secs, 10);
        assert_eq!(config.probe_timeout_secs, 5);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.rpc_port, 7080);
        assert_eq!(config.primary.name, "primary");
        assert_eq!(config.ledger.corruption_policy, CorruptionPolicy::Reinitialize);
    }

    #[test]
    fn nested_sections_override() {
        let toml = r#"
            fallback_contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            failure_ceiling = 5

            [primary]
            name = "node-a"
            url = "http://10.0.0.1:8545"

            [ledger]
            data_dir = "/var/lib/tally"
            cipher = "chacha20-poly1305-hmac"
            corruption_policy = "fail_fast"
        "#;
        let config = ServiceConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.primary.name, "node-a");
        assert_eq!(config.secondary.name, "secondary");
        assert_eq!(config.failure_ceiling, 5);
        assert_eq!(config.ledger.cipher, CipherMode::ChaCha20Poly1305Hmac);
        assert_eq!(config.ledger.corruption_policy, CorruptionPolicy::FailFast);
        assert_eq!(config.ledger.file_name, "emergency-ledger.enc");
    }

    #[test]
    fn secret_is_never_written_back() {
        let toml_str = valid().to_toml_string().unwrap();
        assert!(!toml_str.contains("s3cret"));
        let parsed = ServiceConfig::from_toml_str(&toml_str).unwrap();
        assert!(parsed.encryption_secret.is_none());
        assert_eq!(parsed.fallback_contract_address.as_deref(), Some(ADDRESS));
    }

    #[test]
    fn validate_requires_secret_and_contract() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.encryption_secret = Some("   ".into());
        assert!(config.validate().is_err());

        let mut config = valid();
        config.fallback_contract_address = None;
        assert!(config.validate().is_err());
        config.primary.contract_address = Some(ADDRESS.into());
        config.secondary.contract_address = Some(ADDRESS.into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_log_format_and_zero_ceiling() {
        let mut config = valid();
        config.log_format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.failure_ceiling = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn endpoint_address_prefers_own() {
        let mut config = valid();
        let own = "0x0000000000000000000000000000000000000002";
        config.primary.contract_address = Some(own.into());
        assert_eq!(config.contract_address_for(&config.primary), Some(own));
        assert_eq!(config.contract_address_for(&config.secondary), Some(ADDRESS));
    }
}
