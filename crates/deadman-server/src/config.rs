//! Server configuration, parsed from TOML file + environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use deadman_vault::{Address, HeartbeatConfig, LedgerConfig, WithdrawPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "ledger_state.json";
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Top-level server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// General server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Certificate registry settings
    #[serde(default)]
    pub registry: RegistrySection,

    /// Vault behaviour
    #[serde(default)]
    pub vault: VaultSection,

    /// Heartbeat thresholds
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// General server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Data directory (ledger state file)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Check interval in seconds (default: 1 hour)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            check_interval_secs: default_check_interval(),
            log_level: default_log_level(),
        }
    }
}

/// Certificate registry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySection {
    /// Identity allowed to change the minter allowlist.
    /// Only used when no ledger state exists yet. Zero disables administration.
    #[serde(default)]
    pub admin: Address,
}

/// Vault behaviour settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultSection {
    /// Whether owners may withdraw from expired, unclaimed vaults
    #[serde(default)]
    pub withdraw_policy: WithdrawPolicy,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_check_interval() -> u64 {
    3600 // 1 hour
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `DEADMAN_DATA_DIR`
    /// - `DEADMAN_CHECK_INTERVAL`
    /// - `DEADMAN_LOG_LEVEL`
    /// - `DEADMAN_REGISTRY_ADMIN`
    /// - `DEADMAN_WITHDRAW_POLICY`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("DEADMAN_DATA_DIR") {
            self.server.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DEADMAN_CHECK_INTERVAL") {
            self.server.check_interval_secs = v
                .parse::<u64>()
                .with_context(|| format!("DEADMAN_CHECK_INTERVAL is not a number: {}", v))?;
        }
        if let Ok(v) = std::env::var("DEADMAN_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("DEADMAN_REGISTRY_ADMIN") {
            self.registry.admin = v
                .parse()
                .with_context(|| format!("DEADMAN_REGISTRY_ADMIN is not an address: {}", v))?;
        }
        if let Ok(v) = std::env::var("DEADMAN_WITHDRAW_POLICY") {
            self.vault.withdraw_policy = v
                .parse()
                .map_err(|e: String| anyhow::anyhow!("DEADMAN_WITHDRAW_POLICY: {}", e))?;
        }
        Ok(())
    }

    /// Where the ledger snapshot lives
    pub fn state_path(&self) -> PathBuf {
        self.server.data_dir.join(STATE_FILE)
    }

    /// Ledger settings derived from this config
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            withdraw_policy: self.vault.withdraw_policy,
            heartbeat: self.heartbeat.clone(),
        }
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        // Check interval must be at least 60 seconds
        anyhow::ensure!(
            self.server.check_interval_secs >= 60,
            "server.check_interval_secs must be >= 60"
        );

        anyhow::ensure!(
            LOG_LEVELS.contains(&self.server.log_level.to_lowercase().as_str()),
            "server.log_level must be one of {:?}",
            LOG_LEVELS
        );

        self.heartbeat
            .validate()
            .context("heartbeat thresholds are invalid")?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn full_toml() -> &'static str {
        r#"
[server]
data_dir = "/custom/data"
check_interval_secs = 600
log_level = "debug"

[registry]
admin = "0x00000000000000000000000000000000000000aa"

[vault]
withdraw_policy = "block_when_expired"

[heartbeat]
ping_threshold = 0.5
critical_threshold = 0.8
"#
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_parse_empty_config() {
        let file = write_config("");

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.check_interval_secs, 3600); // default
        assert_eq!(config.server.data_dir, PathBuf::from("/data"));
        assert!(config.registry.admin.is_zero());
        assert_eq!(config.vault.withdraw_policy, WithdrawPolicy::AllowWhenExpired);
        assert_eq!(config.heartbeat, HeartbeatConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let file = write_config(full_toml());

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.server.check_interval_secs, 600);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(
            config.registry.admin.to_string(),
            "0x00000000000000000000000000000000000000aa"
        );
        assert_eq!(config.vault.withdraw_policy, WithdrawPolicy::BlockWhenExpired);
        assert_eq!(config.heartbeat.ping_threshold, 0.5);

        let ledger = config.ledger_config();
        assert_eq!(ledger.withdraw_policy, WithdrawPolicy::BlockWhenExpired);
        assert_eq!(ledger.heartbeat.critical_threshold, 0.8);
        assert_eq!(
            config.state_path(),
            PathBuf::from("/custom/data/ledger_state.json")
        );
    }

    #[test]
    fn test_bad_admin_rejected() {
        let file = write_config("[registry]\nadmin = \"not-an-address\"\n");
        assert!(ServerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let file = write_config("");
        let mut config = ServerConfig::from_file(file.path()).unwrap();

        // Set env vars
        std::env::set_var("DEADMAN_DATA_DIR", "/env/data");
        std::env::set_var("DEADMAN_CHECK_INTERVAL", "1800");
        std::env::set_var("DEADMAN_WITHDRAW_POLICY", "block");
        std::env::set_var(
            "DEADMAN_REGISTRY_ADMIN",
            "0x00000000000000000000000000000000000000bb",
        );

        let result = config.apply_env_overrides();

        // Clean up
        std::env::remove_var("DEADMAN_DATA_DIR");
        std::env::remove_var("DEADMAN_CHECK_INTERVAL");
        std::env::remove_var("DEADMAN_WITHDRAW_POLICY");
        std::env::remove_var("DEADMAN_REGISTRY_ADMIN");

        result.unwrap();
        assert_eq!(config.server.data_dir, PathBuf::from("/env/data"));
        assert_eq!(config.server.check_interval_secs, 1800);
        assert_eq!(config.vault.withdraw_policy, WithdrawPolicy::BlockWhenExpired);
        assert_eq!(
            config.registry.admin.to_string(),
            "0x00000000000000000000000000000000000000bb"
        );
    }

    #[test]
    fn test_validation_check_interval_too_low() {
        let file = write_config("[server]\ncheck_interval_secs = 30\n");
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_unknown_log_level() {
        let file = write_config("[server]\nlog_level = \"loud\"\n");
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_thresholds() {
        let file = write_config("[heartbeat]\nping_threshold = 0.9\ncritical_threshold = 0.5\n");
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let file = write_config(full_toml());

        let config = ServerConfig::from_file(file.path()).unwrap();
        let serialized = toml::to_string_pretty(&config).unwrap();

        // Should be valid TOML that re-parses
        let reparsed: ServerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.registry.admin, config.registry.admin);
        assert_eq!(reparsed.vault.withdraw_policy, config.vault.withdraw_policy);
        assert_eq!(reparsed.heartbeat, config.heartbeat);
    }
}
