//! The daemon loop: periodically loads the ledger and reports vault liveness.

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use deadman_vault::{
    Clock, Command, ErrorKind, HeartbeatAction, HeartbeatStatus, Ledger, LedgerSnapshot, Outcome,
    SystemClock,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Result of one applied command
#[derive(Debug, Serialize)]
pub struct CommandReport {
    pub index: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl CommandReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Run the daemon loop. Blocks forever (until shutdown signal).
pub async fn run(config: ServerConfig) -> Result<()> {
    log::info!("Deadman server starting…");
    log::info!(
        "  Interval:   {} seconds ({:.1} hours)",
        config.server.check_interval_secs,
        config.server.check_interval_secs as f64 / 3600.0
    );
    log::info!("  Data dir:   {}", config.server.data_dir.display());
    log::info!("  Withdraw:   {:?}", config.vault.withdraw_policy);
    log::info!(
        "  Thresholds: ping at {:.0}%, critical at {:.0}%",
        config.heartbeat.ping_threshold * 100.0,
        config.heartbeat.critical_threshold * 100.0
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data dir: {}",
            config.server.data_dir.display()
        )
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let interval = Duration::from_secs(config.server.check_interval_secs);

    // Run first check immediately, then loop
    let mut first = true;
    loop {
        if !first {
            log::info!(
                "Sleeping {} seconds until next check…",
                config.server.check_interval_secs
            );
            tokio::time::sleep(interval).await;
        }
        first = false;

        match run_check_cycle(&config, Arc::clone(&clock)) {
            Ok(_) => log::info!("Check cycle completed successfully."),
            Err(e) => log::error!("Check cycle failed: {:#}", e),
        }
    }
}

/// Load the persisted ledger, or an empty one if none exists yet.
pub fn open_ledger(config: &ServerConfig, clock: Arc<dyn Clock>) -> Result<Ledger> {
    let path = config.state_path();
    let snapshot = LedgerSnapshot::load(&path, config.registry.admin)
        .with_context(|| format!("Failed to load ledger state from {}", path.display()))?;
    Ledger::from_snapshot(snapshot, clock, config.ledger_config())
        .with_context(|| format!("Failed to restore ledger from {}", path.display()))
}

/// Persist the ledger to the configured state file.
pub fn save_ledger(config: &ServerConfig, ledger: &Ledger) -> Result<()> {
    let path = config.state_path();
    ledger
        .snapshot()?
        .save(&path)
        .with_context(|| format!("Failed to save ledger state to {}", path.display()))
}

/// Execute a single check cycle: load state, evaluate every vault, log the result.
pub fn run_check_cycle(
    config: &ServerConfig,
    clock: Arc<dyn Clock>,
) -> Result<Vec<HeartbeatStatus>> {
    log::info!("Starting check cycle…");

    let ledger = open_ledger(config, clock)?;
    let statuses = ledger.heartbeat()?;

    let mut attention = 0;
    for status in &statuses {
        match status.action {
            HeartbeatAction::Healthy => {
                log::debug!(
                    "[{}] healthy, {} remaining",
                    status.vault,
                    format_duration(status.seconds_remaining)
                );
            }
            HeartbeatAction::PingRecommended => {
                attention += 1;
                log::warn!(
                    "[{}] ⚠️  Ping recommended: owner {} has {} left (expires {})",
                    status.vault,
                    status.owner,
                    format_duration(status.seconds_remaining),
                    format_timestamp(status.expires_at)
                );
            }
            HeartbeatAction::PingRequired => {
                attention += 1;
                log::warn!(
                    "[{}] 🔴 CRITICAL: owner {} must ping within {} (expires {})",
                    status.vault,
                    status.owner,
                    format_duration(status.seconds_remaining),
                    format_timestamp(status.expires_at)
                );
            }
            HeartbeatAction::Expired => {
                attention += 1;
                match status.beneficiary {
                    Some(beneficiary) => log::warn!(
                        "[{}] Expired since {}; claimable by {}",
                        status.vault,
                        format_timestamp(status.expires_at),
                        beneficiary
                    ),
                    None => log::warn!(
                        "[{}] Expired since {}; no beneficiary set",
                        status.vault,
                        format_timestamp(status.expires_at)
                    ),
                }
            }
        }
    }

    log::info!(
        "Vaults: {}  |  Need attention: {}  |  Certificates: {}",
        statuses.len(),
        attention,
        ledger.total_supply()?
    );

    Ok(statuses)
}

/// Execute a JSON array of commands against the persisted ledger, then save it.
///
/// Commands run in order. A rejected command is reported and does not stop
/// the ones after it.
pub fn apply_commands(
    config: &ServerConfig,
    clock: Arc<dyn Clock>,
    commands_path: &Path,
) -> Result<Vec<CommandReport>> {
    let contents = std::fs::read_to_string(commands_path)
        .with_context(|| format!("Failed to read commands file: {}", commands_path.display()))?;
    let commands: Vec<Command> =
        serde_json::from_str(&contents).with_context(|| "Failed to parse commands JSON")?;

    let ledger = open_ledger(config, clock)?;
    let mut reports = Vec::with_capacity(commands.len());

    for (index, command) in commands.iter().enumerate() {
        let op = command.op.name();
        match ledger.execute(command) {
            Ok(outcome) => {
                log::info!("#{} {} by {}: ok", index, op, command.caller);
                reports.push(CommandReport {
                    index,
                    op,
                    outcome: Some(outcome),
                    error: None,
                    kind: None,
                });
            }
            Err(e) => {
                log::warn!("#{} {} by {}: {}", index, op, command.caller, e);
                reports.push(CommandReport {
                    index,
                    op,
                    outcome: None,
                    error: Some(e.to_string()),
                    kind: Some(e.kind()),
                });
            }
        }
    }

    save_ledger(config, &ledger)?;
    Ok(reports)
}

fn format_timestamp(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else {
        format!("{}h {}m", hours, (secs % 3600) / 60)
    }
}
