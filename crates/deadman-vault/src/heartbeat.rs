//! Liveness evaluation for deadman vaults.
//!
//! Pure logic, no I/O. Takes a vault and the current time, returns a
//! recommendation. The caller (daemon, UI) decides whether to act on it.
//!
//! ```text
//! |--- Healthy ---|--- PingRecommended ---|--- PingRequired ---|--- Expired
//! 0%             75%                     90%                  100%
//! ```
//!
//! Thresholds are configurable.

use serde::{Deserialize, Serialize};

use crate::types::Address;
use crate::vault::Vault;

/// Heartbeat configuration: when to recommend a ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Fraction of the timeout elapsed before recommending a ping (0.0–1.0).
    /// Default: 0.75 (a quarter of the window left).
    #[serde(default = "default_ping_threshold")]
    pub ping_threshold: f64,

    /// Fraction of the timeout elapsed before a ping is critical (0.0–1.0).
    /// Default: 0.9.
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
}

fn default_ping_threshold() -> f64 {
    0.75
}

fn default_critical_threshold() -> f64 {
    0.9
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_threshold: default_ping_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

impl HeartbeatConfig {
    /// Validate that thresholds are sensible. NaN is rejected.
    pub fn validate(&self) -> Result<(), HeartbeatError> {
        if !(self.ping_threshold > 0.0 && self.ping_threshold < 1.0) {
            return Err(HeartbeatError::InvalidThreshold(
                "ping_threshold must be between 0.0 and 1.0 exclusive".into(),
            ));
        }
        if !(self.critical_threshold > self.ping_threshold && self.critical_threshold < 1.0) {
            return Err(HeartbeatError::InvalidThreshold(
                "critical_threshold must be between ping_threshold and 1.0 exclusive".into(),
            ));
        }
        Ok(())
    }
}

/// What the heartbeat recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatAction {
    /// Far from expiry. No action needed.
    Healthy,
    /// Passed the ping threshold. Should ping soon.
    PingRecommended,
    /// Passed the critical threshold. Must ping now.
    PingRequired,
    /// Timed out. The beneficiary can claim.
    Expired,
}

impl HeartbeatAction {
    /// Sort key, most urgent first
    fn priority(self) -> u8 {
        match self {
            HeartbeatAction::Expired => 0,
            HeartbeatAction::PingRequired => 1,
            HeartbeatAction::PingRecommended => 2,
            HeartbeatAction::Healthy => 3,
        }
    }
}

/// Full heartbeat status for a vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub vault: Address,
    pub owner: Address,
    pub beneficiary: Option<Address>,
    /// Fraction of the timeout elapsed (0.0–1.0+).
    pub elapsed_fraction: f64,
    pub seconds_remaining: u64,
    pub expires_at: u64,
    pub action: HeartbeatAction,
}

/// Errors from heartbeat evaluation.
#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// Evaluate the heartbeat status of a vault at `now`.
pub fn evaluate_heartbeat(vault: &Vault, now: u64, config: &HeartbeatConfig) -> HeartbeatStatus {
    let timeout = vault.timeout.secs();
    let elapsed = now.saturating_sub(vault.last_ping);
    // Timeout is bounded below by MIN_TIMEOUT, never zero
    let elapsed_fraction = elapsed as f64 / timeout as f64;

    let action = if vault.is_expired(now) {
        HeartbeatAction::Expired
    } else if elapsed_fraction >= config.critical_threshold {
        HeartbeatAction::PingRequired
    } else if elapsed_fraction >= config.ping_threshold {
        HeartbeatAction::PingRecommended
    } else {
        HeartbeatAction::Healthy
    };

    HeartbeatStatus {
        vault: vault.id,
        owner: vault.owner,
        beneficiary: vault.beneficiary,
        elapsed_fraction,
        seconds_remaining: vault.time_remaining(now),
        expires_at: vault.expires_at(),
        action,
    }
}

/// Batch evaluate heartbeat for multiple vaults.
///
/// Returns statuses sorted by urgency (most urgent first).
pub fn evaluate_batch<'a>(
    vaults: impl IntoIterator<Item = &'a Vault>,
    now: u64,
    config: &HeartbeatConfig,
) -> Vec<HeartbeatStatus> {
    let mut statuses: Vec<HeartbeatStatus> = vaults
        .into_iter()
        .map(|vault| evaluate_heartbeat(vault, now, config))
        .collect();

    statuses.sort_by(|a, b| {
        a.action.priority().cmp(&b.action.priority()).then(
            a.elapsed_fraction
                .partial_cmp(&b.elapsed_fraction)
                .unwrap_or(std::cmp::Ordering::Equal)
                .reverse(),
        )
    });

    statuses
}
