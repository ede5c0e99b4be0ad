//! Persistent ledger state
//!
//! The whole ledger serializes to one pretty-printed JSON document.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::events::EventRecord;
use crate::factory::VaultFactory;
use crate::heartbeat::HeartbeatError;
use crate::registry::ClaimCertificateRegistry;
use crate::types::Address;
use crate::vault::Vault;

/// Current on-disk format
pub const SNAPSHOT_VERSION: u32 = 1;

pub(crate) const FACTORY_DOMAIN: &str = "deadman-factory";
pub(crate) const REGISTRY_DOMAIN: &str = "deadman-registry";

/// Errors from snapshot operations
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),

    #[error("Invalid ledger config: {0}")]
    Config(#[from] HeartbeatError),
}

/// Full ledger state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub factory: VaultFactory,
    pub vaults: BTreeMap<Address, Vault>,
    pub registry: ClaimCertificateRegistry,
    pub events: Vec<EventRecord>,
    /// Highest timestamp any operation has observed
    pub last_timestamp: u64,
}

impl LedgerSnapshot {
    /// Fresh state with no vaults and no certificates
    pub fn empty(registry_admin: Address) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            factory: VaultFactory::new(Address::derive(FACTORY_DOMAIN, &[])),
            vaults: BTreeMap::new(),
            registry: ClaimCertificateRegistry::new(
                Address::derive(REGISTRY_DOMAIN, &[]),
                registry_admin,
            ),
            events: Vec::new(),
            last_timestamp: 0,
        }
    }

    /// Load state from file, or create empty if not exists.
    ///
    /// `registry_admin` only applies to the empty state; a stored registry
    /// keeps its own admin.
    pub fn load(path: &Path, registry_admin: Address) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Ok(Self::empty(registry_admin));
        }
        let contents = fs::read_to_string(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&contents)?;
        snapshot.check()?;
        Ok(snapshot)
    }

    /// Save state to file
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Cross-check the factory index, vault table, registry and event log
    pub fn check(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        self.check_factory()?;
        self.check_vaults()?;
        self.registry
            .check_consistency()
            .map_err(SnapshotError::Inconsistent)?;
        self.check_events()
    }

    fn check_factory(&self) -> Result<(), SnapshotError> {
        let factory = &self.factory;
        let mut seen = BTreeSet::new();
        for id in factory.all_vaults() {
            if !seen.insert(*id) {
                return Err(SnapshotError::Inconsistent(format!(
                    "vault {} is listed twice",
                    id
                )));
            }
        }
        if factory.nonce < factory.vault_count() as u64 {
            return Err(SnapshotError::Inconsistent(format!(
                "factory nonce {} is behind its {} vaults",
                factory.nonce,
                factory.vault_count()
            )));
        }
        let mut by_creator = 0usize;
        for (creator, ids) in &factory.by_creator {
            if let Some(id) = ids.iter().find(|id| !seen.contains(*id)) {
                return Err(SnapshotError::Inconsistent(format!(
                    "creator {} lists unknown vault {}",
                    creator, id
                )));
            }
            by_creator += ids.len();
        }
        if by_creator != factory.vault_count() {
            return Err(SnapshotError::Inconsistent(format!(
                "creator index lists {} vaults, factory holds {}",
                by_creator,
                factory.vault_count()
            )));
        }
        Ok(())
    }

    fn check_vaults(&self) -> Result<(), SnapshotError> {
        if self.factory.vault_count() != self.vaults.len() {
            return Err(SnapshotError::Inconsistent(format!(
                "factory lists {} vaults, table holds {}",
                self.factory.vault_count(),
                self.vaults.len()
            )));
        }
        for id in self.factory.all_vaults() {
            let vault = self.vaults.get(id).ok_or_else(|| {
                SnapshotError::Inconsistent(format!("indexed vault {} missing", id))
            })?;
            if vault.id != *id {
                return Err(SnapshotError::Inconsistent(format!(
                    "vault stored under {} has id {}",
                    id, vault.id
                )));
            }
            if vault.beneficiary == Some(vault.owner) {
                return Err(SnapshotError::Inconsistent(format!(
                    "vault {} names its owner as beneficiary",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Sequence numbers run `1..=n` with no gaps
    fn check_events(&self) -> Result<(), SnapshotError> {
        for (expected, record) in (1u64..).zip(&self.events) {
            if record.seq != expected {
                return Err(SnapshotError::Inconsistent(format!(
                    "event #{} found where #{} was expected",
                    record.seq, expected
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::{Ledger, LedgerConfig};
    use crate::test_utils::test_address;
    use std::sync::Arc;
    use tempfile::TempDir;

    const START: u64 = 1_735_000_000;
    const MONTH: u64 = 2_592_000;

    fn sample() -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::empty(test_address(251));
        let id = snapshot.factory.next_vault_id(&test_address(1));
        let vault = Vault::create(id, test_address(1), test_address(2), 86_400, 1_000).unwrap();
        snapshot.factory.record(test_address(1), id);
        snapshot.vaults.insert(id, vault);
        snapshot.last_timestamp = 1_000;
        snapshot
    }

    /// Snapshot of a ledger where two heirs have each claimed one vault
    fn claimed_sample() -> LedgerSnapshot {
        let clock = ManualClock::new(START);
        let ledger = Ledger::new(
            Arc::new(clock.clone()),
            LedgerConfig::default(),
            test_address(251),
        )
        .unwrap();
        let first = ledger
            .create_vault(test_address(1), test_address(2), MONTH)
            .unwrap();
        let second = ledger
            .create_vault(test_address(1), test_address(3), MONTH)
            .unwrap();
        ledger.deposit(test_address(1), first, 10).unwrap();
        clock.advance(MONTH);
        ledger.claim(test_address(2), first).unwrap();
        ledger.claim(test_address(3), second).unwrap();
        ledger.snapshot().unwrap()
    }

    /// Round-trip through JSON, editing the raw document on the way
    fn tampered(
        snapshot: &LedgerSnapshot,
        edit: impl FnOnce(&mut serde_json::Value),
    ) -> LedgerSnapshot {
        let mut value = serde_json::to_value(snapshot).unwrap();
        edit(&mut value);
        serde_json::from_str(&value.to_string()).unwrap()
    }

    fn assert_inconsistent(snapshot: &LedgerSnapshot) {
        assert!(matches!(
            snapshot.check(),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger_state.json");

        let snapshot = LedgerSnapshot::load(&path, test_address(251)).unwrap();
        assert!(snapshot.vaults.is_empty());
        assert_eq!(snapshot.registry.admin, test_address(251));
        assert_eq!(snapshot.registry.total_supply(), 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger_state.json");

        let snapshot = sample();
        snapshot.save(&path).unwrap();

        // Stored admin wins over the one passed in
        let loaded = LedgerSnapshot::load(&path, test_address(9)).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.registry.admin, test_address(251));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut snapshot = sample();
        snapshot.version = 99;
        assert!(matches!(
            snapshot.check(),
            Err(SnapshotError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_rejects_dangling_index() {
        let mut snapshot = sample();
        snapshot.vaults.clear();
        assert!(matches!(
            snapshot.check(),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_claimed_ledger_passes_check() {
        let snapshot = claimed_sample();
        assert_eq!(snapshot.registry.total_supply(), 2);
        assert!(snapshot.check().is_ok());
    }

    #[test]
    fn test_rejects_reused_token_id() {
        let snapshot = tampered(&claimed_sample(), |v| {
            v["registry"]["next_token_id"] = serde_json::json!(1);
        });
        assert_inconsistent(&snapshot);

        let snapshot = tampered(&claimed_sample(), |v| {
            v["registry"]["next_token_id"] = serde_json::json!(2);
        });
        assert_inconsistent(&snapshot);
    }

    #[test]
    fn test_rejected_token_counter_is_not_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger_state.json");
        let snapshot = tampered(&claimed_sample(), |v| {
            v["registry"]["next_token_id"] = serde_json::json!(1);
        });
        fs::write(&path, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();

        assert!(matches!(
            LedgerSnapshot::load(&path, test_address(251)),
            Err(SnapshotError::Inconsistent(_))
        ));
        let clock = ManualClock::new(START + MONTH);
        assert!(matches!(
            Ledger::from_snapshot(snapshot, Arc::new(clock), LedgerConfig::default()),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_rejects_token_count_mismatch() {
        // Counter ahead of the table: a certificate went missing
        let snapshot = tampered(&claimed_sample(), |v| {
            v["registry"]["next_token_id"] = serde_json::json!(4);
        });
        assert_inconsistent(&snapshot);
    }

    #[test]
    fn test_rejects_holder_mismatch() {
        let snapshot = tampered(&claimed_sample(), |v| {
            let holders = v["registry"]["holders"].as_object_mut().unwrap();
            holders.insert(test_address(2).to_string(), serde_json::json!([2]));
        });
        assert_inconsistent(&snapshot);

        let snapshot = tampered(&claimed_sample(), |v| {
            let holders = v["registry"]["holders"].as_object_mut().unwrap();
            holders.remove(&test_address(3).to_string());
        });
        assert_inconsistent(&snapshot);
    }

    #[test]
    fn test_rejects_event_gap() {
        let mut snapshot = claimed_sample();
        snapshot.events.remove(1);
        assert_inconsistent(&snapshot);

        let mut snapshot = claimed_sample();
        snapshot.events.swap(0, 1);
        assert_inconsistent(&snapshot);
    }

    #[test]
    fn test_rejects_rolled_back_nonce() {
        let mut snapshot = sample();
        snapshot.factory.nonce = 0;
        assert_inconsistent(&snapshot);
    }

    #[test]
    fn test_rejects_duplicate_vault() {
        let mut snapshot = sample();
        let id = snapshot.factory.created[0];
        snapshot.factory.created.push(id);
        snapshot.factory.nonce += 1;
        assert_inconsistent(&snapshot);
    }

    #[test]
    fn test_corrupt_file_is_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger_state.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            LedgerSnapshot::load(&path, test_address(251)),
            Err(SnapshotError::Json(_))
        ));
    }
}
