//! Single-writer coordinator for vaults, the factory and the registry.
//!
//! All state sits behind one mutex, so operations are serialized: no two
//! operations on the same vault interleave, and a claim's ownership change
//! and certificate mint commit together or not at all.
//!
//! Time is read once per operation from the injected [`Clock`] and clamped
//! to the highest timestamp already observed, so recorded times never go
//! backwards even if the clock does.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::command::{Command, Operation, Outcome};
use crate::error::{NotFoundError, StateError, VaultError};
use crate::events::{EventLog, EventRecord, VaultEvent};
use crate::factory::VaultFactory;
use crate::heartbeat::{evaluate_batch, HeartbeatConfig, HeartbeatError, HeartbeatStatus};
use crate::registry::{ClaimCertificateRegistry, ClaimData};
use crate::snapshot::{LedgerSnapshot, SnapshotError, SNAPSHOT_VERSION};
use crate::types::{Address, Amount, TokenId};
use crate::vault::{ClaimReceipt, Vault, VaultState, WithdrawPolicy};

/// Ledger-wide behaviour switches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Whether owners may withdraw from expired, unclaimed vaults
    #[serde(default)]
    pub withdraw_policy: WithdrawPolicy,
    /// Thresholds for [`Ledger::heartbeat`]
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

struct LedgerInner {
    factory: VaultFactory,
    vaults: BTreeMap<Address, Vault>,
    registry: ClaimCertificateRegistry,
    events: EventLog,
    last_timestamp: u64,
}

impl LedgerInner {
    fn vault(&self, id: &Address) -> Result<&Vault, VaultError> {
        self.vaults
            .get(id)
            .ok_or_else(|| NotFoundError::Vault(*id).into())
    }

    fn vault_mut(&mut self, id: &Address) -> Result<&mut Vault, VaultError> {
        self.vaults
            .get_mut(id)
            .ok_or_else(|| NotFoundError::Vault(*id).into())
    }
}

/// The authoritative store for all vaults and certificates
pub struct Ledger {
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    /// Create an empty ledger whose registry is administered by `registry_admin`
    pub fn new(
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
        registry_admin: Address,
    ) -> Result<Self, HeartbeatError> {
        config.heartbeat.validate()?;
        Ok(Self::restore(LedgerSnapshot::empty(registry_admin), clock, config))
    }

    /// Restore a ledger from a snapshot.
    ///
    /// The snapshot must pass [`LedgerSnapshot::check`] and the heartbeat
    /// thresholds must validate.
    pub fn from_snapshot(
        snapshot: LedgerSnapshot,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Result<Self, SnapshotError> {
        config.heartbeat.validate()?;
        snapshot.check()?;
        Ok(Self::restore(snapshot, clock, config))
    }

    fn restore(snapshot: LedgerSnapshot, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            clock,
            config,
            inner: Mutex::new(LedgerInner {
                factory: snapshot.factory,
                vaults: snapshot.vaults,
                registry: snapshot.registry,
                events: EventLog::from_records(snapshot.events),
                last_timestamp: snapshot.last_timestamp,
            }),
        }
    }

    /// Capture the full state for persistence
    pub fn snapshot(&self) -> Result<LedgerSnapshot, VaultError> {
        let inner = self.lock()?;
        Ok(LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            factory: inner.factory.clone(),
            vaults: inner.vaults.clone(),
            registry: inner.registry.clone(),
            events: inner.events.records().to_vec(),
            last_timestamp: inner.last_timestamp,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================================================================
    // Factory
    // ========================================================================

    /// Create a vault owned by `creator` and index it under `creator`.
    ///
    /// The vault is authorized to mint claim certificates in the same step.
    pub fn create_vault(
        &self,
        creator: Address,
        beneficiary: Address,
        timeout_secs: u64,
    ) -> Result<Address, VaultError> {
        self.transact(|inner, now| {
            let id = inner.factory.next_vault_id(&creator);
            if inner.vaults.contains_key(&id) {
                return Err(StateError::VaultExists(id).into());
            }
            let vault = Vault::create(id, creator, beneficiary, timeout_secs, now)?;

            inner.factory.record(creator, id);
            inner.registry.authorize_vault(id);
            inner.vaults.insert(id, vault);
            inner.events.append(
                now,
                VaultEvent::VaultCreated {
                    creator,
                    vault: id,
                    beneficiary,
                    timeout_secs,
                },
            );
            log::info!(
                "Vault {} created by {} (beneficiary {}, timeout {}s)",
                id,
                creator,
                beneficiary,
                timeout_secs
            );
            Ok(id)
        })
    }

    /// Vaults created by `creator`, oldest first
    pub fn vaults_for_creator(&self, creator: &Address) -> Result<Vec<Address>, VaultError> {
        self.read(|inner, _| inner.factory.vaults_for_creator(creator).to_vec())
    }

    /// Vaults currently owned by `owner` (includes inherited ones)
    pub fn vaults_owned_by(&self, owner: &Address) -> Result<Vec<Address>, VaultError> {
        self.read(|inner, _| {
            inner
                .factory
                .all_vaults()
                .iter()
                .filter(|id| inner.vaults.get(*id).is_some_and(|v| v.owner == *owner))
                .copied()
                .collect()
        })
    }

    /// Vaults naming `beneficiary` as their current beneficiary
    pub fn vaults_for_beneficiary(
        &self,
        beneficiary: &Address,
    ) -> Result<Vec<Address>, VaultError> {
        self.read(|inner, _| {
            inner
                .factory
                .all_vaults()
                .iter()
                .filter(|id| {
                    inner
                        .vaults
                        .get(*id)
                        .is_some_and(|v| v.beneficiary == Some(*beneficiary))
                })
                .copied()
                .collect()
        })
    }

    pub fn vault_count(&self) -> Result<usize, VaultError> {
        self.read(|inner, _| inner.factory.vault_count())
    }

    // ========================================================================
    // Vault operations
    // ========================================================================

    /// Add funds to a vault. Anyone may deposit. Returns the new balance.
    pub fn deposit(
        &self,
        caller: Address,
        vault: Address,
        amount: Amount,
    ) -> Result<Amount, VaultError> {
        self.transact(|inner, now| {
            let balance = inner.vault_mut(&vault)?.deposit(amount)?;
            inner.events.append(
                now,
                VaultEvent::Deposited {
                    vault,
                    from: caller,
                    amount,
                    balance,
                },
            );
            log::debug!("Deposit of {} into {} by {}", amount, vault, caller);
            Ok(balance)
        })
    }

    /// Remove funds. Owner only. Returns the new balance.
    pub fn withdraw(
        &self,
        caller: Address,
        vault: Address,
        amount: Amount,
    ) -> Result<Amount, VaultError> {
        let policy = self.config.withdraw_policy;
        self.transact(|inner, now| {
            let balance = inner
                .vault_mut(&vault)?
                .withdraw(&caller, amount, now, policy)?;
            inner.events.append(
                now,
                VaultEvent::Withdrawn {
                    vault,
                    owner: caller,
                    amount,
                    balance,
                },
            );
            log::debug!("Withdrawal of {} from {}", amount, vault);
            Ok(balance)
        })
    }

    /// Prove owner liveness. Returns the recorded timestamp.
    pub fn ping(&self, caller: Address, vault: Address) -> Result<u64, VaultError> {
        self.transact(|inner, now| {
            let at = inner.vault_mut(&vault)?.ping(&caller, now)?;
            inner.events.append(
                now,
                VaultEvent::Pinged {
                    vault,
                    owner: caller,
                    at,
                },
            );
            log::debug!("Vault {} pinged at {}", vault, at);
            Ok(at)
        })
    }

    pub fn set_beneficiary(
        &self,
        caller: Address,
        vault: Address,
        beneficiary: Address,
    ) -> Result<(), VaultError> {
        self.transact(|inner, now| {
            let previous = inner
                .vault_mut(&vault)?
                .set_beneficiary(&caller, beneficiary)?;
            inner.events.append(
                now,
                VaultEvent::BeneficiarySet {
                    vault,
                    previous,
                    beneficiary,
                },
            );
            log::info!("Vault {} beneficiary set to {}", vault, beneficiary);
            Ok(())
        })
    }

    pub fn set_timeout(
        &self,
        caller: Address,
        vault: Address,
        timeout_secs: u64,
    ) -> Result<(), VaultError> {
        self.transact(|inner, now| {
            let previous = inner.vault_mut(&vault)?.set_timeout(&caller, timeout_secs)?;
            inner.events.append(
                now,
                VaultEvent::TimeoutSet {
                    vault,
                    previous_secs: previous.secs(),
                    timeout_secs,
                },
            );
            log::info!("Vault {} timeout set to {}s", vault, timeout_secs);
            Ok(())
        })
    }

    /// Claim an expired vault as its beneficiary.
    ///
    /// Three phases under one lock: validate on the vault, mint the
    /// certificate (the only fallible mutation), then commit the vault
    /// transition. A failed mint leaves everything unchanged.
    pub fn claim(&self, caller: Address, vault: Address) -> Result<ClaimReceipt, VaultError> {
        self.transact(|inner, now| {
            let pending = match inner.vault(&vault)?.check_claim(&caller, now) {
                Ok(pending) => pending,
                Err(e) => {
                    log::warn!("Claim on {} by {} rejected: {}", vault, caller, e);
                    return Err(e);
                }
            };

            let token_id = inner.registry.mint(
                &pending.vault,
                pending.new_owner,
                pending.vault,
                pending.amount,
                now,
            )?;

            let receipt = inner.vault_mut(&vault)?.commit_claim(pending, token_id, now);

            inner.events.append(
                now,
                VaultEvent::CertificateMinted {
                    token_id,
                    beneficiary: receipt.new_owner,
                    vault,
                    amount: receipt.amount,
                },
            );
            inner.events.append(
                now,
                VaultEvent::Claimed {
                    vault,
                    previous_owner: receipt.previous_owner,
                    new_owner: receipt.new_owner,
                    amount: receipt.amount,
                    token_id,
                },
            );
            log::info!(
                "Vault {} claimed by {} ({} units, certificate #{})",
                vault,
                receipt.new_owner,
                receipt.amount,
                token_id
            );
            Ok(receipt)
        })
    }

    pub fn vault(&self, id: &Address) -> Result<Vault, VaultError> {
        self.read(|inner, _| inner.vault(id).cloned())?
    }

    pub fn vault_state(&self, id: &Address) -> Result<VaultState, VaultError> {
        self.read(|inner, now| inner.vault(id).map(|v| v.state(now)))?
    }

    pub fn is_expired(&self, id: &Address) -> Result<bool, VaultError> {
        self.read(|inner, now| inner.vault(id).map(|v| v.is_expired(now)))?
    }

    pub fn time_remaining(&self, id: &Address) -> Result<u64, VaultError> {
        self.read(|inner, now| inner.vault(id).map(|v| v.time_remaining(now)))?
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Mint a certificate directly. Caller must be an authorized minter.
    pub fn mint(
        &self,
        caller: Address,
        beneficiary: Address,
        vault: Address,
        amount: Amount,
    ) -> Result<TokenId, VaultError> {
        self.transact(|inner, now| {
            let token_id = inner
                .registry
                .mint(&caller, beneficiary, vault, amount, now)?;
            inner.events.append(
                now,
                VaultEvent::CertificateMinted {
                    token_id,
                    beneficiary,
                    vault,
                    amount,
                },
            );
            log::info!("Certificate #{} minted by {}", token_id, caller);
            Ok(token_id)
        })
    }

    /// Add or remove a minter. Registry admin only.
    pub fn set_minter(
        &self,
        caller: Address,
        minter: Address,
        allowed: bool,
    ) -> Result<(), VaultError> {
        self.transact(|inner, now| {
            inner.registry.set_minter(&caller, minter, allowed)?;
            inner
                .events
                .append(now, VaultEvent::MinterSet { minter, allowed });
            log::info!("Minter {} allowed={}", minter, allowed);
            Ok(())
        })
    }

    pub fn claim_data(&self, token_id: TokenId) -> Result<ClaimData, VaultError> {
        self.read(|inner, _| inner.registry.claim_data(token_id).cloned())?
    }

    pub fn is_authorized_minter(&self, identity: &Address) -> Result<bool, VaultError> {
        self.read(|inner, _| inner.registry.is_authorized_minter(identity))
    }

    pub fn total_supply(&self) -> Result<u64, VaultError> {
        self.read(|inner, _| inner.registry.total_supply())
    }

    pub fn balance_of(&self, holder: &Address) -> Result<u64, VaultError> {
        self.read(|inner, _| inner.registry.balance_of(holder))
    }

    pub fn tokens_of(&self, holder: &Address) -> Result<Vec<TokenId>, VaultError> {
        self.read(|inner, _| inner.registry.tokens_of(holder).to_vec())
    }

    pub fn owner_of(&self, token_id: TokenId) -> Result<Address, VaultError> {
        self.read(|inner, _| inner.registry.owner_of(token_id))?
    }

    pub fn token_uri(&self, token_id: TokenId) -> Result<String, VaultError> {
        self.read(|inner, _| inner.registry.token_uri(token_id))?
    }

    pub fn registry_admin(&self) -> Result<Address, VaultError> {
        self.read(|inner, _| inner.registry.admin)
    }

    // ========================================================================
    // Events & monitoring
    // ========================================================================

    /// Events with `seq > after`, oldest first
    pub fn events_since(&self, after: u64) -> Result<Vec<EventRecord>, VaultError> {
        self.read(|inner, _| inner.events.since(after).to_vec())
    }

    pub fn last_event_seq(&self) -> Result<u64, VaultError> {
        self.read(|inner, _| inner.events.last_seq())
    }

    /// Subscribe to events appended from now on
    pub fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>, VaultError> {
        self.read(|inner, _| inner.events.subscribe())
    }

    /// Heartbeat status of every vault, most urgent first
    pub fn heartbeat(&self) -> Result<Vec<HeartbeatStatus>, VaultError> {
        self.read(|inner, now| evaluate_batch(inner.vaults.values(), now, &self.config.heartbeat))
    }

    /// Current time as the ledger sees it
    pub fn now(&self) -> Result<u64, VaultError> {
        self.read(|_, now| now)
    }

    // ========================================================================
    // Command dispatch
    // ========================================================================

    /// Execute a discrete command
    pub fn execute(&self, command: &Command) -> Result<Outcome, VaultError> {
        let caller = command.caller;
        match command.op {
            Operation::CreateVault {
                beneficiary,
                timeout_secs,
            } => self
                .create_vault(caller, beneficiary, timeout_secs)
                .map(|vault| Outcome::VaultCreated { vault }),
            Operation::Deposit { vault, amount } => self
                .deposit(caller, vault, amount)
                .map(|balance| Outcome::Balance { vault, balance }),
            Operation::Withdraw { vault, amount } => self
                .withdraw(caller, vault, amount)
                .map(|balance| Outcome::Balance { vault, balance }),
            Operation::Ping { vault } => self
                .ping(caller, vault)
                .map(|at| Outcome::Pinged { vault, at }),
            Operation::SetBeneficiary { vault, beneficiary } => self
                .set_beneficiary(caller, vault, beneficiary)
                .map(|()| Outcome::BeneficiarySet { vault, beneficiary }),
            Operation::SetTimeout {
                vault,
                timeout_secs,
            } => self
                .set_timeout(caller, vault, timeout_secs)
                .map(|()| Outcome::TimeoutSet {
                    vault,
                    timeout_secs,
                }),
            Operation::Claim { vault } => self.claim(caller, vault).map(Outcome::Claimed),
            Operation::SetMinter { minter, allowed } => self
                .set_minter(caller, minter, allowed)
                .map(|()| Outcome::MinterSet { minter, allowed }),
            Operation::Mint {
                beneficiary,
                vault,
                amount,
            } => self
                .mint(caller, beneficiary, vault, amount)
                .map(|token_id| Outcome::Minted { token_id }),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock(&self) -> Result<MutexGuard<'_, LedgerInner>, VaultError> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Internal("ledger lock poisoned".into()))
    }

    /// Run a state-changing operation. The timestamp high-water mark only
    /// advances when the operation succeeds.
    fn transact<T>(
        &self,
        op: impl FnOnce(&mut LedgerInner, u64) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let mut inner = self.lock()?;
        let now = self.clock.now().max(inner.last_timestamp);
        let result = op(&mut *inner, now)?;
        inner.last_timestamp = now;
        Ok(result)
    }

    fn read<T>(&self, query: impl FnOnce(&LedgerInner, u64) -> T) -> Result<T, VaultError> {
        let inner = self.lock()?;
        let now = self.clock.now().max(inner.last_timestamp);
        Ok(query(&*inner, now))
    }
}
