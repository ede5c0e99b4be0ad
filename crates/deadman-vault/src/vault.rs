//! The deadman vault state machine.
//!
//! A vault is **Active** while the owner keeps pinging, and **Expired** once
//! `now - last_ping >= timeout`. Expiry is derived, never stored.
//!
//! ```text
//!        ping / deposit / withdraw / reconfigure
//!              ┌──────────┐
//!              ▼          │
//!   create ─► Active ─────┘
//!              │  ▲
//!    timeout   │  │  claim (beneficiary becomes owner,
//!    lapses    ▼  │         beneficiary is cleared)
//!            Expired
//! ```
//!
//! Every operation validates fully before it mutates, so a failed call
//! leaves the vault untouched. Claim is split into [`Vault::check_claim`]
//! and [`Vault::commit_claim`] so the caller can mint the certificate in
//! between and abort without side effects.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{AuthorizationError, StateError, ValidationError, VaultError};
use crate::timeout::Timeout;
use crate::types::{amount_serde, Address, Amount, TokenId};

/// Whether the owner may still withdraw once the vault has expired but has
/// not been claimed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawPolicy {
    /// The owner keeps full control until the beneficiary claims
    #[default]
    AllowWhenExpired,
    /// Funds are frozen for the beneficiary as soon as the timeout lapses
    BlockWhenExpired,
}

impl FromStr for WithdrawPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow_when_expired" | "allow" => Ok(Self::AllowWhenExpired),
            "block_when_expired" | "block" => Ok(Self::BlockWhenExpired),
            other => Err(format!("unknown withdraw policy: {}", other)),
        }
    }
}

/// A single custody unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// The vault's own identity
    pub id: Address,
    /// Who created the vault (never changes)
    pub creator: Address,
    /// Current owner
    pub owner: Address,
    /// Current beneficiary; `None` after a claim until the new owner sets one
    pub beneficiary: Option<Address>,
    /// Custodied value
    #[serde(with = "amount_serde")]
    pub balance: Amount,
    /// Last proof of owner liveness (unix timestamp)
    pub last_ping: u64,
    /// Seconds without a ping before the vault is claimable
    pub timeout: Timeout,
    /// Creation time (unix timestamp)
    pub created_at: u64,
    /// Number of successful claims over the vault's lifetime
    pub claim_count: u32,
}

/// Read-only view of a vault at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub id: Address,
    pub owner: Address,
    pub beneficiary: Option<Address>,
    #[serde(with = "amount_serde")]
    pub balance: Amount,
    pub last_ping: u64,
    pub timeout_secs: u64,
    pub expires_at: u64,
    pub expired: bool,
    pub seconds_remaining: u64,
}

/// A validated claim that has not been applied yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClaim {
    pub vault: Address,
    pub previous_owner: Address,
    pub new_owner: Address,
    pub amount: Amount,
}

/// Result of a committed claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub vault: Address,
    pub previous_owner: Address,
    pub new_owner: Address,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    pub token_id: TokenId,
    pub claimed_at: u64,
}

impl Vault {
    /// Create a vault owned by `owner`.
    ///
    /// Fails if either identity is zero, if `beneficiary == owner`, or if
    /// `timeout_secs` is out of bounds.
    pub fn create(
        id: Address,
        owner: Address,
        beneficiary: Address,
        timeout_secs: u64,
        now: u64,
    ) -> Result<Self, VaultError> {
        id.ensure_nonzero()?;
        owner.ensure_nonzero()?;
        validate_beneficiary(&owner, &beneficiary)?;
        let timeout = Timeout::from_secs(timeout_secs)?;

        Ok(Self {
            id,
            creator: owner,
            owner,
            beneficiary: Some(beneficiary),
            balance: 0,
            last_ping: now,
            timeout,
            created_at: now,
            claim_count: 0,
        })
    }

    /// Add funds. Anyone may deposit. Returns the new balance.
    pub fn deposit(&mut self, amount: Amount) -> Result<Amount, VaultError> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(StateError::BalanceOverflow)?;
        self.balance = balance;
        Ok(balance)
    }

    /// Remove funds. Owner only. Returns the new balance.
    pub fn withdraw(
        &mut self,
        caller: &Address,
        amount: Amount,
        now: u64,
        policy: WithdrawPolicy,
    ) -> Result<Amount, VaultError> {
        self.ensure_owner(caller)?;
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        if policy == WithdrawPolicy::BlockWhenExpired && self.is_expired(now) {
            return Err(StateError::WithdrawAfterExpiry.into());
        }
        if amount > self.balance {
            return Err(StateError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            }
            .into());
        }
        self.balance -= amount;
        Ok(self.balance)
    }

    /// Prove liveness. Owner only. Returns the recorded timestamp.
    pub fn ping(&mut self, caller: &Address, now: u64) -> Result<u64, VaultError> {
        self.ensure_owner(caller)?;
        self.touch(now);
        Ok(self.last_ping)
    }

    /// Replace the beneficiary. Owner only. Returns the previous one.
    pub fn set_beneficiary(
        &mut self,
        caller: &Address,
        beneficiary: Address,
    ) -> Result<Option<Address>, VaultError> {
        self.ensure_owner(caller)?;
        validate_beneficiary(&self.owner, &beneficiary)?;
        Ok(self.beneficiary.replace(beneficiary))
    }

    /// Replace the timeout. Owner only. Returns the previous one.
    pub fn set_timeout(&mut self, caller: &Address, secs: u64) -> Result<Timeout, VaultError> {
        self.ensure_owner(caller)?;
        let timeout = Timeout::from_secs(secs)?;
        Ok(std::mem::replace(&mut self.timeout, timeout))
    }

    /// `now - last_ping >= timeout`
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.last_ping) >= self.timeout.secs()
    }

    /// Timestamp at which the vault becomes claimable
    pub fn expires_at(&self) -> u64 {
        self.last_ping.saturating_add(self.timeout.secs())
    }

    /// Seconds until expiry, zero once expired
    pub fn time_remaining(&self, now: u64) -> u64 {
        self.expires_at().saturating_sub(now)
    }

    /// Snapshot the vault as seen at `now`
    pub fn state(&self, now: u64) -> VaultState {
        VaultState {
            id: self.id,
            owner: self.owner,
            beneficiary: self.beneficiary,
            balance: self.balance,
            last_ping: self.last_ping,
            timeout_secs: self.timeout.secs(),
            expires_at: self.expires_at(),
            expired: self.is_expired(now),
            seconds_remaining: self.time_remaining(now),
        }
    }

    /// Validate a claim without applying it.
    ///
    /// Expiry is checked before the caller, so an early claim fails with a
    /// state error no matter who attempts it.
    pub fn check_claim(&self, caller: &Address, now: u64) -> Result<PendingClaim, VaultError> {
        if !self.is_expired(now) {
            return Err(StateError::NotExpired {
                seconds_remaining: self.time_remaining(now),
            }
            .into());
        }
        match self.beneficiary {
            Some(beneficiary) if beneficiary == *caller => Ok(PendingClaim {
                vault: self.id,
                previous_owner: self.owner,
                new_owner: beneficiary,
                amount: self.balance,
            }),
            _ => Err(AuthorizationError::NotBeneficiary { caller: *caller }.into()),
        }
    }

    /// Apply a claim previously returned by [`Vault::check_claim`].
    ///
    /// Ownership moves to the beneficiary, the beneficiary is cleared and the
    /// liveness timer restarts. The balance stays in the vault.
    pub fn commit_claim(
        &mut self,
        pending: PendingClaim,
        token_id: TokenId,
        now: u64,
    ) -> ClaimReceipt {
        debug_assert_eq!(pending.vault, self.id);
        self.owner = pending.new_owner;
        self.beneficiary = None;
        self.touch(now);
        self.claim_count = self.claim_count.saturating_add(1);

        ClaimReceipt {
            vault: self.id,
            previous_owner: pending.previous_owner,
            new_owner: pending.new_owner,
            amount: pending.amount,
            token_id,
            claimed_at: self.last_ping,
        }
    }

    fn ensure_owner(&self, caller: &Address) -> Result<(), AuthorizationError> {
        if *caller != self.owner {
            return Err(AuthorizationError::NotOwner { caller: *caller });
        }
        Ok(())
    }

    // last_ping never moves backwards
    fn touch(&mut self, now: u64) {
        self.last_ping = self.last_ping.max(now);
    }
}

fn validate_beneficiary(owner: &Address, beneficiary: &Address) -> Result<(), ValidationError> {
    beneficiary.ensure_nonzero()?;
    if beneficiary == owner {
        return Err(ValidationError::BeneficiaryIsOwner(*beneficiary));
    }
    Ok(())
}
