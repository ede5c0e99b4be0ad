//! Notifications appended by state-changing operations.
//!
//! The log is ordered and immutable. Observers either poll with
//! [`EventLog::since`] or subscribe to a broadcast channel; the log is the
//! source of truth and re-reading state after an event is always valid.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{amount_serde, Address, Amount, TokenId};

/// Capacity of the subscriber channel. Slow subscribers see `Lagged` and
/// can catch up by polling.
const SUBSCRIBER_CAPACITY: usize = 1024;

/// Events emitted by the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum VaultEvent {
    /// A vault was created by the factory
    VaultCreated {
        creator: Address,
        vault: Address,
        beneficiary: Address,
        timeout_secs: u64,
    },

    /// The owner proved liveness
    Pinged { vault: Address, owner: Address, at: u64 },

    /// Funds were added
    Deposited {
        vault: Address,
        from: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
        #[serde(with = "amount_serde")]
        balance: Amount,
    },

    /// Funds were removed by the owner
    Withdrawn {
        vault: Address,
        owner: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
        #[serde(with = "amount_serde")]
        balance: Amount,
    },

    /// The beneficiary changed
    BeneficiarySet {
        vault: Address,
        previous: Option<Address>,
        beneficiary: Address,
    },

    /// The timeout changed
    TimeoutSet {
        vault: Address,
        previous_secs: u64,
        timeout_secs: u64,
    },

    /// The beneficiary took over an expired vault
    Claimed {
        vault: Address,
        previous_owner: Address,
        new_owner: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
        token_id: TokenId,
    },

    /// A proof-of-claim certificate was minted
    CertificateMinted {
        token_id: TokenId,
        beneficiary: Address,
        vault: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },

    /// The registry admin changed the minter allowlist
    MinterSet { minter: Address, allowed: bool },
}

impl VaultEvent {
    /// The vault this event concerns, if any
    pub fn vault(&self) -> Option<&Address> {
        match self {
            VaultEvent::VaultCreated { vault, .. }
            | VaultEvent::Pinged { vault, .. }
            | VaultEvent::Deposited { vault, .. }
            | VaultEvent::Withdrawn { vault, .. }
            | VaultEvent::BeneficiarySet { vault, .. }
            | VaultEvent::TimeoutSet { vault, .. }
            | VaultEvent::Claimed { vault, .. }
            | VaultEvent::CertificateMinted { vault, .. } => Some(vault),
            VaultEvent::MinterSet { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::VaultCreated { .. } => "VaultCreated",
            VaultEvent::Pinged { .. } => "Pinged",
            VaultEvent::Deposited { .. } => "Deposited",
            VaultEvent::Withdrawn { .. } => "Withdrawn",
            VaultEvent::BeneficiarySet { .. } => "BeneficiarySet",
            VaultEvent::TimeoutSet { .. } => "TimeoutSet",
            VaultEvent::Claimed { .. } => "Claimed",
            VaultEvent::CertificateMinted { .. } => "CertificateMinted",
            VaultEvent::MinterSet { .. } => "MinterSet",
        }
    }
}

/// An event with its position in the log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    /// Position in the log, starting at 1
    pub seq: u64,
    /// Timestamp of the operation that produced the event
    pub at: u64,
    pub event: VaultEvent,
}

/// Append-only event log with broadcast fan-out
#[derive(Debug)]
pub struct EventLog {
    records: Vec<EventRecord>,
    sender: broadcast::Sender<EventRecord>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::from_records(Vec::new())
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted records
    pub fn from_records(records: Vec<EventRecord>) -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self { records, sender }
    }

    /// Append an event and fan it out to subscribers
    pub fn append(&mut self, at: u64, event: VaultEvent) -> u64 {
        let seq = self.last_seq() + 1;
        let record = EventRecord { seq, at, event };
        // No subscribers is not an error
        let _ = self.sender.send(record.clone());
        self.records.push(record);
        seq
    }

    /// Records with `seq > after`, oldest first
    pub fn since(&self, after: u64) -> &[EventRecord] {
        let start = self.records.partition_point(|r| r.seq <= after);
        &self.records[start..]
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub fn last_seq(&self) -> u64 {
        self.records.last().map_or(0, |r| r.seq)
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
