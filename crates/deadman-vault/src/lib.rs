//! Deadman Vault
//!
//! Ownership of a fund-holding vault passes to a designated beneficiary
//! once the owner stops proving liveness.
//!
//! # Concepts
//!
//! - **Ping**: the owner proves liveness and resets the timer
//! - **Expiry**: `now - last_ping >= timeout`, derived from time, never stored
//! - **Claim**: after expiry the beneficiary becomes owner and receives a
//!   non-transferable claim certificate
//!
//! # Example
//!
//! ```
//! use deadman_vault::{Address, Ledger, LedgerConfig, ManualClock, Timeout};
//! use std::sync::Arc;
//!
//! let owner: Address = "0x0100000000000000000000000000000000000001".parse().unwrap();
//! let heir: Address = "0x0100000000000000000000000000000000000002".parse().unwrap();
//!
//! let clock = ManualClock::new(1_735_000_000);
//! let ledger = Ledger::new(Arc::new(clock.clone()), LedgerConfig::default(), Address::ZERO).unwrap();
//!
//! let vault = ledger.create_vault(owner, heir, Timeout::one_month().secs()).unwrap();
//! ledger.deposit(owner, vault, 1_000).unwrap();
//!
//! clock.advance(Timeout::one_month().secs());
//! let receipt = ledger.claim(heir, vault).unwrap();
//! assert_eq!(receipt.token_id, 1);
//! assert_eq!(ledger.vault_state(&vault).unwrap().owner, heir);
//! ```

pub mod clock;
pub mod command;
pub mod error;
pub mod events;
pub mod factory;
pub mod heartbeat;
pub mod ledger;
pub mod registry;
pub mod snapshot;
pub mod timeout;
pub mod types;
pub mod vault;

#[cfg(test)]
mod test_utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, Operation, Outcome};
pub use error::{
    AuthorizationError, ErrorKind, NotFoundError, StateError, ValidationError, VaultError,
};
pub use events::{EventLog, EventRecord, VaultEvent};
pub use factory::VaultFactory;
pub use heartbeat::{
    evaluate_batch, evaluate_heartbeat, HeartbeatAction, HeartbeatConfig, HeartbeatError,
    HeartbeatStatus,
};
pub use ledger::{Ledger, LedgerConfig};
pub use registry::{ClaimCertificateRegistry, ClaimData};
pub use snapshot::{LedgerSnapshot, SnapshotError, SNAPSHOT_VERSION};
pub use timeout::{Timeout, MAX_TIMEOUT, MIN_TIMEOUT};
pub use types::{Address, Amount, TokenId};
pub use vault::{ClaimReceipt, PendingClaim, Vault, VaultState, WithdrawPolicy};
