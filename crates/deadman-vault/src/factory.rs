//! Vault factory: derives vault identities and indexes vaults by creator.
//!
//! The index records creation provenance. A vault that changes hands via
//! claim stays listed under its creator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Address;

const VAULT_DOMAIN: &str = "deadman-vault";

/// Append-only creator index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultFactory {
    /// The factory's own identity (mixed into derived vault ids)
    pub id: Address,
    /// Number of vaults created so far
    pub nonce: u64,
    /// Vault ids per creator, in creation order
    pub by_creator: BTreeMap<Address, Vec<Address>>,
    /// All vault ids, in creation order
    pub created: Vec<Address>,
}

impl VaultFactory {
    pub fn new(id: Address) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// The id the next vault created by `creator` will receive.
    ///
    /// Pure: nothing is recorded until [`VaultFactory::record`].
    pub fn next_vault_id(&self, creator: &Address) -> Address {
        Address::derive(
            VAULT_DOMAIN,
            &[
                self.id.as_bytes(),
                creator.as_bytes(),
                &self.nonce.to_be_bytes(),
            ],
        )
    }

    /// Record a successfully created vault
    pub fn record(&mut self, creator: Address, vault: Address) {
        let list = self.by_creator.entry(creator).or_default();
        if !list.contains(&vault) {
            list.push(vault);
            self.created.push(vault);
        }
        self.nonce += 1;
    }

    /// Vaults created by `creator`, oldest first. Empty if none.
    pub fn vaults_for_creator(&self, creator: &Address) -> &[Address] {
        self.by_creator
            .get(creator)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All vaults, oldest first
    pub fn all_vaults(&self) -> &[Address] {
        &self.created
    }

    pub fn vault_count(&self) -> usize {
        self.created.len()
    }
}
