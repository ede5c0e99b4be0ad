//! Proof-of-claim certificate registry.
//!
//! Each successful claim mints one immutable, non-transferable certificate
//! recording who inherited what from which vault. Only allowlisted minters
//! (vaults, which are authorized when created) may mint.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AuthorizationError, NotFoundError, VaultError};
use crate::types::{amount_serde, Address, Amount, TokenId};

/// Immutable record of a claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimData {
    pub token_id: TokenId,
    /// Who claimed (and holds the certificate)
    pub beneficiary: Address,
    /// When the claim happened (unix timestamp)
    pub claimed_at: u64,
    /// The vault that was claimed (a reference, not ownership)
    pub vault: Address,
    /// Vault balance at the moment of the claim
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

/// Certificate registry with an authorized-minter allowlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCertificateRegistry {
    /// The registry's own identity
    pub id: Address,
    /// May add or remove minters. The zero address disables administration.
    pub admin: Address,
    minters: BTreeSet<Address>,
    tokens: BTreeMap<TokenId, ClaimData>,
    holders: BTreeMap<Address, Vec<TokenId>>,
    next_token_id: TokenId,
}

impl ClaimCertificateRegistry {
    pub fn new(id: Address, admin: Address) -> Self {
        Self {
            id,
            admin,
            minters: BTreeSet::new(),
            tokens: BTreeMap::new(),
            holders: BTreeMap::new(),
            next_token_id: 1,
        }
    }

    /// Mint a certificate. Caller must be an authorized minter.
    ///
    /// Token ids start at 1 and are never reused.
    pub fn mint(
        &mut self,
        caller: &Address,
        beneficiary: Address,
        vault: Address,
        amount: Amount,
        now: u64,
    ) -> Result<TokenId, VaultError> {
        if !self.is_authorized_minter(caller) {
            return Err(AuthorizationError::NotMinter(*caller).into());
        }
        beneficiary.ensure_nonzero()?;
        vault.ensure_nonzero()?;

        let token_id = self.next_token_id;
        self.next_token_id = token_id
            .checked_add(1)
            .ok_or_else(|| VaultError::Internal("token ids exhausted".into()))?;
        self.tokens.insert(
            token_id,
            ClaimData {
                token_id,
                beneficiary,
                claimed_at: now,
                vault,
                amount,
            },
        );
        self.holders.entry(beneficiary).or_default().push(token_id);
        Ok(token_id)
    }

    /// Add or remove a minter. Admin only.
    pub fn set_minter(
        &mut self,
        caller: &Address,
        minter: Address,
        allowed: bool,
    ) -> Result<(), VaultError> {
        if self.admin.is_zero() || *caller != self.admin {
            return Err(AuthorizationError::NotAdmin(*caller).into());
        }
        minter.ensure_nonzero()?;
        if allowed {
            self.minters.insert(minter);
        } else {
            self.minters.remove(&minter);
        }
        Ok(())
    }

    /// Pre-authorize a freshly created vault
    pub(crate) fn authorize_vault(&mut self, vault: Address) {
        self.minters.insert(vault);
    }

    pub fn is_authorized_minter(&self, identity: &Address) -> bool {
        !identity.is_zero() && self.minters.contains(identity)
    }

    pub fn claim_data(&self, token_id: TokenId) -> Result<&ClaimData, VaultError> {
        self.tokens
            .get(&token_id)
            .ok_or_else(|| NotFoundError::Token(token_id).into())
    }

    /// Total certificates ever minted
    pub fn total_supply(&self) -> u64 {
        self.tokens.len() as u64
    }

    /// Number of certificates held by `holder`
    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.holders.get(holder).map_or(0, |t| t.len() as u64)
    }

    /// Certificates held by `holder`, in mint order
    pub fn tokens_of(&self, holder: &Address) -> &[TokenId] {
        self.holders.get(holder).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Holder of a certificate (always the claiming beneficiary)
    pub fn owner_of(&self, token_id: TokenId) -> Result<Address, VaultError> {
        self.claim_data(token_id).map(|data| data.beneficiary)
    }

    /// Self-contained metadata URI (`data:application/json;base64,...`)
    pub fn token_uri(&self, token_id: TokenId) -> Result<String, VaultError> {
        let data = self.claim_data(token_id)?;
        let metadata = serde_json::json!({
            "name": format!("Deadman Vault Claim #{}", data.token_id),
            "description": "Proof that a beneficiary claimed a deadman vault after its owner stopped pinging.",
            "attributes": [
                { "trait_type": "Beneficiary", "value": data.beneficiary.to_string() },
                { "trait_type": "Vault", "value": data.vault.to_string() },
                { "trait_type": "Amount", "value": data.amount.to_string() },
                { "trait_type": "Claimed At", "value": data.claimed_at },
            ],
        });
        Ok(format!(
            "data:application/json;base64,{}",
            BASE64.encode(metadata.to_string())
        ))
    }

    pub fn minters(&self) -> impl Iterator<Item = &Address> {
        self.minters.iter()
    }

    /// Verify the counter, token table and holder index agree.
    ///
    /// Minted ids must be exactly `1..next_token_id`, and every token must be
    /// listed once, in mint order, under its beneficiary.
    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        if self.next_token_id == 0 {
            return Err("next token id is zero".into());
        }
        for (id, data) in &self.tokens {
            if *id == 0 || *id >= self.next_token_id {
                return Err(format!(
                    "token #{} is outside the minted range 1..{}",
                    id, self.next_token_id
                ));
            }
            if data.token_id != *id {
                return Err(format!("token stored under #{} has id #{}", id, data.token_id));
            }
        }
        if self.tokens.len() as u64 != self.next_token_id - 1 {
            return Err(format!(
                "{} tokens stored but next token id is {}",
                self.tokens.len(),
                self.next_token_id
            ));
        }

        let mut listed = 0usize;
        for (holder, ids) in &self.holders {
            if ids.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(format!("holder {} lists tokens out of mint order", holder));
            }
            for id in ids {
                match self.tokens.get(id) {
                    Some(data) if data.beneficiary == *holder => {}
                    Some(data) => {
                        return Err(format!(
                            "token #{} listed under {} belongs to {}",
                            id, holder, data.beneficiary
                        ))
                    }
                    None => {
                        return Err(format!("holder {} lists unminted token #{}", holder, id))
                    }
                }
            }
            listed += ids.len();
        }
        if listed != self.tokens.len() {
            return Err(format!(
                "holder index lists {} tokens, table holds {}",
                listed,
                self.tokens.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::test_address;

    fn registry() -> ClaimCertificateRegistry {
        ClaimCertificateRegistry::new(test_address(250), test_address(251))
    }

    #[test]
    fn test_mint_requires_minter() {
        let mut reg = registry();
        let vault = test_address(100);

        let err = reg
            .mint(&vault, test_address(2), vault, 10, 1_000)
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::Authorization(AuthorizationError::NotMinter(vault))
        );
        assert_eq!(reg.total_supply(), 0);

        reg.authorize_vault(vault);
        assert!(reg.is_authorized_minter(&vault));
        let id = reg.mint(&vault, test_address(2), vault, 10, 1_000).unwrap();
        assert_eq!(id, 1);
        assert_eq!(reg.total_supply(), 1);
    }

    #[test]
    fn test_token_ids_sequential() {
        let mut reg = registry();
        let vault = test_address(100);
        reg.authorize_vault(vault);

        let ids: Vec<TokenId> = (0..5)
            .map(|i| reg.mint(&vault, test_address(2), vault, i, 1_000).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(reg.total_supply(), 5);
    }

    #[test]
    fn test_claim_data_lookup() {
        let mut reg = registry();
        let vault = test_address(100);
        reg.authorize_vault(vault);
        let id = reg
            .mint(&vault, test_address(2), vault, 2_300_000_000_000_000_000, 42)
            .unwrap();

        let data = reg.claim_data(id).unwrap();
        assert_eq!(data.beneficiary, test_address(2));
        assert_eq!(data.vault, vault);
        assert_eq!(data.amount, 2_300_000_000_000_000_000);
        assert_eq!(data.claimed_at, 42);

        assert_eq!(reg.claim_data(99).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(reg.owner_of(id).unwrap(), test_address(2));
    }

    #[test]
    fn test_set_minter_admin_only() {
        let mut reg = registry();
        let external = test_address(77);

        let err = reg.set_minter(&test_address(1), external, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(!reg.is_authorized_minter(&external));

        reg.set_minter(&test_address(251), external, true).unwrap();
        assert!(reg.is_authorized_minter(&external));

        reg.set_minter(&test_address(251), external, false).unwrap();
        assert!(!reg.is_authorized_minter(&external));
    }

    #[test]
    fn test_zero_admin_disables_administration() {
        let mut reg = ClaimCertificateRegistry::new(test_address(250), Address::ZERO);
        let err = reg
            .set_minter(&Address::ZERO, test_address(77), true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_holder_queries() {
        let mut reg = registry();
        let vault = test_address(100);
        reg.authorize_vault(vault);
        reg.mint(&vault, test_address(2), vault, 1, 1).unwrap();
        reg.mint(&vault, test_address(3), vault, 1, 2).unwrap();
        reg.mint(&vault, test_address(2), vault, 1, 3).unwrap();

        assert_eq!(reg.balance_of(&test_address(2)), 2);
        assert_eq!(reg.tokens_of(&test_address(2)), &[1, 3]);
        assert_eq!(reg.balance_of(&test_address(9)), 0);
    }

    #[test]
    fn test_token_uri_encodes_metadata() {
        let mut reg = registry();
        let vault = test_address(100);
        reg.authorize_vault(vault);
        let id = reg.mint(&vault, test_address(2), vault, 500, 7).unwrap();

        let uri = reg.token_uri(id).unwrap();
        let encoded = uri.strip_prefix("data:application/json;base64,").unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(json["name"], "Deadman Vault Claim #1");
        assert_eq!(json["attributes"][2]["value"], "500");

        assert!(reg.token_uri(2).is_err());
    }

    #[test]
    fn test_consistency_after_mints() {
        let mut reg = registry();
        assert!(reg.check_consistency().is_ok());

        let vault = test_address(100);
        reg.authorize_vault(vault);
        reg.mint(&vault, test_address(2), vault, 1, 1_000).unwrap();
        reg.mint(&vault, test_address(3), vault, 2, 1_000).unwrap();
        reg.mint(&vault, test_address(2), vault, 3, 1_000).unwrap();
        assert!(reg.check_consistency().is_ok());

        let mut rewound = reg.clone();
        rewound.next_token_id = 3;
        assert!(rewound.check_consistency().is_err());

        let mut unlisted = reg.clone();
        unlisted.holders.remove(&test_address(3));
        assert!(unlisted.check_consistency().is_err());

        let mut reordered = reg;
        reordered.holders.insert(test_address(2), vec![3, 1]);
        assert!(reordered.check_consistency().is_err());
    }
}
