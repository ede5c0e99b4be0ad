//! Discrete commands: `(caller, operation, arguments)` in serializable form.
//!
//! ```json
//! { "caller": "0x…", "op": { "deposit": { "vault": "0x…", "amount": "2300000000000000000" } } }
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{amount_serde, Address, Amount, TokenId};
use crate::vault::ClaimReceipt;

/// A state-changing request on behalf of `caller`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub caller: Address,
    pub op: Operation,
}

impl Command {
    pub fn new(caller: Address, op: Operation) -> Self {
        Self { caller, op }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateVault {
        beneficiary: Address,
        timeout_secs: u64,
    },
    Deposit {
        vault: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    Withdraw {
        vault: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    Ping {
        vault: Address,
    },
    SetBeneficiary {
        vault: Address,
        beneficiary: Address,
    },
    SetTimeout {
        vault: Address,
        timeout_secs: u64,
    },
    Claim {
        vault: Address,
    },
    SetMinter {
        minter: Address,
        allowed: bool,
    },
    Mint {
        beneficiary: Address,
        vault: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateVault { .. } => "createVault",
            Operation::Deposit { .. } => "deposit",
            Operation::Withdraw { .. } => "withdraw",
            Operation::Ping { .. } => "ping",
            Operation::SetBeneficiary { .. } => "setBeneficiary",
            Operation::SetTimeout { .. } => "setTimeout",
            Operation::Claim { .. } => "claim",
            Operation::SetMinter { .. } => "setMinter",
            Operation::Mint { .. } => "mint",
        }
    }

    /// The vault the operation targets, if it targets an existing one
    pub fn target(&self) -> Option<&Address> {
        match self {
            Operation::Deposit { vault, .. }
            | Operation::Withdraw { vault, .. }
            | Operation::Ping { vault }
            | Operation::SetBeneficiary { vault, .. }
            | Operation::SetTimeout { vault, .. }
            | Operation::Claim { vault } => Some(vault),
            Operation::CreateVault { .. }
            | Operation::SetMinter { .. }
            | Operation::Mint { .. } => None,
        }
    }
}

/// Successful result of a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    VaultCreated {
        vault: Address,
    },
    Balance {
        vault: Address,
        #[serde(with = "amount_serde")]
        balance: Amount,
    },
    Pinged {
        vault: Address,
        at: u64,
    },
    BeneficiarySet {
        vault: Address,
        beneficiary: Address,
    },
    TimeoutSet {
        vault: Address,
        timeout_secs: u64,
    },
    Claimed(ClaimReceipt),
    MinterSet {
        minter: Address,
        allowed: bool,
    },
    Minted {
        token_id: TokenId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_address;

    #[test]
    fn test_command_json_shape() {
        let json = format!(
            r#"{{ "caller": "{}", "op": {{ "deposit": {{ "vault": "{}", "amount": "2300000000000000000" }} }} }}"#,
            test_address(5),
            test_address(100)
        );
        let command: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(command.caller, test_address(5));
        assert_eq!(
            command.op,
            Operation::Deposit {
                vault: test_address(100),
                amount: 2_300_000_000_000_000_000,
            }
        );
        assert_eq!(command.op.name(), "deposit");
        assert_eq!(command.op.target(), Some(&test_address(100)));
    }

    #[test]
    fn test_command_list_parses() {
        let json = format!(
            r#"[
                {{ "caller": "{owner}", "op": {{ "create_vault": {{ "beneficiary": "{heir}", "timeout_secs": 2592000 }} }} }},
                {{ "caller": "{owner}", "op": {{ "ping": {{ "vault": "{vault}" }} }} }},
                {{ "caller": "{heir}", "op": {{ "claim": {{ "vault": "{vault}" }} }} }}
            ]"#,
            owner = test_address(1),
            heir = test_address(2),
            vault = test_address(100)
        );
        let commands: Vec<Command> = serde_json::from_str(&json).unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].op.name(), "createVault");
        assert!(commands[0].op.target().is_none());
        assert_eq!(commands[2].op.name(), "claim");
    }
}
