//! Error taxonomy for vault, factory and registry operations.
//!
//! Every failing operation aborts with no observable state change. The
//! `Display` output names the error kind and the violated precondition.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount, TokenId};

/// Malformed or out-of-bounds input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("identity must not be the zero address")]
    ZeroAddress,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("beneficiary {0} must differ from the owner")]
    BeneficiaryIsOwner(Address),

    #[error("timeout of {secs}s is outside the allowed range [{min}s, {max}s]")]
    TimeoutOutOfBounds { secs: u64, min: u64, max: u64 },

    #[error("amount must be greater than zero")]
    ZeroAmount,
}

/// Caller lacks the required role
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("caller {caller} is not the vault owner")]
    NotOwner { caller: Address },

    #[error("caller {caller} is not the vault beneficiary")]
    NotBeneficiary { caller: Address },

    #[error("caller {0} is not an authorized minter")]
    NotMinter(Address),

    #[error("caller {0} is not the registry admin")]
    NotAdmin(Address),
}

/// Operation invalid for the current state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("vault has not expired ({seconds_remaining}s remaining)")]
    NotExpired { seconds_remaining: u64 },

    #[error("withdrawal of {requested} exceeds balance of {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("withdrawals are disabled once the vault has expired")]
    WithdrawAfterExpiry,

    #[error("deposit would overflow the vault balance")]
    BalanceOverflow,

    #[error("vault {0} already exists")]
    VaultExists(Address),
}

/// Reference to a nonexistent entity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("vault {0} does not exist")]
    Vault(Address),

    #[error("certificate #{0} has not been minted")]
    Token(TokenId),
}

/// Errors from vault, factory and registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error category, for callers that branch on kind only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    NotFound,
    Internal,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Validation(_) => ErrorKind::Validation,
            VaultError::Authorization(_) => ErrorKind::Authorization,
            VaultError::State(_) => ErrorKind::State,
            VaultError::NotFound(_) => ErrorKind::NotFound,
            VaultError::Internal(_) => ErrorKind::Internal,
        }
    }
}
