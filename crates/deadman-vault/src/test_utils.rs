//! Shared test utilities for deadman-vault tests.

use crate::types::Address;

/// Deterministic address from a seed byte.
///
/// The bytes are `[0x01, 0x00, ..., 0x00, seed]`, so different seeds give
/// different (and always nonzero) identities.
pub fn test_address(seed: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x01;
    bytes[19] = seed;
    Address::from_bytes(bytes)
}
