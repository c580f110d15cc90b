//! Account addresses and seed derivation

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

const DERIVATION_DOMAIN: &[u8] = b"stipend-derived-address";

/// Seed of the global state account
pub const GLOBAL_STATE_SEED: &[u8] = b"global-state";
/// Seed of the token mint
pub const MINT_SEED: &[u8] = b"mint";
/// Seed of the interest bank
pub const INTEREST_BANK_SEED: &[u8] = b"interest-bank";
/// Seed of the verified-human UBI bank
pub const VERIFIED_HUMAN_UBI_BANK_SEED: &[u8] = b"verified-human-ubi-bank";
/// Seed of the future UBI bank
pub const FUTURE_UBI_BANK_SEED: &[u8] = b"future-ubi-bank";
/// Seed prefix of a holder's ledger record
pub const USER_RECORD_SEED: &[u8] = b"user-record";

/// A 32-byte account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Derive an address deterministically from a list of seeds
    pub fn derive(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(DERIVATION_DOMAIN);
        for seed in seeds {
            // length-prefix so ["ab", "c"] and ["a", "bc"] differ
            hasher.update((seed.len() as u64).to_le_bytes());
            hasher.update(seed);
        }
        Address(hasher.finalize().into())
    }

    pub fn global_state() -> Self {
        Self::derive(&[GLOBAL_STATE_SEED])
    }

    pub fn mint() -> Self {
        Self::derive(&[MINT_SEED])
    }

    pub fn interest_bank() -> Self {
        Self::derive(&[INTEREST_BANK_SEED])
    }

    pub fn verified_human_ubi_bank() -> Self {
        Self::derive(&[VERIFIED_HUMAN_UBI_BANK_SEED])
    }

    pub fn future_ubi_bank() -> Self {
        Self::derive(&[FUTURE_UBI_BANK_SEED])
    }

    /// Address of the ledger record belonging to `holder`
    pub fn user_record(holder: &Address) -> Self {
        Self::derive(&[USER_RECORD_SEED, &holder.0])
    }

    /// Whether this address is one of the protocol banks
    pub fn is_bank(&self) -> bool {
        *self == Self::interest_bank()
            || *self == Self::verified_human_ubi_bank()
            || *self == Self::future_ubi_bank()
    }

    /// Parse a hex-encoded address
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| crate::StipendError::MalformedRecord(format!("invalid address hex: {}", e)))?;
        let array: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            crate::StipendError::MalformedRecord(format!("address must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Address(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        assert_eq!(Address::global_state(), Address::global_state());
        assert_ne!(Address::global_state(), Address::mint());
    }

    #[test]
    fn test_seed_boundaries_matter() {
        let a = Address::derive(&[b"ab", b"c"]);
        let b = Address::derive(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_banks_are_recognised() {
        assert!(Address::interest_bank().is_bank());
        assert!(Address::future_ubi_bank().is_bank());
        assert!(Address::verified_human_ubi_bank().is_bank());
        assert!(!Address([7; 32]).is_bank());
    }

    #[test]
    fn test_hex_round_trip() {
        let address = Address([0xab; 32]);
        assert_eq!(Address::from_hex(&address.to_string()).unwrap(), address);
        assert!(Address::from_hex("abcd").is_err());
        assert!(Address::from_hex("zz").is_err());
    }
}
