//! Proof-of-work minting
//!
//! A proof binds a holder to one of the oracle's challenges:
//! `SHA256(holder || recent_blockhash || nonce_le)`. Clients search nonces
//! until the hash has enough leading zero bits; the ledger recomputes the
//! hash once and checks difficulty and freshness.

use crate::oracle::BlockhashOracle;
use crate::{Address, Hash, Result, StipendError, HASH_BYTES};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

/// Submitted proof payload: `recent_blockhash(32) | nonce(8) | hash(32)`
pub const PROOF_WIRE_LEN: usize = HASH_BYTES + 8 + HASH_BYTES;

/// Nonces tried between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// A mined proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proof {
    pub holder: Address,
    pub recent_blockhash: Hash,
    pub nonce: u64,
    pub hash: Hash,
}

impl Proof {
    /// Build a proof, computing its hash
    pub fn new(holder: Address, recent_blockhash: Hash, nonce: u64) -> Self {
        Self {
            holder,
            recent_blockhash,
            nonce,
            hash: proof_hash(&holder, &recent_blockhash, nonce),
        }
    }

    /// 72-byte submission payload (the holder travels as the signer)
    pub fn to_wire(&self) -> [u8; PROOF_WIRE_LEN] {
        let mut out = [0u8; PROOF_WIRE_LEN];
        out[..32].copy_from_slice(&self.recent_blockhash);
        out[32..40].copy_from_slice(&self.nonce.to_le_bytes());
        out[40..].copy_from_slice(&self.hash);
        out
    }

    /// Parse a submission payload for `holder`. The hash is taken as submitted.
    pub fn from_wire(holder: Address, data: &[u8]) -> Result<Self> {
        if data.len() != PROOF_WIRE_LEN {
            return Err(StipendError::InvalidInstruction(format!(
                "proof payload must be {} bytes, got {}",
                PROOF_WIRE_LEN,
                data.len()
            )));
        }
        let mut recent_blockhash = [0u8; 32];
        recent_blockhash.copy_from_slice(&data[..32]);
        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&data[32..40]);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&data[40..]);
        Ok(Self {
            holder,
            recent_blockhash,
            nonce: u64::from_le_bytes(nonce),
            hash,
        })
    }

    pub fn leading_zero_bits(&self) -> u32 {
        leading_zero_bits(&self.hash)
    }

    /// Ledger-side checks that need no per-holder state.
    ///
    /// Order: recomputed hash, difficulty, freshness. Replay detection
    /// happens against the holder's record.
    pub fn verify(&self, difficulty: u32, oracle: &BlockhashOracle) -> Result<()> {
        let recomputed = proof_hash(&self.holder, &self.recent_blockhash, self.nonce);
        if recomputed != self.hash {
            return Err(StipendError::ProofHashMismatch);
        }
        let actual = leading_zero_bits(&recomputed);
        if actual < difficulty {
            return Err(StipendError::InsufficientDifficulty {
                required: difficulty,
                actual,
            });
        }
        if !oracle.is_fresh(&self.recent_blockhash) {
            return Err(StipendError::StaleProof);
        }
        Ok(())
    }
}

/// `SHA256(holder || recent_blockhash || nonce_le)`
pub fn proof_hash(holder: &Address, recent_blockhash: &Hash, nonce: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(holder.as_bytes());
    hasher.update(recent_blockhash);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

/// Leading zero bits, counted from the most significant bit of byte 0
pub fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut bits = 0;
    for byte in hash {
        bits += byte.leading_zeros();
        if *byte != 0 {
            break;
        }
    }
    bits
}

/// Client-side nonce search
#[derive(Clone)]
pub struct Miner {
    pub holder: Address,
    pub blockhash: Hash,
    pub difficulty: u32,
    prefix: Sha256,
}

impl fmt::Debug for Miner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Miner")
            .field("holder", &self.holder)
            .field("blockhash", &hex::encode(self.blockhash))
            .field("difficulty", &self.difficulty)
            .finish_non_exhaustive()
    }
}

impl Miner {
    pub fn new(holder: Address, blockhash: Hash, difficulty: u32) -> Self {
        let mut prefix = Sha256::new();
        prefix.update(holder.as_bytes());
        prefix.update(blockhash);
        Self {
            holder,
            blockhash,
            difficulty,
            prefix,
        }
    }

    fn hash_at(&self, nonce: u64) -> Hash {
        let mut hasher = self.prefix.clone();
        hasher.update(nonce.to_le_bytes());
        hasher.finalize().into()
    }

    fn proof_at(&self, nonce: u64) -> Option<Proof> {
        let hash = self.hash_at(nonce);
        (leading_zero_bits(&hash) >= self.difficulty).then_some(Proof {
            holder: self.holder,
            recent_blockhash: self.blockhash,
            nonce,
            hash,
        })
    }

    /// Search from nonce 0 until a proof is found
    pub fn mine(&self) -> Result<Proof> {
        let never = AtomicBool::new(false);
        self.mine_until(&never)?.ok_or(StipendError::ArithmeticOverflow)
    }

    /// Search from nonce 0 until a proof is found or `cancel` is set.
    ///
    /// Returns `Ok(None)` when cancelled and `ArithmeticOverflow` if every
    /// nonce fails.
    pub fn mine_until(&self, cancel: &AtomicBool) -> Result<Option<Proof>> {
        let mut start = 0u64;
        loop {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!("Mining cancelled at nonce {}", start);
                return Ok(None);
            }
            let end = start.saturating_add(CANCEL_CHECK_INTERVAL);
            if let Some(proof) = self.mine_range(start..end) {
                tracing::debug!("Found proof at nonce {}", proof.nonce);
                return Ok(Some(proof));
            }
            if end == u64::MAX {
                return self
                    .proof_at(u64::MAX)
                    .map(Some)
                    .ok_or(StipendError::ArithmeticOverflow);
            }
            start = end;
        }
    }

    /// First proof within `nonces`, if any
    pub fn mine_range(&self, mut nonces: Range<u64>) -> Option<Proof> {
        nonces.find_map(|nonce| self.proof_at(nonce))
    }
}
