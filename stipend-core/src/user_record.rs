//! Per-holder ledger record
//!
//! Layout (little-endian):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 8 | last payout date (i64) |
//! | 8 | 1 | verified-human flag |
//! | 9 | 3 | padding |
//! | 12 | 4 | leading proofs mined against earlier challenges (u32) |
//! | 16 | 8 | proof count (u64) |
//! | 24 | 32 | newest blockhash proofs were mined against |
//! | 56 | 32 each | proof hashes |
//!
//! The record is backed by its raw bytes; every accessor reads or writes in
//! place so the record can be grown without re-encoding.
//!
//! The proof log spans at most two oracle windows. Moving on to a newly
//! announced challenge drops the entries logged before the stored one, so a
//! holder mining every day needs room for two windows of proofs, not a
//! growing history.

use crate::clock::normalize_time;
use crate::oracle::BlockhashOracle;
use crate::{Hash, Result, StipendError, HASH_BYTES};

/// Bytes before the first proof slot
pub const RECORD_HEADER_LEN: usize = 56;

/// Smallest valid record: the header plus one proof slot
pub const MIN_RECORD_SIZE: usize = RECORD_HEADER_LEN + HASH_BYTES;

const LAST_PAYOUT: usize = 0;
const VERIFIED: usize = 8;
const EARLIER_PROOFS: usize = 12;
const PROOF_COUNT: usize = 16;
const RECENT_BLOCKHASH: usize = 24;

/// A holder's payout date, verification flag and proof log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLedgerRecord {
    data: Vec<u8>,
}

impl UserLedgerRecord {
    /// Zeroed record of `size` bytes, last paid at the start of `now`'s day
    pub fn new(size: usize, now: i64) -> Result<Self> {
        check_size(size)?;
        let mut record = Self { data: vec![0; size] };
        record.set_last_payout_date(normalize_time(now));
        Ok(record)
    }

    /// Wrap existing record bytes after validating them
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        check_size(data.len())?;
        let record = Self { data };
        if record.data[VERIFIED] > 1 {
            return Err(StipendError::MalformedRecord(format!(
                "verified flag {}",
                record.data[VERIFIED]
            )));
        }
        let count = record.proof_count();
        if count > record.capacity() {
            return Err(StipendError::MalformedRecord(format!(
                "{} proofs recorded but room for {}",
                count,
                record.capacity()
            )));
        }
        if record.earlier_proofs() > count {
            return Err(StipendError::MalformedRecord(format!(
                "{} earlier proofs out of {}",
                record.earlier_proofs(),
                count
            )));
        }
        Ok(record)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of proof slots
    pub fn capacity(&self) -> usize {
        (self.data.len() - RECORD_HEADER_LEN) / HASH_BYTES
    }

    pub fn last_payout_date(&self) -> i64 {
        i64::from_le_bytes(self.field(LAST_PAYOUT))
    }

    pub fn set_last_payout_date(&mut self, time: i64) {
        self.data[LAST_PAYOUT..LAST_PAYOUT + 8].copy_from_slice(&time.to_le_bytes());
    }

    /// Whether the holder has claimed everything owed as of `now`
    pub fn is_current(&self, now: i64) -> bool {
        self.last_payout_date() == normalize_time(now)
    }

    pub fn is_verified_human(&self) -> bool {
        self.data[VERIFIED] == 1
    }

    pub fn set_verified_human(&mut self, verified: bool) {
        self.data[VERIFIED] = u8::from(verified);
    }

    pub fn proof_count(&self) -> usize {
        // a count that does not fit is caught by the capacity check
        usize::try_from(u64::from_le_bytes(self.field(PROOF_COUNT))).unwrap_or(usize::MAX)
    }

    fn set_proof_count(&mut self, count: usize) {
        self.data[PROOF_COUNT..PROOF_COUNT + 8].copy_from_slice(&(count as u64).to_le_bytes());
    }

    /// Leading log entries mined against challenges older than the stored one
    pub fn earlier_proofs(&self) -> usize {
        u32::from_le_bytes(self.field(EARLIER_PROOFS)) as usize
    }

    fn set_earlier_proofs(&mut self, count: u32) {
        self.data[EARLIER_PROOFS..EARLIER_PROOFS + 4].copy_from_slice(&count.to_le_bytes());
    }

    pub fn recent_blockhash(&self) -> Hash {
        self.field(RECENT_BLOCKHASH)
    }

    /// Logged proof hashes
    pub fn proofs(&self) -> impl Iterator<Item = &[u8]> {
        self.data[RECORD_HEADER_LEN..]
            .chunks_exact(HASH_BYTES)
            .take(self.proof_count())
    }

    pub fn contains(&self, proof_hash: &Hash) -> bool {
        self.proofs().any(|logged| logged == proof_hash)
    }

    /// Log an accepted proof.
    ///
    /// `blockhash` must already be fresh. A stale stored blockhash clears the
    /// log. Mining the newly announced challenge drops whatever predates the
    /// stored blockhash, which has left the oracle by then. Mining the valid
    /// challenge after the announced one keeps everything, since both are
    /// still live.
    pub fn record_proof(&mut self, proof_hash: &Hash, blockhash: &Hash, oracle: &BlockhashOracle) -> Result<()> {
        let stored = self.recent_blockhash();
        let count = self.proof_count();
        let (keep_from, earlier, newest) = if stored == *blockhash {
            (0, self.earlier_proofs(), stored)
        } else if !oracle.is_fresh(&stored) {
            (count, 0, *blockhash)
        } else if *blockhash == oracle.valid.hash {
            (0, self.earlier_proofs(), stored)
        } else {
            let dropped = self.earlier_proofs();
            (dropped, count - dropped, *blockhash)
        };
        let earlier = u32::try_from(earlier).map_err(|_| StipendError::ArithmeticOverflow)?;

        let retained = &self.data[RECORD_HEADER_LEN + keep_from * HASH_BYTES..RECORD_HEADER_LEN + count * HASH_BYTES];
        if retained.chunks_exact(HASH_BYTES).any(|logged| logged == proof_hash) {
            return Err(StipendError::DuplicateProof);
        }
        let kept = count - keep_from;
        if kept >= self.capacity() {
            return Err(StipendError::RecordTooSmall {
                needed: self.data.len() + HASH_BYTES,
                available: self.data.len(),
            });
        }

        if keep_from > 0 {
            tracing::debug!("Dropped {} stale proofs, logging {}", keep_from, hex::encode(blockhash));
            self.data.copy_within(
                RECORD_HEADER_LEN + keep_from * HASH_BYTES..RECORD_HEADER_LEN + count * HASH_BYTES,
                RECORD_HEADER_LEN,
            );
            self.data[RECORD_HEADER_LEN + (kept + 1) * HASH_BYTES..RECORD_HEADER_LEN + count * HASH_BYTES].fill(0);
        }
        self.set_earlier_proofs(earlier);
        self.data[RECENT_BLOCKHASH..RECENT_BLOCKHASH + HASH_BYTES].copy_from_slice(&newest);
        let offset = RECORD_HEADER_LEN + kept * HASH_BYTES;
        self.data[offset..offset + HASH_BYTES].copy_from_slice(proof_hash);
        self.set_proof_count(kept + 1);
        Ok(())
    }

    /// Grow in place to `new_size`, zero-filling the added slots
    pub fn grow(&mut self, new_size: usize, max_growth: usize) -> Result<()> {
        let current = self.data.len();
        if new_size < current {
            return Err(StipendError::ShrinkNotAllowed {
                current,
                requested: new_size,
            });
        }
        check_size(new_size)?;
        let growth = new_size - current;
        if growth > max_growth {
            return Err(StipendError::GrowthTooLarge {
                requested: growth,
                limit: max_growth,
            });
        }
        self.data.resize(new_size, 0);
        Ok(())
    }

    fn field<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[offset..offset + N]);
        out
    }
}

/// Record sizes must hold the header and a whole number of proof slots
pub fn check_size(size: usize) -> Result<()> {
    if size < MIN_RECORD_SIZE {
        return Err(StipendError::RecordTooSmall {
            needed: MIN_RECORD_SIZE,
            available: size,
        });
    }
    if (size - RECORD_HEADER_LEN) % HASH_BYTES != 0 {
        return Err(StipendError::MalformedRecord(format!(
            "size {} does not end on a proof slot",
            size
        )));
    }
    Ok(())
}
