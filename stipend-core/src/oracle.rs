//! Blockhash oracle
//!
//! Holds the two challenges proofs may be mined against. The `announced`
//! challenge is published shortly before midnight so miners can start early;
//! at midnight it becomes the `valid` challenge. A slot is replaced only once
//! it is more than a day old, so a day that nobody touched the oracle is
//! skipped cleanly on the next refresh.

use crate::clock::{normalize_time, SEC_PER_DAY};
use crate::codec::ByteReader;
use crate::{Hash, Result};

/// Seconds before midnight at which the next challenge is announced
pub const DEFAULT_ANNOUNCEMENT_INTERVAL: i64 = 300;

/// Encoded size: two hashes with their timestamps
pub const ORACLE_LEN: usize = 80;

/// A challenge hash and the time it took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimedHash {
    pub hash: Hash,
    pub timestamp: i64,
}

/// Which slots a refresh replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OracleRotation {
    pub announced: bool,
    pub valid: bool,
}

/// The announced/valid challenge pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockhashOracle {
    pub announced: TimedHash,
    pub valid: TimedHash,
}

impl BlockhashOracle {
    /// Oracle whose slots both take effect from `fresh` at `now`
    pub fn new(now: i64, fresh: Hash, announcement_interval: i64) -> Self {
        Self {
            announced: TimedHash {
                hash: fresh,
                timestamp: announcement_time(now, announcement_interval),
            },
            valid: TimedHash {
                hash: fresh,
                timestamp: normalize_time(now),
            },
        }
    }

    /// Replace whichever slots are stale, using the default announcement interval
    pub fn refresh(&mut self, now: i64, fresh: Hash) -> OracleRotation {
        self.refresh_with_interval(now, fresh, DEFAULT_ANNOUNCEMENT_INTERVAL)
    }

    /// Replace whichever slots are more than a day old.
    ///
    /// A stale valid slot is promoted from the announced slot, which is
    /// itself refreshed first when stale.
    pub fn refresh_with_interval(&mut self, now: i64, fresh: Hash, announcement_interval: i64) -> OracleRotation {
        let mut rotation = OracleRotation::default();
        if self.is_announced_stale(now) {
            self.announced = TimedHash {
                hash: fresh,
                timestamp: announcement_time(now, announcement_interval),
            };
            rotation.announced = true;
        }
        if self.is_valid_stale(now) {
            self.valid = TimedHash {
                hash: self.announced.hash,
                timestamp: normalize_time(now),
            };
            rotation.valid = true;
        }
        if rotation.announced || rotation.valid {
            tracing::debug!(
                "Oracle rotated (announced: {}, valid: {}) at {}",
                rotation.announced,
                rotation.valid,
                now
            );
        }
        rotation
    }

    pub fn is_announced_stale(&self, now: i64) -> bool {
        now > self.announced.timestamp.saturating_add(SEC_PER_DAY)
    }

    pub fn is_valid_stale(&self, now: i64) -> bool {
        now > self.valid.timestamp.saturating_add(SEC_PER_DAY)
    }

    /// Whether a proof mined against `candidate` may be accepted
    pub fn is_fresh(&self, candidate: &Hash) -> bool {
        *candidate == self.announced.hash || *candidate == self.valid.hash
    }

    /// `valid(32) | announced(32)`, the payload returned to miners
    pub fn challenges(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.valid.hash);
        out[32..].copy_from_slice(&self.announced.hash);
        out
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        for slot in [&self.announced, &self.valid] {
            buf.extend_from_slice(&slot.hash);
            buf.extend_from_slice(&slot.timestamp.to_le_bytes());
        }
    }

    pub(crate) fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        let announced = TimedHash {
            hash: reader.hash()?,
            timestamp: reader.i64()?,
        };
        let valid = TimedHash {
            hash: reader.hash()?,
            timestamp: reader.i64()?,
        };
        Ok(Self { announced, valid })
    }
}

/// Announcement time of the day `now + interval` falls in
fn announcement_time(now: i64, announcement_interval: i64) -> i64 {
    normalize_time(now + announcement_interval) - announcement_interval
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIDNIGHT: i64 = 1_700_006_400;

    #[test]
    fn test_new_oracle_timestamps() {
        let oracle = BlockhashOracle::new(MIDNIGHT + 60, [1; 32], 300);
        assert_eq!(oracle.announced.timestamp, MIDNIGHT - 300);
        assert_eq!(oracle.valid.timestamp, MIDNIGHT);
        assert!(oracle.is_fresh(&[1; 32]));
        assert!(!oracle.is_fresh(&[2; 32]));
    }

    #[test]
    fn test_daily_refresh_replaces_both_slots() {
        let mut oracle = BlockhashOracle::new(MIDNIGHT + 60, [1; 32], 300);
        let next = MIDNIGHT + SEC_PER_DAY + 60;
        let rotation = oracle.refresh(next, [2; 32]);
        assert!(rotation.announced && rotation.valid);
        assert_eq!(oracle.announced.timestamp, MIDNIGHT + SEC_PER_DAY - 300);
        assert_eq!(oracle.valid.timestamp, MIDNIGHT + SEC_PER_DAY);
        assert_eq!(oracle.valid.hash, [2; 32]);
        assert!(!oracle.is_fresh(&[1; 32]));
    }

    #[test]
    fn test_announcement_before_midnight() {
        let mut oracle = BlockhashOracle::new(MIDNIGHT + 60, [1; 32], 300);
        let just_before = MIDNIGHT + SEC_PER_DAY - 200;
        let rotation = oracle.refresh(just_before, [2; 32]);
        assert_eq!(rotation, OracleRotation { announced: true, valid: false });
        assert!(oracle.is_fresh(&[1; 32]));
        assert!(oracle.is_fresh(&[2; 32]));
        assert_eq!(oracle.challenges()[..32], [1; 32]);
        assert_eq!(oracle.challenges()[32..], [2; 32]);
    }

    #[test]
    fn test_refresh_within_day_is_noop() {
        let mut oracle = BlockhashOracle::new(MIDNIGHT + 60, [1; 32], 300);
        let before = oracle;
        assert_eq!(oracle.refresh(MIDNIGHT + 3_600, [9; 32]), OracleRotation::default());
        assert_eq!(oracle, before);
    }

    #[test]
    fn test_skipped_days_realign() {
        let mut oracle = BlockhashOracle::new(MIDNIGHT + 60, [1; 32], 300);
        oracle.refresh(MIDNIGHT + 5 * SEC_PER_DAY + 10, [3; 32]);
        assert_eq!(oracle.valid.timestamp, MIDNIGHT + 5 * SEC_PER_DAY);
        assert_eq!(oracle.announced.timestamp, MIDNIGHT + 5 * SEC_PER_DAY - 300);
    }

    #[test]
    fn test_encoding_is_eighty_bytes() {
        let oracle = BlockhashOracle::new(MIDNIGHT, [5; 32], 300);
        let mut buf = Vec::new();
        oracle.encode_into(&mut buf);
        assert_eq!(buf.len(), ORACLE_LEN);
        let decoded = BlockhashOracle::decode_from(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(decoded, oracle);
    }
}
