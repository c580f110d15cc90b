//! Integration tests for proof-of-work minting

use proptest::prelude::*;
use std::sync::atomic::AtomicBool;
use stipend_core::clock::SEC_PER_DAY;
use stipend_core::oracle::DEFAULT_ANNOUNCEMENT_INTERVAL;
use stipend_core::pow::leading_zero_bits;
use stipend_core::user_record::MIN_RECORD_SIZE;
use stipend_core::{Address, BlockhashOracle, Miner, Proof, StipendError, UserLedgerRecord};

const NOW: i64 = 1_700_006_400 + 3_600;
const DIFFICULTY: u32 = 8;

fn oracle(hash: [u8; 32]) -> BlockhashOracle {
    BlockhashOracle::new(NOW, hash, DEFAULT_ANNOUNCEMENT_INTERVAL)
}

#[test]
fn test_mined_proof_meets_difficulty() {
    let holder = Address([5; 32]);
    let proof = Miner::new(holder, [1; 32], DIFFICULTY).mine().unwrap();
    assert!(proof.leading_zero_bits() >= DIFFICULTY);
    assert_eq!(proof, Proof::new(holder, [1; 32], proof.nonce));
    proof.verify(DIFFICULTY, &oracle([1; 32])).unwrap();
}

#[test]
fn test_one_bit_short_is_rejected() {
    let holder = Address([5; 32]);
    let short = (0u64..)
        .map(|nonce| Proof::new(holder, [1; 32], nonce))
        .find(|proof| proof.leading_zero_bits() == DIFFICULTY - 1)
        .unwrap();
    assert!(matches!(
        short.verify(DIFFICULTY, &oracle([1; 32])),
        Err(StipendError::InsufficientDifficulty { required: 8, actual: 7 })
    ));
    short.verify(DIFFICULTY - 1, &oracle([1; 32])).unwrap();
}

#[test]
fn test_forged_hash_is_rejected() {
    let mut proof = Miner::new(Address([5; 32]), [1; 32], DIFFICULTY).mine().unwrap();
    proof.nonce += 1;
    assert!(matches!(
        proof.verify(DIFFICULTY, &oracle([1; 32])),
        Err(StipendError::ProofHashMismatch)
    ));
}

#[test]
fn test_proof_for_stale_blockhash_is_rejected() {
    let midnight = 1_700_006_400 + SEC_PER_DAY;
    let proof = Miner::new(Address([5; 32]), [1; 32], DIFFICULTY).mine().unwrap();
    let mut rotating = oracle([1; 32]);

    // next challenge announced shortly before midnight; the current one stays valid
    rotating.refresh(midnight - 100, [2; 32]);
    assert_eq!(rotating.announced.hash, [2; 32]);
    assert_eq!(rotating.valid.hash, [1; 32]);
    proof.verify(DIFFICULTY, &rotating).unwrap();

    rotating.refresh(midnight + 1, [3; 32]);
    assert_eq!(rotating.valid.hash, [2; 32]);
    assert!(!rotating.is_fresh(&[1; 32]));
    assert!(matches!(proof.verify(DIFFICULTY, &rotating), Err(StipendError::StaleProof)));
}

#[test]
fn test_replayed_proof_is_rejected() {
    let oracle = oracle([1; 32]);
    let proof = Miner::new(Address([5; 32]), [1; 32], DIFFICULTY).mine().unwrap();
    let mut record = UserLedgerRecord::new(MIN_RECORD_SIZE + 32, NOW).unwrap();
    proof.verify(DIFFICULTY, &oracle).unwrap();
    record.record_proof(&proof.hash, &proof.recent_blockhash, &oracle).unwrap();
    assert!(matches!(
        record.record_proof(&proof.hash, &proof.recent_blockhash, &oracle),
        Err(StipendError::DuplicateProof)
    ));
    assert_eq!(record.proof_count(), 1);
}

#[test]
fn test_cancelled_search_returns_none() {
    let cancel = AtomicBool::new(true);
    let miner = Miner::new(Address([5; 32]), [1; 32], 256);
    assert_eq!(miner.mine_until(&cancel).unwrap(), None);
    assert_eq!(miner.mine_range(0..64), None);
}

#[test]
fn test_proofs_are_holder_bound() {
    let proof = Miner::new(Address([5; 32]), [1; 32], DIFFICULTY).mine().unwrap();
    let stolen = Proof {
        holder: Address([6; 32]),
        ..proof
    };
    assert!(matches!(
        stolen.verify(DIFFICULTY, &oracle([1; 32])),
        Err(StipendError::ProofHashMismatch)
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_mined_proofs_verify(holder in any::<[u8; 32]>(), blockhash in any::<[u8; 32]>(), difficulty in 0u32..10) {
        let proof = Miner::new(Address(holder), blockhash, difficulty).mine().unwrap();
        prop_assert!(leading_zero_bits(&proof.hash) >= difficulty);
        prop_assert!(proof.verify(difficulty, &oracle(blockhash)).is_ok());
        let wire = proof.to_wire();
        prop_assert_eq!(Proof::from_wire(Address(holder), &wire).unwrap(), proof);
    }
}
