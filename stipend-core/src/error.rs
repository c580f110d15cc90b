//! Error types for stipend operations

use thiserror::Error;

/// Every way an operation can be rejected.
///
/// None of these leave partial writes behind: an operation either applies
/// completely or not at all.
#[derive(Error, Debug)]
pub enum StipendError {
    #[error("Proof references a blockhash that is neither announced nor valid")]
    StaleProof,

    #[error("Proof has already been submitted")]
    DuplicateProof,

    #[error("Insufficient difficulty: need {required} leading zero bits, got {actual}")]
    InsufficientDifficulty { required: u32, actual: u32 },

    #[error("Submitted hash does not match the recomputed proof hash")]
    ProofHashMismatch,

    #[error("Daily distribution already ran for this day")]
    AlreadyDistributedToday,

    #[error("Record cannot shrink from {current} to {requested} bytes")]
    ShrinkNotAllowed { current: usize, requested: usize },

    #[error("Record too small: need {needed} bytes, have {available}")]
    RecordTooSmall { needed: usize, available: usize },

    #[error("Growth too large: requested {requested} additional bytes, limit is {limit}")]
    GrowthTooLarge { requested: usize, limit: usize },

    #[error("Invalid account type: expected {expected}, found {found}")]
    InvalidAccountType { expected: u8, found: u8 },

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Insufficient bank funds: need {needed}, have {available}")]
    InsufficientBankFunds { needed: u64, available: u64 },

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Interest must be claimed before transferring")]
    UnclaimedInterest,

    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StipendError {
    /// Whether a client can fix the cause and resubmit.
    ///
    /// A stale proof is re-mined against a fresh blockhash; a full record is
    /// grown first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StipendError::StaleProof | StipendError::RecordTooSmall { .. }
        )
    }

    /// Outcomes that are expected during normal operation and do not point
    /// at corrupted state.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            StipendError::AlreadyDistributedToday
                | StipendError::StaleProof
                | StipendError::DuplicateProof
        )
    }
}
