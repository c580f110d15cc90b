//! Stipend Core - capped monetary policy for a ledger-resident token
//!
//! This crate holds the parts of the stipend token that carry real state
//! transitions: the once-per-day distribution engine, the proof-of-work
//! minting protocol, the blockhash oracle that feeds it challenges, the
//! per-holder ledger record and the byte-exact account encoding all of them
//! read and write.
//!
//! The surrounding ledger (ownership checks, signatures, transport) is an
//! external collaborator. It is represented here by the [`ledger::TokenLedger`]
//! trait and the [`processor::ExecutionContext`] handed to every operation.

pub mod address;
pub mod clock;
pub mod codec;
pub mod distribution;
pub mod error;
pub mod fixed;
pub mod global;
pub mod ledger;
pub mod oracle;
pub mod params;
pub mod pow;
pub mod processor;
pub mod transfer_gate;
pub mod user_record;

pub use address::Address;
pub use codec::{AccountKind, AccountRecord};
pub use distribution::{DistributionState, DistributionValues};
pub use error::StipendError;
pub use global::GlobalState;
pub use ledger::{MemoryTokenLedger, TokenLedger};
pub use oracle::BlockhashOracle;
pub use params::{HwmCap, ProtocolParams};
pub use pow::{Miner, Proof};
pub use processor::{ExecutionContext, Instruction, InstructionOutput, Processor};
pub use user_record::UserLedgerRecord;

/// Result type for stipend operations
pub type Result<T> = std::result::Result<T, StipendError>;

/// 32-byte hash as produced by SHA-256 and used for blockhashes and proofs
pub type Hash = [u8; 32];

/// Size of a [`Hash`] in bytes
pub const HASH_BYTES: usize = 32;

/// Token amount in base units (the token has no decimals)
pub type TokenAmount = u64;

/// Number of daily slots kept in the distribution history rings
pub const HISTORY_SIZE: usize = 365;

/// Stipend protocol version
pub const STIPEND_VERSION: &str = "0.1.0";
