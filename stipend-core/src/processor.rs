//! Operation processor
//!
//! Decodes instructions and applies them to the protocol's accounts. Each
//! instruction runs against a staged copy of every account and token
//! balance; the copy replaces the live state only if the instruction
//! succeeds, so a rejected instruction leaves no partial writes.

use crate::clock::{day_label, normalize_time};
use crate::distribution::{verification_reward, DistributionInputs, DistributionState, DistributionValues};
use crate::global::GlobalState;
use crate::ledger::TokenLedger;
use crate::params::ProtocolParams;
use crate::pow::{Proof, PROOF_WIRE_LEN};
use crate::transfer_gate::{check_transfer, TransferParty};
use crate::user_record::UserLedgerRecord;
use crate::{Address, Hash, Result, StipendError, TokenAmount};
use std::collections::BTreeMap;

/// What the enclosing ledger supplies with every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Ledger timestamp in seconds
    pub now: i64,
    /// Unpredictable recent hash sampled from the ledger
    pub recent_hash: Hash,
}

/// A decoded operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    SubmitProof {
        recent_blockhash: Hash,
        nonce: u64,
        hash: Hash,
    },
    Initialize,
    CreateUserRecord {
        rent: u64,
        size: u64,
    },
    RunDailyDistribution,
    GetValidBlockhashes,
    ClaimOwed,
    GrowUserRecord {
        rent: u64,
        new_size: u64,
    },
    VerifyHuman,
    Transfer {
        destination: Address,
        amount: TokenAmount,
    },
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::SubmitProof { .. } => 1,
            Instruction::Initialize => 2,
            Instruction::CreateUserRecord { .. } => 3,
            Instruction::RunDailyDistribution => 4,
            Instruction::GetValidBlockhashes => 5,
            Instruction::ClaimOwed => 6,
            Instruction::GrowUserRecord { .. } => 7,
            Instruction::VerifyHuman => 8,
            Instruction::Transfer { .. } => 9,
        }
    }

    /// Instruction carrying a mined proof
    pub fn submit_proof(proof: &Proof) -> Self {
        Instruction::SubmitProof {
            recent_blockhash: proof.recent_blockhash,
            nonce: proof.nonce,
            hash: proof.hash,
        }
    }

    /// Opcode byte followed by the payload
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = vec![self.opcode()];
        match self {
            Instruction::SubmitProof {
                recent_blockhash,
                nonce,
                hash,
            } => {
                buf.extend_from_slice(recent_blockhash);
                buf.extend_from_slice(&nonce.to_le_bytes());
                buf.extend_from_slice(hash);
            }
            Instruction::CreateUserRecord { rent, size: second }
            | Instruction::GrowUserRecord { rent, new_size: second } => {
                buf.extend_from_slice(&rent.to_le_bytes());
                buf.extend_from_slice(&second.to_le_bytes());
            }
            Instruction::Transfer { destination, amount } => {
                buf.extend_from_slice(destination.as_bytes());
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Instruction::Initialize
            | Instruction::RunDailyDistribution
            | Instruction::GetValidBlockhashes
            | Instruction::ClaimOwed
            | Instruction::VerifyHuman => {}
        }
        buf
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        let (&opcode, payload) = data
            .split_first()
            .ok_or_else(|| StipendError::InvalidInstruction("empty instruction".to_string()))?;
        let expect_len = |len: usize| -> Result<()> {
            if payload.len() == len {
                Ok(())
            } else {
                Err(StipendError::InvalidInstruction(format!(
                    "opcode {} takes {} payload bytes, got {}",
                    opcode,
                    len,
                    payload.len()
                )))
            }
        };
        let u64_at = |offset: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&payload[offset..offset + 8]);
            u64::from_le_bytes(bytes)
        };

        match opcode {
            1 => {
                expect_len(PROOF_WIRE_LEN)?;
                let proof = Proof::from_wire(Address::default(), payload)?;
                Ok(Instruction::SubmitProof {
                    recent_blockhash: proof.recent_blockhash,
                    nonce: proof.nonce,
                    hash: proof.hash,
                })
            }
            2 => expect_len(0).map(|()| Instruction::Initialize),
            3 => {
                expect_len(16)?;
                Ok(Instruction::CreateUserRecord {
                    rent: u64_at(0),
                    size: u64_at(8),
                })
            }
            4 => expect_len(0).map(|()| Instruction::RunDailyDistribution),
            5 => expect_len(0).map(|()| Instruction::GetValidBlockhashes),
            6 => expect_len(0).map(|()| Instruction::ClaimOwed),
            7 => {
                expect_len(16)?;
                Ok(Instruction::GrowUserRecord {
                    rent: u64_at(0),
                    new_size: u64_at(8),
                })
            }
            8 => expect_len(0).map(|()| Instruction::VerifyHuman),
            9 => {
                expect_len(40)?;
                let mut destination = [0u8; 32];
                destination.copy_from_slice(&payload[..32]);
                Ok(Instruction::Transfer {
                    destination: Address(destination),
                    amount: u64_at(32),
                })
            }
            other => Err(StipendError::InvalidInstruction(format!("unknown opcode {}", other))),
        }
    }
}

/// Result of a successful instruction
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionOutput {
    Done,
    ProofAccepted {
        reward: TokenAmount,
    },
    Distributed(DistributionValues),
    Blockhashes {
        valid: Hash,
        announced: Hash,
    },
    Claimed {
        days: usize,
        interest: TokenAmount,
        ubi: TokenAmount,
    },
    Verified {
        reward: TokenAmount,
    },
    AlreadyVerified,
}

impl InstructionOutput {
    /// Bytes handed back to the caller; only blockhash queries return data
    pub fn return_data(&self) -> Vec<u8> {
        match self {
            InstructionOutput::Blockhashes { valid, announced } => [valid.as_slice(), announced.as_slice()].concat(),
            _ => Vec::new(),
        }
    }
}

/// Protocol accounts plus the token ledger
#[derive(Debug, Clone)]
struct Store<L> {
    accounts: BTreeMap<Address, Vec<u8>>,
    tokens: L,
}

impl<L: TokenLedger> Store<L> {
    fn global(&self) -> Result<GlobalState> {
        let data = self
            .accounts
            .get(&Address::global_state())
            .ok_or_else(|| StipendError::AccountNotFound("global state".to_string()))?;
        GlobalState::decode(data)
    }

    fn put_global(&mut self, state: &GlobalState) {
        self.accounts.insert(Address::global_state(), state.encode());
    }

    fn record(&self, holder: &Address) -> Result<UserLedgerRecord> {
        self.find_record(holder)?
            .ok_or_else(|| StipendError::AccountNotFound(format!("ledger record of {}", holder)))
    }

    fn find_record(&self, holder: &Address) -> Result<Option<UserLedgerRecord>> {
        self.accounts
            .get(&Address::user_record(holder))
            .map(|data| UserLedgerRecord::from_bytes(data.clone()))
            .transpose()
    }

    fn put_record(&mut self, holder: &Address, record: UserLedgerRecord) {
        self.accounts.insert(Address::user_record(holder), record.into_bytes());
    }
}

/// Applies instructions atomically
#[derive(Debug, Clone)]
pub struct Processor<L> {
    params: ProtocolParams,
    store: Store<L>,
}

impl<L: TokenLedger + Clone> Processor<L> {
    pub fn new(params: ProtocolParams, tokens: L) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            store: Store {
                accounts: BTreeMap::new(),
                tokens,
            },
        })
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn tokens(&self) -> &L {
        &self.store.tokens
    }

    pub fn global_state(&self) -> Result<GlobalState> {
        self.store.global()
    }

    pub fn user_record(&self, holder: &Address) -> Result<UserLedgerRecord> {
        self.store.record(holder)
    }

    /// Raw bytes of a protocol account
    pub fn account_data(&self, address: &Address) -> Option<&[u8]> {
        self.store.accounts.get(address).map(Vec::as_slice)
    }

    /// Decode and apply a packed instruction
    pub fn process_bytes(&mut self, signer: &Address, data: &[u8], ctx: &ExecutionContext) -> Result<InstructionOutput> {
        let instruction = Instruction::unpack(data)?;
        self.process(signer, &instruction, ctx)
    }

    /// Apply `instruction` on behalf of `signer`, all or nothing
    pub fn process(
        &mut self,
        signer: &Address,
        instruction: &Instruction,
        ctx: &ExecutionContext,
    ) -> Result<InstructionOutput> {
        tracing::debug!("Instruction {} from {} on {}", instruction.opcode(), signer, day_label(ctx.now));
        let mut staged = self.store.clone();
        match execute(&self.params, &mut staged, signer, instruction, ctx) {
            Ok(output) => {
                self.store = staged;
                Ok(output)
            }
            Err(e) => {
                if e.is_expected() {
                    tracing::debug!("Instruction {} rejected: {}", instruction.opcode(), e);
                } else {
                    tracing::warn!("Instruction {} failed: {}", instruction.opcode(), e);
                }
                Err(e)
            }
        }
    }
}

fn execute<L: TokenLedger>(
    params: &ProtocolParams,
    store: &mut Store<L>,
    signer: &Address,
    instruction: &Instruction,
    ctx: &ExecutionContext,
) -> Result<InstructionOutput> {
    match instruction {
        Instruction::SubmitProof {
            recent_blockhash,
            nonce,
            hash,
        } => submit_proof(
            params,
            store,
            Proof {
                holder: *signer,
                recent_blockhash: *recent_blockhash,
                nonce: *nonce,
                hash: *hash,
            },
        ),
        Instruction::Initialize => initialize(params, store, ctx),
        Instruction::CreateUserRecord { rent, size } => create_user_record(store, signer, *rent, *size, ctx),
        Instruction::RunDailyDistribution => run_daily_distribution(params, store, ctx),
        Instruction::GetValidBlockhashes => get_valid_blockhashes(params, store, ctx),
        Instruction::ClaimOwed => claim_owed(store, signer, ctx),
        Instruction::GrowUserRecord { rent, new_size } => grow_user_record(params, store, signer, *rent, *new_size),
        Instruction::VerifyHuman => verify_human(params, store, signer),
        Instruction::Transfer { destination, amount } => transfer(store, signer, destination, *amount, ctx),
    }
}

fn submit_proof<L: TokenLedger>(params: &ProtocolParams, store: &mut Store<L>, proof: Proof) -> Result<InstructionOutput> {
    let global = store.global()?;
    proof.verify(params.difficulty, &global.oracle)?;

    let mut record = store.record(&proof.holder)?;
    record.record_proof(&proof.hash, &proof.recent_blockhash, &global.oracle)?;
    store.tokens.mint_to(&proof.holder, params.proof_reward)?;
    store.put_record(&proof.holder, record);

    tracing::info!(
        "Accepted proof {} from {} ({} leading zero bits)",
        hex::encode(proof.hash),
        proof.holder,
        proof.leading_zero_bits()
    );
    Ok(InstructionOutput::ProofAccepted {
        reward: params.proof_reward,
    })
}

fn initialize<L: TokenLedger>(params: &ProtocolParams, store: &mut Store<L>, ctx: &ExecutionContext) -> Result<InstructionOutput> {
    if store.accounts.contains_key(&Address::global_state()) {
        return Err(StipendError::AccountAlreadyExists("global state".to_string()));
    }
    let global = GlobalState::new(ctx.now, ctx.recent_hash, params);
    store.put_global(&global);
    for bank in [
        Address::interest_bank(),
        Address::verified_human_ubi_bank(),
        Address::future_ubi_bank(),
    ] {
        store.tokens.open_account(&bank)?;
    }
    tracing::info!("Initialized protocol on {}", day_label(ctx.now));
    Ok(InstructionOutput::Done)
}

fn create_user_record<L: TokenLedger>(
    store: &mut Store<L>,
    holder: &Address,
    rent: u64,
    size: u64,
    ctx: &ExecutionContext,
) -> Result<InstructionOutput> {
    if store.accounts.contains_key(&Address::user_record(holder)) {
        return Err(StipendError::AccountAlreadyExists(format!("ledger record of {}", holder)));
    }
    let size = to_usize(size)?;
    let record = UserLedgerRecord::new(size, ctx.now)?;
    store.put_record(holder, record);
    tracing::info!("Created {}-byte ledger record for {} (rent {})", size, holder, rent);
    Ok(InstructionOutput::Done)
}

fn run_daily_distribution<L: TokenLedger>(
    params: &ProtocolParams,
    store: &mut Store<L>,
    ctx: &ExecutionContext,
) -> Result<InstructionOutput> {
    let mut global = store.global()?;
    if global.distribution.already_distributed(ctx.now) {
        return Err(StipendError::AlreadyDistributedToday);
    }

    let inputs = DistributionInputs {
        now: ctx.now,
        mint_supply: store.tokens.supply()?,
        future_ubi_bank: store.tokens.balance(&Address::future_ubi_bank())?,
        interest_bank: store.tokens.balance(&Address::interest_bank())?,
    };
    let values = global.daily_distribution_event(params, inputs, ctx.recent_hash)?;

    let interest_bank = Address::interest_bank();
    let future_ubi_bank = Address::future_ubi_bank();
    store.tokens.mint_to(&interest_bank, values.interest_share)?;
    store
        .tokens
        .mint_to(&Address::verified_human_ubi_bank(), values.verified_human_ubi)?;
    store.tokens.mint_to(&future_ubi_bank, values.future_ubi)?;
    store
        .tokens
        .transfer(&interest_bank, &future_ubi_bank, values.future_ubi_interest)?;
    store.put_global(&global);

    Ok(InstructionOutput::Distributed(values))
}

fn get_valid_blockhashes<L: TokenLedger>(
    params: &ProtocolParams,
    store: &mut Store<L>,
    ctx: &ExecutionContext,
) -> Result<InstructionOutput> {
    let mut global = store.global()?;
    global
        .oracle
        .refresh_with_interval(ctx.now, ctx.recent_hash, params.announcement_interval_secs);
    store.put_global(&global);
    Ok(InstructionOutput::Blockhashes {
        valid: global.oracle.valid.hash,
        announced: global.oracle.announced.hash,
    })
}

fn claim_owed<L: TokenLedger>(store: &mut Store<L>, holder: &Address, ctx: &ExecutionContext) -> Result<InstructionOutput> {
    let global = store.global()?;
    let mut record = store.record(holder)?;
    let distribution = &global.distribution;

    let days = DistributionState::days_owed(record.last_payout_date(), ctx.now);
    let balance = store.tokens.balance(holder)?;
    let interest = distribution.accrue_interest(balance, days)? - balance;
    let ubi = if record.is_verified_human() {
        distribution.ubi_owed(days)?
    } else {
        0
    };

    if interest > 0 {
        store.tokens.transfer(&Address::interest_bank(), holder, interest)?;
    }
    if ubi > 0 {
        store.tokens.transfer(&Address::verified_human_ubi_bank(), holder, ubi)?;
    }
    record.set_last_payout_date(normalize_time(ctx.now));
    store.put_record(holder, record);

    tracing::info!("{} claimed {} interest and {} UBI over {} days", holder, interest, ubi, days);
    Ok(InstructionOutput::Claimed { days, interest, ubi })
}

fn grow_user_record<L: TokenLedger>(
    params: &ProtocolParams,
    store: &mut Store<L>,
    holder: &Address,
    rent: u64,
    new_size: u64,
) -> Result<InstructionOutput> {
    let mut record = store.record(holder)?;
    let current = record.len();
    record.grow(to_usize(new_size)?, params.max_record_growth)?;
    tracing::info!("Grew ledger record of {} from {} to {} bytes (rent {})", holder, current, record.len(), rent);
    store.put_record(holder, record);
    Ok(InstructionOutput::Done)
}

fn verify_human<L: TokenLedger>(params: &ProtocolParams, store: &mut Store<L>, holder: &Address) -> Result<InstructionOutput> {
    let mut record = store.record(holder)?;
    if record.is_verified_human() {
        tracing::debug!("{} is already verified", holder);
        return Ok(InstructionOutput::AlreadyVerified);
    }
    let mut global = store.global()?;
    global.distribution.verified_humans = global
        .distribution
        .verified_humans
        .checked_add(1)
        .ok_or(StipendError::ArithmeticOverflow)?;

    let future_ubi_bank = Address::future_ubi_bank();
    let reward = verification_reward(store.tokens.balance(&future_ubi_bank)?, params.verification_reward_divisor)?;
    if reward > 0 {
        store.tokens.transfer(&future_ubi_bank, holder, reward)?;
    }
    record.set_verified_human(true);
    store.put_record(holder, record);
    store.put_global(&global);

    tracing::info!(
        "Verified {} ({} verified humans, reward {})",
        holder,
        global.distribution.verified_humans,
        reward
    );
    Ok(InstructionOutput::Verified { reward })
}

fn transfer<L: TokenLedger>(
    store: &mut Store<L>,
    source: &Address,
    destination: &Address,
    amount: TokenAmount,
    ctx: &ExecutionContext,
) -> Result<InstructionOutput> {
    let source_record = store.find_record(source)?;
    let destination_record = store.find_record(destination)?;
    check_transfer(
        TransferParty {
            address: source,
            record: source_record.as_ref(),
        },
        TransferParty {
            address: destination,
            record: destination_record.as_ref(),
        },
        ctx.now,
    )?;
    store.tokens.transfer(source, destination, amount)?;
    tracing::debug!("Transferred {} from {} to {}", amount, source, destination);
    Ok(InstructionOutput::Done)
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| StipendError::ArithmeticOverflow)
}
