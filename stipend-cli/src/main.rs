//! Stipend Command Line Interface
//!
//! Client-side tooling for the stipend token: mine proofs, inspect the
//! effective protocol parameters and replay the protocol over many days
//! against an in-memory ledger.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use stipend_core::clock::{day_label, SEC_PER_DAY};
use stipend_core::user_record::MIN_RECORD_SIZE;
use stipend_core::{
    Address, DistributionValues, ExecutionContext, Instruction, InstructionOutput, MemoryTokenLedger, Miner,
    Processor, ProtocolParams, StipendError, TokenLedger, HASH_BYTES,
};
use tracing::{debug, info, warn};

/// Genesis timestamp used by the simulator (one hour past a UTC midnight)
const SIMULATION_GENESIS: i64 = 1_700_006_400 + 3_600;

#[derive(Parser)]
#[command(name = "stipend")]
#[command(about = "Stipend token client and simulator")]
#[command(version)]
struct Cli {
    /// Protocol parameter file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a proof against a challenge blockhash
    Mine {
        /// Holder address (hex)
        #[arg(long)]
        holder: String,
        /// Challenge blockhash (hex)
        #[arg(long)]
        blockhash: String,
        /// Leading zero bits; defaults to the configured difficulty
        #[arg(short, long)]
        difficulty: Option<u32>,
        /// Print the proof as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective protocol parameters as TOML
    Params,
    /// Run the protocol for a number of days against an in-memory ledger
    Simulate {
        /// Days to simulate
        #[arg(short, long, default_value = "30")]
        days: u32,
        /// Number of holders
        #[arg(long, default_value = "8")]
        holders: usize,
        /// RNG seed
        #[arg(short, long, default_value = "7")]
        seed: u64,
        /// Mining difficulty used by the simulated holders
        #[arg(long, default_value = "8")]
        difficulty: u32,
        /// Print one JSON report per day
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct MinedProof {
    holder: String,
    blockhash: String,
    nonce: u64,
    hash: String,
    leading_zero_bits: u32,
    payload: String,
}

#[derive(Serialize)]
struct DayReport {
    day: String,
    supply: u64,
    interest_bank: u64,
    verified_human_ubi_bank: u64,
    future_ubi_bank: u64,
    proofs_accepted: usize,
    verified_humans: u64,
    distribution: DistributionValues,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let params = load_params(cli.config.as_deref())?;

    match cli.command {
        Commands::Mine {
            holder,
            blockhash,
            difficulty,
            json,
        } => handle_mine(&holder, &blockhash, difficulty.unwrap_or(params.difficulty), json),
        Commands::Params => {
            print!("{}", params.to_toml_string()?);
            Ok(())
        }
        Commands::Simulate {
            days,
            holders,
            seed,
            difficulty,
            json,
        } => {
            let params = ProtocolParams { difficulty, ..params };
            handle_simulate(params, days, holders, seed, json)
        }
    }
}

/// Explicit `--config`, else the per-user file if present, else defaults
fn load_params(explicit: Option<&Path>) -> Result<ProtocolParams> {
    if let Some(path) = explicit {
        return ProtocolParams::load(path).with_context(|| format!("loading {}", path.display()));
    }
    match default_config_file() {
        Some(path) if path.exists() => {
            ProtocolParams::load(&path).with_context(|| format!("loading {}", path.display()))
        }
        _ => {
            debug!("No parameter file found, using defaults");
            Ok(ProtocolParams::default())
        }
    }
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stipend").join("params.toml"))
}

fn parse_hash(label: &str, s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s.trim_start_matches("0x")).with_context(|| format!("{} is not hex", label))?;
    if bytes.len() != HASH_BYTES {
        bail!("{} must be {} bytes, got {}", label, HASH_BYTES, bytes.len());
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn handle_mine(holder: &str, blockhash: &str, difficulty: u32, json: bool) -> Result<()> {
    let holder = Address::from_hex(holder)?;
    let blockhash = parse_hash("blockhash", blockhash)?;

    info!("Mining for {} at difficulty {}", holder, difficulty);
    let proof = Miner::new(holder, blockhash, difficulty).mine()?;

    let mined = MinedProof {
        holder: holder.to_string(),
        blockhash: hex::encode(blockhash),
        nonce: proof.nonce,
        hash: hex::encode(proof.hash),
        leading_zero_bits: proof.leading_zero_bits(),
        payload: hex::encode(Instruction::submit_proof(&proof).pack()),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&mined)?);
    } else {
        println!("Nonce: {}", mined.nonce);
        println!("Hash: {}", mined.hash);
        println!("Leading zero bits: {}", mined.leading_zero_bits);
        println!("Instruction: {}", mined.payload);
    }
    Ok(())
}

struct Simulation {
    processor: Processor<MemoryTokenLedger>,
    holders: Vec<Address>,
    rng: StdRng,
}

impl Simulation {
    fn new(params: ProtocolParams, holder_count: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let hook_program = Address::derive(&[b"transfer-hook".as_slice()]);
        let tokens = MemoryTokenLedger::new(Address::global_state(), hook_program)?;
        let mut processor = Processor::new(params, tokens)?;

        let genesis = ExecutionContext {
            now: SIMULATION_GENESIS,
            recent_hash: rng.gen(),
        };
        processor.process(&Address::global_state(), &Instruction::Initialize, &genesis)?;

        let holders: Vec<Address> = (0..holder_count).map(|_| Address(rng.gen())).collect();
        for holder in &holders {
            let size = (MIN_RECORD_SIZE + 3 * HASH_BYTES) as u64;
            processor.process(holder, &Instruction::CreateUserRecord { rent: 0, size }, &genesis)?;
        }
        Ok(Self { processor, holders, rng })
    }

    fn context(&mut self, day: u32) -> ExecutionContext {
        ExecutionContext {
            now: SIMULATION_GENESIS + i64::from(day) * SEC_PER_DAY,
            recent_hash: self.rng.gen(),
        }
    }

    /// One simulated day: distribute, then let a random subset of holders act
    fn step(&mut self, day: u32) -> Result<Option<DayReport>> {
        let ctx = self.context(day);
        let distribution = if day == 0 {
            None
        } else {
            let output = self
                .processor
                .process(&Address::global_state(), &Instruction::RunDailyDistribution, &ctx)?;
            match output {
                InstructionOutput::Distributed(values) => Some(values),
                other => bail!("unexpected distribution output {:?}", other),
            }
        };

        let output = self
            .processor
            .process(&Address::global_state(), &Instruction::GetValidBlockhashes, &ctx)?;
        let challenge = match output {
            InstructionOutput::Blockhashes { valid, .. } => valid,
            other => bail!("unexpected blockhash output {:?}", other),
        };

        let mut proofs_accepted = 0;
        for holder in self.holders.clone() {
            if !self.rng.gen_bool(0.6) {
                continue;
            }
            match self.processor.process(&holder, &Instruction::ClaimOwed, &ctx) {
                Ok(_) => {}
                Err(StipendError::InsufficientBankFunds { needed, available }) => {
                    warn!("Claim by {} skipped: bank holds {} of {}", holder, available, needed);
                }
                Err(e) => return Err(e.into()),
            }
            if self.rng.gen_bool(0.05) {
                self.processor.process(&holder, &Instruction::VerifyHuman, &ctx)?;
            }
            let mined = self.rng.gen_range(1..=3);
            proofs_accepted += self.submit_proofs(&holder, challenge, mined, &ctx)?;
        }
        self.random_transfer(&ctx)?;

        let Some(distribution) = distribution else {
            return Ok(None);
        };
        let tokens = self.processor.tokens();
        Ok(Some(DayReport {
            day: day_label(ctx.now),
            supply: tokens.supply()?,
            interest_bank: tokens.balance(&Address::interest_bank())?,
            verified_human_ubi_bank: tokens.balance(&Address::verified_human_ubi_bank())?,
            future_ubi_bank: tokens.balance(&Address::future_ubi_bank())?,
            proofs_accepted,
            verified_humans: self.processor.global_state()?.distribution.verified_humans,
            distribution,
        }))
    }

    fn submit_proofs(
        &mut self,
        holder: &Address,
        challenge: [u8; 32],
        count: usize,
        ctx: &ExecutionContext,
    ) -> Result<usize> {
        let difficulty = self.processor.params().difficulty;
        let miner = Miner::new(*holder, challenge, difficulty);
        let mut accepted = 0;
        let mut next_nonce = 0;
        for _ in 0..count {
            let Some(proof) = miner.mine_range(next_nonce..u64::MAX) else {
                break;
            };
            next_nonce = proof.nonce + 1;
            let instruction = Instruction::submit_proof(&proof);
            match self.processor.process(holder, &instruction, ctx) {
                Ok(_) => accepted += 1,
                Err(StipendError::RecordTooSmall { needed, .. }) => {
                    let new_size = needed as u64;
                    self.processor
                        .process(holder, &Instruction::GrowUserRecord { rent: 0, new_size }, ctx)?;
                    self.processor.process(holder, &instruction, ctx)?;
                    accepted += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(accepted)
    }

    /// Move a few tokens between two holders who are both paid up
    fn random_transfer(&mut self, ctx: &ExecutionContext) -> Result<()> {
        if self.holders.len() < 2 {
            return Ok(());
        }
        let source = self.holders[self.rng.gen_range(0..self.holders.len())];
        let destination = self.holders[self.rng.gen_range(0..self.holders.len())];
        let available = self.processor.tokens().balance(&source)?;
        if source == destination || available == 0 {
            return Ok(());
        }
        let amount = self.rng.gen_range(1..=available);
        let transfer = Instruction::Transfer { destination, amount };
        match self.processor.process(&source, &transfer, ctx) {
            Ok(_) => debug!("Transferred {} from {} to {}", amount, source, destination),
            Err(StipendError::UnclaimedInterest) => debug!("Transfer from {} held by the gate", source),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

fn handle_simulate(params: ProtocolParams, days: u32, holders: usize, seed: u64, json: bool) -> Result<()> {
    info!("Simulating {} days with {} holders (seed {})", days, holders, seed);
    let mut simulation = Simulation::new(params, holders, seed)?;

    if !json {
        println!(
            "{:<12} {:>14} {:>8} {:>12} {:>12} {:>12} {:>12} {:>8}",
            "day", "supply", "hwm+", "interest", "verified", "future", "fui", "proofs"
        );
    }
    for day in 0..=days {
        let Some(report) = simulation.step(day)? else {
            continue;
        };
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "{:<12} {:>14} {:>8} {:>12} {:>12} {:>12} {:>12} {:>8}",
                report.day,
                report.supply,
                report.distribution.hwm_increase,
                report.interest_bank,
                report.verified_human_ubi_bank,
                report.future_ubi_bank,
                report.distribution.future_ubi_interest,
                report.proofs_accepted
            );
        }
    }

    let global = simulation.processor.global_state()?;
    if global.distribution.high_water_mark == 0 {
        warn!("No organic minting happened; nothing was distributed");
    }
    info!(
        "Final high-water mark {} with {} verified humans",
        global.distribution.high_water_mark, global.distribution.verified_humans
    );
    Ok(())
}
