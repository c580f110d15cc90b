//! Daily distribution engine
//!
//! Once per UTC day the protocol looks at how much was mined organically
//! since the last run, raises the high-water mark by at most the configured
//! cap and mints `increase * distribution_multiplier` new tokens. Half goes
//! to the interest bank; the other half is UBI, split between verified
//! humans and the future-UBI reserve. The day's supply growth multiplier is
//! recorded in a 365-slot ring so holders can claim interest lazily.
//!
//! [`DistributionState::daily_distribution`] computes every value before
//! touching `self`, so a rejected run leaves the state untouched.

use crate::clock::{days_between, normalize_time};
use crate::codec::ByteReader;
use crate::fixed::{mul_div_floor, mul_round_half_even, rate_from_multiplier};
use crate::params::ProtocolParams;
use crate::{Result, StipendError, TokenAmount, HISTORY_SIZE};
use serde::{Deserialize, Serialize};

/// Encoded size of [`DistributionState`]
pub const DISTRIBUTION_STATE_LEN: usize = 32 + HISTORY_SIZE * 8 + 8 + HISTORY_SIZE * 8;

/// Ledger balances the engine reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionInputs {
    /// Operation timestamp
    pub now: i64,
    /// Mint supply before this run's emissions
    pub mint_supply: TokenAmount,
    /// Future-UBI bank balance before this run's credits
    pub future_ubi_bank: TokenAmount,
    /// Interest bank balance before this run's credits
    pub interest_bank: TokenAmount,
}

/// Everything a single run minted and moved
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistributionValues {
    /// Start of the day this run closed
    pub day: i64,
    pub organic_minted: TokenAmount,
    pub hwm_increase: TokenAmount,
    pub supply_increase: TokenAmount,
    pub interest_share: TokenAmount,
    pub verified_human_ubi: TokenAmount,
    pub future_ubi: TokenAmount,
    /// Interest owed to the future-UBI bank, moved out of the interest bank.
    /// Never more than the interest bank holds once its share is minted.
    pub future_ubi_interest: TokenAmount,
    /// Paid to each verified human for this day
    pub ubi_per_human: TokenAmount,
    /// Supply growth multiplier written to the history ring
    pub multiplier: f64,
}

impl DistributionValues {
    /// Tokens the run minted
    pub fn total_minted(&self) -> TokenAmount {
        self.interest_share + self.verified_human_ubi + self.future_ubi
    }
}

/// Monetary policy state
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionState {
    /// Mint supply right after the last run
    pub yesterday_supply: TokenAmount,
    pub high_water_mark: TokenAmount,
    /// Start of the day the last run closed
    pub last_distribution_time: i64,
    /// Next slot to overwrite; also the oldest entry
    pub oldest_history_index: usize,
    /// Daily supply growth multipliers; 0.0 where never written
    pub history: [f64; HISTORY_SIZE],
    pub verified_humans: u64,
    /// Per-human UBI paid on each day, indexed like `history`
    pub ubi_per_human: [TokenAmount; HISTORY_SIZE],
}

impl Default for DistributionState {
    fn default() -> Self {
        Self {
            yesterday_supply: 0,
            high_water_mark: 0,
            last_distribution_time: 0,
            oldest_history_index: 0,
            history: [0.0; HISTORY_SIZE],
            verified_humans: 0,
            ubi_per_human: [0; HISTORY_SIZE],
        }
    }
}

impl DistributionState {
    /// Fresh state whose first run may happen the day after `now`
    pub fn new(now: i64) -> Self {
        Self {
            last_distribution_time: normalize_time(now),
            ..Self::default()
        }
    }

    /// Whether a run at `now` would be rejected
    pub fn already_distributed(&self, now: i64) -> bool {
        normalize_time(now) <= self.last_distribution_time
    }

    /// Index of the most recently written slot
    pub fn newest_history_index(&self) -> usize {
        (self.oldest_history_index + HISTORY_SIZE - 1) % HISTORY_SIZE
    }

    /// Rate recorded for the most recent day
    pub fn yesterday_rate(&self) -> f64 {
        rate_from_multiplier(self.history[self.newest_history_index()])
    }

    /// Run the daily transition.
    ///
    /// Bank credits are returned rather than applied: the caller mints
    /// `interest_share`, `verified_human_ubi` and `future_ubi` to their banks
    /// and moves `future_ubi_interest` from the interest bank to the
    /// future-UBI bank.
    pub fn daily_distribution(
        &mut self,
        params: &ProtocolParams,
        inputs: DistributionInputs,
    ) -> Result<DistributionValues> {
        if self.already_distributed(inputs.now) {
            return Err(StipendError::AlreadyDistributedToday);
        }

        let organic_minted = inputs
            .mint_supply
            .checked_sub(self.yesterday_supply)
            .ok_or(StipendError::ArithmeticOverflow)?;
        let cap = params
            .hwm_cap
            .max_increase(self.yesterday_supply, params.distribution_multiplier);
        let hwm_increase = organic_minted.saturating_sub(self.high_water_mark).min(cap);
        let high_water_mark = self
            .high_water_mark
            .checked_add(hwm_increase)
            .ok_or(StipendError::ArithmeticOverflow)?;

        let supply_increase = hwm_increase
            .checked_mul(params.distribution_multiplier)
            .ok_or(StipendError::ArithmeticOverflow)?;
        let interest_share = supply_increase / 2;
        let ubi_share = supply_increase - interest_share;
        let verified_human_ubi =
            verified_human_share(ubi_share, self.verified_humans, params.future_ubi_verified_humans)?;
        let future_ubi = ubi_share - verified_human_ubi;

        let interest_available = inputs
            .interest_bank
            .checked_add(interest_share)
            .ok_or(StipendError::ArithmeticOverflow)?;
        let future_ubi_interest = mul_round_half_even(self.yesterday_rate(), inputs.future_ubi_bank)?;
        if future_ubi_interest > interest_available {
            tracing::warn!(
                "Future-UBI interest {} exceeds the interest bank's {}, moving what is there",
                future_ubi_interest,
                interest_available
            );
        }
        let future_ubi_interest = future_ubi_interest.min(interest_available);

        let supply_after = inputs
            .mint_supply
            .checked_add(supply_increase)
            .ok_or(StipendError::ArithmeticOverflow)?;
        let multiplier = growth_multiplier(self.yesterday_supply, supply_after);
        let ubi_per_human = verified_human_ubi.checked_div(self.verified_humans).unwrap_or(0);
        let day = normalize_time(inputs.now);

        let index = self.oldest_history_index;
        self.history[index] = multiplier;
        self.ubi_per_human[index] = ubi_per_human;
        self.oldest_history_index = (index + 1) % HISTORY_SIZE;
        self.high_water_mark = high_water_mark;
        self.yesterday_supply = supply_after;
        self.last_distribution_time = day;

        let values = DistributionValues {
            day,
            organic_minted,
            hwm_increase,
            supply_increase,
            interest_share,
            verified_human_ubi,
            future_ubi,
            future_ubi_interest,
            ubi_per_human,
            multiplier,
        };
        tracing::info!(
            "Daily distribution: hwm +{} -> {}, minted {} (interest {}, verified UBI {}, future UBI {}), multiplier {}",
            hwm_increase,
            high_water_mark,
            supply_increase,
            interest_share,
            verified_human_ubi,
            future_ubi,
            multiplier
        );
        Ok(values)
    }

    /// Days of history a holder last paid at `last_payout` is owed at `now`
    pub fn days_owed(last_payout: i64, now: i64) -> usize {
        usize::try_from(days_between(last_payout, now).clamp(0, HISTORY_SIZE as i64)).unwrap_or(0)
    }

    /// Ring indices of the last `days` days, oldest first
    pub fn recent_indices(&self, days: usize) -> impl Iterator<Item = usize> {
        let days = days.min(HISTORY_SIZE);
        let start = (self.oldest_history_index + HISTORY_SIZE - days) % HISTORY_SIZE;
        (0..days).map(move |offset| (start + offset) % HISTORY_SIZE)
    }

    /// Balance after compounding the last `days` recorded rates
    pub fn accrue_interest(&self, balance: TokenAmount, days: usize) -> Result<TokenAmount> {
        self.recent_indices(days).try_fold(balance, |balance, index| {
            let interest = mul_round_half_even(rate_from_multiplier(self.history[index]), balance)?;
            balance.checked_add(interest).ok_or(StipendError::ArithmeticOverflow)
        })
    }

    /// Per-human UBI accumulated over the last `days` days
    pub fn ubi_owed(&self, days: usize) -> Result<TokenAmount> {
        self.recent_indices(days).try_fold(0u64, |total, index| {
            total
                .checked_add(self.ubi_per_human[index])
                .ok_or(StipendError::ArithmeticOverflow)
        })
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.yesterday_supply.to_le_bytes());
        buf.extend_from_slice(&self.high_water_mark.to_le_bytes());
        buf.extend_from_slice(&self.last_distribution_time.to_le_bytes());
        buf.extend_from_slice(&(self.oldest_history_index as u64).to_le_bytes());
        for multiplier in &self.history {
            buf.extend_from_slice(&multiplier.to_le_bytes());
        }
        buf.extend_from_slice(&self.verified_humans.to_le_bytes());
        for ubi in &self.ubi_per_human {
            buf.extend_from_slice(&ubi.to_le_bytes());
        }
    }

    pub(crate) fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        let yesterday_supply = reader.u64()?;
        let high_water_mark = reader.u64()?;
        let last_distribution_time = reader.i64()?;
        let oldest_history_index = usize::try_from(reader.u64()?)
            .ok()
            .filter(|index| *index < HISTORY_SIZE)
            .ok_or_else(|| StipendError::MalformedRecord("history index out of range".to_string()))?;
        let mut history = [0.0; HISTORY_SIZE];
        for slot in &mut history {
            *slot = reader.f64()?;
        }
        let verified_humans = reader.u64()?;
        let mut ubi_per_human = [0; HISTORY_SIZE];
        for slot in &mut ubi_per_human {
            *slot = reader.u64()?;
        }
        Ok(Self {
            yesterday_supply,
            high_water_mark,
            last_distribution_time,
            oldest_history_index,
            history,
            verified_humans,
            ubi_per_human,
        })
    }
}

/// `ubi_share * min(1, 2v / (c + v))`, floored
pub fn verified_human_share(ubi_share: TokenAmount, verified_humans: u64, future_humans: u64) -> Result<TokenAmount> {
    if verified_humans >= future_humans {
        return Ok(ubi_share);
    }
    let denominator = u128::from(future_humans) + u128::from(verified_humans);
    let value = u128::from(ubi_share) * 2 * u128::from(verified_humans) / denominator;
    u64::try_from(value).map_err(|_| StipendError::ArithmeticOverflow)
}

/// `after / before`, or 1.0 when there was no supply before
pub fn growth_multiplier(before: TokenAmount, after: TokenAmount) -> f64 {
    if before == 0 {
        1.0
    } else {
        after as f64 / before as f64
    }
}

/// Bonus paid to a newly verified human
pub fn verification_reward(future_ubi_bank: TokenAmount, divisor: u64) -> Result<TokenAmount> {
    mul_div_floor(future_ubi_bank, 1, divisor)
}
