//! Protocol parameters
//!
//! Every constant the monetary policy and the proof-of-work protocol depend on
//! lives here so deployments can tune them without touching the algorithms.
//! Parameters load from TOML and are validated before use.

use crate::{Result, StipendError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cap on how far the high-water mark may rise in one day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HwmCap {
    /// A flat daily cap
    Fixed { max_increase: u64 },
    /// A cap that tightens as supply grows.
    ///
    /// For yesterday's supply `S` the cap is
    /// `round_half_even(S * ((S - min_supply)^-adjust_factor + end_goal_percent_increase)) / multiplier`.
    /// Below `min_supply` growth is uncapped.
    SupplyScaled {
        min_supply: u64,
        adjust_factor: f64,
        end_goal_percent_increase: f64,
    },
}

impl HwmCap {
    /// Largest high-water-mark increase allowed given yesterday's supply
    pub fn max_increase(&self, yesterday_supply: u64, distribution_multiplier: u64) -> u64 {
        match *self {
            HwmCap::Fixed { max_increase } => max_increase,
            HwmCap::SupplyScaled {
                min_supply,
                adjust_factor,
                end_goal_percent_increase,
            } => {
                if yesterday_supply < min_supply {
                    return u64::MAX;
                }
                let excess = (yesterday_supply - min_supply) as f64;
                let limiter = excess.powf(-adjust_factor) + end_goal_percent_increase;
                let allowed = (yesterday_supply as f64 * limiter).round_ties_even();
                // float-to-int casts saturate, so an absurd limiter cannot wrap
                (allowed as u64) / distribution_multiplier.max(1)
            }
        }
    }
}

impl Default for HwmCap {
    fn default() -> Self {
        HwmCap::SupplyScaled {
            min_supply: 1_000_000,
            adjust_factor: 0.3,
            end_goal_percent_increase: 0.00061,
        }
    }
}

/// All tunable protocol parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Leading zero bits a proof hash must have
    pub difficulty: u32,

    /// Tokens minted by the protocol per unit of high-water-mark increase
    pub distribution_multiplier: u64,

    /// Daily high-water-mark cap policy
    pub hwm_cap: HwmCap,

    /// Verified-human count at which verified humans take the whole UBI
    /// split. The fraction is `2v / (C + v)`, capped at one, so it is two
    /// thirds at `C / 2`.
    pub future_ubi_verified_humans: u64,

    /// Tokens minted to a holder for each accepted proof
    pub proof_reward: u64,

    /// The verification bonus is `future_ubi_bank / verification_reward_divisor`
    pub verification_reward_divisor: u64,

    /// Seconds before midnight at which the next challenge is announced
    pub announcement_interval_secs: i64,

    /// Largest number of bytes a record may grow by in one operation
    pub max_record_growth: usize,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            difficulty: 12,
            distribution_multiplier: 146_000,
            hwm_cap: HwmCap::default(),
            future_ubi_verified_humans: 1_000_000_000,
            proof_reward: 2,
            verification_reward_divisor: 1_000_000_000,
            announcement_interval_secs: 300,
            max_record_growth: 10_240,
        }
    }
}

impl ProtocolParams {
    /// Parse parameters from a TOML document; missing fields take defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let params: Self = toml::from_str(s)
            .map_err(|e| StipendError::ConfigError(format!("invalid parameters: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let params = Self::from_toml_str(&contents)?;
        tracing::debug!("Loaded protocol parameters from {}", path.display());
        Ok(params)
    }

    /// Render parameters as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StipendError::ConfigError(format!("cannot serialize parameters: {}", e)))
    }

    /// Reject parameter sets the algorithms cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.difficulty > 256 {
            return Err(StipendError::ConfigError(format!(
                "difficulty {} exceeds the 256 bits of a hash",
                self.difficulty
            )));
        }
        if self.distribution_multiplier == 0 {
            return Err(StipendError::ConfigError(
                "distribution_multiplier must be positive".to_string(),
            ));
        }
        if self.verification_reward_divisor == 0 {
            return Err(StipendError::ConfigError(
                "verification_reward_divisor must be positive".to_string(),
            ));
        }
        if self.announcement_interval_secs < 0
            || self.announcement_interval_secs >= crate::clock::SEC_PER_DAY
        {
            return Err(StipendError::ConfigError(format!(
                "announcement_interval_secs {} must lie within one day",
                self.announcement_interval_secs
            )));
        }
        if let HwmCap::SupplyScaled { adjust_factor, end_goal_percent_increase, .. } = self.hwm_cap {
            if !adjust_factor.is_finite() || !end_goal_percent_increase.is_finite() {
                return Err(StipendError::ConfigError(
                    "hwm_cap factors must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }
}
