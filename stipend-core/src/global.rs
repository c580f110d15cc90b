//! Protocol-wide state record

use crate::codec::ByteReader;
use crate::distribution::{DistributionInputs, DistributionState, DistributionValues, DISTRIBUTION_STATE_LEN};
use crate::oracle::{BlockhashOracle, ORACLE_LEN};
use crate::params::ProtocolParams;
use crate::{Hash, Result, StipendError};

/// Encoded size of [`GlobalState`]
pub const GLOBAL_STATE_LEN: usize = ORACLE_LEN + DISTRIBUTION_STATE_LEN;

/// The single global record: challenge oracle followed by distribution state
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalState {
    pub oracle: BlockhashOracle,
    pub distribution: DistributionState,
}

impl GlobalState {
    /// State as created at initialization time
    pub fn new(now: i64, recent_hash: Hash, params: &ProtocolParams) -> Self {
        Self {
            oracle: BlockhashOracle::new(now, recent_hash, params.announcement_interval_secs),
            distribution: DistributionState::new(now),
        }
    }

    /// Run the daily transition, then refresh the oracle from `recent_hash`
    pub fn daily_distribution_event(
        &mut self,
        params: &ProtocolParams,
        inputs: DistributionInputs,
        recent_hash: Hash,
    ) -> Result<DistributionValues> {
        let values = self.distribution.daily_distribution(params, inputs)?;
        self.oracle
            .refresh_with_interval(inputs.now, recent_hash, params.announcement_interval_secs);
        Ok(values)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(GLOBAL_STATE_LEN);
        self.oracle.encode_into(&mut buf);
        self.distribution.encode_into(&mut buf);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() > GLOBAL_STATE_LEN {
            return Err(StipendError::MalformedRecord(format!(
                "global state is {} bytes, expected {}",
                data.len(),
                GLOBAL_STATE_LEN
            )));
        }
        let mut reader = ByteReader::new(data);
        let oracle = BlockhashOracle::decode_from(&mut reader)?;
        let distribution = DistributionState::decode_from(&mut reader)?;
        Ok(Self { oracle, distribution })
    }
}
