//! Transfer gate
//!
//! Balances only carry today's interest once it has been claimed, so a
//! holder moving tokens before claiming would either lose interest or
//! shift it to someone else. Holder-to-holder transfers therefore require
//! both sides to be current. Banks are exempt.

use crate::user_record::UserLedgerRecord;
use crate::{Address, Result, StipendError};

/// One side of a transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferParty<'a> {
    pub address: &'a Address,
    /// The party's ledger record; banks have none
    pub record: Option<&'a UserLedgerRecord>,
}

/// Check whether a transfer may execute at `now`
pub fn check_transfer(source: TransferParty<'_>, destination: TransferParty<'_>, now: i64) -> Result<()> {
    if source.address.is_bank() {
        return Ok(());
    }
    require_current(source, now)?;
    if destination.address.is_bank() {
        return Ok(());
    }
    require_current(destination, now)
}

fn require_current(party: TransferParty<'_>, now: i64) -> Result<()> {
    let record = party
        .record
        .ok_or_else(|| StipendError::AccountNotFound(format!("ledger record of {}", party.address)))?;
    if record.is_current(now) {
        Ok(())
    } else {
        tracing::warn!("Transfer blocked: {} has unclaimed interest", party.address);
        Err(StipendError::UnclaimedInterest)
    }
}
