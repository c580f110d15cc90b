//! Fungible-token bookkeeping
//!
//! The protocol never keeps balances itself; it instructs a token ledger to
//! mint and transfer and reads supply and balances back. [`TokenLedger`] is
//! that seam. [`MemoryTokenLedger`] keeps the mint and token accounts as
//! encoded account bytes, the same way the ledger would hold them.

use crate::codec::{MintRecord, Tlv, TokenAccountRecord};
use crate::{Address, Result, StipendError, TokenAmount};
use std::collections::BTreeMap;

/// Operations the protocol needs from the token primitive
pub trait TokenLedger {
    /// Current mint supply
    fn supply(&self) -> Result<TokenAmount>;

    /// Balance held by `owner`; zero if it has no account
    fn balance(&self, owner: &Address) -> Result<TokenAmount>;

    /// Mint `amount` new tokens to `owner`
    fn mint_to(&mut self, owner: &Address, amount: TokenAmount) -> Result<()>;

    /// Move `amount` from `from` to `to`.
    ///
    /// A shortfall is `InsufficientBankFunds` when `from` is a protocol bank
    /// and `InsufficientBalance` otherwise.
    fn transfer(&mut self, from: &Address, to: &Address, amount: TokenAmount) -> Result<()>;

    /// Create an empty account for `owner`
    fn open_account(&mut self, owner: &Address) -> Result<()>;
}

/// In-memory token ledger with a transfer-hooked mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTokenLedger {
    mint_address: Address,
    mint: Vec<u8>,
    accounts: BTreeMap<Address, Vec<u8>>,
}

impl MemoryTokenLedger {
    /// Empty ledger whose mint is controlled by `authority` and hooked to `hook_program`
    pub fn new(authority: Address, hook_program: Address) -> Result<Self> {
        let mut mint = MintRecord::new(authority);
        mint.extensions.push(Tlv::transfer_hook(&authority, &hook_program));
        Ok(Self {
            mint_address: Address::mint(),
            mint: mint.encode()?,
            accounts: BTreeMap::new(),
        })
    }

    pub fn mint_address(&self) -> Address {
        self.mint_address
    }

    pub fn mint_record(&self) -> Result<MintRecord> {
        MintRecord::decode(&self.mint)
    }

    /// Decoded token account of `owner`, if one exists
    pub fn account(&self, owner: &Address) -> Result<Option<TokenAccountRecord>> {
        self.accounts
            .get(owner)
            .map(|bytes| TokenAccountRecord::decode(bytes))
            .transpose()
    }

    pub fn has_account(&self, owner: &Address) -> bool {
        self.accounts.contains_key(owner)
    }

    fn load_or_open(&mut self, owner: &Address) -> Result<TokenAccountRecord> {
        if !self.has_account(owner) {
            self.open_account(owner)?;
        }
        self.account(owner)?
            .ok_or_else(|| StipendError::AccountNotFound(format!("token account of {}", owner)))
    }

    fn store(&mut self, account: &TokenAccountRecord) -> Result<()> {
        self.accounts.insert(account.owner, account.encode()?);
        Ok(())
    }
}

impl TokenLedger for MemoryTokenLedger {
    fn supply(&self) -> Result<TokenAmount> {
        Ok(self.mint_record()?.supply)
    }

    fn balance(&self, owner: &Address) -> Result<TokenAmount> {
        Ok(self.account(owner)?.map_or(0, |account| account.amount))
    }

    fn mint_to(&mut self, owner: &Address, amount: TokenAmount) -> Result<()> {
        let mut mint = self.mint_record()?;
        let mut account = self.load_or_open(owner)?;
        mint.supply = mint.supply.checked_add(amount).ok_or(StipendError::ArithmeticOverflow)?;
        account.amount = account.amount.checked_add(amount).ok_or(StipendError::ArithmeticOverflow)?;
        self.mint = mint.encode()?;
        self.store(&account)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: TokenAmount) -> Result<()> {
        let available = self.balance(from)?;
        if available < amount {
            let needed = amount;
            return Err(if from.is_bank() {
                StipendError::InsufficientBankFunds { needed, available }
            } else {
                StipendError::InsufficientBalance { needed, available }
            });
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        let mut source = self.load_or_open(from)?;
        let mut destination = self.load_or_open(to)?;
        source.amount -= amount;
        destination.amount = destination
            .amount
            .checked_add(amount)
            .ok_or(StipendError::ArithmeticOverflow)?;
        self.store(&source)?;
        self.store(&destination)
    }

    fn open_account(&mut self, owner: &Address) -> Result<()> {
        if self.accounts.contains_key(owner) {
            return Err(StipendError::AccountAlreadyExists(format!("token account of {}", owner)));
        }
        let mut account = TokenAccountRecord::new(self.mint_address, *owner);
        account.extensions.push(Tlv::transfer_hook_account());
        self.accounts.insert(*owner, account.encode()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ExtensionType;

    fn ledger() -> MemoryTokenLedger {
        MemoryTokenLedger::new(Address::global_state(), Address([9; 32])).unwrap()
    }

    #[test]
    fn test_mint_updates_supply_and_balance() {
        let mut ledger = ledger();
        let holder = Address([1; 32]);
        ledger.mint_to(&holder, 40).unwrap();
        ledger.mint_to(&holder, 2).unwrap();
        assert_eq!(ledger.supply().unwrap(), 42);
        assert_eq!(ledger.balance(&holder).unwrap(), 42);
        assert_eq!(ledger.balance(&Address([2; 32])).unwrap(), 0);
    }

    #[test]
    fn test_transfer_and_shortfall() {
        let mut ledger = ledger();
        let (a, b) = (Address([1; 32]), Address([2; 32]));
        ledger.mint_to(&a, 10).unwrap();
        ledger.transfer(&a, &b, 4).unwrap();
        assert_eq!(ledger.balance(&a).unwrap(), 6);
        assert_eq!(ledger.balance(&b).unwrap(), 4);
        assert!(matches!(
            ledger.transfer(&a, &b, 7),
            Err(StipendError::InsufficientBalance { needed: 7, available: 6 })
        ));
        assert!(matches!(
            ledger.transfer(&Address::interest_bank(), &b, 1),
            Err(StipendError::InsufficientBankFunds { needed: 1, available: 0 })
        ));
        assert_eq!(ledger.supply().unwrap(), 10);
    }

    #[test]
    fn test_accounts_are_stored_encoded() {
        let mut ledger = ledger();
        let holder = Address([1; 32]);
        ledger.mint_to(&holder, 5).unwrap();
        let account = ledger.account(&holder).unwrap().unwrap();
        assert_eq!(account.mint, Address::mint());
        assert_eq!(account.extensions[0].extension_type, ExtensionType::TransferHookAccount);
        assert_eq!(ledger.mint_record().unwrap().extensions[0].extension_type, ExtensionType::TransferHook);
        assert!(ledger.open_account(&holder).is_err());
    }
}
