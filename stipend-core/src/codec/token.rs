//! Token mint and token account layouts
//!
//! Optional fields use the `COption` convention: a u32 tag (0 or 1)
//! followed by the payload, which is zeroed when the tag is 0.

use super::{check_account_type, decode_extensions, encode_extensions, AccountKind, ByteReader, Tlv};
use crate::{Address, Result, StipendError, TokenAmount};

/// Length of a bare mint
pub const MINT_LEN: usize = 82;

/// Length of a bare token account
pub const TOKEN_ACCOUNT_LEN: usize = 165;

/// Token account lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountState {
    Uninitialized,
    #[default]
    Initialized,
    Frozen,
}

impl AccountState {
    fn to_u8(self) -> u8 {
        match self {
            AccountState::Uninitialized => 0,
            AccountState::Initialized => 1,
            AccountState::Frozen => 2,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(AccountState::Uninitialized),
            1 => Ok(AccountState::Initialized),
            2 => Ok(AccountState::Frozen),
            other => Err(StipendError::MalformedRecord(format!("account state {}", other))),
        }
    }
}

/// Token mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRecord {
    pub mint_authority: Option<Address>,
    pub supply: TokenAmount,
    pub decimals: u8,
    pub is_initialized: bool,
    pub freeze_authority: Option<Address>,
    pub extensions: Vec<Tlv>,
}

impl MintRecord {
    /// Initialized mint with no supply and no decimals
    pub fn new(mint_authority: Address) -> Self {
        Self {
            mint_authority: Some(mint_authority),
            supply: 0,
            decimals: 0,
            is_initialized: true,
            freeze_authority: None,
            extensions: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(super::account_size(AccountKind::Mint, &self.extensions));
        write_option_address(&mut buf, self.mint_authority.as_ref());
        buf.extend_from_slice(&self.supply.to_le_bytes());
        buf.push(self.decimals);
        buf.push(u8::from(self.is_initialized));
        write_option_address(&mut buf, self.freeze_authority.as_ref());
        encode_extensions(AccountKind::Mint, &mut buf, &self.extensions)?;
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        check_account_type(AccountKind::Mint, data)?;
        let mut reader = ByteReader::new(data);
        let mint_authority = read_option_address(&mut reader)?;
        let supply = reader.u64()?;
        let decimals = reader.u8()?;
        let is_initialized = read_bool(&mut reader)?;
        let freeze_authority = read_option_address(&mut reader)?;
        let extensions = decode_extensions(AccountKind::Mint, data)?;
        Ok(Self {
            mint_authority,
            supply,
            decimals,
            is_initialized,
            freeze_authority,
            extensions,
        })
    }
}

/// Token-holding account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountRecord {
    pub mint: Address,
    pub owner: Address,
    pub amount: TokenAmount,
    pub delegate: Option<Address>,
    pub state: AccountState,
    /// Rent-exempt reserve of a wrapped native account
    pub is_native: Option<u64>,
    pub delegated_amount: TokenAmount,
    pub close_authority: Option<Address>,
    pub extensions: Vec<Tlv>,
}

impl TokenAccountRecord {
    /// Initialized, empty account of `mint` owned by `owner`
    pub fn new(mint: Address, owner: Address) -> Self {
        Self {
            mint,
            owner,
            amount: 0,
            delegate: None,
            state: AccountState::Initialized,
            is_native: None,
            delegated_amount: 0,
            close_authority: None,
            extensions: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(super::account_size(AccountKind::TokenAccount, &self.extensions));
        buf.extend_from_slice(self.mint.as_bytes());
        buf.extend_from_slice(self.owner.as_bytes());
        buf.extend_from_slice(&self.amount.to_le_bytes());
        write_option_address(&mut buf, self.delegate.as_ref());
        buf.push(self.state.to_u8());
        match self.is_native {
            Some(reserve) => {
                buf.extend_from_slice(&1u32.to_le_bytes());
                buf.extend_from_slice(&reserve.to_le_bytes());
            }
            None => buf.extend_from_slice(&[0; 12]),
        }
        buf.extend_from_slice(&self.delegated_amount.to_le_bytes());
        write_option_address(&mut buf, self.close_authority.as_ref());
        encode_extensions(AccountKind::TokenAccount, &mut buf, &self.extensions)?;
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        check_account_type(AccountKind::TokenAccount, data)?;
        let mut reader = ByteReader::new(data);
        let mint = Address(reader.array()?);
        let owner = Address(reader.array()?);
        let amount = reader.u64()?;
        let delegate = read_option_address(&mut reader)?;
        let state = AccountState::from_u8(reader.u8()?)?;
        let is_native = if read_option_tag(&mut reader)? {
            Some(reader.u64()?)
        } else {
            reader.skip(8)?;
            None
        };
        let delegated_amount = reader.u64()?;
        let close_authority = read_option_address(&mut reader)?;
        let extensions = decode_extensions(AccountKind::TokenAccount, data)?;
        Ok(Self {
            mint,
            owner,
            amount,
            delegate,
            state,
            is_native,
            delegated_amount,
            close_authority,
            extensions,
        })
    }
}

fn write_option_address(buf: &mut Vec<u8>, value: Option<&Address>) {
    match value {
        Some(address) => {
            buf.extend_from_slice(&1u32.to_le_bytes());
            buf.extend_from_slice(address.as_bytes());
        }
        None => buf.extend_from_slice(&[0; 36]),
    }
}

fn read_option_tag(reader: &mut ByteReader<'_>) -> Result<bool> {
    match reader.u32()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StipendError::MalformedRecord(format!("option tag {}", other))),
    }
}

fn read_option_address(reader: &mut ByteReader<'_>) -> Result<Option<Address>> {
    let present = read_option_tag(reader)?;
    let address = Address(reader.array()?);
    Ok(present.then_some(address))
}

fn read_bool(reader: &mut ByteReader<'_>) -> Result<bool> {
    match reader.u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StipendError::MalformedRecord(format!("boolean byte {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ExtensionType;

    #[test]
    fn test_bare_lengths() {
        assert_eq!(MintRecord::new(Address([1; 32])).encode().unwrap().len(), MINT_LEN);
        let account = TokenAccountRecord::new(Address([1; 32]), Address([2; 32]));
        assert_eq!(account.encode().unwrap().len(), TOKEN_ACCOUNT_LEN);
    }

    #[test]
    fn test_mint_field_offsets() {
        let mut mint = MintRecord::new(Address([9; 32]));
        mint.supply = 0x0102_0304;
        mint.decimals = 6;
        let bytes = mint.encode().unwrap();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..36], &[9; 32]);
        assert_eq!(&bytes[36..44], &0x0102_0304u64.to_le_bytes());
        assert_eq!(bytes[44], 6);
        assert_eq!(bytes[45], 1);
        assert_eq!(&bytes[46..82], &[0; 36]);
    }

    #[test]
    fn test_extended_mint_is_padded_to_account_type() {
        let mut mint = MintRecord::new(Address([3; 32]));
        mint.extensions.push(Tlv::transfer_hook(&Address([4; 32]), &Address([5; 32])));
        let bytes = mint.encode().unwrap();
        assert_eq!(bytes.len(), 166 + 68);
        assert!(bytes[82..165].iter().all(|&b| b == 0));
        assert_eq!(bytes[165], 1);
        assert_eq!(MintRecord::decode(&bytes).unwrap(), mint);
    }

    #[test]
    fn test_token_account_with_hook_round_trip() {
        let mut account = TokenAccountRecord::new(Address([1; 32]), Address([2; 32]));
        account.amount = 500;
        account.delegate = Some(Address([8; 32]));
        account.is_native = Some(2_039_280);
        account.state = AccountState::Frozen;
        account.extensions.push(Tlv::transfer_hook_account());
        let bytes = account.encode().unwrap();
        assert_eq!(bytes.len(), 171);
        assert_eq!(TokenAccountRecord::decode(&bytes).unwrap(), account);
    }

    #[test]
    fn test_wrong_account_type_rejected() {
        let mut account = TokenAccountRecord::new(Address([1; 32]), Address([2; 32]));
        account.extensions.push(Tlv::transfer_hook_account());
        let mut bytes = account.encode().unwrap();
        bytes[165] = 1;
        assert!(matches!(
            TokenAccountRecord::decode(&bytes),
            Err(StipendError::InvalidAccountType { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_truncated_mint_rejected() {
        let bytes = MintRecord::new(Address([1; 32])).encode().unwrap();
        assert!(matches!(
            MintRecord::decode(&bytes[..60]),
            Err(StipendError::RecordTooSmall { .. })
        ));
        let mut padded = bytes.clone();
        padded.resize(120, 0);
        assert!(matches!(MintRecord::decode(&padded), Err(StipendError::MalformedRecord(_))));
    }

    #[test]
    fn test_unknown_extension_preserved() {
        let mut mint = MintRecord::new(Address([1; 32]));
        mint.extensions.push(Tlv::new(ExtensionType::Other(19), vec![7; 10]));
        let decoded = MintRecord::decode(&mint.encode().unwrap()).unwrap();
        assert_eq!(decoded.extensions[0].extension_type, ExtensionType::Other(19));
    }
}
