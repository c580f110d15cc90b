//! Byte-exact account encoding
//!
//! Every account the protocol touches is a flat little-endian byte layout.
//! [`AccountKind`] is the closed set of layouts and [`AccountKind::codec`] is
//! the lookup table describing each one. Token mints and token accounts can
//! carry a TLV extension chain after a one-byte account-type tag at offset
//! 165.

pub mod tlv;
pub mod token;

pub use tlv::{ExtensionType, Tlv};
pub use token::{AccountState, MintRecord, TokenAccountRecord};

use crate::global::GlobalState;
use crate::user_record::UserLedgerRecord;
use crate::{Hash, Result, StipendError, HASH_BYTES};

/// Offset of the account-type tag in an extended token account
pub const ACCOUNT_TYPE_OFFSET: usize = 165;

/// Offset of the first TLV entry in an extended token account
pub const EXTENSIONS_OFFSET: usize = ACCOUNT_TYPE_OFFSET + 1;

/// An extended size that collides with a multisig layout and gets padded
const AMBIGUOUS_EXTENDED_SIZE: usize = 355;

/// Account-type tag of an extended mint
pub const MINT_ACCOUNT_TYPE: u8 = 1;

/// Account-type tag of an extended token account
pub const TOKEN_ACCOUNT_TYPE: u8 = 2;

/// The closed set of account layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    Mint,
    TokenAccount,
    GlobalState,
    UserRecord,
}

/// Static description of one account layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindCodec {
    /// Length of the fixed head (the minimum length for growable records)
    pub base_len: usize,
    /// Tag written at [`ACCOUNT_TYPE_OFFSET`] when extensions are present
    pub account_type: Option<u8>,
    /// Whether a TLV chain may follow the head
    pub supports_extensions: bool,
}

impl AccountKind {
    /// Layout table entry for this kind
    pub const fn codec(self) -> KindCodec {
        match self {
            AccountKind::Mint => KindCodec {
                base_len: token::MINT_LEN,
                account_type: Some(MINT_ACCOUNT_TYPE),
                supports_extensions: true,
            },
            AccountKind::TokenAccount => KindCodec {
                base_len: token::TOKEN_ACCOUNT_LEN,
                account_type: Some(TOKEN_ACCOUNT_TYPE),
                supports_extensions: true,
            },
            AccountKind::GlobalState => KindCodec {
                base_len: crate::global::GLOBAL_STATE_LEN,
                account_type: None,
                supports_extensions: false,
            },
            AccountKind::UserRecord => KindCodec {
                base_len: crate::user_record::MIN_RECORD_SIZE,
                account_type: None,
                supports_extensions: false,
            },
        }
    }
}

/// A decoded account of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum AccountRecord {
    Mint(MintRecord),
    TokenAccount(TokenAccountRecord),
    GlobalState(Box<GlobalState>),
    UserRecord(UserLedgerRecord),
}

impl AccountRecord {
    pub fn kind(&self) -> AccountKind {
        match self {
            AccountRecord::Mint(_) => AccountKind::Mint,
            AccountRecord::TokenAccount(_) => AccountKind::TokenAccount,
            AccountRecord::GlobalState(_) => AccountKind::GlobalState,
            AccountRecord::UserRecord(_) => AccountKind::UserRecord,
        }
    }

    /// Serialize to the account's on-ledger bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            AccountRecord::Mint(mint) => mint.encode(),
            AccountRecord::TokenAccount(account) => account.encode(),
            AccountRecord::GlobalState(state) => Ok(state.encode()),
            AccountRecord::UserRecord(record) => Ok(record.as_bytes().to_vec()),
        }
    }

    /// Parse bytes that are expected to hold an account of `kind`
    pub fn decode(kind: AccountKind, data: &[u8]) -> Result<Self> {
        Ok(match kind {
            AccountKind::Mint => AccountRecord::Mint(MintRecord::decode(data)?),
            AccountKind::TokenAccount => AccountRecord::TokenAccount(TokenAccountRecord::decode(data)?),
            AccountKind::GlobalState => AccountRecord::GlobalState(Box::new(GlobalState::decode(data)?)),
            AccountKind::UserRecord => AccountRecord::UserRecord(UserLedgerRecord::from_bytes(data.to_vec())?),
        })
    }
}

/// Encoded size of an extensible account
pub fn account_size(kind: AccountKind, extensions: &[Tlv]) -> usize {
    if extensions.is_empty() {
        return kind.codec().base_len;
    }
    let size = EXTENSIONS_OFFSET + tlv::chain_len(extensions);
    if size == AMBIGUOUS_EXTENDED_SIZE {
        size + tlv::TLV_HEADER_LEN
    } else {
        size
    }
}

/// Append the account-type tag and the TLV chain to an encoded head
pub(crate) fn encode_extensions(kind: AccountKind, buf: &mut Vec<u8>, extensions: &[Tlv]) -> Result<()> {
    if extensions.is_empty() {
        return Ok(());
    }
    let codec = kind.codec();
    let account_type = codec
        .account_type
        .filter(|_| codec.supports_extensions)
        .ok_or_else(|| StipendError::MalformedRecord(format!("{:?} cannot carry extensions", kind)))?;

    let size = account_size(kind, extensions);
    buf.resize(ACCOUNT_TYPE_OFFSET, 0);
    buf.push(account_type);
    tlv::write_chain(buf, extensions)?;
    // zero padding doubles as an uninitialized TLV header
    buf.resize(size, 0);
    Ok(())
}

/// Reject an extended account whose tag names another kind.
///
/// Runs before the head is parsed, so a mint handed over as a token account
/// (or the reverse) reports the tag rather than whatever its head misparses to.
pub(crate) fn check_account_type(kind: AccountKind, data: &[u8]) -> Result<()> {
    let codec = kind.codec();
    if data.len() <= codec.base_len || data.len() <= ACCOUNT_TYPE_OFFSET {
        return Ok(());
    }
    let expected = codec.account_type.unwrap_or_default();
    let found = data[ACCOUNT_TYPE_OFFSET];
    if found != expected {
        return Err(StipendError::InvalidAccountType { expected, found });
    }
    Ok(())
}

/// Split the TLV chain off an extensible account, validating the tag
pub(crate) fn decode_extensions(kind: AccountKind, data: &[u8]) -> Result<Vec<Tlv>> {
    let codec = kind.codec();
    if data.len() == codec.base_len {
        return Ok(Vec::new());
    }
    if data.len() < EXTENSIONS_OFFSET {
        return Err(StipendError::MalformedRecord(format!(
            "{} bytes is neither a bare {:?} nor an extended one",
            data.len(),
            kind
        )));
    }
    check_account_type(kind, data)?;
    if data[codec.base_len..ACCOUNT_TYPE_OFFSET].iter().any(|&b| b != 0) {
        return Err(StipendError::MalformedRecord(
            "non-zero padding before the account type".to_string(),
        ));
    }
    tlv::read_chain(&data[EXTENSIONS_OFFSET..])
}

/// Little-endian cursor over account bytes
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(StipendError::RecordTooSmall {
                needed: end,
                available: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    pub(crate) fn i64(&mut self) -> Result<i64> {
        self.array().map(i64::from_le_bytes)
    }

    pub(crate) fn f64(&mut self) -> Result<f64> {
        self.array().map(f64::from_le_bytes)
    }

    pub(crate) fn hash(&mut self) -> Result<Hash> {
        self.array::<HASH_BYTES>()
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}
