//! Type-length-value extension entries

use super::ByteReader;
use crate::{Result, StipendError};

/// Bytes taken by a TLV type and length
pub const TLV_HEADER_LEN: usize = 4;

/// Extension discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionType {
    /// Terminates a chain
    Uninitialized,
    /// Mint-side transfer hook: authority and hook program
    TransferHook,
    /// Account-side transfer hook state
    TransferHookAccount,
    /// Any extension this crate does not interpret
    Other(u16),
}

impl ExtensionType {
    pub fn to_u16(self) -> u16 {
        match self {
            ExtensionType::Uninitialized => 0,
            ExtensionType::TransferHook => 14,
            ExtensionType::TransferHookAccount => 15,
            ExtensionType::Other(value) => value,
        }
    }
}

impl From<u16> for ExtensionType {
    fn from(value: u16) -> Self {
        match value {
            0 => ExtensionType::Uninitialized,
            14 => ExtensionType::TransferHook,
            15 => ExtensionType::TransferHookAccount,
            other => ExtensionType::Other(other),
        }
    }
}

/// One extension entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub extension_type: ExtensionType,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(extension_type: ExtensionType, value: Vec<u8>) -> Self {
        // normalize so Other(14) and TransferHook compare equal after a round trip
        Self {
            extension_type: ExtensionType::from(extension_type.to_u16()),
            value,
        }
    }

    /// Transfer hook extension naming the hook program and its authority
    pub fn transfer_hook(authority: &crate::Address, program: &crate::Address) -> Self {
        let mut value = Vec::with_capacity(64);
        value.extend_from_slice(authority.as_bytes());
        value.extend_from_slice(program.as_bytes());
        Self::new(ExtensionType::TransferHook, value)
    }

    /// Account-side transfer hook extension (the `transferring` flag)
    pub fn transfer_hook_account() -> Self {
        Self::new(ExtensionType::TransferHookAccount, vec![0])
    }

    /// Encoded length including the header
    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_LEN + self.value.len()
    }
}

/// Total encoded length of a chain
pub fn chain_len(extensions: &[Tlv]) -> usize {
    extensions.iter().map(Tlv::encoded_len).sum()
}

pub(crate) fn write_chain(buf: &mut Vec<u8>, extensions: &[Tlv]) -> Result<()> {
    for tlv in extensions {
        if tlv.extension_type == ExtensionType::Uninitialized {
            return Err(StipendError::MalformedRecord(
                "an uninitialized extension would end the chain early".to_string(),
            ));
        }
        let length = u16::try_from(tlv.value.len()).map_err(|_| {
            StipendError::MalformedRecord(format!("extension value of {} bytes", tlv.value.len()))
        })?;
        buf.extend_from_slice(&tlv.extension_type.to_u16().to_le_bytes());
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&tlv.value);
    }
    Ok(())
}

/// Read entries until an uninitialized header or fewer than four bytes remain
pub(crate) fn read_chain(data: &[u8]) -> Result<Vec<Tlv>> {
    let mut reader = ByteReader::new(data);
    let mut extensions = Vec::new();
    while reader.remaining() >= TLV_HEADER_LEN {
        let extension_type = ExtensionType::from(reader.u16()?);
        let length = usize::from(reader.u16()?);
        if extension_type == ExtensionType::Uninitialized {
            break;
        }
        if length > reader.remaining() {
            return Err(StipendError::MalformedRecord(format!(
                "extension {:?} claims {} bytes but {} remain",
                extension_type,
                length,
                reader.remaining()
            )));
        }
        extensions.push(Tlv {
            extension_type,
            value: reader.take(length)?.to_vec(),
        });
    }
    Ok(extensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_type_mapping() {
        assert_eq!(ExtensionType::from(14), ExtensionType::TransferHook);
        assert_eq!(ExtensionType::from(15).to_u16(), 15);
        assert_eq!(ExtensionType::from(19), ExtensionType::Other(19));
        assert_eq!(Tlv::new(ExtensionType::Other(14), vec![]).extension_type, ExtensionType::TransferHook);
    }

    #[test]
    fn test_chain_stops_at_uninitialized() {
        let mut buf = Vec::new();
        write_chain(&mut buf, &[Tlv::transfer_hook_account()]).unwrap();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&[15, 0, 1, 0, 1]);
        let chain = read_chain(&buf).unwrap();
        assert_eq!(chain, vec![Tlv::transfer_hook_account()]);
    }

    #[test]
    fn test_trailing_bytes_shorter_than_header_are_ignored() {
        let mut buf = Vec::new();
        write_chain(&mut buf, &[Tlv::transfer_hook_account()]).unwrap();
        buf.extend_from_slice(&[9, 9, 9]);
        assert_eq!(read_chain(&buf).unwrap().len(), 1);
    }

    #[test]
    fn test_overrunning_length_is_malformed() {
        let buf = [14, 0, 64, 0, 1, 2, 3];
        assert!(matches!(read_chain(&buf), Err(StipendError::MalformedRecord(_))));
    }

    #[test]
    fn test_uninitialized_and_oversized_values_rejected() {
        let mut buf = Vec::new();
        assert!(write_chain(&mut buf, &[Tlv::new(ExtensionType::Uninitialized, vec![])]).is_err());
        assert!(write_chain(&mut buf, &[Tlv::new(ExtensionType::Other(2), vec![0; 70_000])]).is_err());
    }
}
