//! Prefixed base58check / base64check strings used everywhere on the wire,
//! e.g. `ak_...` for accounts or `tx_...` for transactions.

use std::fmt;
use std::str::FromStr;

use base58::{FromBase58, ToBase58};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::crypto::checksum;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Encoding {
    // base64check
    ByteArray,
    ContractBytearray,
    OracleResponse,
    OracleQuery,
    Poi,
    State,
    CallStateTree,
    CallStateTreeCompact,
    ContractStoreValue,
    StateTrees,
    Transaction,
    // base58check
    AccountAddress,
    Bloom,
    BlockStateHash,
    BlockTxHash,
    Channel,
    Commitment,
    ContractAddress,
    KeyBlockHash,
    MicroBlockHash,
    Name,
    OracleAddress,
    OracleQueryId,
    PeerPubkey,
    Signature,
    TxHash,
}

pub const ALL_ENCODINGS: [Encoding; 26] = [
    Encoding::AccountAddress,
    Encoding::Bloom,
    Encoding::BlockStateHash,
    Encoding::BlockTxHash,
    Encoding::Channel,
    Encoding::Commitment,
    Encoding::ContractAddress,
    Encoding::KeyBlockHash,
    Encoding::MicroBlockHash,
    Encoding::Name,
    Encoding::OracleAddress,
    Encoding::OracleQueryId,
    Encoding::PeerPubkey,
    Encoding::Signature,
    Encoding::TxHash,
    Encoding::ByteArray,
    Encoding::ContractBytearray,
    Encoding::OracleResponse,
    Encoding::OracleQuery,
    Encoding::Poi,
    Encoding::StateTrees,
    Encoding::CallStateTree,
    Encoding::CallStateTreeCompact,
    Encoding::ContractStoreValue,
    Encoding::State,
    Encoding::Transaction,
];

impl Encoding {
    pub fn prefix(&self) -> &'static str {
        match self {
            Encoding::ByteArray => "ba",
            Encoding::ContractBytearray => "cb",
            Encoding::OracleResponse => "or",
            Encoding::OracleQuery => "ov",
            Encoding::Poi => "pi",
            Encoding::StateTrees => "ss",
            Encoding::CallStateTree => "cs",
            Encoding::CallStateTreeCompact => "ck",
            Encoding::ContractStoreValue => "cv",
            Encoding::State => "st",
            Encoding::Transaction => "tx",
            Encoding::AccountAddress => "ak",
            Encoding::Bloom => "bf",
            Encoding::BlockStateHash => "bs",
            Encoding::BlockTxHash => "bx",
            Encoding::Channel => "ch",
            Encoding::Commitment => "cm",
            Encoding::ContractAddress => "ct",
            Encoding::KeyBlockHash => "kh",
            Encoding::MicroBlockHash => "mh",
            Encoding::Name => "nm",
            Encoding::OracleAddress => "ok",
            Encoding::OracleQueryId => "oq",
            Encoding::PeerPubkey => "pp",
            Encoding::Signature => "sg",
            Encoding::TxHash => "th",
        }
    }

    pub fn is_base64(&self) -> bool {
        matches!(
            self,
            Encoding::ByteArray
                | Encoding::ContractBytearray
                | Encoding::OracleResponse
                | Encoding::OracleQuery
                | Encoding::Poi
                | Encoding::StateTrees
                | Encoding::CallStateTree
                | Encoding::CallStateTreeCompact
                | Encoding::ContractStoreValue
                | Encoding::State
                | Encoding::Transaction
        )
    }

    /// Payload length required for the prefix, if it is fixed.
    pub fn required_length(&self) -> Option<usize> {
        match self {
            Encoding::AccountAddress | Encoding::ContractAddress | Encoding::OracleAddress => {
                Some(32)
            }
            _ => None,
        }
    }

    fn ensure_valid_length(&self, data: &[u8]) -> Result<()> {
        match self.required_length() {
            Some(expected) if expected != data.len() => Err(Error::PayloadLength {
                expected,
                actual: data.len(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(prefix: &str) -> Result<Self> {
        ALL_ENCODINGS
            .iter()
            .find(|encoding| encoding.prefix() == prefix)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = ALL_ENCODINGS.iter().map(|e| e.prefix()).collect();
                Error::argument("prefix", format!("one of {}", names.join(", ")), prefix)
            })
    }
}

fn add_checksum(data: &[u8]) -> Vec<u8> {
    let mut buffer = data.to_vec();
    buffer.extend_from_slice(&checksum(data));
    buffer
}

fn strip_checksum(buffer: &[u8]) -> Result<Vec<u8>> {
    if buffer.len() < 4 {
        return Err(Error::InvalidChecksum);
    }
    let (payload, check) = buffer.split_at(buffer.len() - 4);
    if checksum(payload)[..] != check[..] {
        return Err(Error::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

/// Encode `data` under the given prefix.
pub fn encode(data: &[u8], encoding: Encoding) -> Result<String> {
    encoding.ensure_valid_length(data)?;
    let with_checksum = add_checksum(data);
    let payload = if encoding.is_base64() {
        STANDARD.encode(with_checksum)
    } else {
        with_checksum.to_base58()
    };
    Ok(format!("{}_{}", encoding.prefix(), payload))
}

/// Decode any prefixed string, returning the encoding it carried.
pub fn decode_any(data: &str) -> Result<(Encoding, Vec<u8>)> {
    let (prefix, payload) = split(data)?;
    let encoding: Encoding = prefix.parse()?;
    Ok((encoding, decode_payload(encoding, payload)?))
}

/// Decode a prefixed string of any known type.
pub fn decode(data: &str) -> Result<Vec<u8>> {
    decode_any(data).map(|(_, payload)| payload)
}

/// Decode a prefixed string, requiring it to carry `required` as prefix.
pub fn decode_with(data: &str, required: Encoding) -> Result<Vec<u8>> {
    let (prefix, payload) = split(data)?;
    if prefix != required.prefix() {
        return Err(Error::PrefixMismatch {
            actual: prefix.to_string(),
            expected: required.prefix().to_string(),
        });
    }
    decode_payload(required, payload)
}

/// The prefix of an encoded string, without validating the payload.
pub fn prefix_of(data: &str) -> Result<Encoding> {
    split(data)?.0.parse()
}

fn split(data: &str) -> Result<(&str, &str)> {
    let mut parts = data.split('_');
    let prefix = parts.next().unwrap_or_default();
    let payload = parts
        .next()
        .ok_or_else(|| Error::decode(format!("Encoded string missing payload: {}", data)))?;
    if parts.next().is_some() {
        return Err(Error::decode(format!(
            "Encoded string have extra parts: {}",
            data
        )));
    }
    Ok((prefix, payload))
}

fn decode_payload(encoding: Encoding, payload: &str) -> Result<Vec<u8>> {
    let buffer = if encoding.is_base64() {
        STANDARD
            .decode(payload)
            .map_err(|err| Error::decode(format!("Invalid base64 payload: {}", err)))?
    } else {
        payload
            .from_base58()
            .map_err(|err| Error::decode(format!("Invalid base58 payload: {:?}", err)))?
    };
    let data = strip_checksum(&buffer)?;
    encoding.ensure_valid_length(&data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_base64_test() {
        assert_eq!(decode("ba_AQIq9Y55kw==").unwrap(), vec![1, 2, 42]);
    }

    #[test]
    fn encode_base58_test() {
        assert_eq!(encode(&[1, 2, 42], Encoding::Name).unwrap(), "nm_3DZUwMat2");
        assert_eq!(decode("nm_3DZUwMat2").unwrap(), vec![1, 2, 42]);
    }

    #[test]
    fn encode_base64_test() {
        assert_eq!(
            encode(&[1, 2, 42], Encoding::ByteArray).unwrap(),
            "ba_AQIq9Y55kw=="
        );
    }

    #[test]
    fn invalid_checksum_test() {
        assert_eq!(decode("ak_23aaaaa"), Err(Error::InvalidChecksum));
    }

    #[test]
    fn payload_length_test() {
        let err = decode("ak_An6Ui6sE1F").unwrap_err();
        assert_eq!(err.to_string(), "Payload should be 32 bytes, got 4 instead");
        let err = encode(&[1, 2, 3], Encoding::ContractAddress).unwrap_err();
        assert_eq!(err.to_string(), "Payload should be 32 bytes, got 3 instead");
    }

    #[test]
    fn malformed_strings_test() {
        assert_eq!(
            decode("ba").unwrap_err().to_string(),
            "Encoded string missing payload: ba"
        );
        assert_eq!(
            decode("ba_a_b").unwrap_err().to_string(),
            "Encoded string have extra parts: ba_a_b"
        );
        assert!(matches!(decode("zz_AQIq9Y55kw=="), Err(Error::Argument { .. })));
    }

    #[test]
    fn prefix_mismatch_test() {
        let err = decode_with("ba_AQIq9Y55kw==", Encoding::Transaction).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Encoded string have a wrong type: ba (expected: tx)"
        );
    }

    #[test]
    fn encoding_round_trip_test() {
        let key = [7u8; 32];
        let address = encode(&key, Encoding::AccountAddress).unwrap();
        assert!(address.starts_with("ak_"));
        assert_eq!(decode_with(&address, Encoding::AccountAddress).unwrap(), key);
        assert_eq!(prefix_of(&address).unwrap(), Encoding::AccountAddress);
    }
}
