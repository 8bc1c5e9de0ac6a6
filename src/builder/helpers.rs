use crate::builder::constants::{
    AENS_SUFFIX, NAME_BID_MAX_LENGTH, NAME_BID_RANGES, NAME_FEE_BID_INCREMENT,
    NAME_FEE_MULTIPLIER, NAME_MAX_LENGTH_FEE,
};
use crate::crypto::hash;
use crate::encoder::{decode_with, encode, prefix_of, Encoding};
use crate::errors::{Error, Result};

/// Id tags in order, tag `n` is at index `n - 1`.
pub const ID_TAG_ENCODINGS: [Encoding; 6] = [
    Encoding::AccountAddress,
    Encoding::Name,
    Encoding::Commitment,
    Encoding::OracleAddress,
    Encoding::ContractAddress,
    Encoding::Channel,
];

/// Minimal big endian bytes of an integer, zero is a single zero byte.
pub fn write_int(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

/// Big endian integer, the empty buffer reads as zero.
pub fn read_int(bytes: &[u8]) -> Result<u128> {
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    if significant.len() > 16 {
        return Err(Error::decode(format!(
            "Integer of {} bytes does not fit into 128 bits",
            bytes.len()
        )));
    }
    Ok(significant
        .iter()
        .fold(0u128, |acc, b| (acc << 8) | *b as u128))
}

/// Integer left padded with zeros to 32 bytes.
pub fn write_int32(value: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&value.to_be_bytes());
    out
}

pub fn id_tag(encoding: Encoding) -> Option<u8> {
    ID_TAG_ENCODINGS
        .iter()
        .position(|e| *e == encoding)
        .map(|index| index as u8 + 1)
}

/// Tag byte followed by the 32 byte hash of an address.
pub fn write_id(address: &str) -> Result<Vec<u8>> {
    let prefix = address.get(0..2).unwrap_or(address);
    let encoding: Encoding = prefix
        .parse()
        .map_err(|_| Error::TagNotFound(prefix.to_string()))?;
    let tag = id_tag(encoding).ok_or_else(|| Error::TagNotFound(prefix.to_string()))?;
    let mut out = vec![tag];
    out.extend(decode_with(address, encoding)?);
    Ok(out)
}

pub fn read_id(bytes: &[u8]) -> Result<String> {
    let tag = *bytes
        .first()
        .ok_or_else(|| Error::decode("Id is empty"))?;
    let encoding = tag
        .checked_sub(1)
        .and_then(|index| ID_TAG_ENCODINGS.get(index as usize))
        .ok_or(Error::PrefixNotFound(tag))?;
    encode(&bytes[1..], *encoding)
}

pub fn ensure_name_valid(name: &str) -> Result<()> {
    if !name.ends_with(AENS_SUFFIX) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn is_name_valid(name: &str) -> bool {
    ensure_name_valid(name).is_ok()
}

/// `nm_` id of an AENS name.
pub fn produce_name_id(name: &str) -> Result<String> {
    ensure_name_valid(name)?;
    encode(&hash(name.to_lowercase().as_bytes()), Encoding::Name)
}

/// `cm_` hash committing to a name and a salt, used by the preclaim.
pub fn commitment_hash(name: &str, salt: u128) -> Result<String> {
    ensure_name_valid(name)?;
    let mut data = name.to_lowercase().into_bytes();
    data.extend_from_slice(&write_int32(salt));
    encode(&hash(&data), Encoding::Commitment)
}

/// Address of a contract created by `owner` with the given nonce, or by a
/// channel participant at the given round.
pub fn build_contract_id(owner: &str, nonce: u128) -> Result<String> {
    let mut data = decode_with(owner, Encoding::AccountAddress)?;
    data.extend(write_int(nonce));
    encode(&hash(&data), Encoding::ContractAddress)
}

pub fn oracle_query_id(sender: &str, nonce: u128, oracle: &str) -> Result<String> {
    let mut data = decode_with(sender, Encoding::AccountAddress)?;
    data.extend_from_slice(&write_int32(nonce));
    data.extend(decode_with(oracle, Encoding::OracleAddress)?);
    encode(&hash(&data), Encoding::OracleQueryId)
}

fn label_length(name: &str) -> usize {
    name.chars().count() - AENS_SUFFIX.len()
}

/// Lowest fee accepted for claiming a name.
pub fn minimum_name_fee(name: &str) -> Result<u128> {
    ensure_name_valid(name)?;
    let length = label_length(name).clamp(1, NAME_MAX_LENGTH_FEE);
    Ok(NAME_BID_RANGES[length - 1] * NAME_FEE_MULTIPLIER)
}

/// Lowest next bid in a name auction that started with `start_fee`.
pub fn compute_bid_fee(name: &str, start_fee: Option<u128>) -> Result<u128> {
    let fee = match start_fee {
        Some(fee) => fee,
        None => minimum_name_fee(name)?,
    };
    let scaled = fee * (100 + NAME_FEE_BID_INCREMENT);
    Ok((scaled + 99) / 100)
}

/// Whether claiming the name opens an auction.
pub fn is_auction_name(name: &str) -> Result<bool> {
    ensure_name_valid(name)?;
    Ok(label_length(name) <= NAME_BID_MAX_LENGTH)
}

/// Default AENS pointer key for an address.
pub fn default_pointer_key(address: &str) -> Result<&'static str> {
    match prefix_of(address)? {
        Encoding::AccountAddress => Ok("account_pubkey"),
        Encoding::OracleAddress => Ok("oracle_pubkey"),
        Encoding::ContractAddress => Ok("contract_pubkey"),
        Encoding::Channel => Ok("channel"),
        other => Err(Error::argument(
            "address",
            "one of ak, ok, ct, ch",
            other.prefix(),
        )),
    }
}
