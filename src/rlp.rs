//! Recursive length prefix encoding of byte strings and nested lists.

use crate::errors::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rlp {
    Bytes(Vec<u8>),
    List(Vec<Rlp>),
}

impl Rlp {
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Rlp::Bytes(bytes) => Ok(bytes),
            Rlp::List(_) => Err(Error::decode("Expected RLP byte string, got a list")),
        }
    }

    pub fn as_list(&self) -> Result<&[Rlp]> {
        match self {
            Rlp::List(items) => Ok(items),
            Rlp::Bytes(_) => Err(Error::decode("Expected RLP list, got a byte string")),
        }
    }

    pub fn into_list(self) -> Result<Vec<Rlp>> {
        match self {
            Rlp::List(items) => Ok(items),
            Rlp::Bytes(_) => Err(Error::decode("Expected RLP list, got a byte string")),
        }
    }
}

impl From<Vec<u8>> for Rlp {
    fn from(bytes: Vec<u8>) -> Self {
        Rlp::Bytes(bytes)
    }
}

impl From<&[u8]> for Rlp {
    fn from(bytes: &[u8]) -> Self {
        Rlp::Bytes(bytes.to_vec())
    }
}

impl From<Vec<Rlp>> for Rlp {
    fn from(items: Vec<Rlp>) -> Self {
        Rlp::List(items)
    }
}

fn length_bytes(len: usize) -> Vec<u8> {
    let bytes = len.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

fn encode_header(len: usize, offset: u8, out: &mut Vec<u8>) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let len_bytes = length_bytes(len);
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
}

fn encode_into(item: &Rlp, out: &mut Vec<u8>) {
    match item {
        Rlp::Bytes(bytes) => {
            if bytes.len() == 1 && bytes[0] < 0x80 {
                out.push(bytes[0]);
            } else {
                encode_header(bytes.len(), 0x80, out);
                out.extend_from_slice(bytes);
            }
        }
        Rlp::List(items) => {
            let mut body = vec![];
            for item in items {
                encode_into(item, &mut body);
            }
            encode_header(body.len(), 0xc0, out);
            out.extend_from_slice(&body);
        }
    }
}

pub fn encode(item: &Rlp) -> Vec<u8> {
    let mut out = vec![];
    encode_into(item, &mut out);
    out
}

/// Decode a single RLP item, rejecting trailing bytes.
pub fn decode(data: &[u8]) -> Result<Rlp> {
    let (item, consumed) = decode_item(data)?;
    if consumed != data.len() {
        return Err(Error::decode(format!(
            "RLP has {} trailing bytes",
            data.len() - consumed
        )));
    }
    Ok(item)
}

fn read_length(data: &[u8], start: usize, len_of_len: usize) -> Result<usize> {
    let bytes = data
        .get(start..start + len_of_len)
        .ok_or_else(|| Error::decode("RLP input is truncated"))?;
    if bytes.len() > std::mem::size_of::<usize>() {
        return Err(Error::decode("RLP length is too large"));
    }
    Ok(bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

fn slice(data: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| Error::decode("RLP input is truncated"))
}

fn decode_item(data: &[u8]) -> Result<(Rlp, usize)> {
    let prefix = *data
        .first()
        .ok_or_else(|| Error::decode("RLP input is empty"))?;
    match prefix {
        0x00..=0x7f => Ok((Rlp::Bytes(vec![prefix]), 1)),
        0x80..=0xb7 => {
            let len = (prefix - 0x80) as usize;
            Ok((Rlp::Bytes(slice(data, 1, len)?.to_vec()), 1 + len))
        }
        0xb8..=0xbf => {
            let len_of_len = (prefix - 0xb7) as usize;
            let len = read_length(data, 1, len_of_len)?;
            let start = 1 + len_of_len;
            Ok((Rlp::Bytes(slice(data, start, len)?.to_vec()), start + len))
        }
        0xc0..=0xf7 => {
            let len = (prefix - 0xc0) as usize;
            let items = decode_list(slice(data, 1, len)?)?;
            Ok((Rlp::List(items), 1 + len))
        }
        0xf8..=0xff => {
            let len_of_len = (prefix - 0xf7) as usize;
            let len = read_length(data, 1, len_of_len)?;
            let start = 1 + len_of_len;
            let items = decode_list(slice(data, start, len)?)?;
            Ok((Rlp::List(items), start + len))
        }
    }
}

fn decode_list(mut body: &[u8]) -> Result<Vec<Rlp>> {
    let mut items = vec![];
    while !body.is_empty() {
        let (item, consumed) = decode_item(body)?;
        items.push(item);
        body = &body[consumed..];
    }
    Ok(items)
}
