//! Field codecs shared by the transaction, entry and delegation schemas.
//!
//! Every schema field has a [`FieldType`] that turns a [`Value`] into an RLP
//! item and back. Fields depending on chain state also have an async
//! `prepare` step, used by the async builder to fill in defaults from a node.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use tracing::{event, Level};

use crate::builder::constants::{
    protocol_vm_abi, AbiVersion, ConsensusProtocolVersion, Tag, VmVersion, DEFAULT_GAS_MAX,
};
use crate::builder::entry::{EntryTag, ENTRY_REGISTRY};
use crate::builder::fee;
use crate::builder::helpers::{
    minimum_name_fee, produce_name_id, read_id, read_int, write_id, write_int,
    ID_TAG_ENCODINGS, is_name_valid,
};
use crate::builder::mptree::MPTree;
use crate::builder::schema::TX_REGISTRY;
use crate::builder::value::{Params, Value};
use crate::encoder::{decode, decode_with, encode, prefix_of, Encoding};
use crate::errors::{Error, Result};
use crate::node::NodeApi;
use crate::rlp::Rlp;

/// Options shared by every field while building one record.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Gas ceiling used to derive the default gas limit.
    pub gas_max: u128,
    /// Treat `ttl` as an absolute height instead of relative to the top.
    pub absolute_ttl: bool,
    /// Raise a too small fee to the minimum instead of failing.
    pub can_increase_fee: bool,
    /// Gas price suggested by the node, scales the minimum fee.
    pub fee_gas_price: Option<u128>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            gas_max: DEFAULT_GAS_MAX,
            absolute_ttl: false,
            can_increase_fee: false,
            fee_gas_price: None,
        }
    }
}

/// State of a single (possibly nested) build. The fee and gas limit fields
/// rebuild the whole transaction with one of the `computing_*` values fixed.
#[derive(Debug, Clone)]
pub struct BuildContext<'a> {
    pub options: &'a BuildOptions,
    pub computing_min_fee: Option<u128>,
    pub computing_gas_limit: Option<u128>,
    pub can_increase_fee: bool,
}

impl<'a> BuildContext<'a> {
    pub fn new(options: &'a BuildOptions) -> Self {
        BuildContext {
            options,
            computing_min_fee: None,
            computing_gas_limit: None,
            can_increase_fee: options.can_increase_fee,
        }
    }

    /// Serialize `params` as a transaction again with a tweaked context.
    pub fn rebuild(&self, params: &Params, tweak: impl FnOnce(&mut Self)) -> Result<Vec<u8>> {
        let mut ctx = self.clone();
        tweak(&mut ctx);
        TX_REGISTRY.serialize(params, &ctx)
    }
}

/// Result of the async preparation of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    Keep,
    Value(Value),
    FeeGasPrice(u128),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    /// Unsigned integer without default.
    UInt,
    /// Unsigned integer defaulting to the given value.
    UIntDefault(u128),
    Fee,
    GasPrice,
    GasLimit,
    Ttl,
    /// Account nonce, the parameter names the field holding the sender.
    Nonce(&'static str),
    Address(&'static [Encoding]),
    Encoded(Encoding),
    Payload,
    Raw,
    Str,
    Bool,
    Enumeration { max: u128, default: Option<u128> },
    Name,
    NameId,
    NameFee,
    Pointers,
    CtVersion,
    AbiVersion,
    Deposit,
    Array(&'static FieldType),
    /// Embedded transaction, optionally restricted to one tag.
    Transaction(Option<Tag>),
    Entry(EntryTag),
    Map(Encoding, EntryTag),
    Wrapped(EntryTag),
    MpTree(Encoding, EntryTag),
    QueryId,
}

pub fn int_value(name: &str, value: Option<&Value>) -> Result<Option<u128>> {
    match value {
        None => Ok(None),
        Some(Value::Int(int)) => Ok(Some(*int)),
        Some(Value::Str(text)) => text
            .parse::<u128>()
            .map(Some)
            .map_err(|_| Error::argument(name, "an integer", text)),
        Some(other) => Err(Error::argument(name, "an integer", other.kind())),
    }
}

fn required<T>(name: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| Error::argument(name, "provided", "undefined"))
}

fn str_value<'v>(name: &str, value: Option<&'v Value>) -> Result<&'v str> {
    match required(name, value)? {
        Value::Str(text) => Ok(text),
        other => Err(Error::argument(name, "a string", other.kind())),
    }
}

fn int_rlp(value: u128) -> Rlp {
    Rlp::Bytes(write_int(value))
}

fn read_int_item(item: &Rlp) -> Result<Value> {
    Ok(Value::Int(read_int(item.as_bytes()?)?))
}

fn utf8(name: &str, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::decode(format!("{} is not a valid utf-8 string", name)))
}

fn prefixes(encodings: &[Encoding]) -> String {
    encodings
        .iter()
        .map(|encoding| encoding.prefix())
        .collect::<Vec<&str>>()
        .join(", ")
}

pub fn ct_version_value(vm: u128, abi: u128) -> Value {
    let mut map = BTreeMap::new();
    map.insert(String::from("vmVersion"), Value::Int(vm));
    map.insert(String::from("abiVersion"), Value::Int(abi));
    Value::Map(map)
}

/// Abi version used when neither the caller nor a node provides one.
fn default_abi_version(tag: u64) -> u128 {
    let call_contract = EntryTag::ChannelOffChainUpdateCallContract.as_u64();
    if tag == Tag::ContractCallTx.as_u64() || tag == Tag::GaMetaTx.as_u64() || tag == call_contract
    {
        AbiVersion::Fate as u128
    } else {
        AbiVersion::NoAbi as u128
    }
}

fn serialize_address(encodings: &[Encoding], address: &str) -> Result<Rlp> {
    let prefix = address.get(0..2).unwrap_or(address);
    let encoding = ID_TAG_ENCODINGS
        .iter()
        .find(|encoding| encoding.prefix() == prefix)
        .ok_or_else(|| Error::TagNotFound(prefix.to_string()))?;
    if !encodings.contains(encoding) {
        return Err(Error::argument("Address encoding", prefixes(encodings), prefix));
    }
    Ok(Rlp::Bytes(write_id(address)?))
}

fn deserialize_address(encodings: &[Encoding], bytes: &[u8]) -> Result<Value> {
    let address = read_id(bytes)?;
    let prefix = address.get(0..2).unwrap_or("");
    if !encodings.iter().any(|encoding| encoding.prefix() == prefix) {
        return Err(Error::argument("Address encoding", prefixes(encodings), prefix));
    }
    Ok(Value::Str(address))
}

impl FieldType {
    /// Turn the value of field `name` into an RLP item.
    pub fn serialize(
        &self,
        name: &str,
        value: Option<&Value>,
        params: &Params,
        ctx: &BuildContext,
    ) -> Result<Rlp> {
        match self {
            FieldType::UInt | FieldType::Ttl | FieldType::Nonce(_) => {
                let default = match self {
                    FieldType::Ttl => Some(0),
                    _ => None,
                };
                let int = int_value(name, value)?.or(default);
                Ok(int_rlp(required(name, int)?))
            }
            FieldType::UIntDefault(default) => {
                Ok(int_rlp(int_value(name, value)?.unwrap_or(*default)))
            }
            FieldType::Fee => {
                let fee = fee::serialize_fee(int_value(name, value)?, params, ctx)?;
                Ok(int_rlp(fee))
            }
            FieldType::GasPrice => Ok(int_rlp(fee::serialize_gas_price(int_value(
                name, value,
            )?)?)),
            FieldType::GasLimit => {
                let gas_limit = fee::serialize_gas_limit(int_value(name, value)?, params, ctx)?;
                Ok(int_rlp(gas_limit))
            }
            FieldType::Address(encodings) => {
                serialize_address(encodings, str_value(name, value)?)
            }
            FieldType::Encoded(encoding) => {
                Ok(Rlp::Bytes(decode_with(str_value(name, value)?, *encoding)?))
            }
            FieldType::Payload => match value {
                None => Ok(Rlp::Bytes(vec![])),
                Some(Value::Bytes(bytes)) => Ok(Rlp::Bytes(bytes.clone())),
                Some(Value::Str(text)) if text.starts_with("ba_") => {
                    Ok(Rlp::Bytes(decode_with(text, Encoding::ByteArray)?))
                }
                Some(Value::Str(text)) => Ok(Rlp::Bytes(text.as_bytes().to_vec())),
                Some(other) => Err(Error::argument(name, "a string", other.kind())),
            },
            FieldType::Raw => match required(name, value)? {
                Value::Bytes(bytes) => Ok(Rlp::Bytes(bytes.clone())),
                other => Err(Error::argument(name, "bytes", other.kind())),
            },
            FieldType::Str | FieldType::Name => {
                Ok(Rlp::Bytes(str_value(name, value)?.as_bytes().to_vec()))
            }
            FieldType::Bool => match required(name, value)? {
                Value::Bool(flag) => Ok(Rlp::Bytes(vec![*flag as u8])),
                other => Err(Error::argument(name, "a boolean", other.kind())),
            },
            FieldType::Enumeration { max, default } => {
                let int = required(name, int_value(name, value)?.or(*default))?;
                if int > *max {
                    return Err(Error::argument(
                        name,
                        format!("less than {}", max + 1),
                        int,
                    ));
                }
                Ok(int_rlp(int))
            }
            FieldType::NameId => {
                let name_or_id = str_value(name, value)?;
                let id = if is_name_valid(name_or_id) {
                    produce_name_id(name_or_id)?
                } else {
                    name_or_id.to_string()
                };
                serialize_address(&[Encoding::Name], &id)
            }
            FieldType::NameFee => {
                let name_value = str_value("name", params.get("name"))?;
                let min_fee = minimum_name_fee(name_value)?;
                let fee = int_value(name, value)?.unwrap_or(min_fee);
                if fee < min_fee {
                    return Err(Error::InsufficientNameFee {
                        provided: fee,
                        required: min_fee,
                    });
                }
                Ok(int_rlp(fee))
            }
            FieldType::Pointers => {
                let pointers = match value {
                    None => &[][..],
                    Some(Value::List(pointers)) => &pointers[..],
                    Some(other) => return Err(Error::argument(name, "a list", other.kind())),
                };
                let items = pointers
                    .iter()
                    .map(|pointer| {
                        let map = pointer
                            .as_map()
                            .ok_or_else(|| Error::argument("pointer", "a map", pointer.kind()))?;
                        let key = str_value("pointer key", map.get("key"))?;
                        let id = str_value("pointer id", map.get("id"))?;
                        Ok(Rlp::List(vec![
                            Rlp::Bytes(key.as_bytes().to_vec()),
                            Rlp::Bytes(write_id(id)?),
                        ]))
                    })
                    .collect::<Result<Vec<Rlp>>>()?;
                Ok(Rlp::List(items))
            }
            FieldType::CtVersion => {
                let (vm, abi) = match value {
                    None => (VmVersion::Fate2 as u128, AbiVersion::Fate as u128),
                    Some(Value::Map(map)) => (
                        required("vmVersion", int_value("vmVersion", map.get("vmVersion"))?)?,
                        required("abiVersion", int_value("abiVersion", map.get("abiVersion"))?)?,
                    ),
                    Some(other) => return Err(Error::argument(name, "a map", other.kind())),
                };
                let mut bytes = write_int(vm);
                bytes.push(0);
                bytes.extend(write_int(abi));
                Ok(Rlp::Bytes(bytes))
            }
            FieldType::AbiVersion => Ok(int_rlp(
                int_value(name, value)?.unwrap_or_else(|| default_abi_version(params.tag)),
            )),
            FieldType::Deposit => {
                let deposit = int_value(name, value)?.unwrap_or(0);
                if deposit != 0 {
                    return Err(Error::IllegalArgument(format!(
                        "Contract deposit is not refundable, so it should be equal 0, got {} instead",
                        deposit
                    )));
                }
                Ok(int_rlp(deposit))
            }
            FieldType::Array(inner) => {
                let items = match value {
                    None => &[][..],
                    Some(Value::List(items)) => &items[..],
                    Some(other) => return Err(Error::argument(name, "a list", other.kind())),
                };
                let serialized = items
                    .iter()
                    .map(|item| inner.serialize(name, Some(item), params, ctx))
                    .collect::<Result<Vec<Rlp>>>()?;
                Ok(Rlp::List(serialized))
            }
            FieldType::Transaction(expected) => match required(name, value)? {
                Value::Record(record) => {
                    if let Some(expected) = expected {
                        if record.tag != expected.as_u64() {
                            return Err(Error::argument(name, expected.name(), record.tag));
                        }
                    }
                    let inner_options = BuildOptions {
                        fee_gas_price: None,
                        ..ctx.options.clone()
                    };
                    Ok(Rlp::Bytes(
                        TX_REGISTRY.serialize(record, &BuildContext::new(&inner_options))?,
                    ))
                }
                Value::Str(encoded) => Ok(Rlp::Bytes(decode_with(encoded, Encoding::Transaction)?)),
                Value::Bytes(bytes) => Ok(Rlp::Bytes(bytes.clone())),
                other => Err(Error::argument(name, "a transaction", other.kind())),
            },
            FieldType::Entry(tag) => match required(name, value)? {
                Value::Record(record) => {
                    let mut record = record.clone();
                    record.tag = tag.as_u64();
                    Ok(Rlp::Bytes(ENTRY_REGISTRY.serialize(&record, ctx)?))
                }
                Value::Str(encoded) => Ok(Rlp::Bytes(decode(encoded)?)),
                Value::Bytes(bytes) => Ok(Rlp::Bytes(bytes.clone())),
                other => Err(Error::argument(name, "an entry", other.kind())),
            },
            FieldType::Map(_, tag) => {
                let map = match required(name, value)? {
                    Value::Map(map) => map,
                    other => return Err(Error::argument(name, "a map", other.kind())),
                };
                let values = map
                    .iter()
                    .map(|(key, entry)| {
                        let mut record = entry
                            .as_record()
                            .cloned()
                            .ok_or_else(|| Error::argument(key.as_str(), "a record", entry.kind()))?;
                        record.tag = tag.as_u64();
                        Ok(Value::Record(
                            Params::new(EntryTag::MtreeValue)
                                .with("key", decode(key)?)
                                .with("value", ENTRY_REGISTRY.serialize(&record, ctx)?),
                        ))
                    })
                    .collect::<Result<Vec<Value>>>()?;
                let tree = Params::new(EntryTag::Mtree).with("values", values);
                Ok(Rlp::Bytes(ENTRY_REGISTRY.serialize(&tree, ctx)?))
            }
            FieldType::Wrapped(tag) => {
                let wrapped = Params::new(*tag).with("payload", required(name, value)?.clone());
                Ok(Rlp::Bytes(ENTRY_REGISTRY.serialize(&wrapped, ctx)?))
            }
            FieldType::MpTree(_, _) => match required(name, value)? {
                Value::Tree(tree) => Ok(tree.to_rlp()),
                other => Err(Error::argument(name, "a tree", other.kind())),
            },
            FieldType::QueryId => {
                let query_id = decode_with(str_value(name, value)?, Encoding::OracleQueryId)?;
                let as_oracle = encode(&query_id, Encoding::OracleAddress)?;
                serialize_address(&[Encoding::OracleAddress], &as_oracle)
            }
        }
    }

    /// Turn an RLP item back into the value of field `name`.
    pub fn deserialize(&self, name: &str, item: &Rlp) -> Result<Value> {
        match self {
            FieldType::UInt
            | FieldType::UIntDefault(_)
            | FieldType::Fee
            | FieldType::GasPrice
            | FieldType::GasLimit
            | FieldType::Ttl
            | FieldType::Nonce(_)
            | FieldType::NameFee
            | FieldType::AbiVersion
            | FieldType::Deposit => read_int_item(item),
            FieldType::Address(encodings) => deserialize_address(encodings, item.as_bytes()?),
            FieldType::Encoded(encoding) => Ok(Value::Str(encode(item.as_bytes()?, *encoding)?)),
            FieldType::Payload => Ok(Value::Str(encode(item.as_bytes()?, Encoding::ByteArray)?)),
            FieldType::Raw => Ok(Value::Bytes(item.as_bytes()?.to_vec())),
            FieldType::Str | FieldType::Name => Ok(Value::Str(utf8(name, item.as_bytes()?)?)),
            FieldType::Bool => Ok(Value::Bool(item.as_bytes()?.first() == Some(&1))),
            FieldType::Enumeration { max, .. } => {
                let int = read_int(item.as_bytes()?)?;
                if int > *max {
                    return Err(Error::argument(name, format!("less than {}", max + 1), int));
                }
                Ok(Value::Int(int))
            }
            FieldType::NameId => deserialize_address(&[Encoding::Name], item.as_bytes()?),
            FieldType::Pointers => {
                let pointers = item
                    .as_list()?
                    .iter()
                    .map(|pointer| {
                        let pair = pointer.as_list()?;
                        if pair.len() != 2 {
                            return Err(Error::argument("pointer length", 2, pair.len()));
                        }
                        let mut map = BTreeMap::new();
                        map.insert(
                            String::from("key"),
                            Value::Str(utf8("pointer key", pair[0].as_bytes()?)?),
                        );
                        map.insert(String::from("id"), Value::Str(read_id(pair[1].as_bytes()?)?));
                        Ok(Value::Map(map))
                    })
                    .collect::<Result<Vec<Value>>>()?;
                Ok(Value::List(pointers))
            }
            FieldType::CtVersion => {
                let bytes = item.as_bytes()?;
                if bytes.len() < 3 {
                    return Err(Error::argument("ctVersion length", 3, bytes.len()));
                }
                Ok(ct_version_value(bytes[0] as u128, bytes[2] as u128))
            }
            FieldType::Array(inner) => Ok(Value::List(
                item.as_list()?
                    .iter()
                    .map(|element| inner.deserialize(name, element))
                    .collect::<Result<Vec<Value>>>()?,
            )),
            FieldType::Transaction(expected) => Ok(Value::Record(
                TX_REGISTRY.deserialize(item.as_bytes()?, expected.map(|tag| tag.as_u64()))?,
            )),
            FieldType::Entry(tag) => Ok(Value::Record(
                ENTRY_REGISTRY.deserialize(item.as_bytes()?, Some(tag.as_u64()))?,
            )),
            FieldType::Map(encoding, tag) => {
                let tree =
                    ENTRY_REGISTRY.deserialize(item.as_bytes()?, Some(EntryTag::Mtree.as_u64()))?;
                let mut map = BTreeMap::new();
                for value in tree.get_list("values").unwrap_or_default() {
                    let record = value
                        .as_record()
                        .ok_or_else(|| Error::decode("Mtree value is not a record"))?;
                    let key = record.get_bytes("key").unwrap_or_default();
                    // contract store entries share the tree with contracts
                    if *encoding == Encoding::ContractAddress && key.len() != 32 {
                        continue;
                    }
                    let entry = ENTRY_REGISTRY.deserialize(
                        record.get_bytes("value").unwrap_or_default(),
                        Some(tag.as_u64()),
                    )?;
                    map.insert(encode(key, *encoding)?, Value::Record(entry));
                }
                Ok(Value::Map(map))
            }
            FieldType::Wrapped(tag) => {
                let mut wrapped =
                    ENTRY_REGISTRY.deserialize(item.as_bytes()?, Some(tag.as_u64()))?;
                Ok(wrapped
                    .remove("payload")
                    .unwrap_or_else(|| Value::Map(BTreeMap::new())))
            }
            FieldType::MpTree(encoding, tag) => {
                Ok(Value::Tree(MPTree::from_rlp(item, *encoding, *tag)?))
            }
            FieldType::QueryId => {
                let oracle = deserialize_address(&[Encoding::OracleAddress], item.as_bytes()?)?;
                let oracle = oracle.as_str().unwrap_or_default();
                let bytes = decode_with(oracle, Encoding::OracleAddress)?;
                Ok(Value::Str(encode(&bytes, Encoding::OracleQueryId)?))
            }
        }
    }

    /// Fill in a missing value from the node. Only fields that depend on
    /// chain state do anything here.
    pub async fn prepare(
        &self,
        name: &str,
        value: Option<&Value>,
        params: &Params,
        node: &dyn NodeApi,
        options: &BuildOptions,
    ) -> Result<Prepared> {
        match self {
            FieldType::Fee => {
                if value.is_some() {
                    return Ok(Prepared::Keep);
                }
                let gas_price = node.gas_price().await?;
                if gas_price == 0 {
                    return Ok(Prepared::Keep);
                }
                Ok(Prepared::FeeGasPrice(gas_price))
            }
            FieldType::GasPrice => {
                if value.is_some() {
                    return Ok(Prepared::Keep);
                }
                let gas_price = node.gas_price().await?;
                if gas_price == 0 {
                    return Ok(Prepared::Keep);
                }
                Ok(Prepared::Value(Value::Int(gas_price)))
            }
            FieldType::Ttl => {
                let ttl = int_value(name, value)?.unwrap_or(0);
                if ttl == 0 || options.absolute_ttl {
                    return Ok(Prepared::Keep);
                }
                let height = node.height().await?;
                Ok(Prepared::Value(Value::Int(ttl + height as u128)))
            }
            FieldType::Nonce(sender_key) => {
                if value.is_some() {
                    return Ok(Prepared::Keep);
                }
                let sender = str_value(sender_key, params.get(sender_key))?;
                // oracles share the key pair of their account
                let sender = match prefix_of(sender) {
                    Ok(Encoding::OracleAddress) => {
                        encode(&decode(sender)?, Encoding::AccountAddress)?
                    }
                    _ => sender.to_string(),
                };
                let nonce = match node.next_nonce(&sender).await {
                    Ok(nonce) => nonce,
                    Err(err) => {
                        event!(Level::DEBUG, "next nonce of {} unavailable: {}", sender, err);
                        1
                    }
                };
                Ok(Prepared::Value(Value::Int(nonce as u128)))
            }
            FieldType::CtVersion | FieldType::AbiVersion => {
                if value.is_some() {
                    return Ok(Prepared::Keep);
                }
                let tag = match Tag::try_from(params.tag) {
                    Ok(tag) => tag,
                    Err(_) => return Ok(Prepared::Keep),
                };
                let version = node.protocol_version().await?;
                let protocol = ConsensusProtocolVersion::try_from(version)
                    .map_err(Error::UnsupportedProtocol)?;
                match (self, protocol_vm_abi(protocol, tag)) {
                    (FieldType::CtVersion, Some((Some(vm), abi))) => Ok(Prepared::Value(
                        ct_version_value(vm as u128, abi as u128),
                    )),
                    (FieldType::AbiVersion, Some((_, abi))) => {
                        Ok(Prepared::Value(Value::Int(abi as u128)))
                    }
                    _ => Ok(Prepared::Keep),
                }
            }
            _ => Ok(Prepared::Keep),
        }
    }
}
