//! Ledger entries: accounts, names, contracts, channel state, state trees
//! and proofs of inclusion, in their node serialization.

use std::convert::TryFrom;

use macros::TryFromTag;

use crate::builder::constants::CallReturnType;
use crate::builder::field::{BuildContext, BuildOptions, FieldType::{self, *}};
use crate::builder::record::{Registry, Schema};
use crate::builder::value::Params;
use crate::encoder::{prefix_of, Encoding};
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromTag)]
pub enum EntryTag {
    Account = 10,
    Oracle = 20,
    Name = 30,
    Contract = 40,
    ContractCall = 41,
    Channel = 58,
    TreesPoi = 60,
    StateTrees = 62,
    Mtree = 63,
    MtreeValue = 64,
    ChannelOffChainUpdateTransfer = 570,
    ChannelOffChainUpdateDeposit = 571,
    ChannelOffChainUpdateWithdraw = 572,
    ChannelOffChainUpdateCreateContract = 573,
    ChannelOffChainUpdateCallContract = 574,
    ContractsMtree = 621,
    CallsMtree = 622,
    ChannelsMtree = 623,
    NameserviceMtree = 624,
    OraclesMtree = 625,
    AccountsMtree = 626,
    GaMetaTxAuthData = 810,
}

impl From<EntryTag> for u64 {
    fn from(tag: EntryTag) -> u64 {
        tag.as_u64()
    }
}

pub fn entry_tag_name(tag: u64) -> String {
    EntryTag::try_from(tag)
        .map(|tag| tag.name().to_string())
        .unwrap_or_else(|_| String::from("Unknown"))
}

const AK: &[Encoding] = &[Encoding::AccountAddress];
const CT: &[Encoding] = &[Encoding::ContractAddress];
const CT_NM: &[Encoding] = &[Encoding::ContractAddress, Encoding::Name];
const ANY_ID: &[Encoding] = &[
    Encoding::AccountAddress,
    Encoding::Name,
    Encoding::Commitment,
    Encoding::OracleAddress,
    Encoding::ContractAddress,
    Encoding::Channel,
];
const CONTRACT_BYTES: FieldType = Encoded(Encoding::ContractBytearray);
const COIN: FieldType = UIntDefault(0);
const RETURN_TYPE: FieldType = Enumeration {
    max: CallReturnType::Revert as u128,
    default: None,
};

const fn entry(
    tag: EntryTag,
    version: u64,
    default: bool,
    fields: &'static [(&'static str, FieldType)],
) -> Schema {
    Schema {
        tag: tag as u64,
        version,
        default,
        fields,
    }
}

pub static ENTRY_SCHEMAS: &[Schema] = &[
    entry(EntryTag::Account, 1, false, &[("nonce", UInt), ("balance", UInt)]),
    entry(
        EntryTag::Account,
        2,
        true,
        &[
            ("flags", UInt),
            ("nonce", UInt),
            ("balance", UInt),
            ("gaContract", Address(CT_NM)),
            ("gaAuthFun", CONTRACT_BYTES),
        ],
    ),
    entry(
        EntryTag::Name,
        1,
        true,
        &[
            ("accountId", Address(AK)),
            ("nameTtl", UInt),
            ("status", Raw),
            ("clientTtl", UInt),
            ("pointers", Pointers),
        ],
    ),
    entry(
        EntryTag::Contract,
        1,
        true,
        &[
            ("owner", Address(AK)),
            ("ctVersion", CtVersion),
            ("code", CONTRACT_BYTES),
            ("log", CONTRACT_BYTES),
            ("active", Bool),
            ("referers", Array(&Address(AK))),
            ("deposit", COIN),
        ],
    ),
    entry(
        EntryTag::ContractCall,
        2,
        true,
        &[
            ("callerId", Address(AK)),
            ("callerNonce", UInt),
            ("height", UInt),
            ("contractId", Address(CT)),
            ("gasPrice", UInt),
            ("gasUsed", UInt),
            ("returnValue", CONTRACT_BYTES),
            ("returnType", RETURN_TYPE),
            ("log", Array(&Raw)),
        ],
    ),
    entry(
        EntryTag::Oracle,
        1,
        true,
        &[
            ("accountId", Address(AK)),
            ("queryFormat", Str),
            ("responseFormat", Str),
            ("queryFee", COIN),
            ("oracleTtlValue", UInt),
            ("abiVersion", AbiVersion),
        ],
    ),
    entry(
        EntryTag::Channel,
        3,
        true,
        &[
            ("initiator", Address(AK)),
            ("responder", Address(AK)),
            ("channelAmount", UInt),
            ("initiatorAmount", UInt),
            ("responderAmount", UInt),
            ("channelReserve", UInt),
            ("initiatorDelegateIds", Array(&Address(ANY_ID))),
            ("responderDelegateIds", Array(&Address(ANY_ID))),
            ("stateHash", Encoded(Encoding::State)),
            ("round", UInt),
            ("soloRound", UInt),
            ("lockPeriod", UInt),
            ("lockedUntil", UInt),
            ("initiatorAuth", CONTRACT_BYTES),
            ("responderAuth", CONTRACT_BYTES),
        ],
    ),
    entry(
        EntryTag::ChannelOffChainUpdateTransfer,
        1,
        true,
        &[("from", Address(AK)), ("to", Address(AK)), ("amount", UInt)],
    ),
    entry(
        EntryTag::ChannelOffChainUpdateDeposit,
        1,
        true,
        &[("from", Address(AK)), ("amount", UInt)],
    ),
    entry(
        EntryTag::ChannelOffChainUpdateWithdraw,
        1,
        true,
        &[("from", Address(AK)), ("amount", UInt)],
    ),
    entry(
        EntryTag::ChannelOffChainUpdateCreateContract,
        1,
        true,
        &[
            ("owner", Address(AK)),
            ("ctVersion", CtVersion),
            ("code", CONTRACT_BYTES),
            ("deposit", UInt),
            ("callData", CONTRACT_BYTES),
        ],
    ),
    entry(
        EntryTag::ChannelOffChainUpdateCallContract,
        1,
        true,
        &[
            ("caller", Address(AK)),
            ("contract", Address(CT)),
            ("abiVersion", AbiVersion),
            ("amount", UInt),
            ("callData", CONTRACT_BYTES),
            ("callStack", Raw),
            ("gasPrice", GasPrice),
            ("gasLimit", GasLimit),
        ],
    ),
    entry(
        EntryTag::TreesPoi,
        1,
        true,
        &[
            ("accounts", Array(&MpTree(Encoding::AccountAddress, EntryTag::Account))),
            ("calls", Array(&MpTree(Encoding::ByteArray, EntryTag::ContractCall))),
            ("channels", Array(&MpTree(Encoding::Channel, EntryTag::Channel))),
            ("contracts", Array(&MpTree(Encoding::ContractAddress, EntryTag::Contract))),
            ("ns", Array(&MpTree(Encoding::Name, EntryTag::Name))),
            ("oracles", Array(&MpTree(Encoding::OracleAddress, EntryTag::Oracle))),
        ],
    ),
    entry(
        EntryTag::StateTrees,
        0,
        true,
        &[
            ("contracts", Wrapped(EntryTag::ContractsMtree)),
            ("calls", Wrapped(EntryTag::CallsMtree)),
            ("channels", Wrapped(EntryTag::ChannelsMtree)),
            ("ns", Wrapped(EntryTag::NameserviceMtree)),
            ("oracles", Wrapped(EntryTag::OraclesMtree)),
            ("accounts", Wrapped(EntryTag::AccountsMtree)),
        ],
    ),
    entry(
        EntryTag::Mtree,
        1,
        true,
        &[("values", Array(&Entry(EntryTag::MtreeValue)))],
    ),
    entry(EntryTag::MtreeValue, 1, true, &[("key", Raw), ("value", Raw)]),
    entry(
        EntryTag::ContractsMtree,
        1,
        true,
        &[("payload", Map(Encoding::ContractAddress, EntryTag::Contract))],
    ),
    entry(
        EntryTag::CallsMtree,
        1,
        true,
        &[("payload", Map(Encoding::ByteArray, EntryTag::ContractCall))],
    ),
    entry(
        EntryTag::ChannelsMtree,
        1,
        true,
        &[("payload", Map(Encoding::Channel, EntryTag::Channel))],
    ),
    entry(
        EntryTag::NameserviceMtree,
        1,
        true,
        &[("payload", Map(Encoding::Name, EntryTag::Name))],
    ),
    entry(
        EntryTag::OraclesMtree,
        1,
        true,
        &[("payload", Map(Encoding::OracleAddress, EntryTag::Oracle))],
    ),
    entry(
        EntryTag::AccountsMtree,
        1,
        true,
        &[("payload", Map(Encoding::AccountAddress, EntryTag::Account))],
    ),
    entry(
        EntryTag::GaMetaTxAuthData,
        1,
        true,
        &[
            ("fee", COIN),
            ("gasPrice", GasPrice),
            ("txHash", Encoded(Encoding::TxHash)),
        ],
    ),
];

pub static ENTRY_REGISTRY: Registry = Registry {
    schemas: ENTRY_SCHEMAS,
    tag_name: entry_tag_name,
};

const ENCODING_TAGS: [(EntryTag, Encoding); 3] = [
    (EntryTag::CallsMtree, Encoding::CallStateTree),
    (EntryTag::StateTrees, Encoding::StateTrees),
    (EntryTag::TreesPoi, Encoding::Poi),
];

fn entry_encoding(tag: u64) -> Encoding {
    ENCODING_TAGS
        .iter()
        .find(|(entry_tag, _)| entry_tag.as_u64() == tag)
        .map(|(_, encoding)| *encoding)
        .unwrap_or(Encoding::ByteArray)
}

pub fn pack_entry_raw(params: &Params) -> Result<Vec<u8>> {
    let options = BuildOptions::default();
    ENTRY_REGISTRY.serialize(params, &BuildContext::new(&options))
}

pub fn unpack_entry_raw(data: &[u8], expected_tag: Option<EntryTag>) -> Result<Params> {
    ENTRY_REGISTRY.deserialize(data, expected_tag.map(|tag| tag.as_u64()))
}

/// Serialize an entry, `cs_`, `ss_` and `pi_` for call state, state trees and
/// proofs of inclusion, `ba_` for everything else.
pub fn pack_entry(params: &Params) -> Result<String> {
    ENTRY_REGISTRY.pack(params, &BuildOptions::default(), entry_encoding(params.tag))
}

/// Deserialize an entry. Without an expected tag it is inferred from the
/// prefix for the encodings that identify one.
pub fn unpack_entry(encoded: &str, expected_tag: Option<EntryTag>) -> Result<Params> {
    let expected_tag = match expected_tag {
        Some(tag) => Some(tag),
        None => {
            let encoding = prefix_of(encoded)?;
            ENCODING_TAGS
                .iter()
                .find(|(_, tag_encoding)| *tag_encoding == encoding)
                .map(|(tag, _)| *tag)
        }
    };
    ENTRY_REGISTRY.unpack(encoded, expected_tag.map(|tag| tag.as_u64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::constants::DEFAULT_GAS_MAX;
    use crate::builder::mptree::tests::account_tree;
    use crate::builder::mptree::MPTree;
    use crate::builder::value::Value;
    use crate::encoder::encode;
    use crate::errors::Error;
    use std::collections::BTreeMap;

    fn account(balance: u64) -> Params {
        Params::new(EntryTag::Account)
            .with("flags", 0u64)
            .with("nonce", 3u64)
            .with("balance", balance)
            .with("gaContract", encode(&[0u8; 32], Encoding::ContractAddress).unwrap())
            .with("gaAuthFun", encode(&[], Encoding::ContractBytearray).unwrap())
    }

    #[test]
    fn account_entry_test() {
        let packed = pack_entry(&account(100)).unwrap();
        assert!(packed.starts_with("ba_"));
        let unpacked = unpack_entry(&packed, Some(EntryTag::Account)).unwrap();
        assert_eq!(unpacked.version, Some(2));
        assert_eq!(unpacked.get_int("balance"), Some(100));
        assert_eq!(unpacked.get_int("nonce"), Some(3));
    }

    #[test]
    fn account_v1_test() {
        let v1 = Params::new(EntryTag::Account)
            .with_version(1)
            .with("nonce", 1u64)
            .with("balance", 5u64);
        let unpacked = unpack_entry(&pack_entry(&v1).unwrap(), None).unwrap();
        assert_eq!(unpacked.version, Some(1));
        assert_eq!(unpacked.get_int("balance"), Some(5));
    }

    #[test]
    fn wrong_entry_tag_test() {
        let packed = pack_entry(&account(1)).unwrap();
        let err = unpack_entry(&packed, Some(EntryTag::Name)).unwrap_err();
        assert_eq!(err, Error::decode("Expected Name tag, got Account instead"));
    }

    #[test]
    fn poi_entry_test() {
        let (binary, first, _) = account_tree();
        let tree = MPTree::from_rlp(&binary, Encoding::AccountAddress, EntryTag::Account).unwrap();
        let poi = Params::new(EntryTag::TreesPoi)
            .with("accounts", vec![Value::Tree(tree)])
            .with("calls", Vec::<Value>::new())
            .with("channels", Vec::<Value>::new())
            .with("contracts", Vec::<Value>::new())
            .with("ns", Vec::<Value>::new())
            .with("oracles", Vec::<Value>::new());
        let packed = pack_entry(&poi).unwrap();
        assert!(packed.starts_with("pi_"));
        let unpacked = unpack_entry(&packed, None).unwrap();
        assert_eq!(unpacked.tag, EntryTag::TreesPoi.as_u64());
        let accounts = unpacked.get_list("accounts").unwrap();
        let tree = accounts[0].as_tree().unwrap();
        assert_eq!(tree.get(&first).unwrap().unwrap().get_int("balance"), Some(10));
    }

    #[test]
    fn state_trees_entry_test() {
        let key = encode(&[7u8; 32], Encoding::AccountAddress).unwrap();
        let mut accounts = BTreeMap::new();
        accounts.insert(key.clone(), Value::Record(account(42)));
        let empty = || Value::Map(BTreeMap::new());
        let trees = Params::new(EntryTag::StateTrees)
            .with("contracts", empty())
            .with("calls", empty())
            .with("channels", empty())
            .with("ns", empty())
            .with("oracles", empty())
            .with("accounts", Value::Map(accounts));
        let packed = pack_entry(&trees).unwrap();
        assert!(packed.starts_with("ss_"));
        let unpacked = unpack_entry(&packed, None).unwrap();
        assert_eq!(unpacked.version, Some(0));
        let accounts = unpacked.get("accounts").and_then(Value::as_map).unwrap();
        let record = accounts.get(&key).and_then(Value::as_record).unwrap();
        assert_eq!(record.get_int("balance"), Some(42));
        assert!(unpacked.get("contracts").and_then(Value::as_map).unwrap().is_empty());
    }

    #[test]
    fn off_chain_update_test() {
        let from = encode(&[1u8; 32], Encoding::AccountAddress).unwrap();
        let to = encode(&[2u8; 32], Encoding::AccountAddress).unwrap();
        let update = Params::new(EntryTag::ChannelOffChainUpdateTransfer)
            .with("from", from.as_str())
            .with("to", to.as_str())
            .with("amount", 10u64);
        let unpacked = unpack_entry(&pack_entry(&update).unwrap(), None).unwrap();
        assert_eq!(unpacked.tag, 570);
        assert_eq!(unpacked.get_str("to"), Some(to.as_str()));
    }

    fn call_contract_update() -> Params {
        Params::new(EntryTag::ChannelOffChainUpdateCallContract)
            .with("caller", encode(&[1u8; 32], Encoding::AccountAddress).unwrap())
            .with("contract", encode(&[9u8; 32], Encoding::ContractAddress).unwrap())
            .with("amount", 0u64)
            .with("callData", encode(&[0x2b], Encoding::ContractBytearray).unwrap())
            .with("callStack", Vec::<u8>::new())
    }

    #[test]
    fn call_contract_update_gas_limit_test() {
        let update = call_contract_update();
        let unpacked = unpack_entry(&pack_entry(&update).unwrap(), None).unwrap();
        assert_eq!(unpacked.get_int("gasLimit"), Some(DEFAULT_GAS_MAX));
        assert_eq!(unpacked.get_int("abiVersion"), Some(3));

        let update = call_contract_update().with("gasLimit", 25_000u64);
        let unpacked = unpack_entry(&pack_entry(&update).unwrap(), None).unwrap();
        assert_eq!(unpacked.get_int("gasLimit"), Some(25_000));

        let update = call_contract_update().with("gasLimit", DEFAULT_GAS_MAX + 1);
        assert_eq!(
            pack_entry(&update).unwrap_err().to_string(),
            "Gas limit 6000001 must be less or equal to 6000000"
        );
    }

    #[test]
    fn entry_tag_names_test() {
        assert_eq!(entry_tag_name(64), "MtreeValue");
        assert_eq!(entry_tag_name(1), "Unknown");
        assert_eq!(EntryTag::try_from(810u64), Ok(EntryTag::GaMetaTxAuthData));
    }
}
