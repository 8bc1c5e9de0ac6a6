//! Binary layouts of every transaction type, keyed by (tag, version).

use crate::builder::constants::{
    tx_tag_name, Tag, ORACLE_TTL_VALUE, QUERY_FEE, QUERY_TTL_VALUE, RESPONSE_TTL_VALUE,
};
use crate::builder::field::FieldType::{self, *};
use crate::builder::record::{Registry, Schema};
use crate::encoder::Encoding;

const AK: &[Encoding] = &[Encoding::AccountAddress];
const AK_NM: &[Encoding] = &[Encoding::AccountAddress, Encoding::Name];
const OK: &[Encoding] = &[Encoding::OracleAddress];
const OK_NM: &[Encoding] = &[Encoding::OracleAddress, Encoding::Name];
const CT_NM: &[Encoding] = &[Encoding::ContractAddress, Encoding::Name];
const CH: &[Encoding] = &[Encoding::Channel];
const CM: &[Encoding] = &[Encoding::Commitment];
const ANY_ID: &[Encoding] = &[
    Encoding::AccountAddress,
    Encoding::Name,
    Encoding::Commitment,
    Encoding::OracleAddress,
    Encoding::ContractAddress,
    Encoding::Channel,
];

const COIN: FieldType = UIntDefault(0);
const TTL_TYPE: FieldType = Enumeration {
    max: 1,
    default: Some(0),
};
const CONTRACT_BYTES: FieldType = Encoded(Encoding::ContractBytearray);

const fn schema(
    tag: Tag,
    version: u64,
    fields: &'static [(&'static str, FieldType)],
) -> Schema {
    Schema {
        tag: tag as u64,
        version,
        default: true,
        fields,
    }
}

pub static TX_SCHEMAS: &[Schema] = &[
    schema(
        Tag::SignedTx,
        1,
        &[
            ("signatures", Array(&Raw)),
            ("encodedTx", Transaction(None)),
        ],
    ),
    schema(
        Tag::SpendTx,
        1,
        &[
            ("senderId", Address(AK)),
            ("recipientId", Address(AK_NM)),
            ("amount", COIN),
            ("fee", Fee),
            ("ttl", Ttl),
            ("nonce", Nonce("senderId")),
            ("payload", Payload),
        ],
    ),
    schema(
        Tag::NamePreclaimTx,
        1,
        &[
            ("accountId", Address(AK)),
            ("nonce", Nonce("accountId")),
            ("commitmentId", Address(CM)),
            ("fee", Fee),
            ("ttl", Ttl),
        ],
    ),
    schema(
        Tag::NameClaimTx,
        2,
        &[
            ("accountId", Address(AK)),
            ("nonce", Nonce("accountId")),
            ("name", Name),
            ("nameSalt", UInt),
            ("nameFee", NameFee),
            ("fee", Fee),
            ("ttl", Ttl),
        ],
    ),
    schema(
        Tag::NameUpdateTx,
        1,
        &[
            ("accountId", Address(AK)),
            ("nonce", Nonce("accountId")),
            ("nameId", NameId),
            ("nameTtl", UInt),
            ("pointers", Pointers),
            ("clientTtl", UInt),
            ("fee", Fee),
            ("ttl", Ttl),
        ],
    ),
    schema(
        Tag::NameTransferTx,
        1,
        &[
            ("accountId", Address(AK)),
            ("nonce", Nonce("accountId")),
            ("nameId", NameId),
            ("recipientId", Address(AK_NM)),
            ("fee", Fee),
            ("ttl", Ttl),
        ],
    ),
    schema(
        Tag::NameRevokeTx,
        1,
        &[
            ("accountId", Address(AK)),
            ("nonce", Nonce("accountId")),
            ("nameId", NameId),
            ("fee", Fee),
            ("ttl", Ttl),
        ],
    ),
    schema(
        Tag::ContractCreateTx,
        1,
        &[
            ("ownerId", Address(AK)),
            ("nonce", Nonce("ownerId")),
            ("code", CONTRACT_BYTES),
            ("ctVersion", CtVersion),
            ("fee", Fee),
            ("ttl", Ttl),
            ("deposit", Deposit),
            ("amount", COIN),
            ("gasLimit", GasLimit),
            ("gasPrice", GasPrice),
            ("callData", CONTRACT_BYTES),
        ],
    ),
    schema(
        Tag::ContractCallTx,
        1,
        &[
            ("callerId", Address(AK)),
            ("nonce", Nonce("callerId")),
            ("contractId", Address(CT_NM)),
            ("abiVersion", AbiVersion),
            ("fee", Fee),
            ("ttl", Ttl),
            ("amount", COIN),
            ("gasLimit", GasLimit),
            ("gasPrice", GasPrice),
            ("callData", CONTRACT_BYTES),
        ],
    ),
    schema(
        Tag::OracleRegisterTx,
        1,
        &[
            ("accountId", Address(AK)),
            ("nonce", Nonce("accountId")),
            ("queryFormat", Str),
            ("responseFormat", Str),
            ("queryFee", UIntDefault(QUERY_FEE)),
            ("oracleTtlType", TTL_TYPE),
            ("oracleTtlValue", UIntDefault(ORACLE_TTL_VALUE)),
            ("fee", Fee),
            ("ttl", Ttl),
            ("abiVersion", AbiVersion),
        ],
    ),
    schema(
        Tag::OracleExtendTx,
        1,
        &[
            ("oracleId", Address(OK_NM)),
            ("nonce", Nonce("oracleId")),
            ("oracleTtlType", TTL_TYPE),
            ("oracleTtlValue", UIntDefault(ORACLE_TTL_VALUE)),
            ("fee", Fee),
            ("ttl", Ttl),
        ],
    ),
    schema(
        Tag::OracleQueryTx,
        1,
        &[
            ("senderId", Address(AK)),
            ("nonce", Nonce("senderId")),
            ("oracleId", Address(OK_NM)),
            ("query", Str),
            ("queryFee", UIntDefault(QUERY_FEE)),
            ("queryTtlType", TTL_TYPE),
            ("queryTtlValue", UIntDefault(QUERY_TTL_VALUE)),
            ("responseTtlType", TTL_TYPE),
            ("responseTtlValue", UIntDefault(RESPONSE_TTL_VALUE)),
            ("fee", Fee),
            ("ttl", Ttl),
        ],
    ),
    schema(
        Tag::OracleResponseTx,
        1,
        &[
            ("oracleId", Address(OK)),
            ("nonce", Nonce("oracleId")),
            ("queryId", Encoded(Encoding::OracleQueryId)),
            ("response", Str),
            ("responseTtlType", TTL_TYPE),
            ("responseTtlValue", UIntDefault(RESPONSE_TTL_VALUE)),
            ("fee", Fee),
            ("ttl", Ttl),
        ],
    ),
    schema(
        Tag::ChannelCreateTx,
        2,
        &[
            ("initiator", Address(AK)),
            ("initiatorAmount", UInt),
            ("responder", Address(AK)),
            ("responderAmount", UInt),
            ("channelReserve", UInt),
            ("lockPeriod", UInt),
            ("ttl", Ttl),
            ("fee", Fee),
            ("initiatorDelegateIds", Array(&Address(ANY_ID))),
            ("responderDelegateIds", Array(&Address(ANY_ID))),
            ("stateHash", Encoded(Encoding::State)),
            ("nonce", Nonce("initiator")),
        ],
    ),
    schema(
        Tag::ChannelCloseMutualTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("fromId", Address(AK)),
            ("initiatorAmountFinal", UInt),
            ("responderAmountFinal", UInt),
            ("ttl", Ttl),
            ("fee", Fee),
            ("nonce", Nonce("fromId")),
        ],
    ),
    schema(
        Tag::ChannelCloseSoloTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("fromId", Address(AK)),
            ("payload", Encoded(Encoding::Transaction)),
            ("poi", Encoded(Encoding::Poi)),
            ("ttl", Ttl),
            ("fee", Fee),
            ("nonce", Nonce("fromId")),
        ],
    ),
    schema(
        Tag::ChannelSlashTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("fromId", Address(AK)),
            ("payload", Encoded(Encoding::Transaction)),
            ("poi", Encoded(Encoding::Poi)),
            ("ttl", Ttl),
            ("fee", Fee),
            ("nonce", Nonce("fromId")),
        ],
    ),
    schema(
        Tag::ChannelDepositTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("fromId", Address(AK)),
            ("amount", UInt),
            ("ttl", Ttl),
            ("fee", Fee),
            ("stateHash", Encoded(Encoding::State)),
            ("round", UInt),
            ("nonce", Nonce("fromId")),
        ],
    ),
    schema(
        Tag::ChannelWithdrawTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("toId", Address(AK)),
            ("amount", UInt),
            ("ttl", Ttl),
            ("fee", Fee),
            ("stateHash", Encoded(Encoding::State)),
            ("round", UInt),
            ("nonce", Nonce("toId")),
        ],
    ),
    schema(
        Tag::ChannelSettleTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("fromId", Address(AK)),
            ("initiatorAmountFinal", UInt),
            ("responderAmountFinal", UInt),
            ("ttl", Ttl),
            ("fee", Fee),
            ("nonce", Nonce("fromId")),
        ],
    ),
    schema(
        Tag::ChannelForceProgressTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("fromId", Address(AK)),
            ("payload", Encoded(Encoding::Transaction)),
            ("round", UInt),
            ("update", CONTRACT_BYTES),
            ("stateHash", Encoded(Encoding::State)),
            ("offChainTrees", Encoded(Encoding::StateTrees)),
            ("ttl", Ttl),
            ("fee", Fee),
            ("nonce", Nonce("fromId")),
        ],
    ),
    schema(
        Tag::ChannelOffChainTx,
        2,
        &[
            ("channelId", Address(CH)),
            ("round", UInt),
            ("stateHash", Encoded(Encoding::State)),
        ],
    ),
    schema(
        Tag::ChannelSnapshotSoloTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("fromId", Address(AK)),
            ("payload", Encoded(Encoding::Transaction)),
            ("ttl", Ttl),
            ("fee", Fee),
            ("nonce", Nonce("fromId")),
        ],
    ),
    schema(
        Tag::ChannelClientReconnectTx,
        1,
        &[
            ("channelId", Address(CH)),
            ("round", UInt),
            ("role", Str),
            ("pubkey", Address(AK)),
        ],
    ),
    schema(
        Tag::GaAttachTx,
        1,
        &[
            ("ownerId", Address(AK)),
            ("nonce", Nonce("ownerId")),
            ("code", CONTRACT_BYTES),
            ("authFun", Raw),
            ("ctVersion", CtVersion),
            ("fee", Fee),
            ("ttl", Ttl),
            ("gasLimit", GasLimit),
            ("gasPrice", GasPrice),
            ("callData", CONTRACT_BYTES),
        ],
    ),
    schema(
        Tag::GaMetaTx,
        2,
        &[
            ("gaId", Address(AK)),
            ("authData", CONTRACT_BYTES),
            ("abiVersion", AbiVersion),
            ("fee", Fee),
            ("gasLimit", GasLimit),
            ("gasPrice", GasPrice),
            ("tx", Transaction(Some(Tag::SignedTx))),
        ],
    ),
    schema(
        Tag::PayingForTx,
        1,
        &[
            ("payerId", Address(AK)),
            ("nonce", Nonce("payerId")),
            ("fee", Fee),
            ("tx", Transaction(Some(Tag::SignedTx))),
        ],
    ),
];

pub static TX_REGISTRY: Registry = Registry {
    schemas: TX_SCHEMAS,
    tag_name: tx_tag_name,
};
