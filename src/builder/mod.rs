//! Transaction builder.
//!
//! Transactions are described by [`Params`], a tag plus named field values,
//! and serialized according to the schema registered for their tag and
//! version. Fields with chain dependent defaults (fee, gas, nonce, ttl) are
//! filled either synchronously from the transaction itself or, through
//! [`build_tx_async`], from a node.

pub mod constants;
pub mod delegation;
pub mod entry;
pub mod fee;
pub mod field;
pub mod helpers;
pub mod mptree;
pub mod record;
pub mod schema;
pub mod value;

use std::convert::TryFrom;

use futures::future::try_join_all;
use tracing::{event, Level};

use crate::crypto::hash;
use crate::encoder::{decode_with, encode, Encoding};
use crate::errors::{Error, Result};
use crate::node::NodeApi;
use crate::rlp;

pub use constants::Tag;
pub use delegation::{pack_delegation, unpack_delegation, DelegationTag};
pub use entry::{pack_entry, unpack_entry, EntryTag};
pub use field::{BuildContext, BuildOptions, Prepared};
pub use helpers::build_contract_id;
pub use value::{Params, Value};

use helpers::read_int;
use schema::TX_REGISTRY;

/// Serialize a transaction with default options.
pub fn build_tx(params: &Params) -> Result<String> {
    build_tx_with(params, &BuildOptions::default())
}

pub fn build_tx_with(params: &Params, options: &BuildOptions) -> Result<String> {
    TX_REGISTRY.pack(params, options, Encoding::Transaction)
}

/// Serialize a transaction after filling the missing fee, gas price, nonce,
/// vm versions and relative ttl from the node.
pub async fn build_tx_async(
    params: &Params,
    node: &dyn NodeApi,
    options: &BuildOptions,
) -> Result<String> {
    let schema = TX_REGISTRY.get_schema(params.tag, params.version)?;
    let prepared = try_join_all(
        schema
            .fields
            .iter()
            .map(|(name, field)| field.prepare(name, params.get(name), params, node, options)),
    )
    .await?;

    let mut params = params.clone();
    let mut options = options.clone();
    for ((name, _), prepared) in schema.fields.iter().zip(prepared) {
        match prepared {
            Prepared::Keep => {}
            Prepared::Value(value) => params.set(name, value),
            Prepared::FeeGasPrice(gas_price) => {
                event!(Level::DEBUG, "scaling fee by node gas price {}", gas_price);
                options.fee_gas_price = Some(gas_price);
            }
        }
    }
    build_tx_with(&params, &options)
}

pub fn unpack_tx(encoded: &str, expected_tag: Option<Tag>) -> Result<Params> {
    TX_REGISTRY.unpack(encoded, expected_tag.map(|tag| tag.as_u64()))
}

/// `th_` hash of an encoded transaction.
pub fn build_tx_hash(tx: &str) -> Result<String> {
    encode(&hash(&decode_with(tx, Encoding::Transaction)?), Encoding::TxHash)
}

/// Address of the contract deployed by a (possibly signed) ContractCreateTx
/// or GaAttachTx.
pub fn build_contract_id_by_contract_tx(tx: &str) -> Result<String> {
    let mut params = unpack_tx(tx, None)?;
    if params.tag == Tag::SignedTx.as_u64() {
        params = params
            .get_record("encodedTx")
            .cloned()
            .ok_or_else(|| Error::decode("SignedTx without an inner transaction"))?;
    }
    match Tag::try_from(params.tag) {
        Ok(Tag::ContractCreateTx) | Ok(Tag::GaAttachTx) => {}
        _ => {
            return Err(Error::argument(
                "contract tx tag",
                "ContractCreateTx or GaAttachTx",
                constants::tx_tag_name(params.tag),
            ))
        }
    }
    let owner = params
        .get_str("ownerId")
        .ok_or_else(|| Error::argument("ownerId", "provided", "undefined"))?;
    let nonce = params
        .get_int("nonce")
        .ok_or_else(|| Error::argument("nonce", "provided", "undefined"))?;
    build_contract_id(owner, nonce)
}

/// Minimal fee of a transaction.
pub fn get_min_fee(params: &Params, options: &BuildOptions) -> Result<u128> {
    let ctx = BuildContext::new(options);
    fee::calculate_min_fee(|fee| ctx.rebuild(params, |ctx| ctx.computing_min_fee = Some(fee)))
}

/// Wrap a transaction into a SignedTx carrying `signatures`.
pub fn build_signed_tx(tx: &str, signatures: Vec<Vec<u8>>) -> Result<String> {
    let inner = decode_with(tx, Encoding::Transaction)?;
    let signed = Params::new(Tag::SignedTx)
        .with(
            "signatures",
            signatures.into_iter().map(Value::Bytes).collect::<Vec<Value>>(),
        )
        .with("encodedTx", inner);
    build_tx(&signed)
}

/// Signatures and the encoded inner transaction of a SignedTx. A bare
/// transaction yields no signatures.
pub fn split_signed_tx(tx: &str) -> Result<(Vec<Vec<u8>>, String)> {
    let raw = decode_with(tx, Encoding::Transaction)?;
    let items = rlp::decode(&raw)?.into_list()?;
    let tag = match items.first() {
        Some(item) => read_int(item.as_bytes()?)?,
        None => return Err(Error::argument("RLP length", "at least 2", 0)),
    };
    if tag != Tag::SignedTx.as_u64() as u128 {
        return Ok((vec![], tx.to_string()));
    }
    if items.len() != 4 {
        return Err(Error::argument("RLP length", 4, items.len()));
    }
    let signatures = items[2]
        .as_list()?
        .iter()
        .map(|signature| signature.as_bytes().map(|bytes| bytes.to_vec()))
        .collect::<Result<Vec<Vec<u8>>>>()?;
    Ok((signatures, encode(items[3].as_bytes()?, Encoding::Transaction)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::constants::MIN_GAS_PRICE;
    use crate::builder::field::ct_version_value;
    use crate::test_utilities::mocks::MockNode;

    fn account(byte: u8) -> String {
        encode(&[byte; 32], Encoding::AccountAddress).unwrap()
    }

    fn spend() -> Params {
        Params::new(Tag::SpendTx)
            .with("senderId", account(1))
            .with("recipientId", account(2))
            .with("amount", 1_000u64)
            .with("nonce", 3u64)
            .with("payload", "test")
    }

    #[test]
    fn spend_round_trip_test() {
        let tx = build_tx(&spend()).unwrap();
        assert!(tx.starts_with("tx_"));
        let unpacked = unpack_tx(&tx, Some(Tag::SpendTx)).unwrap();
        assert_eq!(unpacked.version, Some(1));
        assert_eq!(unpacked.get_str("senderId"), Some(account(1).as_str()));
        assert_eq!(unpacked.get_str("recipientId"), Some(account(2).as_str()));
        assert_eq!(unpacked.get_int("amount"), Some(1_000));
        assert_eq!(unpacked.get_int("nonce"), Some(3));
        assert_eq!(unpacked.get_int("ttl"), Some(0));
        assert_eq!(unpacked.get_str("payload"), Some("ba_dGVzdJVNWkk="));
        let min_fee = get_min_fee(&spend(), &BuildOptions::default()).unwrap();
        assert_eq!(unpacked.get_int("fee"), Some(min_fee));
        // building the unpacked params again gives the same transaction
        assert_eq!(build_tx(&unpacked).unwrap(), tx);
    }

    #[test]
    fn spend_fee_test() {
        let fee = get_min_fee(&spend(), &BuildOptions::default()).unwrap();
        assert_eq!(fee % MIN_GAS_PRICE, 0);
        assert!(fee > 15_000 * MIN_GAS_PRICE);
        let err = build_tx(&spend().with("fee", fee - 1)).unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
        assert!(build_tx(&spend().with("fee", fee + 1)).is_ok());
    }

    #[test]
    fn unknown_tag_test() {
        let err = build_tx(&Params::new(99u64)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transaction schema not implemented for tag Unknown (99) version default"
        );
        let err = build_tx(&spend().with_version(7)).unwrap_err();
        assert!(matches!(err, Error::SchemaNotFound { tag: 12, .. }));
    }

    #[test]
    fn wrong_expected_tag_test() {
        let tx = build_tx(&spend()).unwrap();
        let err = unpack_tx(&tx, Some(Tag::NameClaimTx)).unwrap_err();
        assert_eq!(err.to_string(), "Expected NameClaimTx tag, got SpendTx instead");
    }

    #[test]
    fn tx_hash_test() {
        let tx = build_tx(&spend()).unwrap();
        let tx_hash = build_tx_hash(&tx).unwrap();
        assert!(tx_hash.starts_with("th_"));
        assert_eq!(tx_hash, build_tx_hash(&tx).unwrap());
        assert_ne!(
            tx_hash,
            build_tx_hash(&build_tx(&spend().with("amount", 2u64)).unwrap()).unwrap()
        );
    }

    fn contract_create() -> Params {
        Params::new(Tag::ContractCreateTx)
            .with("ownerId", account(1))
            .with("nonce", 5u64)
            .with("code", encode(&[0xfe, 1, 2, 3], Encoding::ContractBytearray).unwrap())
            .with("ctVersion", ct_version_value(7, 3))
            .with("amount", 0u64)
            .with("callData", encode(&[0x2b, 0x11], Encoding::ContractBytearray).unwrap())
    }

    #[test]
    fn contract_create_test() {
        let tx = build_tx(&contract_create()).unwrap();
        let unpacked = unpack_tx(&tx, Some(Tag::ContractCreateTx)).unwrap();
        assert_eq!(unpacked.get("ctVersion"), Some(&ct_version_value(7, 3)));
        assert_eq!(unpacked.get_int("gasPrice"), Some(MIN_GAS_PRICE));
        assert_eq!(unpacked.get_int("deposit"), Some(0));
        let gas_limit = unpacked.get_int("gasLimit").unwrap();
        assert!(gas_limit < 6_000_000 && gas_limit > 5_000_000);
        assert_eq!(
            build_contract_id_by_contract_tx(&tx).unwrap(),
            build_contract_id(&account(1), 5).unwrap()
        );
    }

    #[test]
    fn gas_limit_above_max_test() {
        let err = build_tx(&contract_create().with("gasLimit", 7_000_000u64)).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Gas limit 7000000 must be less or equal to "));
    }

    #[test]
    fn contract_id_rejects_other_txs_test() {
        let tx = build_tx(&spend()).unwrap();
        assert_eq!(
            build_contract_id_by_contract_tx(&tx).unwrap_err().to_string(),
            "contract tx tag should be ContractCreateTx or GaAttachTx, got SpendTx instead"
        );
    }

    #[test]
    fn contract_call_test() {
        let call = Params::new(Tag::ContractCallTx)
            .with("callerId", account(1))
            .with("nonce", 2u64)
            .with("contractId", encode(&[9u8; 32], Encoding::ContractAddress).unwrap())
            .with("amount", 0u64)
            .with("gasLimit", 10_000u64)
            .with("callData", encode(&[0x2b], Encoding::ContractBytearray).unwrap());
        let unpacked = unpack_tx(&build_tx(&call).unwrap(), None).unwrap();
        assert_eq!(unpacked.get_int("abiVersion"), Some(3));
        assert_eq!(unpacked.get_int("gasLimit"), Some(10_000));
    }

    #[test]
    fn signed_tx_test() {
        let tx = build_tx(&spend()).unwrap();
        let signed = build_signed_tx(&tx, vec![vec![7u8; 64]]).unwrap();
        let unpacked = unpack_tx(&signed, Some(Tag::SignedTx)).unwrap();
        let inner = unpacked.get_record("encodedTx").unwrap();
        assert_eq!(inner.get_int("amount"), Some(1_000));
        let (signatures, inner_tx) = split_signed_tx(&signed).unwrap();
        assert_eq!(signatures, vec![vec![7u8; 64]]);
        assert_eq!(inner_tx, tx);
        assert_eq!(split_signed_tx(&tx).unwrap(), (vec![], tx));
    }

    #[test]
    fn paying_for_test() {
        let inner = build_signed_tx(&build_tx(&spend()).unwrap(), vec![vec![1u8; 64]]).unwrap();
        let paying_for = Params::new(Tag::PayingForTx)
            .with("payerId", account(3))
            .with("nonce", 1u64)
            .with("tx", unpack_tx(&inner, None).unwrap());
        let tx = build_tx(&paying_for).unwrap();
        let unpacked = unpack_tx(&tx, Some(Tag::PayingForTx)).unwrap();
        let signed = unpacked.get_record("tx").unwrap();
        assert_eq!(signed.tag, Tag::SignedTx.as_u64());
        assert_eq!(build_tx(&unpacked).unwrap(), tx);
    }

    #[test]
    fn name_claim_test() {
        let claim = Params::new(Tag::NameClaimTx)
            .with("accountId", account(1))
            .with("nonce", 1u64)
            .with("name", "averylongnameforatest.chain")
            .with("nameSalt", 42u64);
        let unpacked = unpack_tx(&build_tx(&claim).unwrap(), None).unwrap();
        assert_eq!(unpacked.version, Some(2));
        assert_eq!(
            unpacked.get_int("nameFee"),
            Some(helpers::minimum_name_fee("averylongnameforatest.chain").unwrap())
        );
        let err = build_tx(&claim.with("nameFee", 1u64)).unwrap_err();
        assert!(matches!(err, Error::InsufficientNameFee { provided: 1, .. }));
    }

    #[tokio::test]
    async fn oracle_response_nonce_uses_account_test() {
        let oracle = encode(&[4u8; 32], Encoding::OracleAddress).unwrap();
        let response = Params::new(Tag::OracleResponseTx)
            .with("oracleId", oracle)
            .with("queryId", encode(&[5u8; 32], Encoding::OracleQueryId).unwrap())
            .with("response", "yes");
        let node = MockNode::default().with_nonce(&account(4), 8);
        let tx = build_tx_async(&response, &node, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(unpack_tx(&tx, None).unwrap().get_int("nonce"), Some(8));
    }

    #[tokio::test]
    async fn build_tx_async_test() {
        let node = MockNode::default()
            .with_height(100)
            .with_nonce(&account(1), 6);
        let mut params = spend().with("ttl", 10u64);
        params.remove("nonce");
        let tx = build_tx_async(&params, &node, &BuildOptions::default())
            .await
            .unwrap();
        let unpacked = unpack_tx(&tx, None).unwrap();
        assert_eq!(unpacked.get_int("nonce"), Some(6));
        assert_eq!(unpacked.get_int("ttl"), Some(110));

        let absolute = BuildOptions {
            absolute_ttl: true,
            ..BuildOptions::default()
        };
        let tx = build_tx_async(&params, &node, &absolute).await.unwrap();
        assert_eq!(unpack_tx(&tx, None).unwrap().get_int("ttl"), Some(10));
    }

    #[tokio::test]
    async fn build_tx_async_gas_price_test() {
        let node = MockNode::default().with_gas_price(MIN_GAS_PRICE * 3);
        let min_fee = get_min_fee(&spend(), &BuildOptions::default()).unwrap();
        let tx = build_tx_async(&spend(), &node, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(unpack_tx(&tx, None).unwrap().get_int("fee"), Some(min_fee * 3));
    }

    #[tokio::test]
    async fn build_tx_async_protocol_test() {
        let node = MockNode::default().with_protocol(6);
        let mut params = contract_create();
        params.remove("ctVersion");
        let tx = build_tx_async(&params, &node, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(
            unpack_tx(&tx, None).unwrap().get("ctVersion"),
            Some(&ct_version_value(8, 3))
        );

        let node = MockNode::default().with_protocol(2);
        let err = build_tx_async(&params, &node, &BuildOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, Error::UnsupportedProtocol(2));
    }
}
