//! Fee and gas limit resolution.
//!
//! The minimal fee depends on the size of the transaction, which depends on
//! the fee itself. It is found by rebuilding the transaction until the fee
//! stops changing. The default gas limit is found the same way.

use std::convert::TryFrom;

use crate::builder::constants::{
    Tag, BASE_GAS, GAS_PER_BYTE, KEY_BLOCK_INTERVAL, MAX_AUTH_FUN_GAS, MIN_GAS_PRICE,
};
use crate::builder::field::BuildContext;
use crate::builder::schema::TX_REGISTRY;
use crate::builder::value::Params;
use crate::errors::{Error, Result};
use crate::rlp;

/// Gas every transaction of a type pays regardless of its size.
pub fn base_gas(tag: Tag) -> u128 {
    match tag {
        Tag::ChannelForceProgressTx => 30 * BASE_GAS,
        Tag::ChannelOffChainTx => 0,
        Tag::ContractCreateTx | Tag::GaAttachTx | Tag::GaMetaTx => 5 * BASE_GAS,
        Tag::ContractCallTx => 12 * BASE_GAS,
        Tag::PayingForTx => BASE_GAS / 5,
        _ => BASE_GAS,
    }
}

/// Size dependent gas. Oracles also pay for the time they occupy the state.
pub fn other_gas(tag: Tag, size: u128, relative_ttl: u128, inner_size: u128) -> u128 {
    match tag {
        Tag::OracleRegisterTx
        | Tag::OracleExtendTx
        | Tag::OracleQueryTx
        | Tag::OracleResponseTx => {
            let blocks_per_year = (60 * 24 * 365) / KEY_BLOCK_INTERVAL;
            size * GAS_PER_BYTE + (32_000 * relative_ttl + blocks_per_year - 1) / blocks_per_year
        }
        Tag::GaMetaTx | Tag::PayingForTx => size.saturating_sub(inner_size) * GAS_PER_BYTE,
        _ => size * GAS_PER_BYTE,
    }
}

fn relative_ttl(tag: Tag, params: &Params) -> u128 {
    let key = match tag {
        Tag::OracleRegisterTx | Tag::OracleExtendTx => "oracleTtlValue",
        Tag::OracleQueryTx => "queryTtlValue",
        Tag::OracleResponseTx => "responseTtlValue",
        _ => return 1,
    };
    params.get_int(key).unwrap_or(1)
}

/// Size of the transaction wrapped by a GaMetaTx or PayingForTx. The
/// wrapper is the last element and holds a SignedTx; only its `encodedTx`
/// counts, the signatures are paid for by the outer transaction.
fn inner_tx_size(raw: &[u8]) -> Result<u128> {
    let items = rlp::decode(raw)?.into_list()?;
    let signed = match items.last() {
        Some(signed) => signed.as_bytes()?,
        None => return Ok(0),
    };
    let signed_items = rlp::decode(signed)?.into_list()?;
    match signed_items.get(3) {
        Some(encoded_tx) => Ok(encoded_tx.as_bytes()?.len() as u128),
        None => Err(Error::decode("Expected a SignedTx inside the transaction")),
    }
}

/// Gas consumed by a serialized transaction.
pub fn build_gas(raw: &[u8]) -> Result<u128> {
    let params = TX_REGISTRY.deserialize(raw, None)?;
    let tag = Tag::try_from(params.tag)
        .map_err(|tag| Error::argument("transaction tag", "a known tag", tag))?;
    let inner_size = match tag {
        Tag::GaMetaTx | Tag::PayingForTx => inner_tx_size(raw)?,
        _ => 0,
    };
    Ok(base_gas(tag)
        + other_gas(
            tag,
            raw.len() as u128,
            relative_ttl(tag, &params),
            inner_size,
        ))
}

/// Smallest fee covering the gas of the transaction built with that fee.
pub fn calculate_min_fee(rebuild: impl Fn(u128) -> Result<Vec<u8>>) -> Result<u128> {
    let mut fee = 0;
    loop {
        let previous = fee;
        fee = MIN_GAS_PRICE * build_gas(&rebuild(fee)?)?;
        if fee == previous {
            return Ok(fee);
        }
    }
}

pub fn serialize_fee(value: Option<u128>, params: &Params, ctx: &BuildContext) -> Result<u128> {
    if let Some(fee) = ctx.computing_min_fee {
        return Ok(fee);
    }
    let min_fee = calculate_min_fee(|fee| {
        ctx.rebuild(params, |ctx| ctx.computing_min_fee = Some(fee))
    })?;
    let fee = match (value, ctx.options.fee_gas_price) {
        (Some(fee), _) => fee,
        (None, Some(gas_price)) => min_fee / MIN_GAS_PRICE * gas_price,
        (None, None) => min_fee,
    };
    if fee < min_fee {
        if ctx.can_increase_fee {
            return Ok(min_fee);
        }
        return Err(Error::IllegalArgument(format!(
            "Fee {} must be bigger than {}",
            fee, min_fee
        )));
    }
    Ok(fee)
}

pub fn serialize_gas_price(value: Option<u128>) -> Result<u128> {
    let gas_price = value.unwrap_or(MIN_GAS_PRICE);
    if gas_price < MIN_GAS_PRICE {
        return Err(Error::IllegalArgument(format!(
            "Gas price {} must be bigger than {}",
            gas_price, MIN_GAS_PRICE
        )));
    }
    Ok(gas_price)
}

pub fn serialize_gas_limit(
    value: Option<u128>,
    params: &Params,
    ctx: &BuildContext,
) -> Result<u128> {
    if let Some(gas_limit) = ctx.computing_gas_limit {
        return Ok(gas_limit);
    }
    let gas_max = ctx.options.gas_max;
    let max = if params.tag == Tag::GaMetaTx.as_u64() {
        MAX_AUTH_FUN_GAS
    } else if Tag::try_from(params.tag).is_err() {
        // off-chain contract calls pay no fee of their own
        gas_max
    } else {
        let raw = ctx.rebuild(params, |ctx| {
            ctx.computing_gas_limit = Some(gas_max);
            ctx.can_increase_fee = true;
        })?;
        gas_max.saturating_sub(build_gas(&raw)?)
    };
    let gas_limit = value.unwrap_or(max);
    if gas_limit > max {
        return Err(Error::IllegalArgument(format!(
            "Gas limit {} must be less or equal to {}",
            gas_limit, max
        )));
    }
    Ok(gas_limit)
}

/// Fee recorded in a serialized transaction.
pub fn fee_of(raw: &[u8]) -> Result<u128> {
    let params = TX_REGISTRY.deserialize(raw, None)?;
    params
        .get_int("fee")
        .ok_or_else(|| Error::argument("fee", "present", "undefined"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::field::BuildOptions;
    use crate::builder::value::Params;
    use crate::builder::{build_signed_tx, build_tx, unpack_tx};
    use crate::encoder::{decode, encode, Encoding};

    fn spend() -> Params {
        Params::new(Tag::SpendTx)
            .with("senderId", encode(&[1u8; 32], Encoding::AccountAddress).unwrap())
            .with("recipientId", encode(&[2u8; 32], Encoding::AccountAddress).unwrap())
            .with("amount", 100u64)
            .with("nonce", 1u64)
    }

    fn account(byte: u8) -> String {
        encode(&[byte; 32], Encoding::AccountAddress).unwrap()
    }

    /// A signed spend and the size of the spend inside it.
    fn signed_spend(signatures: Vec<Vec<u8>>) -> (Params, u128) {
        let spend_tx = build_tx(&spend()).unwrap();
        let spend_size = decode(&spend_tx).unwrap().len() as u128;
        let signed = build_signed_tx(&spend_tx, signatures).unwrap();
        (unpack_tx(&signed, None).unwrap(), spend_size)
    }

    fn ga_meta(inner: Params) -> Params {
        Params::new(Tag::GaMetaTx)
            .with("gaId", account(5))
            .with("authData", encode(&[0x2b, 0x11], Encoding::ContractBytearray).unwrap())
            .with("gasLimit", 30_000u64)
            .with("tx", inner)
    }

    #[test]
    fn base_gas_test() {
        assert_eq!(base_gas(Tag::SpendTx), 15_000);
        assert_eq!(base_gas(Tag::ContractCallTx), 180_000);
        assert_eq!(base_gas(Tag::PayingForTx), 3_000);
        assert_eq!(base_gas(Tag::ChannelOffChainTx), 0);
    }

    #[test]
    fn oracle_gas_test() {
        // ceil(32000 * 12 / 175200) = 3
        assert_eq!(other_gas(Tag::OracleResponseTx, 10, 12, 0), 10 * 20 + 3);
        assert_eq!(other_gas(Tag::PayingForTx, 100, 1, 60), 40 * 20);
    }

    #[test]
    fn min_fee_is_a_fixed_point_test() {
        let options = BuildOptions::default();
        let ctx = BuildContext::new(&options);
        let params = spend();
        let min_fee = serialize_fee(None, &params, &ctx).unwrap();
        assert_eq!(min_fee % MIN_GAS_PRICE, 0);
        let with_fee = params.clone().with("fee", min_fee);
        let raw = TX_REGISTRY.serialize(&with_fee, &ctx).unwrap();
        assert_eq!(fee_of(&raw).unwrap(), min_fee);
        assert_eq!(MIN_GAS_PRICE * build_gas(&raw).unwrap(), min_fee);
        assert_eq!(serialize_fee(Some(min_fee), &params, &ctx).unwrap(), min_fee);
    }

    #[test]
    fn smaller_fee_test() {
        let options = BuildOptions::default();
        let ctx = BuildContext::new(&options);
        let params = spend();
        let min_fee = serialize_fee(None, &params, &ctx).unwrap();
        let err = serialize_fee(Some(min_fee - 1), &params, &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Fee {} must be bigger than {}", min_fee - 1, min_fee)
        );

        let increasing = BuildOptions {
            can_increase_fee: true,
            ..BuildOptions::default()
        };
        let ctx = BuildContext::new(&increasing);
        assert_eq!(serialize_fee(Some(1), &params, &ctx).unwrap(), min_fee);
    }

    #[test]
    fn fee_gas_price_scales_min_fee_test() {
        let params = spend();
        let options = BuildOptions::default();
        let min_fee = serialize_fee(None, &params, &BuildContext::new(&options)).unwrap();
        let scaled = BuildOptions {
            fee_gas_price: Some(MIN_GAS_PRICE * 2),
            ..BuildOptions::default()
        };
        let fee = serialize_fee(None, &params, &BuildContext::new(&scaled)).unwrap();
        assert_eq!(fee, min_fee * 2);
    }

    #[test]
    fn gas_price_test() {
        assert_eq!(serialize_gas_price(None).unwrap(), MIN_GAS_PRICE);
        assert_eq!(
            serialize_gas_price(Some(10)).unwrap_err().to_string(),
            "Gas price 10 must be bigger than 1000000000"
        );
    }

    #[test]
    fn paying_for_fee_excludes_inner_tx_test() {
        let options = BuildOptions::default();
        let ctx = BuildContext::new(&options);
        let (inner, spend_size) = signed_spend(vec![vec![1u8; 64]]);
        let params = Params::new(Tag::PayingForTx)
            .with("payerId", account(3))
            .with("nonce", 1u64)
            .with("tx", inner);
        let min_fee = serialize_fee(None, &params, &ctx).unwrap();
        let raw = TX_REGISTRY
            .serialize(&params.with("fee", min_fee), &ctx)
            .unwrap();
        // the signature and the SignedTx wrapper are paid by the payer
        let gas = base_gas(Tag::PayingForTx) + (raw.len() as u128 - spend_size) * GAS_PER_BYTE;
        assert_eq!(build_gas(&raw).unwrap(), gas);
        assert_eq!(min_fee, MIN_GAS_PRICE * gas);
        assert_eq!(fee_of(&raw).unwrap(), min_fee);
    }

    #[test]
    fn ga_meta_fee_excludes_inner_tx_test() {
        let options = BuildOptions::default();
        let ctx = BuildContext::new(&options);
        let (inner, spend_size) = signed_spend(vec![]);
        let params = ga_meta(inner);
        let min_fee = serialize_fee(None, &params, &ctx).unwrap();
        let raw = TX_REGISTRY
            .serialize(&params.with("fee", min_fee), &ctx)
            .unwrap();
        let gas = base_gas(Tag::GaMetaTx) + (raw.len() as u128 - spend_size) * GAS_PER_BYTE;
        assert_eq!(build_gas(&raw).unwrap(), gas);
        assert_eq!(min_fee, MIN_GAS_PRICE * gas);
    }

    #[test]
    fn ga_meta_gas_limit_is_capped_test() {
        let options = BuildOptions::default();
        let ctx = BuildContext::new(&options);
        let (inner, _) = signed_spend(vec![]);
        let params = ga_meta(inner);
        assert_eq!(
            serialize_gas_limit(None, &params, &ctx).unwrap(),
            MAX_AUTH_FUN_GAS
        );
        assert_eq!(
            serialize_gas_limit(Some(MAX_AUTH_FUN_GAS), &params, &ctx).unwrap(),
            MAX_AUTH_FUN_GAS
        );
        assert_eq!(
            serialize_gas_limit(Some(MAX_AUTH_FUN_GAS + 1), &params, &ctx)
                .unwrap_err()
                .to_string(),
            "Gas limit 50001 must be less or equal to 50000"
        );
    }

    #[test]
    fn contract_call_min_fee_is_a_fixed_point_test() {
        let options = BuildOptions::default();
        let ctx = BuildContext::new(&options);
        let params = Params::new(Tag::ContractCallTx)
            .with("callerId", account(1))
            .with("nonce", 2u64)
            .with("contractId", encode(&[9u8; 32], Encoding::ContractAddress).unwrap())
            .with("amount", 0u64)
            .with("gasLimit", 10_000u64)
            .with("callData", encode(&[0x2b; 40], Encoding::ContractBytearray).unwrap());
        let min_fee = serialize_fee(None, &params, &ctx).unwrap();
        let raw = TX_REGISTRY
            .serialize(&params.clone().with("fee", min_fee), &ctx)
            .unwrap();
        assert_eq!(
            build_gas(&raw).unwrap(),
            base_gas(Tag::ContractCallTx) + raw.len() as u128 * GAS_PER_BYTE
        );
        assert_eq!(MIN_GAS_PRICE * build_gas(&raw).unwrap(), min_fee);
        assert!(serialize_fee(Some(min_fee - 1), &params, &ctx).is_err());
    }
}
