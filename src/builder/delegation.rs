//! Delegation signatures, letting a contract act for an account on AENS
//! names and oracles.

use std::convert::TryFrom;

use macros::TryFromTag;

use crate::builder::field::{BuildOptions, FieldType::{self, *}};
use crate::builder::record::{Registry, Schema};
use crate::builder::value::Params;
use crate::encoder::Encoding;
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromTag)]
pub enum DelegationTag {
    /// All AENS names of an account.
    AensWildcard = 1,
    AensName = 2,
    AensPreclaim = 3,
    Oracle = 4,
    /// Response to one oracle query.
    OracleResponse = 5,
}

impl From<DelegationTag> for u64 {
    fn from(tag: DelegationTag) -> u64 {
        tag.as_u64()
    }
}

pub fn delegation_tag_name(tag: u64) -> String {
    DelegationTag::try_from(tag)
        .map(|tag| tag.name().to_string())
        .unwrap_or_else(|_| String::from("Unknown"))
}

const ACCOUNT: FieldType = Address(&[Encoding::AccountAddress]);
const CONTRACT: FieldType = Address(&[Encoding::ContractAddress]);

const fn delegation(
    tag: DelegationTag,
    fields: &'static [(&'static str, FieldType)],
) -> Schema {
    Schema {
        tag: tag as u64,
        version: 1,
        default: true,
        fields,
    }
}

pub static DELEGATION_SCHEMAS: &[Schema] = &[
    delegation(
        DelegationTag::AensWildcard,
        &[("accountAddress", ACCOUNT), ("contractAddress", CONTRACT)],
    ),
    delegation(
        DelegationTag::AensName,
        &[
            ("accountAddress", ACCOUNT),
            ("nameId", NameId),
            ("contractAddress", CONTRACT),
        ],
    ),
    delegation(
        DelegationTag::AensPreclaim,
        &[("accountAddress", ACCOUNT), ("contractAddress", CONTRACT)],
    ),
    delegation(
        DelegationTag::Oracle,
        &[("accountAddress", ACCOUNT), ("contractAddress", CONTRACT)],
    ),
    delegation(
        DelegationTag::OracleResponse,
        &[("queryId", QueryId), ("contractAddress", CONTRACT)],
    ),
];

pub static DELEGATION_REGISTRY: Registry = Registry {
    schemas: DELEGATION_SCHEMAS,
    tag_name: delegation_tag_name,
};

/// Serialize a delegation into the `ba_` form signed by the account.
pub fn pack_delegation(params: &Params) -> Result<String> {
    DELEGATION_REGISTRY.pack(params, &BuildOptions::default(), Encoding::ByteArray)
}

pub fn unpack_delegation(encoded: &str, expected_tag: Option<DelegationTag>) -> Result<Params> {
    DELEGATION_REGISTRY.unpack(encoded, expected_tag.map(|tag| tag.as_u64()))
}
