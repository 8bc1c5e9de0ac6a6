use macros::TryFromTag;
use std::convert::TryFrom;

pub const BASE_GAS: u128 = 15_000;
pub const GAS_PER_BYTE: u128 = 20;
pub const KEY_BLOCK_INTERVAL: u128 = 3;
pub const MIN_GAS_PRICE: u128 = 1_000_000_000;
pub const MAX_AUTH_FUN_GAS: u128 = 50_000;
pub const DEFAULT_GAS_MAX: u128 = 6_000_000;
/// Upper bound for a gas price suggested by the node, 600 ae per microblock.
pub const MAX_SAFE_GAS_PRICE: u128 = MIN_GAS_PRICE * 100_000;

pub const TX_TTL: u128 = 0;
pub const QUERY_FEE: u128 = 30_000;
pub const ORACLE_TTL_VALUE: u128 = 500;
pub const QUERY_TTL_VALUE: u128 = 10;
pub const RESPONSE_TTL_VALUE: u128 = 10;

pub const AENS_SUFFIX: &str = ".chain";
pub const NAME_FEE_MULTIPLIER: u128 = 100_000_000_000_000;
/// Bid increment in percent.
pub const NAME_FEE_BID_INCREMENT: u128 = 5;
pub const NAME_MAX_LENGTH_FEE: usize = 31;
pub const NAME_BID_MAX_LENGTH: usize = 12;

/// Fibonacci factors of the minimal name fee, indexed by label length - 1.
pub const NAME_BID_RANGES: [u128; 31] = [
    5_702_887, 3_524_578, 2_178_309, 1_346_269, 832_040, 514_229, 317_811, 196_418, 121_393,
    75_025, 46_368, 28_657, 17_711, 10_946, 6_765, 4_181, 2_584, 1_597, 987, 610, 377, 233, 144,
    89, 55, 34, 21, 13, 8, 5, 3,
];

/// Transaction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromTag)]
pub enum Tag {
    SignedTx = 11,
    SpendTx = 12,
    OracleRegisterTx = 22,
    OracleQueryTx = 23,
    OracleResponseTx = 24,
    OracleExtendTx = 25,
    NameClaimTx = 32,
    NamePreclaimTx = 33,
    NameUpdateTx = 34,
    NameRevokeTx = 35,
    NameTransferTx = 36,
    ContractCreateTx = 42,
    ContractCallTx = 43,
    ChannelCreateTx = 50,
    ChannelDepositTx = 51,
    ChannelWithdrawTx = 52,
    ChannelCloseMutualTx = 53,
    ChannelCloseSoloTx = 54,
    ChannelSlashTx = 55,
    ChannelSettleTx = 56,
    ChannelOffChainTx = 57,
    ChannelSnapshotSoloTx = 59,
    GaAttachTx = 80,
    GaMetaTx = 81,
    PayingForTx = 82,
    ChannelForceProgressTx = 521,
    ChannelClientReconnectTx = 575,
}

impl From<Tag> for u64 {
    fn from(tag: Tag) -> u64 {
        tag.as_u64()
    }
}

pub fn tx_tag_name(tag: u64) -> String {
    Tag::try_from(tag)
        .map(|tag| tag.name().to_string())
        .unwrap_or_else(|_| String::from("Unknown"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmVersion {
    NoVm = 0,
    Sophia = 1,
    SophiaImprovementsMinerva = 3,
    SophiaImprovementsFortuna = 4,
    Fate = 5,
    SophiaImprovementsLima = 6,
    Fate2 = 7,
    Fate3 = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiVersion {
    NoAbi = 0,
    Sophia = 1,
    Fate = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusProtocolVersion {
    Iris = 5,
    Ceres = 6,
}

impl TryFrom<u64> for ConsensusProtocolVersion {
    type Error = u64;

    fn try_from(version: u64) -> std::result::Result<Self, u64> {
        match version {
            5 => Ok(ConsensusProtocolVersion::Iris),
            6 => Ok(ConsensusProtocolVersion::Ceres),
            other => Err(other),
        }
    }
}

/// Ttl kinds used by oracles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleTtlType {
    Delta = 0,
    Block = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallReturnType {
    Ok = 0,
    Error = 1,
    Revert = 2,
}

/// Virtual machine and abi versions to use by default for a transaction
/// type under a consensus protocol. `None` for tags without a contract part.
pub fn protocol_vm_abi(
    protocol: ConsensusProtocolVersion,
    tag: Tag,
) -> Option<(Option<VmVersion>, AbiVersion)> {
    let vm = match protocol {
        ConsensusProtocolVersion::Iris => VmVersion::Fate2,
        ConsensusProtocolVersion::Ceres => VmVersion::Fate3,
    };
    match tag {
        Tag::ContractCreateTx | Tag::GaAttachTx => Some((Some(vm), AbiVersion::Fate)),
        Tag::ContractCallTx | Tag::GaMetaTx => Some((None, AbiVersion::Fate)),
        Tag::OracleRegisterTx => Some((None, AbiVersion::NoAbi)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_conversion_test() {
        assert_eq!(Tag::try_from(12u64), Ok(Tag::SpendTx));
        assert_eq!(Tag::try_from(575u64), Ok(Tag::ChannelClientReconnectTx));
        assert_eq!(Tag::try_from(13u64), Err(13));
        assert_eq!(Tag::ChannelForceProgressTx.as_u64(), 521);
        assert_eq!(tx_tag_name(43), "ContractCallTx");
        assert_eq!(tx_tag_name(1), "Unknown");
    }

    #[test]
    fn protocol_table_test() {
        assert_eq!(
            protocol_vm_abi(ConsensusProtocolVersion::Iris, Tag::ContractCreateTx),
            Some((Some(VmVersion::Fate2), AbiVersion::Fate))
        );
        assert_eq!(
            protocol_vm_abi(ConsensusProtocolVersion::Ceres, Tag::OracleRegisterTx),
            Some((None, AbiVersion::NoAbi))
        );
        assert_eq!(
            protocol_vm_abi(ConsensusProtocolVersion::Iris, Tag::SpendTx),
            None
        );
    }
}
