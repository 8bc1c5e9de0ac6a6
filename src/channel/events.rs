use std::fmt;

use crate::errors::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Accepted,
    HalfSigned,
    Signed,
    Open,
    Closing,
    Closed,
    Died,
    Disconnected,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Accepted => "accepted",
            ChannelStatus::HalfSigned => "halfSigned",
            ChannelStatus::Signed => "signed",
            ChannelStatus::Open => "open",
            ChannelStatus::Closing => "closing",
            ChannelStatus::Closed => "closed",
            ChannelStatus::Died => "died",
            ChannelStatus::Disconnected => "disconnected",
        };
        write!(f, "{}", name)
    }
}

/// Everything a channel reports to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Error(Error),
    StatusChanged(ChannelStatus),
    /// New co-signed off-chain state.
    StateChanged(String),
    /// Generic message from the other participant.
    Message(serde_json::Value),
    PeerDisconnected,
    ChannelReestablished,
    Open,
    OnChainTx {
        tx: String,
        info: Option<String>,
        kind: Option<String>,
    },
    OwnWithdrawLocked,
    WithdrawLocked,
    OwnDepositLocked,
    DepositLocked,
    /// Address of a contract created inside the channel.
    NewContract(String),
}

impl ChannelEvent {
    /// Event reported as is when the node sends `channels.info` with it.
    pub fn from_info(event: &str) -> Option<Self> {
        match event {
            "own_withdraw_locked" => Some(ChannelEvent::OwnWithdrawLocked),
            "withdraw_locked" => Some(ChannelEvent::WithdrawLocked),
            "own_deposit_locked" => Some(ChannelEvent::OwnDepositLocked),
            "deposit_locked" => Some(ChannelEvent::DepositLocked),
            "peer_disconnected" => Some(ChannelEvent::PeerDisconnected),
            "channel_reestablished" => Some(ChannelEvent::ChannelReestablished),
            "open" => Some(ChannelEvent::Open),
            _ => None,
        }
    }
}
