//! Co-signing of the transactions the node asks a participant for.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{event, Level};

use crate::builder::{build_signed_tx, split_signed_tx};
use crate::channel::connection::Connection;
use crate::errors::{Error, Result};

/// Error code reported to the node when a signer declines without one.
pub const GENERIC_REJECTION_CODE: i64 = 1;

/// Answer of a [`Signer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignResult {
    /// The signed transaction.
    Accepted(String),
    /// Declined with an error code the node passes on to the other party.
    Rejected(i64),
    RejectedGeneric,
}

/// What a signature is requested for, named after the `channels.sign.<tag>`
/// requests of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignTag {
    InitiatorSign,
    ResponderSign,
    Update,
    UpdateAck,
    DepositTx,
    DepositAck,
    WithdrawTx,
    WithdrawAck,
    ShutdownSign,
    ShutdownSignAck,
    CloseSoloSign,
    SlashTx,
    SettleSign,
    SnapshotSoloSign,
    ForceProgressTx,
    /// Not requested by the node: signs the ChannelClientReconnectTx.
    Reconnect,
}

const SIGN_TAGS: [(SignTag, &str); 16] = [
    (SignTag::InitiatorSign, "initiator_sign"),
    (SignTag::ResponderSign, "responder_sign"),
    (SignTag::Update, "update"),
    (SignTag::UpdateAck, "update_ack"),
    (SignTag::DepositTx, "deposit_tx"),
    (SignTag::DepositAck, "deposit_ack"),
    (SignTag::WithdrawTx, "withdraw_tx"),
    (SignTag::WithdrawAck, "withdraw_ack"),
    (SignTag::ShutdownSign, "shutdown_sign"),
    (SignTag::ShutdownSignAck, "shutdown_sign_ack"),
    (SignTag::CloseSoloSign, "close_solo_sign"),
    (SignTag::SlashTx, "slash_tx"),
    (SignTag::SettleSign, "settle_sign"),
    (SignTag::SnapshotSoloSign, "snapshot_solo_sign"),
    (SignTag::ForceProgressTx, "force_progress_tx"),
    (SignTag::Reconnect, "reconnect"),
];

impl SignTag {
    pub fn from_name(name: &str) -> Option<SignTag> {
        SIGN_TAGS
            .iter()
            .find(|(_, tag_name)| *tag_name == name)
            .map(|(tag, _)| *tag)
    }

    pub fn name(&self) -> &'static str {
        SIGN_TAGS
            .iter()
            .find(|(tag, _)| tag == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for SignTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Off-chain updates the transaction to sign would apply, as sent by the
/// node next to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignContext {
    pub updates: Vec<Value>,
}

impl SignContext {
    pub fn from_data(data: &Value) -> Self {
        SignContext {
            updates: data["updates"].as_array().cloned().unwrap_or_default(),
        }
    }

    /// Owner of the contract created by these updates, if any.
    pub fn new_contract_owner(&self) -> Option<&str> {
        self.updates
            .iter()
            .find(|update| update["op"].as_str() == Some("OffChainNewContract"))
            .and_then(|update| update["owner"].as_str())
    }
}

/// Verifies and signs channel transactions on behalf of a participant.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, tag: SignTag, tx: &str, context: &SignContext) -> SignResult;
}

#[async_trait]
impl<F, Fut> Signer for F
where
    F: Fn(SignTag, String, SignContext) -> Fut + Send + Sync,
    Fut: Future<Output = SignResult> + Send,
{
    async fn sign(&self, tag: SignTag, tx: &str, context: &SignContext) -> SignResult {
        self(tag, tx.to_string(), context.clone()).await
    }
}

/// Sign the transaction inside a SignedTx, keeping the signatures it
/// already carries.
pub async fn append_signature(
    tx: &str,
    signer: &dyn Signer,
    tag: SignTag,
    context: &SignContext,
) -> Result<SignResult> {
    let (mut signatures, inner) = split_signed_tx(tx)?;
    match signer.sign(tag, &inner, context).await {
        SignResult::Accepted(signed) => {
            let (added, signed_inner) = split_signed_tx(&signed)?;
            signatures.extend(added);
            Ok(SignResult::Accepted(build_signed_tx(&signed_inner, signatures)?))
        }
        rejected => Ok(rejected),
    }
}

/// Answer a signature request on `method`. Returns whether the signer
/// declined.
pub(crate) async fn sign_and_notify(
    connection: &Connection,
    method: &str,
    data: &Value,
    signer: &dyn Signer,
    tag: SignTag,
) -> Result<bool> {
    let context = SignContext::from_data(data);
    let (key, result) = if let Some(tx) = data["tx"].as_str() {
        ("tx", signer.sign(tag, tx, &context).await)
    } else if let Some(signed_tx) = data["signed_tx"].as_str() {
        (
            "signed_tx",
            append_signature(signed_tx, signer, tag, &context).await?,
        )
    } else {
        return Err(Error::Channel(String::from(
            "Can't find transaction in message",
        )));
    };
    let (params, is_error) = match result {
        SignResult::Accepted(signed) => (json!({ key: signed }), false),
        SignResult::Rejected(code) => (json!({ "error": code }), true),
        SignResult::RejectedGeneric => (json!({ "error": GENERIC_REJECTION_CODE }), true),
    };
    if is_error {
        event!(Level::INFO, "{} signature declined", tag);
    }
    connection.notify(method, params)?;
    Ok(is_error)
}
