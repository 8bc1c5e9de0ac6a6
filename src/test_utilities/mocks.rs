use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::builder::{build_signed_tx, build_tx, build_tx_hash, Params, Tag};
use crate::channel::{SignContext, SignResult, SignTag, Signer};
use crate::encoder::{encode, Encoding};
use crate::errors::{Error, Result};
use crate::node::NodeApi;

pub fn make_mock_account(byte: u8) -> String {
    encode(&[byte; 32], Encoding::AccountAddress).unwrap()
}

pub fn make_mock_channel_id() -> String {
    encode(&[7u8; 32], Encoding::Channel).unwrap()
}

/// A signature that only has to look like one.
pub fn fake_signature(byte: u8) -> Vec<u8> {
    vec![byte; 64]
}

pub fn spend_tx() -> String {
    let params = Params::new(Tag::SpendTx)
        .with("senderId", make_mock_account(1))
        .with("recipientId", make_mock_account(2))
        .with("amount", 10u64)
        .with("nonce", 1u64)
        .with("payload", "test");
    build_tx(&params).unwrap()
}

/// Co-signed off-chain state of the mock channel at `round`.
pub fn make_mock_channel_state(round: u64) -> String {
    let params = Params::new(Tag::ChannelOffChainTx)
        .with("channelId", make_mock_channel_id())
        .with("round", round)
        .with("stateHash", encode(&[round as u8; 32], Encoding::State).unwrap());
    build_signed_tx(
        &build_tx(&params).unwrap(),
        vec![fake_signature(1), fake_signature(2)],
    )
    .unwrap()
}

/// Unsigned ChannelCreateTx between accounts 1 and 2.
pub fn make_mock_channel_create_tx() -> String {
    let params = Params::new(Tag::ChannelCreateTx)
        .with("initiator", make_mock_account(1))
        .with("initiatorAmount", 1_000u64)
        .with("responder", make_mock_account(2))
        .with("responderAmount", 1_000u64)
        .with("channelReserve", 10u64)
        .with("lockPeriod", 5u64)
        .with("stateHash", encode(&[0u8; 32], Encoding::State).unwrap())
        .with("nonce", 1u64);
    build_tx(&params).unwrap()
}

/// Signs everything with `fake_signature(byte)`.
pub struct AcceptingSigner {
    byte: u8,
    tags: Mutex<Vec<SignTag>>,
}

impl AcceptingSigner {
    pub fn new(byte: u8) -> Self {
        AcceptingSigner {
            byte,
            tags: Mutex::new(vec![]),
        }
    }

    /// Tags of the requests signed so far.
    pub fn signed_tags(&self) -> Vec<SignTag> {
        self.tags.lock().unwrap().clone()
    }
}

#[async_trait]
impl Signer for AcceptingSigner {
    async fn sign(&self, tag: SignTag, tx: &str, _context: &SignContext) -> SignResult {
        self.tags.lock().unwrap().push(tag);
        match build_signed_tx(tx, vec![fake_signature(self.byte)]) {
            Ok(signed) => SignResult::Accepted(signed),
            Err(_) => SignResult::RejectedGeneric,
        }
    }
}

/// Declines everything, with the given code if any.
pub struct RejectingSigner(pub Option<i64>);

#[async_trait]
impl Signer for RejectingSigner {
    async fn sign(&self, _tag: SignTag, _tx: &str, _context: &SignContext) -> SignResult {
        match self.0 {
            Some(code) => SignResult::Rejected(code),
            None => SignResult::RejectedGeneric,
        }
    }
}

/// Node with fixed answers. Accounts without a configured nonce are
/// unknown to it.
pub struct MockNode {
    protocol: u64,
    height: u64,
    gas_price: u128,
    nonces: HashMap<String, u64>,
    posted: Mutex<Vec<String>>,
}

impl Default for MockNode {
    fn default() -> Self {
        MockNode {
            protocol: 5,
            height: 1,
            gas_price: 0,
            nonces: HashMap::new(),
            posted: Mutex::new(vec![]),
        }
    }
}

impl MockNode {
    pub fn with_nonce(mut self, account: &str, next_nonce: u64) -> Self {
        self.nonces.insert(account.to_string(), next_nonce);
        self
    }

    pub fn with_height(mut self, height: u64) -> Self {
        self.height = height;
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn with_protocol(mut self, protocol: u64) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn posted(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeApi for MockNode {
    async fn protocol_version(&self) -> Result<u64> {
        Ok(self.protocol)
    }

    async fn height(&self) -> Result<u64> {
        Ok(self.height)
    }

    async fn next_nonce(&self, account: &str) -> Result<u64> {
        self.nonces
            .get(account)
            .copied()
            .ok_or_else(|| Error::Node(format!("Account not found: {}", account)))
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(self.gas_price)
    }

    async fn post_transaction(&self, tx: &str) -> Result<String> {
        self.posted.lock().unwrap().push(tx.to_string());
        build_tx_hash(tx)
    }
}
