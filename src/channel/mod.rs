//! State channel client.
//!
//! A [`Channel`] talks JSON-RPC to the channel websocket endpoint of a node.
//! The node drives the channel protocol with the other participant; the
//! client answers its signature requests and starts off-chain updates.
//!
//! Three tasks serve one channel: the socket reader (routing call replies
//! and pushed frames), the socket writer, and the state machine in
//! [`driver`]. Operations are queued to the state machine and resolve once
//! the protocol reaches their outcome.

pub mod connection;
pub mod driver;
pub mod events;
pub mod handlers;
pub mod message;
pub mod options;
pub mod signer;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::sleep;
use tracing::{event, Level};

use crate::builder::{build_tx, unpack_entry, unpack_tx, EntryTag, Params, Tag};
use crate::errors::{Error, Result};

pub use connection::Connection;
pub use driver::{ActionCallbacks, LeaveResult, OnChainAction, UpdateResult};
pub use events::{ChannelEvent, ChannelStatus};
pub use options::{ChannelOptions, Role, Timing};
pub use signer::{append_signature, SignContext, SignResult, SignTag, Signer};

use driver::{Action, Driver, DriverInput, Fsm, Handler, PendingState, Responder};

/// Events buffered for a subscriber that falls behind.
const EVENT_CAPACITY: usize = 1024;
/// Gas limit of a forced progress when none is given.
pub const FORCE_PROGRESS_GAS_LIMIT: u128 = 1_000_000;

/// Off-chain state as reported by the node.
#[derive(Debug, Clone, PartialEq)]
pub struct OffChainState {
    pub calls: Params,
    pub half_signed_tx: Option<Params>,
    pub signed_tx: Option<Params>,
    pub trees: Params,
}

/// A contract deployment inside the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCreate {
    pub code: String,
    pub call_data: String,
    pub deposit: u128,
    pub vm_version: u64,
    pub abi_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub amount: u128,
    pub call_data: String,
    pub contract: String,
    pub abi_version: u64,
}

/// Result of a contract call kept in the channel state.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CallObject {
    pub caller_id: String,
    #[serde(default)]
    pub caller_nonce: u128,
    #[serde(default)]
    pub height: u64,
    pub contract_id: String,
    #[serde(default)]
    pub gas_price: u128,
    #[serde(default)]
    pub gas_used: u128,
    pub return_value: String,
    pub return_type: String,
    #[serde(default)]
    pub log: Vec<Value>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ContractObject {
    pub id: String,
    pub owner_id: String,
    pub vm_version: u64,
    pub abi_version: u64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub deposit: u128,
    #[serde(default)]
    pub referrer_ids: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ContractState {
    pub contract: ContractObject,
    pub contract_state: Value,
}

fn json_amount(value: &Value) -> Result<u128> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        other => return Err(Error::argument("balance", "a number", other)),
    };
    text.parse::<u128>()
        .map_err(|_| Error::argument("balance", "an unsigned integer", text))
}

fn closed() -> Error {
    Error::ChannelConnection(String::from("Channel is closed"))
}

pub struct Channel {
    connection: Arc<Connection>,
    inbox: mpsc::UnboundedSender<DriverInput>,
    first_events: Mutex<Option<broadcast::Receiver<ChannelEvent>>>,
}

impl Channel {
    /// Connect to the node and start the channel protocol. `signer` answers
    /// the signature requests not tied to an operation of this client.
    pub async fn initialize(options: ChannelOptions, signer: Arc<dyn Signer>) -> Result<Channel> {
        let handler = if options.existing_fsm_id.is_some() {
            Handler::AwaitingReconnection
        } else {
            Handler::AwaitingConnection
        };
        let reconnecting = options.reconnect_tx.is_some();
        let (events, first_events) = broadcast::channel(EVENT_CAPACITY);
        let (inbox, inbox_receiver) = mpsc::unbounded_channel();

        let connection = Connection::open(options, events, inbox.clone()).await?;
        Driver::spawn(connection.clone(), signer, Fsm::new(handler), inbox_receiver);

        if reconnecting {
            inbox
                .send(DriverInput::Enter(Fsm::new(Handler::ChannelOpen)))
                .map_err(|_| closed())?;
            let offchain_state = connection
                .call("channels.get.offchain_state", json!({}))
                .await?;
            if let Some(signed_tx) = offchain_state["signed_tx"].as_str() {
                connection.change_state(signed_tx).await;
            }
        }

        Ok(Channel {
            connection,
            inbox,
            first_events: Mutex::new(Some(first_events)),
        })
    }

    /// Resume a channel after the client lost its connection. `tx_params`
    /// describe the ChannelClientReconnectTx (channelId, round, role,
    /// pubkey) that `signer` signs with the `reconnect` tag.
    pub async fn reconnect(
        mut options: ChannelOptions,
        signer: Arc<dyn Signer>,
        tx_params: Params,
    ) -> Result<Channel> {
        let mut params = tx_params;
        params.tag = Tag::ChannelClientReconnectTx.as_u64();
        let tx = build_tx(&params)?;
        let signed = match signer
            .sign(SignTag::Reconnect, &tx, &SignContext::default())
            .await
        {
            SignResult::Accepted(signed) => signed,
            rejected => {
                return Err(Error::Channel(format!(
                    "Reconnect transaction was not signed: {:?}",
                    rejected
                )))
            }
        };
        options.reconnect_tx = Some(signed);
        Channel::initialize(options, signer).await
    }

    /// Channel events. The first subscriber also gets the events emitted
    /// while connecting.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        let buffered = match self.first_events.lock() {
            Ok(mut first) => first.take(),
            Err(_) => None,
        };
        buffered.unwrap_or_else(|| self.connection.subscribe())
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub async fn status(&self) -> ChannelStatus {
        self.connection.status().await
    }

    /// Latest co-signed state, unpacked.
    pub async fn state(&self) -> Result<OffChainState> {
        let result = self
            .connection
            .call("channels.get.offchain_state", json!({}))
            .await?;
        let signed = |key: &str| -> Result<Option<Params>> {
            match result[key].as_str() {
                None | Some("") => Ok(None),
                Some(tx) => unpack_tx(tx, Some(Tag::SignedTx)).map(Some),
            }
        };
        Ok(OffChainState {
            calls: unpack_entry(
                result["calls"].as_str().unwrap_or_default(),
                Some(EntryTag::CallsMtree),
            )?,
            half_signed_tx: signed("half_signed_tx")?,
            signed_tx: signed("signed_tx")?,
            trees: unpack_entry(
                result["trees"].as_str().unwrap_or_default(),
                Some(EntryTag::StateTrees),
            )?,
        })
    }

    /// Round of the latest co-signed state, `None` before there is one.
    pub async fn round(&self) -> Option<u128> {
        let state = self.connection.state().await?;
        let signed = unpack_tx(&state, Some(Tag::SignedTx)).ok()?;
        let tx = signed.get_record("encodedTx")?;
        if tx.tag == Tag::ChannelCreateTx.as_u64() {
            return Some(1);
        }
        if tx.tag == Tag::ChannelOffChainTx.as_u64()
            || tx.tag == Tag::ChannelWithdrawTx.as_u64()
            || tx.tag == Tag::ChannelDepositTx.as_u64()
        {
            return tx.get_int("round");
        }
        None
    }

    pub async fn id(&self) -> Result<String> {
        self.connection
            .channel_id()
            .await
            .ok_or_else(|| Error::Channel(String::from("Channel is not initialized")))
    }

    pub async fn fsm_id(&self) -> Result<String> {
        self.connection
            .fsm_id()
            .await
            .ok_or_else(|| Error::Channel(String::from("Channel is not initialized")))
    }

    async fn enqueue<T>(
        &self,
        method: &'static str,
        params: Value,
        handler: Handler,
        state: impl FnOnce(oneshot::Sender<Result<T>>) -> PendingState,
    ) -> Result<T> {
        let (sender, receiver) = oneshot::channel();
        let next = Fsm::with_state(handler, Some(state(sender)));
        self.inbox
            .send(DriverInput::Action(Action::when_open(method, params, next)))
            .map_err(|_| closed())?;
        receiver.await.map_err(|_| {
            Error::Channel(format!("{} ended without an outcome", method))
        })?
    }

    /// Leave the channel, keeping it open on chain. Resolves with the
    /// latest state to reestablish it later.
    pub async fn leave(&self) -> Result<LeaveResult> {
        self.enqueue("channels.leave", json!({}), Handler::AwaitingLeave, |sender| {
            PendingState::new(Responder::Leave(sender))
        })
        .await
    }

    /// Close the channel mutually. Resolves with the close transaction once
    /// it is confirmed.
    pub async fn shutdown(&self, signer: Arc<dyn Signer>) -> Result<String> {
        self.enqueue(
            "channels.shutdown",
            json!({}),
            Handler::AwaitingShutdownTx,
            |sender| PendingState::new(Responder::Transaction(sender)).with_signer(signer),
        )
        .await
    }

    /// Transfer `amount` between the participants.
    pub async fn update(
        &self,
        from: &str,
        to: &str,
        amount: u128,
        signer: Arc<dyn Signer>,
        meta: Vec<String>,
    ) -> Result<UpdateResult> {
        self.enqueue(
            "channels.update.new",
            json!({ "from": from, "to": to, "amount": amount, "meta": meta }),
            Handler::AwaitingOffChainTx,
            |sender| PendingState::new(Responder::Update(sender)).with_signer(signer),
        )
        .await
    }

    /// Proof of inclusion of accounts and contracts in the current state.
    pub async fn poi(&self, accounts: &[String], contracts: &[String]) -> Result<Params> {
        let result = self
            .connection
            .call(
                "channels.get.poi",
                json!({ "accounts": accounts, "contracts": contracts }),
            )
            .await?;
        unpack_entry(
            result["poi"].as_str().unwrap_or_default(),
            Some(EntryTag::TreesPoi),
        )
    }

    pub async fn balances(&self, accounts: &[String]) -> Result<BTreeMap<String, u128>> {
        let result = self
            .connection
            .call("channels.get.balances", json!({ "accounts": accounts }))
            .await?;
        result
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|item| {
                let account = item["account"].as_str().unwrap_or_default().to_string();
                Ok((account, json_amount(&item["balance"])?))
            })
            .collect()
    }

    /// Move coins from the channel to the account of this participant.
    pub async fn withdraw(
        &self,
        amount: u128,
        signer: Arc<dyn Signer>,
        callbacks: ActionCallbacks,
    ) -> Result<UpdateResult> {
        self.on_chain_action(OnChainAction::Withdraw, amount, signer, callbacks)
            .await
    }

    /// Move coins from the account of this participant into the channel.
    pub async fn deposit(
        &self,
        amount: u128,
        signer: Arc<dyn Signer>,
        callbacks: ActionCallbacks,
    ) -> Result<UpdateResult> {
        self.on_chain_action(OnChainAction::Deposit, amount, signer, callbacks)
            .await
    }

    async fn on_chain_action(
        &self,
        action: OnChainAction,
        amount: u128,
        signer: Arc<dyn Signer>,
        callbacks: ActionCallbacks,
    ) -> Result<UpdateResult> {
        let method = match action {
            OnChainAction::Deposit => "channels.deposit",
            OnChainAction::Withdraw => "channels.withdraw",
        };
        self.enqueue(
            method,
            json!({ "amount": amount }),
            Handler::AwaitingActionTx(action),
            |sender| {
                PendingState::new(Responder::Update(sender))
                    .with_signer(signer)
                    .with_callbacks(callbacks)
            },
        )
        .await
    }

    /// Send a generic message to the other participant.
    pub async fn send_message(&self, message: &str, recipient: &str) -> Result<()> {
        let mut events = self.connection.subscribe();
        if self.status().await == ChannelStatus::Connecting {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::StatusChanged(ChannelStatus::Connecting)) => {}
                    Ok(ChannelEvent::StatusChanged(_)) => break,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return Err(closed()),
                }
            }
            // the node drops messages sent right after connecting
            sleep(self.connection.options.timing.message_settle_delay()).await;
        }
        self.connection.notify(
            "channels.message",
            json!({ "info": message, "to": recipient }),
        )
    }

    /// Deploy a contract inside the channel. The result carries its
    /// address.
    pub async fn create_contract(
        &self,
        contract: ContractCreate,
        signer: Arc<dyn Signer>,
    ) -> Result<UpdateResult> {
        self.enqueue(
            "channels.update.new_contract",
            json!({
                "code": contract.code,
                "call_data": contract.call_data,
                "deposit": contract.deposit,
                "vm_version": contract.vm_version,
                "abi_version": contract.abi_version,
            }),
            Handler::AwaitingNewContractTx,
            |sender| PendingState::new(Responder::Update(sender)).with_signer(signer),
        )
        .await
    }

    pub async fn call_contract(
        &self,
        call: ContractCall,
        signer: Arc<dyn Signer>,
    ) -> Result<UpdateResult> {
        self.enqueue(
            "channels.update.call_contract",
            json!({
                "amount": call.amount,
                "call_data": call.call_data,
                "contract_id": call.contract,
                "abi_version": call.abi_version,
            }),
            Handler::AwaitingCallContractUpdateTx,
            |sender| PendingState::new(Responder::Update(sender)).with_signer(signer),
        )
        .await
    }

    /// Call a contract on chain with a ChannelForceProgressTx, for when the
    /// other participant stopped cooperating.
    pub async fn force_progress(
        &self,
        call: ContractCall,
        gas_price: Option<u128>,
        gas_limit: Option<u128>,
        signer: Arc<dyn Signer>,
        callbacks: ActionCallbacks,
    ) -> Result<UpdateResult> {
        self.enqueue(
            "channels.force_progress",
            json!({
                "amount": call.amount,
                "call_data": call.call_data,
                "contract_id": call.contract,
                "abi_version": call.abi_version,
                "gas_price": gas_price.unwrap_or(crate::builder::constants::MIN_GAS_PRICE),
                "gas": gas_limit.unwrap_or(FORCE_PROGRESS_GAS_LIMIT),
            }),
            Handler::AwaitingForceProgressTx,
            |sender| {
                PendingState::new(Responder::Update(sender))
                    .with_signer(signer)
                    .with_callbacks(callbacks)
            },
        )
        .await
    }

    /// Dry-run a contract call on the current state.
    pub async fn call_contract_static(&self, call: ContractCall) -> Result<CallObject> {
        let result = self
            .connection
            .call(
                "channels.dry_run.call_contract",
                json!({
                    "amount": call.amount,
                    "call_data": call.call_data,
                    "contract_id": call.contract,
                    "abi_version": call.abi_version,
                }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_contract_call(
        &self,
        caller: &str,
        contract: &str,
        round: u128,
    ) -> Result<CallObject> {
        let result = self
            .connection
            .call(
                "channels.get.contract_call",
                json!({ "caller_id": caller, "contract_id": contract, "round": round }),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_contract_state(&self, contract: &str) -> Result<ContractState> {
        let result = self
            .connection
            .call("channels.get.contract", json!({ "pubkey": contract }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Drop the stored results of contract calls from the channel state.
    pub async fn clean_contract_calls(&self) -> Result<()> {
        event!(Level::DEBUG, "pruning contract calls");
        self.enqueue(
            "channels.clean_contract_calls",
            json!({}),
            Handler::AwaitingCallsPruned,
            |sender| PendingState::new(Responder::Done(sender)),
        )
        .await
    }
}
