//! One handler per protocol state. A handler gets the pushed frame and the
//! pending operation and returns the next state, or `None` when the frame
//! means nothing in its state.

use std::sync::Arc;

use serde_json::json;

use crate::builder::constants::{tx_tag_name, Tag};
use crate::builder::{build_contract_id, unpack_tx};
use crate::channel::driver::{
    Driver, Fsm, Handler, LeaveResult, OnChainAction, PendingState, UpdateResult,
};
use crate::channel::events::{ChannelEvent, ChannelStatus};
use crate::channel::message::Frame;
use crate::channel::options::Role;
use crate::channel::signer::{sign_and_notify, SignContext, SignTag, Signer};
use crate::errors::{Error, Result};

pub type Next = Result<Option<Fsm>>;

type State = Option<PendingState>;

fn to(handler: Handler) -> Next {
    Ok(Some(Fsm::new(handler)))
}

/// Move to `handler` carrying the pending operation along.
fn keep(handler: Handler, state: &mut State) -> Next {
    Ok(Some(Fsm::with_state(handler, state.take())))
}

fn reject(state: &mut State, err: Error) {
    if let Some(state) = state.as_mut() {
        state.reject(err);
    }
}

fn resolve(state: &mut State, result: UpdateResult) {
    if let Some(state) = state.as_mut() {
        state.resolve_update(result);
    }
}

fn signer_of(state: &State) -> Result<Arc<dyn Signer>> {
    state
        .as_ref()
        .and_then(|state| state.signer.clone())
        .ok_or_else(|| Error::Channel(String::from("No signer for the pending operation")))
}

fn new_state(message: &Frame) -> Result<&str> {
    message
        .state()
        .ok_or_else(|| Error::Channel(format!("{} without a state", message.method)))
}

fn on_chain_tx_event(message: &Frame) -> ChannelEvent {
    let data = message.data();
    ChannelEvent::OnChainTx {
        tx: data["tx"].as_str().unwrap_or_default().to_string(),
        info: data["info"].as_str().map(String::from),
        kind: data["type"].as_str().map(String::from),
    }
}

pub async fn handle(
    driver: &mut Driver,
    handler: Handler,
    message: &Frame,
    state: &mut State,
) -> Next {
    match handler {
        Handler::AwaitingConnection => awaiting_connection(driver, message).await,
        Handler::AwaitingReconnection => awaiting_reconnection(driver, message, state).await,
        Handler::AwaitingChannelCreateTx => awaiting_channel_create_tx(driver, message).await,
        Handler::AwaitingOnChainTx => awaiting_on_chain_tx(driver, message).await,
        Handler::AwaitingBlockInclusion => awaiting_block_inclusion(driver, message),
        Handler::AwaitingOpenConfirmation => awaiting_open_confirmation(driver, message).await,
        Handler::AwaitingInitialState => awaiting_initial_state(driver, message).await,
        Handler::ChannelOpen => channel_open(driver, message, state).await,
        Handler::AwaitingOffChainTx => awaiting_off_chain_tx(driver, message, state).await,
        Handler::AwaitingOffChainUpdate => {
            awaiting_completion(driver, message, state, Some(Completion::Update)).await
        }
        Handler::AwaitingTxSignRequest => awaiting_tx_sign_request(driver, message, state).await,
        Handler::AwaitingUpdateConflict => awaiting_update_conflict(message, state),
        Handler::AwaitingShutdownTx => awaiting_shutdown_tx(driver, message, state).await,
        Handler::AwaitingShutdownOnChainTx => awaiting_shutdown_on_chain_tx(message, state),
        Handler::AwaitingLeave => awaiting_leave(driver, message, state),
        Handler::AwaitingActionTx(action) => {
            awaiting_action_tx(driver, action, message, state).await
        }
        Handler::AwaitingActionCompletion(action) => {
            awaiting_action_completion(driver, action, message, state).await
        }
        Handler::AwaitingNewContractTx => {
            awaiting_update_tx(driver, message, state, Handler::AwaitingNewContractCompletion)
                .await
        }
        Handler::AwaitingNewContractCompletion => {
            awaiting_completion(driver, message, state, Some(Completion::NewContract)).await
        }
        Handler::AwaitingCallContractUpdateTx => {
            awaiting_update_tx(driver, message, state, Handler::AwaitingCallContractCompletion)
                .await
        }
        Handler::AwaitingCallContractCompletion => {
            awaiting_completion(driver, message, state, Some(Completion::Update)).await
        }
        Handler::AwaitingForceProgressTx => awaiting_force_progress_tx(driver, message, state).await,
        Handler::AwaitingForceProgressCompletion => {
            awaiting_force_progress_completion(driver, message, state)
        }
        Handler::AwaitingCallsPruned => awaiting_calls_pruned(message, state),
        Handler::ChannelClosed => channel_closed(message, state),
    }
}

/// Give up on the pending operation and fall back to the open state.
pub fn handle_unexpected_message(message: &Frame, state: &mut State) -> Next {
    reject(
        state,
        Error::UnexpectedChannelMessage(message.to_json_string()),
    );
    to(Handler::ChannelOpen)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Update,
    NewContract,
}

/// Outcome of an update both parties were asked to sign.
async fn awaiting_completion(
    driver: &mut Driver,
    message: &Frame,
    state: &mut State,
    on_success: Option<Completion>,
) -> Next {
    if let Some(completion) = on_success {
        if message.method == "channels.update" {
            return match completion {
                Completion::Update => update_completed(driver, message, state).await,
                Completion::NewContract => contract_created(driver, message, state).await,
            };
        }
    }
    if message.method == "channels.conflict" {
        let data = message.data();
        resolve(
            state,
            UpdateResult {
                error_code: data["error_code"].as_i64(),
                error_message: data["error_msg"].as_str().map(String::from),
                ..UpdateResult::rejected()
            },
        );
        return to(Handler::ChannelOpen);
    }
    if message.method == "channels.info" && message.event() == Some("aborted_update") {
        resolve(state, UpdateResult::rejected());
        return to(Handler::ChannelOpen);
    }
    if let Some(error) = &message.error {
        let codes = error.codes();
        let err = if codes.contains(&1001) {
            Error::InsufficientBalance
        } else if codes.contains(&1002) {
            Error::IllegalArgument(String::from("Amount cannot be negative"))
        } else {
            Error::ChannelConnection(error.message.clone())
        };
        reject(state, err);
        return to(Handler::ChannelOpen);
    }
    handle_unexpected_message(message, state)
}

async fn update_completed(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    let signed_tx = new_state(message)?;
    driver.connection.change_state(signed_tx).await;
    resolve(state, UpdateResult::accepted(signed_tx));
    to(Handler::ChannelOpen)
}

async fn contract_created(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    let signed_tx = new_state(message)?;
    let (_, round) = off_chain_round(signed_tx)?;
    let owner = driver.connection.options.own_id().to_string();
    driver.connection.change_state(signed_tx).await;
    let address = build_contract_id(&owner, round)?;
    driver
        .connection
        .emit(ChannelEvent::NewContract(address.clone()));
    resolve(
        state,
        UpdateResult {
            address: Some(address),
            ..UpdateResult::accepted(signed_tx)
        },
    );
    to(Handler::ChannelOpen)
}

/// Channel id and round of a signed ChannelOffChainTx.
fn off_chain_round(signed_tx: &str) -> Result<(String, u128)> {
    let signed = unpack_tx(signed_tx, Some(Tag::SignedTx))?;
    let tx = signed
        .get_record("encodedTx")
        .ok_or_else(|| Error::decode("SignedTx without an inner transaction"))?;
    if tx.tag != Tag::ChannelOffChainTx.as_u64() {
        return Err(Error::Channel(format!(
            "Tag should be ChannelOffChainTx, got {} instead",
            tx_tag_name(tx.tag)
        )));
    }
    let round = tx
        .get_int("round")
        .ok_or_else(|| Error::argument("round", "provided", "undefined"))?;
    let channel_id = tx.get_str("channelId").unwrap_or_default().to_string();
    Ok((channel_id, round))
}

async fn awaiting_connection(driver: &mut Driver, message: &Frame) -> Next {
    let connection = &driver.connection;
    if message.method == "channels.info" {
        let status = match message.event() {
            Some("channel_accept") => Some(ChannelStatus::Accepted),
            Some("funding_created") => Some(ChannelStatus::HalfSigned),
            _ => None,
        };
        if let Some(status) = status {
            connection.change_status(status).await;
            return to(Handler::AwaitingChannelCreateTx);
        }
        return match message.event() {
            Some("channel_reestablished") => to(Handler::AwaitingOpenConfirmation),
            Some("fsm_up") => {
                connection.set_fsm_id(message.data()["fsm_id"].as_str()).await;
                to(Handler::AwaitingConnection)
            }
            _ => to(Handler::AwaitingConnection),
        };
    }
    if message.method == "channels.error" {
        connection.emit(ChannelEvent::Error(Error::ChannelConnection(
            message.error_text(),
        )));
        return to(Handler::ChannelClosed);
    }
    Ok(None)
}

async fn awaiting_reconnection(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    if message.method == "channels.info" && message.event() == Some("fsm_up") {
        let connection = &driver.connection;
        connection.set_fsm_id(message.data()["fsm_id"].as_str()).await;
        let offchain_state = connection
            .call("channels.get.offchain_state", json!({}))
            .await?;
        if let Some(signed_tx) = offchain_state["signed_tx"].as_str() {
            connection.change_state(signed_tx).await;
        }
        return to(Handler::ChannelOpen);
    }
    handle_unexpected_message(message, state)
}

async fn awaiting_channel_create_tx(driver: &mut Driver, message: &Frame) -> Next {
    let tag = match driver.connection.options.role {
        Role::Initiator => SignTag::InitiatorSign,
        Role::Responder => SignTag::ResponderSign,
    };
    if message.sign_tag() == Some(tag.name()) {
        sign_and_notify(
            &driver.connection,
            &format!("channels.{}", tag),
            message.data(),
            driver.signer.as_ref(),
            tag,
        )
        .await?;
        return to(Handler::AwaitingOnChainTx);
    }
    Ok(None)
}

async fn awaiting_on_chain_tx(driver: &mut Driver, message: &Frame) -> Next {
    let role = driver.connection.options.role;
    if message.method == "channels.on_chain_tx" {
        match (message.info(), role) {
            (Some("funding_signed"), Role::Initiator)
            | (Some("funding_created"), Role::Responder) => {
                return to(Handler::AwaitingBlockInclusion)
            }
            _ => {}
        }
    }
    if message.method == "channels.info"
        && message.event() == Some("funding_signed")
        && role == Role::Initiator
    {
        driver.connection.set_channel_id(message.channel_id()).await;
        driver.connection.change_status(ChannelStatus::Signed).await;
        return to(Handler::AwaitingOnChainTx);
    }
    Ok(None)
}

fn awaiting_block_inclusion(driver: &mut Driver, message: &Frame) -> Next {
    if message.method == "channels.info" {
        match message.event() {
            Some("funding_created") | Some("own_funding_locked") => {
                return to(Handler::AwaitingBlockInclusion)
            }
            Some("funding_locked") => return to(Handler::AwaitingOpenConfirmation),
            _ => {}
        }
    }
    if message.method == "channels.on_chain_tx" {
        driver.connection.emit(on_chain_tx_event(message));
        return to(Handler::AwaitingBlockInclusion);
    }
    Ok(None)
}

async fn awaiting_open_confirmation(driver: &mut Driver, message: &Frame) -> Next {
    if message.method == "channels.info" && message.event() == Some("open") {
        driver.connection.set_channel_id(message.channel_id()).await;
        return to(Handler::AwaitingInitialState);
    }
    Ok(None)
}

async fn awaiting_initial_state(driver: &mut Driver, message: &Frame) -> Next {
    if message.method == "channels.update" {
        driver.connection.change_state(new_state(message)?).await;
        return to(Handler::ChannelOpen);
    }
    Ok(None)
}

async fn channel_open(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    let connection = driver.connection.clone();
    match message.method.as_str() {
        "channels.info" => {
            let event = message.event().unwrap_or_default();
            if let Some(channel_event) = ChannelEvent::from_info(event) {
                // TODO: hold off-chain operations back between peer_disconnected and channel_reestablished
                connection.emit(channel_event);
                return to(Handler::ChannelOpen);
            }
            match event {
                "update" | "withdraw_created" | "deposit_created" => {
                    to(Handler::AwaitingTxSignRequest)
                }
                "fsm_up" => {
                    connection.set_fsm_id(message.data()["fsm_id"].as_str()).await;
                    to(Handler::ChannelOpen)
                }
                "timeout" | "close_mutual" | "shutdown" => to(Handler::ChannelOpen),
                "closing" => {
                    connection.change_status(ChannelStatus::Closing).await;
                    to(Handler::ChannelOpen)
                }
                "closed_confirmed" => {
                    connection.change_status(ChannelStatus::Closed).await;
                    to(Handler::ChannelClosed)
                }
                "died" => {
                    connection.change_status(ChannelStatus::Died).await;
                    to(Handler::ChannelClosed)
                }
                _ => Ok(None),
            }
        }
        "channels.on_chain_tx" => {
            connection.emit(on_chain_tx_event(message));
            to(Handler::ChannelOpen)
        }
        "channels.leave" => to(Handler::ChannelOpen),
        "channels.update" => {
            let signed_tx = new_state(message)?;
            connection.change_state(signed_tx).await;
            if let Some(owner) = driver.new_contract_owner.take() {
                let (_, round) = off_chain_round(signed_tx)?;
                connection.emit(ChannelEvent::NewContract(build_contract_id(&owner, round)?));
            }
            to(Handler::ChannelOpen)
        }
        "channels.sign.shutdown_sign_ack" => awaiting_tx_sign_request(driver, message, state).await,
        _ => Ok(None),
    }
}

/// Co-sign an update the other party started.
async fn awaiting_tx_sign_request(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    let tag = match message.sign_tag().and_then(SignTag::from_name) {
        Some(tag) => tag,
        None => return handle_unexpected_message(message, state),
    };
    let is_error = sign_and_notify(
        &driver.connection,
        &format!("channels.{}", tag),
        message.data(),
        driver.signer.as_ref(),
        tag,
    )
    .await?;
    if is_error {
        return keep(Handler::AwaitingUpdateConflict, state);
    }
    driver.new_contract_owner = SignContext::from_data(message.data())
        .new_contract_owner()
        .map(String::from);
    to(Handler::ChannelOpen)
}

fn awaiting_update_conflict(message: &Frame, state: &mut State) -> Next {
    if message.error.is_some() {
        return keep(Handler::AwaitingUpdateConflict, state);
    }
    if message.method == "channels.conflict" {
        return to(Handler::ChannelOpen);
    }
    handle_unexpected_message(message, state)
}

/// Our own transfer, waiting for the request to sign it.
async fn awaiting_off_chain_tx(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    if message.method == "channels.sign.update" {
        let signer = signer_of(state)?;
        let is_error = sign_and_notify(
            &driver.connection,
            "channels.update",
            message.data(),
            signer.as_ref(),
            SignTag::Update,
        )
        .await?;
        let next = if is_error {
            Handler::AwaitingOffChainTx
        } else {
            Handler::AwaitingOffChainUpdate
        };
        return keep(next, state);
    }
    if message.method == "channels.error" {
        reject(state, Error::ChannelConnection(message.error_text()));
        return to(Handler::ChannelOpen);
    }
    awaiting_completion(driver, message, state, None).await
}

/// Contract creation and call: sign our update, then wait for its outcome.
async fn awaiting_update_tx(
    driver: &mut Driver,
    message: &Frame,
    state: &mut State,
    completion: Handler,
) -> Next {
    if message.method != "channels.sign.update" {
        return handle_unexpected_message(message, state);
    }
    let signer = signer_of(state)?;
    sign_and_notify(
        &driver.connection,
        "channels.update",
        message.data(),
        signer.as_ref(),
        SignTag::Update,
    )
    .await?;
    keep(completion, state)
}

async fn awaiting_shutdown_tx(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    if message.method == "channels.sign.shutdown_sign" {
        let signer = signer_of(state)?;
        sign_and_notify(
            &driver.connection,
            "channels.shutdown_sign",
            message.data(),
            signer.as_ref(),
            SignTag::ShutdownSign,
        )
        .await?;
        return keep(Handler::AwaitingShutdownOnChainTx, state);
    }
    handle_unexpected_message(message, state)
}

fn awaiting_shutdown_on_chain_tx(message: &Frame, state: &mut State) -> Next {
    if message.method == "channels.on_chain_tx" {
        return keep(Handler::ChannelClosed, state);
    }
    handle_unexpected_message(message, state)
}

fn awaiting_leave(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    if message.method == "channels.leave" {
        if let Some(state) = state.as_mut() {
            state.resolve_leave(LeaveResult {
                channel_id: message.channel_id().map(String::from),
                signed_tx: message.state().map(String::from),
            });
        }
        driver.connection.disconnect();
        return to(Handler::ChannelClosed);
    }
    if message.method == "channels.error" {
        reject(state, Error::ChannelConnection(message.error_text()));
        return to(Handler::ChannelOpen);
    }
    handle_unexpected_message(message, state)
}

async fn awaiting_action_tx(
    driver: &mut Driver,
    action: OnChainAction,
    message: &Frame,
    state: &mut State,
) -> Next {
    if message.method != format!("channels.sign.{}_tx", action.name()) {
        return handle_unexpected_message(message, state);
    }
    let signer = signer_of(state)?;
    sign_and_notify(
        &driver.connection,
        &format!("channels.{}_tx", action.name()),
        message.data(),
        signer.as_ref(),
        action.sign_tag(),
    )
    .await?;
    keep(Handler::AwaitingActionCompletion(action), state)
}

async fn awaiting_action_completion(
    driver: &mut Driver,
    action: OnChainAction,
    message: &Frame,
    state: &mut State,
) -> Next {
    let this = Handler::AwaitingActionCompletion(action);
    if message.method == "channels.on_chain_tx" {
        if let Some(callback) = state.as_ref().and_then(|state| state.callbacks.on_chain_tx.as_ref()) {
            callback(message.data()["tx"].as_str().unwrap_or_default());
        }
        return keep(this, state);
    }
    if message.method == "channels.info" {
        let event = message.event().unwrap_or_default();
        if event == format!("own_{}_locked", action.name()) {
            if let Some(callback) = state.as_ref().and_then(|state| state.callbacks.own_locked.as_ref()) {
                callback();
            }
            return keep(this, state);
        }
        if event == format!("{}_locked", action.name()) {
            if let Some(callback) = state.as_ref().and_then(|state| state.callbacks.locked.as_ref()) {
                callback();
            }
            return keep(this, state);
        }
    }
    awaiting_completion(driver, message, state, Some(Completion::Update)).await
}

async fn awaiting_force_progress_tx(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    if message.method != "channels.sign.force_progress_tx" {
        return handle_unexpected_message(message, state);
    }
    let signer = signer_of(state)?;
    sign_and_notify(
        &driver.connection,
        "channels.force_progress_sign",
        message.data(),
        signer.as_ref(),
        SignTag::ForceProgressTx,
    )
    .await?;
    keep(Handler::AwaitingForceProgressCompletion, state)
}

fn awaiting_force_progress_completion(driver: &mut Driver, message: &Frame, state: &mut State) -> Next {
    if message.method == "channels.on_chain_tx" {
        let tx = message.data()["tx"].as_str().unwrap_or_default().to_string();
        if let Some(callback) = state.as_ref().and_then(|state| state.callbacks.on_chain_tx.as_ref()) {
            callback(&tx);
        }
        driver.connection.emit(on_chain_tx_event(message));
        resolve(
            state,
            UpdateResult {
                accepted: true,
                tx: Some(tx),
                ..UpdateResult::default()
            },
        );
        return to(Handler::ChannelOpen);
    }
    handle_unexpected_message(message, state)
}

fn awaiting_calls_pruned(message: &Frame, state: &mut State) -> Next {
    if message.method == "channels.calls_pruned.reply" {
        if let Some(state) = state.as_mut() {
            state.resolve_done();
        }
        return to(Handler::ChannelOpen);
    }
    reject(
        state,
        Error::UnexpectedChannelMessage(message.to_json_string()),
    );
    to(Handler::ChannelClosed)
}

/// Waits for the close transaction of a shutdown to be confirmed.
fn channel_closed(message: &Frame, state: &mut State) -> Next {
    let pending = match state.as_mut() {
        Some(pending) => pending,
        None => return to(Handler::ChannelClosed),
    };
    if message.event() == Some("closing") {
        return keep(Handler::ChannelClosed, state);
    }
    if message.info() == Some("channel_closed") {
        pending.close_tx = message.data()["tx"].as_str().map(String::from);
        return keep(Handler::ChannelClosed, state);
    }
    if message.event() == Some("closed_confirmed") {
        match pending.close_tx.take() {
            Some(close_tx) => pending.resolve_transaction(close_tx),
            None => pending.reject(Error::Channel(String::from(
                "Channel closed without a close transaction",
            ))),
        }
        return to(Handler::ChannelClosed);
    }
    keep(Handler::ChannelClosed, state)
}
