//! The channel state machine task.
//!
//! Pushed frames are handled strictly in arrival order by the handler of the
//! current state. Operations are queued as actions and started one at a
//! time, only while their guard accepts the current state; the handlers
//! that follow an action settle it through its responder.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{event, Level};

use crate::channel::connection::Connection;
use crate::channel::events::{ChannelEvent, ChannelStatus};
use crate::channel::handlers;
use crate::channel::message::Frame;
use crate::channel::signer::{SignTag, Signer};
use crate::errors::{Error, Result};

/// Outcome of an off-chain update, deposit, withdrawal or contract
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateResult {
    pub accepted: bool,
    /// The new co-signed state.
    pub signed_tx: Option<String>,
    /// Address of the contract created by the update.
    pub address: Option<String>,
    /// On-chain transaction of a forced progress.
    pub tx: Option<String>,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}

impl UpdateResult {
    pub fn accepted(signed_tx: &str) -> Self {
        UpdateResult {
            accepted: true,
            signed_tx: Some(signed_tx.to_string()),
            ..UpdateResult::default()
        }
    }

    pub fn rejected() -> Self {
        UpdateResult::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveResult {
    pub channel_id: Option<String>,
    pub signed_tx: Option<String>,
}

pub type TxCallback = Box<dyn Fn(&str) + Send + Sync>;
pub type LockCallback = Box<dyn Fn() + Send + Sync>;

/// Progress notifications of a deposit or withdrawal.
#[derive(Default)]
pub struct ActionCallbacks {
    /// The transaction was posted on chain.
    pub on_chain_tx: Option<TxCallback>,
    /// Our node saw the transaction reach the minimum depth.
    pub own_locked: Option<LockCallback>,
    /// The other party's node did.
    pub locked: Option<LockCallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChainAction {
    Deposit,
    Withdraw,
}

impl OnChainAction {
    pub fn name(self) -> &'static str {
        match self {
            OnChainAction::Deposit => "deposit",
            OnChainAction::Withdraw => "withdraw",
        }
    }

    pub fn sign_tag(self) -> SignTag {
        match self {
            OnChainAction::Deposit => SignTag::DepositTx,
            OnChainAction::Withdraw => SignTag::WithdrawTx,
        }
    }
}

/// States of the channel protocol. Each one has a handler in
/// [`handlers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    AwaitingConnection,
    AwaitingReconnection,
    AwaitingChannelCreateTx,
    AwaitingOnChainTx,
    AwaitingBlockInclusion,
    AwaitingOpenConfirmation,
    AwaitingInitialState,
    ChannelOpen,
    AwaitingOffChainTx,
    AwaitingOffChainUpdate,
    AwaitingTxSignRequest,
    AwaitingUpdateConflict,
    AwaitingShutdownTx,
    AwaitingShutdownOnChainTx,
    AwaitingLeave,
    AwaitingActionTx(OnChainAction),
    AwaitingActionCompletion(OnChainAction),
    AwaitingNewContractTx,
    AwaitingNewContractCompletion,
    AwaitingCallContractUpdateTx,
    AwaitingCallContractCompletion,
    AwaitingForceProgressTx,
    AwaitingForceProgressCompletion,
    AwaitingCallsPruned,
    ChannelClosed,
}

/// Settles the future of a queued operation.
pub enum Responder {
    Update(oneshot::Sender<Result<UpdateResult>>),
    Leave(oneshot::Sender<Result<LeaveResult>>),
    Transaction(oneshot::Sender<Result<String>>),
    Done(oneshot::Sender<Result<()>>),
}

/// Data of the operation in progress.
#[derive(Default)]
pub struct PendingState {
    pub responder: Option<Responder>,
    pub signer: Option<Arc<dyn Signer>>,
    pub callbacks: ActionCallbacks,
    pub close_tx: Option<String>,
}

impl PendingState {
    pub fn new(responder: Responder) -> Self {
        PendingState {
            responder: Some(responder),
            ..PendingState::default()
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_callbacks(mut self, callbacks: ActionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn resolve_update(&mut self, result: UpdateResult) {
        if let Some(Responder::Update(sender)) = self.responder.take() {
            let _ = sender.send(Ok(result));
        }
    }

    pub fn resolve_leave(&mut self, result: LeaveResult) {
        if let Some(Responder::Leave(sender)) = self.responder.take() {
            let _ = sender.send(Ok(result));
        }
    }

    pub fn resolve_transaction(&mut self, tx: String) {
        if let Some(Responder::Transaction(sender)) = self.responder.take() {
            let _ = sender.send(Ok(tx));
        }
    }

    pub fn resolve_done(&mut self) {
        if let Some(Responder::Done(sender)) = self.responder.take() {
            let _ = sender.send(Ok(()));
        }
    }

    pub fn reject(&mut self, err: Error) {
        // a dropped receiver means nobody waits for the outcome any more
        match self.responder.take() {
            Some(Responder::Update(sender)) => {
                let _ = sender.send(Err(err));
            }
            Some(Responder::Leave(sender)) => {
                let _ = sender.send(Err(err));
            }
            Some(Responder::Transaction(sender)) => {
                let _ = sender.send(Err(err));
            }
            Some(Responder::Done(sender)) => {
                let _ = sender.send(Err(err));
            }
            None => {}
        }
    }
}

pub struct Fsm {
    pub handler: Handler,
    pub state: Option<PendingState>,
}

impl Fsm {
    pub fn new(handler: Handler) -> Self {
        Fsm {
            handler,
            state: None,
        }
    }

    pub fn with_state(handler: Handler, state: Option<PendingState>) -> Self {
        Fsm { handler, state }
    }

    pub fn is_open(&self) -> bool {
        self.handler == Handler::ChannelOpen
    }
}

/// A queued operation: the notification starting it and the state that
/// awaits its outcome.
pub struct Action {
    guard: fn(&Fsm) -> bool,
    method: &'static str,
    params: Value,
    next: Fsm,
}

impl Action {
    /// Starts once the channel is open and idle.
    pub fn when_open(method: &'static str, params: Value, next: Fsm) -> Self {
        Action {
            guard: Fsm::is_open,
            method,
            params,
            next,
        }
    }
}

pub enum DriverInput {
    Message(Frame),
    Action(Action),
    /// Jump to a state, used when resuming from a reconnect transaction.
    Enter(Fsm),
}

pub struct Driver {
    pub connection: Arc<Connection>,
    /// Signs the requests not tied to an operation of ours.
    pub signer: Arc<dyn Signer>,
    fsm: Option<Fsm>,
    actions: VecDeque<Action>,
    /// Set when we co-signed a contract creation of the other party.
    pub new_contract_owner: Option<String>,
}

impl Driver {
    pub fn spawn(
        connection: Arc<Connection>,
        signer: Arc<dyn Signer>,
        initial: Fsm,
        inbox: mpsc::UnboundedReceiver<DriverInput>,
    ) -> JoinHandle<()> {
        let driver = Driver {
            connection,
            signer,
            fsm: Some(initial),
            actions: VecDeque::new(),
            new_contract_owner: None,
        };
        tokio::spawn(driver.run(inbox))
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<DriverInput>) {
        while let Some(input) = inbox.recv().await {
            match input {
                DriverInput::Message(frame) => {
                    if let Err(err) = self.handle_message(&frame).await {
                        event!(
                            Level::WARN,
                            "failed to handle {}: {}",
                            frame.to_json_string(),
                            err
                        );
                        self.connection.emit(ChannelEvent::Error(
                            Error::ChannelIncomingMessage(err.to_string()),
                        ));
                    }
                }
                DriverInput::Action(action) => self.actions.push_back(action),
                DriverInput::Enter(fsm) => self.enter_state(fsm).await,
            }
            self.dequeue_actions().await;
        }
        event!(Level::DEBUG, "channel state machine stopped");
    }

    async fn handle_message(&mut self, frame: &Frame) -> Result<()> {
        let mut fsm = self.fsm.take().ok_or(Error::UnknownChannelState)?;
        let handler = fsm.handler;
        match handlers::handle(self, handler, frame, &mut fsm.state).await {
            Ok(Some(next)) => {
                if next.handler != handler {
                    event!(Level::DEBUG, "{:?} -> {:?} on {}", handler, next.handler, frame.method);
                }
                self.enter_state(next).await;
                Ok(())
            }
            Ok(None) => {
                self.fsm = Some(fsm);
                Err(Error::UnknownChannelState)
            }
            Err(err) => {
                self.fsm = Some(fsm);
                Err(err)
            }
        }
    }

    pub async fn enter_state(&mut self, fsm: Fsm) {
        if fsm.is_open() {
            self.connection.change_status(ChannelStatus::Open).await;
        }
        self.fsm = Some(fsm);
    }

    /// Start queued actions, oldest first, while one is allowed to start.
    async fn dequeue_actions(&mut self) {
        loop {
            let index = match &self.fsm {
                Some(fsm) => self.actions.iter().position(|action| (action.guard)(fsm)),
                None => None,
            };
            let action = match index.and_then(|index| self.actions.remove(index)) {
                Some(action) => action,
                None => return,
            };
            event!(Level::DEBUG, "starting {}", action.method);
            match self.connection.notify(action.method, action.params) {
                Ok(()) => self.enter_state(action.next).await,
                Err(err) => {
                    if let Some(mut state) = action.next.state {
                        state.reject(err);
                    }
                }
            }
        }
    }
}
