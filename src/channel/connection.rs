//! Websocket plumbing of a channel: outbound frames, call replies, pushed
//! messages and the keep-alive ping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{event, Level};

use crate::channel::driver::DriverInput;
use crate::channel::events::{ChannelEvent, ChannelStatus};
use crate::channel::message::{Frame, Request, JSONRPC_VERSION};
use crate::channel::options::ChannelOptions;
use crate::errors::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
enum Heartbeat {
    Pong,
    Stop,
}

/// Shared between the channel handle, the state machine and the socket
/// tasks.
pub struct Connection {
    pub options: ChannelOptions,
    outbound: mpsc::UnboundedSender<Message>,
    heartbeat: mpsc::UnboundedSender<Heartbeat>,
    callbacks: Mutex<HashMap<u64, oneshot::Sender<Frame>>>,
    next_id: AtomicU64,
    disconnecting: AtomicBool,
    events: broadcast::Sender<ChannelEvent>,
    status: RwLock<ChannelStatus>,
    state: RwLock<Option<String>>,
    channel_id: RwLock<Option<String>>,
    fsm_id: RwLock<Option<String>>,
}

impl Connection {
    /// Connect to the node and start the reader, writer and heartbeat
    /// tasks. Frames the node pushes are forwarded to `inbox`.
    pub async fn open(
        options: ChannelOptions,
        events: broadcast::Sender<ChannelEvent>,
        inbox: mpsc::UnboundedSender<DriverInput>,
    ) -> Result<Arc<Connection>> {
        let url = options.ws_url()?;
        let (outbound, outbound_receiver) = mpsc::unbounded_channel();
        let (heartbeat, heartbeat_receiver) = mpsc::unbounded_channel();
        let connection = Arc::new(Connection {
            options,
            outbound,
            heartbeat,
            callbacks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            disconnecting: AtomicBool::new(false),
            events,
            status: RwLock::new(ChannelStatus::Disconnected),
            state: RwLock::new(None),
            channel_id: RwLock::new(None),
            fsm_id: RwLock::new(None),
        });
        connection.change_status(ChannelStatus::Connecting).await;

        event!(Level::INFO, "connecting to channel endpoint {}", url);
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|err| Error::ChannelConnection(err.to_string()))?;
        let (write_sink, read_stream) = ws_stream.split();

        tokio::spawn(write_loop(write_sink, outbound_receiver));
        tokio::spawn(read_loop(connection.clone(), read_stream, inbox));
        connection.change_status(ChannelStatus::Connected).await;
        tokio::spawn(heartbeat_loop(connection.clone(), heartbeat_receiver));
        Ok(connection)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, channel_event: ChannelEvent) {
        if let ChannelEvent::Error(err) = &channel_event {
            event!(Level::ERROR, "channel error: {}", err);
        }
        // nobody listening is fine
        let _ = self.events.send(channel_event);
    }

    fn send(&self, method: &str, params: &Value, id: Option<u64>) -> Result<()> {
        let text = serde_json::to_string(&Request {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id,
        })?;
        event!(Level::DEBUG, "send {}", text);
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| Error::ChannelConnection(String::from("Connection is closed")))
    }

    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.send(method, &params, None)
    }

    /// Call a node method and wait for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        self.callbacks.lock().await.insert(id, sender);
        if let Err(err) = self.send(method, &params, Some(id)) {
            self.callbacks.lock().await.remove(&id);
            return Err(err);
        }
        let reply = receiver.await.map_err(|_| {
            Error::ChannelConnection(format!("Connection closed before {} returned", method))
        })?;
        if let Some(error) = reply.error {
            let details = error
                .data
                .first()
                .and_then(|data| data.message.clone())
                .unwrap_or_default();
            return Err(Error::ChannelCall(format!("{}{}", error.message, details)));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Close the socket. The reader task reports the status change.
    pub fn disconnect(&self) {
        self.disconnecting.store(true, Ordering::SeqCst);
        let _ = self.heartbeat.send(Heartbeat::Stop);
        let _ = self.outbound.send(Message::Close(None));
    }

    pub async fn status(&self) -> ChannelStatus {
        *self.status.read().await
    }

    pub async fn change_status(&self, status: ChannelStatus) {
        {
            let mut current = self.status.write().await;
            if *current == status {
                return;
            }
            *current = status;
        }
        event!(Level::INFO, "channel status {}", status);
        self.emit(ChannelEvent::StatusChanged(status));
    }

    pub async fn state(&self) -> Option<String> {
        self.state.read().await.clone()
    }

    pub async fn change_state(&self, state: &str) {
        *self.state.write().await = Some(state.to_string());
        self.emit(ChannelEvent::StateChanged(state.to_string()));
    }

    pub async fn channel_id(&self) -> Option<String> {
        self.channel_id.read().await.clone()
    }

    pub async fn set_channel_id(&self, channel_id: Option<&str>) {
        *self.channel_id.write().await = channel_id.map(String::from);
    }

    pub async fn fsm_id(&self) -> Option<String> {
        self.fsm_id.read().await.clone()
    }

    pub async fn set_fsm_id(&self, fsm_id: Option<&str>) {
        *self.fsm_id.write().await = fsm_id.map(String::from);
    }

    async fn route(&self, text: &str, inbox: &mpsc::UnboundedSender<DriverInput>) {
        event!(Level::DEBUG, "receive {}", text);
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                self.emit(ChannelEvent::Error(err.into()));
                return;
            }
        };
        if let Some(id) = frame.id {
            match self.callbacks.lock().await.remove(&id) {
                Some(callback) => {
                    let _ = callback.send(frame);
                }
                None => self.emit(ChannelEvent::Error(Error::Channel(format!(
                    "Can't find callback by id: {}",
                    id
                )))),
            }
            return;
        }
        match frame.method.as_str() {
            "channels.message" => {
                self.emit(ChannelEvent::Message(frame.data()["message"].clone()));
            }
            "channels.system.pong" => {
                let channel_id = self.channel_id().await;
                // the id is not known before the channel is open
                if channel_id.is_none() || frame.channel_id() == channel_id.as_deref() {
                    let _ = self.heartbeat.send(Heartbeat::Pong);
                }
            }
            _ => {
                if inbox.send(DriverInput::Message(frame)).is_err() {
                    event!(Level::WARN, "channel state machine is gone, dropping message");
                }
            }
        }
    }

    async fn closed(&self) {
        let _ = self.heartbeat.send(Heartbeat::Stop);
        // pending calls fail once their senders are dropped
        self.callbacks.lock().await.clear();
        self.change_status(ChannelStatus::Disconnected).await;
    }
}

async fn write_loop(
    mut write_sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = write_sink.send(message).await {
            event!(Level::ERROR, "channel socket write failed: {}", err);
            break;
        }
        if closing {
            break;
        }
    }
}

async fn read_loop(
    connection: Arc<Connection>,
    mut read_stream: SplitStream<WsStream>,
    inbox: mpsc::UnboundedSender<DriverInput>,
) {
    while let Some(message) = read_stream.next().await {
        match message {
            Ok(Message::Text(text)) => connection.route(&text, &inbox).await,
            Ok(Message::Close(frame)) => {
                event!(Level::INFO, "channel socket closed {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(err) => {
                if !connection.disconnecting.load(Ordering::SeqCst) {
                    connection.emit(ChannelEvent::Error(err.into()));
                }
                break;
            }
        }
    }
    connection.closed().await;
}

/// Ping the node after each quiet interval. A missing pong closes the
/// connection and is reported once.
async fn heartbeat_loop(connection: Arc<Connection>, mut signals: mpsc::UnboundedReceiver<Heartbeat>) {
    let timing = connection.options.timing.clone();
    loop {
        tokio::select! {
            _ = sleep(timing.ping_interval()) => {}
            signal = signals.recv() => match signal {
                Some(Heartbeat::Pong) => continue,
                _ => return,
            },
        }
        if connection
            .notify("channels.system", json!({ "action": "ping" }))
            .is_err()
        {
            return;
        }
        tokio::select! {
            _ = sleep(timing.pong_timeout()) => {
                event!(Level::WARN, "no pong within {:?}", timing.pong_timeout());
                connection.disconnect();
                connection.emit(ChannelEvent::Error(Error::ChannelPingTimedOut));
                return;
            }
            signal = signals.recv() => match signal {
                Some(Heartbeat::Pong) => continue,
                _ => return,
            },
        }
    }
}
