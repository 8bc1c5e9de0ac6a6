//! A scripted channel endpoint. Tests play the node side of the protocol
//! frame by frame.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use crate::channel::Role;
use crate::test_utilities::mocks::{make_mock_channel_id, make_mock_channel_state, spend_tx};

pub struct MockChannelNode {
    listener: TcpListener,
    url: String,
}

impl MockChannelNode {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/channel", listener.local_addr().unwrap());
        MockChannelNode { listener, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn accept(self) -> PeerSocket {
        let (stream, _) = self.listener.accept().await.unwrap();
        PeerSocket {
            ws: accept_async(stream).await.unwrap(),
            answer_pings: true,
            pings: 0,
            channel_id: None,
        }
    }
}

pub struct PeerSocket {
    ws: WebSocketStream<TcpStream>,
    pub answer_pings: bool,
    /// Pings received so far.
    pub pings: usize,
    channel_id: Option<String>,
}

impl PeerSocket {
    pub async fn send_raw(&mut self, frame: Value) {
        self.ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    /// Next text frame from the client. Pings are answered or swallowed on
    /// the way, `None` once the client is gone.
    pub async fn next_frame(&mut self) -> Option<Value> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    if frame["method"] == "channels.system" && frame["params"]["action"] == "ping" {
                        self.pings += 1;
                        if self.answer_pings {
                            let pong = json!({
                                "jsonrpc": "2.0",
                                "method": "channels.system.pong",
                                "params": { "channel_id": self.channel_id, "data": {} }
                            });
                            self.send_raw(pong).await;
                        }
                        continue;
                    }
                    return Some(frame);
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => {}
            }
        }
    }

    /// Next frame, which must call `method`.
    pub async fn expect(&mut self, method: &str) -> Value {
        let frame = self.next_frame().await.expect("client disconnected");
        assert_eq!(frame["method"], method, "unexpected frame {}", frame);
        frame
    }

    /// Read until the client closes the socket.
    pub async fn drain(&mut self) -> Vec<Value> {
        let mut frames = vec![];
        while let Some(frame) = self.next_frame().await {
            frames.push(frame);
        }
        frames
    }

    pub async fn notify(&mut self, method: &str, data: Value) {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": { "channel_id": self.channel_id, "data": data }
        });
        self.send_raw(frame).await;
    }

    pub async fn info(&mut self, event: &str) {
        self.notify("channels.info", json!({ "event": event })).await;
    }

    pub async fn reply(&mut self, request: &Value, result: Value) {
        let frame = json!({ "jsonrpc": "2.0", "id": request["id"], "result": result });
        self.send_raw(frame).await;
    }

    pub async fn reply_error(&mut self, request: &Value, code: i64, message: &str, detail: &str) {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": code, "message": message, "data": [{ "message": detail }] }
        });
        self.send_raw(frame).await;
    }

    /// Play the node side up to the creation signature of `role` and return
    /// the transaction the client signed.
    pub async fn negotiate(&mut self, role: Role, create_tx: &str) -> String {
        self.notify("channels.info", json!({ "event": "fsm_up", "fsm_id": "ba_fsm" }))
            .await;
        let (event, tag) = match role {
            Role::Initiator => ("channel_accept", "initiator_sign"),
            Role::Responder => ("funding_created", "responder_sign"),
        };
        self.info(event).await;
        self.notify(&format!("channels.sign.{}", tag), json!({ "tx": create_tx }))
            .await;
        let signed = self.expect(&format!("channels.{}", tag)).await;
        signed["params"]["tx"].as_str().unwrap().to_string()
    }

    /// Funding transaction posted and locked, then the channel opens with
    /// `state` as its first co-signed state.
    pub async fn confirm_open(&mut self, role: Role, state: &str) {
        self.channel_id = Some(make_mock_channel_id());
        let info = match role {
            Role::Initiator => {
                self.info("funding_signed").await;
                "funding_signed"
            }
            Role::Responder => "funding_created",
        };
        self.notify("channels.on_chain_tx", json!({ "info": info, "tx": spend_tx() }))
            .await;
        self.info("own_funding_locked").await;
        self.info("funding_locked").await;
        self.info("open").await;
        self.notify("channels.update", json!({ "state": state, "updates": [] }))
            .await;
    }

    /// Open a channel for an initiator, up to the state at round 1.
    pub async fn open_channel(&mut self) {
        self.negotiate(Role::Initiator, &spend_tx()).await;
        self.confirm_open(Role::Initiator, &make_mock_channel_state(1))
            .await;
    }
}
