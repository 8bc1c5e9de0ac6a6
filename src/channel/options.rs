use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::errors::{Error, Result};

/// Send a ping this long after the last pong.
pub const PING_INTERVAL_MS: u64 = 10_000;
/// Close the connection when a ping is not answered in time.
pub const PONG_TIMEOUT_MS: u64 = 5_000;
/// Pause before the first message sent after the socket left `connecting`.
pub const MESSAGE_SETTLE_DELAY_MS: u64 = 500;

/// Options kept on the client side, never sent to the node.
const LOCAL_OPTIONS: [&str; 2] = ["url", "timing"];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Timing {
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub message_settle_delay_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            ping_interval_ms: PING_INTERVAL_MS,
            pong_timeout_ms: PONG_TIMEOUT_MS,
            message_settle_delay_ms: MESSAGE_SETTLE_DELAY_MS,
        }
    }
}

impl Timing {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn message_settle_delay(&self) -> Duration {
        Duration::from_millis(self.message_settle_delay_ms)
    }
}

/// Parameters of a state channel, as understood by the node's channel
/// websocket endpoint.
///
/// Every field except `url` and `timing` is passed to the node as a query
/// parameter of the same (snake_case) name. Unset optional fields are left
/// out so the node applies its own defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Channel endpoint of the node, e.g. `ws://localhost:3014/channel`.
    pub url: String,
    pub role: Role,
    pub initiator_id: String,
    pub responder_id: String,
    #[serde(default)]
    pub push_amount: u128,
    #[serde(default)]
    pub initiator_amount: u128,
    #[serde(default)]
    pub responder_amount: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_reserve: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Host of the responder's node, required from the initiator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub lock_period: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_depth_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_depth: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_fsm_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offchain_tx: Option<String>,
    /// Signed ChannelClientReconnectTx, see [`super::Channel::reconnect`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_idle: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_funding_create: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_funding_sign: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_funding_lock: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sign: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_accept: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_initialized: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_awaiting_open: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_password: Option<String>,
    #[serde(default)]
    pub timing: Timing,
}

impl ChannelOptions {
    pub fn new(url: &str, role: Role, initiator_id: &str, responder_id: &str) -> Self {
        ChannelOptions {
            url: url.to_string(),
            role,
            initiator_id: initiator_id.to_string(),
            responder_id: responder_id.to_string(),
            push_amount: 0,
            initiator_amount: 0,
            responder_amount: 0,
            channel_reserve: None,
            ttl: None,
            host: None,
            port: None,
            lock_period: 0,
            minimum_depth_strategy: None,
            minimum_depth: None,
            fee: None,
            gas_price: None,
            existing_channel_id: None,
            existing_fsm_id: None,
            offchain_tx: None,
            reconnect_tx: None,
            timeout_idle: None,
            timeout_funding_create: None,
            timeout_funding_sign: None,
            timeout_funding_lock: None,
            timeout_sign: None,
            timeout_accept: None,
            timeout_initialized: None,
            timeout_awaiting_open: None,
            state_password: None,
            timing: Timing::default(),
        }
    }

    /// Account of this participant.
    pub fn own_id(&self) -> &str {
        match self.role {
            Role::Initiator => &self.initiator_id,
            Role::Responder => &self.responder_id,
        }
    }

    /// Websocket url carrying the channel parameters.
    pub fn ws_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        let fields = match serde_json::to_value(self)? {
            Value::Object(fields) => fields,
            _ => return Err(Error::Channel(String::from("Channel options are not a map"))),
        };
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in fields.iter() {
                if LOCAL_OPTIONS.contains(&key.as_str()) {
                    continue;
                }
                match value {
                    Value::Null => {}
                    Value::String(value) => {
                        query.append_pair(key, value);
                    }
                    value => {
                        query.append_pair(key, &value.to_string());
                    }
                }
            }
            query.append_pair("protocol", "json-rpc");
        }
        Ok(url)
    }
}
