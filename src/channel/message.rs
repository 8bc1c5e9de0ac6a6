//! JSON-RPC frames of the node's channel websocket.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// An outbound notification, or a call when it carries an id.
#[derive(Serialize, Debug)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RpcErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<RpcErrorData>,
}

/// The node sends `"data": null` for errors without details.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RpcErrorData>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<RpcErrorData>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RpcError {
    pub fn codes(&self) -> Vec<i64> {
        self.data.iter().filter_map(|data| data.code).collect()
    }
}

/// An inbound frame: a reply to one of our calls (it has an `id`) or a
/// message pushed by the node.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Frame {
    /// The `params.data` object, `null` when missing.
    pub fn data(&self) -> &Value {
        &self.params["data"]
    }

    pub fn event(&self) -> Option<&str> {
        self.data()["event"].as_str()
    }

    pub fn info(&self) -> Option<&str> {
        self.data()["info"].as_str()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.params["channel_id"].as_str()
    }

    /// Signed state carried by `channels.update` and `channels.leave`.
    pub fn state(&self) -> Option<&str> {
        self.data()["state"].as_str()
    }

    /// `<tag>` of a `channels.sign.<tag>` request.
    pub fn sign_tag(&self) -> Option<&str> {
        self.method
            .strip_prefix("channels.sign.")
            .filter(|tag| !tag.is_empty() && !tag.contains('.'))
    }

    /// Human readable reason of a `channels.error` message.
    pub fn error_text(&self) -> String {
        [self.data.as_ref(), self.payload.as_ref(), Some(self.data())]
            .iter()
            .flatten()
            .find_map(|value| value["message"].as_str())
            .unwrap_or("Channel error")
            .to_string()
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}
