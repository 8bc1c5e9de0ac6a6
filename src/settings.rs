//! Settings of the command line client: a `[node]` table with the http
//! endpoint and an optional `[channel]` table with [`ChannelOptions`].
//!
//! Values come from a config file and from `AE_`-prefixed environment
//! variables, nested with `__` (`AE_CHANNEL__PUSH_AMOUNT=10`).

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{event, Level};

use crate::channel::ChannelOptions;
use crate::errors::Result;

pub const DEFAULT_NODE_URL: &str = "http://localhost:3013";

/// Channel options that stay text even when they look like a number.
const TEXT_OPTIONS: [&str; 11] = [
    "url",
    "role",
    "initiator_id",
    "responder_id",
    "host",
    "minimum_depth_strategy",
    "existing_channel_id",
    "existing_fsm_id",
    "offchain_tx",
    "reconnect_tx",
    "state_password",
];

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    #[serde(default = "default_node_url")]
    pub url: String,
}

fn default_node_url() -> String {
    String::from(DEFAULT_NODE_URL)
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            url: default_node_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    pub node: NodeSettings,
    pub channel: Option<ChannelOptions>,
}

impl Settings {
    /// Read the config file `name` (any extension the config crate knows,
    /// optional) and the environment.
    pub fn load(name: &str) -> Result<Settings> {
        let mut settings = config::Config::default();
        settings
            .merge(config::File::with_name(name).required(false))?
            .merge(config::Environment::with_prefix("AE").separator("__"))?;
        Settings::from_config(&settings)
    }

    pub fn from_config(settings: &config::Config) -> Result<Settings> {
        let node = match settings.get::<NodeSettings>("node") {
            Ok(node) => node,
            Err(config::ConfigError::NotFound(_)) => NodeSettings::default(),
            Err(err) => return Err(err.into()),
        };
        // config values cannot hold u128 amounts, the table goes through json
        let channel = match settings.get::<Value>("channel") {
            Ok(table) => Some(serde_json::from_value(numbers_from_text(table))?),
            Err(config::ConfigError::NotFound(_)) => None,
            Err(err) => return Err(err.into()),
        };
        event!(Level::DEBUG, "node endpoint {}", node.url);
        Ok(Settings { node, channel })
    }
}

/// Environment variables arrive as strings.
fn numbers_from_text(table: Value) -> Value {
    match table {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(text) if !TEXT_OPTIONS.contains(&key.as_str()) => {
                            match serde_json::from_str::<Value>(&text) {
                                Ok(number @ Value::Number(_)) => number,
                                _ => Value::String(text),
                            }
                        }
                        Value::Object(_) => numbers_from_text(value),
                        value => value,
                    };
                    (key, value)
                })
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}
