use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure surfaced by the codec, the builder and the channel client.
//
// Variants carry owned strings so the error stays `Clone` and can be sent
// through the channel event broadcast.
//
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{0}")]
    Decode(String),

    #[error("{name} should be {expected}, got {actual} instead")]
    Argument {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("{0}")]
    IllegalArgument(String),

    #[error("Invalid checksum")]
    InvalidChecksum,

    #[error("Payload should be {expected} bytes, got {actual} instead")]
    PayloadLength { expected: usize, actual: usize },

    #[error("Encoded string have a wrong type: {actual} (expected: {expected})")]
    PrefixMismatch { actual: String, expected: String },

    #[error("Prefix for id-tag {0} not found.")]
    PrefixNotFound(u8),

    #[error("Id tag for prefix {0} not found.")]
    TagNotFound(String),

    #[error("Transaction schema not implemented for tag {name} ({tag}) version {version}")]
    SchemaNotFound {
        name: String,
        tag: u64,
        version: String,
    },

    #[error("Node hash is not equal to provided one")]
    MerkleTreeHashMismatch,

    #[error("Can't find a node by root hash")]
    MissingNodeInTree,

    #[error("Unknown node length: {0}")]
    UnknownNodeLength(usize),

    #[error("Unknown path nibble: {0}")]
    UnknownPathNibble(u8),

    #[error("Name should end with .chain: {0}")]
    InvalidName(String),

    #[error("the provided fee {provided} is not enough to execute the claim, required: {required}")]
    InsufficientNameFee { provided: u128, required: u128 },

    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocol(u64),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("{0}")]
    Channel(String),

    #[error("{0}")]
    ChannelConnection(String),

    #[error("{0}")]
    ChannelCall(String),

    #[error("Server pong timed out")]
    ChannelPingTimedOut,

    #[error("Unexpected message received:\n\n{0}")]
    UnexpectedChannelMessage(String),

    #[error("State Channels FSM entered unknown state")]
    UnknownChannelState,

    #[error("Error while handling incoming message: {0}")]
    ChannelIncomingMessage(String),

    #[error("Node request failed: {0}")]
    Node(String),

    #[error("json: {0}")]
    Json(String),

    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("url: {0}")]
    Url(String),

    #[error("config: {0}")]
    Config(String),
}

impl Error {
    pub fn argument(
        name: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Error::Argument {
            name: name.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Url(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Node(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
