use std::collections::BTreeMap;

use serde_json::json;

use crate::builder::mptree::MPTree;

/// A field value of a transaction, entry or delegation record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(u128),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record(Params),
    Tree(MPTree),
}

impl Value {
    pub fn as_int(&self) -> Option<u128> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Params> {
        match self {
            Value::Record(params) => Some(params),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&MPTree> {
        match self {
            Value::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    /// Human readable kind, used in argument errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "an integer",
            Value::Bool(_) => "a boolean",
            Value::Str(_) => "a string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "a list",
            Value::Map(_) => "a map",
            Value::Record(_) => "a record",
            Value::Tree(_) => "a tree",
        }
    }

    /// JSON rendering. Integers that do not fit into u64 become strings,
    /// bytes become hex strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(value) => match u64::try_from(*value) {
                Ok(small) => json!(small),
                Err(_) => json!(value.to_string()),
            },
            Value::Bool(value) => json!(value),
            Value::Str(value) => json!(value),
            Value::Bytes(value) => json!(hex::encode(value)),
            Value::List(values) => {
                serde_json::Value::Array(values.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Record(params) => params.to_json(),
            Value::Tree(tree) => tree.to_json(),
        }
    }
}

impl From<u128> for Value {
    fn from(value: u128) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Int(value as u128)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as u128)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<Params> for Value {
    fn from(params: Params) -> Self {
        Value::Record(params)
    }
}

impl From<MPTree> for Value {
    fn from(tree: MPTree) -> Self {
        Value::Tree(tree)
    }
}

/// A record: its tag, an optional schema version and named field values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub tag: u64,
    pub version: Option<u64>,
    pub fields: BTreeMap<String, Value>,
}

impl Params {
    pub fn new(tag: impl Into<u64>) -> Self {
        Params {
            tag: tag.into(),
            version: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<u128> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_bytes)
    }

    pub fn get_list(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_list)
    }

    pub fn get_record(&self, key: &str) -> Option<&Params> {
        self.get(key).and_then(Value::as_record)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(String::from("tag"), json!(self.tag));
        if let Some(version) = self.version {
            object.insert(String::from("version"), json!(version));
        }
        for (key, value) in self.fields.iter() {
            object.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_builder_test() {
        let params = Params::new(12u64)
            .with("amount", 100u64)
            .with("payload", "hello")
            .with_version(1);
        assert_eq!(params.tag, 12);
        assert_eq!(params.version, Some(1));
        assert_eq!(params.get_int("amount"), Some(100));
        assert_eq!(params.get_str("payload"), Some("hello"));
        assert_eq!(params.get_int("payload"), None);
    }

    #[test]
    fn json_rendering_test() {
        let params = Params::new(12u64)
            .with("amount", u128::MAX)
            .with("fee", 5u64)
            .with("raw", vec![0xde, 0xad]);
        let rendered = params.to_json();
        assert_eq!(rendered["tag"], json!(12));
        assert_eq!(rendered["amount"], json!(u128::MAX.to_string()));
        assert_eq!(rendered["fee"], json!(5));
        assert_eq!(rendered["raw"], json!("dead"));
    }
}
