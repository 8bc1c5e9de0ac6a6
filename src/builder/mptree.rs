//! Merkle Patricia trees as they travel inside proofs of inclusion.
//!
//! The binary form is `[root_hash, [[node_hash, [node items]], ...]]`. A tree
//! may carry only part of its nodes, in that case lookups of keys behind a
//! missing node return `None`.

use std::collections::HashMap;

use serde_json::json;

use crate::builder::entry::{unpack_entry_raw, EntryTag};
use crate::builder::value::Params;
use crate::crypto::hash;
use crate::encoder::{decode, encode, Encoding};
use crate::errors::{Error, Result};
use crate::rlp::{self, Rlp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeType {
    Branch,
    Extension,
    Leaf,
}

struct ParsedNode<'a> {
    node_type: NodeType,
    value: Option<&'a [u8]>,
    path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MPTree {
    root_hash: Vec<u8>,
    nodes: Vec<(Vec<u8>, Vec<Vec<u8>>)>,
    index: HashMap<Vec<u8>, usize>,
    complete: bool,
    encoding: Encoding,
    tag: EntryTag,
}

fn node_hash(items: &[Vec<u8>]) -> Vec<u8> {
    let node = Rlp::List(items.iter().map(|item| Rlp::Bytes(item.clone())).collect());
    hash(&rlp::encode(&node)).to_vec()
}

fn parse_node(node: &[Vec<u8>]) -> Result<ParsedNode<'_>> {
    match node.len() {
        17 => Ok(ParsedNode {
            node_type: NodeType::Branch,
            value: Some(node[16].as_slice()).filter(|value| !value.is_empty()),
            path: String::new(),
        }),
        2 => {
            let first = node[0].first().copied().unwrap_or(0);
            let nibble = first >> 4;
            if nibble > 3 {
                return Err(Error::UnknownPathNibble(nibble));
            }
            let node_type = if nibble <= 1 {
                NodeType::Extension
            } else {
                NodeType::Leaf
            };
            // even paths carry a padding nibble next to the flag nibble
            let skip = if nibble == 0 || nibble == 2 { 2 } else { 1 };
            let path = hex::encode(&node[0]).get(skip..).unwrap_or("").to_string();
            Ok(ParsedNode {
                node_type,
                value: match node_type {
                    NodeType::Leaf => Some(node[1].as_slice()),
                    _ => None,
                },
                path,
            })
        }
        other => Err(Error::UnknownNodeLength(other)),
    }
}

impl MPTree {
    /// Parse and verify a tree in its binary form.
    pub fn from_rlp(item: &Rlp, encoding: Encoding, tag: EntryTag) -> Result<Self> {
        let parts = item.as_list()?;
        if parts.len() != 2 {
            return Err(Error::argument("MPTree binary length", 2, parts.len()));
        }
        let root_hash = parts[0].as_bytes()?.to_vec();
        let mut nodes = vec![];
        let mut index = HashMap::new();
        for raw_node in parts[1].as_list()? {
            let pair = raw_node.as_list()?;
            if pair.len() != 2 {
                return Err(Error::argument("MPTree node length", 2, pair.len()));
            }
            let key = pair[0].as_bytes()?.to_vec();
            let items = pair[1]
                .as_list()?
                .iter()
                .map(|item| item.as_bytes().map(|bytes| bytes.to_vec()))
                .collect::<Result<Vec<Vec<u8>>>>()?;
            if !index.contains_key(&key) {
                index.insert(key.clone(), nodes.len());
                nodes.push((key, items));
            }
        }

        let mut tree = MPTree {
            root_hash,
            nodes,
            index,
            complete: true,
            encoding,
            tag,
        };

        if !tree.index.contains_key(&tree.root_hash) {
            if !tree.nodes.is_empty() {
                return Err(Error::MissingNodeInTree);
            }
            tree.complete = false;
            return Ok(tree);
        }

        for (key, node) in tree.nodes.iter() {
            if node_hash(node) != *key {
                return Err(Error::MerkleTreeHashMismatch);
            }
            match parse_node(node)?.node_type {
                NodeType::Branch => {
                    let has_missing_child = node[..16]
                        .iter()
                        .filter(|child| !child.is_empty())
                        .any(|child| !tree.index.contains_key(child));
                    if has_missing_child {
                        tree.complete = false;
                    }
                }
                NodeType::Extension => {
                    if !tree.index.contains_key(&node[1]) {
                        return Err(Error::MissingNodeInTree);
                    }
                }
                NodeType::Leaf => {}
            }
        }
        Ok(tree)
    }

    pub fn to_rlp(&self) -> Rlp {
        Rlp::List(vec![
            Rlp::Bytes(self.root_hash.clone()),
            Rlp::List(
                self.nodes
                    .iter()
                    .map(|(key, items)| {
                        Rlp::List(vec![
                            Rlp::Bytes(key.clone()),
                            Rlp::List(items.iter().map(|i| Rlp::Bytes(i.clone())).collect()),
                        ])
                    })
                    .collect(),
            ),
        ])
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_equal(&self, other: &MPTree) -> bool {
        self.root_hash == other.root_hash
    }

    pub fn root_hash(&self) -> &[u8] {
        &self.root_hash
    }

    fn node(&self, key: &[u8]) -> Option<&Vec<Vec<u8>>> {
        self.index.get(key).map(|position| &self.nodes[*position].1)
    }

    fn missing_node(&self) -> Result<Option<Vec<u8>>> {
        if self.complete {
            Err(Error::decode("Can't find node in complete tree"))
        } else {
            Ok(None)
        }
    }

    fn get_raw(&self, hex_key: &str) -> Result<Option<Vec<u8>>> {
        let mut search_from = self.root_hash.clone();
        let mut key = hex_key.to_string();
        loop {
            let node = match self.node(&search_from) {
                Some(node) => node,
                None => return self.missing_node(),
            };
            let parsed = parse_node(node)?;
            match parsed.node_type {
                NodeType::Branch => {
                    if key.is_empty() {
                        return Ok(parsed.value.map(|value| value.to_vec()));
                    }
                    let position = usize::from_str_radix(&key[..1], 16)
                        .map_err(|_| Error::decode(format!("Invalid key nibble in {}", key)))?;
                    if node[position].is_empty() {
                        return Ok(None);
                    }
                    search_from = node[position].clone();
                    key = key[1..].to_string();
                }
                NodeType::Extension => {
                    if !key.starts_with(&parsed.path) {
                        return Ok(None);
                    }
                    search_from = node[1].clone();
                    key = key[parsed.path.len()..].to_string();
                }
                NodeType::Leaf => {
                    if parsed.path != key {
                        return Ok(None);
                    }
                    return Ok(parsed.value.map(|value| value.to_vec()));
                }
            }
        }
    }

    /// Look up the entry stored under an encoded key.
    pub fn get(&self, key: &str) -> Result<Option<Params>> {
        let hex_key = hex::encode(decode(key)?);
        match self.get_raw(&hex_key)? {
            Some(value) => Ok(Some(unpack_entry_raw(&value, Some(self.tag))?)),
            None => Ok(None),
        }
    }

    fn collect_raw(
        &self,
        search_from: &[u8],
        key: String,
        entries: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<()> {
        let node = match self.node(search_from) {
            Some(node) => node,
            None => return self.missing_node().map(|_| ()),
        };
        let parsed = parse_node(node)?;
        match parsed.node_type {
            NodeType::Branch => {
                for (position, child) in node[..16].iter().enumerate() {
                    if !child.is_empty() {
                        self.collect_raw(child, format!("{}{:x}", key, position), entries)?;
                    }
                }
                if let Some(value) = parsed.value {
                    entries.push((key, value.to_vec()));
                }
            }
            NodeType::Extension => {
                self.collect_raw(&node[1], format!("{}{}", key, parsed.path), entries)?;
            }
            NodeType::Leaf => {
                let value = parsed.value.unwrap_or_default();
                entries.push((format!("{}{}", key, parsed.path), value.to_vec()));
            }
        }
        Ok(())
    }

    /// All entries reachable from the root, keyed by their encoded key.
    pub fn entries(&self) -> Result<Vec<(String, Params)>> {
        let mut raw = vec![];
        self.collect_raw(&self.root_hash, String::new(), &mut raw)?;
        raw.into_iter()
            // contract store keys are longer than contract addresses
            .filter(|(key, _)| self.encoding != Encoding::ContractAddress || key.len() == 64)
            .map(|(key, value)| {
                let key_bytes = hex::decode(&key)
                    .map_err(|err| Error::decode(format!("Invalid tree key {}: {}", key, err)))?;
                Ok((
                    encode(&key_bytes, self.encoding)?,
                    unpack_entry_raw(&value, Some(self.tag))?,
                ))
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "rootHash": hex::encode(&self.root_hash),
            "isComplete": self.complete,
            "nodes": self.nodes.len(),
        })
    }
}
