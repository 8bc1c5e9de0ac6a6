use std::convert::TryFrom;

use crate::builder::field::{BuildContext, BuildOptions, FieldType};
use crate::builder::helpers::{read_int, write_int};
use crate::builder::value::Params;
use crate::encoder::{decode, encode, Encoding};
use crate::errors::{Error, Result};
use crate::rlp::{self, Rlp};

/// One (tag, version) layout. The tag and version header elements are
/// implicit and precede `fields` on the wire.
#[derive(Debug)]
pub struct Schema {
    pub tag: u64,
    pub version: u64,
    pub default: bool,
    pub fields: &'static [(&'static str, FieldType)],
}

impl Schema {
    /// Number of RLP elements of a record, header included.
    pub fn element_count(&self) -> usize {
        self.fields.len() + 2
    }
}

/// Tag or version header element.
fn read_short(bytes: &[u8], name: &str) -> Result<u64> {
    u64::try_from(read_int(bytes)?)
        .map_err(|_| Error::decode(format!("RLP {} does not fit in 64 bits", name)))
}

/// A static set of schemas sharing a tag space.
pub struct Registry {
    pub schemas: &'static [Schema],
    pub tag_name: fn(u64) -> String,
}

impl Registry {
    /// Resolve the schema of a tag, the default version when none is given.
    pub fn get_schema(&self, tag: u64, version: Option<u64>) -> Result<&'static Schema> {
        let not_found = |version: String| Error::SchemaNotFound {
            name: (self.tag_name)(tag),
            tag,
            version,
        };
        let candidates: Vec<&'static Schema> =
            self.schemas.iter().filter(|s| s.tag == tag).collect();
        if candidates.is_empty() {
            return Err(not_found(
                version.map_or_else(|| String::from("default"), |v| v.to_string()),
            ));
        }
        match version {
            Some(version) => candidates
                .into_iter()
                .find(|s| s.version == version)
                .ok_or_else(|| not_found(version.to_string())),
            None => candidates
                .iter()
                .find(|s| s.default)
                .or_else(|| candidates.iter().max_by_key(|s| s.version))
                .copied()
                .ok_or_else(|| not_found(String::from("default"))),
        }
    }

    /// Serialize a record into RLP bytes.
    pub fn serialize(&self, params: &Params, ctx: &BuildContext) -> Result<Vec<u8>> {
        let schema = self.get_schema(params.tag, params.version)?;
        let mut items = Vec::with_capacity(schema.element_count());
        items.push(Rlp::Bytes(write_int(schema.tag as u128)));
        items.push(Rlp::Bytes(write_int(schema.version as u128)));
        for (name, field) in schema.fields.iter() {
            items.push(field.serialize(name, params.get(name), params, ctx)?);
        }
        Ok(rlp::encode(&Rlp::List(items)))
    }

    /// Deserialize RLP bytes, failing when the tag differs from `expected_tag`.
    pub fn deserialize(&self, data: &[u8], expected_tag: Option<u64>) -> Result<Params> {
        let items = rlp::decode(data)?.into_list()?;
        if items.len() < 2 {
            return Err(Error::argument("RLP length", "at least 2", items.len()));
        }
        let tag = read_short(items[0].as_bytes()?, "tag")?;
        let version = read_short(items[1].as_bytes()?, "version")?;
        let schema = self.get_schema(tag, Some(version))?;
        if let Some(expected) = expected_tag {
            if expected != tag {
                return Err(Error::decode(format!(
                    "Expected {} tag, got {} instead",
                    (self.tag_name)(expected),
                    (self.tag_name)(tag)
                )));
            }
        }
        if items.len() != schema.element_count() {
            return Err(Error::argument("RLP length", schema.element_count(), items.len()));
        }
        let mut params = Params::new(tag).with_version(version);
        for ((name, field), item) in schema.fields.iter().zip(items[2..].iter()) {
            params.set(name, field.deserialize(name, item)?);
        }
        Ok(params)
    }

    /// Serialize and prefix-encode a record.
    pub fn pack(&self, params: &Params, options: &BuildOptions, encoding: Encoding) -> Result<String> {
        let raw = self.serialize(params, &BuildContext::new(options))?;
        encode(&raw, encoding)
    }

    /// Decode and deserialize a prefix-encoded record.
    pub fn unpack(&self, encoded: &str, expected_tag: Option<u64>) -> Result<Params> {
        self.deserialize(&decode(encoded)?, expected_tag)
    }
}
