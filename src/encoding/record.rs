//! # Node and Value Record Codecs
//!
//! Two record bodies are persisted by the tree:
//!
//! ```text
//! node record   varint(len) prefix-bytes        edge label
//!               varint(n)   zigzag(seq) * n     ordered child sequences
//!               varint(len) internal-key-bytes  empty means "no value"
//!               zigzag(version)
//!
//! value record  zigzag(version) value-bytes     envelope for a user value
//! ```
//!
//! The node's own sequence is deliberately absent from the body: it is the
//! store key, and storing it twice invites divergence. Parent links and the
//! in-memory status are runtime state and are never persisted.
//!
//! Decoding is strict: truncated input and trailing garbage are errors, and
//! both surface the offending detail in the message. A corrupt node record
//! is unrecoverable for the tree, so the caller treats decode failure as
//! fatal; this module only reports it.

use eyre::{ensure, Result};
use smallvec::SmallVec;

use super::varint::{get_varint, get_varint_i64, put_varint, put_varint_i64, varint_len};

/// Decoded body of a node record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeRecord {
    /// Edge label extending the parent's path.
    pub prefix: Vec<u8>,
    /// Child sequences in insertion order.
    pub children: SmallVec<[i64; 4]>,
    /// Store key of this node's value record; empty when the node is a
    /// pure branch.
    pub internal_key: Vec<u8>,
    /// Compare-and-set version of the value.
    pub version: i64,
}

impl NodeRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        put_varint(&mut out, self.prefix.len() as u64);
        out.extend_from_slice(&self.prefix);
        put_varint(&mut out, self.children.len() as u64);
        for &child in &self.children {
            put_varint_i64(&mut out, child);
        }
        put_varint(&mut out, self.internal_key.len() as u64);
        out.extend_from_slice(&self.internal_key);
        put_varint_i64(&mut out, self.version);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<NodeRecord> {
        let (prefix, rest) = get_bytes(buf, "node prefix")?;
        let (child_count, mut rest) = get_varint(rest)?;
        // Capacity comes from the input, so cap it; a corrupt count fails
        // on the first child read instead of allocating.
        let mut children = SmallVec::with_capacity(child_count.min(64) as usize);
        for _ in 0..child_count {
            let (seq, tail) = get_varint_i64(rest)?;
            children.push(seq);
            rest = tail;
        }
        let (internal_key, rest) = get_bytes(rest, "internal key")?;
        let (version, rest) = get_varint_i64(rest)?;
        ensure!(
            rest.is_empty(),
            "trailing {} bytes after node record",
            rest.len()
        );
        Ok(NodeRecord {
            prefix: prefix.to_vec(),
            children,
            internal_key: internal_key.to_vec(),
            version,
        })
    }

    pub fn has_value(&self) -> bool {
        !self.internal_key.is_empty()
    }

    fn encoded_len(&self) -> usize {
        varint_len(self.prefix.len() as u64)
            + self.prefix.len()
            + varint_len(self.children.len() as u64)
            + self.children.len() * 2
            + varint_len(self.internal_key.len() as u64)
            + self.internal_key.len()
            + 2
    }
}

/// Envelope around a stored user value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEnvelope {
    pub version: i64,
    pub value: Vec<u8>,
}

impl ValueEnvelope {
    pub fn new(version: i64, value: Vec<u8>) -> Self {
        Self { version, value }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.value.len() + 2);
        put_varint_i64(&mut out, self.version);
        out.extend_from_slice(&self.value);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<ValueEnvelope> {
        let (version, value) = get_varint_i64(buf)?;
        Ok(ValueEnvelope {
            version,
            value: value.to_vec(),
        })
    }
}

fn get_bytes<'a>(buf: &'a [u8], what: &str) -> Result<(&'a [u8], &'a [u8])> {
    let (len, rest) = get_varint(buf)?;
    let len = len as usize;
    ensure!(
        rest.len() >= len,
        "truncated {}: need {} bytes, have {}",
        what,
        len,
        rest.len()
    );
    Ok((&rest[..len], &rest[len..]))
}
