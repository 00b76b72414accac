//! # Prefix and Delimiter Enumeration
//!
//! Both enumerations locate the start node (the node whose path covers the
//! prefix, or the marker's node when resuming) and pre-order walk its
//! sub-tree in child-list order — the stable insertion order, not
//! lexicographic order.
//!
//! Delimiter walk rules, applied at every node:
//!
//! ```text
//! edge contains the delimiter   emit one COMMON_PREFIX for the path
//!                               truncated through the first occurrence,
//!                               skip the whole sub-tree
//! node carries a value          emit CONTENT, keep descending
//! pure branch                   descend
//! ```
//!
//! The marker is an exclusive lower bound: only keys comparing strictly
//! greater are emitted, so a marker equal to an existing key skips that
//! key while its sub-tree is still walked. An empty delimiter never
//! matches, which degenerates the walk into plain prefix enumeration.
//!
//! Enumeration is two-phase. Under the tree's reader lock only keys and
//! internal-key references are collected; values are then resolved against
//! a store snapshot with the lock released, so value I/O never extends the
//! lock hold. A reference whose value record was deleted by a later commit
//! resolves to nothing and the tuple is dropped.

use std::sync::Arc;

use eyre::{Result, WrapErr};

use crate::encoding::{decode_internal_key, ValueEnvelope};
use crate::storage::Store;

use super::node::{Node, Seq};
use super::TreeShared;

/// Kind of one [`ListEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEntryKind {
    /// Rollup of every key sharing the prefix up to and including the
    /// first delimiter occurrence. Carries no value.
    CommonPrefix,
    /// A stored key with its value.
    Content,
}

/// One tuple produced by [`crate::Tree::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub kind: ListEntryKind,
}

/// Phase-one output: a key plus the reference to resolve, if any.
pub(crate) struct PendingEntry {
    key: Vec<u8>,
    internal_key: Option<Vec<u8>>,
}

struct ListWalk<'a> {
    delimiter: &'a [u8],
    marker: &'a [u8],
    limit: usize,
    max_levels: usize,
    out: Vec<PendingEntry>,
}

impl<S: Store> TreeShared<S> {
    /// Collects user keys under `prefix` in walk order.
    pub(crate) fn collect_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let Some(located) = self.locate(prefix)? else {
            return Ok(Vec::new());
        };
        let mut keys = Vec::new();
        self.walk_keys(&located.node, &mut keys)?;
        Ok(keys)
    }

    fn walk_keys(&self, node: &Arc<Node>, out: &mut Vec<Vec<u8>>) -> Result<()> {
        self.ensure_loaded(node)?;
        let children: Vec<Seq> = {
            let inner = node.inner();
            if inner.has_value() {
                out.push(decode_internal_key(&inner.internal_key)?.to_vec());
            }
            inner.children.iter().copied().collect()
        };
        for seq in children {
            let child = self.child_node(node, seq);
            self.walk_keys(&child, out)?;
        }
        Ok(())
    }

    /// Phase one of `list`: walk under the reader lock, collecting keys
    /// and value references.
    pub(crate) fn collect_list(
        &self,
        prefix: &[u8],
        delimiter: &[u8],
        limit: usize,
        max_levels: usize,
        marker: &[u8],
    ) -> Result<Vec<PendingEntry>> {
        let start_key = if marker.is_empty() { prefix } else { marker };
        let Some(located) = self.locate(start_key)? else {
            return Ok(Vec::new());
        };

        let mut walk = ListWalk {
            delimiter,
            marker,
            limit,
            max_levels,
            out: Vec::new(),
        };
        self.walk_list(&located.node, &located.path, 0, &mut walk)?;
        Ok(walk.out)
    }

    /// Returns false once the limit is reached and the walk must stop.
    fn walk_list(
        &self,
        node: &Arc<Node>,
        path: &[u8],
        depth: usize,
        walk: &mut ListWalk<'_>,
    ) -> Result<bool> {
        if walk.out.len() >= walk.limit {
            return Ok(false);
        }
        self.ensure_loaded(node)?;

        let children: Vec<Seq> = {
            let inner = node.inner();

            if !walk.delimiter.is_empty() {
                if let Some(pos) = find_sub(&inner.prefix, walk.delimiter) {
                    // Rollup: path truncated through the first delimiter in
                    // this edge. The sub-tree is skipped either way.
                    let cut = path.len() - inner.prefix.len() + pos + walk.delimiter.len();
                    if &path[..cut] > walk.marker {
                        walk.out.push(PendingEntry {
                            key: path[..cut].to_vec(),
                            internal_key: None,
                        });
                    }
                    return Ok(walk.out.len() < walk.limit);
                }
            }

            if inner.has_value() && path > walk.marker {
                walk.out.push(PendingEntry {
                    key: path.to_vec(),
                    internal_key: Some(inner.internal_key.clone()),
                });
                if walk.out.len() >= walk.limit {
                    return Ok(false);
                }
            }

            inner.children.iter().copied().collect()
        };

        if depth >= walk.max_levels {
            return Ok(true);
        }
        for seq in children {
            let child = self.child_node(node, seq);
            self.ensure_loaded(&child)?;
            let mut child_path = path.to_vec();
            child_path.extend_from_slice(&child.inner().prefix);
            if !self.walk_list(&child, &child_path, depth + 1, walk)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Phase two of `list`: resolve CONTENT references against a snapshot.
    pub(crate) fn resolve_list(&self, pending: Vec<PendingEntry>) -> Result<Vec<ListEntry>> {
        let snapshot = self.store.snapshot()?;
        let mut out = Vec::with_capacity(pending.len());
        for entry in pending {
            match entry.internal_key {
                None => out.push(ListEntry {
                    key: entry.key,
                    value: Vec::new(),
                    kind: ListEntryKind::CommonPrefix,
                }),
                Some(internal_key) => match self.store.get_at(&snapshot, &internal_key)? {
                    Some(raw) => {
                        let envelope =
                            ValueEnvelope::decode(&raw).wrap_err("corrupt value envelope")?;
                        out.push(ListEntry {
                            key: entry.key,
                            value: envelope.value,
                            kind: ListEntryKind::Content,
                        });
                    }
                    None => {
                        // Deleted between collection and resolution.
                        tracing::debug!(
                            key = %String::from_utf8_lossy(&entry.key),
                            "value vanished during enumeration, dropping tuple"
                        );
                    }
                },
            }
        }
        Ok(out)
    }
}

fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
