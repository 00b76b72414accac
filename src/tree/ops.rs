//! # Tree Algorithms
//!
//! The put/delete/locate walks. All of them consume the key one common
//! prefix at a time against the edge labels of the current node's children;
//! sibling edges never share a first byte, so at most one child can match.
//!
//! ## Put
//!
//! Walking with remainder `r` against child edge `e`, with `p` their
//! longest common prefix:
//!
//! ```text
//! p empty            try the next sibling
//! p == r == e        key lands on the child: attach / replace / cas
//! p == r, p < e      split: child keeps p and the new value, a fresh node
//!                    takes the edge tail plus the child's old payload
//! p == e, p < r      descend with r = r[p..]
//! p < r, p < e       three-way split: child becomes a pure branch over
//!                    the old tail and a fresh leaf
//! no child matched   append a new leaf under the current node
//! ```
//!
//! Splits allocate sequences for the nodes that move; the node being split
//! keeps its own sequence, so the parent's child list stays valid without
//! rewriting the parent.
//!
//! ## Delete
//!
//! Clearing a value leaves the node as a branch when it still has two or
//! more children. With exactly one child the node merges that child into
//! itself (path compression — again keeping its own sequence). A leaf is
//! unlinked from its parent, and the parent is then pruned or compressed
//! the same way, cascading upward. The root is never deleted or
//! compressed.
//!
//! All mutation helpers stage their record writes into the caller's open
//! batch; nothing here commits.

use std::sync::Arc;

use eyre::Result;
use smallvec::{smallvec, SmallVec};

use crate::config::ROOT_SEQ;
use crate::encoding::node_key;
use crate::error::TreeError;
use crate::storage::Store;

use super::node::{Node, NodeInner, Seq};
use super::TreeShared;

/// Precondition flavor of a put.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PutMode {
    InsertOnly,
    Overwrite,
    Cas { expected: i64, new_version: i64 },
}

impl PutMode {
    /// Cas may never create a key; the other modes may.
    fn fail_if_creating(self) -> Result<()> {
        if matches!(self, PutMode::Cas { .. }) {
            return Err(TreeError::NotFound.into());
        }
        Ok(())
    }
}

/// Result of walking a key down the tree.
pub(crate) struct Located {
    pub node: Arc<Node>,
    /// Concatenated edge labels from the root to `node`. May extend past
    /// the searched key when the key ends inside `node`'s edge.
    pub path: Vec<u8>,
    /// True when the key ended exactly at `node`'s edge boundary.
    pub exact: bool,
}

impl<S: Store> TreeShared<S> {
    /// Walks `key` from the root, faulting nodes in as needed.
    ///
    /// Returns the node whose path covers the key (`exact` when the match
    /// ends on an edge boundary), or `None` when the tree holds no such
    /// node. The empty key locates the root, never exactly.
    pub(crate) fn locate(&self, key: &[u8]) -> Result<Option<Located>> {
        let root = self.arena.root();
        self.ensure_loaded(&root)?;
        if key.is_empty() {
            return Ok(Some(Located {
                node: root,
                path: Vec::new(),
                exact: false,
            }));
        }

        let mut current = root;
        let mut path = Vec::with_capacity(key.len());
        let mut offset = 0usize;
        'descend: loop {
            let remainder = &key[offset..];
            let children: SmallVec<[Seq; 4]> = current.inner().children.clone();
            for seq in children {
                let child = self.child_node(&current, seq);
                self.ensure_loaded(&child)?;
                let (cp, edge_len) = {
                    let inner = child.inner();
                    (common_prefix_len(remainder, &inner.prefix), inner.prefix.len())
                };
                if cp == 0 {
                    continue;
                }
                if cp == remainder.len() {
                    path.extend_from_slice(&child.inner().prefix);
                    return Ok(Some(Located {
                        exact: cp == edge_len,
                        node: child,
                        path,
                    }));
                }
                if cp == edge_len {
                    path.extend_from_slice(&child.inner().prefix);
                    offset += cp;
                    current = child;
                    continue 'descend;
                }
                // Proper prefix of both: the key diverges inside this edge.
                return Ok(None);
            }
            return Ok(None);
        }
    }

    /// Put walk. Caller holds the writer lock and an open batch.
    pub(crate) fn put_locked(
        &self,
        key: &[u8],
        value: &[u8],
        mode: PutMode,
    ) -> Result<Option<Vec<u8>>> {
        let internal_key = self.internal_key_for(key);
        let root = self.arena.root();
        self.ensure_loaded(&root)?;

        let mut current = root;
        let mut offset = 0usize;
        'descend: loop {
            let remainder = &key[offset..];
            let children: SmallVec<[Seq; 4]> = current.inner().children.clone();
            for seq in children {
                let child = self.child_node(&current, seq);
                self.ensure_loaded(&child)?;
                let (cp, edge_len) = {
                    let inner = child.inner();
                    (common_prefix_len(remainder, &inner.prefix), inner.prefix.len())
                };
                if cp == 0 {
                    continue;
                }
                if cp == remainder.len() && cp == edge_len {
                    return self.put_existing(&child, &internal_key, value, mode);
                }
                if cp == remainder.len() {
                    return self.split_edge(&child, cp, &internal_key, value, mode);
                }
                if cp == edge_len {
                    offset += cp;
                    current = child;
                    continue 'descend;
                }
                return self.split_three_way(
                    &child,
                    cp,
                    &remainder[cp..],
                    &internal_key,
                    value,
                    mode,
                );
            }
            return self.append_leaf(&current, remainder, &internal_key, value, mode);
        }
    }

    /// The key lands exactly on `node`.
    fn put_existing(
        &self,
        node: &Arc<Node>,
        internal_key: &[u8],
        value: &[u8],
        mode: PutMode,
    ) -> Result<Option<Vec<u8>>> {
        let (has_value, current_version) = {
            let inner = node.inner();
            (inner.has_value(), inner.version)
        };

        if !has_value {
            // Pure branch picking up a value: fresh version regardless of mode.
            if matches!(mode, PutMode::Cas { .. }) {
                return Err(TreeError::NotFound.into());
            }
            {
                let mut inner = node.inner_mut();
                inner.internal_key = internal_key.to_vec();
                inner.version = 0;
            }
            self.write_value(internal_key, 0, value)?;
            self.persist_node(node)?;
            return Ok(None);
        }

        debug_assert_eq!(
            node.inner().internal_key,
            internal_key,
            "internal key diverged from the node path"
        );

        let next_version = match mode {
            PutMode::InsertOnly => return Err(TreeError::AlreadyExists.into()),
            PutMode::Overwrite => current_version + 1,
            PutMode::Cas {
                expected,
                new_version,
            } => {
                if current_version != expected {
                    return Err(TreeError::VersionMismatch {
                        expected,
                        found: current_version,
                    }
                    .into());
                }
                new_version
            }
        };

        let previous = self.read_value(internal_key)?;
        node.inner_mut().version = next_version;
        self.write_value(internal_key, next_version, value)?;
        self.persist_node(node)?;
        Ok(Some(previous.value))
    }

    /// The key ends inside `child`'s edge: `child` keeps the matched head
    /// and the new value; a fresh node takes the edge tail together with
    /// `child`'s previous children, value reference and version.
    fn split_edge(
        &self,
        child: &Arc<Node>,
        cp: usize,
        internal_key: &[u8],
        value: &[u8],
        mode: PutMode,
    ) -> Result<Option<Vec<u8>>> {
        mode.fail_if_creating()?;
        let tail_seq = self.alloc_seq()?;

        let tail_inner = {
            let mut inner = child.inner_mut();
            let tail = NodeInner {
                prefix: inner.prefix.split_off(cp),
                children: std::mem::take(&mut inner.children),
                internal_key: std::mem::take(&mut inner.internal_key),
                version: inner.version,
            };
            inner.children = smallvec![tail_seq];
            inner.internal_key = internal_key.to_vec();
            inner.version = 0;
            tail
        };
        self.reparent_resident(&tail_inner.children, tail_seq);

        let tail = Arc::new(Node::resident(tail_seq, child.seq(), tail_inner));
        self.arena.insert(Arc::clone(&tail));

        self.write_value(internal_key, 0, value)?;
        self.persist_node(&tail)?;
        self.persist_node(child)?;
        Ok(None)
    }

    /// Key and edge diverge after a proper common prefix: `child` becomes
    /// a pure branch over the old tail and a fresh leaf.
    fn split_three_way(
        &self,
        child: &Arc<Node>,
        cp: usize,
        new_suffix: &[u8],
        internal_key: &[u8],
        value: &[u8],
        mode: PutMode,
    ) -> Result<Option<Vec<u8>>> {
        mode.fail_if_creating()?;
        let tail_seq = self.alloc_seq()?;
        let leaf_seq = self.alloc_seq()?;

        let tail_inner = {
            let mut inner = child.inner_mut();
            let tail = NodeInner {
                prefix: inner.prefix.split_off(cp),
                children: std::mem::take(&mut inner.children),
                internal_key: std::mem::take(&mut inner.internal_key),
                version: inner.version,
            };
            inner.children = smallvec![tail_seq, leaf_seq];
            inner.version = 0;
            tail
        };
        self.reparent_resident(&tail_inner.children, tail_seq);

        let tail = Arc::new(Node::resident(tail_seq, child.seq(), tail_inner));
        let leaf = Arc::new(Node::resident(
            leaf_seq,
            child.seq(),
            NodeInner {
                prefix: new_suffix.to_vec(),
                children: smallvec![],
                internal_key: internal_key.to_vec(),
                version: 0,
            },
        ));
        self.arena.insert(Arc::clone(&tail));
        self.arena.insert(Arc::clone(&leaf));

        self.write_value(internal_key, 0, value)?;
        self.persist_node(&tail)?;
        self.persist_node(&leaf)?;
        self.persist_node(child)?;
        Ok(None)
    }

    /// No child shares a first byte with the remainder: new leaf.
    fn append_leaf(
        &self,
        parent: &Arc<Node>,
        remainder: &[u8],
        internal_key: &[u8],
        value: &[u8],
        mode: PutMode,
    ) -> Result<Option<Vec<u8>>> {
        mode.fail_if_creating()?;
        let seq = self.alloc_seq()?;
        let leaf = Arc::new(Node::resident(
            seq,
            parent.seq(),
            NodeInner {
                prefix: remainder.to_vec(),
                children: smallvec![],
                internal_key: internal_key.to_vec(),
                version: 0,
            },
        ));
        self.arena.insert(Arc::clone(&leaf));
        parent.inner_mut().children.push(seq);

        self.write_value(internal_key, 0, value)?;
        self.persist_node(&leaf)?;
        self.persist_node(parent)?;
        Ok(None)
    }

    /// Delete walk. Caller holds the writer lock and an open batch.
    pub(crate) fn delete_locked(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(located) = self.locate(key)? else {
            return Ok(None);
        };
        if !located.exact {
            return Ok(None);
        }
        let node = located.node;
        let internal_key = {
            let inner = node.inner();
            if !inner.has_value() {
                return Ok(None);
            }
            inner.internal_key.clone()
        };

        let previous = self.read_value(&internal_key)?;
        self.store.delete_batch(&internal_key)?;

        let child_count = {
            let mut inner = node.inner_mut();
            inner.internal_key.clear();
            inner.version = 0;
            inner.children.len()
        };
        match child_count {
            0 => self.remove_leaf(&node)?,
            1 => self.compress_into(&node)?,
            _ => self.persist_node(&node)?,
        }
        Ok(Some(previous.value))
    }

    /// Path compression: `node` has exactly one child and no value. The
    /// child's payload moves up into `node` (which keeps its sequence, so
    /// the parent's child list stays valid) and the child's record is
    /// deleted.
    fn compress_into(&self, node: &Arc<Node>) -> Result<()> {
        debug_assert_ne!(node.seq(), ROOT_SEQ, "the root is never compressed");
        let child_seq = node.inner().children[0];
        let child = self.child_node(node, child_seq);
        self.ensure_loaded(&child)?;

        let grandchildren: SmallVec<[Seq; 4]> = {
            let child_inner = child.inner();
            let mut inner = node.inner_mut();
            inner.prefix.extend_from_slice(&child_inner.prefix);
            inner.children = child_inner.children.clone();
            inner.internal_key = child_inner.internal_key.clone();
            inner.version = child_inner.version;
            inner.children.clone()
        };
        self.reparent_resident(&grandchildren, node.seq());

        self.store.delete_batch(&node_key(child_seq))?;
        self.arena.remove(child_seq);
        self.persist_node(node)
    }

    /// Unlinks a leafless, valueless node from its parent and prunes
    /// upward: a parent left valueless with no children is deleted too,
    /// one left valueless with a single child is compressed.
    fn remove_leaf(&self, node: &Arc<Node>) -> Result<()> {
        let mut current = Arc::clone(node);
        loop {
            let parent_seq = current
                .parent()
                .expect("non-root node always has a parent link");
            let parent = self.arena.get(parent_seq).unwrap_or_else(|| {
                panic!(
                    "parent {} of node {} missing from arena",
                    parent_seq,
                    current.seq()
                )
            });

            self.store.delete_batch(&node_key(current.seq()))?;
            self.arena.remove(current.seq());

            let (child_count, parent_has_value) = {
                let mut inner = parent.inner_mut();
                let seq = current.seq();
                inner.children.retain(|s| *s != seq);
                (inner.children.len(), inner.has_value())
            };

            if parent_seq == ROOT_SEQ {
                return self.persist_node(&parent);
            }
            match (child_count, parent_has_value) {
                (0, false) => current = parent,
                (1, false) => return self.compress_into(&parent),
                _ => return self.persist_node(&parent),
            }
        }
    }

    fn reparent_resident(&self, children: &[Seq], parent: Seq) {
        for &seq in children {
            if let Some(child) = self.arena.get(seq) {
                child.set_parent(parent);
            }
        }
    }

    pub(crate) fn child_node(&self, parent: &Arc<Node>, seq: Seq) -> Arc<Node> {
        self.arena.get(seq).unwrap_or_else(|| {
            panic!(
                "child {} of node {} missing from arena",
                seq,
                parent.seq()
            )
        })
    }
}

/// Longest common byte prefix of `a` and `b`.
///
/// When both inputs are valid UTF-8 the returned length never falls inside
/// a multi-byte sequence: the boundary backs off over continuation bytes so
/// edge labels of textual keys stay well-formed. Arbitrary byte strings get
/// the raw byte-level answer.
pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    let mut n = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    if n == a.len() && n == b.len() {
        return n;
    }
    if std::str::from_utf8(a).is_ok() && std::str::from_utf8(b).is_ok() {
        while n > 0 && (is_continuation(a.get(n)) || is_continuation(b.get(n))) {
            n -= 1;
        }
    }
    n
}

fn is_continuation(byte: Option<&u8>) -> bool {
    matches!(byte, Some(b) if b & 0xC0 == 0x80)
}
