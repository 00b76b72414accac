//! # Node Arena
//!
//! All resident nodes live in one sequence-keyed map. Parent and child
//! links are sequences resolved through this map rather than owning
//! references, which keeps the parent/child cycle out of the ownership
//! graph and makes eviction a plain map removal.
//!
//! The arena also owns the resident-node counter that drives eviction. The
//! root is permanent and excluded from the count; child stubs count from
//! the moment they are created, whether or not their record has been
//! faulted in yet.
//!
//! Concurrency: the map sits behind its own `RwLock`, independent of the
//! tree-structure lock. Readers holding the tree's reader lock insert
//! stubs during fault-in; the map lock is never held across store I/O.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::config::ROOT_SEQ;

use super::node::{Node, Seq};

#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: RwLock<HashMap<Seq, Arc<Node>>>,
    resident: AtomicI64,
}

impl NodeArena {
    pub fn new() -> NodeArena {
        NodeArena::default()
    }

    /// Installs the permanent root node. Called once at open.
    pub fn install_root(&self, root: Arc<Node>) {
        assert_eq!(root.seq(), ROOT_SEQ, "root must use the reserved sequence");
        let previous = self.nodes.write().insert(ROOT_SEQ, root);
        assert!(previous.is_none(), "root installed twice");
    }

    pub fn root(&self) -> Arc<Node> {
        self.get(ROOT_SEQ).expect("root is permanent")
    }

    pub fn get(&self, seq: Seq) -> Option<Arc<Node>> {
        self.nodes.read().get(&seq).cloned()
    }

    /// Inserts a freshly created node (split intermediates, new leaves).
    /// The sequence must be unallocated.
    pub fn insert(&self, node: Arc<Node>) {
        let seq = node.seq();
        let previous = self.nodes.write().insert(seq, node);
        assert!(previous.is_none(), "sequence {seq} inserted twice");
        self.resident.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the stub for `seq`, creating it if absent. The boolean is
    /// true when this call created the stub (and counted it).
    pub fn stub_if_absent(&self, seq: Seq, parent: Seq) -> (Arc<Node>, bool) {
        if let Some(existing) = self.get(seq) {
            return (existing, false);
        }
        let mut nodes = self.nodes.write();
        if let Some(existing) = nodes.get(&seq) {
            return (Arc::clone(existing), false);
        }
        let node = Arc::new(Node::stub(seq, parent));
        nodes.insert(seq, Arc::clone(&node));
        self.resident.fetch_add(1, Ordering::AcqRel);
        (node, true)
    }

    /// Drops a node from the arena (delete or eviction sweep). The root is
    /// never removed.
    pub fn remove(&self, seq: Seq) -> Option<Arc<Node>> {
        assert_ne!(seq, ROOT_SEQ, "root is never removed from the arena");
        let removed = self.nodes.write().remove(&seq);
        if removed.is_some() {
            self.resident.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Resident nodes excluding the root.
    pub fn resident_count(&self) -> i64 {
        self.resident.load(Ordering::Acquire)
    }

    /// Total arena entries including the root.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }
}
