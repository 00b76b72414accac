//! # Radix Node
//!
//! One in-memory node per allocated sequence. A node carries its persisted
//! fields (edge label, ordered child sequences, value reference, version)
//! behind an `RwLock`, plus two pieces of runtime-only state in atomics:
//!
//! - **status** — ON_DISK / LOADING / IN_MEMORY. ON_DISK means the child
//!   list has not been faulted and the inner fields may be empty or stale;
//!   IN_MEMORY means the inner fields are authoritative; LOADING
//!   single-flights concurrent faulters.
//! - **parent** — the parent's sequence, resolved through the arena map.
//!   Persistence stores only the parent-to-child direction; this link is
//!   rebuilt whenever a fault-in creates the node as a child stub.
//!
//! ## Status protocol
//!
//! ```text
//! ON_DISK ──try_begin_load (CAS)──► LOADING ──finish_load──► IN_MEMORY
//!    ▲                                                           │
//!    └───────────────── mark_on_disk (eviction) ─────────────────┘
//! ```
//!
//! Only the thread that wins `try_begin_load` may write the inner fields
//! during the load; everyone else spins until IN_MEMORY. Eviction runs
//! under the tree's writer lock, so no reader observes the backward edge.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;

use crate::encoding::NodeRecord;

/// Node sequence number. Doubles as the node's store key.
pub type Seq = i64;

/// Parent marker for the root, which has no parent.
pub const NO_PARENT: Seq = i64::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeStatus {
    OnDisk = 0,
    Loading = 1,
    InMemory = 2,
}

impl NodeStatus {
    fn from_raw(raw: u8) -> NodeStatus {
        match raw {
            0 => NodeStatus::OnDisk,
            1 => NodeStatus::Loading,
            2 => NodeStatus::InMemory,
            _ => unreachable!("invalid node status {raw}"),
        }
    }
}

/// Mutable fields of a node, mirroring the persisted record.
#[derive(Debug, Default)]
pub struct NodeInner {
    /// Edge label extending the parent's path.
    pub prefix: Vec<u8>,
    /// Child sequences in insertion order.
    pub children: SmallVec<[Seq; 4]>,
    /// Store key of the value record; empty when the node is a pure branch.
    pub internal_key: Vec<u8>,
    /// Compare-and-set version of the value.
    pub version: i64,
}

impl NodeInner {
    pub fn has_value(&self) -> bool {
        !self.internal_key.is_empty()
    }
}

#[derive(Debug)]
pub struct Node {
    seq: Seq,
    status: AtomicU8,
    parent: AtomicI64,
    inner: RwLock<NodeInner>,
}

impl Node {
    /// A shallow ON_DISK stub: only the sequence and parent link are known.
    pub fn stub(seq: Seq, parent: Seq) -> Node {
        Node {
            seq,
            status: AtomicU8::new(NodeStatus::OnDisk as u8),
            parent: AtomicI64::new(parent),
            inner: RwLock::new(NodeInner::default()),
        }
    }

    /// A fully materialized IN_MEMORY node (splits and fresh leaves).
    pub fn resident(seq: Seq, parent: Seq, inner: NodeInner) -> Node {
        Node {
            seq,
            status: AtomicU8::new(NodeStatus::InMemory as u8),
            parent: AtomicI64::new(parent),
            inner: RwLock::new(inner),
        }
    }

    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    /// Claims the ON_DISK -> LOADING transition. The winner owns the fault.
    pub fn try_begin_load(&self) -> bool {
        self.status
            .compare_exchange(
                NodeStatus::OnDisk as u8,
                NodeStatus::Loading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Publishes the loaded inner fields: LOADING -> IN_MEMORY.
    pub fn finish_load(&self) {
        self.status
            .store(NodeStatus::InMemory as u8, Ordering::Release);
    }

    /// Eviction edge: IN_MEMORY -> ON_DISK. Writer lock only.
    pub fn mark_on_disk(&self) {
        self.status.store(NodeStatus::OnDisk as u8, Ordering::Release);
    }

    pub fn parent(&self) -> Option<Seq> {
        match self.parent.load(Ordering::Acquire) {
            NO_PARENT => None,
            seq => Some(seq),
        }
    }

    pub fn set_parent(&self, parent: Seq) {
        self.parent.store(parent, Ordering::Release);
    }

    pub fn inner(&self) -> RwLockReadGuard<'_, NodeInner> {
        self.inner.read()
    }

    pub fn inner_mut(&self) -> RwLockWriteGuard<'_, NodeInner> {
        self.inner.write()
    }

    /// Builds the persistable record body from the current inner fields.
    pub fn to_record(&self) -> NodeRecord {
        let inner = self.inner();
        NodeRecord {
            prefix: inner.prefix.clone(),
            children: inner.children.clone(),
            internal_key: inner.internal_key.clone(),
            version: inner.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_starts_on_disk() {
        let node = Node::stub(7, 3);
        assert_eq!(node.status(), NodeStatus::OnDisk);
        assert_eq!(node.parent(), Some(3));
        assert!(node.inner().prefix.is_empty());
    }

    #[test]
    fn load_transition_is_single_winner() {
        let node = Node::stub(1, -1);
        assert!(node.try_begin_load());
        assert!(!node.try_begin_load());
        assert_eq!(node.status(), NodeStatus::Loading);
        node.finish_load();
        assert_eq!(node.status(), NodeStatus::InMemory);
        assert!(!node.try_begin_load());
    }

    #[test]
    fn eviction_reopens_the_load_edge() {
        let node = Node::stub(1, -1);
        assert!(node.try_begin_load());
        node.finish_load();
        node.mark_on_disk();
        assert!(node.try_begin_load());
    }

    #[test]
    fn root_has_no_parent() {
        let node = Node::stub(-1, NO_PARENT);
        assert_eq!(node.parent(), None);
    }

    #[test]
    fn record_reflects_inner() {
        let node = Node::resident(
            5,
            -1,
            NodeInner {
                prefix: b"te".to_vec(),
                children: smallvec::smallvec![8, 9],
                internal_key: b"kte".to_vec(),
                version: 2,
            },
        );
        let record = node.to_record();
        assert_eq!(record.prefix, b"te");
        assert_eq!(record.children.as_slice(), &[8, 9]);
        assert_eq!(record.internal_key, b"kte");
        assert_eq!(record.version, 2);
    }
}
