//! # Fault-in
//!
//! Loading a node means reading its record by sequence, installing the
//! decoded fields, and creating one shallow ON_DISK stub per child — only
//! the child's sequence is known until that child is faulted itself.
//! Discovering one deep key therefore touches the nodes along its path,
//! never a whole sub-tree.
//!
//! Fault-in is legal under either tree lock: readers walking the tree pull
//! cold nodes in without upgrading to the writer lock. The per-node status
//! CAS single-flights concurrent faulters; losers spin briefly and then
//! yield until the winner publishes IN_MEMORY.
//!
//! Every faultable node has a committed record behind it: open commits the
//! root record before the first fault can run, and every later mutation
//! persists the nodes it touches inside its batch. A missing or
//! undecodable record therefore means the store no longer matches the tree
//! that wrote it, and the process stops rather than serve from a corrupt
//! picture. Plain read errors from the store are retryable and hand the
//! LOADING claim back.

use std::sync::Arc;

use eyre::{Result, WrapErr};

use crate::config::FAULT_SPIN_LIMIT;
use crate::encoding::{node_key, NodeRecord};
use crate::storage::Store;

use super::node::{Node, NodeStatus};
use super::TreeShared;

impl<S: Store> TreeShared<S> {
    /// Blocks until `node` is IN_MEMORY, faulting it in if this thread wins
    /// the LOADING claim.
    pub(crate) fn ensure_loaded(&self, node: &Arc<Node>) -> Result<()> {
        let mut spins = 0u32;
        loop {
            match node.status() {
                NodeStatus::InMemory => return Ok(()),
                NodeStatus::OnDisk => {
                    if node.try_begin_load() {
                        return self.fault_in(node);
                    }
                }
                NodeStatus::Loading => {
                    if spins < FAULT_SPIN_LIMIT {
                        spins += 1;
                        std::hint::spin_loop();
                    } else {
                        std::thread::yield_now();
                    }
                }
            }
        }
    }

    /// Owns the LOADING state of `node`: reads, decodes, installs, stubs.
    fn fault_in(&self, node: &Arc<Node>) -> Result<()> {
        let key = node_key(node.seq());
        let raw = match self.store.get(&key) {
            Ok(raw) => raw,
            Err(err) => {
                // Read errors are retryable; hand the claim back.
                node.mark_on_disk();
                return Err(err).wrap_err_with(|| format!("fault node {}", node.seq()));
            }
        };

        let Some(raw) = raw else {
            panic!("node record missing for sequence {}", node.seq());
        };

        let record = NodeRecord::decode(&raw).unwrap_or_else(|err| {
            panic!("corrupt node record for sequence {}: {err:#}", node.seq())
        });

        {
            let mut inner = node.inner_mut();
            debug_assert!(
                inner.prefix.is_empty() || inner.prefix == record.prefix,
                "edge label changed on disk for sequence {}",
                node.seq()
            );
            inner.prefix = record.prefix;
            inner.internal_key = record.internal_key;
            inner.version = record.version;
            inner.children = record.children.clone();
        }

        for &child_seq in &record.children {
            let (child, _created) = self.arena.stub_if_absent(child_seq, node.seq());
            child.set_parent(node.seq());
        }

        node.finish_load();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicI64};
    use std::sync::Barrier;

    use parking_lot::RwLock;
    use smallvec::smallvec;
    use tempfile::tempdir;

    use crate::config::{DEFAULT_MAX_IN_MEMORY_NODES, ROOT_SEQ};
    use crate::storage::RedbStore;
    use crate::tree::arena::NodeArena;
    use crate::tree::node::NO_PARENT;
    use crate::tree::stats::TreeStats;

    fn shared_at(path: &Path) -> Arc<TreeShared<RedbStore>> {
        Arc::new(TreeShared {
            store: RedbStore::open(path).unwrap(),
            path: path.to_path_buf(),
            arena: NodeArena::new(),
            tree_lock: RwLock::new(()),
            last_seq: AtomicI64::new(ROOT_SEQ),
            max_in_memory_nodes: AtomicI64::new(DEFAULT_MAX_IN_MEMORY_NODES),
            stats: TreeStats::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn write_record(shared: &TreeShared<RedbStore>, seq: i64, record: &NodeRecord) {
        shared.store.begin_batch().unwrap();
        shared
            .store
            .put_batch(&node_key(seq), &record.encode())
            .unwrap();
        shared.store.commit_batch().unwrap();
    }

    fn install_root(shared: &TreeShared<RedbStore>) -> Arc<Node> {
        let root = Arc::new(Node::stub(ROOT_SEQ, NO_PARENT));
        shared.arena.install_root(Arc::clone(&root));
        root
    }

    #[test]
    fn fault_in_installs_record_and_child_stubs() {
        let dir = tempdir().unwrap();
        let shared = shared_at(dir.path());
        write_record(
            &shared,
            ROOT_SEQ,
            &NodeRecord {
                prefix: Vec::new(),
                children: smallvec![0, 1],
                internal_key: Vec::new(),
                version: 0,
            },
        );
        write_record(
            &shared,
            0,
            &NodeRecord {
                prefix: b"team".to_vec(),
                children: smallvec![],
                internal_key: b"kteam".to_vec(),
                version: 3,
            },
        );

        let root = install_root(&shared);
        shared.ensure_loaded(&root).unwrap();

        assert_eq!(root.status(), NodeStatus::InMemory);
        assert_eq!(root.inner().children.as_slice(), &[0, 1]);
        // Two fresh stubs, the root itself uncounted.
        assert_eq!(shared.arena.resident_count(), 2);

        let stub = shared.arena.get(0).unwrap();
        assert_eq!(stub.status(), NodeStatus::OnDisk);
        assert_eq!(stub.parent(), Some(ROOT_SEQ));
        assert!(stub.inner().prefix.is_empty(), "stubs stay shallow");

        // Faulting the stub itself pulls in its full record.
        shared.ensure_loaded(&stub).unwrap();
        let inner = stub.inner();
        assert_eq!(inner.prefix, b"team");
        assert_eq!(inner.internal_key, b"kteam");
        assert_eq!(inner.version, 3);
    }

    #[test]
    fn refault_reuses_existing_stubs_without_recounting() {
        let dir = tempdir().unwrap();
        let shared = shared_at(dir.path());
        write_record(
            &shared,
            ROOT_SEQ,
            &NodeRecord {
                prefix: Vec::new(),
                children: smallvec![5],
                internal_key: Vec::new(),
                version: 0,
            },
        );

        let root = install_root(&shared);
        shared.ensure_loaded(&root).unwrap();
        assert_eq!(shared.arena.resident_count(), 1);

        // Evict and refault: the surviving stub must not be counted twice.
        root.mark_on_disk();
        shared.ensure_loaded(&root).unwrap();
        assert_eq!(shared.arena.resident_count(), 1);
        assert_eq!(root.inner().children.as_slice(), &[5]);
    }

    #[test]
    #[should_panic(expected = "node record missing for sequence 7")]
    fn missing_record_is_fatal() {
        let dir = tempdir().unwrap();
        let shared = shared_at(dir.path());
        install_root(&shared);
        let (orphan, _created) = shared.arena.stub_if_absent(7, ROOT_SEQ);
        let _ = shared.ensure_loaded(&orphan);
    }

    #[test]
    #[should_panic(expected = "corrupt node record for sequence 9")]
    fn undecodable_record_is_fatal() {
        let dir = tempdir().unwrap();
        let shared = shared_at(dir.path());
        install_root(&shared);

        shared.store.begin_batch().unwrap();
        shared
            .store
            .put_batch(&node_key(9), &[0xFF, 0xFF, 0xFF])
            .unwrap();
        shared.store.commit_batch().unwrap();

        let (corrupt, _created) = shared.arena.stub_if_absent(9, ROOT_SEQ);
        let _ = shared.ensure_loaded(&corrupt);
    }

    #[test]
    fn concurrent_faulters_converge_on_one_winner() {
        let dir = tempdir().unwrap();
        let shared = shared_at(dir.path());
        write_record(
            &shared,
            ROOT_SEQ,
            &NodeRecord {
                prefix: Vec::new(),
                children: smallvec![0, 1, 2, 3],
                internal_key: Vec::new(),
                version: 0,
            },
        );
        let root = install_root(&shared);

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let mut handles = Vec::new();
        for _ in 0..threads {
            let shared = Arc::clone(&shared);
            let root = Arc::clone(&root);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                shared.ensure_loaded(&root).unwrap();
                assert_eq!(root.status(), NodeStatus::InMemory);
                assert_eq!(root.inner().children.len(), 4);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Exactly one faulter created the four stubs; losers spun and
        // reused them.
        assert_eq!(shared.arena.resident_count(), 4);
        assert_eq!(shared.arena.len(), 5);
    }
}
