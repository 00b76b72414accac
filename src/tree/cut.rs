//! # Cut-edge Eviction
//!
//! When the resident-node counter passes the ceiling, whole sub-trees are
//! detached back to disk. The strategy is deliberately dumb: pick a
//! uniformly random child of the root, and if it has resident descendants,
//! flip it to ON_DISK, clear its child list and sweep the descendants out
//! of the arena. The stub itself stays so the root's child list remains
//! valid; the next walk through it faults the sub-tree back in.
//!
//! Randomization is parameter-free and avoids systematically re-faulting
//! the same hot paths. Evicting a sub-tree that is needed again a moment
//! later is acceptable — every record below the cut was persisted by the
//! batch that last touched it, so eviction never writes.
//!
//! Runs only under the tree writer lock. The root is never evicted.

use std::sync::Arc;

use rand::Rng;

use crate::config::{CUT_EDGE_RETRIES, EVICT_LOW_WATER_DIVISOR};
use crate::storage::Store;

use super::node::{Node, NodeStatus, Seq};
use super::TreeShared;

impl<S: Store> TreeShared<S> {
    /// Post-mutation / tick hook: evicts until the count is comfortably
    /// under the ceiling or a cycle makes no progress.
    pub(crate) fn evict_check(&self) {
        let max = self.max_in_memory_nodes.load(std::sync::atomic::Ordering::Relaxed);
        if self.arena.resident_count() <= max {
            return;
        }
        self.stats.cuts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let low_water = max - max / EVICT_LOW_WATER_DIVISOR;

        let before = self.arena.resident_count();
        loop {
            let evicted = self.cut_edge();
            if evicted == 0 || self.arena.resident_count() <= low_water {
                break;
            }
        }
        tracing::debug!(
            before,
            after = self.arena.resident_count(),
            ceiling = max,
            "cut-edge pass"
        );
    }

    /// One eviction cycle. Returns the number of nodes dropped from the
    /// arena (zero when every random pick was cold or childless).
    pub(crate) fn cut_edge(&self) -> i64 {
        let root = self.arena.root();
        if root.status() != NodeStatus::InMemory {
            return 0;
        }
        let children: Vec<Seq> = root.inner().children.iter().copied().collect();
        if children.is_empty() {
            return 0;
        }

        let mut rng = rand::thread_rng();
        for _ in 0..CUT_EDGE_RETRIES {
            let pick = children[rng.gen_range(0..children.len())];
            let Some(child) = self.arena.get(pick) else {
                continue;
            };
            if child.status() != NodeStatus::InMemory {
                continue;
            }
            let resident = self.resident_subtree_size(&child);
            if resident <= 1 {
                continue;
            }

            child.mark_on_disk();
            let detached: Vec<Seq> = {
                let mut inner = child.inner_mut();
                std::mem::take(&mut inner.children).into_iter().collect()
            };
            for seq in detached {
                self.drop_subtree(seq);
            }
            return resident - 1;
        }
        0
    }

    /// Arena entries in the sub-tree rooted at `node`, itself included.
    /// ON_DISK stubs count: they occupy arena slots like any other node.
    pub(crate) fn resident_subtree_size(&self, node: &Arc<Node>) -> i64 {
        let children: Vec<Seq> = node.inner().children.iter().copied().collect();
        let mut total = 1;
        for seq in children {
            if let Some(child) = self.arena.get(seq) {
                total += self.resident_subtree_size(&child);
            }
        }
        total
    }

    fn drop_subtree(&self, seq: Seq) {
        let Some(node) = self.arena.remove(seq) else {
            return;
        };
        let children: Vec<Seq> = node.inner().children.iter().copied().collect();
        for child in children {
            self.drop_subtree(child);
        }
    }
}
