//! # Tree API
//!
//! [`Tree`] is the public handle over the persistent radix index. It owns
//! the store, the node arena, the tree-structure lock, the operation
//! counters and the housekeeping supervisor; nothing about the tree is
//! process-global.
//!
//! ## Operation envelope
//!
//! Every mutating call follows the same shape:
//!
//! ```text
//! writer lock ─► begin batch ─► walk + mutate in memory, stage record
//!                writes ─► commit (or roll back on error) ─► eviction
//!                check ─► unlock
//! ```
//!
//! Readers take the shared lock, walk the tree (faulting nodes in on
//! demand) and resolve values against committed store state. Enumerations
//! collect internal-key references under the lock and resolve them against
//! a snapshot after releasing it.
//!
//! ## Failure rules
//!
//! Precondition failures ([`TreeError`]) roll the batch back and change
//! nothing. A failed batch *commit* panics: the in-memory tree already
//! assumed the commit and there is no undo log; a restart rebuilds a
//! consistent view from the store.

mod arena;
mod builder;
mod cut;
mod fault;
mod list;
mod node;
mod ops;
mod stats;
mod supervisor;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use eyre::{bail, ensure, eyre, Result, WrapErr};
use parking_lot::{Mutex, RwLock};

use crate::config::{ROOT_SEQ, SLOW_INSERT_THRESHOLD};
use crate::encoding::{
    encode_internal_key, encode_last_seq, is_reserved_key, node_key, parse_last_seq,
    ValueEnvelope, LAST_SEQ_KEY,
};
use crate::error::TreeError;
use crate::storage::{RedbStore, Store};

pub use builder::{TreeBuilder, TreeOptions};
pub use list::{ListEntry, ListEntryKind};

pub(crate) use node::{Node, Seq, NO_PARENT};

use arena::NodeArena;
use ops::PutMode;
use stats::TreeStats;
use supervisor::Supervisor;

/// Version reported for keys that are absent or carry no value.
pub const INVALID_VERSION: i64 = -1;

/// Persistent radix tree over a batched key-value store.
pub struct Tree<S: Store = RedbStore> {
    shared: Arc<TreeShared<S>>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl<S: Store> std::fmt::Debug for Tree<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree").field("path", &self.shared.path).finish()
    }
}

pub(crate) struct TreeShared<S: Store> {
    pub(crate) store: S,
    pub(crate) path: PathBuf,
    pub(crate) arena: NodeArena,
    /// Guards the tree topology: writers mutate, readers walk.
    pub(crate) tree_lock: RwLock<()>,
    pub(crate) last_seq: AtomicI64,
    pub(crate) max_in_memory_nodes: AtomicI64,
    pub(crate) stats: TreeStats,
    pub(crate) closed: AtomicBool,
}

impl Tree<RedbStore> {
    /// Opens (creating if missing) a tree at `path` with default settings.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Tree<RedbStore>> {
        Tree::builder().path(path).open()
    }

    /// Builder with configuration knobs.
    pub fn builder() -> TreeBuilder {
        TreeBuilder::new()
    }
}

impl<S: Store> Tree<S> {
    /// Opens a tree over any [`Store`] implementation.
    pub fn open_with_options(path: &Path, options: TreeOptions) -> Result<Tree<S>> {
        let store = S::open(path)?;
        let shared = Arc::new(TreeShared {
            store,
            path: path.to_path_buf(),
            arena: NodeArena::new(),
            tree_lock: RwLock::new(()),
            last_seq: AtomicI64::new(ROOT_SEQ),
            max_in_memory_nodes: AtomicI64::new(options.max_in_memory_nodes),
            stats: TreeStats::new(),
            closed: AtomicBool::new(false),
        });

        let root = Arc::new(Node::stub(ROOT_SEQ, NO_PARENT));
        shared.arena.install_root(Arc::clone(&root));

        if shared.store.is_empty()? {
            // Fresh database: the root becomes an empty IN_MEMORY node and
            // its record is committed before any fault-in can run, so every
            // faultable node always has a committed record behind it.
            tracing::debug!(path = %path.display(), "initializing fresh database");
            root.finish_load();
            shared.store.begin_batch()?;
            shared.persist_node(&root)?;
            shared
                .store
                .put_batch(LAST_SEQ_KEY, &encode_last_seq(ROOT_SEQ))?;
            shared.store.commit_batch()?;
        } else {
            shared.ensure_loaded(&root)?;
            let raw = shared
                .store
                .get(LAST_SEQ_KEY)?
                .ok_or_else(|| eyre!("last-seq metadata missing from existing database"))?;
            let last = parse_last_seq(&raw)?;
            ensure!(
                last >= ROOT_SEQ,
                "recovered last sequence {} below the root sequence",
                last
            );
            shared.last_seq.store(last, Ordering::SeqCst);
            tracing::debug!(path = %path.display(), last_seq = last, "opened existing database");
        }

        let supervisor = Supervisor::spawn(Arc::clone(&shared), options.tick_interval);
        Ok(Tree {
            shared,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// Stops the supervisor and closes the store. A second close fails.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            bail!("tree already closed");
        }
        if let Some(supervisor) = self.supervisor.lock().take() {
            supervisor.stop();
        }
        tracing::debug!(path = %self.shared.path.display(), "closing tree");
        self.shared.store.close()
    }

    /// Closes the tree and removes its on-disk directory.
    pub fn destroy(&self) -> Result<()> {
        let _ = self.close();
        tracing::warn!(path = %self.shared.path.display(), "destroying tree storage");
        std::fs::remove_dir_all(&self.shared.path)
            .wrap_err_with(|| format!("remove {}", self.shared.path.display()))
    }

    /// Inserts a value under `key`. Fails with [`TreeError::AlreadyExists`]
    /// when the key already holds a value; attaching a value to a pure
    /// branch node succeeds and returns `None`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.mutate_value(key, value, PutMode::InsertOnly)
    }

    /// Inserts or replaces the value under `key`, returning the previous
    /// value. Replacement increments the version by one.
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.mutate_value(key, value, PutMode::Overwrite)
    }

    /// Compare-and-set: succeeds iff `key` holds a value at
    /// `expected_version`, stores `new_version` and returns the previous
    /// value. Mismatch fails with [`TreeError::VersionMismatch`] and
    /// changes nothing; a missing value fails with [`TreeError::NotFound`].
    pub fn cas(
        &self,
        key: &[u8],
        value: &[u8],
        expected_version: i64,
        new_version: i64,
    ) -> Result<Option<Vec<u8>>> {
        self.mutate_value(
            key,
            value,
            PutMode::Cas {
                expected: expected_version,
                new_version,
            },
        )
    }

    fn mutate_value(&self, key: &[u8], value: &[u8], mode: PutMode) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        if key.is_empty() {
            self.shared.stats.insert_failed.fetch_add(1, Ordering::Relaxed);
            return Err(TreeError::InvalidArgument("empty key".into()).into());
        }
        let started = Instant::now();

        let guard = self.shared.tree_lock.write();
        let result = self
            .shared
            .with_batch(|| self.shared.put_locked(key, value, mode));
        match &result {
            Ok(_) => {
                self.shared.stats.insert_success.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.shared.stats.insert_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.shared.evict_check();
        drop(guard);

        let elapsed = started.elapsed();
        if elapsed > SLOW_INSERT_THRESHOLD {
            tracing::warn!(?elapsed, key_len = key.len(), "slow insert");
        }
        result
    }

    /// Removes the value under `key`, returning it. Missing keys and pure
    /// branch nodes return `None`.
    pub fn delete(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        if key.is_empty() {
            return Err(TreeError::InvalidArgument("empty key".into()).into());
        }

        let guard = self.shared.tree_lock.write();
        let result = self.shared.with_batch(|| self.shared.delete_locked(key));
        self.shared.evict_check();
        drop(guard);
        result
    }

    /// Reads the value under `key`.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get_with_version(key)?.0)
    }

    /// Reads the value and its version; `(None, -1)` when absent.
    pub fn get_with_version(&self, key: &[u8]) -> Result<(Option<Vec<u8>>, i64)> {
        self.check_open()?;

        let _guard = self.shared.tree_lock.read();
        let internal_key = match self.shared.locate(key)? {
            Some(located) if located.exact => {
                let inner = located.node.inner();
                if inner.has_value() {
                    Some(inner.internal_key.clone())
                } else {
                    None
                }
            }
            _ => None,
        };

        let Some(internal_key) = internal_key else {
            self.shared.stats.get_failed.fetch_add(1, Ordering::Relaxed);
            return Ok((None, INVALID_VERSION));
        };

        match self.shared.store.get(&internal_key)? {
            Some(raw) => {
                let envelope = ValueEnvelope::decode(&raw)
                    .wrap_err("corrupt value envelope")?;
                self.shared.stats.get_success.fetch_add(1, Ordering::Relaxed);
                Ok((Some(envelope.value), envelope.version))
            }
            None => {
                self.shared.stats.get_failed.fetch_add(1, Ordering::Relaxed);
                Ok((None, INVALID_VERSION))
            }
        }
    }

    /// Store key under which `key`'s value blob lives, when the located
    /// node carries one.
    pub fn find_internal_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let _guard = self.shared.tree_lock.read();
        Ok(self.shared.locate(key)?.and_then(|located| {
            let inner = located.node.inner();
            inner.has_value().then(|| inner.internal_key.clone())
        }))
    }

    /// Every stored user key beginning with `prefix`, in the tree's
    /// child-list order.
    pub fn prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.check_open()?;
        let _guard = self.shared.tree_lock.read();
        self.shared.collect_prefix(prefix)
    }

    /// Hierarchical listing with common-prefix rollup. See the module
    /// documentation of [`list`](self::list) for the walk rules.
    pub fn list(
        &self,
        prefix: &[u8],
        delimiter: &[u8],
        limit: usize,
        max_levels: usize,
        marker: &[u8],
    ) -> Result<Vec<ListEntry>> {
        self.check_open()?;
        if limit == 0 {
            return Err(TreeError::InvalidArgument("zero limit".into()).into());
        }
        self.shared.stats.lists.fetch_add(1, Ordering::Relaxed);

        let pending = {
            let _guard = self.shared.tree_lock.read();
            self.shared
                .collect_list(prefix, delimiter, limit, max_levels, marker)?
        };
        self.shared.resolve_list(pending)
    }

    /// Direct child count of the node located for `key`; -1 when no node
    /// covers the key.
    pub fn first_level_children_count(&self, key: &[u8]) -> Result<i64> {
        self.check_open()?;
        let _guard = self.shared.tree_lock.read();
        match self.shared.locate(key)? {
            Some(located) => Ok(located.node.inner().children.len() as i64),
            None => Ok(-1),
        }
    }

    /// Writes an application record in the reserved `*` namespace through
    /// the same batch mechanism as tree mutations.
    pub fn storage_put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        if !is_reserved_key(key) {
            return Err(
                TreeError::InvalidArgument("reserved keys must start with '*'".into()).into(),
            );
        }
        let _guard = self.shared.tree_lock.write();
        self.shared.with_batch(|| self.shared.store.put_batch(key, value))
    }

    /// Reads an application record from the reserved `*` namespace.
    pub fn storage_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        if !is_reserved_key(key) {
            return Err(
                TreeError::InvalidArgument("reserved keys must start with '*'".into()).into(),
            );
        }
        self.shared.store.get(key)
    }

    /// Adjusts the resident-node ceiling; the next eviction check applies it.
    pub fn set_max_in_memory_nodes(&self, max: i64) {
        self.shared.max_in_memory_nodes.store(max, Ordering::SeqCst);
    }

    /// Arena-resident nodes, the root excluded.
    pub fn in_memory_node_count(&self) -> i64 {
        self.shared.arena.resident_count()
    }

    /// Copies a snapshot of every record into a fresh store at `dest`.
    /// Runs on its own thread; join the returned job for the outcome.
    pub fn backup(&self, dest: &Path) -> Result<BackupJob> {
        self.check_open()?;
        let shared = Arc::clone(&self.shared);
        let dest = dest.to_path_buf();
        let handle = std::thread::Builder::new()
            .name("radixstore-backup".into())
            .spawn(move || -> Result<()> {
                let snapshot = shared.store.snapshot()?;
                let target = S::open(&dest)?;
                target.begin_batch()?;
                let copy = shared
                    .store
                    .iterate(&snapshot, &mut |key, value| target.put_batch(key, value));
                match copy {
                    Ok(()) => {
                        target.commit_batch()?;
                        target.close()
                    }
                    Err(err) => {
                        target.rollback_batch().ok();
                        target.close().ok();
                        Err(err)
                    }
                }
            })
            .wrap_err("spawn backup thread")?;
        Ok(BackupJob { handle })
    }

    /// Operational counters and record-count breakdown as opaque text.
    pub fn stats(&self) -> Result<String> {
        self.check_open()?;
        let mut nodes = 0u64;
        let mut values = 0u64;
        let mut reserved = 0u64;
        let mut metadata = 0u64;
        let snapshot = self.shared.store.snapshot()?;
        self.shared.store.iterate(&snapshot, &mut |key, _value| {
            match key.first() {
                Some(b'k') => values += 1,
                Some(b'*') => reserved += 1,
                Some(b'#') => metadata += 1,
                _ => nodes += 1,
            }
            Ok(())
        })?;
        Ok(format!(
            "{}\nresident nodes: {} (ceiling {})\nlast sequence: {}\nrecords: {} nodes, {} values, {} reserved, {} metadata",
            self.shared.stats.render(),
            self.shared.arena.resident_count(),
            self.shared.max_in_memory_nodes.load(Ordering::Relaxed),
            self.shared.last_seq.load(Ordering::Relaxed),
            nodes,
            values,
            reserved,
            metadata,
        ))
    }

    /// Renders the whole tree (faulting everything in) for diagnostics.
    /// One line per node: indentation by depth, edge label, value marker,
    /// version and sequence.
    pub fn dump_tree(&self) -> Result<String> {
        self.check_open()?;
        let _guard = self.shared.tree_lock.read();
        let mut out = String::new();
        self.dump_node(&self.shared.arena.root(), 0, &mut out)?;
        Ok(out)
    }

    fn dump_node(&self, node: &Arc<Node>, depth: usize, out: &mut String) -> Result<()> {
        use std::fmt::Write;

        self.shared.ensure_loaded(node)?;
        let children: Vec<Seq> = {
            let inner = node.inner();
            let marker = if inner.has_value() { "*" } else { "" };
            writeln!(
                out,
                "{:indent$}{}{} (v{} seq {})",
                "",
                String::from_utf8_lossy(&inner.prefix),
                marker,
                inner.version,
                node.seq(),
                indent = depth * 4
            )
            .expect("write to string");
            inner.children.iter().copied().collect()
        };
        for seq in children {
            let child = self.shared.child_node(node, seq);
            self.dump_node(&child, depth + 1, out)?;
        }
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        ensure!(
            !self.shared.closed.load(Ordering::Acquire),
            "tree is closed"
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<TreeShared<S>> {
        &self.shared
    }
}

impl<S: Store> Drop for Tree<S> {
    fn drop(&mut self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            if let Some(supervisor) = self.supervisor.lock().take() {
                supervisor.stop();
            }
            if let Err(err) = self.shared.store.close() {
                tracing::warn!(error = %err, "store close during drop failed");
            }
        }
    }
}

/// Handle on an in-flight backup.
pub struct BackupJob {
    handle: JoinHandle<Result<()>>,
}

impl BackupJob {
    /// Blocks until the backup finishes and returns its outcome.
    pub fn wait(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| eyre!("backup thread panicked"))?
    }
}

impl<S: Store> TreeShared<S> {
    /// Runs `op` inside a store batch under the already-held writer lock.
    /// Errors roll the batch back; a commit failure is fatal.
    pub(crate) fn with_batch<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.store.begin_batch()?;
        match op() {
            Ok(value) => {
                if let Err(err) = self.store.commit_batch() {
                    panic!(
                        "write batch commit failed; in-memory tree is ahead of the store: {err:#}"
                    );
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback_batch() {
                    tracing::warn!(error = %rollback_err, "batch rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Allocates the next sequence and stages the new high-water mark into
    /// the current batch, so recovery never reuses a sequence.
    pub(crate) fn alloc_seq(&self) -> Result<Seq> {
        let seq = self.last_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.store.put_batch(LAST_SEQ_KEY, &encode_last_seq(seq))?;
        Ok(seq)
    }

    /// Stages the node's record into the current batch.
    pub(crate) fn persist_node(&self, node: &Node) -> Result<()> {
        self.store
            .put_batch(&node_key(node.seq()), &node.to_record().encode())
    }

    /// Stages a value envelope into the current batch.
    pub(crate) fn write_value(&self, internal_key: &[u8], version: i64, value: &[u8]) -> Result<()> {
        let envelope = ValueEnvelope::new(version, value.to_vec());
        self.store.put_batch(internal_key, &envelope.encode())
    }

    /// Reads the committed value envelope behind `internal_key`. A node
    /// that references a missing record is corrupt.
    pub(crate) fn read_value(&self, internal_key: &[u8]) -> Result<ValueEnvelope> {
        match self.store.get(internal_key)? {
            Some(raw) => ValueEnvelope::decode(&raw).wrap_err("corrupt value envelope"),
            None => panic!(
                "value record missing for internal key {:?}",
                String::from_utf8_lossy(internal_key)
            ),
        }
    }

    pub(crate) fn internal_key_for(&self, key: &[u8]) -> Vec<u8> {
        encode_internal_key(key)
    }
}
