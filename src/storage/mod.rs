//! # Store Contract
//!
//! The tree persists through a small ordered key-value contract and owns no
//! file format of its own. Everything the core needs from an engine:
//!
//! - point `get` of committed state
//! - one active write batch at a time, committed all-or-nothing
//! - snapshots: a stable point-in-time view for backup and long reads
//! - ordered iteration over a snapshot
//!
//! Mutating tree operations open a batch, stage node/value/metadata record
//! writes while mutating the in-memory tree, and commit at the end; an error
//! before commit rolls the batch back and leaves the store untouched. Reads
//! issued while a batch is open observe the last committed state, never the
//! batch in flight — the in-memory tree carries the uncommitted picture.
//!
//! Snapshots are plain owned values released by `Drop`; there is no explicit
//! release call.
//!
//! [`RedbStore`] is the shipped implementation. The trait seam exists so
//! tests and embedders can substitute another engine with the same
//! atomicity guarantee.

pub mod redb_store;

use std::path::Path;

use eyre::Result;

pub use redb_store::RedbStore;

/// Ordered key-value store with atomic write batches and snapshots.
pub trait Store: Send + Sync + Sized + 'static {
    /// Point-in-time read view. Dropped to release.
    type Snapshot;

    /// Opens (creating if missing) the store rooted at `path`.
    fn open(path: &Path) -> Result<Self>;

    /// Flushes and closes. Further calls on this store fail; a second
    /// close is an error but must not corrupt on-disk state.
    fn close(&self) -> Result<()>;

    /// Starts the write batch. At most one batch is active; the caller
    /// serializes writers.
    fn begin_batch(&self) -> Result<()>;

    /// Stages a put into the active batch.
    fn put_batch(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Stages a delete into the active batch.
    fn delete_batch(&self, key: &[u8]) -> Result<()>;

    /// Atomically applies every staged write. All-or-nothing.
    fn commit_batch(&self) -> Result<()>;

    /// Discards the active batch.
    fn rollback_batch(&self) -> Result<()>;

    /// Reads the last committed value for `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Opens a point-in-time view of the committed state.
    fn snapshot(&self) -> Result<Self::Snapshot>;

    /// Reads `key` as of `snapshot`.
    fn get_at(&self, snapshot: &Self::Snapshot, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Visits every record as of `snapshot` in ascending key order.
    fn iterate(
        &self,
        snapshot: &Self::Snapshot,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()>;

    /// True when no record has ever been committed. Used at open to tell a
    /// fresh database from an existing one.
    fn is_empty(&self) -> Result<bool>;
}
