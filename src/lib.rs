//! # radixstore - Disk-Backed Radix Tree Index
//!
//! radixstore maps arbitrary byte keys to byte values through a persistent
//! radix (compressed trie) tree. The full tree lives in an embedded
//! key-value store; a bounded working set of nodes is kept in memory and
//! cold sub-trees are cut back to disk and faulted in on demand.
//!
//! ## Quick Start
//!
//! ```ignore
//! use radixstore::Tree;
//!
//! let tree = Tree::builder()
//!     .path("./mytree")
//!     .max_in_memory_nodes(100_000)
//!     .open()?;
//!
//! tree.put(b"fruit/apple", b"red")?;
//! assert_eq!(tree.lookup(b"fruit/apple")?, Some(b"red".to_vec()));
//!
//! let page = tree.list(b"fruit/", b"/", 100, 64, b"")?;
//! tree.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │          Public API (Tree)          │
//! ├─────────────────────────────────────┤
//! │  Radix Algorithms │ Enumeration     │
//! ├───────────────────┼─────────────────┤
//! │  Node Arena / Fault-in / Cut-edge   │
//! ├─────────────────────────────────────┤
//! │       Record Codec (encoding)       │
//! ├─────────────────────────────────────┤
//! │   Store Adapter (batched KV, redb)  │
//! └─────────────────────────────────────┘
//! ```
//!
//! Every mutating operation runs under a single writer lock and inside one
//! atomic store batch: the tree is walked from the root (faulting nodes as
//! needed), topology changes are applied in memory, the matching record
//! writes go into the batch, and the batch commits at the end. Readers share
//! a reader lock and may fault nodes in concurrently; long reads resolve
//! values against a store snapshot.
//!
//! ## Module Overview
//!
//! - [`storage`]: the batched key-value store contract and the redb adapter
//! - [`encoding`]: varints, record namespaces, node/value record codecs
//! - [`tree`]: node arena, fault-in, cut-edge eviction, radix algorithms,
//!   enumeration, housekeeping supervisor, and the public [`Tree`] handle
//! - [`error`]: typed precondition errors surfaced to callers

pub mod config;
pub mod encoding;
pub mod error;
pub mod storage;
pub mod tree;

pub use error::TreeError;
pub use storage::{RedbStore, Store};
pub use tree::{BackupJob, ListEntry, ListEntryKind, Tree, TreeBuilder, TreeOptions};
