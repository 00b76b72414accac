//! # Tree Builder
//!
//! Fluent configuration for opening a tree. Settings chain before
//! `open()`:
//!
//! ```ignore
//! let tree = Tree::builder()
//!     .path("./mytree")
//!     .max_in_memory_nodes(100_000)
//!     .tick_interval(Duration::from_secs(1))
//!     .open()?;
//! ```
//!
//! | Option              | Default | Meaning                                |
//! |---------------------|---------|----------------------------------------|
//! | max_in_memory_nodes | 500,000 | resident-node ceiling driving cut-edge |
//! | tick_interval       | 5 s     | housekeeping supervisor period         |
//!
//! The builder opens the redb-backed store. Embedders with their own
//! [`Store`](crate::storage::Store) implementation go through
//! [`Tree::open_with_options`](crate::Tree::open_with_options) with the
//! same options struct.

use std::path::PathBuf;
use std::time::Duration;

use eyre::{eyre, Result};

use crate::config::{DEFAULT_MAX_IN_MEMORY_NODES, SUPERVISOR_TICK};
use crate::storage::RedbStore;

use super::Tree;

/// Knobs consumed by [`Tree::open_with_options`].
#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub max_in_memory_nodes: i64,
    pub tick_interval: Duration,
}

impl Default for TreeOptions {
    fn default() -> Self {
        TreeOptions {
            max_in_memory_nodes: DEFAULT_MAX_IN_MEMORY_NODES,
            tick_interval: SUPERVISOR_TICK,
        }
    }
}

/// Builder for configuring and opening a [`Tree`].
#[derive(Debug, Default)]
pub struct TreeBuilder {
    path: Option<PathBuf>,
    options: TreeOptions,
}

impl TreeBuilder {
    pub fn new() -> TreeBuilder {
        TreeBuilder {
            path: None,
            options: TreeOptions::default(),
        }
    }

    /// Directory the tree's store lives in. Created if missing.
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Resident-node ceiling; eviction keeps the cache under it.
    pub fn max_in_memory_nodes(mut self, max: i64) -> Self {
        self.options.max_in_memory_nodes = max;
        self
    }

    /// Housekeeping tick period.
    pub fn tick_interval(mut self, tick: Duration) -> Self {
        self.options.tick_interval = tick;
        self
    }

    pub fn open(self) -> Result<Tree<RedbStore>> {
        let path = self
            .path
            .ok_or_else(|| eyre!("tree path not configured; call .path(...)"))?;
        Tree::open_with_options(&path, self.options)
    }
}
