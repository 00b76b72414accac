//! # radixstore Configuration Constants
//!
//! This module centralizes the tunables of the tree and documents how they
//! relate. Constants that depend on each other are co-located so a change to
//! one is visible next to the values it constrains.
//!
//! ```text
//! DEFAULT_MAX_IN_MEMORY_NODES (500,000)
//!       │
//!       └─> EVICT_LOW_WATER_DIVISOR
//!             cut_edge keeps evicting until the resident count drops under
//!             ceiling - ceiling / EVICT_LOW_WATER_DIVISOR, so the divisor
//!             controls how much slack one eviction pass buys.
//!
//! SUPERVISOR_TICK (5s)
//!       │
//!       └─> the eviction ceiling is also checked after every mutation, so
//!           the tick only has to catch read-heavy workloads whose fault-ins
//!           grow the cache without writes.
//!
//! CUT_EDGE_RETRIES (5)
//!       Random root-child picks per eviction cycle before the cycle gives
//!       up. Raising it helps trees whose fan-out at the root is mostly
//!       already on disk, at the cost of longer writer-lock hold times.
//! ```

use std::time::Duration;

/// Reserved sequence number of the root node. The root always exists, is
/// never evicted and never deleted.
pub const ROOT_SEQ: i64 = -1;

/// Default ceiling for arena-resident nodes (the root is not counted).
pub const DEFAULT_MAX_IN_MEMORY_NODES: i64 = 500_000;

/// One eviction pass runs until the resident count is below
/// `ceiling - ceiling / EVICT_LOW_WATER_DIVISOR` or no progress is made.
pub const EVICT_LOW_WATER_DIVISOR: i64 = 10;

/// Random root-child picks per cut-edge cycle before giving up.
pub const CUT_EDGE_RETRIES: usize = 5;

/// Interval between housekeeping ticks (stats refresh + eviction check).
pub const SUPERVISOR_TICK: Duration = Duration::from_secs(5);

/// Spins on a LOADING node before the waiter starts yielding the CPU.
pub const FAULT_SPIN_LIMIT: u32 = 64;

/// Inserts slower than this are logged as warnings.
pub const SLOW_INSERT_THRESHOLD: Duration = Duration::from_millis(500);

const _: () = assert!(
    EVICT_LOW_WATER_DIVISOR > 1,
    "EVICT_LOW_WATER_DIVISOR must leave a non-empty low-water band"
);

const _: () = assert!(ROOT_SEQ < 0, "ROOT_SEQ must sort outside allocated sequences");
