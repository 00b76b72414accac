//! # Housekeeping Supervisor
//!
//! One background thread per tree. It wakes on a coarse tick, takes the
//! writer lock briefly, refreshes the derived insertion rate and runs the
//! eviction check — the safety net for read-heavy workloads whose
//! fault-ins grow the cache without ever passing through the
//! post-mutation hook.
//!
//! Shutdown is a message on the channel the thread sleeps on; `stop`
//! signals and joins.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::storage::Store;

use super::TreeShared;

pub(crate) struct Supervisor {
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Supervisor {
    pub(crate) fn spawn<S: Store>(shared: Arc<TreeShared<S>>, tick: Duration) -> Supervisor {
        let (shutdown, wakeups) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("radixstore-supervisor".into())
            .spawn(move || loop {
                match wakeups.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => {
                        let _guard = shared.tree_lock.write();
                        shared.stats.refresh_insert_rate();
                        shared.evict_check();
                    }
                    // Shutdown signal, or the tree dropped the sender.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("spawn supervisor thread");
        Supervisor { shutdown, handle }
    }

    /// Signals the thread and waits for it to exit.
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.join();
    }
}
