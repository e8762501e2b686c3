// packages/sim-server/src/runtime/engine_pool.rs
//! Pool of idle engine instances shared by every connection
//!
//! Opening an engine means loading a model from disk, so instances are kept
//! after a successful run and handed to the next request instead of being
//! torn down.
//!
//! # Architecture
//!
//! ```text
//! EnginePool
//! ├─ Available: [Engine#3, Engine#1]   (idle, most recently released last)
//! └─ Checked out: Engine#2, Engine#4   (owned by running simulations)
//! ```
//!
//! The pool starts empty and never creates engines itself. A caller that finds
//! it empty opens a new engine outside the lock and registers it, so the pool
//! grows by one each time demand exceeds supply. `acquire` and `release` share
//! one mutex and never block on anything but each other.

use crate::runtime::engine::{Engine, EngineHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Pool of idle engine handles
pub struct EnginePool<E> {
    /// Idle handles; popped from the back
    available: Mutex<Vec<EngineHandle<E>>>,

    /// Next handle ID
    next_id: AtomicU64,

    /// Handles ever registered
    created: AtomicU64,

    /// Handles dropped after a failed run
    discarded: AtomicU64,
}

impl<E: Engine> EnginePool<E> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            available: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Take an idle handle, or `None` if every handle is checked out
    pub fn acquire(&self) -> Option<EngineHandle<E>> {
        let mut available = self.available.lock();
        let handle = available.pop();
        metrics::gauge!("sim_server_engine_pool_idle").set(available.len() as f64);
        drop(available);

        if let Some(handle) = &handle {
            debug!("Acquired engine #{} from pool", handle.id());
        }
        handle
    }

    /// Return a handle so later requests can reuse it
    pub fn release(&self, handle: EngineHandle<E>) {
        debug!("Releasing engine #{} back to pool", handle.id());

        let mut available = self.available.lock();
        available.push(handle);
        metrics::gauge!("sim_server_engine_pool_idle").set(available.len() as f64);
    }

    /// Wrap a freshly opened engine into a numbered handle owned by the caller
    ///
    /// The handle is not placed in the pool; it joins the idle set on its
    /// first `release`.
    pub fn register(&self, engine: E) -> EngineHandle<E> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!("sim_server_engines_created_total").increment(1);

        info!("Engine #{} created ({} total)", id, total);
        EngineHandle::new(id, engine)
    }

    /// Drop a handle that must not be reused
    pub fn discard(&self, handle: EngineHandle<E>, reason: &str) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sim_server_engines_discarded_total").increment(1);

        warn!(
            "Discarding engine #{} after {} runs: {}",
            handle.id(),
            handle.runs(),
            reason
        );
        drop(handle);
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.available.lock().len();
        let created = self.created.load(Ordering::Relaxed);
        let discarded = self.discarded.load(Ordering::Relaxed);

        PoolStats {
            idle,
            created,
            discarded,
            checked_out: created
                .saturating_sub(discarded)
                .saturating_sub(idle as u64),
        }
    }
}

impl<E: Engine> Default for EnginePool<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles waiting in the pool
    pub idle: usize,

    /// Handles currently owned by a simulation
    pub checked_out: u64,

    /// Handles created since startup
    pub created: u64,

    /// Handles thrown away after a failure
    pub discarded: u64,
}
