//! Connectivity port (driven/secondary port)
//!
//! The host environment owns the online/offline signal (a browser's
//! navigator state, a netlink watcher, a health probe). The core only
//! ever observes it, at each decision point: the offline-queue gate, the
//! sync agent's drain gate, and the session's startup/logout paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Port trait for the host's online/offline signal
pub trait Connectivity: Send + Sync {
    /// Returns the host's current view of connectivity
    ///
    /// This is advisory: a `true` here does not guarantee a request will
    /// succeed, and the client still classifies transport errors on its
    /// own. It gates only the offline-queue and drain decisions.
    fn is_online(&self) -> bool;
}

/// Shared connectivity flag the host flips from its own signal
///
/// Cheap to clone; all clones observe the same flag.
#[derive(Debug, Clone)]
pub struct SharedConnectivity {
    online: Arc<AtomicBool>,
}

impl SharedConnectivity {
    /// Creates a flag with the given initial state
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Updates the flag; called by the host when its signal changes
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}
