//! Connectivity flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Answers whether the backend is reachable right now.
pub trait Connectivity {
    /// `true` when requests should go to the backend instead of the
    /// offline queue.
    fn is_online(&self) -> bool;
}

/// Shared online/offline flag, flipped by whoever watches the network.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    online: Arc<AtomicBool>,
}

impl NetworkStatus {
    /// Create a status starting `online` or offline.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Record a connectivity change.
    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            info!(online, "Connectivity changed");
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for NetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let status = NetworkStatus::default();
        let watcher = status.clone();
        assert!(watcher.is_online());

        status.set_online(false);
        assert!(!watcher.is_online());
    }
}
