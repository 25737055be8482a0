//! Per-server byte-range capability tracking.
//!
//! Whether a server honors `Range` requests is only learned by trying one.
//! This cache remembers the observed answer per server so a session does not
//! repeat failed resume attempts, and so degraded behavior can be explained
//! to the user. Entries live for the owning orchestrator's lifetime only;
//! nothing is persisted across runs.

use std::collections::HashMap;
use std::sync::Mutex;

/// Map from server identity to observed `Range` support.
///
/// Unknown servers are optimistically assumed range-capable; a failed range
/// attempt demotes them for the rest of the process.
#[derive(Debug, Default)]
pub struct ServerCapabilityCache {
    entries: Mutex<HashMap<String, bool>>,
}

impl ServerCapabilityCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the server is believed to honor `Range` requests.
    ///
    /// Returns `true` for servers with no recorded observation.
    pub fn supports_range(&self, server: &str) -> bool {
        self.entries
            .lock()
            .expect("capability cache lock poisoned")
            .get(server)
            .copied()
            .unwrap_or(true)
    }

    /// Record an observation for the server.
    pub fn set_supports_range(&self, server: &str, supported: bool) {
        self.entries
            .lock()
            .expect("capability cache lock poisoned")
            .insert(server.to_string(), supported);
    }

    /// Whether an observation has been recorded for the server.
    pub fn is_known(&self, server: &str) -> bool {
        self.entries
            .lock()
            .expect("capability cache lock poisoned")
            .contains_key(server)
    }
}
