//! Live connection pairs, keyed by a monotonic id

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::AbortHandle;

struct Entry {
    peer: SocketAddr,
    opened: Instant,
    abort: Option<AbortHandle>,
}

/// Snapshot of one live pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer: SocketAddr,
    pub age: Duration,
}

/// Tracks every connection pair currently owned by a relay task
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Add an entry; it is removed again when the guard drops
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(
            id,
            Entry {
                peer,
                opened: Instant::now(),
                abort: None,
            },
        );
        ConnectionGuard {
            id,
            registry: Arc::clone(self),
        }
    }

    /// Record the task owning `id` so it can be aborted
    ///
    /// Ignored if the entry is already gone.
    pub fn attach(&self, id: u64, handle: AbortHandle) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.abort = Some(handle);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Live pairs ordered by id
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let now = Instant::now();
        let mut infos: Vec<ConnectionInfo> = self
            .entries
            .lock()
            .iter()
            .map(|(id, entry)| ConnectionInfo {
                id: *id,
                peer: entry.peer,
                age: now.saturating_duration_since(entry.opened),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Abort every attached task; returns how many were signalled
    pub fn abort_all(&self) -> usize {
        // Aborted tasks drop their guards, which lock the map again.
        let handles: Vec<AbortHandle> = self
            .entries
            .lock()
            .values_mut()
            .filter_map(|entry| entry.abort.take())
            .collect();
        for handle in &handles {
            handle.abort();
        }
        handles.len()
    }

    fn remove(&self, id: u64) {
        self.entries.lock().remove(&id);
    }
}

/// Keeps a registry entry alive for as long as the relay task holds it
pub struct ConnectionGuard {
    id: u64,
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
