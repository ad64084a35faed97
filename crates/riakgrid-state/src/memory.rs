//! In-memory coordination backend.
//!
//! Behaves like a single-server coordination service for tests and
//! standalone mode: a flat path map with ephemeral ownership per session
//! handle, and per-path fair locks (tokio mutexes queue waiters in FIFO
//! order). `session()` clones a handle onto a fresh session; `expire()`
//! simulates session loss by dropping that session's ephemerals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::coordination::{CoordinationLock, CoordinationStore};
use crate::error::{StateError, StateResult};

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    ephemeral_owner: Option<u64>,
}

#[derive(Default)]
struct Shared {
    entries: Mutex<HashMap<String, Entry>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_session: AtomicU64,
}

/// One session handle onto the shared in-memory service.
#[derive(Clone)]
pub struct MemoryCoordination {
    shared: Arc<Shared>,
    session: u64,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        let shared = Arc::new(Shared::default());
        let session = shared.next_session.fetch_add(1, Ordering::Relaxed);
        Self { shared, session }
    }

    /// A new handle with its own session onto the same service.
    pub fn session(&self) -> Self {
        let session = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
            session,
        }
    }

    /// Simulate session loss: every ephemeral owned by this handle goes.
    pub fn expire(&self) {
        let mut entries = self.shared.entries.lock().unwrap();
        entries.retain(|path, entry| {
            let keep = entry.ephemeral_owner != Some(self.session);
            if !keep {
                debug!(%path, session = self.session, "ephemeral dropped on session expiry");
            }
            keep
        });
    }

    fn ensure_parents(entries: &mut HashMap<String, Entry>, path: &str) {
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            prefix.push('/');
            prefix.push_str(part);
            if prefix != path {
                entries.entry(prefix.clone()).or_insert(Entry {
                    data: Vec::new(),
                    ephemeral_owner: None,
                });
            }
        }
    }
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordination {
    async fn create_persistent(&self, path: &str, data: &[u8]) -> StateResult<()> {
        let mut entries = self.shared.entries.lock().unwrap();
        Self::ensure_parents(&mut entries, path);
        entries.entry(path.to_string()).or_insert(Entry {
            data: data.to_vec(),
            ephemeral_owner: None,
        });
        Ok(())
    }

    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> StateResult<()> {
        let mut entries = self.shared.entries.lock().unwrap();
        if entries.contains_key(path) {
            return Err(StateError::AlreadyExists(path.to_string()));
        }
        Self::ensure_parents(&mut entries, path);
        entries.insert(
            path.to_string(),
            Entry {
                data: data.to_vec(),
                ephemeral_owner: Some(self.session),
            },
        );
        Ok(())
    }

    async fn set_data(&self, path: &str, data: &[u8]) -> StateResult<()> {
        let mut entries = self.shared.entries.lock().unwrap();
        match entries.get_mut(path) {
            Some(entry) => {
                entry.data = data.to_vec();
                Ok(())
            }
            None => Err(StateError::NotFound(path.to_string())),
        }
    }

    async fn get_data(&self, path: &str) -> StateResult<Option<Vec<u8>>> {
        let entries = self.shared.entries.lock().unwrap();
        Ok(entries.get(path).map(|e| e.data.clone()))
    }

    async fn get_children(&self, path: &str) -> StateResult<Vec<String>> {
        let entries = self.shared.entries.lock().unwrap();
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut children: Vec<String> = entries
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        children.sort();
        Ok(children)
    }

    async fn delete(&self, path: &str) -> StateResult<bool> {
        let mut entries = self.shared.entries.lock().unwrap();
        Ok(entries.remove(path).is_some())
    }

    async fn lock(&self, path: &str) -> StateResult<CoordinationLock> {
        let mutex = {
            let mut locks = self.shared.locks.lock().unwrap();
            Arc::clone(locks.entry(path.to_string()).or_default())
        };
        let guard = mutex.lock_owned().await;
        Ok(CoordinationLock::new(guard))
    }
}
