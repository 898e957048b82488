//! Concurrent registries of live sessions and connections
//!
//! Gateways own their session and connection objects. The registry keeps a
//! weak back-reference to each one so the controller can enumerate them
//! without extending their lifetime: dropping the last strong reference is
//! enough to make an entry disappear from snapshots.

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use pc_core::error::{ConnectionError, SessionError};
use pc_core::traits::{Connection, Session};

/// Registry of live sessions, keyed by session id
pub type SessionRegistry = Registry<dyn Session>;

/// Registry of live connections, keyed by connection id
pub type ConnectionRegistry = Registry<dyn Connection>;

/// Returned by [`Registry::register`] when the id is held by a live object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Id already registered: {0}")]
pub struct AlreadyRegistered(pub String);

impl From<AlreadyRegistered> for SessionError {
    fn from(e: AlreadyRegistered) -> Self {
        SessionError::AlreadyExists(e.0)
    }
}

impl From<AlreadyRegistered> for ConnectionError {
    fn from(e: AlreadyRegistered) -> Self {
        ConnectionError::AlreadyExists(e.0)
    }
}

/// Id-keyed collection of weak references, safe to use from any task
pub struct Registry<T: ?Sized> {
    entries: DashMap<String, Weak<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register `obj` under `id`.
    ///
    /// An id still held by a live object is refused. An id whose previous
    /// object has been dropped is taken over by the new one.
    pub fn register(&self, id: impl Into<String>, obj: &Arc<T>) -> Result<(), AlreadyRegistered> {
        match self.entries.entry(id.into()) {
            Entry::Occupied(mut entry) => {
                if entry.get().strong_count() > 0 {
                    return Err(AlreadyRegistered(entry.key().clone()));
                }
                entry.insert(Arc::downgrade(obj));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::downgrade(obj));
            }
        }
        Ok(())
    }

    /// Remove `id`. Returns whether an entry was present; absent ids are a no-op.
    pub fn unregister(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Live object registered under `id`
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.entries.get(id).and_then(|entry| entry.value().upgrade())
    }

    /// Independent copy of all live entries, ordered by id.
    ///
    /// The returned vector is detached from the registry: registrations and
    /// removals that happen while the caller iterates it do not affect it.
    pub fn snapshot(&self) -> Vec<(String, Arc<T>)> {
        let mut live: Vec<(String, Arc<T>)> = self
            .entries
            .iter()
            .filter_map(|entry| entry.value().upgrade().map(|obj| (entry.key().clone(), obj)))
            .collect();
        live.sort_by(|a, b| a.0.cmp(&b.0));
        live
    }

    /// Ids of all live entries, sorted
    pub fn ids(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|(id, _)| id).collect()
    }

    /// Drop entries whose object no longer exists; returns their ids
    pub fn prune(&self) -> Vec<String> {
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().strong_count() == 0)
            .map(|entry| entry.key().clone())
            .collect();

        dead.into_iter()
            .filter(|id| {
                self.entries
                    .remove_if(id, |_, weak| weak.strong_count() == 0)
                    .is_some()
            })
            .collect()
    }

    /// Number of entries, including ones not yet pruned
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
