//! Live connections per session.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use super::handle::ConnectionHandle;

/// Shared registry of every admitted connection, grouped by session id.
///
/// `DashMap` shard locks give per-session mutual exclusion: registration,
/// deregistration and snapshots of the same session never interleave.
/// Empty groups are pruned on deregistration.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<String, HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle` to `session_id`'s group, creating the group if needed.
    ///
    /// The returned [`Registration`] removes the handle again when dropped.
    pub fn register(self: &Arc<Self>, session_id: &str, handle: ConnectionHandle) -> Registration {
        let handle_id = handle.id().to_string();
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(handle_id.clone(), handle);

        Registration {
            registry: Arc::clone(self),
            session_id: session_id.to_string(),
            handle_id,
            released: false,
        }
    }

    /// Remove a handle. Returns `false` if it was not registered, which is
    /// expected when a close and an error path race.
    pub fn deregister(&self, session_id: &str, handle_id: &str) -> bool {
        let removed = match self.sessions.get_mut(session_id) {
            Some(mut group) => group.remove(handle_id).is_some(),
            None => false,
        };
        // The guard above must be gone before touching the same shard again.
        self.sessions.remove_if(session_id, |_, group| group.is_empty());
        removed
    }

    /// Point-in-time copy of a session's handles.
    pub fn snapshot(&self, session_id: &str) -> Vec<ConnectionHandle> {
        self.sessions
            .get(session_id)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Display names of the live handles in a session, sorted and deduplicated.
    pub fn members(&self, session_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .get(session_id)
            .map(|group| group.values().map(|h| h.name().to_string()).collect())
            .unwrap_or_default();
        names.sort();
        names.dedup();
        names
    }

    /// Ids of sessions that currently have at least one live handle.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn connection_count(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map_or(0, |group| group.len())
    }

    /// Drop a session's whole group and ask every handle in it to close.
    /// Returns the number of handles asked.
    pub fn close_session(&self, session_id: &str, reason: &'static str) -> usize {
        let Some((_, group)) = self.sessions.remove(session_id) else {
            return 0;
        };
        for handle in group.values() {
            handle.request_close(reason);
        }
        group.len()
    }
}

/// Scoped membership of one handle in the registry.
///
/// Dropping it deregisters the handle, so every exit path of a connection
/// task (including cancellation) releases its slot exactly once.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    session_id: String,
    handle_id: String,
    released: bool,
}

impl Registration {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn handle_id(&self) -> &str {
        &self.handle_id
    }

    /// Deregister now. Returns whether the handle was still registered.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.registry.deregister(&self.session_id, &self.handle_id)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.released {
            self.registry.deregister(&self.session_id, &self.handle_id);
        }
    }
}
