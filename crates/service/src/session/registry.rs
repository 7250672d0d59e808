use std::sync::Arc;

use ahash::HashMap;

use parking_lot::{Mutex, RwLock};

use super::{ConnectionId, Session, SessionId};

/// Cross-session lookup tables (C3): the id-keyed store of live sessions
/// plus the two reverse indices the relay core needs on every packet
/// (`which session is this connection the host of` / `which host is this
/// client currently bound to`).
///
/// Each `Session` is locked independently so routing a payload in one
/// session never blocks progress in another. Callers must never hold two
/// session locks at once (join validates capacity, drops its guard, then
/// re-locks to mutate, rather than nesting two `lock()` calls).
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    host_to_session: RwLock<HashMap<ConnectionId, SessionId>>,
    client_to_host: RwLock<HashMap<ConnectionId, ConnectionId>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::default()),
            host_to_session: RwLock::new(HashMap::default()),
            client_to_host: RwLock::new(HashMap::default()),
        }
    }

    pub fn insert(&self, session: Session) {
        let session_id = session.session_id();
        let host_connection_id = session.host_connection_id();
        self.sessions
            .write()
            .insert(session_id, Arc::new(Mutex::new(session)));
        self.host_to_session
            .write()
            .insert(host_connection_id, session_id);
    }

    pub fn get(&self, session_id: SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().get(&session_id).cloned()
    }

    pub fn session_for_host(&self, host_connection_id: ConnectionId) -> Option<Arc<Mutex<Session>>> {
        let session_id = *self.host_to_session.read().get(&host_connection_id)?;
        self.get(session_id)
    }

    /// Bind a client connection to the host it just joined, so future
    /// packets from that connection resolve straight to its session
    /// without needing to remember the `sessionId`.
    pub fn bind_client(&self, client_connection_id: ConnectionId, host_connection_id: ConnectionId) {
        self.client_to_host
            .write()
            .insert(client_connection_id, host_connection_id);
    }

    pub fn session_for_client(&self, client_connection_id: ConnectionId) -> Option<Arc<Mutex<Session>>> {
        let host_connection_id = *self.client_to_host.read().get(&client_connection_id)?;
        self.session_for_host(host_connection_id)
    }

    pub fn unbind_client(&self, client_connection_id: ConnectionId) {
        self.client_to_host.write().remove(&client_connection_id);
    }

    /// Tear down a session entirely: remove it from the id table, drop the
    /// host's reverse mapping, and unbind every client that was pointed at
    /// it. Returns the removed session so the caller can notify its
    /// members after releasing the registry's locks.
    pub fn remove_session(&self, session_id: SessionId) -> Option<Arc<Mutex<Session>>> {
        let session = self.sessions.write().remove(&session_id)?;
        let host_connection_id = session.lock().host_connection_id();
        self.host_to_session.write().remove(&host_connection_id);

        let mut client_to_host = self.client_to_host.write();
        client_to_host.retain(|_, bound_host| *bound_host != host_connection_id);

        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every live session for `GET /session/list`.
    pub fn previews(&self) -> Vec<relay_codec::control::SessionPreview> {
        self.sessions
            .read()
            .values()
            .map(|session| session.lock().to_preview())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_and_resolves_client_to_its_session() {
        let registry = SessionRegistry::new();
        registry.insert(Session::new(1, 100, "lobby".to_string(), 4));

        registry.bind_client(200, 100);
        let session = registry.session_for_client(200).unwrap();
        assert_eq!(session.lock().session_id(), 1);
    }

    #[test]
    fn remove_session_clears_host_and_client_indices() {
        let registry = SessionRegistry::new();
        registry.insert(Session::new(1, 100, "lobby".to_string(), 4));
        registry.bind_client(200, 100);

        assert!(registry.remove_session(1).is_some());
        assert!(registry.session_for_host(100).is_none());
        assert!(registry.session_for_client(200).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_session_removal_is_a_no_op() {
        let registry = SessionRegistry::new();
        assert!(registry.remove_session(42).is_none());
    }
}
