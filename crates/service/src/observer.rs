use std::sync::atomic::{AtomicU64, Ordering};

use crate::session::{LocalId, SessionId};

/// Event-listener capability set the core notifies on every state change
/// (REDESIGN FLAGS: "event listener interface"). All methods default to a
/// no-op so a caller that only cares about one event doesn't have to stub
/// the rest.
pub trait RelayObserver: Send + Sync {
    fn on_payload(&self, _session_id: SessionId, _bytes_len: usize) {}
    fn on_peer_connected(&self, _session_id: SessionId, _local_id: LocalId) {}
    fn on_peer_disconnected(&self, _session_id: SessionId, _local_id: LocalId) {}
    fn on_session_closed(&self, _session_id: SessionId) {}
    fn on_token_issued(&self) {}
    fn on_token_expired(&self) {}
    fn on_connection_rejected(&self) {}
}

/// The one concrete `RelayObserver`, backing the `/stats` counters
/// (supplemental feature 2). Counts are eventually-consistent snapshots,
/// not transactionally tied to the events they count.
#[derive(Default)]
pub struct LoggingObserver {
    sessions_created: AtomicU64,
    sessions_closed: AtomicU64,
    payloads_relayed: AtomicU64,
    tokens_issued: AtomicU64,
    tokens_expired: AtomicU64,
    connections_rejected: AtomicU64,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            payloads_relayed: self.payloads_relayed.load(Ordering::Relaxed),
            tokens_issued: self.tokens_issued.load(Ordering::Relaxed),
            tokens_expired: self.tokens_expired.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub sessions_created: u64,
    pub sessions_closed: u64,
    pub payloads_relayed: u64,
    pub tokens_issued: u64,
    pub tokens_expired: u64,
    pub connections_rejected: u64,
}

impl RelayObserver for LoggingObserver {
    fn on_payload(&self, session_id: SessionId, bytes_len: usize) {
        self.payloads_relayed.fetch_add(1, Ordering::Relaxed);
        log::trace!("session {session_id}: relayed {bytes_len} byte payload");
    }

    fn on_peer_connected(&self, session_id: SessionId, local_id: LocalId) {
        if local_id == 1 {
            self.sessions_created.fetch_add(1, Ordering::Relaxed);
            log::info!("session {session_id} created");
        } else {
            log::debug!("session {session_id}: local id {local_id} joined");
        }
    }

    fn on_peer_disconnected(&self, session_id: SessionId, local_id: LocalId) {
        log::debug!("session {session_id}: local id {local_id} left");
    }

    fn on_session_closed(&self, session_id: SessionId) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        log::info!("session {session_id} closed");
    }

    fn on_token_issued(&self) {
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
    }

    fn on_token_expired(&self) {
        self.tokens_expired.fetch_add(1, Ordering::Relaxed);
    }

    fn on_connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }
}
