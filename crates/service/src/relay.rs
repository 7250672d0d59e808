use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ahash::HashMap;
use bytes::BytesMut;
use parking_lot::RwLock;
use relay_codec::Token;
use relay_codec::control::{SessionInfo, SessionPreview, TokenResponse};
use relay_codec::message::{ClientMessage, DisconnectReason, ServerMessage, TransferMode};

use crate::expiring::ExpiringStore;
use crate::observer::RelayObserver;
use crate::session::{ConnectionId, LocalId, Session, SessionId};
use crate::session::registry::SessionRegistry;
use crate::uid::UidAllocator;

/// Which physical sub-channel a datagram arrived on (C7). Only `Reliable`
/// carries application messages; anything on `Unreliable` is a protocol
/// violation regardless of its contents (§4.4/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Reliable,
    Unreliable,
}

/// The tagged-sum per-connection state (REDESIGN FLAGS). All transitions
/// happen under the single lock guarding the table that holds these, so
/// "is this connection still pending when its token arrives" is
/// structurally race-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Pending,
    Host { session_id: SessionId },
    Client { host_connection_id: ConnectionId, local_id: LocalId },
}

/// What the relay core needs from the transport: enqueue a reliable send,
/// or cut a connection. Both return immediately (§5: "no handler blocks on
/// I/O"); the actual datagram I/O happens on the transport's own worker.
pub trait TransportSink: Send + Sync {
    fn send(&self, connection_id: ConnectionId, bytes: &[u8]);
    fn disconnect(&self, connection_id: ConnectionId);
}

/// C5: the session manager's coupling to the KCP data plane. Consumes
/// transport events (`on_connected`/`on_data`/`on_disconnected`), drives
/// the per-connection auth state machine, and answers the HTTP control
/// plane's allocate/join/modify/list requests.
pub struct RelayCore<T: TransportSink, O: RelayObserver> {
    states: RwLock<HashMap<ConnectionId, ConnectionState>>,
    registry: SessionRegistry,
    uids: UidAllocator,
    create_cache: ExpiringStore<Token, SessionInfo>,
    join_cache: ExpiringStore<Token, SessionId>,
    modify_cache: ExpiringStore<Token, SessionInfo>,
    pending_connections: ExpiringStore<ConnectionId, ()>,
    transport: T,
    observer: O,
}

impl<T: TransportSink, O: RelayObserver> RelayCore<T, O> {
    pub fn new(pending_lifetime_seconds: i32, transport: T, observer: O) -> Self {
        Self {
            states: RwLock::new(HashMap::default()),
            registry: SessionRegistry::new(),
            uids: UidAllocator::new(),
            create_cache: ExpiringStore::new(pending_lifetime_seconds),
            join_cache: ExpiringStore::new(pending_lifetime_seconds),
            modify_cache: ExpiringStore::new(pending_lifetime_seconds),
            pending_connections: ExpiringStore::new(pending_lifetime_seconds),
            transport,
            observer,
        }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn connection_count(&self) -> usize {
        self.states.read().len()
    }

    // ---- transport-facing callbacks (C7) ----------------------------

    pub fn on_connected(&self, connection_id: ConnectionId) {
        self.states.write().insert(connection_id, ConnectionState::Pending);
        self.pending_connections.insert(connection_id, ());
    }

    pub fn on_data(&self, connection_id: ConnectionId, channel: Channel, bytes: &[u8]) {
        if channel == Channel::Unreliable {
            self.terminate(connection_id, DisconnectReason::UnreliableCommunicationNotAllowed);
            return;
        }

        let message = match ClientMessage::decode(bytes) {
            Ok(message) => message,
            Err(decode_error) => {
                self.terminate(connection_id, decode_error.reason());
                return;
            }
        };

        let Some(state) = self.states.read().get(&connection_id).copied() else {
            // Connection already torn down (e.g. raced with a GC timeout);
            // nothing left to route to.
            return;
        };

        match message {
            ClientMessage::AuthSession(token) => self.handle_auth(connection_id, state, token),
            ClientMessage::JoinSession(token) => self.handle_join(connection_id, state, token),
            ClientMessage::ModifySession(token) => self.handle_modify(connection_id, state, token),
            ClientMessage::Payload {
                recipient_local_id,
                transfer_channel,
                transfer_mode,
                data,
            } => self.handle_payload(connection_id, state, recipient_local_id, transfer_channel, transfer_mode, data),
            ClientMessage::DisconnectClient(target) => {
                self.handle_disconnect_client(connection_id, state, target)
            }
        }
    }

    /// Transport-level failure (not a clean `OnDisconnected`): same
    /// teardown semantics as a protocol violation on the offending
    /// connection, except the session keeps running for a `Client` (the
    /// host is merely notified, per §4.4's transport-error row).
    pub fn on_error(&self, connection_id: ConnectionId) {
        self.terminate(connection_id, DisconnectReason::ServerSideError);
    }

    /// The transport's own disconnect notification. Idempotent: a second
    /// firing for a connection already reaped by `terminate` (or by a
    /// prior `on_disconnected`) is a documented no-op (§8 law 3).
    pub fn on_disconnected(&self, connection_id: ConnectionId) {
        let state = self.states.write().remove(&connection_id);
        match state {
            None => {}
            Some(ConnectionState::Pending) => {
                self.pending_connections.remove(&connection_id);
            }
            Some(ConnectionState::Client { host_connection_id, local_id }) => {
                self.teardown_client(connection_id, host_connection_id, local_id);
            }
            Some(ConnectionState::Host { session_id }) => {
                self.teardown_host(connection_id, session_id);
            }
        }
    }

    /// Server shutdown (§4.4, §5): close every live connection with
    /// `ServerShutdown`. Stopping the transport itself is the caller's
    /// responsibility once this returns.
    pub fn shutdown(&self) {
        let connections: Vec<ConnectionId> = self.states.read().keys().copied().collect();
        for connection_id in connections {
            self.terminate(connection_id, DisconnectReason::ServerShutdown);
        }
    }

    /// Spawn the single GC ticker thread driving all four expiring stores
    /// (§4.2): once per second, age every entry and react to expiry. The
    /// ticker holds only a `Weak` reference and exits once the core is
    /// dropped, mirroring the teacher's `Arc::downgrade` + `thread::spawn`
    /// ticker pattern.
    pub fn spawn_gc_ticker(self: &Arc<Self>) -> thread::JoinHandle<()>
    where
        T: 'static,
        O: 'static,
    {
        let weak = Arc::downgrade(self);
        thread::spawn(move || loop {
            thread::sleep(Duration::from_secs(1));
            let Some(core) = weak.upgrade() else {
                return;
            };

            for _ in core.create_cache.tick() {
                core.observer.on_token_expired();
            }
            for _ in core.join_cache.tick() {
                core.observer.on_token_expired();
            }
            for _ in core.modify_cache.tick() {
                core.observer.on_token_expired();
            }
            for (connection_id, ()) in core.pending_connections.tick() {
                core.terminate(connection_id, DisconnectReason::TimeOut);
            }
        })
    }

    // ---- HTTP-facing operations (C6) ---------------------------------

    pub fn allocate_session(&self, info: SessionInfo) -> TokenResponse {
        if !info.is_valid() {
            return TokenResponse::from_error("name must be non-empty and maxMembers must be positive");
        }
        let token = self.create_cache.add(info);
        self.observer.on_token_issued();
        TokenResponse::from_token(token)
    }

    pub fn request_join(&self, session_id: SessionId) -> TokenResponse {
        let Some(session) = self.registry.get(session_id) else {
            return TokenResponse::from_error("session does not exist");
        };
        if session.lock().is_full().0 {
            return TokenResponse::from_error("session is full");
        }
        let token = self.join_cache.add(session_id);
        self.observer.on_token_issued();
        TokenResponse::from_token(token)
    }

    pub fn request_modify(&self, info: SessionInfo) -> TokenResponse {
        if !info.is_valid() {
            return TokenResponse::from_error("name must be non-empty and maxMembers must be positive");
        }
        let token = self.modify_cache.add(info);
        self.observer.on_token_issued();
        TokenResponse::from_token(token)
    }

    pub fn list_sessions(&self, skip: usize, limit: usize) -> Vec<SessionPreview> {
        let mut previews = self.registry.previews();
        previews.sort_by_key(|preview| preview.session_id);
        previews.into_iter().skip(skip).take(limit).collect()
    }

    // ---- message handlers ---------------------------------------------

    fn handle_auth(&self, connection_id: ConnectionId, state: ConnectionState, token: Token) {
        if state != ConnectionState::Pending {
            self.terminate(connection_id, DisconnectReason::UnAuthorizedAction);
            return;
        }

        let Some(info) = self.create_cache.try_extract(&token) else {
            self.terminate(connection_id, DisconnectReason::InvalidAuthToken);
            return;
        };

        let Some(session_id) = self.uids.get() else {
            log::error!("session id space exhausted while admitting connection {connection_id}");
            self.terminate(connection_id, DisconnectReason::ServerSideError);
            return;
        };

        self.pending_connections.remove(&connection_id);
        self.registry
            .insert(Session::new(session_id, connection_id, info.name, info.max_members));
        self.states
            .write()
            .insert(connection_id, ConnectionState::Host { session_id });

        self.observer.on_peer_connected(session_id, 1);
        self.send_message(connection_id, &ServerMessage::Success(Some(1)));
    }

    fn handle_join(&self, connection_id: ConnectionId, state: ConnectionState, token: Token) {
        if state != ConnectionState::Pending {
            self.terminate(connection_id, DisconnectReason::UnAuthorizedAction);
            return;
        }

        let Some(session_id) = self.join_cache.try_extract(&token) else {
            self.terminate(connection_id, DisconnectReason::InvalidAuthToken);
            return;
        };

        let Some(session) = self.registry.get(session_id) else {
            self.terminate(connection_id, DisconnectReason::InvalidSessionId);
            return;
        };

        let (host_connection_id, local_id) = {
            let mut session = session.lock();
            let Some(local_id) = session.join(connection_id) else {
                drop(session);
                self.terminate(connection_id, DisconnectReason::SessionFull);
                return;
            };
            (session.host_connection_id(), local_id)
        };

        self.pending_connections.remove(&connection_id);
        self.registry.bind_client(connection_id, host_connection_id);
        self.states.write().insert(
            connection_id,
            ConnectionState::Client { host_connection_id, local_id },
        );

        self.observer.on_peer_connected(session_id, local_id);
        self.send_message(connection_id, &ServerMessage::Success(Some(local_id)));
        self.send_message(
            host_connection_id,
            &ServerMessage::ClientConnected { connection_id, local_id },
        );
    }

    fn handle_modify(&self, connection_id: ConnectionId, state: ConnectionState, token: Token) {
        let ConnectionState::Host { session_id } = state else {
            self.terminate(connection_id, DisconnectReason::UnAuthorizedAction);
            return;
        };

        let Some(info) = self.modify_cache.try_extract(&token) else {
            self.terminate(connection_id, DisconnectReason::InvalidAuthToken);
            return;
        };

        match self.registry.get(session_id) {
            Some(session) => session.lock().modify_info(info.name, info.max_members),
            None => {
                log::error!("host {connection_id} referenced missing session {session_id} on modify");
                self.terminate(connection_id, DisconnectReason::ServerSideError);
                return;
            }
        }

        self.send_message(connection_id, &ServerMessage::Success(None));
    }

    /// Routing follows the outer auth-state table directly: a `Host`
    /// connection always routes host→client, a `Client` connection always
    /// routes client→host. The wire's `recipientLocalId` field picks the
    /// target among a host's members; for a client it is informational
    /// only since a client's sole destination is always the host.
    #[allow(clippy::too_many_arguments)]
    fn handle_payload(
        &self,
        connection_id: ConnectionId,
        state: ConnectionState,
        recipient_local_id: u32,
        transfer_channel: u32,
        transfer_mode: TransferMode,
        data: &[u8],
    ) {
        match state {
            ConnectionState::Pending => {
                self.terminate(connection_id, DisconnectReason::UnAuthorizedAction);
            }
            ConnectionState::Host { session_id } => {
                let Some(session) = self.registry.get(session_id) else {
                    log::error!("host {connection_id} has no session {session_id} for payload");
                    self.terminate(connection_id, DisconnectReason::ServerSideError);
                    return;
                };
                let destination = {
                    let session = session.lock();
                    if session.is_tombstoned() {
                        None
                    } else {
                        session.connection_for_local(recipient_local_id)
                    }
                };
                let Some(destination) = destination else {
                    // The target client already left, or the session is
                    // mid-teardown on another thread; drop silently.
                    return;
                };
                self.observer.on_payload(session_id, data.len());
                self.send_message(
                    destination,
                    &ServerMessage::PayloadRelay {
                        sender_or_host_local_id: 1,
                        transfer_channel,
                        transfer_mode,
                        data,
                    },
                );
            }
            ConnectionState::Client { host_connection_id, local_id } => {
                let Some(session) = self.registry.session_for_host(host_connection_id) else {
                    // Host already torn down; drop silently rather than
                    // notify a host that no longer has a session.
                    return;
                };
                let session_id = {
                    let session = session.lock();
                    if session.is_tombstoned() {
                        None
                    } else {
                        Some(session.session_id())
                    }
                };
                let Some(session_id) = session_id else {
                    return;
                };
                self.observer.on_payload(session_id, data.len());
                self.send_message(
                    host_connection_id,
                    &ServerMessage::PayloadRelay {
                        sender_or_host_local_id: local_id,
                        transfer_channel,
                        transfer_mode,
                        data,
                    },
                );
            }
        }
    }

    fn handle_disconnect_client(&self, connection_id: ConnectionId, state: ConnectionState, target: ConnectionId) {
        let ConnectionState::Host { session_id } = state else {
            self.terminate(connection_id, DisconnectReason::UnAuthorizedAction);
            return;
        };

        let in_session = self
            .registry
            .get(session_id)
            .is_some_and(|session| session.lock().local_for_connection(target).is_some());

        if in_session {
            self.terminate(target, DisconnectReason::HostTriggeredDisconnection);
        }
    }

    // ---- teardown helpers -----------------------------------------------

    fn teardown_client(&self, connection_id: ConnectionId, host_connection_id: ConnectionId, local_id: LocalId) {
        self.registry.unbind_client(connection_id);

        let session_id = self.registry.session_for_host(host_connection_id).map(|session| {
            let mut session = session.lock();
            session.remove_member(connection_id);
            session.session_id()
        });

        if let Some(session_id) = session_id {
            self.observer.on_peer_disconnected(session_id, local_id);
        }
        self.send_message(host_connection_id, &ServerMessage::ClientDisconnected(connection_id));
    }

    fn teardown_host(&self, host_connection_id: ConnectionId, session_id: SessionId) {
        let Some(session) = self.registry.remove_session(session_id) else {
            return;
        };

        let members: Vec<(ConnectionId, LocalId)> = {
            let mut session = session.lock();
            session.tombstone();
            session
                .members()
                .filter(|&(connection_id, _)| connection_id != host_connection_id)
                .collect()
        };

        for (client_connection_id, local_id) in members {
            self.states.write().remove(&client_connection_id);
            self.registry.unbind_client(client_connection_id);
            self.send_message(
                client_connection_id,
                &ServerMessage::ServerSideDisconnection(DisconnectReason::HostShutdown),
            );
            self.transport.disconnect(client_connection_id);
            self.observer.on_peer_disconnected(session_id, local_id);
        }

        self.uids.release(session_id);
        self.observer.on_session_closed(session_id);
    }

    /// Send `ServerSideDisconnection(reason)` to the offending connection
    /// and cut it, then run the same cleanup `on_disconnected` would have
    /// run for its last known state ("Close R" in §4.4).
    fn terminate(&self, connection_id: ConnectionId, reason: DisconnectReason) {
        let state = self.states.write().remove(&connection_id);
        if state.is_none() {
            return;
        }

        self.send_message(connection_id, &ServerMessage::ServerSideDisconnection(reason));
        self.transport.disconnect(connection_id);

        match state {
            None => {}
            Some(ConnectionState::Pending) => {
                self.pending_connections.remove(&connection_id);
                // Closed before ever being admitted as a Host or Client:
                // an admission attempt that was rejected, as opposed to a
                // member being kicked or a session tearing down.
                self.observer.on_connection_rejected();
            }
            Some(ConnectionState::Client { host_connection_id, local_id }) => {
                self.teardown_client(connection_id, host_connection_id, local_id);
            }
            Some(ConnectionState::Host { session_id }) => {
                self.teardown_host(connection_id, session_id);
            }
        }
    }

    fn send_message(&self, connection_id: ConnectionId, message: &ServerMessage) {
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        self.transport.send(connection_id, &buf);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use relay_codec::message::ServerMessage as SM;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ConnectionId, Vec<u8>)>>,
        disconnected: Mutex<Vec<ConnectionId>>,
    }

    impl TransportSink for RecordingTransport {
        fn send(&self, connection_id: ConnectionId, bytes: &[u8]) {
            self.sent.lock().unwrap().push((connection_id, bytes.to_vec()));
        }

        fn disconnect(&self, connection_id: ConnectionId) {
            self.disconnected.lock().unwrap().push(connection_id);
        }
    }

    #[derive(Default)]
    struct NoopObserver;
    impl RelayObserver for NoopObserver {}

    fn core() -> RelayCore<RecordingTransport, NoopObserver> {
        RelayCore::new(30, RecordingTransport::default(), NoopObserver)
    }

    fn encode_auth(token: Token) -> Vec<u8> {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&token);
        bytes
    }

    fn encode_join(token: Token) -> Vec<u8> {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&token);
        bytes
    }

    fn last_message(core: &RelayCore<RecordingTransport, NoopObserver>, connection_id: ConnectionId) -> Vec<u8> {
        core.transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(cid, _)| *cid == connection_id)
            .map(|(_, bytes)| bytes.clone())
            .expect("no message recorded for connection")
    }

    #[test]
    fn host_allocation_and_client_join_end_to_end() {
        let core = core();

        // S1: host authenticates with a freshly-minted create token.
        let token = core.create_cache.add(SessionInfo {
            name: "lobby".to_string(),
            max_members: 4,
        });
        core.on_connected(100);
        core.on_data(100, Channel::Reliable, &encode_auth(token));
        assert_eq!(last_message(&core, 100), {
            let mut buf = BytesMut::new();
            SM::Success(Some(1)).encode(&mut buf);
            buf.to_vec()
        });

        // S2: a client joins that session.
        let join_token = core.join_cache.add(0);
        core.on_connected(200);
        core.on_data(200, Channel::Reliable, &encode_join(join_token));

        assert_eq!(last_message(&core, 200), {
            let mut buf = BytesMut::new();
            SM::Success(Some(2)).encode(&mut buf);
            buf.to_vec()
        });
        assert_eq!(last_message(&core, 100), {
            let mut buf = BytesMut::new();
            SM::ClientConnected { connection_id: 200, local_id: 2 }.encode(&mut buf);
            buf.to_vec()
        });

        // S3: client -> host payload is rewritten to carry the client's localId.
        let mut payload = vec![3u8];
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(0);
        payload.extend_from_slice(b"hi");
        core.on_data(200, Channel::Reliable, &payload);

        let mut expected = BytesMut::new();
        SM::PayloadRelay {
            sender_or_host_local_id: 2,
            transfer_channel: 0,
            transfer_mode: TransferMode::Reliable,
            data: b"hi",
        }
        .encode(&mut expected);
        assert_eq!(last_message(&core, 100), expected.to_vec());

        // S5: client drops -> host is told.
        core.on_disconnected(200);
        let mut expected = BytesMut::new();
        SM::ClientDisconnected(200).encode(&mut expected);
        assert_eq!(last_message(&core, 100), expected.to_vec());
        assert_eq!(core.session_count(), 1);
    }

    #[test]
    fn payload_before_auth_is_unauthorized() {
        let core = core();
        core.on_connected(1);

        let mut payload = vec![3u8];
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(0);
        payload.push(b'x');
        core.on_data(1, Channel::Reliable, &payload);

        let mut expected = BytesMut::new();
        SM::ServerSideDisconnection(DisconnectReason::UnAuthorizedAction).encode(&mut expected);
        assert_eq!(last_message(&core, 1), expected.to_vec());
        assert_eq!(core.transport.disconnected.lock().unwrap().as_slice(), &[1]);
    }

    #[test]
    fn rejected_admission_attempts_count_toward_stats() {
        use crate::observer::LoggingObserver;

        let core = RelayCore::new(30, RecordingTransport::default(), LoggingObserver::new());

        // Never-admitted connection closed for a protocol violation.
        core.on_connected(1);
        core.on_data(1, Channel::Reliable, &encode_auth([0u8; 16]));
        assert_eq!(core.observer().stats().connections_rejected, 1);

        // A second rejection, this time a stale/expired join token.
        core.on_connected(2);
        core.on_data(2, Channel::Reliable, &encode_join([0u8; 16]));
        assert_eq!(core.observer().stats().connections_rejected, 2);

        // An admitted host's later disconnect is not a rejection.
        let token = core.create_cache.add(SessionInfo {
            name: "lobby".to_string(),
            max_members: 4,
        });
        core.on_connected(3);
        core.on_data(3, Channel::Reliable, &encode_auth(token));
        core.on_disconnected(3);
        assert_eq!(core.observer().stats().connections_rejected, 2);
    }

    #[test]
    fn expired_auth_token_closes_with_invalid_auth_token() {
        let core = core();
        core.on_connected(1);
        core.on_data(1, Channel::Reliable, &encode_auth([0u8; 16]));

        let mut expected = BytesMut::new();
        SM::ServerSideDisconnection(DisconnectReason::InvalidAuthToken).encode(&mut expected);
        assert_eq!(last_message(&core, 1), expected.to_vec());
    }

    #[test]
    fn unreliable_channel_is_always_rejected() {
        let core = core();
        core.on_connected(1);
        core.on_data(1, Channel::Unreliable, &[0u8; 17]);

        let mut expected = BytesMut::new();
        SM::ServerSideDisconnection(DisconnectReason::UnreliableCommunicationNotAllowed).encode(&mut expected);
        assert_eq!(last_message(&core, 1), expected.to_vec());
    }

    #[test]
    fn tombstoned_session_drops_in_flight_payloads_silently() {
        let core = core();
        let token = core.create_cache.add(SessionInfo {
            name: "lobby".to_string(),
            max_members: 4,
        });
        core.on_connected(100);
        core.on_data(100, Channel::Reliable, &encode_auth(token));

        let join_token = core.join_cache.add(0);
        core.on_connected(200);
        core.on_data(200, Channel::Reliable, &encode_join(join_token));

        // Simulate teardown having reached the tombstone step on another
        // thread (§9 REDESIGN FLAGS) before this in-flight client payload
        // is processed; the client's own `ConnectionState` entry hasn't
        // been removed yet, so routing must consult the tombstone flag.
        core.registry.get(0).unwrap().lock().tombstone();

        let sent_before = core.transport.sent.lock().unwrap().len();

        let mut payload = vec![3u8];
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(0);
        payload.extend_from_slice(b"late");
        core.on_data(200, Channel::Reliable, &payload);

        assert_eq!(core.transport.sent.lock().unwrap().len(), sent_before);
    }

    #[test]
    fn host_disconnect_cascades_to_every_client() {
        let core = core();
        let token = core.create_cache.add(SessionInfo {
            name: "lobby".to_string(),
            max_members: 4,
        });
        core.on_connected(100);
        core.on_data(100, Channel::Reliable, &encode_auth(token));

        let join_token = core.join_cache.add(0);
        core.on_connected(200);
        core.on_data(200, Channel::Reliable, &encode_join(join_token));

        core.on_disconnected(100);

        let mut expected = BytesMut::new();
        SM::ServerSideDisconnection(DisconnectReason::HostShutdown).encode(&mut expected);
        assert_eq!(last_message(&core, 200), expected.to_vec());
        assert_eq!(core.transport.disconnected.lock().unwrap().as_slice(), &[200]);
        assert_eq!(core.session_count(), 0);
    }

    #[test]
    fn double_disconnect_is_a_no_op() {
        let core = core();
        core.on_connected(1);
        core.on_disconnected(1);
        let sent_before = core.transport.sent.lock().unwrap().len();
        core.on_disconnected(1);
        assert_eq!(core.transport.sent.lock().unwrap().len(), sent_before);
    }

    #[test]
    fn host_can_forcibly_disconnect_a_client() {
        let core = core();
        let token = core.create_cache.add(SessionInfo {
            name: "lobby".to_string(),
            max_members: 4,
        });
        core.on_connected(100);
        core.on_data(100, Channel::Reliable, &encode_auth(token));

        let join_token = core.join_cache.add(0);
        core.on_connected(200);
        core.on_data(200, Channel::Reliable, &encode_join(join_token));

        let mut disconnect = vec![4u8];
        disconnect.extend_from_slice(&200u32.to_le_bytes());
        core.on_data(100, Channel::Reliable, &disconnect);

        let mut expected = BytesMut::new();
        SM::ServerSideDisconnection(DisconnectReason::HostTriggeredDisconnection).encode(&mut expected);
        assert_eq!(last_message(&core, 200), expected.to_vec());
        assert_eq!(core.transport.disconnected.lock().unwrap().contains(&200), true);
    }
}
