use std::sync::{Arc, Mutex};

use anyhow::Result;
use relay_codec::control::SessionInfo;
use relay_codec::message::TransferMode;
use relay_service::{Channel, RelayCore, RelayObserver, TransportSink};

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(u32, Vec<u8>)>>,
    disconnected: Mutex<Vec<u32>>,
}

struct RecordingTransport(Arc<Recorder>);

impl TransportSink for RecordingTransport {
    fn send(&self, connection_id: u32, bytes: &[u8]) {
        self.0.sent.lock().unwrap().push((connection_id, bytes.to_vec()));
    }

    fn disconnect(&self, connection_id: u32) {
        self.0.disconnected.lock().unwrap().push(connection_id);
    }
}

impl Recorder {
    fn last_sent_to(&self, connection_id: u32) -> Vec<u8> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(cid, _)| *cid == connection_id)
            .map(|(_, bytes)| bytes.clone())
            .expect("no message recorded for connection")
    }
}

#[derive(Default)]
struct NoopObserver;
impl RelayObserver for NoopObserver {}

#[test]
fn host_allocate_client_join_payload_route_disconnect() -> Result<()> {
    let recorder = Arc::new(Recorder::default());
    let core = RelayCore::new(30, RecordingTransport(recorder.clone()), NoopObserver);

    // HTTP allocate -> KCP AuthSession, mirroring scenario S1.
    let info = SessionInfo {
        name: "lobby".to_string(),
        max_members: 4,
    };
    let host_response = core.allocate_session(info);
    let host_token = host_response.value.expect("allocate must succeed");

    core.on_connected(1);
    let mut auth = vec![0u8];
    auth.extend_from_slice(&host_token);
    core.on_data(1, Channel::Reliable, &auth);
    assert_eq!(core.session_count(), 1);

    // HTTP join -> KCP JoinSession, mirroring scenario S2.
    let join_response = core.request_join(0);
    let join_token = join_response.value.expect("join request must succeed");

    core.on_connected(2);
    let mut join = vec![1u8];
    join.extend_from_slice(&join_token);
    core.on_data(2, Channel::Reliable, &join);

    // S3: client -> host payload, rewritten to carry the client's localId (2).
    let mut payload = vec![3u8];
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.extend_from_slice(&7u32.to_le_bytes());
    payload.push(TransferMode::Reliable as u8);
    payload.extend_from_slice(b"ping");
    core.on_data(2, Channel::Reliable, &payload);

    let host_saw = recorder.last_sent_to(1);
    assert_eq!(host_saw[0], 3);
    assert_eq!(u32::from_le_bytes(host_saw[1..5].try_into().unwrap()), 2);
    assert_eq!(&host_saw[9..], b"ping");

    // S4: host -> client payload, rewritten to carry localId 1.
    let mut reply = vec![3u8];
    reply.extend_from_slice(&2u32.to_le_bytes());
    reply.extend_from_slice(&7u32.to_le_bytes());
    reply.push(TransferMode::Reliable as u8);
    reply.extend_from_slice(b"pong");
    core.on_data(1, Channel::Reliable, &reply);

    let client_saw = recorder.last_sent_to(2);
    assert_eq!(u32::from_le_bytes(client_saw[1..5].try_into().unwrap()), 1);
    assert_eq!(&client_saw[9..], b"pong");

    // S5: client drops; host learns about it and membership shrinks to 1.
    core.on_disconnected(2);
    assert_eq!(core.session_count(), 1);
    let host_saw = recorder.last_sent_to(1);
    assert_eq!(host_saw[0], 1); // ClientDisconnected

    // S6: host drops; the session is fully torn down.
    core.on_disconnected(1);
    assert_eq!(core.session_count(), 0);
    assert_eq!(core.connection_count(), 0);

    Ok(())
}

#[test]
fn unauthenticated_connection_cannot_send_payloads() {
    let recorder = Arc::new(Recorder::default());
    let core = RelayCore::new(30, RecordingTransport(recorder.clone()), NoopObserver);

    core.on_connected(9);
    let mut payload = vec![3u8];
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    payload.push(0);
    payload.push(b'x');
    core.on_data(9, Channel::Reliable, &payload);

    assert_eq!(core.connection_count(), 0);
    assert_eq!(recorder.disconnected.lock().unwrap().as_slice(), &[9]);
}

#[test]
fn session_full_rejects_further_joins() {
    let recorder = Arc::new(Recorder::default());
    let core = RelayCore::new(30, RecordingTransport(recorder.clone()), NoopObserver);

    let host_token = core
        .allocate_session(SessionInfo {
            name: "duo".to_string(),
            max_members: 2,
        })
        .value
        .unwrap();
    core.on_connected(1);
    let mut auth = vec![0u8];
    auth.extend_from_slice(&host_token);
    core.on_data(1, Channel::Reliable, &auth);

    let first_join = core.request_join(0).value.unwrap();
    core.on_connected(2);
    let mut join = vec![1u8];
    join.extend_from_slice(&first_join);
    core.on_data(2, Channel::Reliable, &join);

    // The session is now full (host + one client = 2 = maxMembers); a
    // second join token still decodes but is rejected at admission time.
    let second_join = core.request_join(0);
    assert!(!second_join.has_value());
}
