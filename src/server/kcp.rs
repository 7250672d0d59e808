//! Per-peer KCP state (C7): a thin `std::io::Write` adapter that hands
//! outgoing segments to an async drain task, and the address/connection-id
//! indexed table the UDP recv loop and `TransportSink` both consult.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use ahash::HashMap;
use kcp::Kcp;
use parking_lot::{Mutex, RwLock};
use relay_service::ConnectionId;
use tokio::sync::mpsc::UnboundedSender;

/// Writes fed to it by `Kcp::flush` are one already-segmented outbound
/// datagram; we only need to prefix the channel tag (`0` = reliable) and
/// forward it to the socket-owning task.
pub struct KcpOutput {
    peer: SocketAddr,
    outbound: UnboundedSender<(SocketAddr, Vec<u8>)>,
}

impl KcpOutput {
    pub fn new(peer: SocketAddr, outbound: UnboundedSender<(SocketAddr, Vec<u8>)>) -> Self {
        Self { peer, outbound }
    }
}

impl Write for KcpOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut datagram = Vec::with_capacity(buf.len() + 1);
        datagram.push(0);
        datagram.extend_from_slice(buf);
        let len = buf.len();
        // An unbounded channel; a dropped receiver only happens during
        // shutdown, at which point dropping outbound segments is fine.
        let _ = self.outbound.send((self.peer, datagram));
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PeerEntry {
    pub connection_id: ConnectionId,
    pub addr: SocketAddr,
    pub kcp: Mutex<Kcp<KcpOutput>>,
    pub last_activity: Mutex<Instant>,
}

/// Bidirectional `SocketAddr <-> ConnectionId` index over live KCP peers,
/// plus the counter minting fresh `ConnectionId`s as new addresses show up
/// on the wire.
pub struct PeerTable {
    by_addr: RwLock<HashMap<SocketAddr, Arc<PeerEntry>>>,
    by_connection: RwLock<HashMap<ConnectionId, Arc<PeerEntry>>>,
    next_connection_id: AtomicU32,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            by_addr: RwLock::new(HashMap::default()),
            by_connection: RwLock::new(HashMap::default()),
            next_connection_id: AtomicU32::new(1),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, entry: Arc<PeerEntry>) {
        self.by_addr.write().insert(entry.addr, entry.clone());
        self.by_connection.write().insert(entry.connection_id, entry);
    }

    pub fn by_addr(&self, addr: &SocketAddr) -> Option<Arc<PeerEntry>> {
        self.by_addr.read().get(addr).cloned()
    }

    pub fn by_connection(&self, connection_id: ConnectionId) -> Option<Arc<PeerEntry>> {
        self.by_connection.read().get(&connection_id).cloned()
    }

    pub fn remove_by_connection(&self, connection_id: ConnectionId) {
        if let Some(entry) = self.by_connection.write().remove(&connection_id) {
            self.by_addr.write().remove(&entry.addr);
        }
    }

    pub fn all(&self) -> Vec<Arc<PeerEntry>> {
        self.by_connection.read().values().cloned().collect()
    }
}
