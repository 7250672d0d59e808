//! C7 KcpTransport adapter: multiplexes one `tokio::net::UdpSocket` per
//! configured interface across many `kcp::Kcp` peer state machines,
//! surfacing `on_connected`/`on_data`/`on_disconnected`/`on_error` into
//! `RelayCore`. Grounded in the teacher's `fork_socket` UDP recv-loop
//! shape (`turn-server/src/server/udp.rs`), generalized from one
//! STUN/TURN processor call per datagram to the KCP ARQ state machine.

mod kcp;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use kcp::{KcpOutput, PeerEntry, PeerTable};
use relay_service::{Channel, ConnectionId, LoggingObserver, RelayCore, TransportSink};
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::unbounded_channel;

use crate::config::Config;

const UNRELIABLE_TAG: u8 = 1;
const RELIABLE_TAG: u8 = 0;

fn monotonic_millis() -> u32 {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u32
}

/// Bind the KCP UDP socket with the §6 `Kcp_RecvBufferSize`/
/// `Kcp_SendBufferSize` kernel buffer sizes applied, rather than letting
/// the OS default pick a size tiny relays run fine on but a busy one
/// drops datagrams under. `socket2` is needed because `tokio::net::UdpSocket`
/// exposes no buffer-size knob of its own; a `Socket` is bound and put in
/// non-blocking mode, then handed to tokio via `from_std`.
fn bind_udp_socket(config: &Config) -> anyhow::Result<UdpSocket> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.kcp.port).parse()?;
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_recv_buffer_size(config.kcp.recv_buffer_size)?;
    socket.set_send_buffer_size(config.kcp.send_buffer_size)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// The concrete `TransportSink` handed to `RelayCore`: enqueues sends
/// through each peer's `Kcp` instance (flushed immediately, since §5
/// requires sends to return without blocking on I/O) and drops peers on
/// `disconnect`.
#[derive(Clone)]
pub struct KcpTransportSink {
    peers: Arc<PeerTable>,
}

impl TransportSink for KcpTransportSink {
    fn send(&self, connection_id: ConnectionId, bytes: &[u8]) {
        let Some(peer) = self.peers.by_connection(connection_id) else {
            return;
        };
        let mut kcp = peer.kcp.lock();
        if kcp.send(bytes).is_err() {
            log::warn!("kcp send buffer full for connection {connection_id}");
            return;
        }
        let _ = kcp.flush();
    }

    fn disconnect(&self, connection_id: ConnectionId) {
        self.peers.remove_by_connection(connection_id);
    }
}

impl KcpTransportSink {
    /// Builds the (empty) peer table up front, independent of the socket
    /// bind and the `RelayCore` that will be constructed around this sink.
    /// `RelayCore::new` takes its transport by value, so the sink must
    /// exist before the core does; `spawn` below is handed both afterward.
    pub fn new() -> Self {
        Self {
            peers: Arc::new(PeerTable::new()),
        }
    }
}

impl Default for KcpTransportSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind the KCP UDP socket and spawn the recv/drain/update tasks against
/// an already-constructed `RelayCore` and the `sink` it was built with.
pub async fn spawn(
    config: Arc<Config>,
    core: Arc<RelayCore<KcpTransportSink, LoggingObserver>>,
    sink: KcpTransportSink,
) -> anyhow::Result<()> {
    let socket = Arc::new(bind_udp_socket(&config)?);
    let peers = sink.peers.clone();

    let (outbound_tx, mut outbound_rx) = unbounded_channel::<(SocketAddr, Vec<u8>)>();

    // Drains Kcp::flush() output onto the wire.
    tokio::spawn({
        let socket = socket.clone();
        async move {
            while let Some((addr, datagram)) = outbound_rx.recv().await {
                if let Err(e) = socket.send_to(&datagram, addr).await {
                    log::warn!("kcp socket send error: {e:?}");
                }
            }
        }
    });

    // Reads inbound datagrams, demultiplexes the channel tag, and feeds
    // reliable segments through each peer's Kcp state machine.
    tokio::spawn({
        let socket = socket.clone();
        let core = core.clone();
        let peers = peers.clone();
        let outbound_tx = outbound_tx.clone();
        let config = config.clone();
        async move {
            let mut buf = vec![0u8; 65536];
            loop {
                let (size, addr) = match socket.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("kcp socket recv error: {e:?}");
                        continue;
                    }
                };

                if size == 0 {
                    continue;
                }

                let tag = buf[0];
                let body = &buf[1..size];

                match tag {
                    UNRELIABLE_TAG => {
                        if let Some(peer) = peers.by_addr(&addr) {
                            core.on_data(peer.connection_id, Channel::Unreliable, body);
                        }
                        // An unreliable datagram from an address with no
                        // established peer cannot be attributed to any
                        // connection; it is simply discarded.
                    }
                    RELIABLE_TAG => {
                        let peer = peers.by_addr(&addr).unwrap_or_else(|| {
                            let connection_id = peers.next_connection_id();
                            let output = KcpOutput::new(addr, outbound_tx.clone());
                            let mut kcp = ::kcp::Kcp::new(connection_id, output);
                            kcp.set_nodelay(
                                config.kcp.no_delay,
                                config.kcp.interval as i32,
                                config.kcp.fast_resend,
                                true,
                            );
                            kcp.set_wndsize(config.kcp.send_window_size, config.kcp.receive_window_size);
                            let _ = kcp.set_mtu(1400);
                            // §6 `Kcp_MaxRetransmit`: the reference KCP
                            // implementation's `dead_link` threshold —
                            // how many retransmits of the same segment
                            // before `is_dead_link()` reports true.
                            kcp.dead_link = config.kcp.max_retransmit;

                            let entry = Arc::new(PeerEntry {
                                connection_id,
                                addr,
                                kcp: parking_lot::Mutex::new(kcp),
                                last_activity: parking_lot::Mutex::new(Instant::now()),
                            });
                            peers.insert(entry.clone());
                            core.on_connected(connection_id);
                            entry
                        });

                        let fed = {
                            let mut kcp = peer.kcp.lock();
                            kcp.input(body).is_ok()
                        };
                        if !fed {
                            continue;
                        }
                        *peer.last_activity.lock() = Instant::now();

                        loop {
                            let mut message = vec![0u8; 65536];
                            let n = {
                                let mut kcp = peer.kcp.lock();
                                match kcp.recv(&mut message) {
                                    Ok(n) => n,
                                    Err(_) => break,
                                }
                            };
                            core.on_data(peer.connection_id, Channel::Reliable, &message[..n]);
                        }
                    }
                    other => {
                        log::debug!("dropping datagram with unknown channel tag {other} from {addr}");
                    }
                }
            }
        }
    });

    // Drives Kcp::update()/flush() once per configured interval and reaps
    // peers that the library or the idle timeout declares dead.
    tokio::spawn({
        let peers = peers.clone();
        let core = core.clone();
        let interval = Duration::from_millis(config.kcp.interval.max(1) as u64);
        let idle_timeout = Duration::from_millis(config.kcp.timeout as u64);
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = monotonic_millis();

                for peer in peers.all() {
                    let (dead, idle) = {
                        let mut kcp = peer.kcp.lock();
                        let _ = kcp.update(now);
                        let dead = kcp.is_dead_link();
                        let idle = peer.last_activity.lock().elapsed() > idle_timeout;
                        (dead, idle)
                    };

                    if dead || idle {
                        peers.remove_by_connection(peer.connection_id);
                        core.on_error(peer.connection_id);
                    }
                }
            }
        }
    });

    log::info!("kcp transport listening on udp/{}", config.kcp.port);
    Ok(())
}
