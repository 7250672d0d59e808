//! Transport-agnostic half of the relay server: session bookkeeping, the
//! per-connection auth state machine, and payload routing. No async
//! runtime and no sockets live here, so the whole state machine is
//! testable without a network — the binary crate supplies a
//! [`relay::TransportSink`] backed by real UDP/KCP.

pub mod expiring;
pub mod observer;
pub mod relay;
pub mod session;
pub mod uid;

pub use expiring::ExpiringStore;
pub use observer::{LoggingObserver, RelayObserver, RelayStats};
pub use relay::{Channel, RelayCore, TransportSink};
pub use session::{ConnectionId, LocalId, Session, SessionId};
pub use session::registry::SessionRegistry;
pub use uid::UidAllocator;
