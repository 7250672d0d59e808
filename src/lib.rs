//! Binary-crate glue (C9): configuration, the HTTP control plane, and the
//! KCP transport adapter wired around `relay_service::RelayCore`. Mirrors
//! the teacher's `turn-server` sub-crate split between a library entry
//! point (`server_main`) and a thin `main.rs`.

pub mod api;
pub mod config;
pub mod server;

use std::sync::Arc;

use config::Config;
use relay_service::{LoggingObserver, RelayCore};
use server::KcpTransportSink;

/// Everything an HTTP handler needs: the resolved config and a handle to
/// the running relay core.
pub struct ServerHandle {
    pub config: Config,
    pub core: Arc<RelayCore<KcpTransportSink, LoggingObserver>>,
}

/// Build the core, bring up the KCP transport and HTTP control plane, and
/// run until `ctrl_c` (supplemental feature 3), draining every live
/// connection with `ServerShutdown` before returning.
pub async fn server_main(config: Arc<Config>) -> anyhow::Result<()> {
    let sink = KcpTransportSink::new();
    let core = Arc::new(RelayCore::new(
        config.session.pending_lifetime_seconds,
        sink.clone(),
        LoggingObserver::new(),
    ));

    let gc_ticker = core.spawn_gc_ticker();

    server::spawn(config.clone(), core.clone(), sink).await?;

    let handle = Arc::new(ServerHandle {
        config: (*config).clone(),
        core: core.clone(),
    });

    tokio::select! {
        result = api::serve(handle) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received shutdown signal, draining connections");
        }
    }

    core.shutdown();
    drop(gc_ticker);

    log::info!("relay server shut down cleanly");
    Ok(())
}
