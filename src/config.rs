use std::fs::read_to_string;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// HTTP control-plane binding (C6).
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Http {
    #[serde(default = "Http::address")]
    pub address: String,
    #[serde(default = "Http::port")]
    pub port: u16,
    ///
    /// Placeholder for a future TLS listener; no certificate handling is
    /// implemented, only the config surface exists.
    ///
    #[serde(default)]
    pub use_https: bool,
}

impl Http {
    fn address() -> String {
        "0.0.0.0".to_string()
    }

    fn port() -> u16 {
        8080
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .with_context(|| format!("invalid http bind address {}:{}", self.address, self.port))
    }
}

impl Default for Http {
    fn default() -> Self {
        Self {
            address: Self::address(),
            port: Self::port(),
            use_https: false,
        }
    }
}

/// KCP transport parameters (C7), per spec §6. Field names mirror the
/// spec's `Kcp_*` keys, kebab-cased for TOML.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Kcp {
    #[serde(default = "Kcp::port")]
    pub port: u16,
    ///
    /// Placeholder for a future IPv4/IPv6 dual-stack listener; the socket
    /// bound in `server::spawn` is IPv4-only regardless of this flag.
    ///
    #[serde(default = "Kcp::dual_mode")]
    pub dual_mode: bool,
    #[serde(default = "Kcp::no_delay")]
    pub no_delay: bool,
    #[serde(default = "Kcp::interval")]
    pub interval: u32,
    #[serde(default = "Kcp::timeout")]
    pub timeout: u32,
    #[serde(default = "Kcp::recv_buffer_size")]
    pub recv_buffer_size: usize,
    #[serde(default = "Kcp::send_buffer_size")]
    pub send_buffer_size: usize,
    #[serde(default = "Kcp::fast_resend")]
    pub fast_resend: i32,
    #[serde(default = "Kcp::receive_window_size")]
    pub receive_window_size: u16,
    #[serde(default = "Kcp::send_window_size")]
    pub send_window_size: u16,
    #[serde(default = "Kcp::max_retransmit")]
    pub max_retransmit: u32,
}

impl Kcp {
    fn port() -> u16 {
        7000
    }

    fn dual_mode() -> bool {
        true
    }

    fn no_delay() -> bool {
        true
    }

    fn interval() -> u32 {
        10
    }

    fn timeout() -> u32 {
        10_000
    }

    fn recv_buffer_size() -> usize {
        7 * 1024 * 1024
    }

    fn send_buffer_size() -> usize {
        7 * 1024 * 1024
    }

    fn fast_resend() -> i32 {
        2
    }

    fn receive_window_size() -> u16 {
        4096
    }

    fn send_window_size() -> u16 {
        4096
    }

    fn max_retransmit() -> u32 {
        // 2x the dead-link default (20) from the reference KCP implementation.
        40
    }
}

impl Default for Kcp {
    fn default() -> Self {
        Self {
            port: Self::port(),
            dual_mode: Self::dual_mode(),
            no_delay: Self::no_delay(),
            interval: Self::interval(),
            timeout: Self::timeout(),
            recv_buffer_size: Self::recv_buffer_size(),
            send_buffer_size: Self::send_buffer_size(),
            fast_resend: Self::fast_resend(),
            receive_window_size: Self::receive_window_size(),
            send_window_size: Self::send_window_size(),
            max_retransmit: Self::max_retransmit(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

/// Session/pending-token lifetime, exposed as config rather than
/// hardcoded (supplemental feature 4) so integration tests can shrink it.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Session {
    #[serde(default = "Session::pending_lifetime_seconds")]
    pub pending_lifetime_seconds: i32,
}

impl Session {
    fn pending_lifetime_seconds() -> i32 {
        30
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            pending_lifetime_seconds: Self::pending_lifetime_seconds(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub kcp: Kcp,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub session: Session,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: relay-server --config /etc/relay-server/config.toml
    ///
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    /// Load configuration from an optional TOML file plus the CLI flag
    /// pointing at it; every field has a spec-recommended default, so no
    /// config file at all is a valid (if minimal) configuration.
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();
        let config = match cli.config {
            Some(path) => {
                toml::from_str(&read_to_string(&path).with_context(|| format!("reading {path}"))?)
                    .with_context(|| format!("parsing {path}"))?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Supplemental feature 4: reject configurations that would fail at
    /// bind time anyway, with a message that says why up front.
    fn validate(&self) -> Result<()> {
        if self.http.address.trim().is_empty() {
            anyhow::bail!("http.address must not be empty");
        }
        if self.http.port == 0 {
            anyhow::bail!("http.port must be positive");
        }
        if self.kcp.port == 0 {
            anyhow::bail!("kcp.port must be positive");
        }
        if self.session.pending_lifetime_seconds <= 0 {
            anyhow::bail!("session.pending-lifetime-seconds must be positive");
        }
        Ok(())
    }
}
