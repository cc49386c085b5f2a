//! Service configuration: command-line flags with environment fallbacks.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Where tapped response bodies go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BodyLogTarget {
    /// Bodies are not tapped.
    Off,
    /// One tracing event per chunk, target `spout::body`, emitted off the
    /// request path.
    Tracing,
    /// One line per chunk on stdout, written by a background task.
    Stdout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "spout", version, about = "Customer service with response body logging")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "SPOUT_ADDR", default_value = "0.0.0.0:3000")]
    pub addr: SocketAddr,

    /// Cat-fact endpoint, `https://` or `http://`.
    #[arg(long, env = "SPOUT_FACT_URL", default_value = "https://catfact.ninja/fact")]
    pub fact_url: String,

    /// Give up on the fact endpoint after this many milliseconds.
    #[arg(long, env = "SPOUT_FACT_TIMEOUT_MS", default_value_t = 5_000)]
    pub fact_timeout_ms: u64,

    #[arg(long, env = "SPOUT_BODY_LOG", value_enum, default_value_t = BodyLogTarget::Tracing)]
    pub body_log: BodyLogTarget,

    /// Chunks queued for the body log writer before new ones are dropped.
    #[arg(long, env = "SPOUT_BODY_LOG_CAPACITY", default_value_t = 1_024)]
    pub body_log_capacity: usize,

    #[arg(long, env = "SPOUT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn fact_timeout(&self) -> Duration {
        Duration::from_millis(self.fact_timeout_ms)
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over the default
/// `info` filter.
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
