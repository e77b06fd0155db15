//! # Nodimus MCP
//!
//! JSON-RPC 2.0 memory server over stdio, backed by `nodimus-core`.
//!
//! - `config`: TOML configuration with environment overrides
//! - `protocol`: wire types and the stdio transport
//! - `server`: method dispatch
//! - `worker`: graph regeneration and index retries off the request path

pub mod config;
pub mod methods;
pub mod protocol;
pub mod server;
pub mod worker;

pub use config::{Config, ConfigError};
pub use server::MemoryServer;
pub use worker::{BackgroundWorker, ShutdownMode, WorkerHandle};

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, writing to stderr
///
/// `RUST_LOG` wins over the configured level. stdout is reserved for
/// JSON-RPC responses.
pub fn init_logging(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
