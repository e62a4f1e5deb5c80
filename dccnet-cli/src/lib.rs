//! DCCNET CLI Library
//!
//! Shared functionality for the DCCNET command-line tools.

pub mod config;
pub mod lines;
pub mod session;
pub mod stats;

pub use config::{Config, ConfigError, ProtocolSection};
pub use lines::{md5_reply, LineSplitter};
pub use session::{finish, load_protocol_config, receive_until_final};
pub use stats::{display_stats, format_bytes, format_duration};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
