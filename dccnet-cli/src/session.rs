//! Helpers shared by the command-line tools

use anyhow::{bail, Context};
use dccnet::io::ByteStream;
use dccnet::{ProtocolConfig, Transport};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

/// How long a blocking wait lasts before the loop re-checks its exit conditions
const POLL: Duration = Duration::from_millis(200);

/// Protocol parameters from an optional TOML file
pub fn load_protocol_config(path: Option<&Path>) -> anyhow::Result<ProtocolConfig> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };
    Ok(config.protocol_config()?)
}

/// Hand every delivered chunk to `on_data` until the peer's FINAL frame.
///
/// Fails if the connection closes first.
pub fn receive_until_final<S, F>(transport: &Transport<S>, mut on_data: F) -> anyhow::Result<()>
where
    S: ByteStream,
    F: FnMut(&[u8]) -> anyhow::Result<()>,
{
    loop {
        transport.wait_readable(POLL);

        let data = transport.read(None);
        if !data.is_empty() {
            on_data(&data)?;
        }
        if transport.is_final_received() {
            return Ok(());
        }
        if transport.is_closed() {
            let rest = transport.read(None);
            if !rest.is_empty() {
                on_data(&rest)?;
            }
            bail!(
                "connection closed before the peer finished ({:?})",
                transport.close_reason()
            );
        }
    }
}

/// Let queued frames drain, then close.
///
/// Waits at most as long as the last frame could take to exhaust its retries.
pub fn finish<S: ByteStream>(transport: &Transport<S>, config: &ProtocolConfig) {
    let linger = config
        .retransmit_interval
        .saturating_mul(config.max_retries.saturating_add(2));
    if !transport.wait_idle(linger) {
        tracing::warn!("closing with unacknowledged data");
    }
    transport.close();
}
