//! DCCNET MD5 - line hashing client
//!
//! Sends a token line, then answers every newline-terminated line the server
//! sends with its MD5 digest in lowercase hex, until the server's FINAL frame.

use clap::Parser;
use dccnet::Transport;
use dccnet_cli::{
    display_stats, finish, init_tracing, load_protocol_config, md5_reply, receive_until_final,
    LineSplitter,
};
use dccnet_io::connect_host;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "dccnet-md5")]
#[command(about = "Answer DCCNET lines with their MD5 digests", long_about = None)]
struct Args {
    /// Server address (HOST:PORT)
    server: String,

    /// Authentication token sent as the first line
    token: String,

    /// TOML file with [protocol] overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Connect timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout: u64,

    /// Print transfer statistics on exit
    #[arg(long)]
    stats: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let protocol = load_protocol_config(args.config.as_deref())?;
    tracing::info!("Connecting to {}", args.server);
    let stream = connect_host(&args.server, Some(Duration::from_secs(args.connect_timeout)))?;

    let start = Instant::now();
    let transport = Transport::with_config(stream, protocol)?;
    transport.enqueue(format!("{}\n", args.token), false)?;

    let mut splitter = LineSplitter::new();
    let mut answered = 0u64;
    let result = receive_until_final(&transport, |chunk| {
        for line in splitter.push(chunk) {
            tracing::debug!(len = line.len(), "hashing line");
            transport.enqueue(md5_reply(&line), false)?;
            answered += 1;
        }
        Ok(())
    });
    if !splitter.pending().is_empty() {
        tracing::warn!(
            len = splitter.pending().len(),
            "ignoring unterminated trailing line"
        );
    }
    finish(&transport, &protocol);

    if args.stats {
        display_stats(&transport.stats(), start.elapsed());
    }
    result?;
    tracing::info!("Answered {} lines", answered);
    Ok(())
}
