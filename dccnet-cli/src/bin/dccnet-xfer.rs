//! DCCNET Xfer - bidirectional file exchange
//!
//! Both ends send their input file and write what the peer sends to their
//! output file. One side listens (`-s PORT`), the other connects
//! (`-c HOST:PORT`).

use anyhow::Context;
use clap::Parser;
use dccnet::Transport;
use dccnet_cli::{display_stats, finish, init_tracing, load_protocol_config, receive_until_final};
use dccnet_io::{accept_one, connect_host};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "dccnet-xfer")]
#[command(about = "Exchange a file with a DCCNET peer", long_about = None)]
struct Args {
    /// Listen on this port and serve one peer
    #[arg(short = 's', long, value_name = "PORT", conflicts_with = "client")]
    server: Option<u16>,

    /// Connect to HOST:PORT
    #[arg(short = 'c', long, value_name = "HOST:PORT", required_unless_present = "server")]
    client: Option<String>,

    /// File to send
    input: PathBuf,

    /// Where to write what the peer sends
    output: PathBuf,

    /// Address to listen on in server mode
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

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
    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let mut output = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?,
    );

    let stream = match (args.server, &args.client) {
        (Some(port), _) => {
            let addr = SocketAddr::new(args.bind, port);
            let (stream, _peer) = accept_one(addr)?;
            stream
        }
        (None, Some(target)) => {
            tracing::info!("Connecting to {}", target);
            connect_host(target, Some(Duration::from_secs(args.connect_timeout)))?
        }
        (None, None) => anyhow::bail!("either --server or --client is required"),
    };

    let start = Instant::now();
    let transport = Transport::with_config(stream, protocol)?;
    tracing::info!("Sending {} bytes from {}", data.len(), args.input.display());
    transport.enqueue(data, true)?;

    let received = receive_until_final(&transport, |chunk| {
        output.write_all(chunk)?;
        Ok(())
    });
    output.flush()?;
    finish(&transport, &protocol);

    if args.stats {
        display_stats(&transport.stats(), start.elapsed());
    }
    received?;
    tracing::info!("Transfer complete, output written to {}", args.output.display());
    Ok(())
}
