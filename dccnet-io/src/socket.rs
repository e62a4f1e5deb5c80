//! TCP socket setup for DCCNET
//!
//! DCCNET frames travel over a single TCP connection. These helpers build the
//! listening and connecting sockets through `socket2` so the options are set
//! before bind/connect.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

/// Socket configuration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid socket address: {0}")]
    InvalidAddress(String),

    #[error("Could not connect to any address for {0}")]
    Unreachable(String),
}

fn domain_for(addr: &SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

fn configure(stream: &TcpStream) -> Result<(), SocketError> {
    // Frames are small and latency bound; do not wait to coalesce.
    stream.set_nodelay(true)?;
    Ok(())
}

/// Bind a listening socket on `addr`
pub fn listen(addr: SocketAddr) -> Result<TcpListener, SocketError> {
    let socket = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        // Accept IPv4-mapped peers as well.
        let _ = socket.set_only_v6(false);
    }
    socket.bind(&addr.into())?;
    socket.listen(1)?;
    Ok(socket.into())
}

/// Listen on `addr` and accept exactly one peer
pub fn accept_one(addr: SocketAddr) -> Result<(TcpStream, SocketAddr), SocketError> {
    let listener = listen(addr)?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    let (stream, peer) = listener.accept()?;
    configure(&stream)?;
    tracing::info!("Accepted connection from {}", peer);
    Ok((stream, peer))
}

/// Connect to `addr`, optionally bounding the connect time
pub fn connect(addr: SocketAddr, timeout: Option<Duration>) -> Result<TcpStream, SocketError> {
    let socket = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))?;
    match timeout {
        Some(timeout) => socket.connect_timeout(&addr.into(), timeout)?,
        None => socket.connect(&addr.into())?,
    }
    let stream: TcpStream = socket.into();
    configure(&stream)?;
    tracing::info!("Connected to {}", addr);
    Ok(stream)
}

/// Resolve `host:port` and connect to the first address that answers
pub fn connect_host(target: &str, timeout: Option<Duration>) -> Result<TcpStream, SocketError> {
    let addrs: Vec<SocketAddr> = target
        .to_socket_addrs()
        .map_err(|_| SocketError::InvalidAddress(target.to_string()))?
        .collect();

    if addrs.is_empty() {
        return Err(SocketError::InvalidAddress(target.to_string()));
    }

    for addr in addrs {
        match connect(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => tracing::debug!("Connect to {} failed: {}", addr, e),
        }
    }
    Err(SocketError::Unreachable(target.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::thread;

    #[test]
    fn test_listen_and_connect() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let mut client = connect(addr, Some(Duration::from_secs(2))).unwrap();
        assert!(client.nodelay().unwrap());
        client.write_all(b"DCCNT").unwrap();

        assert_eq!(&server.join().unwrap(), b"DCCNT");
    }

    #[test]
    fn test_connect_host_rejects_garbage() {
        assert!(matches!(
            connect_host("not an address", None),
            Err(SocketError::InvalidAddress(_))
        ));
    }
}
