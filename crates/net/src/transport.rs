//! Byte-stream substrate for the connection task
//!
//! Any connected, ordered, reliable stream works: TCP in production,
//! `tokio::io::duplex` in tests.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A connected stream the connection task can own
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Resolve a host and port to candidate endpoints
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let endpoints: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|source| Error::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .collect();

    if endpoints.is_empty() {
        return Err(Error::NoEndpoints {
            host: host.to_string(),
            port,
        });
    }

    debug!(host, port, count = endpoints.len(), "Resolved endpoints");
    Ok(endpoints)
}

/// Connect to the first endpoint that accepts
pub async fn connect_tcp(endpoints: Vec<SocketAddr>) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(&endpoints[..]).await?;
    stream.set_nodelay(true)?;
    if let Ok(addr) = stream.peer_addr() {
        info!(addr = %addr, "Connected to server");
    }
    Ok(stream)
}
