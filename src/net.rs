use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// The collector address could not be resolved
#[derive(Debug, thiserror::Error)]
#[error("cannot resolve collector address {addr}: {reason}")]
pub struct ResolveError {
    pub addr: String,
    pub reason: String,
}

/// A trait for the types able to open a connection to the collector
pub trait Connector: Clone + std::marker::Send + 'static {
    /// The connection owned by a single worker
    type Conn: std::marker::Send + 'static;

    /// Open one connection. Called by every worker at startup.
    fn connect(&self) -> io::Result<Self::Conn>;
}

/// Opens connected UDP sockets toward a collector
#[derive(Debug, Clone)]
pub struct UdpConnector {
    collector: SocketAddr,
}

impl UdpConnector {
    pub fn new(collector: SocketAddr) -> Self {
        UdpConnector { collector }
    }

    pub fn collector(&self) -> SocketAddr {
        self.collector
    }
}

impl Connector for UdpConnector {
    type Conn = UdpSocket;

    fn connect(&self) -> io::Result<UdpSocket> {
        let local: SocketAddr = if self.collector.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(self.collector)?;
        log::debug!("Socket {:?} connected to {}", socket.local_addr(), self.collector);
        Ok(socket)
    }
}

/// Resolve the collector address once, at startup.
///
/// The first address returned by the resolver is kept.
pub fn resolve_collector(host: &str, port: u16) -> Result<SocketAddr, ResolveError> {
    let error = |reason: String| ResolveError {
        addr: format!("{host}:{port}"),
        reason,
    };
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| error(e.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| error("no address found".to_string()))
}
