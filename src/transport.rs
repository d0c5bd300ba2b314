//! Datagram transport used by the lease state machine.
//!
//! [`Transport`] is the seam between protocol logic and the network. The
//! production implementation, [`UdpTransport`], owns one broadcast-enabled
//! UDP socket per client instance.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{Error, Result};

const RECV_BUFFER_SIZE: usize = 1024;

/// A received datagram and the address it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub source: SocketAddr,
}

/// A connectionless endpoint exclusively owned by one client instance.
pub trait Transport: Send + Sync {
    /// Sends one datagram. Failures are reported, never retried here.
    fn send_to(
        &self,
        destination: SocketAddr,
        payload: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Waits up to `timeout` for one datagram.
    ///
    /// Returns [`Error::Timeout`] when nothing arrives in time and
    /// [`Error::Transport`] on a hard failure.
    fn recv(&self, timeout: Duration) -> impl Future<Output = Result<Datagram>> + Send;

    /// Releases the endpoint. Calling it again has no effect.
    fn close(&mut self);
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    /// Opens a broadcast-enabled socket bound to `port` on all interfaces.
    ///
    /// Port 0 picks an ephemeral port, which lets many instances run side by
    /// side in one process.
    pub fn bind(port: u16) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket.bind(&bind_addr.into()).map_err(|error| {
            Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error))
        })?;

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket).map_err(|error| {
            Error::Socket(format!("Failed to convert to tokio socket: {}", error))
        })?;

        Ok(Self {
            socket: Some(tokio_socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket()?;
        socket
            .local_addr()
            .map_err(|error| Error::Transport(format!("Failed to read local address: {}", error)))
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| Error::Transport("socket is closed".to_string()))
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, destination: SocketAddr, payload: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        socket.send_to(payload, destination).await.map_err(|error| {
            Error::Transport(format!("Failed to send to {}: {}", destination, error))
        })?;
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Datagram> {
        let socket = self.socket()?;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        match tokio::time::timeout(timeout, socket.recv_from(&mut buffer)).await {
            Ok(Ok((size, source))) => Ok(Datagram {
                payload: buffer[..size].to_vec(),
                source,
            }),
            Ok(Err(error)) => Err(Error::Transport(format!("Failed to receive: {}", error))),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Transport closed");
        }
    }
}
