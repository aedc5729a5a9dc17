//! UDP datagram transport

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use floodmesh_core::{
    BindError, DatagramTransport, MAX_DATAGRAM_SIZE, PeerEndpoint, RecvError, SendError,
};

/// A UDP socket bound on all interfaces
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind `0.0.0.0:port`; port 0 picks an ephemeral port
    pub async fn bind(port: u16) -> Result<Self, BindError> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|source| BindError::Io { port, source })?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send_to(&self, data: &[u8], target: &PeerEndpoint) -> Result<(), SendError> {
        self.socket
            .send_to(data, (target.host.as_str(), target.port))
            .await
            .map(|_| ())
            .map_err(|source| SendError::Io {
                target: target.to_string(),
                source,
            })
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), RecvError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_datagram() {
        let a = UdpTransport::bind(0).await.unwrap();
        let b = UdpTransport::bind(0).await.unwrap();
        let b_port = b.local_addr().unwrap().port();

        a.send_to(b"ping", &PeerEndpoint::new("127.0.0.1", b_port)).await.unwrap();
        let (data, from) = b.recv_from().await.unwrap();

        assert_eq!(data, b"ping");
        assert_eq!(from.port(), a.local_addr().unwrap().port());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let first = UdpTransport::bind(0).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = UdpTransport::bind(port).await.unwrap_err();
        assert!(matches!(err, BindError::Io { port: p, .. } if p == port));
    }
}
