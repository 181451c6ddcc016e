//! Datagram transport abstraction
//!
//! A trait over unreliable datagram send/receive, with a UDP implementation
//! for production and a mock for tests. Receives are bounded by a timeout so
//! the receive loop can interleave shutdown checks instead of blocking
//! forever.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// A datagram pulled off the wire
#[derive(Clone, Debug)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub sender: SocketAddr,
}

/// Transport trait for datagram communication
#[allow(async_fn_in_trait)]
pub trait Transport: Send + Sync {
    /// Send one datagram to a specific address
    async fn send(&self, data: &[u8], dest: SocketAddr) -> Result<()>;

    /// Receive the next datagram, or `None` if the timeout elapses first
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Datagram>>;

    /// The local address we are bound to
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// UDP transport with broadcast enabled
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a broadcast-capable socket on the given port
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.set_broadcast(true)?;
        Ok(Self { socket })
    }
}

impl Transport for UdpTransport {
    async fn send(&self, data: &[u8], dest: SocketAddr) -> Result<()> {
        self.socket
            .send_to(data, dest)
            .await
            .map_err(|e| Error::SendFailed(format!("{dest}: {e}")))?;
        Ok(())
    }

    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Datagram>> {
        let mut buf = vec![0u8; 65535];
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, sender))) => {
                buf.truncate(len);
                Ok(Some(Datagram { data: buf, sender }))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

pub mod mock {
    //! Mock transport for testing and development

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A mock transport that records outgoing datagrams and replays queued
    /// incoming ones
    pub struct MockTransport {
        local: SocketAddr,
        /// Datagrams to deliver on recv_timeout()
        incoming: Mutex<VecDeque<Datagram>>,
        /// Datagrams that were sent
        outgoing: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::with_addr("127.0.0.1:50999".parse().unwrap())
        }

        pub fn with_addr(local: SocketAddr) -> Self {
            Self {
                local,
                incoming: Mutex::new(VecDeque::new()),
                outgoing: Mutex::new(Vec::new()),
            }
        }

        /// Queue a datagram to be received
        pub fn queue(&self, data: Vec<u8>, sender: SocketAddr) {
            self.incoming
                .lock()
                .unwrap()
                .push_back(Datagram { data, sender });
        }

        /// Get all sent datagrams
        pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
            self.outgoing.lock().unwrap().clone()
        }

        /// Take all sent datagrams, clearing the record
        pub fn drain_sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
            std::mem::take(&mut *self.outgoing.lock().unwrap())
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Transport for MockTransport {
        async fn send(&self, data: &[u8], dest: SocketAddr) -> Result<()> {
            self.outgoing.lock().unwrap().push((dest, data.to_vec()));
            Ok(())
        }

        async fn recv_timeout(&self, timeout: Duration) -> Result<Option<Datagram>> {
            let start = std::time::Instant::now();
            loop {
                if let Some(dgram) = self.incoming.lock().unwrap().pop_front() {
                    return Ok(Some(dgram));
                }
                if start.elapsed() >= timeout {
                    return Ok(None);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        fn local_addr(&self) -> Result<SocketAddr> {
            Ok(self.local)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_send_receive() {
            let transport = MockTransport::new();
            let peer: SocketAddr = "10.0.0.2:50999".parse().unwrap();

            transport.queue(b"hello".to_vec(), peer);
            transport.send(b"world", peer).await.unwrap();

            let sent = transport.sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].1, b"world");

            let received = transport
                .recv_timeout(Duration::from_millis(100))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.data, b"hello");
            assert_eq!(received.sender, peer);
        }

        #[tokio::test]
        async fn test_mock_recv_timeout_yields_none() {
            let transport = MockTransport::new();
            let received = transport
                .recv_timeout(Duration::from_millis(20))
                .await
                .unwrap();
            assert!(received.is_none());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_loopback_roundtrip() {
        let a = UdpTransport::bind(0).await.unwrap();
        let b = UdpTransport::bind(0).await.unwrap();

        let mut dest = b.local_addr().unwrap();
        dest.set_ip("127.0.0.1".parse().unwrap());

        a.send(b"ping", dest).await.unwrap();
        let received = b
            .recv_timeout(Duration::from_secs(2))
            .await
            .unwrap()
            .expect("datagram should arrive on loopback");
        assert_eq!(received.data, b"ping");
    }

    #[tokio::test]
    async fn test_udp_recv_timeout() {
        let sock = UdpTransport::bind(0).await.unwrap();
        let got = sock
            .recv_timeout(Duration::from_millis(30))
            .await
            .unwrap();
        assert!(got.is_none());
    }
}
