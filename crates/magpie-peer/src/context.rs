//! Shared peer context
//!
//! The single-instance services (transport, token authority, identity
//! ledger, prompt queue) are constructed once at startup and passed to the
//! dispatcher and every feature handler through this context. There are no
//! ambient global singletons.

use crate::prompt::PromptQueue;
use magpie_core::{IdentityLedger, Message, Result, TokenAuthority, Transport};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

pub struct Context<T> {
    pub transport: T,
    pub tokens: TokenAuthority,
    pub identity: IdentityLedger,
    pub prompts: PromptQueue,
    /// Bare local username
    pub user_id: String,
    /// Local IP used in `user@ip` identifiers
    pub local_ip: String,
    /// Port this peer listens on (and broadcasts to)
    pub port: u16,
}

impl<T: Transport> Context<T> {
    pub fn new(
        transport: T,
        prompts: PromptQueue,
        user_id: impl Into<String>,
        local_ip: impl Into<String>,
        port: u16,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            tokens: TokenAuthority::new(),
            identity: IdentityLedger::new(),
            prompts,
            user_id: user_id.into(),
            local_ip: local_ip.into(),
            port,
        })
    }

    /// Full `user@ip` identifier for this peer
    pub fn full_id(&self) -> String {
        format!("{}@{}", self.user_id, self.local_ip)
    }

    /// Encode and send a message to one peer
    pub async fn send_message(&self, msg: &Message, dest: SocketAddr) -> Result<()> {
        tracing::debug!(msg_type = msg.msg_type().unwrap_or("?"), %dest, "send");
        self.transport.send(msg.encode().as_bytes(), dest).await
    }

    /// Encode and send a message to the local broadcast address
    pub async fn broadcast(&self, msg: &Message) -> Result<()> {
        let dest = SocketAddr::from((Ipv4Addr::BROADCAST, self.port));
        self.send_message(msg, dest).await
    }
}

/// Best-effort local IP detection: route a dummy datagram and read the
/// chosen source address. Falls back to loopback.
pub fn detect_local_ip() -> String {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::transport::mock::MockTransport;

    #[tokio::test]
    async fn test_full_id_and_broadcast_dest() {
        let (prompts, _rx) = PromptQueue::new();
        let ctx = Context::new(MockTransport::new(), prompts, "alice", "10.0.0.5", 50999);
        assert_eq!(ctx.full_id(), "alice@10.0.0.5");

        let msg = Message::of_type("PING");
        ctx.broadcast(&msg).await.unwrap();
        let sent = ctx.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "255.255.255.255:50999".parse().unwrap());
    }
}
