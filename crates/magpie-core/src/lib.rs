//! Magpie Core - Protocol engine for serverless P2P social networking
//!
//! This crate provides the wire codec, capability tokens, identity binding,
//! chunk storage, and transport abstraction that every Magpie peer builds on.

pub mod chunk;
pub mod error;
pub mod identity;
pub mod message;
pub mod token;
pub mod transport;

pub use chunk::{chunk_payloads, ChunkStore};
pub use error::{Error, Result};
pub use identity::IdentityLedger;
pub use message::{new_message_id, Message};
pub use token::{unix_now, Scope, Token, TokenAuthority};
pub use transport::{Datagram, Transport, UdpTransport};

use std::time::Duration;

/// Default UDP port peers listen on
pub const DEFAULT_PORT: u16 = 50999;

/// Raw bytes per file chunk before base64 encoding
pub const CHUNK_SIZE: usize = 1024;

/// How long an unacknowledged chunk waits before retransmission
pub const RESEND_TIMEOUT: Duration = Duration::from_millis(3000);

/// How often the retry monitor sweeps pending chunks
pub const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Retransmissions allowed before a chunk is abandoned
pub const MAX_RETRIES: u32 = 5;

/// Pacing delay between consecutive outbound chunks
pub const CHUNK_PACING: Duration = Duration::from_millis(20);

/// Default capability token lifetime in seconds
pub const TOKEN_TTL: u64 = 3600;

/// Interval between presence/profile broadcasts
pub const PROFILE_INTERVAL: Duration = Duration::from_secs(50);
