//! Inbound message dispatch
//!
//! Every datagram passes three gates before reaching a handler: codec
//! decode, identity verification against the trust-on-first-use ledger,
//! and token validation for message types that require a scope. Failures
//! are logged and dropped; no rejection is ever sent back to the peer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use magpie_core::{Message, Scope, Transport};
use tracing::{debug, warn};

use crate::context::Context;
use crate::handlers::{
    DmHandler, FollowHandler, GameHandler, GroupHandler, PostHandler, ProfileHandler,
    RevokeHandler,
};
use crate::transfer::FileTransferEngine;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Dispatcher<T: Transport> {
    pub ctx: Arc<Context<T>>,
    pub engine: FileTransferEngine<T>,
    pub posts: Arc<PostHandler<T>>,
    pub dms: Arc<DmHandler<T>>,
    pub follows: Arc<FollowHandler<T>>,
    pub profiles: Arc<ProfileHandler<T>>,
    pub groups: Arc<GroupHandler<T>>,
    pub games: Arc<GameHandler<T>>,
    pub revokes: Arc<RevokeHandler<T>>,
}

impl<T: Transport> Dispatcher<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<Context<T>>,
        engine: FileTransferEngine<T>,
        posts: Arc<PostHandler<T>>,
        dms: Arc<DmHandler<T>>,
        follows: Arc<FollowHandler<T>>,
        profiles: Arc<ProfileHandler<T>>,
        groups: Arc<GroupHandler<T>>,
        games: Arc<GameHandler<T>>,
        revokes: Arc<RevokeHandler<T>>,
    ) -> Self {
        Self {
            ctx,
            engine,
            posts,
            dms,
            follows,
            profiles,
            groups,
            games,
            revokes,
        }
    }

    /// Decode, gate, and route one datagram
    pub async fn handle(&self, raw: &[u8], sender: SocketAddr) {
        let text = String::from_utf8_lossy(raw);
        let msg = Message::decode(&text);
        let Some(msg_type) = msg.msg_type().map(str::to_string) else {
            debug!(%sender, "datagram without TYPE, dropping");
            return;
        };
        let msg_type = msg_type.as_str();

        // Acknowledgements only echo a message id back; they carry no
        // identity of their own and are exempt from the ledger check. For
        // everything else the ledger fails closed, so a message with
        // neither FROM nor USER_ID is dropped here.
        if msg_type != "ACK" {
            let subject = msg.get("FROM").or_else(|| msg.get("USER_ID")).unwrap_or("");
            if !self.ctx.identity.verify(subject, &sender.ip().to_string()) {
                debug!(%sender, subject, msg_type, "identity check failed, dropping");
                return;
            }
        }

        if let Some(scope) = Scope::required_for(msg_type) {
            if !self.ctx.tokens.validate(&msg, scope) {
                debug!(%sender, msg_type, %scope, "token rejected, dropping");
                return;
            }
        }

        match msg_type {
            "POST" => self.posts.handle_post(&msg),
            "LIKE" => self.posts.handle_like(&msg),
            "DM" => self.dms.handle_dm(&msg),
            "FILE_OFFER" => self.engine.handle_offer(&msg),
            "FILE_CHUNK" => self.engine.handle_chunk(&msg, sender).await,
            "FILE_RECEIVED" => self.engine.handle_received(&msg),
            "ACK" => self.engine.handle_ack(&msg),
            "PROFILE" => self.profiles.handle_profile(&msg, sender),
            "PING" => debug!(%sender, "ping"),
            "FOLLOW" => self.follows.handle_follow(&msg),
            "UNFOLLOW" => self.follows.handle_unfollow(&msg),
            "GROUP_CREATE" => self.groups.handle_create(&msg),
            "GROUP_UPDATE" => self.groups.handle_update(&msg),
            "GROUP_MESSAGE" => self.groups.handle_message(&msg),
            "TICTACTOE_INVITE" => self.games.handle_invite(&msg, sender),
            "TICTACTOE_MOVE" => self.games.handle_move(&msg),
            "TICTACTOE_RESULT" => self.games.handle_result(&msg),
            "REVOKE" => self.revokes.handle_revoke(&msg),
            other => debug!(%sender, msg_type = other, "unknown message type, dropping"),
        }
    }

    /// Pull datagrams until the process exits. Transport errors are not
    /// fatal; the loop logs them and keeps going.
    pub async fn run(&self) {
        loop {
            match self.ctx.transport.recv_timeout(RECV_TIMEOUT).await {
                Ok(Some(datagram)) => self.handle(&datagram.data, datagram.sender).await,
                Ok(None) => {}
                Err(e) => {
                    warn!("receive failed: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
