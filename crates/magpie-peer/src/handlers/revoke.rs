//! Token revocation
//!
//! A peer can broadcast that one of its own tokens must no longer be
//! honored. Only the token's subject may revoke it; a revocation for
//! someone else's token is dropped.

use std::sync::Arc;

use magpie_core::{new_message_id, unix_now, Message, Result, Scope, Token, Transport, TOKEN_TTL};
use tracing::{debug, info};

use crate::context::Context;
use crate::display;

pub struct RevokeHandler<T: Transport> {
    ctx: Arc<Context<T>>,
}

impl<T: Transport> RevokeHandler<T> {
    pub fn new(ctx: Arc<Context<T>>) -> Self {
        Self { ctx }
    }

    /// Broadcast revocation of one of our own tokens, and stop honoring
    /// it locally too
    pub async fn send_revoke(&self, token: &str) -> Result<()> {
        self.ctx.tokens.revoke(token);
        let mut msg = Message::of_type("REVOKE");
        msg.set("FROM", self.ctx.full_id())
            .set("TOKEN_TO_REVOKE", token)
            .set("MESSAGE_ID", new_message_id())
            .set("TIMESTAMP", unix_now().to_string())
            .set(
                "TOKEN",
                self.ctx
                    .tokens
                    .issue(&self.ctx.full_id(), TOKEN_TTL, Scope::Revoke),
            );
        self.ctx.broadcast(&msg).await
    }

    pub fn handle_revoke(&self, msg: &Message) {
        let (Some(from), Some(raw)) = (msg.get("FROM"), msg.get("TOKEN_TO_REVOKE")) else {
            debug!("revoke missing FROM or TOKEN_TO_REVOKE, dropping");
            return;
        };
        let token = match Token::parse(raw) {
            Ok(token) => token,
            Err(e) => {
                debug!("unparseable token in revocation: {e}");
                return;
            }
        };
        if token.subject != from {
            debug!(
                from,
                subject = token.subject,
                "revocation for someone else's token, dropping"
            );
            return;
        }
        info!(from, "token revoked by its subject");
        self.ctx.tokens.revoke(raw);
        display::revoked(raw);
    }
}
