//! Direct messages between two peers

use std::net::SocketAddr;
use std::sync::Arc;

use magpie_core::{new_message_id, unix_now, Message, Result, Scope, Transport, TOKEN_TTL};
use tracing::debug;

use crate::context::Context;
use crate::display;

pub struct DmHandler<T: Transport> {
    ctx: Arc<Context<T>>,
}

impl<T: Transport> DmHandler<T> {
    pub fn new(ctx: Arc<Context<T>>) -> Self {
        Self { ctx }
    }

    /// Send a direct message to one peer
    pub async fn send_dm(&self, to_user: &str, dest: SocketAddr, content: &str) -> Result<()> {
        let mut msg = Message::of_type("DM");
        msg.set("FROM", self.ctx.user_id.clone())
            .set("TO", to_user)
            .set("CONTENT", content)
            .set("MESSAGE_ID", new_message_id())
            .set("TIMESTAMP", unix_now().to_string())
            .set(
                "TOKEN",
                self.ctx
                    .tokens
                    .issue(&self.ctx.full_id(), TOKEN_TTL, Scope::Chat),
            );
        self.ctx.send_message(&msg, dest).await
    }

    /// Show an inbound DM, but only when it is addressed to us
    pub fn handle_dm(&self, msg: &Message) {
        let (Some(from), Some(to), Some(content)) =
            (msg.get("FROM"), msg.get("TO"), msg.get("CONTENT"))
        else {
            debug!("dm missing FROM, TO or CONTENT, dropping");
            return;
        };
        if to != self.ctx.user_id {
            debug!(to, "dm addressed to someone else, dropping");
            return;
        }
        display::dm(from, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptQueue;
    use magpie_core::transport::mock::MockTransport;

    fn handler() -> DmHandler<MockTransport> {
        let (prompts, _rx) = PromptQueue::new();
        let ctx = Context::new(MockTransport::new(), prompts, "alice", "10.0.0.1", 50999);
        DmHandler::new(ctx)
    }

    #[tokio::test]
    async fn test_send_dm_uses_chat_scope() {
        let h = handler();
        let dest = "10.0.0.2:50999".parse().unwrap();
        h.send_dm("bob", dest, "hi bob").await.unwrap();

        let sent = h.ctx.transport.sent();
        assert_eq!(sent[0].0, dest);
        let msg = Message::decode(&String::from_utf8_lossy(&sent[0].1));
        assert_eq!(msg.msg_type(), Some("DM"));
        assert_eq!(msg.get("FROM"), Some("alice"));
        assert_eq!(msg.get("CONTENT"), Some("hi bob"));
        assert!(msg.get("TOKEN").unwrap().ends_with("|chat"));
    }
}
