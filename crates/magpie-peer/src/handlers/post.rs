//! Broadcast posts and likes

use std::net::SocketAddr;
use std::sync::Arc;

use magpie_core::{new_message_id, unix_now, Message, Result, Scope, Transport, TOKEN_TTL};
use tracing::debug;

use crate::context::Context;
use crate::display;

pub struct PostHandler<T: Transport> {
    ctx: Arc<Context<T>>,
}

impl<T: Transport> PostHandler<T> {
    pub fn new(ctx: Arc<Context<T>>) -> Self {
        Self { ctx }
    }

    /// Broadcast a post to every peer on the local network
    pub async fn send_post(&self, content: &str) -> Result<String> {
        let message_id = new_message_id();
        let mut msg = Message::of_type("POST");
        msg.set("USER_ID", self.ctx.full_id())
            .set("CONTENT", content)
            .set("TTL", TOKEN_TTL.to_string())
            .set("MESSAGE_ID", message_id.clone())
            .set("TIMESTAMP", unix_now().to_string())
            .set(
                "TOKEN",
                self.ctx
                    .tokens
                    .issue(&self.ctx.full_id(), TOKEN_TTL, Scope::Broadcast),
            );
        self.ctx.broadcast(&msg).await?;
        Ok(message_id)
    }

    /// Tell a peer we liked one of their posts
    pub async fn send_like(
        &self,
        to_user: &str,
        dest: SocketAddr,
        liked_message_id: &str,
    ) -> Result<()> {
        let mut msg = Message::of_type("LIKE");
        msg.set("FROM", self.ctx.full_id())
            .set("TO", to_user)
            .set("LIKED_MESSAGE_ID", liked_message_id)
            .set("MESSAGE_ID", new_message_id())
            .set("TIMESTAMP", unix_now().to_string())
            .set(
                "TOKEN",
                self.ctx
                    .tokens
                    .issue(&self.ctx.full_id(), TOKEN_TTL, Scope::Broadcast),
            );
        self.ctx.send_message(&msg, dest).await
    }

    pub fn handle_post(&self, msg: &Message) {
        let (Some(user), Some(content)) = (msg.get("USER_ID"), msg.get("CONTENT")) else {
            debug!("post missing USER_ID or CONTENT, dropping");
            return;
        };
        display::post(user, content);
    }

    pub fn handle_like(&self, msg: &Message) {
        let (Some(from), Some(liked)) = (msg.get("FROM"), msg.get("LIKED_MESSAGE_ID")) else {
            debug!("like missing FROM or LIKED_MESSAGE_ID, dropping");
            return;
        };
        display::like(from, liked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptQueue;
    use magpie_core::transport::mock::MockTransport;

    fn handler() -> PostHandler<MockTransport> {
        let (prompts, _rx) = PromptQueue::new();
        let ctx = Context::new(MockTransport::new(), prompts, "alice", "10.0.0.1", 50999);
        PostHandler::new(ctx)
    }

    #[tokio::test]
    async fn test_send_post_broadcasts_with_token() {
        let h = handler();
        let id = h.send_post("hello world").await.unwrap();

        let sent = h.ctx.transport.sent();
        assert_eq!(sent.len(), 1);
        let msg = Message::decode(&String::from_utf8_lossy(&sent[0].1));
        assert_eq!(msg.msg_type(), Some("POST"));
        assert_eq!(msg.get("USER_ID"), Some("alice@10.0.0.1"));
        assert_eq!(msg.get("CONTENT"), Some("hello world"));
        assert_eq!(msg.get("MESSAGE_ID"), Some(id.as_str()));
        let token = msg.get("TOKEN").unwrap();
        assert!(token.starts_with("alice@10.0.0.1|"));
        assert!(token.ends_with("|broadcast"));
    }

    #[tokio::test]
    async fn test_send_like_carries_liked_id() {
        let h = handler();
        let dest = "10.0.0.2:50999".parse().unwrap();
        h.send_like("bob@10.0.0.2", dest, "m123").await.unwrap();

        let sent = h.ctx.transport.sent();
        let msg = Message::decode(&String::from_utf8_lossy(&sent[0].1));
        assert_eq!(msg.msg_type(), Some("LIKE"));
        assert_eq!(msg.get("LIKED_MESSAGE_ID"), Some("m123"));
        assert_eq!(msg.get("TO"), Some("bob@10.0.0.2"));
    }
}
