//! Follow relationships

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use magpie_core::{new_message_id, unix_now, Message, Result, Scope, Transport, TOKEN_TTL};
use tracing::debug;

use crate::context::Context;
use crate::display;

/// A peer we follow, remembered so posts can be attributed and unfollows
/// sent to the right address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowedPeer {
    pub user_id: String,
    pub addr: SocketAddr,
}

pub struct FollowHandler<T: Transport> {
    ctx: Arc<Context<T>>,
    following: Mutex<Vec<FollowedPeer>>,
}

impl<T: Transport> FollowHandler<T> {
    pub fn new(ctx: Arc<Context<T>>) -> Self {
        Self {
            ctx,
            following: Mutex::new(Vec::new()),
        }
    }

    pub async fn send_follow(&self, to_user: &str, dest: SocketAddr) -> Result<()> {
        self.send(to_user, dest, "FOLLOW").await?;
        let mut following = self.following.lock().unwrap();
        let peer = FollowedPeer {
            user_id: to_user.to_string(),
            addr: dest,
        };
        if !following.contains(&peer) {
            following.push(peer);
        }
        Ok(())
    }

    pub async fn send_unfollow(&self, to_user: &str, dest: SocketAddr) -> Result<()> {
        self.send(to_user, dest, "UNFOLLOW").await?;
        self.following
            .lock()
            .unwrap()
            .retain(|p| p.user_id != to_user);
        Ok(())
    }

    async fn send(&self, to_user: &str, dest: SocketAddr, msg_type: &str) -> Result<()> {
        let mut msg = Message::of_type(msg_type);
        msg.set("MESSAGE_ID", new_message_id())
            .set("FROM", self.ctx.full_id())
            .set("TO", to_user)
            .set("TIMESTAMP", unix_now().to_string())
            .set(
                "TOKEN",
                self.ctx
                    .tokens
                    .issue(&self.ctx.full_id(), TOKEN_TTL, Scope::Follow),
            );
        self.ctx.send_message(&msg, dest).await
    }

    /// Snapshot of the peers we currently follow
    pub fn following(&self) -> Vec<FollowedPeer> {
        self.following
            .lock()
            .unwrap()
            .clone()
    }

    pub fn handle_follow(&self, msg: &Message) {
        let Some(from) = msg.get("FROM") else {
            debug!("follow missing FROM, dropping");
            return;
        };
        display::follow(from);
    }

    pub fn handle_unfollow(&self, msg: &Message) {
        let Some(from) = msg.get("FROM") else {
            debug!("unfollow missing FROM, dropping");
            return;
        };
        display::unfollow(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptQueue;
    use magpie_core::transport::mock::MockTransport;

    fn handler() -> FollowHandler<MockTransport> {
        let (prompts, _rx) = PromptQueue::new();
        let ctx = Context::new(MockTransport::new(), prompts, "alice", "10.0.0.1", 50999);
        FollowHandler::new(ctx)
    }

    #[tokio::test]
    async fn test_follow_then_unfollow_updates_list() {
        let h = handler();
        let dest: SocketAddr = "10.0.0.2:50999".parse().unwrap();

        h.send_follow("bob@10.0.0.2", dest).await.unwrap();
        h.send_follow("bob@10.0.0.2", dest).await.unwrap();
        assert_eq!(h.following().len(), 1);

        h.send_unfollow("bob@10.0.0.2", dest).await.unwrap();
        assert!(h.following().is_empty());

        let sent = h.ctx.transport.sent();
        assert_eq!(sent.len(), 3);
        let last = Message::decode(&String::from_utf8_lossy(&sent[2].1));
        assert_eq!(last.msg_type(), Some("UNFOLLOW"));
        assert!(last.get("TOKEN").unwrap().ends_with("|follow"));
    }
}
