//! Profile announcements and the known-peers map
//!
//! Peers announce themselves by broadcasting a PROFILE periodically.
//! Inbound profiles populate an address book keyed by full identifier so
//! the interactive loop can resolve a username to a socket address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use magpie_core::{unix_now, Message, Result, Transport};
use tracing::debug;

use crate::context::Context;
use crate::display;

#[derive(Clone, Debug)]
pub struct PeerProfile {
    pub display_name: String,
    pub status: String,
    pub addr: SocketAddr,
}

pub struct ProfileHandler<T: Transport> {
    ctx: Arc<Context<T>>,
    display_name: String,
    status: String,
    known: Mutex<HashMap<String, PeerProfile>>,
}

impl<T: Transport> ProfileHandler<T> {
    pub fn new(ctx: Arc<Context<T>>, display_name: String, status: String) -> Self {
        Self {
            ctx,
            display_name,
            status,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// Broadcast our profile. Carries no token; profiles are unscoped.
    pub async fn announce(&self) -> Result<()> {
        let mut msg = Message::of_type("PROFILE");
        msg.set("USER_ID", self.ctx.full_id())
            .set("DISPLAY_NAME", self.display_name.clone())
            .set("STATUS", self.status.clone())
            .set("TIMESTAMP", unix_now().to_string());
        self.ctx.broadcast(&msg).await
    }

    pub fn handle_profile(&self, msg: &Message, sender: SocketAddr) {
        let Some(user) = msg.get("USER_ID") else {
            debug!("profile missing USER_ID, dropping");
            return;
        };
        if user == self.ctx.full_id() {
            return;
        }
        let display_name = msg.get("DISPLAY_NAME").unwrap_or(user).to_string();
        let status = msg.get("STATUS").unwrap_or("").to_string();
        let first_seen = self
            .known
            .lock()
            .unwrap()
            .insert(
                user.to_string(),
                PeerProfile {
                    display_name: display_name.clone(),
                    status: status.clone(),
                    addr: sender,
                },
            )
            .is_none();
        if first_seen {
            display::profile(user, &display_name, &status);
        }
    }

    /// Resolve a peer by full id or bare username
    pub fn lookup(&self, who: &str) -> Option<(String, SocketAddr)> {
        let known = self.known.lock().unwrap();
        known
            .iter()
            .find(|(id, _)| *id == who || id.split('@').next() == Some(who))
            .map(|(id, p)| (id.clone(), p.addr))
    }

    pub fn known_peers(&self) -> Vec<(String, PeerProfile)> {
        self.known
            .lock()
            .unwrap()
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect()
    }
}
