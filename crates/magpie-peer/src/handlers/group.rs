//! Named groups with creator-managed membership

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use magpie_core::{new_message_id, unix_now, Message, Result, Scope, Transport, TOKEN_TTL};
use tracing::debug;

use crate::context::Context;
use crate::display;

#[derive(Clone, Debug)]
pub struct Group {
    pub name: String,
    /// Full id of the peer that created the group; only they may update it
    pub creator: String,
    /// Member full ids (`user@ip`)
    pub members: HashSet<String>,
}

/// Groups known to this peer, keyed by group id
#[derive(Default)]
pub struct GroupStore {
    groups: Mutex<HashMap<String, Group>>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, group_id: &str, group: Group) {
        self.groups
            .lock()
            .unwrap()
            .insert(group_id.to_string(), group);
    }

    pub fn get(&self, group_id: &str) -> Option<Group> {
        self.groups
            .lock()
            .unwrap()
            .get(group_id)
            .cloned()
    }

    /// Apply a membership update if `from` created the group
    pub fn update(&self, group_id: &str, from: &str, add: &[String], remove: &[String]) -> bool {
        let mut groups = self.groups.lock().unwrap();
        let Some(group) = groups.get_mut(group_id) else {
            return false;
        };
        if group.creator != from {
            debug!(group_id, from, "group update from non-creator, ignoring");
            return false;
        }
        for member in add {
            group.members.insert(member.clone());
        }
        for member in remove {
            group.members.remove(member);
        }
        true
    }

    pub fn is_member(&self, group_id: &str, full_id: &str) -> bool {
        self.groups
            .lock()
            .unwrap()
            .get(group_id)
            .is_some_and(|g| g.members.contains(full_id))
    }
}

pub struct GroupHandler<T: Transport> {
    ctx: Arc<Context<T>>,
    store: GroupStore,
}

impl<T: Transport> GroupHandler<T> {
    pub fn new(ctx: Arc<Context<T>>) -> Self {
        Self {
            ctx,
            store: GroupStore::new(),
        }
    }

    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    /// Address for a `user@ip` member id, using our listening port
    fn member_addr(&self, full_id: &str) -> Option<SocketAddr> {
        let ip = full_id.split('@').nth(1)?;
        format!("{}:{}", ip, self.ctx.port).parse().ok()
    }

    fn group_token(&self) -> String {
        self.ctx
            .tokens
            .issue(&self.ctx.full_id(), TOKEN_TTL, Scope::Group)
    }

    /// Create a group and notify every member. We are always a member.
    pub async fn create_group(&self, name: &str, mut members: Vec<String>) -> Result<String> {
        let group_id = new_message_id();
        let me = self.ctx.full_id();
        if !members.contains(&me) {
            members.push(me.clone());
        }
        self.store.insert(
            &group_id,
            Group {
                name: name.to_string(),
                creator: me.clone(),
                members: members.iter().cloned().collect(),
            },
        );

        let mut msg = Message::of_type("GROUP_CREATE");
        msg.set("FROM", me)
            .set("GROUP_ID", group_id.clone())
            .set("GROUP_NAME", name)
            .set("MEMBERS", members.join(","))
            .set("MESSAGE_ID", new_message_id())
            .set("TIMESTAMP", unix_now().to_string())
            .set("TOKEN", self.group_token());
        self.send_to_members(&msg, &members).await;
        Ok(group_id)
    }

    /// Add and remove members; only meaningful for groups we created
    pub async fn update_group(
        &self,
        group_id: &str,
        add: Vec<String>,
        remove: Vec<String>,
    ) -> Result<()> {
        let me = self.ctx.full_id();
        if !self.store.update(group_id, &me, &add, &remove) {
            debug!(group_id, "cannot update group we did not create");
            return Ok(());
        }
        let Some(group) = self.store.get(group_id) else {
            return Ok(());
        };
        let mut msg = Message::of_type("GROUP_UPDATE");
        msg.set("FROM", me)
            .set("GROUP_ID", group_id)
            .set("ADD", add.join(","))
            .set("REMOVE", remove.join(","))
            .set("MESSAGE_ID", new_message_id())
            .set("TIMESTAMP", unix_now().to_string())
            .set("TOKEN", self.group_token());
        // Removed members also get the update so they learn they are out
        let recipients: Vec<String> = group.members.iter().cloned().chain(remove).collect();
        self.send_to_members(&msg, &recipients).await;
        Ok(())
    }

    /// Send a message to every member of a group we belong to
    pub async fn send_group_message(&self, group_id: &str, content: &str) -> Result<()> {
        let me = self.ctx.full_id();
        let Some(group) = self.store.get(group_id) else {
            debug!(group_id, "unknown group, not sending");
            return Ok(());
        };
        if !group.members.contains(&me) {
            debug!(group_id, "not a member, not sending");
            return Ok(());
        }
        let mut msg = Message::of_type("GROUP_MESSAGE");
        msg.set("FROM", me)
            .set("GROUP_ID", group_id)
            .set("CONTENT", content)
            .set("MESSAGE_ID", new_message_id())
            .set("TIMESTAMP", unix_now().to_string())
            .set("TOKEN", self.group_token());
        let members: Vec<String> = group.members.iter().cloned().collect();
        self.send_to_members(&msg, &members).await;
        Ok(())
    }

    async fn send_to_members(&self, msg: &Message, members: &[String]) {
        let me = self.ctx.full_id();
        for member in members {
            if *member == me {
                continue;
            }
            let Some(addr) = self.member_addr(member) else {
                debug!(member, "member id has no usable address, skipping");
                continue;
            };
            if let Err(e) = self.ctx.send_message(msg, addr).await {
                debug!(member, "failed to send group message: {e}");
            }
        }
    }

    pub fn handle_create(&self, msg: &Message) {
        let (Some(from), Some(group_id)) = (msg.get("FROM"), msg.get("GROUP_ID")) else {
            debug!("group create missing FROM or GROUP_ID, dropping");
            return;
        };
        let name = msg.get("GROUP_NAME").unwrap_or(group_id).to_string();
        let members: HashSet<String> = msg
            .get("MEMBERS")
            .unwrap_or("")
            .split(',')
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        if !members.contains(&self.ctx.full_id()) {
            debug!(group_id, "group create does not include us, ignoring");
            return;
        }
        self.store.insert(
            group_id,
            Group {
                name: name.clone(),
                creator: from.to_string(),
                members,
            },
        );
        display::group_created(&name, from);
    }

    pub fn handle_update(&self, msg: &Message) {
        let (Some(from), Some(group_id)) = (msg.get("FROM"), msg.get("GROUP_ID")) else {
            debug!("group update missing FROM or GROUP_ID, dropping");
            return;
        };
        let split = |key| {
            msg.get(key)
                .unwrap_or("")
                .split(',')
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        if self.store.update(group_id, from, &split("ADD"), &split("REMOVE")) {
            let name = self
                .store
                .get(group_id)
                .map(|g| g.name)
                .unwrap_or_else(|| group_id.to_string());
            display::group_updated(&name);
        }
    }

    pub fn handle_message(&self, msg: &Message) {
        let (Some(from), Some(group_id), Some(content)) =
            (msg.get("FROM"), msg.get("GROUP_ID"), msg.get("CONTENT"))
        else {
            debug!("group message missing FROM, GROUP_ID or CONTENT, dropping");
            return;
        };
        if !self.store.is_member(group_id, from) {
            debug!(group_id, from, "group message from non-member, dropping");
            return;
        }
        if !self.store.is_member(group_id, &self.ctx.full_id()) {
            debug!(group_id, "group message for a group we are not in, dropping");
            return;
        }
        let name = self
            .store
            .get(group_id)
            .map(|g| g.name)
            .unwrap_or_else(|| group_id.to_string());
        display::group_message(&name, from, content);
    }
}
