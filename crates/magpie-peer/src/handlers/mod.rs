//! Per-feature message handlers
//!
//! Each handler owns the state for one protocol feature, composes outbound
//! messages through the shared context, and renders inbound ones through
//! `display`. The dispatcher routes validated messages here by TYPE.

pub mod dm;
pub mod follow;
pub mod game;
pub mod group;
pub mod post;
pub mod profile;
pub mod revoke;

pub use dm::DmHandler;
pub use follow::FollowHandler;
pub use game::GameHandler;
pub use group::GroupHandler;
pub use post::PostHandler;
pub use profile::ProfileHandler;
pub use revoke::RevokeHandler;
