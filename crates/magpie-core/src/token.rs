//! Scoped capability tokens
//!
//! Every authorized message carries a `TOKEN:<subject>|<expiry>|<scope>`
//! field. A token is valid iff it has not expired (`now == expiry` is still
//! valid), its scope matches the capability the message TYPE requires, and
//! the exact token string has not been revoked. Revocation is by literal
//! value, not by subject: revoking one token leaves all other tokens issued
//! to the same subject intact.

use crate::error::{Error, Result};
use crate::message::Message;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Capability classes a token can authorize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Broadcast,
    Chat,
    File,
    Follow,
    Group,
    Game,
    Revoke,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Broadcast => "broadcast",
            Scope::Chat => "chat",
            Scope::File => "file",
            Scope::Follow => "follow",
            Scope::Group => "group",
            Scope::Game => "game",
            Scope::Revoke => "revoke",
        }
    }

    /// Static TYPE -> scope table. `None` means the message type requires no
    /// authorization and the token authority is never consulted for it.
    pub fn required_for(msg_type: &str) -> Option<Scope> {
        match msg_type {
            "POST" | "LIKE" => Some(Scope::Broadcast),
            "DM" => Some(Scope::Chat),
            "FILE_OFFER" | "FILE_CHUNK" => Some(Scope::File),
            "FOLLOW" | "UNFOLLOW" => Some(Scope::Follow),
            "GROUP_CREATE" | "GROUP_UPDATE" | "GROUP_MESSAGE" => Some(Scope::Group),
            "TICTACTOE_INVITE" | "TICTACTOE_MOVE" | "TICTACTOE_RESULT" => Some(Scope::Game),
            "REVOKE" => Some(Scope::Revoke),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "broadcast" => Ok(Scope::Broadcast),
            "chat" => Ok(Scope::Chat),
            "file" => Ok(Scope::File),
            "follow" => Ok(Scope::Follow),
            "group" => Ok(Scope::Group),
            "game" => Ok(Scope::Game),
            "revoke" => Ok(Scope::Revoke),
            other => Err(Error::UnknownScope(other.to_string())),
        }
    }
}

/// A parsed capability token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub subject: String,
    pub expiry: u64,
    pub scope: Scope,
}

impl Token {
    /// Parse the `subject|expiry|scope` wire form. Anything other than
    /// exactly three parts with a numeric expiry and a known scope fails.
    pub fn parse(raw: &str) -> Result<Token> {
        let parts: Vec<&str> = raw.split('|').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidToken(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        }
        let expiry = parts[1]
            .parse()
            .map_err(|_| Error::InvalidToken(format!("bad expiry: {}", parts[1])))?;
        let scope = parts[2].parse()?;
        Ok(Token {
            subject: parts[0].to_string(),
            expiry,
            scope,
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.subject, self.expiry, self.scope)
    }
}

/// Current Unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Issues and validates capability tokens and tracks revocations.
///
/// A single instance is constructed at startup and shared by handle; there is
/// no ambient global state. The revocation set lives for the process lifetime
/// of the peer that learns of a revocation.
#[derive(Debug, Default)]
pub struct TokenAuthority {
    revoked: Mutex<HashSet<String>>,
}

impl TokenAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `subject` valid for `ttl_secs` from now
    pub fn issue(&self, subject: &str, ttl_secs: u64, scope: Scope) -> String {
        Token {
            subject: subject.to_string(),
            expiry: unix_now() + ttl_secs,
            scope,
        }
        .to_string()
    }

    /// Validate the token carried by `msg` against the scope its TYPE
    /// requires. Fails closed: any missing or malformed piece is a rejection.
    pub fn validate(&self, msg: &Message, expected: Scope) -> bool {
        let Some(subject) = msg.get("FROM").or_else(|| msg.get("USER_ID")) else {
            tracing::debug!("token check failed: no FROM or USER_ID");
            return false;
        };
        let Some(raw) = msg.get("TOKEN") else {
            tracing::debug!(subject, "token check failed: no TOKEN field");
            return false;
        };

        let token = match Token::parse(raw) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(subject, %e, "token check failed: unparseable");
                return false;
            }
        };

        let valid = unix_now() <= token.expiry
            && token.scope == expected
            && !self.is_revoked(raw);
        tracing::debug!(subject, scope = %token.scope, valid, "token check");
        valid
    }

    /// Revoke a token by its exact literal string. Idempotent; empty input
    /// is a no-op.
    pub fn revoke(&self, token: &str) {
        if token.is_empty() {
            return;
        }
        self.revoked.lock().unwrap().insert(token.to_string());
        tracing::debug!(token, "token revoked");
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.revoked.lock().unwrap().contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with(from: &str, token: &str) -> Message {
        let mut msg = Message::of_type("POST");
        msg.set("FROM", from);
        msg.set("TOKEN", token);
        msg
    }

    #[test]
    fn test_issue_and_validate() {
        let authority = TokenAuthority::new();
        let token = authority.issue("alice", 60, Scope::Broadcast);
        let msg = message_with("alice", &token);
        assert!(authority.validate(&msg, Scope::Broadcast));
    }

    #[test]
    fn test_expiry_boundary_is_valid() {
        // now == expiry must pass
        let authority = TokenAuthority::new();
        let token = authority.issue("alice", 0, Scope::Broadcast);
        let msg = message_with("alice", &token);
        assert!(authority.validate(&msg, Scope::Broadcast));
    }

    #[test]
    fn test_expired_by_one_second() {
        let authority = TokenAuthority::new();
        let token = format!("alice|{}|broadcast", unix_now() - 1);
        let msg = message_with("alice", &token);
        assert!(!authority.validate(&msg, Scope::Broadcast));
    }

    #[test]
    fn test_wrong_scope_rejected() {
        let authority = TokenAuthority::new();
        let token = authority.issue("alice", 60, Scope::Chat);
        let msg = message_with("alice", &token);
        assert!(!authority.validate(&msg, Scope::Broadcast));
    }

    #[test]
    fn test_fails_closed_on_missing_fields() {
        let authority = TokenAuthority::new();

        let mut no_token = Message::of_type("POST");
        no_token.set("FROM", "alice");
        assert!(!authority.validate(&no_token, Scope::Broadcast));

        let mut no_sender = Message::of_type("POST");
        no_sender.set("TOKEN", authority.issue("alice", 60, Scope::Broadcast));
        assert!(!authority.validate(&no_sender, Scope::Broadcast));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let authority = TokenAuthority::new();
        for bad in ["alice|123", "alice|123|broadcast|extra", "alice|soon|chat", "alice|123|flying"] {
            let msg = message_with("alice", bad);
            assert!(!authority.validate(&msg, Scope::Broadcast), "accepted {bad}");
        }
    }

    #[test]
    fn test_user_id_fallback_subject() {
        let authority = TokenAuthority::new();
        let token = authority.issue("carol@10.0.0.9", 60, Scope::Broadcast);
        let mut msg = Message::of_type("POST");
        msg.set("USER_ID", "carol@10.0.0.9");
        msg.set("TOKEN", &token);
        assert!(authority.validate(&msg, Scope::Broadcast));
    }

    #[test]
    fn test_revocation_is_by_exact_value() {
        let authority = TokenAuthority::new();
        let first = authority.issue("alice", 60, Scope::File);
        // Different expiry makes a distinct literal for the same subject
        let second = format!("alice|{}|file", unix_now() + 120);

        authority.revoke(&first);
        assert!(!authority.validate(&message_with("alice", &first), Scope::File));
        assert!(authority.validate(&message_with("alice", &second), Scope::File));
    }

    #[test]
    fn test_revoke_idempotent_and_empty_noop() {
        let authority = TokenAuthority::new();
        authority.revoke("");
        assert!(!authority.is_revoked(""));
        authority.revoke("tok");
        authority.revoke("tok");
        assert!(authority.is_revoked("tok"));
    }

    #[test]
    fn test_scope_table() {
        assert_eq!(Scope::required_for("POST"), Some(Scope::Broadcast));
        assert_eq!(Scope::required_for("LIKE"), Some(Scope::Broadcast));
        assert_eq!(Scope::required_for("DM"), Some(Scope::Chat));
        assert_eq!(Scope::required_for("FILE_CHUNK"), Some(Scope::File));
        assert_eq!(Scope::required_for("GROUP_MESSAGE"), Some(Scope::Group));
        assert_eq!(Scope::required_for("TICTACTOE_MOVE"), Some(Scope::Game));
        assert_eq!(Scope::required_for("REVOKE"), Some(Scope::Revoke));
        assert_eq!(Scope::required_for("ACK"), None);
        assert_eq!(Scope::required_for("PROFILE"), None);
        assert_eq!(Scope::required_for("PING"), None);
        assert_eq!(Scope::required_for("FILE_RECEIVED"), None);
    }
}
