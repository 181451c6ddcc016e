//! Wire message codec
//!
//! Messages travel as UTF-8 text: one `KEY:VALUE` pair per line, joined by
//! `\n`. There is no escaping mechanism, so values must not contain embedded
//! newlines; peers interoperate on this exact framing, and fixing it would be
//! a protocol change. Keys are case-insensitive on the wire and normalized to
//! uppercase on both encode and decode.

use std::fmt;

/// An ordered mapping of uppercase field names to string values.
///
/// Insertion order is preserved for serialization (header-like fields first)
/// but carries no meaning for lookup. Setting an existing key replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    fields: Vec<(String, String)>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Create a message with its `TYPE` field already set
    pub fn of_type(msg_type: &str) -> Self {
        let mut msg = Self::new();
        msg.set("TYPE", msg_type);
        msg
    }

    /// Set a field, replacing any existing value for the same key
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let key = key.trim().to_uppercase();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
        self
    }

    /// Case-insensitive field lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_uppercase();
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Typed lookup; absent or malformed fields are `None`, never a panic
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key)?.parse().ok()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key)?.parse().ok()
    }

    /// The message `TYPE`, if present
    pub fn msg_type(&self) -> Option<&str> {
        self.get("TYPE")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterate fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize to wire text: one `KEY:VALUE` line per field
    pub fn encode(&self) -> String {
        let text = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("\n");
        text.trim_end().to_string()
    }

    /// Parse wire text into a message.
    ///
    /// Lines without a colon, with an empty key, or with an empty value after
    /// trimming are skipped; a bad line never fails the whole message. The
    /// last occurrence of a duplicate key wins. Empty input yields an empty
    /// message.
    pub fn decode(raw: &str) -> Message {
        let mut msg = Message::new();
        for line in raw.lines() {
            let Some((key, value)) = line.split_once(':') else {
                if !line.trim().is_empty() {
                    tracing::debug!(line, "skipping line without separator");
                }
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                tracing::debug!(line, "skipping line with empty key or value");
                continue;
            }
            msg.set(key, value);
        }
        msg
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Generate a 16-hex-character message id
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}
