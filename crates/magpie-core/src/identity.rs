//! Trust-on-first-use identity binding
//!
//! The first message seen from a claimed peer identifier binds that
//! identifier to the network address it arrived from. Later messages from
//! the same identifier but a different address are spoofing suspects and
//! fail verification; there is no re-binding until process restart.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct IdentityLedger {
    bindings: Mutex<HashMap<String, String>>,
}

/// Strip transport-specific decoration from an observed address
fn normalize(addr: &str) -> &str {
    addr.trim().trim_start_matches('/')
}

impl IdentityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify that `identifier` is still arriving from the address it was
    /// first observed at. First sight binds and returns true. Acknowledgment-
    /// class messages are exempt from this check, but the exemption belongs
    /// to the dispatcher, not here.
    pub fn verify(&self, identifier: &str, observed_addr: &str) -> bool {
        if identifier.is_empty() {
            return false;
        }
        let observed = normalize(observed_addr);

        let mut bindings = self.bindings.lock().unwrap();
        match bindings.get(identifier) {
            None => {
                bindings.insert(identifier.to_string(), observed.to_string());
                tracing::debug!(identifier, address = observed, "identity bound");
                true
            }
            Some(known) => {
                let matches = normalize(known) == observed;
                if !matches {
                    tracing::debug!(
                        identifier,
                        expected = %known,
                        got = observed,
                        "identity mismatch"
                    );
                }
                matches
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sight_binds() {
        let ledger = IdentityLedger::new();
        assert!(ledger.verify("alice@10.0.0.5", "10.0.0.5"));
        // Same address keeps verifying
        assert!(ledger.verify("alice@10.0.0.5", "10.0.0.5"));
    }

    #[test]
    fn test_changed_address_is_a_hard_mismatch() {
        let ledger = IdentityLedger::new();
        assert!(ledger.verify("alice", "10.0.0.5"));
        assert!(!ledger.verify("alice", "10.0.0.6"));
        // Original address still passes; the mismatch did not rebind
        assert!(ledger.verify("alice", "10.0.0.5"));
    }

    #[test]
    fn test_address_prefix_normalization() {
        let ledger = IdentityLedger::new();
        assert!(ledger.verify("bob", "/192.168.1.7"));
        assert!(ledger.verify("bob", "192.168.1.7"));
        assert!(ledger.verify("bob", " /192.168.1.7 "));
    }

    #[test]
    fn test_empty_identifier_fails() {
        let ledger = IdentityLedger::new();
        assert!(!ledger.verify("", "10.0.0.5"));
    }
}
