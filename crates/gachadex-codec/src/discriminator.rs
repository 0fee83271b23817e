//! Anchor discriminator derivation.
//!
//! Events are tagged with the first 8 bytes of `SHA-256("event:<Name>")`,
//! accounts with `SHA-256("account:<Name>")`. The full event table is
//! precomputed once at first use (see `decoder`).

use sha2::{Digest, Sha256};

/// First 8 bytes of `SHA-256("event:<name>")`.
pub fn event_discriminator(name: &str) -> [u8; 8] {
    prefixed_discriminator("event", name)
}

/// First 8 bytes of `SHA-256("account:<name>")`.
pub fn account_discriminator(name: &str) -> [u8; 8] {
    prefixed_discriminator("account", name)
}

fn prefixed_discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_sha256_prefix() {
        let digest = Sha256::digest(b"event:GameCreated");
        assert_eq!(event_discriminator("GameCreated"), digest[..8]);
    }

    #[test]
    fn namespaces_are_distinct() {
        assert_ne!(
            event_discriminator("GameCreated"),
            account_discriminator("GameCreated")
        );
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            event_discriminator("PlayResolved"),
            event_discriminator("PlayResolved")
        );
    }
}
