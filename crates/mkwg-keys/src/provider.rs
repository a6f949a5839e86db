//! Key generation capability.

use crate::keys::{PrivateKey, PublicKey};
use crate::psk::PresharedKey;

/// Source of `WireGuard` key material.
///
/// Implementations used outside tests must draw from a cryptographically
/// secure random source: a private or preshared key shared between two
/// networks or two peers breaks the protocol's confidentiality.
pub trait KeyProvider {
    /// Generates a fresh private key.
    fn generate_private_key(&self) -> PrivateKey;

    /// Derives the public key matching `private`.
    ///
    /// Must be a pure function of its input: the network-init and peer-add
    /// flows derive the server public key independently from the same stored
    /// private key and the results have to agree.
    fn derive_public_key(&self, private: &PrivateKey) -> PublicKey {
        private.public_key()
    }

    /// Generates a fresh preshared key.
    fn generate_preshared_key(&self) -> PresharedKey;
}

/// [`KeyProvider`] backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeyProvider;

impl OsKeyProvider {
    /// Creates a new provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl KeyProvider for OsKeyProvider {
    fn generate_private_key(&self) -> PrivateKey {
        PrivateKey::generate()
    }

    fn generate_preshared_key(&self) -> PresharedKey {
        PresharedKey::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let provider = OsKeyProvider::new();
        let private = provider.generate_private_key();
        let first = provider.derive_public_key(&private).to_base64();
        let second = provider.derive_public_key(&private).to_base64();
        assert_eq!(first, second);
    }

    #[test]
    fn derive_survives_base64_roundtrip() {
        let provider = OsKeyProvider::new();
        let private = provider.generate_private_key();
        let reloaded = PrivateKey::from_base64(&private.to_base64()).expect("decode");
        assert_eq!(
            provider.derive_public_key(&private),
            provider.derive_public_key(&reloaded)
        );
    }

    #[test]
    fn generated_keys_are_unique() {
        let provider = OsKeyProvider::new();
        assert_ne!(
            provider.generate_private_key().to_base64(),
            provider.generate_private_key().to_base64()
        );
        assert_ne!(
            provider.generate_preshared_key().to_base64(),
            provider.generate_preshared_key().to_base64()
        );
    }
}
