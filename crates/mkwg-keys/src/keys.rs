//! `WireGuard` key types.
//!
//! `WireGuard` uses Curve25519 for key exchange. Keys are 32 bytes and travel
//! as padded standard base64, the same encoding `wg genkey` produces.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use rand_core::OsRng;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::KeyError;

/// `WireGuard` key size in bytes (256-bit Curve25519 keys).
pub const KEY_SIZE: usize = 32;

fn to_array(bytes: &[u8]) -> Result<[u8; KEY_SIZE], KeyError> {
    bytes
        .try_into()
        .map_err(|_| KeyError::InvalidKeyLength(bytes.len()))
}

/// A `WireGuard` public key (Curve25519, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from raw bytes.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a public key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        to_array(bytes).map(Self)
    }

    /// Returns the raw bytes of the public key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as padded standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decodes a public key from standard base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or wrong length.
    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| KeyError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Re-encodes the key bytes with the URL-safe base64 alphabet.
    ///
    /// Used as the default peer name. The result decodes back to the same key
    /// with [`PublicKey::from_url_safe`].
    #[must_use]
    pub fn to_url_safe(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    /// Decodes a public key from URL-safe base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or wrong length.
    pub fn from_url_safe(s: &str) -> Result<Self, KeyError> {
        let bytes = URL_SAFE
            .decode(s)
            .map_err(|e| KeyError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        let short = &b64[..8.min(b64.len())];
        write!(f, "PublicKey({short}...)")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl From<X25519PublicKey> for PublicKey {
    fn from(key: X25519PublicKey) -> Self {
        Self::from_bytes_array(*key.as_bytes())
    }
}

/// A `WireGuard` private key (Curve25519, 32 bytes).
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Generates a new random private key from the operating system CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self(secret.to_bytes())
    }

    /// Creates a private key from a 32-byte array.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a private key from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        to_array(bytes).map(Self)
    }

    /// Returns the raw bytes of the private key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Derives the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        PublicKey::from(X25519PublicKey::from(&secret))
    }

    /// Encodes the key as padded standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decodes a private key from standard base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or wrong length.
    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| KeyError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_to_public_key_is_deterministic() {
        let private = PrivateKey::generate();
        assert_eq!(private.public_key(), private.public_key());
    }

    #[test]
    fn different_private_keys_produce_different_public_keys() {
        let private1 = PrivateKey::generate();
        let private2 = PrivateKey::generate();
        assert_ne!(private1, private2);
        assert_ne!(private1.public_key(), private2.public_key());
    }

    #[test]
    fn known_vector_matches_rfc7748() {
        // RFC 7748 section 6.1, Alice's key pair.
        let private = PrivateKey::from_bytes_array([
            0x77, 0x07, 0x6d, 0x0a, 0x73, 0x18, 0xa5, 0x7d, 0x3c, 0x16, 0xc1, 0x72, 0x51, 0xb2,
            0x66, 0x45, 0xdf, 0x4c, 0x2f, 0x87, 0xeb, 0xc0, 0x99, 0x2a, 0xb1, 0x77, 0xfb, 0xa5,
            0x1d, 0xb9, 0x2c, 0x2a,
        ]);
        let expected = [
            0x85, 0x20, 0xf0, 0x09, 0x89, 0x30, 0xa7, 0x54, 0x74, 0x8b, 0x7d, 0xdc, 0xb4, 0x3e,
            0xf7, 0x5a, 0x0d, 0xbf, 0x3a, 0x0d, 0x26, 0x38, 0x1a, 0xf4, 0xeb, 0xa4, 0xa9, 0x8e,
            0xaa, 0x9b, 0x4e, 0x6a,
        ];
        assert_eq!(private.public_key().as_bytes(), &expected);
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let public = PrivateKey::generate().public_key();
        let decoded = PublicKey::from_base64(&public.to_base64()).expect("decode failed");
        assert_eq!(public, decoded);
    }

    #[test]
    fn private_key_base64_roundtrip() {
        let private = PrivateKey::generate();
        let decoded = PrivateKey::from_base64(&private.to_base64()).expect("decode failed");
        assert_eq!(private, decoded);
    }

    #[test]
    fn url_safe_reencodes_same_bytes() {
        // 0xfb 0xff produce '+' and '/' in the standard alphabet.
        let public = PublicKey::from_bytes_array([0xfb; KEY_SIZE]);
        let standard = public.to_base64();
        let url_safe = public.to_url_safe();
        assert!(standard.contains('+') || standard.contains('/'));
        assert!(!url_safe.contains('+') && !url_safe.contains('/'));
        assert_eq!(url_safe, standard.replace('+', "-").replace('/', "_"));
        assert_eq!(PublicKey::from_url_safe(&url_safe).expect("decode"), public);
    }

    #[test]
    fn private_key_debug_redacts() {
        let debug = format!("{:?}", PrivateKey::generate());
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_bytes = [0u8; 16];
        assert_eq!(
            PrivateKey::from_bytes(&short_bytes),
            Err(KeyError::InvalidKeyLength(16))
        );
        assert!(PublicKey::from_bytes(&short_bytes).is_err());
    }

    #[test]
    fn invalid_base64_rejected() {
        assert!(matches!(
            PublicKey::from_base64("not base64!"),
            Err(KeyError::InvalidBase64(_))
        ));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn public_key_base64_roundtrip_prop(bytes in prop::array::uniform32(any::<u8>())) {
                let public = PublicKey::from_bytes_array(bytes);
                let decoded = PublicKey::from_base64(&public.to_base64());
                prop_assert_eq!(decoded, Ok(public));
            }

            #[test]
            fn url_safe_name_is_reversible(bytes in prop::array::uniform32(any::<u8>())) {
                let public = PublicKey::from_bytes_array(bytes);
                prop_assert_eq!(PublicKey::from_url_safe(&public.to_url_safe()), Ok(public));
            }

            #[test]
            fn public_key_derivation_consistent(seed: [u8; 32]) {
                let private = PrivateKey::from_bytes_array(seed);
                prop_assert_eq!(private.public_key(), private.public_key());
            }
        }
    }
}
