//! `WireGuard` key material for mkwg.
//!
//! Provides the Curve25519 key types threaded through a provisioned network:
//! the server key, each peer's key and the per-peer preshared key.
//! Generation goes through the [`KeyProvider`] capability so the workflow never
//! touches a random source directly.

pub mod error;
mod keys;
mod provider;
mod psk;

pub use error::KeyError;
pub use keys::{PrivateKey, PublicKey, KEY_SIZE};
pub use provider::{KeyProvider, OsKeyProvider};
pub use psk::PresharedKey;
