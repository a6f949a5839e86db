//! # mkwg-provision
//!
//! The two operations mkwg exposes: creating a `WireGuard` network
//! ([`ProvisioningWorkflow::init_network`]) and adding a peer to it
//! ([`ProvisioningWorkflow::add_peer`]).
//!
//! The workflow is generic over its host collaborators so the same code runs
//! against the real filesystem and `networkctl` or against fakes:
//!
//! ```text
//! init_network ──> KeyProvider ──> NetworkDescriptor ──> ArtifactStore ──> NetworkManager
//! add_peer     ──> ArtifactStore (load, enumerate) ──> AddressAllocator
//!              ──> KeyProvider ──> AddressDiscovery ──> PeerRecord
//!              ──> ArtifactStore ──> NetworkManager ──> ClientConfig
//! ```
//!
//! # Concurrency
//!
//! There is no locking. Two `add_peer` calls racing on the same network can
//! read the same highest peer address and allocate the same next one. Callers
//! that provision concurrently must serialize the calls themselves.

#![forbid(unsafe_code)]

pub mod error;
pub mod workflow;

pub use error::{ProvisionError, Result};
pub use workflow::{
    AddPeerOptions, AddPeerStage, InitOptions, InitStage, PeerProvisioned, ProvisioningWorkflow,
};
