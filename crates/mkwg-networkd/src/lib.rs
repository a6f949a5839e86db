//! # mkwg-networkd
//!
//! Everything mkwg needs from the host: the on-disk systemd-networkd
//! artifacts, the `networkctl` tool, and public address discovery.
//!
//! Each host concern sits behind a small trait so the provisioning workflow
//! can run against fakes in tests:
//!
//! | trait | real | fake |
//! |---|---|---|
//! | [`ArtifactStore`] | [`FsArtifactStore`] | (a temp directory) |
//! | [`NetworkManager`] | [`Networkctl`] | [`FakeNetworkManager`] |
//! | [`AddressDiscovery`] | [`HttpAddressDiscovery`] | [`StaticAddressDiscovery`] |
//!
//! # Layout
//!
//! ```text
//! <dir>/99-wg0.netdev                 device, listen port, server private key
//! <dir>/99-wg0.network                server address and route
//! <dir>/99-wg0.netdev.d/peer-<n>.conf one drop-in per peer
//! ```

#![forbid(unsafe_code)]

pub mod artifact;
pub mod discovery;
pub mod error;
pub mod layout;
pub mod manager;
pub mod store;
pub mod units;

pub use artifact::{Artifact, Section};
pub use discovery::{AddressDiscovery, HttpAddressDiscovery, StaticAddressDiscovery};
pub use error::{NetworkdError, Result};
pub use layout::NetworkdLayout;
pub use manager::{FakeNetworkManager, NetworkManager, Networkctl};
pub use store::{ArtifactStore, FileOwnership, FsArtifactStore};
