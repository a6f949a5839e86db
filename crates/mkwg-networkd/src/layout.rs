//! On-disk layout of a network's artifacts.

use std::path::{Path, PathBuf};

use mkwg_network::{InterfaceName, PeerName};

const PREFIX: &str = "99-";
const PEER_PREFIX: &str = "peer-";
const PEER_SUFFIX: &str = ".conf";

/// Paths of every artifact under one systemd-networkd configuration
/// directory.
///
/// One device and one interface artifact per network, one drop-in per peer.
/// Peer enumeration depends on this one-file-per-entity layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkdLayout {
    root: PathBuf,
}

impl NetworkdLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configuration directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `99-<if>.netdev`
    pub fn netdev_path(&self, interface: &InterfaceName) -> PathBuf {
        self.root.join(format!("{PREFIX}{interface}.netdev"))
    }

    /// `99-<if>.network`
    pub fn network_path(&self, interface: &InterfaceName) -> PathBuf {
        self.root.join(format!("{PREFIX}{interface}.network"))
    }

    /// `99-<if>.netdev.d`
    pub fn peer_dir(&self, interface: &InterfaceName) -> PathBuf {
        self.root.join(format!("{PREFIX}{interface}.netdev.d"))
    }

    /// `99-<if>.netdev.d/peer-<name>.conf`
    pub fn peer_path(&self, interface: &InterfaceName, peer: &PeerName) -> PathBuf {
        self.peer_dir(interface)
            .join(format!("{PEER_PREFIX}{peer}{PEER_SUFFIX}"))
    }

    /// Recovers the peer name from a drop-in path, if it is one.
    pub fn peer_name(path: &Path) -> Option<&str> {
        path.file_name()?
            .to_str()?
            .strip_prefix(PEER_PREFIX)?
            .strip_suffix(PEER_SUFFIX)
    }
}
