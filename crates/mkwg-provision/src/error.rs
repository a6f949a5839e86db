//! Error types for the provisioning workflow.

use std::path::PathBuf;

use ipnet::IpNet;
use mkwg_keys::KeyError;
use mkwg_network::NetworkError;
use mkwg_networkd::NetworkdError;
use thiserror::Error;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors surfaced by [`crate::ProvisioningWorkflow`]. Each one ends the
/// current operation.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The CIDR is not private or has no usable hosts.
    #[error("invalid network {cidr}: {reason}")]
    InvalidNetwork {
        /// The CIDR as given.
        cidr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration directory is not writable.
    #[error("the directory {} is not writeable (try sudo?)", path.display())]
    PermissionDenied {
        /// The directory.
        path: PathBuf,
    },

    /// The interface already exists and `force` was not given.
    #[error("interface {interface} already exists (use --force to overwrite)")]
    InterfaceExists {
        /// Interface name.
        interface: String,
    },

    /// The network to add a peer to is missing or unreadable.
    #[error("network {interface} not found: {reason}")]
    NetworkNotFound {
        /// Interface name.
        interface: String,
        /// What was missing or malformed.
        reason: String,
    },

    /// No host address is left for another peer.
    #[error("no addresses left in {cidr} for another peer")]
    AddressSpaceExhausted {
        /// The exhausted network.
        cidr: IpNet,
    },

    /// Malformed names, addresses or artifacts.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The public address could not be discovered and no endpoint was given.
    #[error("could not determine the endpoint (use --endpoint): {0}")]
    EndpointDiscoveryFailed(String),

    /// `networkctl` failed.
    #[error("{tool} failed: {message}")]
    ExternalToolFailure {
        /// The tool invocation.
        tool: String,
        /// Exit status or stderr.
        message: String,
    },

    /// The peer already exists and `force` was not given.
    #[error("peer {name} already exists (use --force to overwrite)")]
    PeerExists {
        /// Peer name.
        name: String,
    },

    /// Unexpected filesystem failure.
    #[error("{}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl From<NetworkError> for ProvisionError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::InvalidNetwork { cidr, reason } => Self::InvalidNetwork { cidr, reason },
            NetworkError::AddressSpaceExhausted { cidr } => Self::AddressSpaceExhausted { cidr },
            NetworkError::InvalidConfiguration(msg) => Self::InvalidConfiguration(msg),
        }
    }
}

impl From<NetworkdError> for ProvisionError {
    fn from(err: NetworkdError) -> Self {
        match err {
            NetworkdError::PermissionDenied { path } => Self::PermissionDenied { path },
            NetworkdError::ExternalTool { tool, message } => {
                Self::ExternalToolFailure { tool, message }
            }
            NetworkdError::Discovery(msg) => Self::EndpointDiscoveryFailed(msg),
            NetworkdError::Io { path, source } => Self::Io { path, source },
            other => Self::InvalidConfiguration(other.to_string()),
        }
    }
}

impl From<KeyError> for ProvisionError {
    fn from(err: KeyError) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}
