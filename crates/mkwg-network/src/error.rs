//! Error types for address allocation and descriptor construction.

use ipnet::IpNet;
use thiserror::Error;

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors that can occur while allocating addresses or building descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The CIDR is unusable for a network.
    #[error("invalid network {cidr}: {reason}")]
    InvalidNetwork {
        /// The offending CIDR as given.
        cidr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No host address is left for another peer.
    #[error("no addresses left in {cidr} for another peer")]
    AddressSpaceExhausted {
        /// The exhausted network.
        cidr: IpNet,
    },

    /// A descriptor field is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl NetworkError {
    pub(crate) fn invalid_network(cidr: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidNetwork {
            cidr: cidr.to_string(),
            reason: reason.into(),
        }
    }
}
