//! # mkwg-network
//!
//! Address-space logic and in-memory model of a `WireGuard` network.
//!
//! A network owns a private CIDR block. The server always takes the first
//! usable host address; peers are handed single-host allowed-IPs in strictly
//! increasing order after the highest address already in use.
//!
//! ```text
//! 172.17.2.0/24
//!   .1   server        (AddressAllocator::server_address)
//!   .2   first peer    (AddressAllocator::next_peer_address([]))
//!   .3   second peer   (AddressAllocator::next_peer_address([.2]))
//! ```
//!
//! Allocation never reuses gaps. Reclaiming the addresses of removed peers is
//! left for when peer removal exists.

#![forbid(unsafe_code)]

pub mod allocation;
pub mod error;
pub mod types;

pub use allocation::{
    AddressAllocator, allocate_next_peer_address, allocate_server_address, is_private_network,
};
pub use error::{NetworkError, Result};
pub use types::{ClientConfig, Endpoint, InterfaceName, NetworkDescriptor, PeerName, PeerRecord};
