//! Network and peer descriptors.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use ipnet::IpNet;
use mkwg_keys::{PresharedKey, PrivateKey, PublicKey};

use crate::allocation::AddressAllocator;
use crate::error::{NetworkError, Result};

fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NetworkError::InvalidConfiguration(format!(
            "{kind} name must not be empty"
        )));
    }
    if name == "." || name == ".." {
        return Err(NetworkError::InvalidConfiguration(format!(
            "{kind} name cannot be '{name}'"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| *c == '/' || *c == '\0' || c.is_whitespace())
    {
        return Err(NetworkError::InvalidConfiguration(format!(
            "{kind} name {name:?} contains invalid character {c:?}"
        )));
    }
    Ok(())
}

/// Name of a `WireGuard` network interface, e.g. `wg0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Longest name the kernel accepts (`IFNAMSIZ - 1`).
    pub const MAX_LEN: usize = 15;

    /// Validates and wraps an interface name.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidConfiguration`] if the name is empty,
    /// longer than [`Self::MAX_LEN`] bytes, or contains `/`, NUL or whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name("interface", &name)?;
        if name.len() > Self::MAX_LEN {
            return Err(NetworkError::InvalidConfiguration(format!(
                "interface name {name:?} is longer than {} bytes",
                Self::MAX_LEN
            )));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for InterfaceName {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a peer, unique within its network.
///
/// Peers without an explicit name are named after their public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerName(String);

impl PeerName {
    /// Validates and wraps a peer name.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidConfiguration`] if the name is empty,
    /// `.`/`..`, or contains `/`, NUL or whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name("peer", &name)?;
        Ok(Self(name))
    }

    /// Derives the default name from a public key.
    ///
    /// The key bytes are re-encoded with the URL-safe base64 alphabet, so the
    /// name decodes back to the key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self(key.to_url_safe())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PeerName {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `host:port` endpoint handed to clients.
///
/// The host may be a name, an IPv4 address or a bracketed IPv6 address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    /// Builds an endpoint from an address and port, bracketing IPv6.
    pub fn from_ip_port(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port).to_string())
    }

    /// Returns the endpoint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Endpoint {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| NetworkError::InvalidConfiguration(format!("endpoint {s:?} {why}"));

        let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("is missing a port"))?;
        port.parse::<u16>().map_err(|_| invalid("has an invalid port"))?;
        if host.is_empty() {
            return Err(invalid("is missing a host"));
        }
        if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
            return Err(invalid("must bracket IPv6 addresses"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provisioned `WireGuard` network as seen by the server.
///
/// The server address is fixed when the descriptor is created and the public
/// key is always derived from the private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    interface_name: InterfaceName,
    listen_port: u16,
    cidr: IpNet,
    server_address: IpAddr,
    server_private_key: PrivateKey,
}

impl NetworkDescriptor {
    /// Creates the descriptor of a new network, allocating the server address.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidNetwork`] if `cidr` is not a private
    /// block with at least one host address.
    pub fn new(
        interface_name: InterfaceName,
        listen_port: u16,
        cidr: IpNet,
        server_private_key: PrivateKey,
    ) -> Result<Self> {
        let server_address = AddressAllocator::new(cidr)?.server_address();
        Ok(Self {
            interface_name,
            listen_port,
            cidr,
            server_address,
            server_private_key,
        })
    }

    /// Rebuilds a descriptor from persisted parts.
    ///
    /// `server_interface` is the server address with the network prefix, as
    /// written to the interface artifact (`172.17.2.1/24`).
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidConfiguration`] if the server address is
    /// not a host of its network.
    pub fn from_parts(
        interface_name: InterfaceName,
        listen_port: u16,
        server_interface: IpNet,
        server_private_key: PrivateKey,
    ) -> Result<Self> {
        let cidr = server_interface.trunc();
        let server_address = server_interface.addr();
        let allocator = AddressAllocator::new(cidr)
            .map_err(|e| NetworkError::InvalidConfiguration(e.to_string()))?;
        if !allocator.is_host(server_address) {
            return Err(NetworkError::InvalidConfiguration(format!(
                "server address {server_address} is not a host of {cidr}"
            )));
        }
        Ok(Self {
            interface_name,
            listen_port,
            cidr,
            server_address,
            server_private_key,
        })
    }

    /// Interface name.
    pub fn interface_name(&self) -> &InterfaceName {
        &self.interface_name
    }

    /// UDP listen port.
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// The network block.
    pub fn cidr(&self) -> IpNet {
        self.cidr
    }

    /// The server's address.
    pub fn server_address(&self) -> IpAddr {
        self.server_address
    }

    /// The server address with the network prefix, e.g. `172.17.2.1/24`.
    pub fn server_interface(&self) -> IpNet {
        // The prefix comes from an existing IpNet of the same family.
        IpNet::new(self.server_address, self.cidr.prefix_len()).unwrap_or(self.cidr)
    }

    /// The server's private key.
    pub fn server_private_key(&self) -> &PrivateKey {
        &self.server_private_key
    }

    /// The server's public key, derived from the private key.
    pub fn server_public_key(&self) -> PublicKey {
        self.server_private_key.public_key()
    }

    /// An allocator over this network's block.
    ///
    /// # Errors
    ///
    /// Never fails for a descriptor built by [`Self::new`] or
    /// [`Self::from_parts`].
    pub fn allocator(&self) -> Result<AddressAllocator> {
        AddressAllocator::new(self.cidr)
    }
}

/// Server-side record of a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Peer name, unique within the network.
    pub name: PeerName,
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Preshared key, identical in the client configuration.
    pub preshared_key: PresharedKey,
    /// The single host address the peer may use.
    pub allowed_address: IpAddr,
}

impl PeerRecord {
    /// The allowed address as a host network (`/32` or `/128`).
    pub fn allowed_network(&self) -> IpNet {
        IpNet::from(self.allowed_address)
    }
}

/// Client-side configuration for a new peer.
///
/// This is the only place the peer's private key exists; it is never
/// persisted on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// The peer's private key.
    pub private_key: PrivateKey,
    /// The peer's tunnel address.
    pub address: IpAddr,
    /// The server's public key.
    pub server_public_key: PublicKey,
    /// Preshared key, identical in the server-side record.
    pub preshared_key: PresharedKey,
    /// The network routed through the tunnel.
    pub allowed_network: IpNet,
    /// Where the client reaches the server.
    pub endpoint: Endpoint,
}

impl ClientConfig {
    /// The tunnel address as a host network (`/32` or `/128`).
    pub fn address_network(&self) -> IpNet {
        IpNet::from(self.address)
    }
}
