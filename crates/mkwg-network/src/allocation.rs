//! Server and peer address allocation.
//!
//! All comparisons use the integer value of an address, never its string
//! form, so `172.17.2.10` sorts after `172.17.2.9`.
//!
//! # Usable host range
//!
//! ```text
//! IPv4 /0../30   network+1 ..= broadcast-1
//! IPv4 /31       network+1 ..= broadcast      (RFC 3021)
//! IPv6 /0../127  network+1 ..= last           (skips subnet-router anycast)
//! /32, /128      empty
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use crate::error::{NetworkError, Result};

fn to_u128(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_u128(cidr: &IpNet, value: u128) -> IpAddr {
    match cidr {
        IpNet::V4(_) => IpAddr::V4(Ipv4Addr::from(value as u32)),
        IpNet::V6(_) => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

fn is_private_addr(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private(),
        // fc00::/7
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Returns true if the whole of `cidr` lies in private address space.
///
/// IPv4 blocks must sit inside RFC 1918 space, IPv6 blocks inside the
/// RFC 4193 unique-local range. The private blocks are prefix aligned, so
/// checking both ends of the block is enough.
pub fn is_private_network(cidr: &IpNet) -> bool {
    is_private_addr(cidr.network()) && is_private_addr(cidr.broadcast())
}

/// Inclusive integer bounds of the addresses that may be handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HostRange {
    first: u128,
    last: u128,
}

impl HostRange {
    fn of(cidr: &IpNet) -> Option<Self> {
        let network = to_u128(cidr.network());
        let end = to_u128(cidr.broadcast());
        let last = match cidr {
            IpNet::V4(v4) if v4.prefix_len() <= 30 => end - 1,
            _ => end,
        };
        let first = network.checked_add(1)?;
        (first <= last).then_some(Self { first, last })
    }

    fn contains(&self, value: u128) -> bool {
        (self.first..=self.last).contains(&value)
    }
}

fn check_cidr(cidr: &IpNet) -> Result<()> {
    if *cidr != cidr.trunc() {
        return Err(NetworkError::invalid_network(cidr, "host bits are set"));
    }
    if !is_private_network(cidr) {
        return Err(NetworkError::invalid_network(
            cidr,
            "not allocated for private networks (see RFC 1918 / RFC 4193)",
        ));
    }
    Ok(())
}

/// Allocates addresses inside one private network block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressAllocator {
    cidr: IpNet,
    range: HostRange,
}

impl AddressAllocator {
    /// Creates an allocator for `cidr`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidNetwork`] if `cidr` has host bits set,
    /// is not private, or has no usable host address.
    pub fn new(cidr: IpNet) -> Result<Self> {
        check_cidr(&cidr)?;
        let range = HostRange::of(&cidr)
            .ok_or_else(|| NetworkError::invalid_network(cidr, "no usable host addresses"))?;
        Ok(Self { cidr, range })
    }

    /// The network block being allocated from.
    pub fn cidr(&self) -> IpNet {
        self.cidr
    }

    /// The server address: the first usable host of the block.
    pub fn server_address(&self) -> IpAddr {
        from_u128(&self.cidr, self.range.first)
    }

    /// Returns true if `addr` is a usable host address of this network.
    pub fn is_host(&self, addr: IpAddr) -> bool {
        self.cidr.contains(&addr) && self.range.contains(to_u128(addr))
    }

    /// Computes the address for the next peer.
    ///
    /// The result is one past the highest of the server address and every
    /// address in `existing` that falls inside the block. Gaps left below
    /// that address are never reused.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::AddressSpaceExhausted`] if that address is
    /// past the end of the usable range.
    pub fn next_peer_address<I>(&self, existing: I) -> Result<IpAddr>
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let highest = existing
            .into_iter()
            .filter(|addr| self.cidr.contains(addr))
            .map(to_u128)
            .fold(self.range.first, u128::max);

        highest
            .checked_add(1)
            .filter(|next| *next <= self.range.last)
            .map(|next| from_u128(&self.cidr, next))
            .ok_or(NetworkError::AddressSpaceExhausted { cidr: self.cidr })
    }
}

/// Returns the first usable host address of `cidr`.
///
/// # Errors
///
/// Returns [`NetworkError::InvalidNetwork`] if `cidr` is not private or has
/// no usable host address.
pub fn allocate_server_address(cidr: &IpNet) -> Result<IpAddr> {
    AddressAllocator::new(*cidr).map(|alloc| alloc.server_address())
}

/// Returns the next peer address of `cidr` given the addresses in use.
///
/// # Errors
///
/// Returns [`NetworkError::InvalidNetwork`] if `cidr` is not private and
/// [`NetworkError::AddressSpaceExhausted`] if no host address is left,
/// including blocks that have no room beyond the server.
pub fn allocate_next_peer_address<I>(cidr: &IpNet, existing: I) -> Result<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    check_cidr(cidr)?;
    if HostRange::of(cidr).is_none() {
        return Err(NetworkError::AddressSpaceExhausted { cidr: *cidr });
    }
    AddressAllocator::new(*cidr)?.next_peer_address(existing)
}
