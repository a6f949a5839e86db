//! Conversions between descriptors and systemd-networkd artifacts.
//!
//! ```text
//! NetworkDescriptor ──> 99-<if>.netdev   [NetDev] [WireGuard]
//!                   ──> 99-<if>.network  [Match] [Network] [Route]
//! PeerRecord        ──> peer-<n>.conf    [WireGuardPeer]
//! ClientConfig      ──> stdout           [Interface] [Peer]
//! ```

use std::net::IpAddr;

use ipnet::IpNet;
use mkwg_keys::PrivateKey;
use mkwg_network::{ClientConfig, InterfaceName, NetworkDescriptor, PeerRecord};

use crate::artifact::{Artifact, Section};
use crate::error::{NetworkdError, Result};

const NETDEV: &str = "NetDev";
const WIREGUARD: &str = "WireGuard";
const MATCH: &str = "Match";
const NETWORK: &str = "Network";
const ROUTE: &str = "Route";
const WIREGUARD_PEER: &str = "WireGuardPeer";
const INTERFACE: &str = "Interface";
const PEER: &str = "Peer";

fn invalid(section: &str, key: &str, message: impl ToString) -> NetworkdError {
    NetworkdError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Parses `10.0.0.1/24` or a bare address (treated as a host network).
fn parse_net(value: &str) -> std::result::Result<IpNet, String> {
    if value.contains('/') {
        value.parse::<IpNet>().map_err(|e| e.to_string())
    } else {
        value
            .parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(|e| e.to_string())
    }
}

/// The device artifact: interface kind, listen port and server private key.
pub fn netdev_artifact(desc: &NetworkDescriptor) -> Artifact {
    let name = desc.interface_name();
    Artifact::new()
        .with_section(
            Section::new(NETDEV)
                .entry("Name", name)
                .entry("Kind", "wireguard")
                .entry("Description", format!("wireguard tunnel {name}")),
        )
        .with_section(
            Section::new(WIREGUARD)
                .entry("ListenPort", desc.listen_port())
                .entry("PrivateKey", desc.server_private_key().to_base64()),
        )
}

/// The interface artifact: server address and the route to the network.
pub fn network_artifact(desc: &NetworkDescriptor) -> Artifact {
    Artifact::new()
        .with_section(Section::new(MATCH).entry("Name", desc.interface_name()))
        .with_section(Section::new(NETWORK).entry("Address", desc.server_interface()))
        .with_section(
            Section::new(ROUTE)
                .entry("Gateway", desc.server_address())
                .entry("Destination", desc.cidr()),
        )
}

/// The server-side drop-in for one peer.
pub fn peer_artifact(record: &PeerRecord) -> Artifact {
    Artifact::new().with_section(
        Section::new(WIREGUARD_PEER)
            .entry("PublicKey", record.public_key.to_base64())
            .entry("PresharedKey", record.preshared_key.to_base64())
            .entry("AllowedIPs", record.allowed_network()),
    )
}

/// The `wg-quick` style configuration handed to the client.
pub fn client_artifact(client: &ClientConfig) -> Artifact {
    Artifact::new()
        .with_section(
            Section::new(INTERFACE)
                .entry("PrivateKey", client.private_key.to_base64())
                .entry("Address", client.address_network()),
        )
        .with_section(
            Section::new(PEER)
                .entry("PublicKey", client.server_public_key.to_base64())
                .entry("PresharedKey", client.preshared_key.to_base64())
                .entry("AllowedIPs", client.allowed_network)
                .entry("Endpoint", &client.endpoint),
        )
}

/// Rebuilds a network descriptor from its device and interface artifacts.
pub fn descriptor_from_artifacts(
    netdev: &Artifact,
    network: &Artifact,
) -> Result<NetworkDescriptor> {
    let name = netdev.require(NETDEV, "Name")?;
    let interface_name = InterfaceName::new(name).map_err(|e| invalid(NETDEV, "Name", e))?;

    let port = netdev.require(WIREGUARD, "ListenPort")?;
    let listen_port = port
        .parse::<u16>()
        .map_err(|e| invalid(WIREGUARD, "ListenPort", format!("{port:?}: {e}")))?;

    let key = netdev.require(WIREGUARD, "PrivateKey")?;
    let private_key =
        PrivateKey::from_base64(key).map_err(|e| invalid(WIREGUARD, "PrivateKey", e))?;

    let address = network.require(NETWORK, "Address")?;
    let mut server_interface = parse_net(address).map_err(|e| invalid(NETWORK, "Address", e))?;
    if server_interface.prefix_len() == server_interface.max_prefix_len() {
        server_interface = widen_to_route(network, server_interface.addr())?;
    }

    NetworkDescriptor::from_parts(interface_name, listen_port, server_interface, private_key)
        .map_err(|e| invalid(NETWORK, "Address", e))
}

/// Interfaces written with a host-length `Address` (`172.17.2.1/32`) carry
/// their block only in `[Route] Destination`.
fn widen_to_route(network: &Artifact, server_address: IpAddr) -> Result<IpNet> {
    let destination = network.require(ROUTE, "Destination")?;
    let cidr = parse_net(destination).map_err(|e| invalid(ROUTE, "Destination", e))?;
    if !cidr.contains(&server_address) {
        return Err(invalid(
            ROUTE,
            "Destination",
            format!("{cidr} does not contain the server address {server_address}"),
        ));
    }
    IpNet::new(server_address, cidr.prefix_len()).map_err(|e| invalid(ROUTE, "Destination", e))
}

/// The allowed-IPs listed in a peer drop-in. An empty value yields none.
pub fn peer_allowed_ips(peer: &Artifact) -> Result<Vec<IpNet>> {
    let Some(value) = peer.get(WIREGUARD_PEER, "AllowedIPs") else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            parse_net(v)
                .map_err(|e| invalid(WIREGUARD_PEER, "AllowedIPs", format!("{v:?}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mkwg_keys::{PresharedKey, PublicKey};
    use mkwg_network::{Endpoint, PeerName};
    use test_case::test_case;

    fn descriptor() -> NetworkDescriptor {
        NetworkDescriptor::new(
            InterfaceName::new("wg0").expect("name"),
            51820,
            "172.17.2.0/24".parse().expect("cidr"),
            PrivateKey::from_bytes_array([3; 32]),
        )
        .expect("descriptor")
    }

    #[test]
    fn netdev_layout() {
        let desc = descriptor();
        let expected = format!(
            "[NetDev]\nName=wg0\nKind=wireguard\nDescription=wireguard tunnel wg0\n\n\
             [WireGuard]\nListenPort=51820\nPrivateKey={}\n\n",
            desc.server_private_key().to_base64()
        );
        assert_eq!(netdev_artifact(&desc).render(), expected);
    }

    #[test]
    fn network_layout() {
        assert_eq!(
            network_artifact(&descriptor()).render(),
            "[Match]\nName=wg0\n\n[Network]\nAddress=172.17.2.1/24\n\n\
             [Route]\nGateway=172.17.2.1\nDestination=172.17.2.0/24\n\n"
        );
    }

    #[test]
    fn descriptor_survives_artifacts() {
        let desc = descriptor();
        let netdev = Artifact::parse(&netdev_artifact(&desc).render()).expect("netdev");
        let network = Artifact::parse(&network_artifact(&desc).render()).expect("network");
        assert_eq!(descriptor_from_artifacts(&netdev, &network).expect("load"), desc);
    }

    #[test]
    fn host_address_takes_block_from_route() {
        let desc = descriptor();
        let netdev = Artifact::parse(&netdev_artifact(&desc).render()).expect("netdev");
        let network = Artifact::parse(
            "[Match]\nName=wg0\n\n[Network]\nAddress=172.17.2.1/32\n\n\
             [Route]\nGateway=172.17.2.1\nDestination=172.17.2.0/24\n\n",
        )
        .expect("network");
        let loaded = descriptor_from_artifacts(&netdev, &network).expect("load");
        assert_eq!(loaded, desc);
        assert_eq!(loaded.cidr().to_string(), "172.17.2.0/24");
        assert_eq!(loaded.server_address().to_string(), "172.17.2.1");
    }

    #[test_case("[Network]\nAddress=172.17.2.1/32\n" ; "no route")]
    #[test_case(
        "[Network]\nAddress=172.17.2.1/32\n[Route]\nDestination=10.9.0.0/24\n" ;
        "route elsewhere"
    )]
    fn host_address_needs_matching_route(text: &str) {
        let desc = descriptor();
        let network = Artifact::parse(text).expect("network");
        let err = descriptor_from_artifacts(&netdev_artifact(&desc), &network)
            .expect_err("rejected");
        assert!(matches!(
            err,
            NetworkdError::MissingKey { .. } | NetworkdError::InvalidValue { .. }
        ));
    }

    #[test]
    fn missing_private_key_is_reported() {
        let desc = descriptor();
        let netdev = Artifact::new()
            .with_section(Section::new(NETDEV).entry("Name", "wg0"))
            .with_section(Section::new(WIREGUARD).entry("ListenPort", 51820));
        let err =
            descriptor_from_artifacts(&netdev, &network_artifact(&desc)).expect_err("missing");
        assert!(matches!(err, NetworkdError::MissingKey { ref key, .. } if key == "PrivateKey"));
    }

    #[test]
    fn bad_port_is_reported() {
        let desc = descriptor();
        let netdev = Artifact::parse(
            &netdev_artifact(&desc).render().replace("ListenPort=51820", "ListenPort=70000"),
        )
        .expect("parse");
        let err =
            descriptor_from_artifacts(&netdev, &network_artifact(&desc)).expect_err("bad port");
        assert!(matches!(err, NetworkdError::InvalidValue { ref key, .. } if key == "ListenPort"));
    }

    #[test]
    fn peer_drop_in_layout() {
        let record = PeerRecord {
            name: PeerName::new("laptop").expect("name"),
            public_key: PublicKey::from_bytes_array([1; 32]),
            preshared_key: PresharedKey::from_bytes_array([2; 32]),
            allowed_address: "172.17.2.2".parse().expect("ip"),
        };
        let artifact = peer_artifact(&record);
        assert_eq!(
            artifact.render(),
            format!(
                "[WireGuardPeer]\nPublicKey={}\nPresharedKey={}\nAllowedIPs=172.17.2.2/32\n\n",
                record.public_key.to_base64(),
                record.preshared_key.to_base64()
            )
        );
        assert_eq!(
            peer_allowed_ips(&artifact).expect("ips"),
            vec!["172.17.2.2/32".parse::<IpNet>().expect("net")]
        );
    }

    #[test]
    fn client_layout() {
        let client = ClientConfig {
            private_key: PrivateKey::from_bytes_array([4; 32]),
            address: "172.17.2.2".parse().expect("ip"),
            server_public_key: PublicKey::from_bytes_array([5; 32]),
            preshared_key: PresharedKey::from_bytes_array([6; 32]),
            allowed_network: "172.17.2.0/24".parse().expect("net"),
            endpoint: "203.0.113.7:51820".parse::<Endpoint>().expect("endpoint"),
        };
        let text = client_artifact(&client).render();
        assert!(text.starts_with("[Interface]\nPrivateKey="));
        assert!(text.contains("Address=172.17.2.2/32\n\n[Peer]\n"));
        assert!(text.contains("AllowedIPs=172.17.2.0/24\nEndpoint=203.0.113.7:51820\n"));
    }

    #[test]
    fn allowed_ips_lists_and_bare_addresses() {
        let artifact = Artifact::parse("[WireGuardPeer]\nAllowedIPs=10.0.0.2, 10.0.0.8/30,\n")
            .expect("parse");
        let nets = peer_allowed_ips(&artifact).expect("ips");
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[0].to_string(), "10.0.0.2/32");
        assert_eq!(nets[1].to_string(), "10.0.0.8/30");
    }

    #[test]
    fn allowed_ips_absent_or_empty() {
        let artifact = Artifact::parse("[WireGuardPeer]\nAllowedIPs=\n").expect("parse");
        assert!(peer_allowed_ips(&artifact).expect("ips").is_empty());
        assert!(peer_allowed_ips(&Artifact::new()).expect("ips").is_empty());
    }

    #[test]
    fn allowed_ips_garbage_rejected() {
        let artifact = Artifact::parse("[WireGuardPeer]\nAllowedIPs=nope\n").expect("parse");
        assert!(peer_allowed_ips(&artifact).is_err());
    }
}
