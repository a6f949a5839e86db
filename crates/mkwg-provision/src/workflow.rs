//! `init` and `add`: the provisioning state machines.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnet::IpNet;
use mkwg_keys::{KeyProvider, OsKeyProvider};
use mkwg_network::{
    AddressAllocator, ClientConfig, Endpoint, InterfaceName, NetworkDescriptor, PeerName,
    PeerRecord,
};
use mkwg_networkd::{
    units, AddressDiscovery, ArtifactStore, NetworkManager, NetworkdError, NetworkdLayout,
};
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};

/// Stages of [`ProvisioningWorkflow::init_network`], in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Checking the CIDR and directory access.
    Validating,
    /// Reloading the network manager before the conflict check.
    PreReload,
    /// Looking for an existing interface of the same name.
    CheckingConflict,
    /// Generating the server key and address.
    Generating,
    /// Writing the device and interface artifacts.
    PersistRequested,
    /// Reloading the network manager after the writes.
    PostReload,
    /// Finished.
    Done,
}

/// Stages of [`ProvisioningWorkflow::add_peer`], in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPeerStage {
    /// Checking directory access.
    Validating,
    /// Reading the network's artifacts.
    LoadingNetwork,
    /// Reading the existing peer drop-ins.
    EnumeratingPeers,
    /// Choosing the peer address.
    Allocating,
    /// Generating the peer keys.
    Generating,
    /// Working out the endpoint for the client.
    ResolvingEndpoint,
    /// Writing the peer drop-in and reloading.
    PersistRequested,
    /// Finished.
    Done,
}

/// Arguments of [`ProvisioningWorkflow::init_network`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// Interface to create.
    pub interface: InterfaceName,
    /// UDP listen port.
    pub listen_port: u16,
    /// Private network block.
    pub cidr: IpNet,
    /// Overwrite an existing interface.
    pub force: bool,
}

impl InitOptions {
    /// Options without `force`.
    pub fn new(interface: InterfaceName, listen_port: u16, cidr: IpNet) -> Self {
        Self {
            interface,
            listen_port,
            cidr,
            force: false,
        }
    }
}

/// Arguments of [`ProvisioningWorkflow::add_peer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPeerOptions {
    /// Interface of the network to add to.
    pub interface: InterfaceName,
    /// Explicit peer address, a bare host or `/32`/`/128`.
    pub address: Option<IpNet>,
    /// Overwrite a peer of the same name.
    pub force: bool,
    /// Peer name. Defaults to the URL-safe encoding of the public key.
    pub name: Option<PeerName>,
    /// Endpoint for the client. Discovered when absent.
    pub endpoint: Option<Endpoint>,
}

impl AddPeerOptions {
    /// Options with every optional field unset.
    pub fn new(interface: InterfaceName) -> Self {
        Self {
            interface,
            address: None,
            force: false,
            name: None,
            endpoint: None,
        }
    }
}

/// Result of [`ProvisioningWorkflow::add_peer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerProvisioned {
    /// What was written on the server side.
    pub record: PeerRecord,
    /// What the client needs. Holds the only copy of the peer private key.
    pub client: ClientConfig,
}

/// A peer drop-in found on disk.
#[derive(Debug)]
struct ExistingPeer {
    path: PathBuf,
    allowed_ips: Vec<IpNet>,
}

/// Provisions networks and peers.
///
/// Every operation runs start to finish on one control path. Nothing is
/// locked, see [`Self::add_peer`].
#[derive(Debug, Clone)]
pub struct ProvisioningWorkflow<S, M, D, K = OsKeyProvider> {
    layout: NetworkdLayout,
    store: S,
    manager: M,
    discovery: D,
    keys: K,
}

impl<S, M, D, K> ProvisioningWorkflow<S, M, D, K>
where
    S: ArtifactStore,
    M: NetworkManager,
    D: AddressDiscovery,
    K: KeyProvider,
{
    /// Creates a workflow operating on the artifacts under `layout`.
    pub fn new(layout: NetworkdLayout, store: S, manager: M, discovery: D, keys: K) -> Self {
        Self {
            layout,
            store,
            manager,
            discovery,
            keys,
        }
    }

    /// The artifact layout in use.
    pub fn layout(&self) -> &NetworkdLayout {
        &self.layout
    }

    /// Creates a network: a server key, the server address and the device and
    /// interface artifacts.
    ///
    /// Fails with [`ProvisionError::InterfaceExists`] when the manager already
    /// knows the interface or its device artifact exists, unless
    /// `options.force` is set. Nothing is written on any failure before
    /// [`InitStage::PersistRequested`]. A failure between the two writes
    /// leaves the device artifact behind.
    pub async fn init_network(&self, options: &InitOptions) -> Result<NetworkDescriptor> {
        let interface = &options.interface;

        init_stage(interface, InitStage::Validating);
        let allocator = AddressAllocator::new(options.cidr)?;
        self.store.check_writable(self.layout.root())?;

        init_stage(interface, InitStage::PreReload);
        self.manager.reload().await?;

        init_stage(interface, InitStage::CheckingConflict);
        let netdev_path = self.layout.netdev_path(interface);
        let known = self.manager.list_interfaces().await?;
        let conflict = known.contains(interface.as_str()) || self.store.exists(&netdev_path).await?;
        if conflict {
            if !options.force {
                return Err(ProvisionError::InterfaceExists {
                    interface: interface.to_string(),
                });
            }
            warn!(interface = %interface, "overwriting existing interface");
        }

        init_stage(interface, InitStage::Generating);
        let private_key = self.keys.generate_private_key();
        let descriptor = NetworkDescriptor::new(
            interface.clone(),
            options.listen_port,
            allocator.cidr(),
            private_key,
        )?;

        init_stage(interface, InitStage::PersistRequested);
        self.store
            .write_artifact(&netdev_path, &units::netdev_artifact(&descriptor))
            .await?;
        info!(interface = %interface, path = %netdev_path.display(), "created device");

        let network_path = self.layout.network_path(interface);
        self.store
            .write_artifact(&network_path, &units::network_artifact(&descriptor))
            .await?;
        info!(
            interface = %interface,
            address = %descriptor.server_interface(),
            path = %network_path.display(),
            "created interface"
        );

        init_stage(interface, InitStage::PostReload);
        self.reload_best_effort().await;

        init_stage(interface, InitStage::Done);
        Ok(descriptor)
    }

    /// Adds a peer to an existing network and returns its client
    /// configuration.
    ///
    /// Without an explicit address the peer gets one past the highest
    /// address in use. Addresses of removed peers are never handed out again.
    ///
    /// # Concurrency
    ///
    /// Two calls against the same network can race: both may read the same
    /// highest address and write peers with the same allocation. Run at most
    /// one provisioning operation per host at a time.
    ///
    /// The endpoint is resolved before the drop-in is written, so
    /// [`ProvisionError::EndpointDiscoveryFailed`] leaves every existing peer
    /// untouched, including one that `force` would have replaced.
    pub async fn add_peer(&self, options: &AddPeerOptions) -> Result<PeerProvisioned> {
        let interface = &options.interface;

        add_stage(interface, AddPeerStage::Validating);
        self.store.check_writable(self.layout.root())?;

        add_stage(interface, AddPeerStage::LoadingNetwork);
        let descriptor = self.load_network(interface).await?;
        let peer_dir = self.layout.peer_dir(interface);
        self.store.ensure_dir(&peer_dir).await?;

        add_stage(interface, AddPeerStage::EnumeratingPeers);
        let mut existing = self.enumerate_peers(&peer_dir).await?;
        if let Some(name) = &options.name {
            self.claim_peer_path(interface, name, options.force, &mut existing)
                .await?;
        }

        add_stage(interface, AddPeerStage::Allocating);
        let allocator = descriptor.allocator()?;
        let address = match options.address {
            Some(requested) => check_requested_address(&allocator, requested, &existing)?,
            None => allocator.next_peer_address(
                existing
                    .iter()
                    .flat_map(|peer| peer.allowed_ips.iter().map(IpNet::broadcast)),
            )?,
        };

        add_stage(interface, AddPeerStage::Generating);
        let private_key = self.keys.generate_private_key();
        let public_key = self.keys.derive_public_key(&private_key);
        let preshared_key = self.keys.generate_preshared_key();
        let server_public_key = self.keys.derive_public_key(descriptor.server_private_key());
        let name = match &options.name {
            Some(name) => name.clone(),
            None => {
                let name = PeerName::from_public_key(&public_key);
                self.claim_peer_path(interface, &name, options.force, &mut existing)
                    .await?;
                name
            }
        };
        let record = PeerRecord {
            name,
            public_key,
            preshared_key,
            allowed_address: address,
        };

        add_stage(interface, AddPeerStage::ResolvingEndpoint);
        let endpoint = match &options.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let ip = self.discovery.discover_public_ip().await?;
                Endpoint::from_ip_port(ip, descriptor.listen_port())
            }
        };

        add_stage(interface, AddPeerStage::PersistRequested);
        let peer_path = self.layout.peer_path(interface, &record.name);
        self.store
            .write_artifact(&peer_path, &units::peer_artifact(&record))
            .await?;
        info!(
            interface = %interface,
            peer = %record.name,
            address = %record.allowed_network(),
            "created peer"
        );
        self.reload_best_effort().await;

        let client = ClientConfig {
            private_key,
            address,
            server_public_key,
            preshared_key: record.preshared_key.clone(),
            allowed_network: descriptor.cidr(),
            endpoint,
        };

        add_stage(interface, AddPeerStage::Done);
        Ok(PeerProvisioned { record, client })
    }

    /// Reads the device and interface artifacts back into a descriptor.
    async fn load_network(&self, interface: &InterfaceName) -> Result<NetworkDescriptor> {
        let not_found = |e: NetworkdError| ProvisionError::NetworkNotFound {
            interface: interface.to_string(),
            reason: e.to_string(),
        };
        let netdev = self
            .store
            .read_artifact(&self.layout.netdev_path(interface))
            .await
            .map_err(not_found)?;
        let network = self
            .store
            .read_artifact(&self.layout.network_path(interface))
            .await
            .map_err(not_found)?;
        units::descriptor_from_artifacts(&netdev, &network).map_err(not_found)
    }

    async fn enumerate_peers(&self, peer_dir: &Path) -> Result<Vec<ExistingPeer>> {
        let mut peers = Vec::new();
        for path in self.store.list_artifacts(peer_dir).await? {
            let artifact = self.store.read_artifact(&path).await?;
            let allowed_ips = units::peer_allowed_ips(&artifact).map_err(|e| {
                ProvisionError::InvalidConfiguration(format!("{}: {e}", path.display()))
            })?;
            peers.push(ExistingPeer { path, allowed_ips });
        }
        debug!(count = peers.len(), dir = %peer_dir.display(), "enumerated peers");
        Ok(peers)
    }

    /// Fails if the peer's drop-in exists, unless `force` is set, in which
    /// case the old peer stops counting as existing.
    async fn claim_peer_path(
        &self,
        interface: &InterfaceName,
        name: &PeerName,
        force: bool,
        existing: &mut Vec<ExistingPeer>,
    ) -> Result<()> {
        let path = self.layout.peer_path(interface, name);
        if !self.store.exists(&path).await? {
            return Ok(());
        }
        if !force {
            return Err(ProvisionError::PeerExists {
                name: name.to_string(),
            });
        }
        warn!(interface = %interface, peer = %name, "overwriting existing peer");
        existing.retain(|peer| peer.path != path);
        Ok(())
    }

    async fn reload_best_effort(&self) {
        match self.manager.reload().await {
            Ok(()) => info!("reloaded network manager"),
            Err(e) => warn!(error = %e, "network manager reload failed"),
        }
    }
}

fn init_stage(interface: &InterfaceName, stage: InitStage) {
    debug!(interface = %interface, ?stage, "init");
}

fn add_stage(interface: &InterfaceName, stage: AddPeerStage) {
    debug!(interface = %interface, ?stage, "add peer");
}

/// Validates an explicitly requested peer address.
fn check_requested_address(
    allocator: &AddressAllocator,
    requested: IpNet,
    existing: &[ExistingPeer],
) -> Result<IpAddr> {
    let invalid = ProvisionError::InvalidConfiguration;
    let address = requested.addr();

    if requested.prefix_len() != requested.max_prefix_len() {
        return Err(invalid(format!("peer address {requested} is not a single host")));
    }
    if !allocator.is_host(address) {
        return Err(invalid(format!(
            "peer address {address} is not a host of {}",
            allocator.cidr()
        )));
    }
    if address == allocator.server_address() {
        return Err(invalid(format!("peer address {address} is the server address")));
    }
    if let Some(peer) = existing
        .iter()
        .find(|peer| peer.allowed_ips.iter().any(|net| net.contains(&address)))
    {
        let owner = NetworkdLayout::peer_name(&peer.path).unwrap_or("another peer");
        return Err(invalid(format!("peer address {address} is already used by {owner}")));
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn allocator() -> AddressAllocator {
        AddressAllocator::new("172.17.2.0/24".parse().expect("cidr")).expect("allocator")
    }

    fn peer(path: &str, ips: &[&str]) -> ExistingPeer {
        ExistingPeer {
            path: PathBuf::from(path),
            allowed_ips: ips.iter().map(|ip| ip.parse().expect("net")).collect(),
        }
    }

    #[test_case("172.17.2.9/32", "172.17.2.9" ; "free host")]
    #[test_case("172.17.2.254/32", "172.17.2.254" ; "last host")]
    fn accepts_free_host(requested: &str, expected: &str) {
        let existing = [peer("peer-a.conf", &["172.17.2.2/32"])];
        let address =
            check_requested_address(&allocator(), requested.parse().expect("net"), &existing)
                .expect("accepted");
        assert_eq!(address, expected.parse::<IpAddr>().expect("ip"));
    }

    #[test_case("172.17.2.8/29" ; "not a host")]
    #[test_case("172.17.3.5/32" ; "outside network")]
    #[test_case("172.17.2.255/32" ; "broadcast")]
    #[test_case("172.17.2.1/32" ; "server")]
    #[test_case("172.17.2.2/32" ; "taken")]
    #[test_case("172.17.2.20/32" ; "inside wide peer")]
    fn rejects_bad_request(requested: &str) {
        let existing = [
            peer("peer-a.conf", &["172.17.2.2/32"]),
            peer("peer-b.conf", &["172.17.2.16/28"]),
        ];
        let err = check_requested_address(&allocator(), requested.parse().expect("net"), &existing)
            .expect_err("rejected");
        assert!(matches!(err, ProvisionError::InvalidConfiguration(_)));
    }

    #[test]
    fn options_default_to_unset() {
        let wg0 = InterfaceName::new("wg0").expect("name");
        let options = AddPeerOptions::new(wg0.clone());
        assert!(options.address.is_none() && options.name.is_none() && !options.force);

        let init = InitOptions::new(wg0, 51820, "10.0.0.0/24".parse().expect("cidr"));
        assert!(!init.force);
    }
}
