//! Command-line argument parsing with clap.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ipnet::IpNet;
use mkwg_network::{Endpoint, InterfaceName, PeerName};

/// Provision `WireGuard` networks and peers for systemd-networkd.
#[derive(Parser, Debug, Clone)]
#[command(name = "mkwg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// systemd-networkd configuration directory.
    #[arg(
        short = 'C',
        long,
        env = "MKWG_DIRECTORY",
        default_value = "/etc/systemd/network"
    )]
    pub directory: PathBuf,

    /// Owner of written files.
    #[arg(long, env = "MKWG_OWNER", default_value = "root")]
    pub owner: String,

    /// Group of written files.
    #[arg(long, env = "MKWG_GROUP", default_value = "systemd-network")]
    pub group: String,

    /// Service that echoes the caller's public address.
    #[arg(long, env = "MKWG_DISCOVERY_URL", default_value = "http://icanhazip.com/")]
    pub discovery_url: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a new WireGuard network.
    Init(InitArgs),

    /// Add a peer and print its configuration.
    Add(AddArgs),
}

/// Arguments for `init`.
#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Interface name.
    #[arg(short, long, default_value = "wg0")]
    pub interface: InterfaceName,

    /// UDP listen port.
    #[arg(short, long, default_value_t = 51820)]
    pub port: u16,

    /// Private network block.
    #[arg(short = 'n', long, default_value = "172.17.2.0/24")]
    pub network: IpNet,

    /// Overwrite an existing interface.
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for `add`.
#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Interface name of the network.
    #[arg(short, long, default_value = "wg0")]
    pub interface: InterfaceName,

    /// Peer address instead of the next free one.
    #[arg(short = 'n', long = "network", visible_alias = "address", value_parser = parse_host)]
    pub address: Option<IpNet>,

    /// Overwrite a peer of the same name.
    #[arg(short, long)]
    pub force: bool,

    /// Peer name. Defaults to the peer's public key.
    #[arg(short = 'N', long)]
    pub name: Option<PeerName>,

    /// Endpoint for the client. Defaults to this host's public address.
    #[arg(short, long)]
    pub endpoint: Option<Endpoint>,
}

/// Accepts `10.0.0.5`, `10.0.0.5/32` or `fd00::5/128`.
fn parse_host(s: &str) -> Result<IpNet, String> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Ok(net);
    }
    s.parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| format!("{s:?} is not an address"))
}
