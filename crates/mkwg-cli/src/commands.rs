//! Command execution.

use std::io::Write;

use mkwg_keys::OsKeyProvider;
use mkwg_networkd::{
    units, FileOwnership, FsArtifactStore, HttpAddressDiscovery, NetworkdLayout, Networkctl,
};
use mkwg_provision::{AddPeerOptions, InitOptions, ProvisioningWorkflow};
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

type HostWorkflow = ProvisioningWorkflow<FsArtifactStore, Networkctl, HttpAddressDiscovery>;

fn workflow(cli: &Cli) -> Result<HostWorkflow, CliError> {
    let ownership = FileOwnership::new(Some(cli.owner.clone()), Some(cli.group.clone()));
    Ok(ProvisioningWorkflow::new(
        NetworkdLayout::new(&cli.directory),
        FsArtifactStore::new(ownership),
        Networkctl::new(),
        HttpAddressDiscovery::new(&cli.discovery_url)?,
        OsKeyProvider::new(),
    ))
}

/// Runs the parsed command. The client configuration of `add` is written to
/// `out`.
pub async fn execute(cli: Cli, out: &mut impl Write) -> Result<(), CliError> {
    let workflow = workflow(&cli)?;

    match cli.command {
        Commands::Init(args) => {
            let options = InitOptions {
                interface: args.interface,
                listen_port: args.port,
                cidr: args.network,
                force: args.force,
            };
            let descriptor = workflow.init_network(&options).await?;
            info!(
                interface = %descriptor.interface_name(),
                public_key = %descriptor.server_public_key(),
                "network ready"
            );
        }
        Commands::Add(args) => {
            let options = AddPeerOptions {
                interface: args.interface,
                address: args.address,
                force: args.force,
                name: args.name,
                endpoint: args.endpoint,
            };
            let provisioned = workflow.add_peer(&options).await?;
            out.write_all(units::client_artifact(&provisioned.client).render().as_bytes())?;
            out.flush()?;
        }
    }

    Ok(())
}
