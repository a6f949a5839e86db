//! CLI error types.

use std::fmt;

use mkwg_networkd::NetworkdError;
use mkwg_provision::ProvisionError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Provisioning failed.
    Provision(ProvisionError),
    /// The async runtime could not start.
    Runtime(std::io::Error),
    /// Writing the output failed.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision(e) => write!(f, "{e}"),
            Self::Runtime(e) => write!(f, "failed to create async runtime: {e}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provision(e) => Some(e),
            Self::Runtime(e) | Self::Io(e) => Some(e),
        }
    }
}

impl From<ProvisionError> for CliError {
    fn from(err: ProvisionError) -> Self {
        Self::Provision(err)
    }
}

impl From<NetworkdError> for CliError {
    fn from(err: NetworkdError) -> Self {
        Self::Provision(err.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
