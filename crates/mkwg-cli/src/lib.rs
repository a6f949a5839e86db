//! # mkwg-cli
//!
//! The `mkwg` command: creates `WireGuard` networks and peers as
//! systemd-networkd artifacts.
//!
//! ```text
//! mkwg init  ──> 99-wg0.netdev, 99-wg0.network
//! mkwg add   ──> 99-wg0.netdev.d/peer-<name>.conf, client config on stdout
//! ```
//!
//! Diagnostics go to stderr through `tracing`, so stdout can be redirected
//! straight into the client's configuration file.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::{AddArgs, Cli, Commands, InitArgs};
pub use commands::execute;
pub use error::CliError;
