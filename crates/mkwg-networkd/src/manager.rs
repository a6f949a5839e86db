//! The network manager: `networkctl` and an in-memory stand-in.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::artifact::Artifact;
use crate::error::{NetworkdError, Result};

/// Talks to the service that applies networkd artifacts.
#[allow(async_fn_in_trait)]
pub trait NetworkManager {
    /// Asks the manager to re-read its configuration directory.
    async fn reload(&self) -> Result<()>;

    /// Names of the interfaces the manager currently knows about.
    async fn list_interfaces(&self) -> Result<BTreeSet<String>>;
}

/// Output of `networkctl list --json short`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LinkList {
    #[serde(default)]
    interfaces: Vec<Link>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Link {
    name: String,
}

/// [`NetworkManager`] backed by the `networkctl` binary.
#[derive(Debug, Clone)]
pub struct Networkctl {
    program: PathBuf,
}

impl Networkctl {
    /// Default binary, resolved through `PATH`.
    pub const DEFAULT_PROGRAM: &'static str = "networkctl";

    /// Uses `networkctl` from `PATH`.
    pub fn new() -> Self {
        Self::with_program(Self::DEFAULT_PROGRAM)
    }

    /// Uses a specific binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let tool = format!("networkctl {}", args.join(" "));
        debug!(%tool, "running");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NetworkdError::ExternalTool {
                tool: tool.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NetworkdError::ExternalTool {
                tool,
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(output.stdout)
    }
}

impl Default for Networkctl {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkManager for Networkctl {
    async fn reload(&self) -> Result<()> {
        self.run(&["reload"]).await.map(drop)
    }

    async fn list_interfaces(&self) -> Result<BTreeSet<String>> {
        let stdout = self.run(&["list", "--json", "short"]).await?;
        let list: LinkList =
            serde_json::from_slice(&stdout).map_err(|e| NetworkdError::ExternalTool {
                tool: "networkctl list".to_string(),
                message: format!("failed to parse output: {e}"),
            })?;
        Ok(list.interfaces.into_iter().map(|link| link.name).collect())
    }
}

#[derive(Debug, Default)]
struct FakeState {
    interfaces: BTreeSet<String>,
    reloads: usize,
    fail_reload: bool,
    fail_list: bool,
}

/// In-memory [`NetworkManager`] for tests.
///
/// Clones share state. When built with [`FakeNetworkManager::watching`],
/// every successful reload picks up the interfaces declared by the
/// `*.netdev` files in that directory, the way networkd would.
#[derive(Debug, Clone, Default)]
pub struct FakeNetworkManager {
    state: Arc<Mutex<FakeState>>,
    watch_dir: Option<PathBuf>,
}

impl FakeNetworkManager {
    /// A manager with no interfaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager that learns interfaces from the netdev files in `dir`.
    pub fn watching(dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::default(),
            watch_dir: Some(dir.into()),
        }
    }

    /// Adds a known interface.
    #[must_use]
    pub fn with_interface(self, name: impl Into<String>) -> Self {
        self.state.lock().interfaces.insert(name.into());
        self
    }

    /// Makes subsequent reloads fail.
    pub fn set_fail_reload(&self, fail: bool) {
        self.state.lock().fail_reload = fail;
    }

    /// Makes subsequent listings fail.
    pub fn set_fail_list(&self, fail: bool) {
        self.state.lock().fail_list = fail;
    }

    /// Number of reloads requested so far, including failed ones.
    pub fn reload_count(&self) -> usize {
        self.state.lock().reloads
    }

    fn scan_netdevs(&self) -> BTreeSet<String> {
        let Some(dir) = &self.watch_dir else {
            return BTreeSet::new();
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return BTreeSet::new();
        };
        entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "netdev"))
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .filter_map(|text| Artifact::parse(&text).ok())
            .filter_map(|netdev| netdev.get("NetDev", "Name").map(str::to_string))
            .collect()
    }
}

impl NetworkManager for FakeNetworkManager {
    async fn reload(&self) -> Result<()> {
        let discovered = self.scan_netdevs();
        let mut state = self.state.lock();
        state.reloads += 1;
        if state.fail_reload {
            return Err(NetworkdError::ExternalTool {
                tool: "networkctl reload".to_string(),
                message: "simulated failure".to_string(),
            });
        }
        state.interfaces.extend(discovered);
        Ok(())
    }

    async fn list_interfaces(&self) -> Result<BTreeSet<String>> {
        let state = self.state.lock();
        if state.fail_list {
            return Err(NetworkdError::ExternalTool {
                tool: "networkctl list".to_string(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(state.interfaces.clone())
    }
}
