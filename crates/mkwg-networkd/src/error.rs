//! Error types for host-facing operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for networkd operations.
pub type Result<T> = std::result::Result<T, NetworkdError>;

/// Errors that can occur while reading/writing artifacts or calling host tools.
#[derive(Debug, Error)]
pub enum NetworkdError {
    /// Malformed artifact text.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// An artifact could not be parsed.
    #[error("invalid artifact {}: {message}", path.display())]
    InvalidArtifact {
        /// The artifact path.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },

    /// An artifact lacks a required key.
    #[error("missing {key} in [{section}]")]
    MissingKey {
        /// Section name.
        section: String,
        /// Key name.
        key: String,
    },

    /// An artifact key holds an unusable value.
    #[error("invalid {key} in [{section}]: {message}")]
    InvalidValue {
        /// Section name.
        section: String,
        /// Key name.
        key: String,
        /// What was wrong.
        message: String,
    },

    /// An artifact does not exist.
    #[error("{} does not exist", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A directory is not writable by this process.
    #[error("the directory {} is not writeable (try sudo?)", path.display())]
    PermissionDenied {
        /// The directory.
        path: PathBuf,
    },

    /// A user or group name does not exist on this host.
    #[error("unknown {kind} {name}")]
    UnknownOwner {
        /// `user` or `group`.
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// An external tool failed.
    #[error("{tool} failed: {message}")]
    ExternalTool {
        /// The tool invocation, e.g. `networkctl reload`.
        tool: String,
        /// Exit status or stderr.
        message: String,
    },

    /// The public address could not be discovered.
    #[error("public address discovery failed: {0}")]
    Discovery(String),

    /// Filesystem error.
    #[error("{}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl NetworkdError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
