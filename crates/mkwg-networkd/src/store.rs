//! Artifact persistence.

use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{AccessFlags, Gid, Group, Uid, User};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::error::{NetworkdError, Result};

/// Owner read/write, group read.
const FILE_MODE: u32 = 0o640;
const DIR_MODE: u32 = 0o755;

/// Reads and writes artifacts.
///
/// Writes must never expose a partially written artifact to a concurrent
/// [`ArtifactStore::list_artifacts`].
#[allow(async_fn_in_trait)]
pub trait ArtifactStore {
    /// Fails with [`NetworkdError::PermissionDenied`] unless `dir` is writable.
    fn check_writable(&self, dir: &Path) -> Result<()>;

    /// Returns true if `path` exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Reads and parses an artifact.
    async fn read_artifact(&self, path: &Path) -> Result<Artifact>;

    /// Writes an artifact, replacing any previous content.
    async fn write_artifact(&self, path: &Path, artifact: &Artifact) -> Result<()>;

    /// Lists the `*.conf` artifacts in `dir`, sorted by path.
    ///
    /// Hidden files are skipped. A missing directory lists as empty.
    async fn list_artifacts(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Creates `dir` and its parents. Returns true if it had to be created.
    async fn ensure_dir(&self, dir: &Path) -> Result<bool>;
}

/// Owner and group applied to every written artifact.
///
/// systemd-networkd reads `.netdev` files holding private keys, so they are
/// written `root:systemd-network` with mode `0640` by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOwnership {
    /// User name, or `None` to leave the owner unchanged.
    pub user: Option<String>,
    /// Group name, or `None` to leave the group unchanged.
    pub group: Option<String>,
}

impl FileOwnership {
    /// Default owning user.
    pub const DEFAULT_USER: &'static str = "root";
    /// Default owning group.
    pub const DEFAULT_GROUP: &'static str = "systemd-network";

    /// Creates an ownership setting.
    pub fn new(user: Option<String>, group: Option<String>) -> Self {
        Self { user, group }
    }

    /// Leaves owner and group as the creating process sets them.
    pub fn unchanged() -> Self {
        Self::new(None, None)
    }

    fn resolve(&self) -> Result<(Option<Uid>, Option<Gid>)> {
        let uid = match &self.user {
            Some(name) => Some(
                User::from_name(name)
                    .ok()
                    .flatten()
                    .ok_or_else(|| NetworkdError::UnknownOwner {
                        kind: "user",
                        name: name.clone(),
                    })?
                    .uid,
            ),
            None => None,
        };
        let gid = match &self.group {
            Some(name) => Some(
                Group::from_name(name)
                    .ok()
                    .flatten()
                    .ok_or_else(|| NetworkdError::UnknownOwner {
                        kind: "group",
                        name: name.clone(),
                    })?
                    .gid,
            ),
            None => None,
        };
        Ok((uid, gid))
    }
}

impl Default for FileOwnership {
    fn default() -> Self {
        Self::new(
            Some(Self::DEFAULT_USER.to_string()),
            Some(Self::DEFAULT_GROUP.to_string()),
        )
    }
}

/// [`ArtifactStore`] on the local filesystem.
///
/// Each write goes to a hidden sibling temp file that is synced, chmod-ed,
/// chown-ed and then renamed over the target.
#[derive(Debug, Clone, Default)]
pub struct FsArtifactStore {
    ownership: FileOwnership,
}

impl FsArtifactStore {
    /// Creates a store applying `ownership` to written artifacts.
    pub fn new(ownership: FileOwnership) -> Self {
        Self { ownership }
    }

    fn temp_path(path: &Path) -> Result<PathBuf> {
        let name = path.file_name().ok_or_else(|| {
            NetworkdError::io(
                path,
                std::io::Error::new(ErrorKind::InvalidInput, "artifact path has no file name"),
            )
        })?;
        let mut temp = std::ffi::OsString::from(".");
        temp.push(name);
        temp.push(".tmp");
        Ok(path.with_file_name(temp))
    }

    async fn write_temp(&self, temp: &Path, contents: &[u8]) -> Result<()> {
        let (uid, gid) = self.ownership.resolve()?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(temp)
            .await
            .map_err(|e| NetworkdError::io(temp, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| NetworkdError::io(temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| NetworkdError::io(temp, e))?;
        drop(file);

        // The umask may have narrowed the creation mode.
        fs::set_permissions(temp, std::fs::Permissions::from_mode(FILE_MODE))
            .await
            .map_err(|e| NetworkdError::io(temp, e))?;

        if uid.is_some() || gid.is_some() {
            nix::unistd::chown(temp, uid, gid).map_err(|e| NetworkdError::io(temp, e.into()))?;
        }
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn check_writable(&self, dir: &Path) -> Result<()> {
        nix::unistd::access(dir, AccessFlags::W_OK).map_err(|_| NetworkdError::PermissionDenied {
            path: dir.to_path_buf(),
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path)
            .await
            .map_err(|e| NetworkdError::io(path, e))
    }

    async fn read_artifact(&self, path: &Path) -> Result<Artifact> {
        let text = fs::read_to_string(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => NetworkdError::NotFound {
                path: path.to_path_buf(),
            },
            _ => NetworkdError::io(path, e),
        })?;
        Artifact::parse(&text).map_err(|e| NetworkdError::InvalidArtifact {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    async fn write_artifact(&self, path: &Path, artifact: &Artifact) -> Result<()> {
        let temp = Self::temp_path(path)?;
        if let Err(e) = self.write_temp(&temp, artifact.render().as_bytes()).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp, path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(NetworkdError::io(path, e));
        }
        debug!(path = %path.display(), "wrote artifact");
        Ok(())
    }

    async fn list_artifacts(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(NetworkdError::io(dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| NetworkdError::io(dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| NetworkdError::io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(".conf") {
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<bool> {
        if self.exists(dir).await? {
            return Ok(false);
        }
        fs::DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(dir)
            .await
            .map_err(|e| NetworkdError::io(dir, e))?;
        info!(path = %dir.display(), "created drop-in directory");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Section;

    fn store() -> FsArtifactStore {
        FsArtifactStore::new(FileOwnership::unchanged())
    }

    fn peer(ip: &str) -> Artifact {
        Artifact::new().with_section(Section::new("WireGuardPeer").entry("AllowedIPs", ip))
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("peer-a.conf");
        store().write_artifact(&path, &peer("10.0.0.2/32")).await.expect("write");

        let read = store().read_artifact(&path).await.expect("read");
        assert_eq!(read, peer("10.0.0.2/32"));
        assert!(!dir.path().join(".peer-a.conf.tmp").exists());
    }

    #[tokio::test]
    async fn written_artifacts_are_group_readable_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("99-wg0.netdev");
        store().write_artifact(&path, &peer("10.0.0.2/32")).await.expect("write");

        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("peer-a.conf");
        store().write_artifact(&path, &peer("10.0.0.2/32")).await.expect("write");
        store().write_artifact(&path, &peer("10.0.0.3/32")).await.expect("overwrite");

        let read = store().read_artifact(&path).await.expect("read");
        assert_eq!(read.get("WireGuardPeer", "AllowedIPs"), Some("10.0.0.3/32"));
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = store()
            .read_artifact(&dir.path().join("99-wg9.netdev"))
            .await
            .expect_err("missing");
        assert!(matches!(err, NetworkdError::NotFound { .. }));
    }

    #[tokio::test]
    async fn read_garbage_is_invalid_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("99-wg0.network");
        std::fs::write(&path, "not an ini file\n").expect("write");
        let err = store().read_artifact(&path).await.expect_err("garbage");
        assert!(matches!(err, NetworkdError::InvalidArtifact { .. }));
    }

    #[tokio::test]
    async fn list_skips_hidden_and_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("peer-b.conf"), "").expect("write");
        std::fs::write(dir.path().join("peer-a.conf"), "").expect("write");
        std::fs::write(dir.path().join(".peer-c.conf.tmp"), "").expect("write");
        std::fs::write(dir.path().join(".hidden.conf"), "").expect("write");
        std::fs::write(dir.path().join("README"), "").expect("write");
        std::fs::create_dir(dir.path().join("sub.conf")).expect("mkdir");

        let listed = store().list_artifacts(dir.path()).await.expect("list");
        let names: Vec<_> = listed
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, ["peer-a.conf", "peer-b.conf"]);
    }

    #[tokio::test]
    async fn list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let listed = store()
            .list_artifacts(&dir.path().join("absent"))
            .await
            .expect("list");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("99-wg0.netdev.d");
        assert!(store().ensure_dir(&target).await.expect("create"));
        assert!(!store().ensure_dir(&target).await.expect("exists"));

        let mode = std::fs::metadata(&target).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o755 & !current_umask());
    }

    fn current_umask() -> u32 {
        let mask = nix::sys::stat::umask(nix::sys::stat::Mode::empty());
        nix::sys::stat::umask(mask);
        mask.bits()
    }

    #[test]
    fn writable_tempdir_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        store().check_writable(dir.path()).expect("writable");
    }

    #[test]
    fn missing_dir_is_permission_denied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = store()
            .check_writable(&dir.path().join("absent"))
            .expect_err("missing");
        assert!(matches!(err, NetworkdError::PermissionDenied { .. }));
        assert!(err.to_string().contains("not writeable"));
    }

    #[tokio::test]
    async fn unknown_group_is_reported_and_leaves_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("peer-a.conf");
        let store = FsArtifactStore::new(FileOwnership::new(
            None,
            Some("mkwg-no-such-group".to_string()),
        ));
        let err = store
            .write_artifact(&path, &peer("10.0.0.2/32"))
            .await
            .expect_err("unknown group");
        assert!(matches!(err, NetworkdError::UnknownOwner { kind: "group", .. }));
        assert!(!path.exists());
        assert!(!dir.path().join(".peer-a.conf.tmp").exists());
    }
}
