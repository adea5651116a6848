//! Ownership and mode resolution for processed files
//!
//! The target ownership of a result is derived from the source file and then
//! overridden per field by the configuration. Owner ids are `Option<u32>`:
//! `None` in [`FileOwnership`] means the platform has no owner concept, while
//! `None` in [`PermissionOverrides`] means "keep the source's value".

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Owner and mode bits as read from the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOwnership {
    /// `None` if the platform does not report an owner
    pub uid: Option<u32>,
    /// `None` if the platform does not report an owner
    pub gid: Option<u32>,
    /// Permission bits (`0o7777` mask)
    pub mode: u32,
}

/// Per-field overrides from the configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionOverrides {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: Option<u32>,
}

impl PermissionOverrides {
    /// Build from raw config values: negative ids and a zero mode mean no override
    pub fn from_raw(uid: i64, gid: i64, mode: u32) -> Result<Self> {
        Ok(Self {
            uid: raw_id("uid", uid)?,
            gid: raw_id("gid", gid)?,
            mode: (mode != 0).then_some(mode & 0o7777),
        })
    }
}

fn raw_id(name: &str, value: i64) -> Result<Option<u32>> {
    if value < 0 {
        return Ok(None);
    }
    u32::try_from(value)
        .map(Some)
        .map_err(|_| Error::config(format!("{} {} is out of range", name, value)))
}

impl fmt::Display for PermissionOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_source(value: Option<String>) -> String {
            value.unwrap_or_else(|| "source".to_string())
        }
        write!(
            f,
            "uid={} gid={} mode={}",
            or_source(self.uid.map(|v| v.to_string())),
            or_source(self.gid.map(|v| v.to_string())),
            or_source(self.mode.map(|v| format!("{:04o}", v))),
        )
    }
}

/// Ownership and mode to apply to an output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetPermissions {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mode: u32,
}

impl TargetPermissions {
    /// Blend a source file's ownership with the configured overrides
    pub fn blend(source: FileOwnership, overrides: &PermissionOverrides) -> Self {
        Self {
            uid: overrides.uid.or(source.uid),
            gid: overrides.gid.or(source.gid),
            mode: overrides.mode.unwrap_or(source.mode),
        }
    }
}

/// Filesystem capability to read and change owner and mode
#[cfg_attr(test, mockall::automock)]
pub trait OwnershipOps: Send + Sync {
    /// Read the current owner and permission bits of `path`
    fn stat_owner_mode(&self, path: &Path) -> std::io::Result<FileOwnership>;

    /// Change owner; a `None` id is left unchanged
    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> std::io::Result<()>;

    /// Change permission bits
    fn chmod(&self, path: &Path, mode: u32) -> std::io::Result<()>;
}

/// [`OwnershipOps`] backed by the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOwnership;

#[cfg(unix)]
impl OwnershipOps for SystemOwnership {
    fn stat_owner_mode(&self, path: &Path) -> std::io::Result<FileOwnership> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path)?;
        Ok(FileOwnership {
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
            mode: meta.mode() & 0o7777,
        })
    }

    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> std::io::Result<()> {
        std::os::unix::fs::chown(path, uid, gid)
    }

    fn chmod(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
}

#[cfg(not(unix))]
impl OwnershipOps for SystemOwnership {
    fn stat_owner_mode(&self, path: &Path) -> std::io::Result<FileOwnership> {
        let meta = std::fs::metadata(path)?;
        let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };
        Ok(FileOwnership {
            uid: None,
            gid: None,
            mode,
        })
    }

    fn chown(&self, _path: &Path, uid: Option<u32>, gid: Option<u32>) -> std::io::Result<()> {
        if uid.is_none() && gid.is_none() {
            return Ok(());
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "file ownership is not supported on this platform",
        ))
    }

    fn chmod(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        let mut permissions = std::fs::metadata(path)?.permissions();
        permissions.set_readonly(mode & 0o222 == 0);
        std::fs::set_permissions(path, permissions)
    }
}

/// Computes and applies [`TargetPermissions`]
#[derive(Clone)]
pub struct PermissionResolver {
    overrides: PermissionOverrides,
    ops: Arc<dyn OwnershipOps>,
}

impl PermissionResolver {
    pub fn new(overrides: PermissionOverrides, ops: Arc<dyn OwnershipOps>) -> Self {
        Self { overrides, ops }
    }

    /// Target permissions for a result derived from `source`
    pub fn resolve(&self, source: &Path) -> Result<TargetPermissions> {
        let ownership = self
            .ops
            .stat_owner_mode(source)
            .map_err(|e| Error::stat(source, e))?;
        Ok(TargetPermissions::blend(ownership, &self.overrides))
    }

    /// Apply ownership, then mode. Stops at the first failure.
    pub fn apply(&self, path: &Path, target: &TargetPermissions) -> Result<()> {
        self.ops
            .chown(path, target.uid, target.gid)
            .map_err(|e| Error::finalization(path, "chown", e))?;
        tracing::info!(
            path = %path.display(),
            uid = ?target.uid,
            gid = ?target.gid,
            "Changed owner"
        );

        self.ops
            .chmod(path, target.mode)
            .map_err(|e| Error::finalization(path, "chmod", e))?;
        tracing::info!(path = %path.display(), mode = %format!("{:04o}", target.mode), "Changed mode");

        Ok(())
    }

    /// One-line owner/mode report for logs
    pub fn describe(&self, path: &Path) -> String {
        describe_with(self.ops.as_ref(), path)
    }
}

impl fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

/// Owner/mode report of `path` using the real filesystem
pub fn describe_path(path: &Path) -> String {
    describe_with(&SystemOwnership, path)
}

fn describe_with(ops: &dyn OwnershipOps, path: &Path) -> String {
    let kind = if path.is_dir() { "folder" } else { "file" };
    match ops.stat_owner_mode(path) {
        Ok(owner) => format!(
            "{} {:?}: perm={:04o} uid={} gid={}",
            kind,
            path,
            owner.mode,
            owner.uid.map_or_else(|| "unknown".to_string(), |v| v.to_string()),
            owner.gid.map_or_else(|| "unknown".to_string(), |v| v.to_string()),
        ),
        Err(e) => format!("{} {:?}: unavailable ({})", kind, path, e),
    }
}
