// afx-aio/src/fs.rs
// Primitive synchronous filesystem operations.
use std::fs::{self, Permissions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use afx_common::error::{AfxError, Result};
use tempfile::NamedTempFile;
#[cfg(not(unix))]
use tracing::warn;
use tracing::{debug, error};

/// Checks if a path exists without following symlinks.
pub fn path_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

pub fn create_dir_all(path: &Path) -> Result<()> {
    debug!("Creating directory recursively: {}", path.display());
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        AfxError::from(e)
    })
}

/// Removes a file, symlink or directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let res = if meta.is_dir() {
        debug!("Removing directory recursively: {}", path.display());
        fs::remove_dir_all(path)
    } else {
        debug!("Removing file: {}", path.display());
        fs::remove_file(path)
    };
    match res {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            error!("Failed remove {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

/// Creates `link` pointing at `target`, replacing whatever is at `link`.
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        if !parent.exists() {
            create_dir_all(parent)?;
        }
    }
    if path_exists(link) {
        debug!("Replacing existing {}", link.display());
        remove_path(link)?;
    }
    debug!("Creating symlink {} -> {}", link.display(), target.display());
    symlink(target, link).map_err(|e| {
        error!(
            "Failed create symlink {} -> {}: {}",
            link.display(),
            target.display(),
            e
        );
        AfxError::Link(format!(
            "failed to link {} -> {}: {e}",
            link.display(),
            target.display()
        ))
    })
}

#[cfg(not(unix))]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    warn!(
        "Symlink creation not supported on this platform: {} -> {}",
        link.display(),
        target.display()
    );
    Err(AfxError::Link(
        "Symlinks not supported on this platform".to_string(),
    ))
}

#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    debug!("Setting permissions on {}: {:o}", path.display(), mode);
    fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|e| {
        error!("Failed set permissions on {}: {}", path.display(), e);
        AfxError::from(e)
    })
}

#[cfg(not(unix))]
pub fn set_permissions(path: &Path, _mode: u32) -> Result<()> {
    warn!(
        "Setting permissions not supported on this platform: {}",
        path.display()
    );
    Ok(())
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Marks a regular file 0755 unless it is already executable.
pub fn ensure_executable(path: &Path) -> Result<()> {
    if path.is_file() && !is_executable(path) {
        set_permissions(path, 0o755)?;
    }
    Ok(())
}

/// Atomically writes data to a file using a temporary file in the same directory.
/// `mode` is applied to the temporary file, so the final path never has any
/// other permissions.
pub fn atomic_write_file(original_path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let dir = original_path.parent().ok_or_else(|| {
        AfxError::State(format!(
            "Cannot get parent directory for {}",
            original_path.display()
        ))
    })?;
    create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    let temp_path = temp_file.path().to_path_buf();
    debug!(
        "Atomically writing {} bytes to {} via temp file {}",
        content.len(),
        original_path.display(),
        temp_path.display()
    );

    #[cfg(unix)]
    temp_file
        .as_file()
        .set_permissions(Permissions::from_mode(mode))?;
    #[cfg(not(unix))]
    let _ = mode;

    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(original_path).map_err(|e| {
        error!(
            "Failed to persist temporary file {} over {}: {}",
            temp_path.display(),
            original_path.display(),
            e.error
        );
        AfxError::Io(Arc::new(e.error))
    })?;
    Ok(())
}
