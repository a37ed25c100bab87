//! Path validation
//!
//! Virtual paths always start with `/` and never leave the server root:
//! `..` at the top is ignored, the same way `cd ..` behaves at `/`.

use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Resolves `target` against the current virtual directory.
pub fn resolve_virtual(cwd: &str, target: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let start = if target.starts_with('/') { "" } else { cwd };

    for segment in start.split('/').chain(target.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    format!("/{}", parts.join("/"))
}

/// Maps a normalized virtual path below `server_root`.
pub fn virtual_to_real_path(server_root: &Path, virtual_path: &str) -> PathBuf {
    let relative = virtual_path.trim_start_matches('/');
    if relative.is_empty() {
        server_root.to_path_buf()
    } else {
        server_root.join(relative)
    }
}

/// Resolves a command argument to `(real path, virtual path)`.
pub fn resolve_path(
    server_root: &Path,
    cwd: &str,
    target: &str,
) -> Result<(PathBuf, String), StorageError> {
    if target.is_empty() || target.contains('\0') {
        return Err(StorageError::InvalidPath(target.to_string()));
    }
    let virtual_path = resolve_virtual(cwd, target);
    Ok((virtual_to_real_path(server_root, &virtual_path), virtual_path))
}

/// Rejects existing paths that a symlink leads outside the root.
pub fn ensure_within_root(server_root: &Path, real: &Path, shown: &str) -> Result<(), StorageError> {
    let root = server_root
        .canonicalize()
        .map_err(|e| StorageError::from_io("/", e))?;
    let target = real
        .canonicalize()
        .map_err(|e| StorageError::from_io(shown, e))?;
    if target.starts_with(&root) {
        Ok(())
    } else {
        Err(StorageError::PermissionDenied(shown.to_string()))
    }
}
