// src/sys/files.rs

use std::io::Write;
use std::path::Path;

use tokio::fs;
use tracing::{info, warn};

use crate::error::{fs_err, ProvisionResult};
use crate::sys::traits::CommandRunner;
use crate::sys::user::ServiceUser;

/// Writes `content` through a sibling temp file and renames it into place,
/// so nginx never sees a half-written config.
pub async fn write_atomic(path: &Path, content: &str) -> ProvisionResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| fs_err(path, std::io::Error::other("path has no parent directory")))?;
    fs::create_dir_all(parent).await.map_err(|e| fs_err(parent, e))?;

    let path_buf = path.to_path_buf();
    let parent_buf = parent.to_path_buf();
    let content = content.to_owned();

    // NamedTempFile is blocking; keep it off the runtime threads.
    tokio::task::spawn_blocking(move || -> ProvisionResult<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent_buf).map_err(|e| fs_err(&parent_buf, e))?;
        tmp.write_all(content.as_bytes()).map_err(|e| fs_err(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| fs_err(tmp.path(), e))?;
        tmp.persist(&path_buf).map_err(|e| fs_err(&path_buf, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| fs_err(path, std::io::Error::other(e)))?
}

/// True for files, directories and symlinks (dangling ones included).
pub async fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

/// Removes a file, symlink or directory tree. Missing paths are not an error.
pub async fn remove_path(path: &Path) -> ProvisionResult<bool> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(fs_err(path, e)),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|e| fs_err(path, e))?;
    Ok(true)
}

/// Best-effort removal: logs and swallows the error.
pub async fn remove_best_effort(path: &Path) {
    match remove_path(path).await {
        Ok(true) => info!(path = %path.display(), "removed"),
        Ok(false) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove, continuing"),
    }
}

/// Empties `dir` and recreates it. Returns `false` if it did not exist.
pub async fn purge_dir(dir: &Path) -> ProvisionResult<bool> {
    if !path_exists(dir).await {
        return Ok(false);
    }

    let mut entries = fs::read_dir(dir).await.map_err(|e| fs_err(dir, e))?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| fs_err(dir, e))? {
        let path = entry.path();
        if let Err(e) = remove_path(&path).await {
            // One stubborn entry must not keep the rest from being purged.
            warn!(path = %path.display(), error = %e, "failed to purge entry");
        }
    }

    fs::create_dir_all(dir).await.map_err(|e| fs_err(dir, e))?;
    Ok(true)
}

/// `chown [-R] user:group path` then `chmod [-R] mode path`.
pub async fn set_owner_and_mode(
    runner: &dyn CommandRunner,
    path: &Path,
    owner: &ServiceUser,
    mode: &str,
    recursive: bool,
) -> ProvisionResult<()> {
    let target = path.to_string_lossy();
    let owner = owner.to_string();

    // 🛡️ -h: never follow a symlink planted inside a managed tree.
    let mut chown_args = vec!["-h"];
    let mut chmod_args = Vec::new();
    if recursive {
        chown_args.push("-R");
        chmod_args.push("-R");
    }
    chown_args.extend([owner.as_str(), &*target]);
    chmod_args.extend([mode, &*target]);

    runner.run_checked("chown", &chown_args).await?;
    runner.run_checked("chmod", &chmod_args).await?;
    Ok(())
}
