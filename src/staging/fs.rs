//! Overwriting moves that survive cross-device renames.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Move a directory to `to`, replacing whatever is there.
pub async fn move_dir(from: &Path, to: &Path) -> io::Result<()> {
    if tokio::fs::try_exists(to).await? {
        if tokio::fs::metadata(to).await?.is_dir() {
            tokio::fs::remove_dir_all(to).await?;
        } else {
            tokio::fs::remove_file(to).await?;
        }
    }
    ensure_parent(to).await?;
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    copy_dir_all(from.to_path_buf(), to.to_path_buf()).await?;
    tokio::fs::remove_dir_all(from).await
}

/// Move the entries of `from` into the directory `to`. Entries with the same
/// name are replaced, everything else already in `to` is kept.
pub async fn merge_dir(from: &Path, to: &Path) -> io::Result<()> {
    tokio::fs::create_dir_all(to).await?;
    let mut entries = tokio::fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        let target = to.join(entry.file_name());
        if entry.file_type().await?.is_dir() {
            move_dir(&entry.path(), &target).await?;
        } else {
            if tokio::fs::metadata(&target).await.map(|m| m.is_dir()).unwrap_or(false) {
                tokio::fs::remove_dir_all(&target).await?;
            }
            move_file(&entry.path(), &target).await?;
        }
    }
    tokio::fs::remove_dir(from).await
}

/// Move a file to `to`, replacing an existing file.
pub async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    ensure_parent(to).await?;
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

type IoFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

fn copy_dir_all(from: PathBuf, to: PathBuf) -> IoFuture {
    Box::pin(async move {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                copy_dir_all(entry.path(), target).await?;
            } else {
                tokio::fs::copy(entry.path(), target).await?;
            }
        }
        Ok(())
    })
}
