//! Local filesystem adapter: lexical path cleanup and mode-aware
//! create/mkdir helpers used by the transfer engines.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::fs::File;

use crate::error::{Error, Result};

/// Lexically normalise a path: drop `.` components, resolve `..` against
/// preceding components where possible. No filesystem access.
pub(crate) fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

pub(crate) fn clean_str(path: &str) -> String {
    clean(Path::new(path)).to_string_lossy().into_owned()
}

/// Final path element, falling back to the path itself when there is none
/// (e.g. `/`).
pub(crate) fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// `mkdir -p` with an explicit mode for the created directories.
pub(crate) async fn ensure_dir_all(path: &Path, mode: u32) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    builder.mode(mode);
    builder.create(path).await.map_err(Error::Io)
}

/// Idempotent directory creation: an existing directory is left alone, an
/// existing non-directory is a conflict.
pub(crate) async fn ensure_dir(path: &Path, mode: u32) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::PathConflict(path.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => ensure_dir_all(path, mode).await,
        Err(e) => Err(e.into()),
    }
}

/// Open a transfer destination: create if absent, append writes, explicit
/// permission bits.
pub(crate) async fn create_entry(path: &Path, mode: u32) -> Result<File> {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(mode)
        .open(path)
        .await?;
    Ok(file)
}
