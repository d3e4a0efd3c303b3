// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem primitives: lexical path normalisation, containment tests,
//! atomic writes, and recursive copy with exclusions.
//!
//! Normalisation is lexical (no filesystem access) because the paths
//! being validated — proposed instance directories — usually do not
//! exist yet.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("path is not absolute: {0}")]
    NotAbsolute(PathBuf),
    #[error("io error on {path}: {source}")]
    Fs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn fs_err(path: &Path) -> impl FnOnce(std::io::Error) -> IoError + '_ {
    move |source| IoError::Fs { path: path.to_path_buf(), source }
}

/// Resolve `.` and `..` components lexically. The input must be absolute.
pub fn normalize(path: &Path) -> Result<PathBuf, IoError> {
    if !path.is_absolute() {
        return Err(IoError::NotAbsolute(path.to_path_buf()));
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// True when `child` equals `parent` or lives underneath it.
///
/// Both sides must already be normalised; the comparison is by path
/// components, so `/srv/a` does not contain `/srv/ab`.
pub fn is_within(parent: &Path, child: &Path) -> bool {
    child.starts_with(parent)
}

/// True when the directory does not exist or has no entries.
pub async fn dir_is_empty(path: &Path) -> Result<bool, IoError> {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(fs_err(path)(e)),
    };
    Ok(entries.next_entry().await.map_err(fs_err(path))?.is_none())
}

/// Write a file atomically: temp file in the same directory, then rename.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), IoError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await.map_err(fs_err(dir))?;
    let tmp = dir.join(format!(
        ".{}.tmp",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ));
    tokio::fs::write(&tmp, contents).await.map_err(fs_err(&tmp))?;
    tokio::fs::rename(&tmp, path).await.map_err(fs_err(path))?;
    Ok(())
}

/// Recursively copy `src` into `dst`, skipping any entry whose file name
/// appears in `exclude`. `dst` is created if missing.
pub async fn copy_dir(src: &Path, dst: &Path, exclude: &[&str]) -> Result<(), IoError> {
    tokio::fs::create_dir_all(dst).await.map_err(fs_err(dst))?;

    // Iterative walk; recursion with async fns needs boxing.
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&from).await.map_err(fs_err(&from))?;
        while let Some(entry) = entries.next_entry().await.map_err(fs_err(&from))? {
            let name = entry.file_name();
            if exclude.iter().any(|ex| name.to_string_lossy() == *ex) {
                continue;
            }
            let target = to.join(&name);
            let file_type = entry.file_type().await.map_err(fs_err(&from))?;
            if file_type.is_dir() {
                tokio::fs::create_dir_all(&target).await.map_err(fs_err(&target))?;
                pending.push((entry.path(), target));
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), &target)
                    .await
                    .map_err(fs_err(&target))?;
            }
            // Symlinks are deliberately not followed.
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "io_tests.rs"]
mod tests;
