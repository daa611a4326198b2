//! Local side of a theme: which files belong to it and where assets land.

use ignore::WalkBuilder;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{trace, warn};

use crate::error::{Result, SyncError};

/// Top-level directories that make up a theme. Nothing else is pushed.
pub const THEME_DIRS: &[&str] = &[
    "assets",
    "config",
    "dist",
    "layout",
    "locales",
    "sections",
    "snippets",
    "templates",
];

/// Map an asset key onto the theme root, refusing anything that would land
/// outside of it.
pub fn asset_path(root: &Path, key: &str) -> Result<PathBuf> {
    if key.is_empty() {
        return Err(SyncError::UnsafeKey("empty key".to_string()));
    }

    let rel_path = Path::new(key);
    if rel_path.is_absolute() {
        return Err(SyncError::UnsafeKey(key.to_string()));
    }

    for component in rel_path.components() {
        match component {
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                return Err(SyncError::UnsafeKey(key.to_string()));
            }
            _ => {}
        }
    }

    Ok(root.join(rel_path))
}

/// Relative paths (with `/` separators) of every file under the theme
/// directories, sorted. Missing theme directories are skipped.
pub fn list_local_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();

    for dir in THEME_DIRS {
        let base = root.join(dir);
        if !base.is_dir() {
            continue;
        }

        let walker = WalkBuilder::new(&base)
            .standard_filters(false)
            .hidden(true)
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io_err) => SyncError::Io(io_err),
                None => SyncError::Io(io::Error::other(format!("failed to walk {}", base.display()))),
            })?;

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            match asset_key(root, entry.path()) {
                Some(key) => {
                    trace!(key, "local file");
                    files.push(key);
                }
                None => warn!(
                    path = %entry.path().display(),
                    "skipping file: name is not valid UTF-8 and cannot be an asset key"
                ),
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Asset key for a file under the root: relative, `/`-separated.
fn asset_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Write a downloaded asset. When the parent directory is missing, create it
/// and retry exactly once; any other failure is returned as is.
pub async fn write_asset(path: &Path, content: &[u8]) -> Result<()> {
    match fs::write(path, content).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, content).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
