//! On-disk file resolution for the serving root.

use std::io;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use mime_guess::Mime;

/// What a request path points at once resolved against the serving root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    Directory(PathBuf),
    Missing,
}

/// A single entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub href: String,
    pub label: String,
}

/// Join a request path onto the serving root.
///
/// Leading slashes are stripped; any path carrying a parent-directory
/// component is rejected so requests cannot escape the root. Returns `None`
/// for rejected paths.
pub fn resolve_request_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let candidate = Path::new(relative);
    if candidate
        .components()
        .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
    {
        return None;
    }
    Some(root.join(candidate))
}

/// Classify a resolved path as file, directory, or absent.
pub async fn classify(path: &Path) -> Resolved {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Resolved::File(path.to_path_buf()),
        Ok(metadata) if metadata.is_dir() => Resolved::Directory(path.to_path_buf()),
        _ => Resolved::Missing,
    }
}

pub async fn read_file(path: &Path) -> io::Result<Bytes> {
    tokio::fs::read(path).await.map(Bytes::from)
}

pub fn content_type(path: &Path) -> Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

/// List the immediate children of a directory, directories suffixed with a
/// slash, sorted by name.
pub async fn list_directory(path: &Path) -> io::Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(path).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry
            .file_type()
            .await
            .map(|kind| kind.is_dir())
            .unwrap_or(false);
        let label = if is_dir { format!("{name}/") } else { name.clone() };
        entries.push(DirEntry { href: name, label });
    }
    entries.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(entries)
}
