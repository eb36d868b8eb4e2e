//! File and workspace identity
//!
//! A file is identified by the SHA-256 hash of its `file://` URI, built from
//! the canonical absolute path. This hash is the only test for "is this the
//! same file": it names new file groups and finds existing ones.
//!
//! The workspace identity is the same hash taken over the workspace's storage
//! location. It is stamped once into the persisted document.

use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};

use crate::error::BookmarkError;

/// URI scheme prefix for files on disk
pub const FILE_SCHEME: &str = "file://";

/// Stable hash of a canonical path or URI string
///
/// Same input always yields the same 64-character hex digest.
pub fn hash_file_identity(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of a workspace storage location
pub fn workspace_hash(storage_location: &str) -> String {
    hash_file_identity(storage_location)
}

/// Resolved identity of a file that can own bookmarks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    path: PathBuf,
    uri: String,
    hash: String,
}

impl FileIdentity {
    /// Resolve an identity from a filesystem path
    ///
    /// The path must be absolute. It is canonicalized when it exists on disk,
    /// otherwise `.` and `..` components are resolved lexically.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BookmarkError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(unresolvable(path.display(), "empty path"));
        }
        if !path.is_absolute() {
            return Err(unresolvable(path.display(), "path is not absolute"));
        }

        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path));
        let uri = path_to_uri(&canonical);
        let hash = hash_file_identity(&uri);

        Ok(Self {
            path: canonical,
            uri,
            hash,
        })
    }

    /// Resolve an identity from a URI
    ///
    /// Only `file://` URIs are resolvable. `untitled:` buffers and other
    /// virtual documents have no path to hash. Percent-escapes in the path
    /// are decoded, so an encoded URI and the plain path hash the same.
    pub fn from_uri(uri: &str) -> Result<Self, BookmarkError> {
        let Some(rest) = uri.strip_prefix(FILE_SCHEME) else {
            let scheme = uri.split(':').next().unwrap_or_default();
            return Err(unresolvable(uri, format!("unsupported scheme '{}'", scheme)));
        };
        let decoded = percent_decode_str(rest)
            .decode_utf8()
            .map_err(|e| unresolvable(uri, format!("invalid escape in path: {}", e)))?;
        Self::from_path(PathBuf::from(decoded.as_ref()))
    }

    /// Canonical path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `file://` URI string that is hashed
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// File group id for this file
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Last path component, for display
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.uri.clone())
    }
}

fn unresolvable(location: impl std::fmt::Display, reason: impl Into<String>) -> BookmarkError {
    BookmarkError::UnresolvableFileIdentity {
        location: location.to_string(),
        reason: reason.into(),
    }
}

fn path_to_uri(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    if raw.starts_with('/') {
        format!("{}{}", FILE_SCHEME, raw)
    } else {
        format!("{}/{}", FILE_SCHEME, raw)
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
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
    out
}
