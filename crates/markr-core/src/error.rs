//! Core error taxonomy
//!
//! Store operations are total: a lookup miss is answered with `None` or a
//! no-op, never with an error. The variants here cover the failures a caller
//! can act on, such as an unresolvable file or a range that fails validation.

use thiserror::Error;

use crate::models::BookmarkKey;
use crate::storage::StorageError;

/// Errors surfaced by the bookmark core
#[derive(Error, Debug)]
pub enum BookmarkError {
    /// Referenced file group or bookmark no longer exists
    #[error("Bookmark {id} not found in file group {file_id}")]
    LookupMiss { file_id: String, id: String },

    /// The location has no file path that can be hashed (untitled or virtual buffer)
    #[error("Cannot resolve a file identity for '{location}': {reason}")]
    UnresolvableFileIdentity { location: String, reason: String },

    /// Range start is after range end
    #[error("Invalid range {start_line}:{start_col}-{end_line}:{end_col}: start must not be after end")]
    InvalidRange {
        start_line: u32,
        start_col: u32,
        end_line: u32,
        end_col: u32,
    },

    /// Configuration was unusable and has been replaced by a safe default
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Persistence layer failure
    #[error(transparent)]
    Persistence(#[from] StorageError),
}

impl BookmarkError {
    pub fn lookup_miss(key: &BookmarkKey) -> Self {
        BookmarkError::LookupMiss {
            file_id: key.file_id.clone(),
            id: key.id.to_string(),
        }
    }

    /// Message suitable for an informational notice in the host UI
    pub fn user_notice(&self) -> Option<String> {
        match self {
            BookmarkError::UnresolvableFileIdentity { .. } => Some(
                "Bookmarks can only be added to files saved on disk.".to_string(),
            ),
            BookmarkError::InvalidRange { .. } => {
                Some("The selected range is not valid for a bookmark.".to_string())
            }
            BookmarkError::ConfigurationInvalid(msg) => Some(msg.clone()),
            BookmarkError::LookupMiss { .. } | BookmarkError::Persistence(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_range_display() {
        let err = BookmarkError::InvalidRange {
            start_line: 4,
            start_col: 0,
            end_line: 2,
            end_col: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("4:0-2:1"));
        assert!(err.user_notice().is_some());
    }

    #[test]
    fn test_lookup_miss_has_no_notice() {
        let key = BookmarkKey {
            file_id: "abc".to_string(),
            id: uuid::Uuid::nil(),
        };
        let err = BookmarkError::lookup_miss(&key);
        assert!(err.to_string().contains("file group abc"));
        assert!(err.user_notice().is_none());
    }
}
