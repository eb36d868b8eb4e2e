//! Storage errors
//!
//! Every failure below the persistence adapter maps to one of these. The
//! store never returns them from a mutation; they are logged, counted, and
//! shown by `markr status`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// `ENOSPC` on Linux and macOS
const OS_NO_SPACE: i32 = 28;

/// `EDQUOT` on Linux
const OS_QUOTA: i32 = 122;

/// Which key-value operation hit an I/O error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Read,
    Write,
    Remove,
}

impl std::fmt::Display for StorageOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StorageOp::Read => "read",
            StorageOp::Write => "write",
            StorageOp::Remove => "remove",
        })
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot create workspace storage at '{path}': {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Permission denied on '{path}'")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No space left to save bookmarks to '{path}'")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot {op} '{path}': {source}")]
    Access {
        op: StorageOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored document could not be parsed; the raw blob was kept under `backup_key`
    #[error("Bookmark document '{key}' is unreadable ({details}); raw contents saved as '{backup_key}'")]
    CorruptDocument {
        key: String,
        backup_key: String,
        details: String,
    },

    /// Stored document could not be parsed and could not be copied aside either
    #[error("Bookmark document '{key}' is unreadable ({details}) and could not be backed up to '{backup_key}'")]
    CorruptNotBackedUp {
        key: String,
        backup_key: String,
        details: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Cannot encode bookmark document: {0}")]
    Encode(#[from] serde_json::Error),

    /// Key names must map to a single file name
    #[error("'{0}' is not a valid storage key")]
    InvalidKey(String),

    /// Temp file written but never moved into place
    #[error("Cannot replace '{to}' with '{from}': {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Write-behind worker stopped; snapshot was not persisted")]
    WorkerStopped,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Classify an I/O error on `path`
    pub fn from_io(error: io::Error, op: StorageOp, path: PathBuf) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            StorageError::PermissionDenied {
                path,
                source: error,
            }
        } else if is_disk_full_error(&error) {
            StorageError::DiskFull {
                path,
                source: error,
            }
        } else {
            StorageError::Access {
                op,
                path,
                source: error,
            }
        }
    }

    /// Whether the user can fix the cause and have later saves succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::DiskFull { .. }
                | StorageError::PermissionDenied { .. }
                | StorageError::Directory { .. }
                | StorageError::CorruptDocument { .. }
                | StorageError::CorruptNotBackedUp { .. }
        )
    }

    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space; the next change saves everything."),
            StorageError::PermissionDenied { .. } | StorageError::Directory { .. } => {
                Some("Make the markr data directory writable, or set MARKR_DATA_DIR.")
            }
            StorageError::CorruptDocument { .. } => {
                Some("Inspect the backup by hand; this workspace starts with no bookmarks.")
            }
            StorageError::CorruptNotBackedUp { .. } => {
                Some("Copy the bookmark document somewhere safe and repair or delete it; markr leaves it untouched until then.")
            }
            _ => None,
        }
    }
}

fn is_disk_full_error(error: &io::Error) -> bool {
    if matches!(error.raw_os_error(), Some(OS_NO_SPACE) | Some(OS_QUOTA)) {
        return true;
    }
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left") || msg.contains("quota exceeded")
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, StorageOp::Write, PathBuf::from("/data/ws"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.is_recoverable());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_disk_full_from_os_code() {
        let err = StorageError::from_io(
            io::Error::from_raw_os_error(OS_NO_SPACE),
            StorageOp::Write,
            PathBuf::from("/data/ws/markr.bookmarks.json"),
        );
        assert!(matches!(err, StorageError::DiskFull { .. }));
    }

    #[test]
    fn test_other_io_keeps_operation() {
        let io_err = io::Error::new(io::ErrorKind::Other, "broken pipe");
        let err = StorageError::from_io(io_err, StorageOp::Remove, PathBuf::from("/data/x.json"));

        assert!(matches!(
            err,
            StorageError::Access {
                op: StorageOp::Remove,
                ..
            }
        ));
        assert!(err.to_string().starts_with("Cannot remove"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_corrupt_document_names_backup() {
        let err = StorageError::CorruptDocument {
            key: "markr.bookmarks".to_string(),
            backup_key: "markr.bookmarks.corrupt".to_string(),
            details: "expected value at line 1".to_string(),
        };

        assert!(err.to_string().contains("markr.bookmarks.corrupt"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unbacked_corrupt_document_keeps_cause() {
        let cause = StorageError::from_io(
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            StorageOp::Write,
            PathBuf::from("/data/ws/markr.bookmarks.corrupt.json"),
        );
        let err = StorageError::CorruptNotBackedUp {
            key: "markr.bookmarks".to_string(),
            backup_key: "markr.bookmarks.corrupt".to_string(),
            details: "EOF while parsing".to_string(),
            source: Box::new(cause),
        };

        assert!(std::error::Error::source(&err).is_some());
        assert!(err
            .recovery_suggestion()
            .is_some_and(|s| s.contains("untouched")));
    }
}
