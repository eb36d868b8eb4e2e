//! Storage layer
//!
//! Handles persistence of the bookmark document.
//!
//! ## Architecture
//!
//! - **KeyValueStore**: raw blob primitive supplied by the host (files on disk
//!   for the CLI, memory for tests)
//! - **PersistenceAdapter**: JSON encoding of the whole document, inline or
//!   write-behind
//!
//! Only `BookmarkStore` writes through the adapter.

pub mod error;
pub mod persistence;

pub use error::{StorageError, StorageOp, StorageResult};
pub use persistence::{
    FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, PersistenceAdapter, StorageFailure,
    BOOKMARKS_KEY,
};
