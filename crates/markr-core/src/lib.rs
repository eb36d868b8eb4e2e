//! Markr Core Library
//!
//! This crate provides the core functionality for Markr, a bookmark manager
//! for locations inside text files: a consistent, persistable bookmark
//! collection per workspace, grouped views over it, and decoration requests
//! that keep an editor's markers in step with it.
//!
//! # Architecture
//!
//! - **BookmarkStore**: owns the in-memory document; every mutation persists
//!   a full snapshot and then fires the change notifier
//! - **PersistenceAdapter**: JSON document over a key-value primitive, inline
//!   or write-behind
//! - **DecorationSyncEngine**: subscribes to changes and repaints editors
//!   through a host-provided surface
//!
//! All reads are served directly from the in-memory document.
//!
//! # Quick Start
//!
//! ```text
//! let mut store = BookmarkStore::open_with_config(&config, &workspace_root, ChangeNotifier::new())?;
//!
//! // Toggle a bookmark on line 42
//! let location = EditorLocation::new("file:///project/src/main.rs", TextRange::line(41));
//! store.toggle(&location, ToggleOptions::line().label("entry point"));
//!
//! // Query views
//! let view = store.grouped(GroupView::Color, SortOrder::LineNumber);
//! ```
//!
//! # Modules
//!
//! - `store`: Bookmark store (main entry point)
//! - `models`: Bookmarks, file groups, the root document and update DTOs
//! - `grouping`: File, color and workspace views
//! - `decoration`: Decoration styles and per-editor sync
//! - `notifier`: Change notification
//! - `identity`: File and workspace identity hashing
//! - `storage`: Persistence
//! - `config`: Application configuration

pub mod config;
pub mod decoration;
pub mod error;
pub mod grouping;
pub mod identity;
pub mod models;
pub mod notifier;
pub mod storage;
pub mod store;

pub use config::{Config, DecorationConfig, ViewConfig};
pub use decoration::{
    DecorationRange, DecorationStyle, DecorationSurface, DecorationSyncEngine, StyleHandle,
};
pub use error::BookmarkError;
pub use grouping::{GroupView, GroupedView, SortOrder};
pub use identity::{hash_file_identity, workspace_hash, FileIdentity};
pub use models::{
    Bookmark, BookmarkDto, BookmarkFileGroup, BookmarkKey, BookmarkStoreRoot, BookmarkType,
    NewBookmark, RangePatch, TextRange, WorkspaceFolderRef, DEFAULT_COLOR,
};
pub use notifier::{ChangeNotifier, Subscriber, SubscriptionId};
pub use storage::{
    FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, PersistenceAdapter, StorageError,
    StorageFailure,
};
pub use store::{BookmarkStore, EditorLocation, JumpTarget, ToggleOptions, ToggleOutcome};
