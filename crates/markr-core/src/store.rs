//! Bookmark store
//!
//! The `BookmarkStore` owns the authoritative in-memory document for one
//! workspace. Every mutation runs the same way:
//! 1. validate and compute the new value (nothing is touched on failure)
//! 2. apply it to the in-memory document
//! 3. hand a snapshot to the persistence adapter (fire-and-forget)
//! 4. fire the change notifier
//!
//! ## Durability window
//!
//! With a write-behind adapter, subscribers run before the snapshot is on
//! disk. The in-memory document is authoritative for the session; call
//! `flush().await` before exiting to close the window.
//!
//! Lookups that miss (a bookmark deleted twice, a file with no group) are
//! no-ops: they return `None` and fire nothing.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = BookmarkStore::open_with_config(&config, &workspace_root, ChangeNotifier::new())?;
//!
//! let location = EditorLocation::new("file:///project/src/main.rs", TextRange::line(41));
//! if let ToggleOutcome::Added(bookmark) = store.toggle(&location, ToggleOptions::line()) {
//!     store.edit_label(&bookmark.key(), "entry point");
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::BookmarkError;
use crate::grouping::{self, GroupView, GroupedView, SortOrder};
use crate::identity::{workspace_hash, FileIdentity};
use crate::models::{
    Bookmark, BookmarkDto, BookmarkFileGroup, BookmarkKey, BookmarkStoreRoot, BookmarkType,
    NewBookmark, RangePatch, TextRange, WorkspaceFolderRef,
};
use crate::notifier::{ChangeNotifier, Subscriber, SubscriptionId};
use crate::storage::{FileKeyValueStore, PersistenceAdapter, StorageError};

/// Cursor or selection reported by the editing surface
#[derive(Debug, Clone, PartialEq)]
pub struct EditorLocation {
    /// Document URI; only `file://` URIs can own bookmarks
    pub uri: String,
    pub selection: TextRange,
    pub language_id: String,
    pub workspace_folder: Option<WorkspaceFolderRef>,
    /// Text covered by the selection
    pub selected_text: String,
}

impl EditorLocation {
    pub fn new(uri: impl Into<String>, selection: TextRange) -> Self {
        Self {
            uri: uri.into(),
            selection,
            language_id: String::new(),
            workspace_folder: None,
            selected_text: String::new(),
        }
    }

    pub fn language_id(mut self, language_id: impl Into<String>) -> Self {
        self.language_id = language_id.into();
        self
    }

    pub fn workspace_folder(mut self, folder: WorkspaceFolderRef) -> Self {
        self.workspace_folder = Some(folder);
        self
    }

    pub fn selected_text(mut self, text: impl Into<String>) -> Self {
        self.selected_text = text.into();
        self
    }
}

/// What a toggle creates when nothing is there yet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToggleOptions {
    pub kind: BookmarkType,
    pub label: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl ToggleOptions {
    pub fn line() -> Self {
        Self::default()
    }

    pub fn selection() -> Self {
        Self {
            kind: BookmarkType::Selection,
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Result of [`BookmarkStore::toggle`]
#[derive(Debug)]
pub enum ToggleOutcome {
    Added(Bookmark),
    Removed(Bookmark),
    /// Nothing was mutated; the error explains why
    Skipped(BookmarkError),
}

/// Where to navigate for a bookmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpTarget {
    pub file_uri: String,
    pub filename: String,
    pub range: TextRange,
}

/// Authoritative bookmark collection for one workspace
pub struct BookmarkStore {
    root: BookmarkStoreRoot,
    persistence: PersistenceAdapter,
    notifier: ChangeNotifier,
}

impl BookmarkStore {
    /// Wrap an existing document
    ///
    /// The notifier (and its subscribers) is wired in here, so a store never
    /// exists without its change channel.
    pub fn new(
        root: BookmarkStoreRoot,
        persistence: PersistenceAdapter,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            root,
            persistence,
            notifier,
        }
    }

    /// Load the workspace document, creating it on first run
    ///
    /// Never fails: a corrupt document is backed up by the adapter and
    /// replaced with an empty one. A document that is unreadable, or corrupt
    /// with no backup, is left alone: the session starts empty and nothing
    /// is written back.
    pub fn open(
        persistence: PersistenceAdapter,
        workspace: impl Into<String>,
        notifier: ChangeNotifier,
    ) -> Self {
        let workspace = workspace.into();
        let loaded = persistence.load();
        let mut store = Self::new(BookmarkStoreRoot::empty(workspace), persistence, notifier);

        match loaded {
            Ok(Some(mut root)) => {
                if root.workspace.is_empty() {
                    root.workspace = store.root.workspace.clone();
                }
                info!(
                    files = root.data.len(),
                    bookmarks = root.total_count(),
                    "Loaded bookmark document"
                );
                store.root = root;
            }
            Ok(None) => {
                info!("Creating bookmark document for new workspace");
                store.save(None);
            }
            Err(e @ StorageError::CorruptDocument { .. }) => {
                error!("{}", e);
                store.save(None);
            }
            Err(e) => {
                error!("Failed to load bookmarks, starting empty for this session: {}", e);
            }
        }
        store
    }

    /// Open the document for `workspace_root` under the configured data directory
    ///
    /// Saves use a write-behind adapter when a tokio runtime is running.
    pub fn open_with_config(
        config: &Config,
        workspace_root: &Path,
        notifier: ChangeNotifier,
    ) -> Result<Self> {
        let canonical = std::fs::canonicalize(workspace_root)
            .with_context(|| format!("Failed to resolve workspace root {:?}", workspace_root))?;
        let hash = workspace_hash(&canonical.to_string_lossy());
        let kv = FileKeyValueStore::new(config.workspace_dir(&hash));
        let persistence = PersistenceAdapter::write_behind(Arc::new(kv));
        Ok(Self::open(persistence, hash, notifier))
    }

    // ==================== Read Access ====================

    /// Current document
    pub fn root(&self) -> &BookmarkStoreRoot {
        &self.root
    }

    /// Workspace hash stamped into the document
    pub fn workspace(&self) -> &str {
        &self.root.workspace
    }

    /// Point lookup
    pub fn detail(&self, key: &BookmarkKey) -> Option<&Bookmark> {
        self.root.find(key)
    }

    /// Find a bookmark by id alone
    pub fn find_by_id(&self, id: Uuid) -> Option<&Bookmark> {
        self.root.bookmarks().find(|b| b.id == id)
    }

    pub fn group_for(&self, file: &FileIdentity) -> Option<&BookmarkFileGroup> {
        self.root.group(file.hash())
    }

    /// Bookmarks of one file, in insertion order
    pub fn bookmarks_in_file(&self, file: &FileIdentity) -> &[Bookmark] {
        self.group_for(file)
            .map(|g| g.bookmarks.as_slice())
            .unwrap_or(&[])
    }

    /// First bookmark covering `line` in `file`
    pub fn bookmark_at(&self, file: &FileIdentity, line: u32) -> Option<&Bookmark> {
        self.bookmarks_in_file(file)
            .iter()
            .find(|b| b.range.contains_line(line))
    }

    /// Where to navigate for a bookmark
    pub fn jump_target(&self, key: &BookmarkKey) -> Option<JumpTarget> {
        let group = self.root.group(&key.file_id)?;
        let bookmark = group.get(key.id)?;
        Some(JumpTarget {
            file_uri: group.file_uri.clone(),
            filename: group.filename.clone(),
            range: bookmark.range,
        })
    }

    pub fn total_count(&self) -> usize {
        self.root.total_count()
    }

    pub fn labeled_count(&self) -> usize {
        self.root.bookmarks().filter(|b| b.has_label()).count()
    }

    /// Distinct color keys in use, in order of first appearance
    pub fn colors(&self) -> Vec<&str> {
        let mut colors: Vec<&str> = Vec::new();
        for bookmark in self.root.bookmarks() {
            if !colors.contains(&bookmark.color.as_str()) {
                colors.push(&bookmark.color);
            }
        }
        colors
    }

    /// Grouped, sorted view of the current document
    pub fn grouped(&self, view: GroupView, order: SortOrder) -> GroupedView<'_> {
        grouping::grouped(&self.root, view, order)
    }

    // ==================== Mutations ====================

    /// Add a bookmark to the file at `file_uri`
    ///
    /// Returns `None` without mutating when the URI has no resolvable path.
    pub fn add(&mut self, file_uri: &str, new: NewBookmark) -> Option<Bookmark> {
        match FileIdentity::from_uri(file_uri) {
            Ok(file) => Some(self.add_resolved(&file, new)),
            Err(e) => {
                debug!("Skipping bookmark add: {}", e);
                None
            }
        }
    }

    /// Add a bookmark to an already resolved file
    pub fn add_resolved(&mut self, file: &FileIdentity, new: NewBookmark) -> Bookmark {
        let id = self.fresh_id();
        let bookmark = new.into_bookmark(id, file.hash());

        let group = match self.root.data.iter().position(|g| g.id == file.hash()) {
            Some(idx) => &mut self.root.data[idx],
            None => {
                self.root.data.push(BookmarkFileGroup::new(file));
                let last = self.root.data.len() - 1;
                &mut self.root.data[last]
            }
        };
        group.bookmarks.push(bookmark.clone());

        debug!(id = %bookmark.id, file = %file.uri(), "Added bookmark");
        self.save(None);
        bookmark
    }

    /// Remove a bookmark; a second call for the same key is a no-op
    ///
    /// A file group left empty is dropped.
    pub fn remove(&mut self, key: &BookmarkKey) -> Option<Bookmark> {
        let Some(group_idx) = self.root.data.iter().position(|g| g.id == key.file_id) else {
            debug!("Remove skipped: {}", BookmarkError::lookup_miss(key));
            return None;
        };
        let group = &mut self.root.data[group_idx];
        let Some(idx) = group.bookmarks.iter().position(|b| b.id == key.id) else {
            debug!("Remove skipped: {}", BookmarkError::lookup_miss(key));
            return None;
        };

        let removed = group.bookmarks.remove(idx);
        if group.is_empty() {
            self.root.data.remove(group_idx);
        }

        debug!(key = %key, "Removed bookmark");
        self.save(None);
        Some(removed)
    }

    /// Merge `dto` into a bookmark
    ///
    /// Range fields merge one by one, so a patch touching one field keeps
    /// the others. An invalid merged range is rejected before anything
    /// changes. Returns `Ok(None)` on a lookup miss.
    pub fn update(
        &mut self,
        key: &BookmarkKey,
        dto: &BookmarkDto,
    ) -> Result<Option<Bookmark>, BookmarkError> {
        let Some(existing) = self.root.find(key) else {
            debug!("Update skipped: {}", BookmarkError::lookup_miss(key));
            return Ok(None);
        };

        let merged = dto.merge(existing)?;
        if let Some(slot) = self
            .root
            .data
            .iter_mut()
            .find(|g| g.id == key.file_id)
            .and_then(|g| g.bookmarks.iter_mut().find(|b| b.id == key.id))
        {
            *slot = merged.clone();
        }

        self.save(None);
        Ok(Some(merged))
    }

    pub fn edit_label(&mut self, key: &BookmarkKey, label: impl Into<String>) -> Option<Bookmark> {
        self.update_infallible(key, BookmarkDto::label(label))
    }

    pub fn edit_description(
        &mut self,
        key: &BookmarkKey,
        description: impl Into<String>,
    ) -> Option<Bookmark> {
        self.update_infallible(key, BookmarkDto::description(description))
    }

    pub fn change_color(&mut self, key: &BookmarkKey, color: impl Into<String>) -> Option<Bookmark> {
        self.update_infallible(key, BookmarkDto::color(color))
    }

    /// Re-anchor a bookmark to a new range
    pub fn move_to(
        &mut self,
        key: &BookmarkKey,
        range: TextRange,
    ) -> Result<Option<Bookmark>, BookmarkError> {
        self.update(key, &BookmarkDto::range(RangePatch::replace(range)))
    }

    /// DTOs without a range patch cannot fail validation
    fn update_infallible(&mut self, key: &BookmarkKey, dto: BookmarkDto) -> Option<Bookmark> {
        match self.update(key, &dto) {
            Ok(updated) => updated,
            Err(e) => {
                warn!(key = %key, "Update rejected: {}", e);
                None
            }
        }
    }

    /// Add a bookmark at the location, or remove the one already there
    ///
    /// Line toggles match any bookmark starting on the cursor line.
    /// Selection toggles match a bookmark with the identical range.
    pub fn toggle(&mut self, location: &EditorLocation, options: ToggleOptions) -> ToggleOutcome {
        let file = match FileIdentity::from_uri(&location.uri) {
            Ok(file) => file,
            Err(e) => {
                debug!("Toggle skipped: {}", e);
                return ToggleOutcome::Skipped(e);
            }
        };

        let line = location.selection.start_line();
        let existing = self
            .bookmarks_in_file(&file)
            .iter()
            .find(|b| match options.kind {
                BookmarkType::Line => b.range.start_line() == line,
                BookmarkType::Selection => b.range == location.selection,
            })
            .map(Bookmark::key);

        if let Some(key) = existing {
            if let Some(removed) = self.remove(&key) {
                return ToggleOutcome::Removed(removed);
            }
        }

        let mut new = match options.kind {
            BookmarkType::Line => NewBookmark::line(line),
            BookmarkType::Selection => NewBookmark::selection(location.selection)
                .selection_content(location.selected_text.clone()),
        }
        .language_id(location.language_id.clone());

        if let Some(label) = options.label {
            new = new.label(label);
        }
        if let Some(description) = options.description {
            new = new.description(description);
        }
        if let Some(color) = options.color {
            new = new.color(color);
        }
        if let Some(folder) = &location.workspace_folder {
            new = new.workspace_folder(folder.clone());
        }

        ToggleOutcome::Added(self.add_resolved(&file, new))
    }

    /// Remove every bookmark of a file and drop its group
    ///
    /// Returns how many bookmarks were removed.
    pub fn clear_all_in_file(&mut self, file: &FileIdentity) -> usize {
        let Some(idx) = self.root.data.iter().position(|g| g.id == file.hash()) else {
            debug!(file = %file.uri(), "Clear skipped: no bookmarks in file");
            return 0;
        };
        let removed = self.root.data.remove(idx).bookmarks.len();
        info!(file = %file.uri(), removed, "Cleared bookmarks in file");
        self.save(None);
        removed
    }

    /// Reset to an empty document, keeping the workspace stamp
    pub fn clear_all(&mut self) {
        let removed = self.root.total_count();
        self.root = BookmarkStoreRoot::empty(self.root.workspace.clone());
        info!(removed, "Cleared all bookmarks");
        self.save(None);
    }

    /// Persist the document and notify subscribers
    ///
    /// With `Some(root)` the in-memory document is replaced first. The
    /// replacement is normalized like a loaded document and the current
    /// workspace stamp is kept.
    pub fn save(&mut self, root: Option<BookmarkStoreRoot>) {
        if let Some(mut root) = root {
            if root.workspace != self.root.workspace {
                warn!("Replacement document has a different workspace stamp; keeping the current one");
                root.workspace = self.root.workspace.clone();
            }
            let repairs = root.normalize();
            if repairs > 0 {
                warn!(repairs, "Repaired inconsistencies in replacement bookmark document");
            }
            self.root = root;
        }
        self.persistence.save(&self.root);
        self.notifier.fire(&self.root);
    }

    /// Notify subscribers without mutating
    pub fn refresh(&mut self) {
        self.notifier.fire(&self.root);
    }

    // ==================== Notifications & Durability ====================

    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.notifier.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Wait for queued snapshots to reach storage
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.persistence.flush().await
    }

    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    fn fresh_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if self.find_by_id(id).is_none() {
                return id;
            }
        }
    }
}

impl std::fmt::Debug for BookmarkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookmarkStore")
            .field("workspace", &self.root.workspace)
            .field("files", &self.root.data.len())
            .field("bookmarks", &self.root.total_count())
            .field("persistence", &self.persistence)
            .field("notifier", &self.notifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryKeyValueStore, StorageResult, BOOKMARKS_KEY};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;
    use tempfile::TempDir;

    const FILE_A: &str = "file:///nonexistent/project/src/a.rs";
    const FILE_B: &str = "file:///nonexistent/project/src/b.rs";

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &[u8]) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        fn remove(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    fn memory_store() -> (BookmarkStore, Arc<MemoryKeyValueStore>) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = BookmarkStore::open(
            PersistenceAdapter::inline(kv.clone()),
            "workspace-hash",
            ChangeNotifier::new(),
        );
        (store, kv)
    }

    fn file(uri: &str) -> FileIdentity {
        FileIdentity::from_uri(uri).unwrap()
    }

    fn fire_counter(store: &mut BookmarkStore) -> Rc<RefCell<usize>> {
        let count = Rc::new(RefCell::new(0));
        let count_clone = Rc::clone(&count);
        store.subscribe(Box::new(move |_| *count_clone.borrow_mut() += 1));
        count
    }

    #[test]
    fn test_open_creates_and_persists_empty_document() {
        let (store, kv) = memory_store();
        assert_eq!(store.workspace(), "workspace-hash");
        assert_eq!(store.total_count(), 0);
        assert!(kv.get(BOOKMARKS_KEY).unwrap().is_some());
    }

    #[test]
    fn test_add_creates_file_group_once() {
        let (mut store, _) = memory_store();

        let first = store.add(FILE_A, NewBookmark::line(1)).unwrap();
        let second = store.add(FILE_A, NewBookmark::line(2)).unwrap();
        store.add(FILE_B, NewBookmark::line(3)).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.root().data.len(), 2);
        assert_eq!(store.bookmarks_in_file(&file(FILE_A)).len(), 2);
        assert_eq!(first.file_uri_hash, file(FILE_A).hash());

        let group = store.group_for(&file(FILE_A)).unwrap();
        assert_eq!(group.id, file(FILE_A).hash());
        assert_eq!(group.file_uri, FILE_A);
        assert_eq!(group.filename, "a.rs");
    }

    #[test]
    fn test_add_unresolvable_file_is_noop() {
        let (mut store, _) = memory_store();
        let fired = fire_counter(&mut store);

        assert!(store.add("untitled:Untitled-1", NewBookmark::line(0)).is_none());
        assert_eq!(store.total_count(), 0);
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (mut store, _) = memory_store();
        store.add(FILE_A, NewBookmark::line(1)).unwrap();
        let bookmark = store.add(FILE_A, NewBookmark::line(2)).unwrap();
        let fired = fire_counter(&mut store);

        assert!(store.remove(&bookmark.key()).is_some());
        assert!(store.remove(&bookmark.key()).is_none());

        assert_eq!(store.total_count(), 1);
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn test_remove_last_bookmark_prunes_group() {
        let (mut store, _) = memory_store();
        let bookmark = store.add(FILE_A, NewBookmark::line(1)).unwrap();

        store.remove(&bookmark.key());
        assert!(store.root().data.is_empty());
        assert!(store.group_for(&file(FILE_A)).is_none());
    }

    #[test]
    fn test_remove_targets_correct_group() {
        let (mut store, _) = memory_store();
        let a0 = store.add(FILE_A, NewBookmark::line(0)).unwrap();
        store.add(FILE_B, NewBookmark::line(0)).unwrap();
        let b1 = store.add(FILE_B, NewBookmark::line(1)).unwrap();

        store.remove(&b1.key());
        assert_eq!(store.bookmarks_in_file(&file(FILE_B)).len(), 1);
        assert!(store.detail(&a0.key()).is_some());
    }

    #[test]
    fn test_update_label_keeps_range() {
        let (mut store, _) = memory_store();
        let range = TextRange::new(4, 2, 6, 10).unwrap();
        let bookmark = store
            .add(FILE_A, NewBookmark::selection(range).color("red"))
            .unwrap();

        let updated = store.edit_label(&bookmark.key(), "parser entry").unwrap();

        assert_eq!(updated.label, "parser entry");
        assert_eq!(updated.range, range);
        assert_eq!(updated.color, "red");
        assert_eq!(store.detail(&bookmark.key()).unwrap(), &updated);
        assert_eq!(updated.render_hint(), "#### parser entry");
    }

    #[test]
    fn test_update_partial_range_preserves_other_fields() {
        let (mut store, _) = memory_store();
        let bookmark = store
            .add(
                FILE_A,
                NewBookmark::selection(TextRange::new(1, 0, 3, 5).unwrap())
                    .label("block")
                    .description("details"),
            )
            .unwrap();

        let dto = BookmarkDto::range(RangePatch {
            end_line: Some(8),
            ..RangePatch::default()
        });
        let updated = store.update(&bookmark.key(), &dto).unwrap().unwrap();

        assert_eq!(updated.range, TextRange::new(1, 0, 8, 5).unwrap());
        assert_eq!(updated.label, "block");
        assert_eq!(updated.description, "details");
        assert_eq!(updated.id, bookmark.id);
        assert_eq!(updated.created_at, bookmark.created_at);
    }

    #[test]
    fn test_update_invalid_range_mutates_nothing() {
        let (mut store, _) = memory_store();
        let bookmark = store
            .add(FILE_A, NewBookmark::selection(TextRange::new(5, 0, 6, 0).unwrap()))
            .unwrap();
        let fired = fire_counter(&mut store);

        let dto = BookmarkDto {
            label: Some("should not stick".to_string()),
            range: Some(RangePatch {
                end_line: Some(2),
                ..RangePatch::default()
            }),
            ..BookmarkDto::default()
        };
        assert!(store.update(&bookmark.key(), &dto).is_err());

        assert_eq!(store.detail(&bookmark.key()).unwrap(), &bookmark);
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn test_update_missing_bookmark_is_noop() {
        let (mut store, _) = memory_store();
        let bookmark = store.add(FILE_A, NewBookmark::line(1)).unwrap();
        store.remove(&bookmark.key());

        assert!(store.edit_label(&bookmark.key(), "gone").is_none());
        assert!(store
            .update(&bookmark.key(), &BookmarkDto::color("red"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_move_to_reanchors() {
        let (mut store, _) = memory_store();
        let bookmark = store.add(FILE_A, NewBookmark::line(3)).unwrap();

        let moved = store
            .move_to(&bookmark.key(), TextRange::line(12))
            .unwrap()
            .unwrap();
        assert_eq!(moved.range.start_line(), 12);
    }

    #[test]
    fn test_add_change_color_remove_scenario() {
        let (mut store, _) = memory_store();
        let bookmark = store
            .add(FILE_A, NewBookmark::with_range(BookmarkType::Line, TextRange::point(0, 0)))
            .unwrap();

        let recolored = store.change_color(&bookmark.key(), "warning").unwrap();
        assert_eq!(recolored.color, "warning");

        store.remove(&bookmark.key());
        assert!(store.bookmarks_in_file(&file(FILE_A)).is_empty());
        assert_eq!(store.total_count(), 0);
    }

    #[test]
    fn test_clear_all_keeps_workspace() {
        let (mut store, _) = memory_store();
        store.add(FILE_A, NewBookmark::line(1)).unwrap();
        store.add(FILE_B, NewBookmark::line(1)).unwrap();

        store.clear_all();
        assert!(store.root().data.is_empty());
        assert_eq!(store.workspace(), "workspace-hash");
    }

    #[test]
    fn test_clear_all_in_file_drops_group() {
        let (mut store, _) = memory_store();
        store.add(FILE_A, NewBookmark::line(1)).unwrap();
        store.add(FILE_A, NewBookmark::line(2)).unwrap();
        store.add(FILE_B, NewBookmark::line(1)).unwrap();

        assert_eq!(store.clear_all_in_file(&file(FILE_A)), 2);
        assert_eq!(store.clear_all_in_file(&file(FILE_A)), 0);
        assert!(store.group_for(&file(FILE_A)).is_none());
        assert_eq!(store.total_count(), 1);
    }

    #[test]
    fn test_ids_stay_unique() {
        let (mut store, _) = memory_store();
        let mut keys = Vec::new();
        for line in 0..20 {
            let uri = if line % 2 == 0 { FILE_A } else { FILE_B };
            keys.push(store.add(uri, NewBookmark::line(line)).unwrap().key());
        }
        for key in keys.iter().step_by(3) {
            store.remove(key);
        }
        for key in keys.iter().skip(1).step_by(4) {
            store.edit_description(key, "touched");
        }
        for line in 20..25 {
            store.add(FILE_A, NewBookmark::line(line)).unwrap();
        }

        let ids: HashSet<Uuid> = store.root().bookmarks().map(|b| b.id).collect();
        assert_eq!(ids.len(), store.total_count());
        let group_ids: HashSet<&str> = store.root().data.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(group_ids.len(), store.root().data.len());
    }

    #[test]
    fn test_toggle_line_adds_then_removes() {
        let (mut store, _) = memory_store();
        let location = EditorLocation::new(FILE_A, TextRange::new(7, 3, 7, 9).unwrap())
            .language_id("rust")
            .workspace_folder(WorkspaceFolderRef::new("project", 0));

        let added = match store.toggle(&location, ToggleOptions::line().color("red")) {
            ToggleOutcome::Added(bookmark) => bookmark,
            other => panic!("expected Added, got {:?}", other),
        };
        assert_eq!(added.range, TextRange::line(7));
        assert_eq!(added.kind, BookmarkType::Line);
        assert_eq!(added.language_id, "rust");
        assert_eq!(added.color, "red");
        assert_eq!(added.workspace_folder.as_ref().unwrap().name, "project");

        // Any cursor position on the same line toggles it off
        let again = EditorLocation::new(FILE_A, TextRange::point(7, 20));
        assert!(matches!(
            store.toggle(&again, ToggleOptions::line()),
            ToggleOutcome::Removed(b) if b.id == added.id
        ));
        assert_eq!(store.total_count(), 0);
    }

    #[test]
    fn test_toggle_selection_matches_exact_range() {
        let (mut store, _) = memory_store();
        let range = TextRange::new(2, 4, 3, 1).unwrap();
        let location = EditorLocation::new(FILE_A, range).selected_text("fn main");

        let added = match store.toggle(&location, ToggleOptions::selection().label("main")) {
            ToggleOutcome::Added(bookmark) => bookmark,
            other => panic!("expected Added, got {:?}", other),
        };
        assert_eq!(added.selection_content, "fn main");
        assert_eq!(added.label, "main");

        let other = EditorLocation::new(FILE_A, TextRange::new(2, 4, 3, 2).unwrap());
        assert!(matches!(
            store.toggle(&other, ToggleOptions::selection()),
            ToggleOutcome::Added(_)
        ));
        assert!(matches!(
            store.toggle(&location, ToggleOptions::selection()),
            ToggleOutcome::Removed(_)
        ));
        assert_eq!(store.total_count(), 1);
    }

    #[test]
    fn test_toggle_virtual_buffer_is_skipped() {
        let (mut store, _) = memory_store();
        let location = EditorLocation::new("untitled:Untitled-2", TextRange::line(0));

        match store.toggle(&location, ToggleOptions::line()) {
            ToggleOutcome::Skipped(err) => assert!(err.user_notice().is_some()),
            other => panic!("expected Skipped, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribers_see_new_state_immediately() {
        let (mut store, _) = memory_store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        store.subscribe(Box::new(move |root: &BookmarkStoreRoot| {
            seen_clone.borrow_mut().push(root.total_count());
        }));

        let bookmark = store.add(FILE_A, NewBookmark::line(1)).unwrap();
        store.add(FILE_A, NewBookmark::line(2)).unwrap();
        store.remove(&bookmark.key());
        store.refresh();

        assert_eq!(*seen.borrow(), vec![1, 2, 1, 1]);
    }

    #[test]
    fn test_constructor_injected_subscribers() {
        let fired = Rc::new(RefCell::new(0));
        let fired_clone = Rc::clone(&fired);
        let notifier = ChangeNotifier::with_subscribers([Box::new(move |_: &BookmarkStoreRoot| {
            *fired_clone.borrow_mut() += 1
        }) as Subscriber]);
        let mut store = BookmarkStore::new(
            BookmarkStoreRoot::empty("ws"),
            PersistenceAdapter::inline(Arc::new(MemoryKeyValueStore::new())),
            notifier,
        );

        store.add(FILE_A, NewBookmark::line(0));
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn test_persistence_failure_keeps_memory_state() {
        let mut store = BookmarkStore::open(
            PersistenceAdapter::inline(Arc::new(FailingStore)),
            "ws",
            ChangeNotifier::new(),
        );
        let fired = fire_counter(&mut store);

        let bookmark = store.add(FILE_A, NewBookmark::line(3)).unwrap();
        assert!(store.detail(&bookmark.key()).is_some());
        assert_eq!(*fired.borrow(), 1);
        assert!(store.persistence().write_failures() >= 1);
    }

    #[test]
    fn test_reopen_restores_document() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let bookmark;
        {
            let mut store = BookmarkStore::open(
                PersistenceAdapter::inline(kv.clone()),
                "ws-1",
                ChangeNotifier::new(),
            );
            bookmark = store
                .add(FILE_A, NewBookmark::line(9).label("keep me"))
                .unwrap();
        }

        // The stamped workspace wins over the one passed on reopen
        let store = BookmarkStore::open(
            PersistenceAdapter::inline(kv),
            "ws-2",
            ChangeNotifier::new(),
        );
        assert_eq!(store.workspace(), "ws-1");
        assert_eq!(store.detail(&bookmark.key()).unwrap().label, "keep me");
    }

    #[test]
    fn test_open_corrupt_document_starts_empty() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(BOOKMARKS_KEY, b"[1, 2").unwrap();

        let store = BookmarkStore::open(
            PersistenceAdapter::inline(kv.clone()),
            "ws",
            ChangeNotifier::new(),
        );
        assert_eq!(store.total_count(), 0);
        assert!(kv.get("markr.bookmarks.corrupt").unwrap().is_some());

        // The empty document replaced the corrupt one
        let reloaded = PersistenceAdapter::inline(kv).load().unwrap().unwrap();
        assert_eq!(reloaded.workspace, "ws");
    }

    /// Memory store whose backup writes fail
    #[derive(Default)]
    struct NoBackupStore {
        inner: MemoryKeyValueStore,
    }

    impl KeyValueStore for NoBackupStore {
        fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
            if key.ends_with(".corrupt") {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_open_corrupt_document_without_backup_is_not_overwritten() {
        let kv = Arc::new(NoBackupStore::default());
        kv.inner.set(BOOKMARKS_KEY, b"{\"workspace\": \"ws\", \"data\": [").unwrap();

        let store = BookmarkStore::open(
            PersistenceAdapter::inline(kv.clone()),
            "ws",
            ChangeNotifier::new(),
        );
        assert_eq!(store.total_count(), 0);
        assert_eq!(
            kv.inner.get(BOOKMARKS_KEY).unwrap().unwrap(),
            b"{\"workspace\": \"ws\", \"data\": ["
        );
        assert!(store.persistence().last_failure().is_some());

        let mut store = store;
        store.add(FILE_A, NewBookmark::line(1)).unwrap();
        assert_eq!(store.total_count(), 1);
        assert_eq!(
            kv.inner.get(BOOKMARKS_KEY).unwrap().unwrap(),
            b"{\"workspace\": \"ws\", \"data\": ["
        );
    }

    #[test]
    fn test_save_with_replacement_keeps_workspace_stamp() {
        let (mut store, _) = memory_store();
        let mut replacement = BookmarkStoreRoot::empty("other");
        let mut group = BookmarkFileGroup::new(&file(FILE_B));
        group
            .bookmarks
            .push(NewBookmark::line(1).into_bookmark(Uuid::new_v4(), file(FILE_B).hash()));
        replacement.data.push(group);

        store.save(Some(replacement));
        assert_eq!(store.workspace(), "workspace-hash");
        assert_eq!(store.root().data.len(), 1);
    }

    #[test]
    fn test_save_with_replacement_removes_duplicates() {
        let (mut store, _) = memory_store();
        let bookmark = store.add(FILE_A, NewBookmark::line(4)).unwrap();

        let mut replacement = store.root().clone();
        let duplicate = replacement.data[0].clone();
        replacement.data.push(duplicate);
        store.save(Some(replacement));

        assert_eq!(store.root().data.len(), 1);
        assert_eq!(store.total_count(), 1);

        store.remove(&bookmark.key());
        assert_eq!(store.total_count(), 0);
        assert!(store.find_by_id(bookmark.id).is_none());
    }

    #[test]
    fn test_jump_target_and_lookups() {
        let (mut store, _) = memory_store();
        let range = TextRange::new(10, 0, 14, 2).unwrap();
        let bookmark = store
            .add(FILE_A, NewBookmark::selection(range).label("block"))
            .unwrap();
        store.add(FILE_A, NewBookmark::line(20).color("red")).unwrap();

        let target = store.jump_target(&bookmark.key()).unwrap();
        assert_eq!(target.file_uri, FILE_A);
        assert_eq!(target.filename, "a.rs");
        assert_eq!(target.range, range);

        assert_eq!(store.bookmark_at(&file(FILE_A), 12).unwrap().id, bookmark.id);
        assert!(store.bookmark_at(&file(FILE_A), 15).is_none());
        assert_eq!(store.find_by_id(bookmark.id).unwrap().label, "block");
        assert_eq!(store.labeled_count(), 1);
        assert_eq!(store.colors(), vec!["default", "red"]);
    }

    #[test]
    fn test_open_with_config_uses_workspace_dir() {
        let temp_dir = TempDir::new().unwrap();
        let workspace_root = temp_dir.path().join("project");
        std::fs::create_dir_all(&workspace_root).unwrap();
        let config = Config {
            data_dir: temp_dir.path().join("data"),
            ..Config::default()
        };

        let mut store =
            BookmarkStore::open_with_config(&config, &workspace_root, ChangeNotifier::new())
                .unwrap();
        let path = workspace_root.join("main.rs");
        std::fs::write(&path, "fn main() {}").unwrap();
        let file = FileIdentity::from_path(&path).unwrap();
        store.add_resolved(&file, NewBookmark::line(0));

        let doc = config
            .workspace_dir(store.workspace())
            .join(format!("{}.json", BOOKMARKS_KEY));
        assert!(doc.exists());

        let reopened =
            BookmarkStore::open_with_config(&config, &workspace_root, ChangeNotifier::new())
                .unwrap();
        assert_eq!(reopened.total_count(), 1);
    }

    #[tokio::test]
    async fn test_write_behind_store_flush() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let mut store = BookmarkStore::open(
            PersistenceAdapter::write_behind(kv.clone()),
            "ws",
            ChangeNotifier::new(),
        );

        let bookmark = store.add(FILE_A, NewBookmark::line(5)).unwrap();
        store.flush().await.unwrap();

        let loaded = PersistenceAdapter::inline(kv).load().unwrap().unwrap();
        assert_eq!(loaded.find(&bookmark.key()).unwrap().id, bookmark.id);
    }
}
