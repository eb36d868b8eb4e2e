//! Data models for markr
//!
//! Defines the bookmark record, the per-file group that owns it and the root
//! document that is persisted once per workspace. These are plain values:
//! mutation goes through `BookmarkStore`, everything else reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BookmarkError;
use crate::identity::FileIdentity;

/// Color key used when none is given
pub const DEFAULT_COLOR: &str = "default";

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// How a bookmark was anchored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkType {
    /// Whole line, anchored at column 0
    #[default]
    Line,
    /// Explicit selection range
    Selection,
}

impl std::fmt::Display for BookmarkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookmarkType::Line => write!(f, "line"),
            BookmarkType::Selection => write!(f, "selection"),
        }
    }
}

/// Range as it appears on the wire, before validation
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRange {
    start_line: u32,
    start_col: u32,
    end_line: u32,
    end_col: u32,
}

impl TryFrom<RawRange> for TextRange {
    type Error = BookmarkError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        TextRange::new(raw.start_line, raw.start_col, raw.end_line, raw.end_col)
    }
}

/// Zero-based source range; start never comes after end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRange")]
pub struct TextRange {
    start_line: u32,
    start_col: u32,
    end_line: u32,
    end_col: u32,
}

impl TextRange {
    /// Create a validated range
    pub fn new(
        start_line: u32,
        start_col: u32,
        end_line: u32,
        end_col: u32,
    ) -> Result<Self, BookmarkError> {
        if (start_line, start_col) > (end_line, end_col) {
            return Err(BookmarkError::InvalidRange {
                start_line,
                start_col,
                end_line,
                end_col,
            });
        }
        Ok(Self {
            start_line,
            start_col,
            end_line,
            end_col,
        })
    }

    /// Collapsed range at the start of `line`
    pub fn line(line: u32) -> Self {
        Self::point(line, 0)
    }

    /// Collapsed range at `line:col`
    pub fn point(line: u32, col: u32) -> Self {
        Self {
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col,
        }
    }

    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn start_col(&self) -> u32 {
        self.start_col
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    pub fn end_col(&self) -> u32 {
        self.end_col
    }

    /// Sort key: start line, then start column
    pub fn start(&self) -> (u32, u32) {
        (self.start_line, self.start_col)
    }

    /// Whether the range covers no characters
    pub fn is_empty(&self) -> bool {
        self.start_line == self.end_line && self.start_col == self.end_col
    }

    /// Whether `line` falls within the range
    pub fn contains_line(&self, line: u32) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }
}

impl std::fmt::Display for TextRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line + 1,
            self.start_col + 1,
            self.end_line + 1,
            self.end_col + 1
        )
    }
}

/// Field-by-field range update; unset fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangePatch {
    pub start_line: Option<u32>,
    pub start_col: Option<u32>,
    pub end_line: Option<u32>,
    pub end_col: Option<u32>,
}

impl RangePatch {
    /// Patch that replaces every field of the range
    pub fn replace(range: TextRange) -> Self {
        Self {
            start_line: Some(range.start_line),
            start_col: Some(range.start_col),
            end_line: Some(range.end_line),
            end_col: Some(range.end_col),
        }
    }

    /// Apply the patch, validating the merged result
    pub fn apply_to(&self, range: &TextRange) -> Result<TextRange, BookmarkError> {
        TextRange::new(
            self.start_line.unwrap_or(range.start_line),
            self.start_col.unwrap_or(range.start_col),
            self.end_line.unwrap_or(range.end_line),
            self.end_col.unwrap_or(range.end_col),
        )
    }
}

/// Workspace folder a bookmark was created in, as last seen
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceFolderRef {
    pub name: String,
    #[serde(default)]
    pub index: u32,
}

impl WorkspaceFolderRef {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

/// Address of a bookmark inside the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkKey {
    pub file_id: String,
    pub id: Uuid,
}

impl std::fmt::Display for BookmarkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.file_id, self.id)
    }
}

/// One marked location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    /// Unique identifier
    pub id: Uuid,
    /// Id of the owning file group
    #[serde(default)]
    pub file_uri_hash: String,
    /// Optional short label (empty when unset)
    #[serde(default)]
    pub label: String,
    /// Optional longer description (empty when unset)
    #[serde(default)]
    pub description: String,
    /// Logical color key, resolved against the configured palette
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(rename = "type", default)]
    pub kind: BookmarkType,
    /// Anchored range; only changes through an explicit update
    pub range: TextRange,
    #[serde(default)]
    pub language_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_folder: Option<WorkspaceFolderRef>,
    /// Text covered by a selection bookmark when it was created
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selection_content: String,
}

impl Bookmark {
    /// Key used to address this bookmark in the store
    pub fn key(&self) -> BookmarkKey {
        BookmarkKey {
            file_id: self.file_uri_hash.clone(),
            id: self.id,
        }
    }

    pub fn has_label(&self) -> bool {
        !self.label.is_empty()
    }

    /// Hover markdown derived from label and description
    ///
    /// Computed on every call so it can never go stale.
    pub fn render_hint(&self) -> String {
        let mut hint = String::new();
        if !self.label.is_empty() {
            hint.push_str("#### ");
            hint.push_str(&self.label);
        }
        if !self.description.is_empty() {
            if !hint.is_empty() {
                hint.push_str("\n\n");
            }
            hint.push_str(&self.description);
        }
        hint
    }

    /// Name shown in lists: the label, falling back to the position
    pub fn display_name(&self) -> String {
        if self.label.is_empty() {
            format!("line {}", self.range.start_line() + 1)
        } else {
            self.label.clone()
        }
    }
}

/// Fields supplied when creating a bookmark; the store assigns id and owner
#[derive(Debug, Clone, PartialEq)]
pub struct NewBookmark {
    pub kind: BookmarkType,
    pub range: TextRange,
    pub label: String,
    pub description: String,
    pub color: Option<String>,
    pub language_id: String,
    pub workspace_folder: Option<WorkspaceFolderRef>,
    pub selection_content: String,
}

impl NewBookmark {
    /// Line bookmark at `line`
    pub fn line(line: u32) -> Self {
        Self::with_range(BookmarkType::Line, TextRange::line(line))
    }

    /// Selection bookmark over `range`
    pub fn selection(range: TextRange) -> Self {
        Self::with_range(BookmarkType::Selection, range)
    }

    pub fn with_range(kind: BookmarkType, range: TextRange) -> Self {
        Self {
            kind,
            range,
            label: String::new(),
            description: String::new(),
            color: None,
            language_id: String::new(),
            workspace_folder: None,
            selection_content: String::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn language_id(mut self, language_id: impl Into<String>) -> Self {
        self.language_id = language_id.into();
        self
    }

    pub fn workspace_folder(mut self, folder: WorkspaceFolderRef) -> Self {
        self.workspace_folder = Some(folder);
        self
    }

    pub fn selection_content(mut self, content: impl Into<String>) -> Self {
        self.selection_content = content.into();
        self
    }

    /// Materialize into a bookmark owned by `file_id`
    pub(crate) fn into_bookmark(self, id: Uuid, file_id: &str) -> Bookmark {
        Bookmark {
            id,
            file_uri_hash: file_id.to_string(),
            label: self.label,
            description: self.description,
            color: self.color.unwrap_or_else(default_color),
            kind: self.kind,
            range: self.range,
            language_id: self.language_id,
            created_at: Utc::now(),
            workspace_folder: self.workspace_folder,
            selection_content: self.selection_content,
        }
    }
}

/// Partial update; `None` fields are left untouched
///
/// `id`, owner and creation time are not part of the DTO and cannot change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkDto {
    pub label: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<BookmarkType>,
    pub range: Option<RangePatch>,
    pub language_id: Option<String>,
    pub workspace_folder: Option<WorkspaceFolderRef>,
    pub selection_content: Option<String>,
}

impl BookmarkDto {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            ..Self::default()
        }
    }

    pub fn range(patch: RangePatch) -> Self {
        Self {
            range: Some(patch),
            ..Self::default()
        }
    }

    /// Compute the merged bookmark without touching `existing`
    ///
    /// Validation runs before anything is produced, so a failed merge leaves
    /// no trace.
    pub fn merge(&self, existing: &Bookmark) -> Result<Bookmark, BookmarkError> {
        let range = match &self.range {
            Some(patch) => patch.apply_to(&existing.range)?,
            None => existing.range,
        };

        let mut merged = existing.clone();
        merged.range = range;
        if let Some(label) = &self.label {
            merged.label = label.clone();
        }
        if let Some(description) = &self.description {
            merged.description = description.clone();
        }
        if let Some(color) = &self.color {
            merged.color = color.clone();
        }
        if let Some(kind) = self.kind {
            merged.kind = kind;
        }
        if let Some(language_id) = &self.language_id {
            merged.language_id = language_id.clone();
        }
        if let Some(folder) = &self.workspace_folder {
            merged.workspace_folder = Some(folder.clone());
        }
        if let Some(content) = &self.selection_content {
            merged.selection_content = content.clone();
        }
        Ok(merged)
    }
}

/// All bookmarks belonging to one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkFileGroup {
    /// Hash of `file_uri`
    pub id: String,
    pub file_uri: String,
    pub filename: String,
    /// Insertion order; views re-sort on read
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

impl BookmarkFileGroup {
    /// Empty group for a resolved file
    pub fn new(file: &FileIdentity) -> Self {
        Self {
            id: file.hash().to_string(),
            file_uri: file.uri().to_string(),
            filename: file.filename(),
            bookmarks: Vec::new(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }
}

/// The whole persisted document for one workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkStoreRoot {
    /// Workspace hash, stamped at first initialization
    pub workspace: String,
    #[serde(default)]
    pub data: Vec<BookmarkFileGroup>,
}

impl BookmarkStoreRoot {
    /// Empty document stamped with `workspace`
    pub fn empty(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            data: Vec::new(),
        }
    }

    pub fn group(&self, file_id: &str) -> Option<&BookmarkFileGroup> {
        self.data.iter().find(|g| g.id == file_id)
    }

    pub fn find(&self, key: &BookmarkKey) -> Option<&Bookmark> {
        self.group(&key.file_id).and_then(|g| g.get(key.id))
    }

    /// Every bookmark, group by group, in insertion order
    pub fn bookmarks(&self) -> impl Iterator<Item = &Bookmark> {
        self.data.iter().flat_map(|g| g.bookmarks.iter())
    }

    pub fn total_count(&self) -> usize {
        self.data.iter().map(|g| g.bookmarks.len()).sum()
    }

    /// Repair a loaded document so the store invariants hold
    ///
    /// Merges groups sharing an id, drops bookmarks whose id was already
    /// seen, points every bookmark at its group and prunes empty groups.
    /// Returns the number of repairs made.
    pub fn normalize(&mut self) -> usize {
        let mut repairs = 0;
        let mut seen_ids = std::collections::HashSet::new();
        let mut groups: Vec<BookmarkFileGroup> = Vec::with_capacity(self.data.len());

        for mut group in std::mem::take(&mut self.data) {
            let before = group.bookmarks.len();
            group.bookmarks.retain(|b| seen_ids.insert(b.id));
            repairs += before - group.bookmarks.len();

            for bookmark in &mut group.bookmarks {
                if bookmark.file_uri_hash != group.id {
                    bookmark.file_uri_hash = group.id.clone();
                    repairs += 1;
                }
            }

            match groups.iter_mut().find(|g| g.id == group.id) {
                Some(existing) => {
                    existing.bookmarks.append(&mut group.bookmarks);
                    repairs += 1;
                }
                None => groups.push(group),
            }
        }

        let before = groups.len();
        groups.retain(|g| !g.is_empty());
        repairs += before - groups.len();

        self.data = groups;
        repairs
    }
}
