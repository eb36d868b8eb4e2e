//! Derived views over the bookmark document
//!
//! Every function here is pure: it borrows the document, builds a fresh
//! grouping and never mutates. Groups appear in the order their first
//! bookmark appears in the document. Bookmarks inside a group are sorted
//! with a stable sort, so equal keys keep insertion order.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{Bookmark, BookmarkStoreRoot, WorkspaceFolderRef};

/// Name shown for bookmarks created outside any workspace folder
pub const NO_WORKSPACE: &str = "(no workspace)";

/// How bookmarks are grouped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupView {
    #[default]
    File,
    Color,
    Workspace,
}

impl FromStr for GroupView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(GroupView::File),
            "color" => Ok(GroupView::Color),
            "workspace" => Ok(GroupView::Workspace),
            other => Err(format!(
                "unknown group view '{}' (expected file, color or workspace)",
                other
            )),
        }
    }
}

/// Order of bookmarks inside a group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    /// Start line, then start column
    #[default]
    LineNumber,
    /// Creation time, then position
    CreatedAt,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "line" | "linenumber" => Ok(SortOrder::LineNumber),
            "time" | "createdat" => Ok(SortOrder::CreatedAt),
            other => Err(format!(
                "unknown sort order '{}' (expected line or time)",
                other
            )),
        }
    }
}

/// Bookmarks of one file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroupView<'a> {
    pub file_id: &'a str,
    pub filename: &'a str,
    pub file_uri: &'a str,
    pub bookmarks: Vec<&'a Bookmark>,
}

/// Bookmarks sharing a color key
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorGroupView<'a> {
    pub color: &'a str,
    pub bookmarks: Vec<&'a Bookmark>,
}

/// Files bookmarked within one workspace folder
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceGroupView<'a> {
    /// Folder as stored on the first bookmark of the group
    pub folder: Option<&'a WorkspaceFolderRef>,
    pub files: Vec<FileGroupView<'a>>,
}

impl WorkspaceGroupView<'_> {
    pub fn name(&self) -> &str {
        self.folder
            .map(|f| f.name.as_str())
            .unwrap_or(NO_WORKSPACE)
    }

    pub fn bookmark_count(&self) -> usize {
        self.files.iter().map(|f| f.bookmarks.len()).sum()
    }
}

/// Result of grouping with a selectable view
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", content = "groups", rename_all = "lowercase")]
pub enum GroupedView<'a> {
    File(Vec<FileGroupView<'a>>),
    Color(Vec<ColorGroupView<'a>>),
    Workspace(Vec<WorkspaceGroupView<'a>>),
}

/// Stable in-place sort
pub fn sort_bookmarks(bookmarks: &mut [&Bookmark], order: SortOrder) {
    match order {
        SortOrder::LineNumber => bookmarks.sort_by_key(|b| b.range.start()),
        SortOrder::CreatedAt => bookmarks.sort_by_key(|b| (b.created_at, b.range.start())),
    }
}

/// One group per file, bookmarks sorted within each
pub fn group_by_file(root: &BookmarkStoreRoot, order: SortOrder) -> Vec<FileGroupView<'_>> {
    root.data
        .iter()
        .filter(|g| !g.is_empty())
        .map(|g| {
            let mut bookmarks: Vec<&Bookmark> = g.bookmarks.iter().collect();
            sort_bookmarks(&mut bookmarks, order);
            FileGroupView {
                file_id: &g.id,
                filename: &g.filename,
                file_uri: &g.file_uri,
                bookmarks,
            }
        })
        .collect()
}

/// One group per color key present in the document
pub fn group_by_color(root: &BookmarkStoreRoot, order: SortOrder) -> Vec<ColorGroupView<'_>> {
    let mut groups: Vec<ColorGroupView<'_>> = Vec::new();
    for bookmark in root.bookmarks() {
        match groups.iter_mut().find(|g| g.color == bookmark.color) {
            Some(group) => group.bookmarks.push(bookmark),
            None => groups.push(ColorGroupView {
                color: &bookmark.color,
                bookmarks: vec![bookmark],
            }),
        }
    }
    for group in &mut groups {
        sort_bookmarks(&mut group.bookmarks, order);
    }
    groups
}

/// Workspace folder, then file, then sorted bookmarks
///
/// Membership comes from the folder name stored on each bookmark, so a
/// folder that is no longer open still gets its group.
pub fn group_by_workspace(
    root: &BookmarkStoreRoot,
    order: SortOrder,
) -> Vec<WorkspaceGroupView<'_>> {
    let mut groups: Vec<WorkspaceGroupView<'_>> = Vec::new();

    for file_group in root.data.iter() {
        for bookmark in &file_group.bookmarks {
            let folder_name = bookmark.workspace_folder.as_ref().map(|f| f.name.as_str());
            let idx = match groups
                .iter()
                .position(|g| g.folder.map(|f| f.name.as_str()) == folder_name)
            {
                Some(idx) => idx,
                None => {
                    groups.push(WorkspaceGroupView {
                        folder: bookmark.workspace_folder.as_ref(),
                        files: Vec::new(),
                    });
                    groups.len() - 1
                }
            };

            let files = &mut groups[idx].files;
            match files.iter_mut().find(|f| f.file_id == file_group.id) {
                Some(file) => file.bookmarks.push(bookmark),
                None => files.push(FileGroupView {
                    file_id: &file_group.id,
                    filename: &file_group.filename,
                    file_uri: &file_group.file_uri,
                    bookmarks: vec![bookmark],
                }),
            }
        }
    }

    for group in &mut groups {
        for file in &mut group.files {
            sort_bookmarks(&mut file.bookmarks, order);
        }
    }
    groups
}

/// Group with the given view
pub fn grouped(root: &BookmarkStoreRoot, view: GroupView, order: SortOrder) -> GroupedView<'_> {
    match view {
        GroupView::File => GroupedView::File(group_by_file(root, order)),
        GroupView::Color => GroupedView::Color(group_by_color(root, order)),
        GroupView::Workspace => GroupedView::Workspace(group_by_workspace(root, order)),
    }
}
