//! Bookmark command handlers

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use uuid::Uuid;

use markr_core::{
    BookmarkKey, BookmarkStore, EditorLocation, FileIdentity, GroupView, SortOrder, TextRange,
    ToggleOptions, ToggleOutcome, WorkspaceFolderRef,
};

use crate::output::Output;
use crate::prompt::{confirm, prompt_with_default};

/// A cursor or selection in a file, in 1-based lines and columns
#[derive(Args, Debug, Clone)]
pub struct LocationArgs {
    /// File path (relative to the current directory)
    pub file: PathBuf,
    /// Line number
    pub line: u32,
    /// Start column of a selection
    #[arg(long)]
    pub col: Option<u32>,
    /// Last line of a selection
    #[arg(long)]
    pub end_line: Option<u32>,
    /// End column of a selection
    #[arg(long)]
    pub end_col: Option<u32>,
}

impl LocationArgs {
    /// Whether any selection bound was given
    pub fn is_selection(&self) -> bool {
        self.col.is_some() || self.end_line.is_some() || self.end_col.is_some()
    }

    /// Zero-based range covered by these arguments
    pub fn range(&self) -> Result<TextRange> {
        let start_line = zero_based(self.line, "line")?;
        if !self.is_selection() {
            return Ok(TextRange::line(start_line));
        }
        let start_col = zero_based(self.col.unwrap_or(1), "col")?;
        let end_line = zero_based(self.end_line.unwrap_or(self.line), "end-line")?;
        let end_col = zero_based(self.end_col.unwrap_or(self.col.unwrap_or(1)), "end-col")?;
        Ok(TextRange::new(start_line, start_col, end_line, end_col)?)
    }
}

/// Options applied when a toggle creates a bookmark
#[derive(Args, Debug, Clone, Default)]
pub struct ToggleArgs {
    /// Label for the new bookmark
    #[arg(short, long)]
    pub label: Option<String>,
    /// Description for the new bookmark
    #[arg(short, long)]
    pub description: Option<String>,
    /// Color key for the new bookmark
    #[arg(short, long)]
    pub color: Option<String>,
}

/// Add a bookmark at a location, or remove the one already there
pub fn toggle(
    store: &mut BookmarkStore,
    workspace_root: &Path,
    location: LocationArgs,
    args: ToggleArgs,
    output: &Output,
) -> Result<()> {
    let file = resolve_file(&location.file)?;
    let range = location.range()?;

    let mut editor_location = EditorLocation::new(file.uri(), range)
        .language_id(language_id(file.path()));
    if let Some(folder) = workspace_folder(workspace_root, file.path()) {
        editor_location = editor_location.workspace_folder(folder);
    }

    let mut options = if location.is_selection() {
        let content = std::fs::read_to_string(file.path()).unwrap_or_default();
        editor_location = editor_location.selected_text(extract_text(&content, &range));
        ToggleOptions::selection()
    } else {
        ToggleOptions::line()
    };
    options.label = args.label;
    options.description = args.description;
    options.color = args.color;

    match store.toggle(&editor_location, options) {
        ToggleOutcome::Added(bookmark) => {
            output.success(&format!(
                "Added bookmark {} at {}:{}",
                short_id(bookmark.id),
                file.filename(),
                bookmark.range.start_line() + 1
            ));
            output.print_bookmark(&bookmark, file.uri());
        }
        ToggleOutcome::Removed(bookmark) => {
            output.success(&format!(
                "Removed bookmark {} at {}:{}",
                short_id(bookmark.id),
                file.filename(),
                bookmark.range.start_line() + 1
            ));
        }
        ToggleOutcome::Skipped(err) => {
            output.notice(&err.user_notice().unwrap_or_else(|| err.to_string()));
        }
    }
    Ok(())
}

/// List bookmarks grouped and sorted
pub fn list(store: &BookmarkStore, view: GroupView, sort: SortOrder, output: &Output) -> Result<()> {
    output.print_grouped(&store.grouped(view, sort));
    Ok(())
}

/// Show a single bookmark
pub fn show(store: &BookmarkStore, id: String, output: &Output) -> Result<()> {
    let key = parse_bookmark_id(&id, store)?;
    let target = store
        .jump_target(&key)
        .ok_or_else(|| anyhow::anyhow!("Bookmark not found: {}", id))?;
    let bookmark = store
        .detail(&key)
        .ok_or_else(|| anyhow::anyhow!("Bookmark not found: {}", id))?;

    output.print_bookmark(bookmark, &target.file_uri);
    Ok(())
}

/// Set a label, prompting when none is given
pub fn label(
    store: &mut BookmarkStore,
    id: String,
    label: Option<String>,
    output: &Output,
) -> Result<()> {
    let key = parse_bookmark_id(&id, store)?;
    let current = store.detail(&key).map(|b| b.label.clone()).unwrap_or_default();
    let Some(label) = value_or_prompt(label, "Label", &current, output)? else {
        output.message("No label entered, nothing changed.");
        return Ok(());
    };

    match store.edit_label(&key, label) {
        Some(bookmark) => output.success(&format!("Labeled {}: {}", short_id(bookmark.id), bookmark.label)),
        None => output.message("Bookmark no longer exists."),
    }
    Ok(())
}

/// Set a description, prompting when none is given
pub fn describe(
    store: &mut BookmarkStore,
    id: String,
    description: Option<String>,
    output: &Output,
) -> Result<()> {
    let key = parse_bookmark_id(&id, store)?;
    let current = store
        .detail(&key)
        .map(|b| b.description.clone())
        .unwrap_or_default();
    let Some(description) = value_or_prompt(description, "Description", &current, output)? else {
        output.message("No description entered, nothing changed.");
        return Ok(());
    };

    match store.edit_description(&key, description) {
        Some(bookmark) => output.success(&format!("Updated description of {}", short_id(bookmark.id))),
        None => output.message("Bookmark no longer exists."),
    }
    Ok(())
}

/// Change a bookmark's color, prompting when none is given
pub fn color(
    store: &mut BookmarkStore,
    id: String,
    color: Option<String>,
    palette: &[String],
    output: &Output,
) -> Result<()> {
    let key = parse_bookmark_id(&id, store)?;
    let current = store.detail(&key).map(|b| b.color.clone()).unwrap_or_default();
    if color.is_none() && output.should_prompt() {
        output.message(&format!("Colors: {}", palette.join(", ")));
    }
    let Some(color) = value_or_prompt(color, "Color", &current, output)? else {
        output.message("No color chosen, nothing changed.");
        return Ok(());
    };
    if !palette.contains(&color) {
        output.notice(&format!(
            "'{}' is not in the palette; it will be drawn with the default color",
            color
        ));
    }

    match store.change_color(&key, color) {
        Some(bookmark) => output.success(&format!("Colored {} {}", short_id(bookmark.id), bookmark.color)),
        None => output.message("Bookmark no longer exists."),
    }
    Ok(())
}

/// Re-anchor a bookmark to a new location in the same file
pub fn move_to(
    store: &mut BookmarkStore,
    id: String,
    line: u32,
    end_line: Option<u32>,
    output: &Output,
) -> Result<()> {
    let key = parse_bookmark_id(&id, store)?;
    let start = zero_based(line, "line")?;
    let range = match end_line {
        Some(end) => TextRange::new(start, 0, zero_based(end, "end-line")?, 0)?,
        None => TextRange::line(start),
    };

    match store.move_to(&key, range).context("Failed to move bookmark")? {
        Some(bookmark) => output.success(&format!("Moved {} to {}", short_id(bookmark.id), bookmark.range)),
        None => output.message("Bookmark no longer exists."),
    }
    Ok(())
}

/// Delete a bookmark
pub fn delete(store: &mut BookmarkStore, id: String, yes: bool, output: &Output) -> Result<()> {
    let key = parse_bookmark_id(&id, store)?;
    let Some(bookmark) = store.detail(&key) else {
        bail!("Bookmark not found: {}", id);
    };

    if !yes && output.should_prompt() {
        println!(
            "Delete bookmark: {} - {}",
            short_id(bookmark.id),
            bookmark.display_name()
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if store.remove(&key).is_some() {
        output.success(&format!("Deleted bookmark: {}", key.id));
    }
    Ok(())
}

/// Clear bookmarks of one file, or of the whole workspace
pub fn clear(
    store: &mut BookmarkStore,
    file: Option<PathBuf>,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let file = file.map(|path| resolve_file(&path)).transpose()?;
    let count = match &file {
        Some(file) => store.bookmarks_in_file(file).len(),
        None => store.total_count(),
    };
    if count == 0 {
        output.message("No bookmarks to clear.");
        return Ok(());
    }

    if !yes && output.should_prompt() {
        let scope = file
            .as_ref()
            .map(|f| f.filename())
            .unwrap_or_else(|| "this workspace".to_string());
        if !confirm(&format!("Delete {} bookmark(s) in {}?", count, scope))? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    match &file {
        Some(file) => {
            let removed = store.clear_all_in_file(file);
            output.success(&format!("Cleared {} bookmark(s) in {}", removed, file.filename()));
        }
        None => {
            store.clear_all();
            output.success(&format!("Cleared {} bookmark(s)", count));
        }
    }
    Ok(())
}

/// Print where a bookmark points, as `path:line:col`
pub fn jump(store: &BookmarkStore, id: String, output: &Output) -> Result<()> {
    let key = parse_bookmark_id(&id, store)?;
    let target = store
        .jump_target(&key)
        .ok_or_else(|| anyhow::anyhow!("Bookmark not found: {}", id))?;

    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({
                "fileUri": target.file_uri,
                "filename": target.filename,
                "range": target.range,
            })
        );
    } else {
        let (line, col) = target.range.start();
        let path = FileIdentity::from_uri(&target.file_uri)
            .map(|f| f.path().display().to_string())
            .unwrap_or(target.file_uri);
        println!("{}:{}:{}", path, line + 1, col + 1);
    }
    Ok(())
}

/// Resolve a path argument into a file identity
pub fn resolve_file(path: &Path) -> Result<FileIdentity> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read current directory")?
            .join(path)
    };
    Ok(FileIdentity::from_path(&absolute)?)
}

/// Parse a bookmark ID (supports full UUID or prefix)
pub fn parse_bookmark_id(id: &str, store: &BookmarkStore) -> Result<BookmarkKey> {
    // Try full UUID first
    if let Ok(uuid) = Uuid::parse_str(id) {
        return store
            .find_by_id(uuid)
            .map(|b| b.key())
            .ok_or_else(|| anyhow::anyhow!("No bookmark found matching: {}", id));
    }

    // Try prefix match
    let matches: Vec<_> = store
        .root()
        .bookmarks()
        .filter(|b| b.id.to_string().starts_with(id))
        .collect();

    match matches.len() {
        0 => bail!("No bookmark found matching: {}", id),
        1 => Ok(matches[0].key()),
        _ => {
            eprintln!("Multiple bookmarks match '{}':", id);
            for bookmark in &matches {
                eprintln!("  {} - {}", bookmark.id, bookmark.display_name());
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

fn value_or_prompt(
    value: Option<String>,
    prompt: &str,
    current: &str,
    output: &Output,
) -> Result<Option<String>> {
    match value {
        Some(value) => Ok(Some(value)),
        None if output.should_prompt() => prompt_with_default(prompt, current),
        None => Ok(None),
    }
}

fn zero_based(value: u32, name: &str) -> Result<u32> {
    match value.checked_sub(1) {
        Some(v) => Ok(v),
        None => bail!("{} numbers start at 1", name),
    }
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Language identifier derived from the file extension
fn language_id(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "md" => "markdown",
        "toml" => "toml",
        "json" => "json",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "sh" => "shellscript",
        "" => "plaintext",
        other => other,
    }
    .to_string()
}

/// Workspace folder owning `path`, if any
fn workspace_folder(workspace_root: &Path, path: &Path) -> Option<WorkspaceFolderRef> {
    let root = std::fs::canonicalize(workspace_root).ok()?;
    if !path.starts_with(&root) {
        return None;
    }
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    Some(WorkspaceFolderRef::new(name, 0))
}

/// Text covered by `range`, with columns counted in characters
fn extract_text(content: &str, range: &TextRange) -> String {
    let mut out = String::new();
    for (idx, line) in content.lines().enumerate() {
        let idx = idx as u32;
        if idx < range.start_line() {
            continue;
        }
        if idx > range.end_line() {
            break;
        }
        let start = if idx == range.start_line() {
            range.start_col() as usize
        } else {
            0
        };
        let end = if idx == range.end_line() {
            range.end_col() as usize
        } else {
            usize::MAX
        };
        if idx > range.start_line() {
            out.push('\n');
        }
        out.extend(line.chars().skip(start).take(end.saturating_sub(start)));
    }
    out
}
