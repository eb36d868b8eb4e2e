//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use markr_core::{Bookmark, GroupedView};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single bookmark
    pub fn print_bookmark(&self, bookmark: &Bookmark, file_uri: &str) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", bookmark.id);
                println!("File:        {}", file_uri);
                println!("Range:       {}", bookmark.range);
                println!("Type:        {}", bookmark.kind);
                println!("Color:       {}", bookmark.color);
                if !bookmark.label.is_empty() {
                    println!("Label:       {}", bookmark.label);
                }
                if !bookmark.description.is_empty() {
                    println!("Description: {}", bookmark.description);
                }
                if !bookmark.language_id.is_empty() {
                    println!("Language:    {}", bookmark.language_id);
                }
                if let Some(ref folder) = bookmark.workspace_folder {
                    println!("Workspace:   {}", folder.name);
                }
                if !bookmark.selection_content.is_empty() {
                    println!(
                        "Selection:   {}",
                        truncate_line(&bookmark.selection_content, 60)
                    );
                }
                println!(
                    "Created:     {}",
                    bookmark.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            OutputFormat::Json => print_json(bookmark),
            OutputFormat::Quiet => {
                println!("{}", bookmark.id);
            }
        }
    }

    /// Print a grouped view
    pub fn print_grouped(&self, view: &GroupedView<'_>) {
        match self.format {
            OutputFormat::Human => {
                let mut total = 0;
                match view {
                    GroupedView::File(groups) => {
                        for group in groups {
                            println!("── {} ({}) ──", group.filename, group.bookmarks.len());
                            for bookmark in &group.bookmarks {
                                print_bookmark_row(bookmark);
                            }
                            total += group.bookmarks.len();
                        }
                    }
                    GroupedView::Color(groups) => {
                        for group in groups {
                            println!("── {} ({}) ──", group.color, group.bookmarks.len());
                            for bookmark in &group.bookmarks {
                                print_bookmark_row(bookmark);
                            }
                            total += group.bookmarks.len();
                        }
                    }
                    GroupedView::Workspace(groups) => {
                        for group in groups {
                            println!("══ {} ({}) ══", group.name(), group.bookmark_count());
                            for file in &group.files {
                                println!("  ── {} ──", file.filename);
                                for bookmark in &file.bookmarks {
                                    print!("  ");
                                    print_bookmark_row(bookmark);
                                }
                            }
                            total += group.bookmark_count();
                        }
                    }
                }
                if total == 0 {
                    println!("No bookmarks found.");
                } else {
                    println!("\n{} bookmark(s)", total);
                }
            }
            OutputFormat::Json => print_json(view),
            OutputFormat::Quiet => {
                let ids: Vec<String> = match view {
                    GroupedView::File(groups) => groups
                        .iter()
                        .flat_map(|g| g.bookmarks.iter().map(|b| b.id.to_string()))
                        .collect(),
                    GroupedView::Color(groups) => groups
                        .iter()
                        .flat_map(|g| g.bookmarks.iter().map(|b| b.id.to_string()))
                        .collect(),
                    GroupedView::Workspace(groups) => groups
                        .iter()
                        .flat_map(|g| g.files.iter())
                        .flat_map(|f| f.bookmarks.iter().map(|b| b.id.to_string()))
                        .collect(),
                };
                for id in ids {
                    println!("{}", id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a notice the core asked to surface to the user
    pub fn notice(&self, message: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("ℹ {}", message),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"status": "notice", "message": message}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for input or confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_bookmark_row(bookmark: &Bookmark) {
    println!(
        "{} | {:>5} | {:<8} | {}",
        &bookmark.id.to_string()[..8],
        format!("L{}", bookmark.range.start_line() + 1),
        truncate(&bookmark.color, 8),
        truncate(&bookmark.display_name(), 50)
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ünïcödé lábel", 6), "ünï...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("fn main() {\n}", 20), "fn main() {");
    }
}
