//! Status command handler

use std::path::Path;

use anyhow::Result;

use markr_core::{BookmarkStore, Config};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(
    store: &BookmarkStore,
    config: &Config,
    workspace_root: &Path,
    output: &Output,
) -> Result<()> {
    let storage_dir = config.workspace_dir(store.workspace());
    let colors = store.colors();
    let persistence = store.persistence();
    let failure = persistence.last_failure();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "workspace": store.workspace(),
                    "workspace_root": workspace_root,
                    "storage_dir": storage_dir,
                    "counts": {
                        "files": store.root().data.len(),
                        "bookmarks": store.total_count(),
                        "labeled": store.labeled_count()
                    },
                    "colors": colors,
                    "storage": {
                        "write_failures": persistence.write_failures(),
                        "holding_writes": persistence.is_holding_writes(),
                        "last_failure": failure.as_ref().map(|f| serde_json::json!({
                            "message": f.message,
                            "recoverable": f.recoverable,
                            "suggestion": f.suggestion
                        }))
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", store.total_count());
        }
        OutputFormat::Human => {
            println!("Markr Status");
            println!("============");
            println!();
            println!("Workspace:");
            println!("  Root: {}", workspace_root.display());
            println!("  Hash: {}", store.workspace());
            println!();
            println!("Storage:");
            println!("  Location: {}", storage_dir.display());
            if persistence.write_failures() > 0 {
                println!(
                    "  Failed writes this session: {}",
                    persistence.write_failures()
                );
            }
            if persistence.is_holding_writes() {
                println!("  Changes are not being saved: the stored document could not be loaded");
            }
            if let Some(ref failure) = failure {
                println!("  Last error: {}", failure.message);
                if let Some(suggestion) = failure.suggestion {
                    println!("  Suggestion: {}", suggestion);
                }
            }
            println!();
            println!("Contents:");
            println!("  Files:     {}", store.root().data.len());
            println!("  Bookmarks: {}", store.total_count());
            println!("  Labeled:   {}", store.labeled_count());
            if !colors.is_empty() {
                println!("  Colors:    {}", colors.join(", "));
            }
        }
    }

    Ok(())
}
