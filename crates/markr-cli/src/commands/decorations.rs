//! Decorations command handler
//!
//! Runs the decoration engine against one file and prints the calls it
//! would send to an editor.

use std::path::PathBuf;

use anyhow::Result;

use markr_core::{BookmarkStore, Config, DecorationSyncEngine};

use super::bookmark::resolve_file;
use crate::output::{Output, OutputFormat};
use crate::surface::TerminalSurface;

/// Print the decoration calls for a file
pub fn show(
    store: &BookmarkStore,
    config: &Config,
    file: PathBuf,
    clear: bool,
    all: bool,
    output: &Output,
) -> Result<()> {
    let file = resolve_file(&file)?;
    let mut engine = DecorationSyncEngine::new(TerminalSurface::new(output.format, all), config);
    for notice in engine.surface_mut().take_notices() {
        output.notice(&notice);
    }

    engine.set_visible_editors(vec![file.clone()]);
    let issued = engine.sync_visible(store.root(), clear);
    let calls = engine.surface_mut().take_calls();
    engine.dispose();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "editor": file.uri(),
                    "calls": calls,
                })
            );
        }
        OutputFormat::Quiet => {
            let painted = calls.iter().map(|c| c.ranges.len()).sum::<usize>();
            println!("{}", painted);
        }
        OutputFormat::Human => {
            let painted = calls.iter().filter(|c| !c.ranges.is_empty()).count();
            println!();
            println!(
                "{} call(s) for {}, {} with ranges",
                issued,
                file.filename(),
                painted
            );
        }
    }
    Ok(())
}
