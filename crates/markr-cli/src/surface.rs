//! Terminal decoration surface
//!
//! Prints the decoration calls the engine dispatches instead of drawing them.

use std::collections::HashMap;

use markr_core::{DecorationRange, DecorationStyle, DecorationSurface, StyleHandle};

use crate::output::OutputFormat;

/// Decoration call as printed
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintedCall {
    pub editor: String,
    pub color: String,
    pub labeled: bool,
    pub ranges: Vec<DecorationRange>,
}

#[derive(Debug)]
pub struct TerminalSurface {
    format: OutputFormat,
    /// Print empty calls too
    verbose: bool,
    next_handle: u64,
    styles: HashMap<StyleHandle, DecorationStyle>,
    calls: Vec<PrintedCall>,
    notices: Vec<String>,
}

impl TerminalSurface {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self {
            format,
            verbose,
            next_handle: 0,
            styles: HashMap::new(),
            calls: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Calls recorded since the last drain
    pub fn take_calls(&mut self) -> Vec<PrintedCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn style(&self, handle: StyleHandle) -> Option<&DecorationStyle> {
        self.styles.get(&handle)
    }
}

impl DecorationSurface for TerminalSurface {
    fn create_style(&mut self, style: &DecorationStyle) -> StyleHandle {
        self.next_handle += 1;
        let handle = StyleHandle(self.next_handle);
        self.styles.insert(handle, style.clone());
        handle
    }

    fn release_style(&mut self, handle: StyleHandle) {
        self.styles.remove(&handle);
    }

    fn set_decorations(&mut self, editor: &str, style: StyleHandle, ranges: &[DecorationRange]) {
        let (color, labeled) = self
            .styles
            .get(&style)
            .map(|s| (s.color_key.clone(), s.labeled))
            .unwrap_or_else(|| (format!("#{}", style.0), false));

        if self.format == OutputFormat::Human && (self.verbose || !ranges.is_empty()) {
            let marker = if labeled { "tag" } else { "mark" };
            if ranges.is_empty() {
                println!("{:<10} {:<4} (cleared)", color, marker);
            }
            for range in ranges {
                let hover = range.hover_message.replace("\n\n", " | ");
                if hover.is_empty() {
                    println!("{:<10} {:<4} {}", color, marker, range.range);
                } else {
                    println!("{:<10} {:<4} {}  {}", color, marker, range.range, hover);
                }
            }
        }

        self.calls.push(PrintedCall {
            editor: editor.to_string(),
            color,
            labeled,
            ranges: ranges.to_vec(),
        });
    }

    fn show_information(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markr_core::{Config, DecorationSyncEngine, FileIdentity, BookmarkStoreRoot};

    #[test]
    fn test_engine_calls_are_recorded() {
        let config = Config::default();
        let mut engine =
            DecorationSyncEngine::new(TerminalSurface::new(OutputFormat::Quiet, false), &config);
        let file = FileIdentity::from_uri("file:///nonexistent/src/lib.rs").unwrap();

        let calls = engine.sync_editor(&BookmarkStoreRoot::empty("ws"), &file, false);
        let recorded = engine.surface_mut().take_calls();

        assert_eq!(recorded.len(), calls);
        assert_eq!(recorded.len(), config.colors.len() * 2);
        assert!(recorded.iter().all(|c| c.ranges.is_empty()));
        assert!(recorded.iter().any(|c| c.color == "default" && c.labeled));
    }

    #[test]
    fn test_released_styles_are_forgotten() {
        let mut surface = TerminalSurface::new(OutputFormat::Quiet, false);
        let style = DecorationStyle::build(
            "red",
            false,
            &Config::default().decoration,
            &Config::default().colors,
        );
        let handle = surface.create_style(&style);
        assert!(surface.style(handle).is_some());

        surface.release_style(handle);
        assert!(surface.style(handle).is_none());
    }
}
