//! Decoration synchronization
//!
//! Keeps an editor's visual markers in step with the bookmark document.
//! The host editing surface is abstracted behind [`DecorationSurface`]: the
//! engine creates one style per color and label state, then on every sync
//! issues one `set_decorations` call per style. A color that lost all its
//! bookmarks is still painted with an empty range list; that empty call is
//! what clears stale markers.
//!
//! Styles are rebuilt from scratch on configuration change. Old handles are
//! released before new ones are created.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{Config, DecorationConfig};
use crate::identity::FileIdentity;
use crate::models::{Bookmark, BookmarkStoreRoot, TextRange, DEFAULT_COLOR};
use crate::notifier::Subscriber;

/// Used only when the palette has lost its `default` entry
const FALLBACK_COLOR_VALUE: &str = "#0062ff";

/// Opaque handle to a style created by the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StyleHandle(pub u64);

/// Overview ruler lane a marker is drawn in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RulerLane {
    Left,
    Center,
    Right,
}

/// Gutter icon request; the host draws the glyph in `color`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GutterIcon {
    pub color: String,
    /// Labeled bookmarks use a tag glyph
    pub labeled: bool,
}

/// Rendering options for one color and label state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationStyle {
    pub color_key: String,
    pub labeled: bool,
    pub is_whole_line: bool,
    pub border_radius: String,
    pub border_color: String,
    pub outline_color: String,
    pub font_weight: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview_ruler_lane: Option<RulerLane>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview_ruler_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gutter_icon: Option<GutterIcon>,
    /// Empty when borders are off
    pub border: String,
    pub outline: String,
    pub background_color: String,
    /// `line style thickness color`, empty when text decoration is off
    pub text_decoration: String,
}

impl DecorationStyle {
    /// Build the style for `color_key`
    ///
    /// `config` is expected to be validated already. Keys missing from the
    /// palette resolve to the `default` value.
    pub fn build(
        color_key: &str,
        labeled: bool,
        config: &DecorationConfig,
        palette: &BTreeMap<String, String>,
    ) -> Self {
        let default_value = palette
            .get(DEFAULT_COLOR)
            .map(String::as_str)
            .unwrap_or(FALLBACK_COLOR_VALUE);
        let color = if config.always_use_default_color {
            default_value
        } else {
            palette.get(color_key).map(String::as_str).unwrap_or(default_value)
        };

        let (overview_ruler_lane, overview_ruler_color) = if config.show_gutter_in_overview_ruler {
            (Some(RulerLane::Center), Some(color.to_string()))
        } else {
            (None, None)
        };

        let gutter_icon = config.show_gutter_icon.then(|| GutterIcon {
            color: color.to_string(),
            labeled,
        });

        let text_decoration = if config.show_text_decoration {
            format!(
                "{} {} {} {}",
                config.text_decoration_line,
                config.text_decoration_style,
                config.text_decoration_thickness,
                color
            )
        } else {
            String::new()
        };

        Self {
            color_key: color_key.to_string(),
            labeled,
            is_whole_line: config.whole_line,
            border_radius: "2px".to_string(),
            border_color: color.to_string(),
            outline_color: color.to_string(),
            font_weight: config.font_weight.clone(),
            overview_ruler_lane,
            overview_ruler_color,
            gutter_icon,
            border: if config.show_border {
                config.border.clone()
            } else {
                String::new()
            },
            outline: if config.show_outline {
                config.outline.clone()
            } else {
                String::new()
            },
            background_color: if config.highlight_background {
                color.to_string()
            } else {
                String::new()
            },
            text_decoration,
        }
    }
}

/// One marker range with its hover text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationRange {
    pub range: TextRange,
    pub hover_message: String,
}

impl From<&Bookmark> for DecorationRange {
    fn from(bookmark: &Bookmark) -> Self {
        Self {
            range: bookmark.range,
            hover_message: bookmark.render_hint(),
        }
    }
}

/// Host editing surface that renders decorations
pub trait DecorationSurface {
    /// Register a style and return a handle for it
    fn create_style(&mut self, style: &DecorationStyle) -> StyleHandle;

    /// Free a style; the handle is never used again
    fn release_style(&mut self, handle: StyleHandle);

    /// Replace every range drawn with `style` in `editor`
    fn set_decorations(&mut self, editor: &str, style: StyleHandle, ranges: &[DecorationRange]);

    /// Show an informational notice to the user
    fn show_information(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StylePair {
    plain: StyleHandle,
    labeled: StyleHandle,
}

/// Dispatches per-color decoration calls for open editors
pub struct DecorationSyncEngine<S: DecorationSurface> {
    surface: S,
    config: DecorationConfig,
    palette: BTreeMap<String, String>,
    styles: BTreeMap<String, StylePair>,
    visible: Vec<FileIdentity>,
}

impl<S: DecorationSurface> DecorationSyncEngine<S> {
    /// Create the engine and build styles for every palette color
    pub fn new(surface: S, config: &Config) -> Self {
        let mut engine = Self {
            surface,
            config: config.decoration.clone(),
            palette: config.colors.clone(),
            styles: BTreeMap::new(),
            visible: Vec::new(),
        };
        engine.rebuild_styles();
        engine
    }

    /// Replace the configuration and rebuild every style
    ///
    /// Call a sync afterwards to repaint editors with the new styles.
    pub fn apply_config(&mut self, config: &Config) {
        self.config = config.decoration.clone();
        self.palette = config.colors.clone();
        self.rebuild_styles();
    }

    /// Effective (validated) decoration configuration
    pub fn config(&self) -> &DecorationConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Color keys that currently have registered styles
    pub fn style_colors(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(String::as_str)
    }

    /// Editors that `sync_visible` repaints
    pub fn set_visible_editors(&mut self, editors: Vec<FileIdentity>) {
        self.visible = editors;
    }

    pub fn visible_editors(&self) -> &[FileIdentity] {
        &self.visible
    }

    /// Repaint one editor from the current document
    ///
    /// Every palette color and every color with a registered style gets a
    /// call per label state, even with no ranges. With `clear`, every call
    /// carries an empty list. Returns the number of calls issued.
    pub fn sync_editor(&mut self, root: &BookmarkStoreRoot, file: &FileIdentity, clear: bool) -> usize {
        let bookmarks: &[Bookmark] = root
            .group(file.hash())
            .map(|g| g.bookmarks.as_slice())
            .unwrap_or(&[]);

        let colors: BTreeSet<String> = self
            .palette
            .keys()
            .chain(self.styles.keys())
            .cloned()
            .chain(bookmarks.iter().map(|b| b.color.clone()))
            .collect();

        let mut calls = 0;
        for color in &colors {
            let pair = self.style_for(color);
            let (labeled, plain): (Vec<&Bookmark>, Vec<&Bookmark>) = if clear {
                (Vec::new(), Vec::new())
            } else {
                bookmarks
                    .iter()
                    .filter(|b| &b.color == color)
                    .partition(|b| b.has_label())
            };

            let labeled: Vec<DecorationRange> = labeled.into_iter().map(Into::into).collect();
            let plain: Vec<DecorationRange> = plain.into_iter().map(Into::into).collect();
            self.surface.set_decorations(file.uri(), pair.labeled, &labeled);
            self.surface.set_decorations(file.uri(), pair.plain, &plain);
            calls += 2;
        }

        debug!(file = %file.uri(), calls, clear, "Synced decorations");
        calls
    }

    /// Repaint every visible editor
    pub fn sync_visible(&mut self, root: &BookmarkStoreRoot, clear: bool) -> usize {
        let editors = self.visible.clone();
        editors
            .iter()
            .map(|file| self.sync_editor(root, file, clear))
            .sum()
    }

    /// Release every style handle
    pub fn dispose(&mut self) {
        let released = self.styles.len();
        for (_, pair) in std::mem::take(&mut self.styles) {
            self.surface.release_style(pair.labeled);
            self.surface.release_style(pair.plain);
        }
        debug!(released, "Disposed decoration styles");
    }

    /// Notifier callback repainting visible editors on every store change
    pub fn subscriber(engine: Rc<RefCell<Self>>) -> Subscriber
    where
        S: 'static,
    {
        Box::new(move |root: &BookmarkStoreRoot| {
            engine.borrow_mut().sync_visible(root, false);
        })
    }

    fn rebuild_styles(&mut self) {
        self.dispose();

        let (config, notice) = std::mem::take(&mut self.config).validated();
        self.config = config;
        if let Some(notice) = notice.and_then(|err| err.user_notice()) {
            self.surface.show_information(&notice);
        }

        let keys: Vec<String> = self.palette.keys().cloned().collect();
        for key in keys {
            self.style_for(&key);
        }
        info!(styles = self.styles.len() * 2, "Built decoration styles");
    }

    /// Registered style pair for `color`, created on first use
    ///
    /// Colors outside the palette keep their fallback style registered so a
    /// later sync still clears them.
    fn style_for(&mut self, color: &str) -> StylePair {
        if let Some(pair) = self.styles.get(color) {
            return *pair;
        }
        if !self.palette.contains_key(color) {
            debug!(color, "Color not in palette, using default style values");
        }

        let plain = DecorationStyle::build(color, false, &self.config, &self.palette);
        let labeled = DecorationStyle::build(color, true, &self.config, &self.palette);
        let pair = StylePair {
            plain: self.surface.create_style(&plain),
            labeled: self.surface.create_style(&labeled),
        };
        self.styles.insert(color.to_string(), pair);
        pair
    }
}

impl<S: DecorationSurface + std::fmt::Debug> std::fmt::Debug for DecorationSyncEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecorationSyncEngine")
            .field("surface", &self.surface)
            .field("styles", &self.styles.len())
            .field("visible", &self.visible.len())
            .finish()
    }
}
