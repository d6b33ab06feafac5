use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

/// Name of the font used when text asks for nothing specific.
pub const DEFAULT_FONT_NAME: &str = "_sans";

/// Font description handed over by the loader. Glyph data stays with the
/// renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Font {
    pub name: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl Font {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bold: false,
            italic: false,
        }
    }
}

/// Fonts registered with one runtime, in registration order.
#[derive(Debug, Default)]
pub struct FontLibrary {
    fonts: Vec<Arc<Font>>,
    default_font: Option<Arc<Font>>,
}

impl FontLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `font`; a second font with the same name is rejected.
    pub fn add_font(&mut self, font: Font) -> RuntimeResult<Arc<Font>> {
        if self.font(&font.name).is_some() {
            return Err(RuntimeError::DuplicateFont(font.name));
        }
        let font = Arc::new(font);
        self.fonts.push(Arc::clone(&font));
        Ok(font)
    }

    pub fn font(&self, name: &str) -> Option<Arc<Font>> {
        self.fonts.iter().find(|font| font.name == name).cloned()
    }

    pub fn font_at(&self, index: usize) -> Option<Arc<Font>> {
        self.fonts.get(index).cloned()
    }

    pub fn count(&self) -> usize {
        self.fonts.len()
    }

    /// Forgets every registered font. The default font survives.
    pub fn clear(&mut self) {
        self.fonts.clear();
    }

    /// The `_sans` font, created on first use.
    pub fn default_font(&mut self) -> Arc<Font> {
        Arc::clone(
            self.default_font
                .get_or_insert_with(|| Arc::new(Font::new(DEFAULT_FONT_NAME))),
        )
    }
}
