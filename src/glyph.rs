//! Glyph cache entries and the per-frame glyph queue

use std::collections::HashMap;

use bitflags::bitflags;

use crate::geometry::TileCoord;

bitflags! {
    /// Per-cell flags; the bit values are mirrored in `grid.wgsl`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u32 {
        const COLORED_GLYPH = 1 << 0;
        const CURSOR = 1 << 1;
        const SELECTED = 1 << 2;
        const UNDERLINE = 1 << 3;
        const STRIKETHROUGH = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GlyphAttributes {
    pub bold: bool,
    pub italic: bool,
    /// Number of grid cells the glyph covers
    pub cell_count: u8,
}

/// Identity of a cached glyph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlyphKey {
    /// The shaped character run (one grapheme cluster)
    pub text: String,
    pub attributes: GlyphAttributes,
}

impl GlyphKey {
    pub fn new(text: impl Into<String>, attributes: GlyphAttributes) -> Self {
        Self {
            text: text.into(),
            attributes,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.attributes.cell_count.max(1) as usize
    }
}

/// Where a glyph lives in the atlas: one tile per covered cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphValue {
    pub coords: Vec<TileCoord>,
    pub flags: CellFlags,
}

pub type GlyphCache = HashMap<GlyphKey, GlyphValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub key: GlyphKey,
    pub value: GlyphValue,
}

/// Glyphs that have tiles reserved but are not rasterized yet.
///
/// Filled while painting, drained once per frame. Nothing survives a
/// successful drain.
#[derive(Debug, Default)]
pub struct GlyphQueue {
    items: Vec<QueueItem>,
}

impl GlyphQueue {
    pub fn push(&mut self, key: GlyphKey, value: GlyphValue) {
        self.items.push(QueueItem { key, value });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Run `f` on every item in order. Items are removed once processed; on
    /// the first error the failing item and everything after it stay queued.
    /// Returns how many items were processed alongside the outcome.
    pub fn drain_with<E>(
        &mut self,
        mut f: impl FnMut(&QueueItem) -> Result<(), E>,
    ) -> (usize, Result<(), E>) {
        let mut done = 0;
        let result = self.items.iter().try_for_each(|item| {
            f(item)?;
            done += 1;
            Ok(())
        });
        self.items.drain(..done);
        (done, result)
    }
}

/// Whether a cluster is drawn with color font tables (emoji and friends).
pub fn is_colored_glyph(text: &str) -> bool {
    text.chars().any(|ch| {
        matches!(ch as u32,
            0x1F000..=0x1FAFF // pictographs, emoticons, transport, supplemental symbols
            | 0x2600..=0x27BF // misc symbols, dingbats
            | 0xFE0F // emoji presentation selector
        )
    })
}
