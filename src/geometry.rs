//! Grid geometry utilities
//!
//! Pixel sizes, atlas tile coordinates and the viewport→grid math used when
//! the surface is resized.

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn area(self) -> u32 {
        self.width * self.height
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Top-left pixel position of a tile inside the atlas.
///
/// Atlas dimensions never exceed `u16::MAX`, so a coordinate pair packs into
/// a single `u32` for the cell buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u16,
    pub y: u16,
}

impl TileCoord {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    pub const fn pack(self) -> u32 {
        (self.y as u32) << 16 | self.x as u32
    }
}

/// Grid dimensions for a pixel viewport (cells are pixel aligned)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridMetrics {
    /// Size of a single cell in pixels
    pub cell: Size,
    /// Size of the viewport in pixels
    pub viewport: Size,
}

impl GridMetrics {
    pub fn new(cell: Size, viewport: Size) -> Self {
        Self { cell, viewport }
    }

    /// Get grid dimensions in cells (columns, rows); never less than 1x1
    pub fn grid_dimensions(&self) -> Size {
        if self.cell.is_empty() {
            return Size::new(1, 1);
        }
        let cols = self.viewport.width / self.cell.width;
        let rows = self.viewport.height / self.cell.height;
        Size::new(cols.max(1), rows.max(1))
    }
}
