//! Cursor renderer
//!
//! The cursor shape is drawn into scratchpad slot 0 and copied to the
//! reserved atlas tile at the origin. The shader overlays that tile on the
//! cell flagged `CellFlags::CURSOR`.

use tiny_skia::Rect;

use crate::backend::{CopyHint, RenderBackend};
use crate::config::{CursorOptions, CursorType, DEFAULT_DPI};
use crate::error::{EngineError, Result};
use crate::geometry::TileCoord;
use crate::scratchpad::Scratchpad;

/// Atlas tile reserved for the cursor
pub const CURSOR_TILE: TileCoord = TileCoord::new(0, 0);

/// Axis aligned rectangle in DIPs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    fn to_skia(self) -> Result<Rect> {
        Rect::from_ltrb(self.left, self.top, self.right, self.bottom)
            .ok_or_else(|| EngineError::Gpu(format!("degenerate cursor rect {self:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorShape {
    pub rect: RectF,
    /// Second underline of `DoubleUnderscore`
    pub second: Option<RectF>,
    /// Drawn as an outline of `line_width` instead of filled
    pub stroked: bool,
    pub line_width: f32,
}

/// Line width in DIPs that renders as a whole number of device pixels:
/// 1px up to 150% scale, 2px up to 250%, and so on.
pub fn line_width(dpi: u32) -> f32 {
    let rounded = (dpi + DEFAULT_DPI / 2) / DEFAULT_DPI * DEFAULT_DPI;
    (rounded as f32 / dpi as f32).max(1.0)
}

/// Geometry of the cursor inside a cell of `cell_dip` DIPs.
pub fn cursor_shape(options: &CursorOptions, cell_dip: (f32, f32), line_width: f32) -> CursorShape {
    let (cell_w, cell_h) = cell_dip;
    let mut rect = RectF {
        left: 0.0,
        top: 0.0,
        right: cell_w,
        bottom: cell_h,
    };
    let mut second = None;

    match options.cursor_type {
        CursorType::Legacy => {
            rect.top = cell_h * (100 - options.height_percentage.min(100)) as f32 / 100.0;
        }
        CursorType::VerticalBar => {
            rect.right = line_width;
        }
        CursorType::EmptyBox => {
            // Strokes are centered on the outline.
            let half = line_width / 2.0;
            rect.left = half;
            rect.top = half;
            rect.right -= half;
            rect.bottom -= half;
        }
        CursorType::Underscore | CursorType::DoubleUnderscore => {
            rect.top = cell_h - line_width;
            if options.cursor_type == CursorType::DoubleUnderscore {
                second = Some(RectF {
                    top: rect.top - 2.0,
                    bottom: rect.bottom - 2.0,
                    ..rect
                });
            }
        }
        CursorType::FullBox => {}
    }

    CursorShape {
        rect,
        second,
        stroked: options.cursor_type == CursorType::EmptyBox,
        line_width,
    }
}

/// Rasterize the cursor into scratchpad slot 0 and copy it to the atlas.
pub fn draw_cursor<B: RenderBackend>(
    options: &CursorOptions,
    cell_dip: (f32, f32),
    scratchpad: &mut Scratchpad,
    backend: &mut B,
    atlas: &mut B::Texture,
) -> Result<()> {
    let shape = cursor_shape(options, cell_dip, line_width(scratchpad.dpi()));

    scratchpad.clear()?;
    if shape.stroked {
        scratchpad.stroke_rect(shape.rect.to_skia()?, shape.line_width)?;
    } else {
        scratchpad.fill_rect(shape.rect.to_skia()?)?;
    }
    if let Some(second) = shape.second {
        scratchpad.fill_rect(second.to_skia()?)?;
    }

    let tile = scratchpad.tile(0)?;
    backend.upload_tile(atlas, CURSOR_TILE, &tile, CopyHint::Default)
}
