//! Scratchpad surface
//!
//! An off-screen RGBA pixmap one cell tall and N cells wide. Glyphs and the
//! cursor are rasterized here as white coverage masks (color is applied by
//! the shader) and then copied tile by tile into the atlas.

use tiny_skia::{Color, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::backend::{BYTES_PER_PIXEL, TileData};
use crate::config::{AntialiasMode, DEFAULT_DPI, Settings};
use crate::error::{EngineError, Result};
use crate::geometry::Size;

/// Gamma correction coefficients for gamma 1.0 to 2.2 in steps of 0.1,
/// pre-divided by 4.
const GAMMA_INCORRECT_TARGET_RATIOS: [[f32; 4]; 13] = [
    [0.0000 / 4.0, 0.0000 / 4.0, 0.0000 / 4.0, 0.0000 / 4.0],
    [0.0166 / 4.0, -0.0807 / 4.0, 0.2227 / 4.0, -0.0751 / 4.0],
    [0.0350 / 4.0, -0.1760 / 4.0, 0.4325 / 4.0, -0.1370 / 4.0],
    [0.0543 / 4.0, -0.2821 / 4.0, 0.6302 / 4.0, -0.1876 / 4.0],
    [0.0739 / 4.0, -0.3963 / 4.0, 0.8167 / 4.0, -0.2287 / 4.0],
    [0.0933 / 4.0, -0.5161 / 4.0, 0.9926 / 4.0, -0.2616 / 4.0],
    [0.1121 / 4.0, -0.6395 / 4.0, 1.1588 / 4.0, -0.2877 / 4.0],
    [0.1300 / 4.0, -0.7649 / 4.0, 1.3159 / 4.0, -0.3080 / 4.0],
    [0.1469 / 4.0, -0.8911 / 4.0, 1.4644 / 4.0, -0.3234 / 4.0],
    [0.1627 / 4.0, -1.0170 / 4.0, 1.6051 / 4.0, -0.3347 / 4.0],
    [0.1773 / 4.0, -1.1420 / 4.0, 1.7385 / 4.0, -0.3426 / 4.0],
    [0.1908 / 4.0, -1.2652 / 4.0, 1.8650 / 4.0, -0.3476 / 4.0],
    [0.2031 / 4.0, -1.3864 / 4.0, 1.9851 / 4.0, -0.3501 / 4.0],
];

pub fn gamma_ratios(gamma: f32) -> [f32; 4] {
    let index = ((gamma * 10.0).round() as i32 - 10).clamp(0, 12) as usize;
    GAMMA_INCORRECT_TARGET_RATIOS[index]
}

/// Text rendering parameters shared by the rasterizer and the shader
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingParams {
    pub gamma: f32,
    pub cleartype_enhanced_contrast: f32,
    pub grayscale_enhanced_contrast: f32,
}

impl RenderingParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            gamma: settings.gamma.clamp(1.0, 2.2),
            cleartype_enhanced_contrast: settings.cleartype_enhanced_contrast.max(0.0),
            grayscale_enhanced_contrast: settings.grayscale_enhanced_contrast.max(0.0),
        }
    }

    pub fn enhanced_contrast(&self, mode: AntialiasMode) -> f32 {
        match mode {
            AntialiasMode::ClearType => self.cleartype_enhanced_contrast,
            _ => self.grayscale_enhanced_contrast,
        }
    }
}

/// Coverage layout of a mask handed to `Scratchpad::blend_mask`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskFormat {
    /// One byte per pixel
    Alpha,
    /// Three bytes per pixel (R, G, B subpixel coverage)
    Subpixel,
}

pub struct Scratchpad {
    pixmap: Option<Pixmap>,
    cell: Size,
    cells: u32,
    dpi: u32,
    antialiasing: AntialiasMode,
    params: RenderingParams,
    brush: Paint<'static>,
    grow_count: u32,
}

impl Scratchpad {
    /// Create an unallocated scratchpad; the first `ensure_width` allocates.
    pub fn new(settings: &Settings) -> Self {
        Self {
            pixmap: None,
            cell: settings.cell_size,
            cells: 0,
            dpi: settings.dpi,
            antialiasing: settings.antialiasing,
            params: RenderingParams::from_settings(settings),
            brush: Paint::default(),
            grow_count: 0,
        }
    }

    /// Width in cells
    pub fn cell_capacity(&self) -> u32 {
        self.cells
    }

    pub fn cell(&self) -> Size {
        self.cell
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn antialiasing(&self) -> AntialiasMode {
        self.antialiasing
    }

    pub fn params(&self) -> &RenderingParams {
        &self.params
    }

    /// Number of times the backing surface was recreated
    pub fn grow_count(&self) -> u32 {
        self.grow_count
    }

    /// Make room for at least `min_cells` cells. Returns true if the surface
    /// was recreated, which also invalidates the constant buffer.
    pub fn ensure_width(&mut self, min_cells: u32) -> Result<bool> {
        if self.pixmap.is_some() && min_cells <= self.cells {
            return Ok(false);
        }
        let new_cells = 2.max(min_cells).max(self.cells + (self.cells >> 1));
        let width = self.cell.width * new_cells;
        let pixmap =
            Pixmap::new(width, self.cell.height).ok_or_else(|| EngineError::ResourceCreation {
                what: "scratchpad",
                reason: format!("{width}x{} pixmap", self.cell.height),
            })?;

        // Shapes stay pixel aligned; glyph smoothing is chosen per draw.
        let mut brush = Paint::default();
        brush.set_color(Color::WHITE);
        brush.anti_alias = self.antialiasing != AntialiasMode::Aliased;

        log::debug!(
            "scratchpad {} -> {new_cells} cells ({:?}, gamma {})",
            self.cells,
            self.antialiasing,
            self.params.gamma
        );
        self.pixmap = Some(pixmap);
        self.brush = brush;
        self.cells = new_cells;
        self.grow_count += 1;
        Ok(true)
    }

    fn pixmap_mut(&mut self) -> Result<&mut Pixmap> {
        self.pixmap
            .as_mut()
            .ok_or_else(|| EngineError::Gpu("scratchpad used before allocation".into()))
    }

    /// DIP to pixel transform
    fn transform(&self) -> Transform {
        let scale = self.dpi as f32 / DEFAULT_DPI as f32;
        Transform::from_scale(scale, scale)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.pixmap_mut()?.fill(Color::TRANSPARENT);
        Ok(())
    }

    /// Fill a rectangle given in DIPs.
    pub fn fill_rect(&mut self, rect: Rect) -> Result<()> {
        let transform = self.transform();
        let brush = self.brush.clone();
        self.pixmap_mut()?.fill_rect(rect, &brush, transform, None);
        Ok(())
    }

    /// Stroke a rectangle outline centered on `rect`'s edges, in DIPs.
    pub fn stroke_rect(&mut self, rect: Rect, line_width: f32) -> Result<()> {
        let transform = self.transform();
        let brush = self.brush.clone();
        let path = PathBuilder::from_rect(rect);
        let stroke = Stroke {
            width: line_width,
            ..Stroke::default()
        };
        self.pixmap_mut()?
            .stroke_path(&path, &brush, &stroke, transform, None);
        Ok(())
    }

    /// Blend a coverage mask at pixel position (`x`, `y`), clipped to the
    /// surface. Overlapping coverage keeps the maximum per channel.
    pub fn blend_mask(
        &mut self,
        x: i32,
        y: i32,
        width: usize,
        height: usize,
        coverage: &[u8],
        format: MaskFormat,
    ) -> Result<()> {
        let aliased = self.antialiasing == AntialiasMode::Aliased;
        let pixmap = self.pixmap_mut()?;
        let (surface_w, surface_h) = (pixmap.width() as i32, pixmap.height() as i32);
        let channels = match format {
            MaskFormat::Alpha => 1,
            MaskFormat::Subpixel => 3,
        };
        let data = pixmap.data_mut();
        for row in 0..height {
            let py = y + row as i32;
            if py < 0 || py >= surface_h {
                continue;
            }
            for col in 0..width {
                let px = x + col as i32;
                if px < 0 || px >= surface_w {
                    continue;
                }
                let src = (row * width + col) * channels;
                let mut rgb = match format {
                    MaskFormat::Alpha => [coverage[src]; 3],
                    MaskFormat::Subpixel => [coverage[src], coverage[src + 1], coverage[src + 2]],
                };
                if aliased {
                    rgb = rgb.map(|c| if c >= 0x80 { 0xFF } else { 0 });
                }
                let alpha = rgb[0].max(rgb[1]).max(rgb[2]);
                let dst = (py * surface_w + px) as usize * BYTES_PER_PIXEL as usize;
                for (i, value) in rgb.into_iter().chain(std::iter::once(alpha)).enumerate() {
                    data[dst + i] = data[dst + i].max(value);
                }
            }
        }
        Ok(())
    }

    /// The pixels of cell `index` as a tile for uploading.
    pub fn tile(&self, index: u32) -> Result<TileData<'_>> {
        let pixmap = self
            .pixmap
            .as_ref()
            .ok_or_else(|| EngineError::Gpu("scratchpad used before allocation".into()))?;
        if index >= self.cells {
            return Err(EngineError::Gpu(format!(
                "scratchpad tile {index} beyond {} cells",
                self.cells
            )));
        }
        let stride = pixmap.width() * BYTES_PER_PIXEL;
        let offset = (index * self.cell.width * BYTES_PER_PIXEL) as usize;
        Ok(TileData {
            pixels: &pixmap.data()[offset..],
            stride,
            size: self.cell,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratchpad() -> Scratchpad {
        Scratchpad::new(&Settings::default())
    }

    #[test]
    fn test_growth_policy() {
        let mut pad = scratchpad();
        assert!(pad.ensure_width(1).unwrap());
        assert_eq!(pad.cell_capacity(), 2);
        assert!(!pad.ensure_width(2).unwrap());
        assert!(pad.ensure_width(3).unwrap());
        assert_eq!(pad.cell_capacity(), 3);
        assert!(pad.ensure_width(4).unwrap());
        assert_eq!(pad.cell_capacity(), 4);
        assert!(pad.ensure_width(5).unwrap());
        assert_eq!(pad.cell_capacity(), 6);
        assert!(pad.ensure_width(40).unwrap());
        assert_eq!(pad.cell_capacity(), 40);
        assert_eq!(pad.grow_count(), 5);
    }

    #[test]
    fn test_growth_is_logarithmic() {
        let mut pad = scratchpad();
        for width in 1..=1000 {
            pad.ensure_width(width).unwrap();
        }
        // 2, 3, 4, 6, 9, 13, ... reaches 1000 within ~16 steps.
        assert!(pad.grow_count() <= 17, "{} resizes", pad.grow_count());
        assert!(pad.cell_capacity() >= 1000);
    }

    #[test]
    fn test_blend_mask_writes_white_coverage() {
        let mut pad = scratchpad();
        pad.ensure_width(2).unwrap();
        pad.blend_mask(9, 1, 2, 1, &[0x40, 0xFF], MaskFormat::Alpha)
            .unwrap();
        let tile = pad.tile(1).unwrap();
        let row1 = tile.stride as usize;
        assert_eq!(&tile.pixels[row1 + 4..row1 + 8], &[0x40; 4]);
        assert_eq!(&tile.pixels[row1 + 8..row1 + 12], &[0xFF; 4]);
        assert_eq!(&tile.pixels[row1..row1 + 4], &[0; 4]);
    }

    #[test]
    fn test_blend_mask_clips() {
        let mut pad = scratchpad();
        pad.ensure_width(2).unwrap();
        pad.blend_mask(-1, -1, 3, 3, &[0xFF; 9], MaskFormat::Alpha)
            .unwrap();
        pad.blend_mask(15, 15, 4, 4, &[0xFF; 16], MaskFormat::Alpha)
            .unwrap();
    }

    #[test]
    fn test_subpixel_mask_alpha_is_max() {
        let mut pad = scratchpad();
        pad.ensure_width(1).unwrap();
        pad.blend_mask(0, 0, 1, 1, &[0x10, 0x80, 0x20], MaskFormat::Subpixel)
            .unwrap();
        let tile = pad.tile(0).unwrap();
        assert_eq!(&tile.pixels[..4], &[0x10, 0x80, 0x20, 0x80]);
    }

    #[test]
    fn test_clear_and_fill() {
        let mut pad = scratchpad();
        pad.ensure_width(1).unwrap();
        pad.fill_rect(Rect::from_ltrb(0.0, 0.0, 8.0, 16.0).unwrap())
            .unwrap();
        assert_eq!(&pad.tile(0).unwrap().pixels[..4], &[0xFF; 4]);
        pad.clear().unwrap();
        assert_eq!(&pad.tile(0).unwrap().pixels[..4], &[0; 4]);
    }

    #[test]
    fn test_tile_out_of_range() {
        let mut pad = scratchpad();
        assert!(pad.tile(0).is_err());
        pad.ensure_width(1).unwrap();
        assert!(pad.tile(2).is_err());
    }

    #[test]
    fn test_gamma_ratios_table() {
        assert_eq!(gamma_ratios(1.0), [0.0; 4]);
        assert_eq!(gamma_ratios(1.8), GAMMA_INCORRECT_TARGET_RATIOS[8]);
        assert_eq!(gamma_ratios(9.0), GAMMA_INCORRECT_TARGET_RATIOS[12]);
    }
}
