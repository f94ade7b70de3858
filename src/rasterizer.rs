//! Glyph rasterizer
//!
//! Text shaping sits behind `TextShaper`: given a glyph key it returns a
//! layout of known DIP size that can draw itself into the scratchpad.
//! `FontRasterizer` is the stock shaper, shaping with rustybuzz and
//! rasterizing with fontdue.

use std::str::FromStr;
use std::sync::Arc;

use crate::backend::{CopyHint, RenderBackend};
use crate::config::{AntialiasMode, DEFAULT_DPI, Settings};
use crate::error::{EngineError, Result};
use crate::geometry::Size;
use crate::glyph::{CellFlags, GlyphAttributes, GlyphKey, QueueItem};
use crate::scratchpad::{MaskFormat, Scratchpad};

/// Everything a shaper needs to lay out one glyph
#[derive(Debug, Clone, Copy)]
pub struct LayoutRequest<'a> {
    pub key: &'a GlyphKey,
    /// Width of all cells the glyph covers, in DIPs
    pub width_dip: f32,
    pub height_dip: f32,
    /// Font size in DIPs
    pub font_size: f32,
    pub dpi: u32,
    /// OpenType feature strings
    pub features: &'a [String],
}

/// How a layout is drawn into the scratchpad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawOptions {
    pub antialiasing: AntialiasMode,
    /// Draw with color font tables; always paired with grayscale coverage
    pub color_font: bool,
}

pub trait GlyphLayout {
    /// Layout extent in DIPs as (width, height)
    fn size_dip(&self) -> (f32, f32);

    /// Draw the layout with its origin at the scratchpad's top-left corner.
    fn draw(&self, scratchpad: &mut Scratchpad, options: DrawOptions) -> Result<()>;
}

/// Opaque shaping service
pub trait TextShaper: Send {
    fn layout(&self, request: &LayoutRequest<'_>) -> Result<Box<dyn GlyphLayout>>;
}

/// Antialiasing used for one glyph draw. Subpixel coverage cannot carry the
/// true alpha a color glyph blends with, so colored glyphs drop to grayscale.
pub fn effective_antialiasing(configured: AntialiasMode, flags: CellFlags) -> AntialiasMode {
    if flags.contains(CellFlags::COLORED_GLYPH) && configured == AntialiasMode::ClearType {
        AntialiasMode::Grayscale
    } else {
        configured
    }
}

/// Rasterize a queued glyph and copy its tiles into the atlas.
pub fn rasterize_glyph<B: RenderBackend>(
    shaper: &dyn TextShaper,
    item: &QueueItem,
    settings: &Settings,
    scratchpad: &mut Scratchpad,
    backend: &mut B,
    atlas: &mut B::Texture,
) -> Result<()> {
    let cells = item.value.coords.len();
    let (cell_w, cell_h) = settings.cell_size_dip();
    let layout = shaper.layout(&LayoutRequest {
        key: &item.key,
        width_dip: cell_w * cells as f32,
        height_dip: cell_h,
        font_size: settings.font_size,
        dpi: settings.dpi,
        features: &settings.font_features,
    })?;

    let color_font = item.value.flags.contains(CellFlags::COLORED_GLYPH);
    let options = DrawOptions {
        antialiasing: effective_antialiasing(scratchpad.antialiasing(), item.value.flags),
        color_font,
    };

    scratchpad.clear()?;
    layout.draw(scratchpad, options)?;

    for (index, coord) in item.value.coords.iter().enumerate() {
        let tile = scratchpad.tile(index as u32)?;
        backend.upload_tile(atlas, *coord, &tile, CopyHint::NoOverwrite)?;
    }
    log::trace!(
        "rasterized {:?} into {cells} tile(s) ({:?})",
        item.key.text,
        options.antialiasing
    );
    Ok(())
}

/// Face slot selected by bold/italic attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceVariant {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FaceVariant {
    fn from_attributes(attributes: GlyphAttributes) -> Self {
        match (attributes.bold, attributes.italic) {
            (false, false) => FaceVariant::Regular,
            (true, false) => FaceVariant::Bold,
            (false, true) => FaceVariant::Italic,
            (true, true) => FaceVariant::BoldItalic,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

struct FontFace {
    /// Raw font data for rustybuzz
    data: Vec<u8>,
    font: fontdue::Font,
}

impl FontFace {
    fn parse(data: Vec<u8>) -> Result<Self> {
        let font = fontdue::Font::from_bytes(data.as_slice(), fontdue::FontSettings::default())
            .map_err(|e| EngineError::Font(format!("failed to parse font: {e}")))?;
        Ok(Self { data, font })
    }
}

/// rustybuzz + fontdue shaper. Clones share the parsed faces.
#[derive(Clone)]
pub struct FontRasterizer {
    /// Regular, bold, italic, bold-italic; slot 0 is always present
    faces: [Option<Arc<FontFace>>; 4],
}

impl FontRasterizer {
    pub fn new(regular: Vec<u8>) -> Result<Self> {
        let regular = Arc::new(FontFace::parse(regular)?);
        Ok(Self {
            faces: [Some(regular), None, None, None],
        })
    }

    /// Add a styled face. Variants that are never set fall back to regular.
    pub fn set_variant(&mut self, variant: FaceVariant, data: Vec<u8>) -> Result<()> {
        self.faces[variant.slot()] = Some(Arc::new(FontFace::parse(data)?));
        Ok(())
    }

    /// Pixel cell size for the regular face: the advance of `0` by the line
    /// height, both rounded up.
    pub fn cell_size(&self, font_size: f32, dpi: u32) -> Result<Size> {
        let face = self.face(GlyphAttributes::default())?;
        let px = font_size * dpi as f32 / DEFAULT_DPI as f32;
        let advance = face.font.metrics('0', px).advance_width;
        let height = face
            .font
            .horizontal_line_metrics(px)
            .map_or(px * 1.2, |line| line.new_line_size);
        Ok(Size::new(
            advance.ceil().max(1.0) as u32,
            height.ceil().max(1.0) as u32,
        ))
    }

    fn face(&self, attributes: GlyphAttributes) -> Result<&Arc<FontFace>> {
        let variant = FaceVariant::from_attributes(attributes);
        self.faces[variant.slot()]
            .as_ref()
            .or(self.faces[FaceVariant::Regular.slot()].as_ref())
            .ok_or_else(|| EngineError::Font("no regular face loaded".into()))
    }

    /// Load the regular face and whichever styled faces the system has.
    #[cfg(feature = "gui")]
    pub fn from_system(family: Option<&str>) -> Result<Self> {
        use font_kit::properties::{Style, Weight};
        use font_kit::source::SystemSource;

        let source = SystemSource::new();
        let regular = system_font_data(&source, family, Weight::NORMAL, Style::Normal)
            .ok_or_else(|| {
                EngineError::Font(format!(
                    "no font found for {}",
                    family.unwrap_or("the system monospace family")
                ))
            })?;
        let mut rasterizer = Self::new(regular)?;

        for (variant, weight, style) in [
            (FaceVariant::Bold, Weight::BOLD, Style::Normal),
            (FaceVariant::Italic, Weight::NORMAL, Style::Italic),
            (FaceVariant::BoldItalic, Weight::BOLD, Style::Italic),
        ] {
            if let Some(data) = system_font_data(&source, family, weight, style) {
                if let Err(e) = rasterizer.set_variant(variant, data) {
                    log::warn!("skipping {variant:?} face: {e}");
                }
            }
        }
        Ok(rasterizer)
    }
}

#[cfg(feature = "gui")]
fn system_font_data(
    source: &font_kit::source::SystemSource,
    family: Option<&str>,
    weight: font_kit::properties::Weight,
    style: font_kit::properties::Style,
) -> Option<Vec<u8>> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;

    let mut props_builder = Properties::new();
    let props = props_builder.weight(weight).style(style);

    let mut families = Vec::new();
    if let Some(name) = family {
        families.push(FamilyName::Title(name.to_string()));
    }
    families.push(FamilyName::Monospace);

    let handle = source.select_best_match(&families, props).ok()?;
    let font = handle.load().ok()?;
    let data = font.copy_font_data()?;
    Some(data.to_vec())
}

/// Parse OpenType feature strings, skipping the ones rustybuzz rejects.
pub fn parse_features(features: &[String]) -> Vec<rustybuzz::Feature> {
    features
        .iter()
        .filter_map(|feature| match rustybuzz::Feature::from_str(feature) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("ignoring font feature {feature:?}: {e}");
                None
            }
        })
        .collect()
}

impl TextShaper for FontRasterizer {
    fn layout(&self, request: &LayoutRequest<'_>) -> Result<Box<dyn GlyphLayout>> {
        let face = Arc::clone(self.face(request.key.attributes)?);
        let rb_face = rustybuzz::Face::from_slice(&face.data, 0)
            .ok_or_else(|| EngineError::Font("font rejected by shaper".into()))?;

        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(&request.key.text);
        buffer.guess_segment_properties();
        let shaped = rustybuzz::shape(&rb_face, &parse_features(request.features), buffer);

        let dpi_scale = request.dpi as f32 / DEFAULT_DPI as f32;
        let px = request.font_size * dpi_scale;
        let units_per_em = rb_face.units_per_em().max(1) as f32;
        let scale = px / units_per_em;

        let mut glyphs = Vec::with_capacity(shaped.len());
        let mut pen_x = 0.0f32;
        for (info, pos) in shaped.glyph_infos().iter().zip(shaped.glyph_positions()) {
            glyphs.push(PlacedGlyph {
                id: info.glyph_id as u16,
                x: pen_x + pos.x_offset as f32 * scale,
                y: -(pos.y_offset as f32) * scale,
            });
            pen_x += pos.x_advance as f32 * scale;
        }

        // Center the run horizontally and the line box vertically.
        let cell_w = request.width_dip * dpi_scale;
        let cell_h = request.height_dip * dpi_scale;
        let offset_x = ((cell_w - pen_x) / 2.0).max(0.0);
        let baseline = match face.font.horizontal_line_metrics(px) {
            Some(line) => ((cell_h - (line.ascent - line.descent)) / 2.0 + line.ascent).round(),
            None => cell_h,
        };

        Ok(Box::new(FontLayout {
            face,
            px,
            glyphs,
            offset_x,
            baseline,
            size_dip: (pen_x / dpi_scale, request.height_dip),
        }))
    }
}

struct PlacedGlyph {
    id: u16,
    /// Pen position in pixels relative to the run origin
    x: f32,
    y: f32,
}

struct FontLayout {
    face: Arc<FontFace>,
    px: f32,
    glyphs: Vec<PlacedGlyph>,
    offset_x: f32,
    /// Baseline in pixels from the top of the cell
    baseline: f32,
    size_dip: (f32, f32),
}

impl GlyphLayout for FontLayout {
    fn size_dip(&self) -> (f32, f32) {
        self.size_dip
    }

    fn draw(&self, scratchpad: &mut Scratchpad, options: DrawOptions) -> Result<()> {
        let subpixel = options.antialiasing == AntialiasMode::ClearType && !options.color_font;
        for glyph in &self.glyphs {
            let (metrics, coverage, format) = if subpixel {
                let (metrics, coverage) =
                    self.face.font.rasterize_indexed_subpixel(glyph.id, self.px);
                (metrics, coverage, MaskFormat::Subpixel)
            } else {
                let (metrics, coverage) = self.face.font.rasterize_indexed(glyph.id, self.px);
                (metrics, coverage, MaskFormat::Alpha)
            };
            if metrics.width == 0 || metrics.height == 0 {
                continue;
            }
            // fontdue measures ymin upwards from the baseline to the bitmap's bottom edge.
            let left = (self.offset_x + glyph.x + metrics.xmin as f32).round() as i32;
            let top = (self.baseline + glyph.y - (metrics.ymin + metrics.height as i32) as f32)
                .round() as i32;
            scratchpad.blend_mask(left, top, metrics.width, metrics.height, &coverage, format)?;
        }
        Ok(())
    }
}
