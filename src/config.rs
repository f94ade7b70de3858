// Configuration module
// Producer-owned rendering settings, validated before they reach the presenter

use crate::error::{EngineError, Result};
use crate::geometry::Size;

/// DPI at which one DIP equals one pixel
pub const DEFAULT_DPI: u32 = 96;

/// Largest atlas dimension the tile coordinates can address
pub const MAX_ATLAS_DIMENSION: u32 = u16::MAX as u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AntialiasMode {
    /// Single-channel coverage
    #[default]
    Grayscale,
    /// Per-subpixel (RGB) coverage
    ClearType,
    /// Thresholded coverage, no smoothing
    Aliased,
}

impl std::str::FromStr for AntialiasMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "grayscale" => Ok(AntialiasMode::Grayscale),
            "cleartype" => Ok(AntialiasMode::ClearType),
            "aliased" => Ok(AntialiasMode::Aliased),
            other => Err(EngineError::InvalidSettings(format!(
                "unknown antialiasing mode: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorType {
    /// Bottom bar sized by `CursorOptions::height_percentage`
    Legacy,
    VerticalBar,
    Underscore,
    DoubleUnderscore,
    EmptyBox,
    #[default]
    FullBox,
}

impl std::str::FromStr for CursorType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "legacy" | "vintage" => Ok(CursorType::Legacy),
            "bar" => Ok(CursorType::VerticalBar),
            "underscore" => Ok(CursorType::Underscore),
            "double-underscore" => Ok(CursorType::DoubleUnderscore),
            "empty-box" => Ok(CursorType::EmptyBox),
            "block" | "full-box" => Ok(CursorType::FullBox),
            other => Err(EngineError::InvalidSettings(format!(
                "unknown cursor type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorOptions {
    pub cursor_type: CursorType,
    /// Height of the legacy cursor in percent of the cell (1..=100)
    pub height_percentage: u8,
    /// Packed 0xAABBGGRR; 0xFFFFFFFF inverts the cell underneath
    pub color: u32,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            cursor_type: CursorType::default(),
            height_percentage: 25,
            color: 0xFFFF_FFFF,
        }
    }
}

/// Rendering settings supplied by the host application.
///
/// Written only by the producer; the presenter receives whole copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Cell size in pixels
    pub cell_size: Size,
    pub dpi: u32,
    /// Font size in DIPs
    pub font_size: f32,
    pub antialiasing: AntialiasMode,
    pub cursor: CursorOptions,
    pub background_color: u32,
    pub selection_color: u32,
    /// Upper bound for the atlas texture in pixels
    pub atlas_size_limit: Size,
    /// OpenType feature strings, e.g. `"calt=0"` or `"ss01"`
    pub font_features: Vec<String>,
    pub underline_position: u32,
    pub strikethrough_position: u32,
    pub line_thickness: u32,
    pub gamma: f32,
    pub cleartype_enhanced_contrast: f32,
    pub grayscale_enhanced_contrast: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cell_size: Size::new(8, 16),
            dpi: DEFAULT_DPI,
            font_size: 12.0,
            antialiasing: AntialiasMode::default(),
            cursor: CursorOptions::default(),
            background_color: 0xFF1E_1A19,
            selection_color: 0x80FF_FFFF,
            atlas_size_limit: Size::new(4096, 4096),
            font_features: Vec::new(),
            underline_position: 14,
            strikethrough_position: 8,
            line_thickness: 1,
            gamma: 1.8,
            cleartype_enhanced_contrast: 0.5,
            grayscale_enhanced_contrast: 1.0,
        }
    }
}

impl Settings {
    /// Reject settings the present pipeline treats as contract violations.
    pub fn validate(&self) -> Result<()> {
        if self.cell_size.is_empty() {
            return Err(EngineError::InvalidSettings("cell size is zero".into()));
        }
        if self.dpi == 0 {
            return Err(EngineError::InvalidSettings("dpi is zero".into()));
        }
        if self.atlas_size_limit.is_empty() {
            return Err(EngineError::InvalidSettings("atlas limit is zero".into()));
        }
        if self.atlas_size_limit.width > MAX_ATLAS_DIMENSION
            || self.atlas_size_limit.height > MAX_ATLAS_DIMENSION
        {
            return Err(EngineError::InvalidSettings(format!(
                "atlas limit {}x{} exceeds {MAX_ATLAS_DIMENSION}",
                self.atlas_size_limit.width, self.atlas_size_limit.height
            )));
        }
        if self.cell_size.width > self.atlas_size_limit.width
            || self.cell_size.height > self.atlas_size_limit.height
        {
            return Err(EngineError::InvalidSettings(
                "cell does not fit into the atlas limit".into(),
            ));
        }
        if !(1..=100).contains(&self.cursor.height_percentage) {
            return Err(EngineError::InvalidSettings(format!(
                "cursor height {}% out of range",
                self.cursor.height_percentage
            )));
        }
        Ok(())
    }

    /// Cell size in DIPs as (width, height)
    pub fn cell_size_dip(&self) -> (f32, f32) {
        let dpi = self.dpi as f32;
        (
            self.cell_size.width as f32 * DEFAULT_DPI as f32 / dpi,
            self.cell_size.height as f32 * DEFAULT_DPI as f32 / dpi,
        )
    }

    /// Clamp the atlas limit to what the device can allocate.
    pub fn clamp_atlas_limit(&mut self, max_texture_dimension: u32) {
        let max = max_texture_dimension.min(MAX_ATLAS_DIMENSION);
        self.atlas_size_limit.width = self.atlas_size_limit.width.min(max);
        self.atlas_size_limit.height = self.atlas_size_limit.height.min(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_cell_rejected() {
        let settings = Settings {
            cell_size: Size::new(0, 16),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(EngineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_cell_larger_than_limit_rejected() {
        let settings = Settings {
            cell_size: Size::new(64, 64),
            atlas_size_limit: Size::new(32, 4096),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_cursor_height_range() {
        let mut settings = Settings::default();
        settings.cursor.height_percentage = 0;
        assert!(settings.validate().is_err());
        settings.cursor.height_percentage = 100;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_cell_size_dip() {
        let settings = Settings {
            cell_size: Size::new(12, 24),
            dpi: 144,
            ..Settings::default()
        };
        assert_eq!(settings.cell_size_dip(), (8.0, 16.0));
    }

    #[test]
    fn test_clamp_atlas_limit() {
        let mut settings = Settings {
            atlas_size_limit: Size::new(16384, 8192),
            ..Settings::default()
        };
        settings.clamp_atlas_limit(8192);
        assert_eq!(settings.atlas_size_limit, Size::new(8192, 8192));
    }

    #[test]
    fn test_cursor_type_from_str() {
        assert_eq!("bar".parse::<CursorType>().ok(), Some(CursorType::VerticalBar));
        assert!("triangle".parse::<CursorType>().is_err());
    }
}
