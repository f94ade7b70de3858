//! Device boundary
//!
//! The present pipeline only needs five classes of GPU operations: texture
//! creation, sub-resource copies, buffer mapping, draw submission and
//! presentation. `RenderBackend` captures exactly those. `HeadlessBackend`
//! keeps every resource in CPU memory; `WgpuBackend` drives a real surface.

pub mod headless;
#[cfg(feature = "gui")]
pub mod wgpu_backend;

use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::geometry::{Size, TileCoord};

pub use headless::{HeadlessBackend, HeadlessStats, HeadlessTexture};
#[cfg(feature = "gui")]
pub use wgpu_backend::{WgpuAtlas, WgpuBackend};

/// Bytes per atlas/scratchpad pixel (RGBA8)
pub const BYTES_PER_PIXEL: u32 = 4;

/// Shader constants, refreshed only when `Invalidations::CONST_BUFFER` is set
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ConstBuffer {
    pub viewport: [f32; 4],
    pub gamma_ratios: [f32; 4],
    pub enhanced_contrast: f32,
    pub cell_count_x: u32,
    pub cell_size: [u32; 2],
    pub underline_pos: [u32; 2],
    pub strikethrough_pos: [u32; 2],
    pub background_color: u32,
    pub cursor_color: u32,
    pub selection_color: u32,
    pub use_cleartype: u32,
}

/// One grid position as seen by the fragment shader
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Cell {
    /// Atlas tile of the glyph part drawn in this cell, see `TileCoord::pack`.
    /// Zero (the cursor tile) marks a cell without a glyph.
    pub glyph_pos: u32,
    /// `CellFlags` bits
    pub flags: u32,
    /// Foreground 0xAABBGGRR
    pub color: u32,
    /// Background 0xAABBGGRR
    pub background: u32,
}

/// Copy hint for tile uploads into the atlas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyHint {
    Default,
    /// The destination region is not read by any in-flight GPU work.
    /// Valid for glyph tiles because placed tiles are never overwritten.
    NoOverwrite,
}

/// Back buffer resource state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Present,
    RenderTarget,
}

/// A cell-sized region of RGBA8 pixels inside a larger surface
#[derive(Debug, Clone, Copy)]
pub struct TileData<'a> {
    /// Pixels starting at the tile's top-left corner
    pub pixels: &'a [u8],
    /// Bytes per row of the surface the tile lives in
    pub stride: u32,
    pub size: Size,
}

pub trait RenderBackend {
    type Texture;

    /// Largest texture dimension the device can allocate
    fn max_texture_dimension(&self) -> u32;

    fn create_atlas(&mut self, size: Size) -> Result<Self::Texture>;

    /// Copy `[0,0)-(region)` of `src` into the same region of `dst`.
    fn copy_atlas_region(
        &mut self,
        src: &Self::Texture,
        dst: &mut Self::Texture,
        region: Size,
    ) -> Result<()>;

    fn upload_tile(
        &mut self,
        atlas: &mut Self::Texture,
        target: TileCoord,
        tile: &TileData<'_>,
        hint: CopyHint,
    ) -> Result<()>;

    fn write_constants(&mut self, constants: &ConstBuffer) -> Result<()>;

    /// Full overwrite of the cell buffer.
    fn write_cells(&mut self, cells: &[Cell]) -> Result<()>;

    /// Block until the swap chain accepts another frame.
    fn wait_for_frame_latency(&mut self) -> Result<()>;

    fn transition_back_buffer(&mut self, before: ResourceState, after: ResourceState)
    -> Result<()>;

    /// Draw three vertices without vertex/index buffers, sampling the cell
    /// buffer and `atlas`.
    fn draw_fullscreen_triangle(&mut self, atlas: &Self::Texture, viewport: Size) -> Result<()>;

    /// Present with a sync interval of one.
    fn present(&mut self) -> Result<()>;

    fn resize_surface(&mut self, size: Size) -> Result<()>;
}

/// Bounds check shared by the backends for tile and region copies.
pub(crate) fn check_tile_bounds(atlas: Size, target: TileCoord, tile: Size) -> bool {
    target.x as u32 + tile.width <= atlas.width && target.y as u32 + tile.height <= atlas.height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_layouts() {
        // Uniform buffers need 16-byte aligned sizes; cells are read as a
        // storage array of 4x u32.
        assert_eq!(std::mem::size_of::<ConstBuffer>(), 80);
        assert_eq!(std::mem::size_of::<ConstBuffer>() % 16, 0);
        assert_eq!(std::mem::size_of::<Cell>(), 16);
    }

    #[test]
    fn test_tile_bounds() {
        let atlas = Size::new(64, 16);
        assert!(check_tile_bounds(atlas, TileCoord::new(56, 0), Size::new(8, 16)));
        assert!(!check_tile_bounds(atlas, TileCoord::new(64, 0), Size::new(8, 16)));
        assert!(!check_tile_bounds(atlas, TileCoord::new(0, 8), Size::new(8, 16)));
    }
}
