//! CPU-side backend without a window
//!
//! Textures are plain RGBA8 pixel vectors. Every device call is counted so
//! callers can observe exactly what a frame did.

use super::{
    BYTES_PER_PIXEL, Cell, ConstBuffer, CopyHint, RenderBackend, ResourceState, TileData,
    check_tile_bounds,
};
use crate::error::{EngineError, Result};
use crate::geometry::{Size, TileCoord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub atlases_created: u32,
    pub region_copies: u32,
    pub tiles_uploaded: u32,
    pub no_overwrite_uploads: u32,
    pub constant_writes: u32,
    pub cell_writes: u32,
    pub draws: u32,
    pub presents: u32,
    pub latency_waits: u32,
}

#[derive(Debug, Clone)]
pub struct HeadlessTexture {
    size: Size,
    pixels: Vec<u8>,
}

impl HeadlessTexture {
    fn new(size: Size) -> Self {
        let len = (size.width * size.height * BYTES_PER_PIXEL) as usize;
        Self {
            size,
            pixels: vec![0; len],
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    fn stride(&self) -> usize {
        (self.size.width * BYTES_PER_PIXEL) as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = y as usize * self.stride() + (x * BYTES_PER_PIXEL) as usize;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[offset..offset + 4]);
        px
    }

    /// Copy out the pixels of one tile, row by row.
    pub fn tile(&self, origin: TileCoord, size: Size) -> Vec<u8> {
        let row_bytes = (size.width * BYTES_PER_PIXEL) as usize;
        let mut out = Vec::with_capacity(row_bytes * size.height as usize);
        for row in 0..size.height {
            let start = (origin.y as u32 + row) as usize * self.stride()
                + (origin.x as u32 * BYTES_PER_PIXEL) as usize;
            out.extend_from_slice(&self.pixels[start..start + row_bytes]);
        }
        out
    }
}

pub struct HeadlessBackend {
    max_texture_dimension: u32,
    stats: HeadlessStats,
    surface: Size,
    back_buffer_state: ResourceState,
    frame_acquired: bool,
    last_constants: Option<ConstBuffer>,
    last_cells: Vec<Cell>,
    fail_next_present: bool,
    fail_atlas_creation: bool,
}

impl HeadlessBackend {
    pub fn new(max_texture_dimension: u32) -> Self {
        Self {
            max_texture_dimension,
            stats: HeadlessStats::default(),
            surface: Size::new(1, 1),
            back_buffer_state: ResourceState::Present,
            frame_acquired: false,
            last_constants: None,
            last_cells: Vec::new(),
            fail_next_present: false,
            fail_atlas_creation: false,
        }
    }

    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    pub fn surface_size(&self) -> Size {
        self.surface
    }

    pub fn back_buffer_state(&self) -> ResourceState {
        self.back_buffer_state
    }

    pub fn last_constants(&self) -> Option<&ConstBuffer> {
        self.last_constants.as_ref()
    }

    pub fn last_cells(&self) -> &[Cell] {
        &self.last_cells
    }

    /// Make the next `present` fail like a lost device would.
    pub fn fail_next_present(&mut self) {
        self.fail_next_present = true;
    }

    /// Make atlas allocation fail until cleared.
    pub fn set_fail_atlas_creation(&mut self, fail: bool) {
        self.fail_atlas_creation = fail;
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(8192)
    }
}

impl RenderBackend for HeadlessBackend {
    type Texture = HeadlessTexture;

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn create_atlas(&mut self, size: Size) -> Result<HeadlessTexture> {
        if self.fail_atlas_creation
            || size.width > self.max_texture_dimension
            || size.height > self.max_texture_dimension
        {
            return Err(EngineError::ResourceCreation {
                what: "atlas texture",
                reason: format!("{}x{} not allocatable", size.width, size.height),
            });
        }
        self.stats.atlases_created += 1;
        Ok(HeadlessTexture::new(size))
    }

    fn copy_atlas_region(
        &mut self,
        src: &HeadlessTexture,
        dst: &mut HeadlessTexture,
        region: Size,
    ) -> Result<()> {
        if region.width > src.size.width
            || region.height > src.size.height
            || !check_tile_bounds(dst.size, TileCoord::default(), region)
        {
            return Err(EngineError::Gpu(format!(
                "copy region {}x{} out of bounds",
                region.width, region.height
            )));
        }
        let row_bytes = (region.width * BYTES_PER_PIXEL) as usize;
        let (src_stride, dst_stride) = (src.stride(), dst.stride());
        for row in 0..region.height as usize {
            let from = row * src_stride;
            let to = row * dst_stride;
            dst.pixels[to..to + row_bytes].copy_from_slice(&src.pixels[from..from + row_bytes]);
        }
        self.stats.region_copies += 1;
        Ok(())
    }

    fn upload_tile(
        &mut self,
        atlas: &mut HeadlessTexture,
        target: TileCoord,
        tile: &TileData<'_>,
        hint: CopyHint,
    ) -> Result<()> {
        if !check_tile_bounds(atlas.size, target, tile.size) {
            return Err(EngineError::Gpu(format!(
                "tile at {},{} outside {}x{} atlas",
                target.x, target.y, atlas.size.width, atlas.size.height
            )));
        }
        let row_bytes = (tile.size.width * BYTES_PER_PIXEL) as usize;
        let dst_stride = atlas.stride();
        for row in 0..tile.size.height as usize {
            let from = row * tile.stride as usize;
            let to = (target.y as usize + row) * dst_stride
                + (target.x as u32 * BYTES_PER_PIXEL) as usize;
            atlas.pixels[to..to + row_bytes].copy_from_slice(&tile.pixels[from..from + row_bytes]);
        }
        self.stats.tiles_uploaded += 1;
        if hint == CopyHint::NoOverwrite {
            self.stats.no_overwrite_uploads += 1;
        }
        Ok(())
    }

    fn write_constants(&mut self, constants: &ConstBuffer) -> Result<()> {
        self.last_constants = Some(*constants);
        self.stats.constant_writes += 1;
        Ok(())
    }

    fn write_cells(&mut self, cells: &[Cell]) -> Result<()> {
        self.last_cells.clear();
        self.last_cells.extend_from_slice(cells);
        self.stats.cell_writes += 1;
        Ok(())
    }

    fn wait_for_frame_latency(&mut self) -> Result<()> {
        self.frame_acquired = true;
        self.stats.latency_waits += 1;
        Ok(())
    }

    fn transition_back_buffer(
        &mut self,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<()> {
        if self.back_buffer_state != before {
            return Err(EngineError::Gpu(format!(
                "back buffer is {:?}, expected {before:?}",
                self.back_buffer_state
            )));
        }
        self.back_buffer_state = after;
        Ok(())
    }

    fn draw_fullscreen_triangle(
        &mut self,
        _atlas: &HeadlessTexture,
        _viewport: Size,
    ) -> Result<()> {
        if self.back_buffer_state != ResourceState::RenderTarget {
            return Err(EngineError::Gpu("draw outside of render target state".into()));
        }
        self.stats.draws += 1;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if !self.frame_acquired {
            return Err(EngineError::Gpu("present without a frame latency wait".into()));
        }
        if std::mem::take(&mut self.fail_next_present) {
            return Err(EngineError::Gpu("device removed".into()));
        }
        self.frame_acquired = false;
        self.stats.presents += 1;
        Ok(())
    }

    fn resize_surface(&mut self, size: Size) -> Result<()> {
        // Reconfiguring the swap chain releases the acquired back buffer.
        self.frame_acquired = false;
        self.surface = Size::new(size.width.max(1), size.height.max(1));
        Ok(())
    }
}
