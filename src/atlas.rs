//! Glyph atlas - bump allocator over a geometrically growing texture
//!
//! Tiles are handed out in row-major order and never reused. When the bump
//! position leaves the current texture, a larger texture is allocated and
//! the old one is copied into its top-left corner, so every tile placed so
//! far keeps its coordinates and pixels.
//!
//! ```text
//!   x →
//! y +--------------+
//! ↓ |CXXXXXXXXXXXXX|
//!   |XXXXXXXXXXXXXX|
//!   |XXXXX↖        |
//!   |      |       |
//!   +------|-------+
//!          position
//! ```
//! `C` is the tile reserved for the cursor.

use crate::backend::RenderBackend;
use crate::error::{EngineError, Result};
use crate::geometry::{Size, TileCoord};

/// Every grow reserves room for at least this many cells.
pub const MIN_ATLAS_CELLS: u64 = 64;

/// Bump position and texture geometry, independent of any device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasAllocator {
    cell: Size,
    limit: Size,
    size: Size,
    position_x: u32,
    position_y: u32,
}

impl AtlasAllocator {
    /// Create an allocator whose first tile (slot 0) is reserved for the cursor.
    pub fn new(cell: Size, limit: Size) -> Self {
        assert!(!cell.is_empty(), "atlas cell size must be non-zero");
        assert!(
            cell.width <= limit.width && cell.height <= limit.height,
            "atlas limit must hold at least one cell"
        );
        let mut allocator = Self {
            cell,
            limit,
            size: Size::default(),
            position_x: 0,
            position_y: 0,
        };
        allocator.advance();
        allocator
    }

    pub fn cell(&self) -> Size {
        self.cell
    }

    pub fn limit(&self) -> Size {
        self.limit
    }

    /// Current texture size; zero before the first grow
    pub fn size(&self) -> Size {
        self.size
    }

    /// Next free tile position
    pub fn position(&self) -> (u32, u32) {
        (self.position_x, self.position_y)
    }

    /// Whether the bump position has left the current texture.
    pub fn needs_growth(&self) -> bool {
        !(self.position_y < self.size.height && self.position_x < self.size.width)
    }

    /// Texture size the next grow should allocate.
    pub fn next_size(&self) -> Size {
        let limit_x = self.limit.width as u64;
        let cell_x = self.cell.width as u64;
        let cell_y = self.cell.height as u64;
        let per_cell_area = cell_x * cell_y;

        // Full rows above the position plus the partial row it sits in.
        let current_area = self.position_y as u64 * limit_x + self.position_x as u64 * cell_y;
        let min_area = MIN_ATLAS_CELLS * per_cell_area;
        // Smallest power of two that holds at least `min_area` pixels and
        // strictly more than what is consumed now.
        let new_area = (current_area + 1).max(min_area).next_power_of_two();

        let pixel_per_row = limit_x * cell_y;
        let wanted_height = new_area.div_ceil(pixel_per_row) * cell_y;
        let wanted_width = if wanted_height != cell_y {
            limit_x
        } else {
            // With cell areas that are not a power of two the rounded area
            // can end exactly at the position; the next tile must still fit.
            (new_area / per_cell_area * cell_x).max(self.position_x as u64 + cell_x)
        };

        let width = wanted_width.min(limit_x) as u32;
        let height = wanted_height.min(self.limit.height as u64) as u32;
        assert!(width != 0 && height != 0, "atlas geometry collapsed to zero");
        Size::new(width, height)
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    /// Whether `count` more tiles fit below the limit.
    pub fn can_allocate(&self, count: usize) -> bool {
        let mut probe = self.clone();
        (0..count).all(|_| probe.allocate().is_ok())
    }

    /// Hand out the next tile.
    pub fn allocate(&mut self) -> Result<TileCoord> {
        if self.position_y + self.cell.height > self.limit.height {
            return Err(EngineError::AtlasFull {
                width: self.limit.width,
                height: self.limit.height,
            });
        }
        let coord = TileCoord::new(self.position_x as u16, self.position_y as u16);
        self.advance();
        Ok(coord)
    }

    /// Hand out `count` tiles or none at all.
    pub fn allocate_run(&mut self, count: usize) -> Result<Vec<TileCoord>> {
        if !self.can_allocate(count) {
            return Err(EngineError::AtlasFull {
                width: self.limit.width,
                height: self.limit.height,
            });
        }
        (0..count).map(|_| self.allocate()).collect()
    }

    fn advance(&mut self) {
        self.position_x += self.cell.width;
        if self.position_x + self.cell.width > self.limit.width {
            self.position_x = 0;
            self.position_y += self.cell.height;
        }
    }
}

/// Outcome of `Atlas::ensure_capacity`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    Unchanged,
    /// First texture; nothing was copied and slot 0 is still empty
    Created,
    /// Larger texture with the previous contents copied over
    Grown,
}

pub struct Atlas<T> {
    allocator: AtlasAllocator,
    texture: Option<T>,
    generation: u64,
}

impl<T> Atlas<T> {
    pub fn new(cell: Size, limit: Size) -> Self {
        Self {
            allocator: AtlasAllocator::new(cell, limit),
            texture: None,
            generation: 0,
        }
    }

    pub fn allocator(&self) -> &AtlasAllocator {
        &self.allocator
    }

    pub fn texture(&self) -> Option<&T> {
        self.texture.as_ref()
    }

    pub fn texture_mut(&mut self) -> Option<&mut T> {
        self.texture.as_mut()
    }

    /// Bumped on every texture replacement
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn allocate_run(&mut self, count: usize) -> Result<Vec<TileCoord>> {
        self.allocator.allocate_run(count)
    }

    /// Grow the texture if the bump position has left it.
    pub fn ensure_capacity<B>(&mut self, backend: &mut B) -> Result<Growth>
    where
        B: RenderBackend<Texture = T>,
    {
        if !self.allocator.needs_growth() {
            return Ok(Growth::Unchanged);
        }
        let old_size = self.allocator.size();
        let new_size = self.allocator.next_size();
        if self.texture.is_some() && new_size == old_size {
            // Already at the limit; the allocator rejects further tiles.
            return Ok(Growth::Unchanged);
        }

        let mut texture = backend.create_atlas(new_size)?;
        let growth = match &self.texture {
            Some(previous) => {
                backend.copy_atlas_region(previous, &mut texture, old_size)?;
                Growth::Grown
            }
            None => Growth::Created,
        };
        log::debug!(
            "atlas {}x{} -> {}x{} ({growth:?})",
            old_size.width,
            old_size.height,
            new_size.width,
            new_size.height
        );

        self.allocator.set_size(new_size);
        self.texture = Some(texture);
        self.generation += 1;
        Ok(growth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn allocator_at(cell: Size, limit: Size, x: u32, y: u32) -> AtlasAllocator {
        let mut allocator = AtlasAllocator::new(cell, limit);
        allocator.position_x = x;
        allocator.position_y = y;
        allocator
    }

    #[test]
    fn test_first_grow_reserves_64_cells() {
        let allocator = allocator_at(Size::new(8, 16), Size::new(4096, 4096), 0, 0);
        assert_eq!(allocator.next_size(), Size::new(512, 16));
    }

    #[test]
    fn test_cursor_slot_is_reserved() {
        let mut allocator = AtlasAllocator::new(Size::new(8, 16), Size::new(4096, 4096));
        assert_eq!(allocator.position(), (8, 0));
        assert_eq!(allocator.allocate().unwrap(), TileCoord::new(8, 0));
        assert_eq!(allocator.next_size(), Size::new(512, 16));
    }

    #[test]
    fn test_grow_doubles_a_single_row() {
        // 64 tiles consumed: exactly a power of two of area.
        let allocator = allocator_at(Size::new(8, 16), Size::new(4096, 4096), 512, 0);
        assert_eq!(allocator.next_size(), Size::new(1024, 16));
    }

    #[test]
    fn test_grow_spills_into_full_rows() {
        // 4096 px row of 8x16 cells = 512 cells; one full row consumed.
        let allocator = allocator_at(Size::new(8, 16), Size::new(4096, 4096), 0, 16);
        assert_eq!(allocator.next_size(), Size::new(4096, 32));
    }

    #[test]
    fn test_single_row_grow_covers_position() {
        // 127 cells of 3x43 consume 16383 px, one short of the next power of two.
        let allocator = allocator_at(Size::new(3, 43), Size::new(4096, 4096), 381, 0);
        assert_eq!(allocator.next_size(), Size::new(384, 43));
    }

    #[test]
    fn test_grow_is_clamped_to_limit() {
        let allocator = allocator_at(Size::new(8, 16), Size::new(256, 48), 0, 32);
        assert_eq!(allocator.next_size(), Size::new(256, 48));
    }

    #[test]
    fn test_allocation_wraps_rows() {
        let mut allocator = AtlasAllocator::new(Size::new(8, 16), Size::new(32, 64));
        let coords: Vec<_> = (0..4).map(|_| allocator.allocate().unwrap()).collect();
        assert_eq!(
            coords,
            vec![
                TileCoord::new(8, 0),
                TileCoord::new(16, 0),
                TileCoord::new(24, 0),
                TileCoord::new(0, 16),
            ]
        );
    }

    #[test]
    fn test_allocation_fails_at_limit() {
        let mut allocator = AtlasAllocator::new(Size::new(8, 16), Size::new(16, 16));
        assert_eq!(allocator.allocate().unwrap(), TileCoord::new(8, 0));
        assert!(matches!(
            allocator.allocate(),
            Err(EngineError::AtlasFull { .. })
        ));
    }

    #[test]
    fn test_allocate_run_is_all_or_nothing() {
        let mut allocator = AtlasAllocator::new(Size::new(8, 16), Size::new(24, 16));
        let before = allocator.position();
        assert!(allocator.allocate_run(3).is_err());
        assert_eq!(allocator.position(), before);
        assert_eq!(allocator.allocate_run(2).unwrap().len(), 2);
    }

    #[test]
    fn test_ensure_capacity_creates_then_grows() {
        let mut backend = HeadlessBackend::default();
        let mut atlas: Atlas<_> = Atlas::new(Size::new(8, 16), Size::new(4096, 4096));
        assert_eq!(atlas.ensure_capacity(&mut backend).unwrap(), Growth::Created);
        assert_eq!(atlas.ensure_capacity(&mut backend).unwrap(), Growth::Unchanged);

        atlas.allocate_run(63).unwrap();
        assert!(atlas.allocator().needs_growth());
        assert_eq!(atlas.ensure_capacity(&mut backend).unwrap(), Growth::Grown);
        assert_eq!(atlas.allocator().size(), Size::new(1024, 16));
        assert_eq!(backend.stats().region_copies, 1);
        assert_eq!(atlas.generation(), 2);
    }

    #[test]
    fn test_ensure_capacity_stops_at_limit() {
        let mut backend = HeadlessBackend::default();
        let mut atlas: Atlas<_> = Atlas::new(Size::new(8, 16), Size::new(32, 16));
        assert_eq!(atlas.ensure_capacity(&mut backend).unwrap(), Growth::Created);
        assert_eq!(atlas.allocator().size(), Size::new(32, 16));
        atlas.allocate_run(3).unwrap();
        assert!(atlas.allocator().needs_growth());
        assert_eq!(atlas.ensure_capacity(&mut backend).unwrap(), Growth::Unchanged);
        assert_eq!(backend.stats().atlases_created, 1);
        assert!(atlas.allocate_run(1).is_err());
    }
}
