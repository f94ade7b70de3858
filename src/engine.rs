//! Frame compositor and present pipeline
//!
//! `Engine` owns every presenter-side resource: the atlas, the scratchpad,
//! the glyph cache and queue, the cell buffer and the invalidation set.
//! Producers reach it only through `EngineHandle`.
//!
//! Each `present()` runs the frame stages in a fixed order:
//!
//! 1. take the producer's intents and invalidation bits
//! 2. wait for the frame latency
//! 3. grow the atlas, then the scratchpad
//! 4. rasterize queued glyphs
//! 5. redraw the cursor tile and the constant buffer if stale
//! 6. upload the cell buffer and draw one fullscreen triangle
//! 7. present

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::atlas::{Atlas, AtlasAllocator, Growth};
use crate::backend::{Cell, ConstBuffer, RenderBackend, ResourceState};
use crate::config::{AntialiasMode, Settings};
use crate::cursor;
use crate::error::{EngineError, Result};
use crate::geometry::{GridMetrics, Size};
use crate::glyph::{
    CellFlags, GlyphAttributes, GlyphCache, GlyphKey, GlyphQueue, GlyphValue, is_colored_glyph,
};
use crate::handle::{EngineHandle, Intent};
use crate::invalidation::{Invalidations, SharedInvalidations};
use crate::rasterizer::{TextShaper, rasterize_glyph};
use crate::scratchpad::{Scratchpad, gamma_ratios};

/// Presentation attributes of a run of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    /// Packed 0xAABBGGRR
    pub foreground: u32,
    pub background: u32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
            foreground: 0xFFCC_CCCC,
            background: Settings::default().background_color,
        }
    }
}

impl TextStyle {
    fn cell_flags(&self) -> CellFlags {
        let mut flags = CellFlags::empty();
        flags.set(CellFlags::UNDERLINE, self.underline);
        flags.set(CellFlags::STRIKETHROUGH, self.strikethrough);
        flags
    }
}

/// Text starting at `column` of some row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub column: u32,
    pub text: String,
    pub style: TextStyle,
}

impl TextRun {
    pub fn new(column: u32, text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            column,
            text: text.into(),
            style,
        }
    }
}

/// Per-engine counters, mostly for tests and the demo's log output
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_presented: u64,
    pub frames_abandoned: u64,
    pub glyphs_rasterized: u64,
    pub cursor_redraws: u64,
    pub constant_updates: u64,
}

/// Settings whose change invalidates every rasterized tile
fn glyphs_differ(a: &Settings, b: &Settings) -> bool {
    a.cell_size != b.cell_size
        || a.dpi != b.dpi
        || a.font_size != b.font_size
        || a.antialiasing != b.antialiasing
        || a.font_features != b.font_features
        || a.atlas_size_limit != b.atlas_size_limit
}

/// Which tile of which glyph a cell shows
#[derive(Debug, Clone, PartialEq, Eq)]
struct GlyphPart {
    key: GlyphKey,
    part: usize,
}

pub struct Engine<B: RenderBackend> {
    backend: B,
    shaper: Box<dyn TextShaper>,
    /// Presenter copy of the producer's settings
    settings: Settings,
    intents: Receiver<Intent>,
    shared: Arc<SharedInvalidations>,
    connected: bool,

    atlas: Atlas<B::Texture>,
    scratchpad: Scratchpad,
    glyph_cache: GlyphCache,
    glyph_queue: GlyphQueue,
    invalidations: Invalidations,
    max_encountered_cell_count: u32,

    viewport: Size,
    grid: Size,
    cells: Vec<Cell>,
    /// Glyph part shown in each cell, for re-resolving after an atlas reset
    anchors: Vec<Option<GlyphPart>>,
    cursor: Option<(u32, u32)>,

    frame_latency_waited: bool,
    stats: FrameStats,
}

impl<B: RenderBackend> Engine<B> {
    /// Create the presenter and the first producer handle.
    pub fn new(
        backend: B,
        shaper: Box<dyn TextShaper>,
        settings: Settings,
    ) -> Result<(Self, EngineHandle)> {
        let mut settings = settings;
        settings.clamp_atlas_limit(backend.max_texture_dimension());
        settings.validate()?;

        let (sender, intents) = mpsc::channel();
        let shared = Arc::new(SharedInvalidations::default());
        let handle = EngineHandle::new(sender, Arc::clone(&shared));

        let grid = Size::new(1, 1);
        let engine = Self {
            backend,
            shaper,
            atlas: Atlas::new(settings.cell_size, settings.atlas_size_limit),
            scratchpad: Scratchpad::new(&settings),
            intents,
            shared,
            connected: true,
            glyph_cache: GlyphCache::new(),
            glyph_queue: GlyphQueue::default(),
            invalidations: Invalidations::CURSOR | Invalidations::CONST_BUFFER,
            max_encountered_cell_count: 1,
            viewport: Size::default(),
            grid,
            cells: vec![Self::blank_cell(&settings); grid.area() as usize],
            anchors: vec![None; grid.area() as usize],
            cursor: None,
            frame_latency_waited: false,
            stats: FrameStats::default(),
            settings,
        };
        Ok((engine, handle))
    }

    fn blank_cell(settings: &Settings) -> Cell {
        Cell {
            glyph_pos: 0,
            flags: 0,
            color: TextStyle::default().foreground,
            background: settings.background_color,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn atlas(&self) -> &Atlas<B::Texture> {
        &self.atlas
    }

    pub fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }

    pub fn glyph(&self, key: &GlyphKey) -> Option<&GlyphValue> {
        self.glyph_cache.get(key)
    }

    pub fn cached_glyphs(&self) -> usize {
        self.glyph_cache.len()
    }

    pub fn queued_glyphs(&self) -> usize {
        self.glyph_queue.len()
    }

    pub fn invalidations(&self) -> Invalidations {
        self.invalidations
    }

    /// Viewport in pixels as last passed to `resize`
    pub fn viewport(&self) -> Size {
        self.viewport
    }

    /// Grid size in cells
    pub fn grid_size(&self) -> Size {
        self.grid
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, column: u32, row: u32) -> Option<&Cell> {
        if column >= self.grid.width || row >= self.grid.height {
            return None;
        }
        self.cells.get((row * self.grid.width + column) as usize)
    }

    pub fn cursor(&self) -> Option<(u32, u32)> {
        self.cursor
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// False once every `EngineHandle` has been dropped.
    pub fn handles_connected(&self) -> bool {
        self.connected
    }

    /// Render and present one frame.
    ///
    /// Any failure abandons the frame before presentation; nothing is
    /// retried. Queued glyphs that were not rasterized stay queued for the
    /// next call.
    pub fn present(&mut self) -> Result<()> {
        match self.present_frame() {
            Ok(()) => {
                self.stats.frames_presented += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.frames_abandoned += 1;
                log::error!("frame abandoned (error {}): {e}", e.code());
                Err(e)
            }
        }
    }

    fn present_frame(&mut self) -> Result<()> {
        self.frame_latency_waited = false;
        // Intents may reconfigure the surface, which drops an acquired frame.
        self.drain_intents();
        self.invalidations |= self.shared.take();

        self.backend.wait_for_frame_latency()?;
        self.frame_latency_waited = true;

        if self.atlas.ensure_capacity(&mut self.backend)? == Growth::Created {
            // Slot 0 of a fresh atlas holds no cursor yet.
            self.invalidations |= Invalidations::CURSOR;
        }
        if self
            .scratchpad
            .ensure_width(self.max_encountered_cell_count)?
        {
            self.invalidations |= Invalidations::CONST_BUFFER;
        }

        self.drain_glyph_queue()?;

        if self.invalidations.contains(Invalidations::CURSOR) {
            self.draw_cursor()?;
            self.invalidations.remove(Invalidations::CURSOR);
            self.stats.cursor_redraws += 1;
        }
        if self.invalidations.contains(Invalidations::CONST_BUFFER) {
            let constants = self.constants();
            self.backend.write_constants(&constants)?;
            self.invalidations.remove(Invalidations::CONST_BUFFER);
            self.stats.constant_updates += 1;
        }

        self.backend.write_cells(&self.cells)?;

        let atlas = self
            .atlas
            .texture()
            .ok_or_else(|| EngineError::Gpu("no atlas texture".into()))?;
        self.backend
            .transition_back_buffer(ResourceState::Present, ResourceState::RenderTarget)?;
        let drawn = self.backend.draw_fullscreen_triangle(atlas, self.viewport);
        self.backend
            .transition_back_buffer(ResourceState::RenderTarget, ResourceState::Present)?;
        drawn?;

        assert!(
            self.frame_latency_waited,
            "frame latency wait skipped before present"
        );
        self.backend.present()
    }

    /// Copy the pending intents out of the channel, then apply them.
    fn drain_intents(&mut self) {
        let mut snapshot = Vec::new();
        loop {
            match self.intents.try_recv() {
                Ok(intent) => snapshot.push(intent),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        log::debug!("all engine handles dropped");
                    }
                    self.connected = false;
                    break;
                }
            }
        }
        for intent in snapshot {
            if let Err(e) = self.apply_intent(intent) {
                log::warn!("intent rejected: {e}");
            }
        }
    }

    fn apply_intent(&mut self, intent: Intent) -> Result<()> {
        match intent {
            Intent::UpdateSettings(settings) => self.apply_settings(*settings),
            Intent::Resize(viewport) => self.resize(viewport),
            Intent::MoveCursor(position) => {
                self.move_cursor(position);
                Ok(())
            }
            Intent::PaintRow { row, runs } => runs.iter().try_for_each(|run| {
                self.paint_run(row, run.column, &run.text, run.style)
                    .map(|_| ())
            }),
            Intent::SetSelection { row, columns } => {
                self.set_selection(row, columns);
                Ok(())
            }
        }
    }

    fn drain_glyph_queue(&mut self) -> Result<()> {
        if self.glyph_queue.is_empty() {
            return Ok(());
        }
        let atlas = self
            .atlas
            .texture_mut()
            .ok_or_else(|| EngineError::Gpu("no atlas texture".into()))?;
        let shaper = self.shaper.as_ref();
        let settings = &self.settings;
        let scratchpad = &mut self.scratchpad;
        let backend = &mut self.backend;

        let (rasterized, result) = self.glyph_queue.drain_with(|item| {
            rasterize_glyph(shaper, item, settings, scratchpad, backend, atlas)
        });
        self.stats.glyphs_rasterized += rasterized as u64;
        result
    }

    fn draw_cursor(&mut self) -> Result<()> {
        self.scratchpad.ensure_width(1)?;
        let atlas = self
            .atlas
            .texture_mut()
            .ok_or_else(|| EngineError::Gpu("no atlas texture".into()))?;
        cursor::draw_cursor(
            &self.settings.cursor,
            self.settings.cell_size_dip(),
            &mut self.scratchpad,
            &mut self.backend,
            atlas,
        )
    }

    fn constants(&self) -> ConstBuffer {
        let settings = &self.settings;
        let cell = settings.cell_size;
        let params = self.scratchpad.params();
        let mode = self.scratchpad.antialiasing();
        let line = settings.line_thickness.max(1);
        // Only whole cells are composited; the remainder shows the background.
        let covered = Size::new(
            (self.grid.width * cell.width).min(self.viewport.width.max(cell.width)),
            (self.grid.height * cell.height).min(self.viewport.height.max(cell.height)),
        );

        ConstBuffer {
            viewport: [0.0, 0.0, covered.width as f32, covered.height as f32],
            gamma_ratios: gamma_ratios(params.gamma),
            enhanced_contrast: params.enhanced_contrast(mode),
            cell_count_x: self.grid.width,
            cell_size: [cell.width, cell.height],
            underline_pos: [
                settings.underline_position,
                settings.underline_position + line,
            ],
            strikethrough_pos: [
                settings.strikethrough_position,
                settings.strikethrough_position + line,
            ],
            background_color: settings.background_color,
            cursor_color: settings.cursor.color,
            selection_color: settings.selection_color,
            use_cleartype: (mode == AntialiasMode::ClearType) as u32,
        }
    }

    /// Look a glyph up, reserving atlas tiles and queueing it on a miss.
    fn resolve_glyph(&mut self, key: &GlyphKey) -> Result<GlyphValue> {
        if let Some(value) = self.glyph_cache.get(key) {
            return Ok(value.clone());
        }
        let count = key.cell_count();
        let coords = self.atlas.allocate_run(count)?;
        let flags = if is_colored_glyph(&key.text) {
            CellFlags::COLORED_GLYPH
        } else {
            CellFlags::empty()
        };
        let value = GlyphValue { coords, flags };
        self.glyph_cache.insert(key.clone(), value.clone());
        self.glyph_queue.push(key.clone(), value.clone());
        self.max_encountered_cell_count = self.max_encountered_cell_count.max(count as u32);
        Ok(value)
    }

    /// Paint `text` into `row` starting at `column`.
    ///
    /// Text is split into grapheme clusters; wide clusters cover two cells.
    /// Anything past the right edge is clipped. Returns the number of
    /// columns painted.
    pub fn paint_run(
        &mut self,
        row: u32,
        column: u32,
        text: &str,
        style: TextStyle,
    ) -> Result<u32> {
        if row >= self.grid.height {
            return Ok(0);
        }
        let style_flags = style.cell_flags();
        let mut col = column;
        for cluster in text.graphemes(true) {
            if col >= self.grid.width {
                break;
            }
            let width = UnicodeWidthStr::width(cluster).clamp(1, 2) as u32;
            let visible = width.min(self.grid.width - col);
            let start = (row * self.grid.width + col) as usize;

            let (coords, glyph_flags, anchor) = if cluster.trim().is_empty() {
                (Vec::new(), CellFlags::empty(), None)
            } else {
                let key = GlyphKey::new(
                    cluster,
                    GlyphAttributes {
                        bold: style.bold,
                        italic: style.italic,
                        cell_count: width as u8,
                    },
                );
                let value = self.resolve_glyph(&key)?;
                (value.coords, value.flags, Some(key))
            };

            self.detach_partial_glyphs(row, start..start + visible as usize);
            for part in 0..visible as usize {
                let cell = &mut self.cells[start + part];
                let kept = CellFlags::from_bits_truncate(cell.flags)
                    & (CellFlags::CURSOR | CellFlags::SELECTED);
                cell.glyph_pos = coords.get(part).map_or(0, |coord| coord.pack());
                cell.flags = (glyph_flags | style_flags | kept).bits();
                cell.color = style.foreground;
                cell.background = style.background;
                self.anchors[start + part] = anchor.clone().map(|key| GlyphPart { key, part });
            }
            col += width;
        }
        Ok(col.min(self.grid.width) - column.min(self.grid.width))
    }

    /// Blank the parts of wide glyphs that stick out of `range`, which is
    /// about to be overwritten. A glyph never shows half of itself.
    fn detach_partial_glyphs(&mut self, row: u32, range: Range<usize>) {
        let row_start = (row * self.grid.width) as usize;
        let row_end = row_start + self.grid.width as usize;
        let mut orphans = Vec::new();
        for index in range.clone() {
            let Some(glyph) = &self.anchors[index] else {
                continue;
            };
            let origin = index.saturating_sub(glyph.part);
            let cells = origin.max(row_start)..(origin + glyph.key.cell_count()).min(row_end);
            orphans.extend(cells.filter(|other| !range.contains(other)));
        }
        for index in orphans {
            let cell = &mut self.cells[index];
            cell.glyph_pos = 0;
            cell.flags &= !CellFlags::COLORED_GLYPH.bits();
            self.anchors[index] = None;
        }
    }

    /// Clear a row back to the background color.
    pub fn clear_row(&mut self, row: u32) {
        if row >= self.grid.height {
            return;
        }
        let blank = Self::blank_cell(&self.settings);
        let start = (row * self.grid.width) as usize;
        let end = start + self.grid.width as usize;
        for (cell, anchor) in self.cells[start..end]
            .iter_mut()
            .zip(&mut self.anchors[start..end])
        {
            let kept = cell.flags & (CellFlags::CURSOR | CellFlags::SELECTED).bits();
            *cell = Cell { flags: kept, ..blank };
            *anchor = None;
        }
    }

    pub fn move_cursor(&mut self, position: Option<(u32, u32)>) {
        if let Some((column, row)) = self.cursor {
            self.update_flag(column, row, CellFlags::CURSOR, false);
        }
        self.cursor = position.filter(|&(column, row)| {
            column < self.grid.width && row < self.grid.height
        });
        if let Some((column, row)) = self.cursor {
            self.update_flag(column, row, CellFlags::CURSOR, true);
        }
    }

    pub fn set_selection(&mut self, row: u32, columns: Option<Range<u32>>) {
        if row >= self.grid.height {
            return;
        }
        let columns = columns.unwrap_or(0..0);
        for column in 0..self.grid.width {
            self.update_flag(column, row, CellFlags::SELECTED, columns.contains(&column));
        }
    }

    fn update_flag(&mut self, column: u32, row: u32, flag: CellFlags, on: bool) {
        let index = (row * self.grid.width + column) as usize;
        if let Some(cell) = self.cells.get_mut(index) {
            let mut flags = CellFlags::from_bits_truncate(cell.flags);
            flags.set(flag, on);
            cell.flags = flags.bits();
        }
    }

    /// Resize the surface and the cell grid. Cells inside the old and new
    /// grid keep their contents.
    pub fn resize(&mut self, viewport: Size) -> Result<()> {
        self.backend.resize_surface(viewport)?;
        self.viewport = viewport;
        self.invalidations |= Invalidations::CONST_BUFFER;

        let grid = GridMetrics::new(self.settings.cell_size, viewport).grid_dimensions();
        if grid == self.grid {
            return Ok(());
        }

        let blank = Self::blank_cell(&self.settings);
        let mut cells = vec![blank; grid.area() as usize];
        let mut anchors = vec![None; grid.area() as usize];
        for row in 0..self.grid.height.min(grid.height) {
            for column in 0..self.grid.width.min(grid.width) {
                let old = (row * self.grid.width + column) as usize;
                let new = (row * grid.width + column) as usize;
                cells[new] = self.cells[old];
                cells[new].flags &= !CellFlags::CURSOR.bits();
                anchors[new] = self.anchors[old].take();
            }
        }
        log::debug!(
            "grid {}x{} -> {}x{}",
            self.grid.width,
            self.grid.height,
            grid.width,
            grid.height
        );
        self.grid = grid;
        self.cells = cells;
        self.anchors = anchors;
        let cursor = self.cursor.take();
        self.move_cursor(cursor);
        Ok(())
    }

    /// Apply a new settings record.
    ///
    /// Changes to anything a rasterized tile depends on drop the atlas and
    /// the glyph cache; every painted glyph is then resolved and rasterized
    /// again on the next frame.
    pub fn apply_settings(&mut self, settings: Settings) -> Result<()> {
        let mut settings = settings;
        settings.clamp_atlas_limit(self.backend.max_texture_dimension());
        settings.validate()?;
        if settings == self.settings {
            return Ok(());
        }

        let reset = glyphs_differ(&self.settings, &settings);
        let regrid = settings.cell_size != self.settings.cell_size;
        if reset {
            let grid = if regrid {
                GridMetrics::new(settings.cell_size, self.viewport).grid_dimensions()
            } else {
                self.grid
            };
            // Everything still painted must fit the new atlas before anything changes.
            let tiles = self.tiles_needed(grid);
            let allocator = AtlasAllocator::new(settings.cell_size, settings.atlas_size_limit);
            if !allocator.can_allocate(tiles) {
                let limit = settings.atlas_size_limit;
                return Err(EngineError::AtlasFull {
                    width: limit.width,
                    height: limit.height,
                });
            }
        }
        let old_background = self.settings.background_color;
        self.settings = settings;
        self.scratchpad = Scratchpad::new(&self.settings);
        self.invalidations |= Invalidations::CURSOR | Invalidations::CONST_BUFFER;

        if old_background != self.settings.background_color {
            for cell in self.cells.iter_mut().filter(|c| c.background == old_background) {
                cell.background = self.settings.background_color;
            }
        }
        if regrid {
            self.resize(self.viewport)?;
        }
        if reset {
            self.reset_glyphs()?;
        }
        Ok(())
    }

    /// Atlas tiles needed to hold every glyph painted inside `grid`.
    fn tiles_needed(&self, grid: Size) -> usize {
        let width = self.grid.width as usize;
        let keys: HashSet<&GlyphKey> = self
            .anchors
            .iter()
            .enumerate()
            .filter_map(|(index, glyph)| {
                let (column, row) = ((index % width) as u32, (index / width) as u32);
                let inside = column < grid.width && row < grid.height;
                glyph.as_ref().filter(|_| inside).map(|glyph| &glyph.key)
            })
            .collect();
        keys.iter().map(|key| key.cell_count()).sum()
    }

    fn reset_glyphs(&mut self) -> Result<()> {
        log::debug!(
            "glyph atlas reset, {} cached glyphs dropped",
            self.glyph_cache.len()
        );
        self.atlas = Atlas::new(self.settings.cell_size, self.settings.atlas_size_limit);
        self.glyph_cache.clear();
        self.glyph_queue.clear();
        self.max_encountered_cell_count = 1;

        // Old tile positions mean nothing in the new atlas.
        for cell in &mut self.cells {
            cell.glyph_pos = 0;
        }
        let anchored: Vec<(usize, GlyphPart)> = self
            .anchors
            .iter()
            .enumerate()
            .filter_map(|(index, glyph)| glyph.clone().map(|glyph| (index, glyph)))
            .collect();
        for (index, glyph) in anchored {
            let value = self.resolve_glyph(&glyph.key)?;
            if let Some(coord) = value.coords.get(glyph.part) {
                self.cells[index].glyph_pos = coord.pack();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::rasterizer::{DrawOptions, GlyphLayout, LayoutRequest};

    struct NullShaper;
    struct NullLayout;

    impl TextShaper for NullShaper {
        fn layout(&self, _request: &LayoutRequest<'_>) -> Result<Box<dyn GlyphLayout>> {
            Ok(Box::new(NullLayout))
        }
    }

    impl GlyphLayout for NullLayout {
        fn size_dip(&self) -> (f32, f32) {
            (0.0, 0.0)
        }

        fn draw(&self, _scratchpad: &mut Scratchpad, _options: DrawOptions) -> Result<()> {
            Ok(())
        }
    }

    /// Fails to lay out one particular cluster.
    struct FailingShaper(&'static str);

    impl TextShaper for FailingShaper {
        fn layout(&self, request: &LayoutRequest<'_>) -> Result<Box<dyn GlyphLayout>> {
            if request.key.text == self.0 {
                return Err(EngineError::Font(format!("no glyph for {:?}", self.0)));
            }
            Ok(Box::new(NullLayout))
        }
    }

    fn engine() -> Engine<HeadlessBackend> {
        let (mut engine, _handle) = Engine::new(
            HeadlessBackend::default(),
            Box::new(NullShaper),
            Settings::default(),
        )
        .unwrap();
        engine.resize(Size::new(80, 48)).unwrap();
        engine
    }

    #[test]
    fn test_resize_sets_grid() {
        let engine = engine();
        assert_eq!(engine.grid_size(), Size::new(10, 3));
        assert_eq!(engine.cells().len(), 30);
    }

    #[test]
    fn test_paint_reuses_cached_glyphs() {
        let mut engine = engine();
        engine.paint_run(0, 0, "abab", TextStyle::default()).unwrap();
        assert_eq!(engine.cached_glyphs(), 2);
        assert_eq!(engine.queued_glyphs(), 2);
        assert_eq!(engine.cell(0, 0).unwrap().glyph_pos, engine.cell(2, 0).unwrap().glyph_pos);
    }

    #[test]
    fn test_spaces_take_no_tiles() {
        let mut engine = engine();
        engine.paint_run(0, 0, "a b", TextStyle::default()).unwrap();
        assert_eq!(engine.cached_glyphs(), 2);
        assert_eq!(engine.cell(1, 0).unwrap().glyph_pos, 0);
    }

    #[test]
    fn test_wide_glyph_covers_two_cells() {
        let mut engine = engine();
        let painted = engine.paint_run(1, 0, "漢x", TextStyle::default()).unwrap();
        assert_eq!(painted, 3);
        let first = engine.cell(0, 1).unwrap().glyph_pos;
        let second = engine.cell(1, 1).unwrap().glyph_pos;
        assert_eq!(second - first, 8);
    }

    #[test]
    fn test_overwriting_half_of_wide_glyph_blanks_the_other_half() {
        let mut engine = engine();
        engine.paint_run(0, 0, "漢", TextStyle::default()).unwrap();
        engine.paint_run(0, 0, "a", TextStyle::default()).unwrap();
        assert_ne!(engine.cell(0, 0).unwrap().glyph_pos, 0);
        assert_eq!(engine.cell(1, 0).unwrap().glyph_pos, 0);

        engine.paint_run(1, 4, "漢", TextStyle::default()).unwrap();
        engine.paint_run(1, 5, " ", TextStyle::default()).unwrap();
        assert_eq!(engine.cell(4, 1).unwrap().glyph_pos, 0);
        assert_eq!(engine.cell(5, 1).unwrap().glyph_pos, 0);
    }

    #[test]
    fn test_partial_drain_counts_rasterized_glyphs() {
        let (mut engine, _handle) = Engine::new(
            HeadlessBackend::default(),
            Box::new(FailingShaper("c")),
            Settings::default(),
        )
        .unwrap();
        engine.resize(Size::new(80, 48)).unwrap();
        engine.paint_run(0, 0, "abcd", TextStyle::default()).unwrap();

        assert!(matches!(engine.present(), Err(EngineError::Font(_))));
        assert_eq!(engine.stats().glyphs_rasterized, 2);
        assert_eq!(engine.queued_glyphs(), 2);
    }

    #[test]
    fn test_paint_clips_at_right_edge() {
        let mut engine = engine();
        let painted = engine.paint_run(0, 8, "abcd", TextStyle::default()).unwrap();
        assert_eq!(painted, 2);
        assert_eq!(engine.paint_run(5, 0, "a", TextStyle::default()).unwrap(), 0);
    }

    #[test]
    fn test_cursor_survives_repaint() {
        let mut engine = engine();
        engine.move_cursor(Some((1, 0)));
        engine.paint_run(0, 0, "abc", TextStyle::default()).unwrap();
        let flags = CellFlags::from_bits_truncate(engine.cell(1, 0).unwrap().flags);
        assert!(flags.contains(CellFlags::CURSOR));
        engine.move_cursor(None);
        let flags = CellFlags::from_bits_truncate(engine.cell(1, 0).unwrap().flags);
        assert!(!flags.contains(CellFlags::CURSOR));
    }

    #[test]
    fn test_selection_flags() {
        let mut engine = engine();
        engine.set_selection(2, Some(3..5));
        let selected: Vec<u32> = (0..10)
            .filter(|&c| engine.cell(c, 2).unwrap().flags & CellFlags::SELECTED.bits() != 0)
            .collect();
        assert_eq!(selected, vec![3, 4]);
        engine.set_selection(2, None);
        assert!(engine.cells().iter().all(|c| c.flags == 0));
    }

    #[test]
    fn test_resize_keeps_overlap() {
        let mut engine = engine();
        engine.paint_run(0, 0, "hello", TextStyle::default()).unwrap();
        let before = engine.cell(1, 0).unwrap().glyph_pos;
        engine.resize(Size::new(24, 16)).unwrap();
        assert_eq!(engine.grid_size(), Size::new(3, 1));
        assert_eq!(engine.cell(1, 0).unwrap().glyph_pos, before);
    }

    #[test]
    fn test_underline_flag_from_style() {
        let mut engine = engine();
        let style = TextStyle {
            underline: true,
            ..TextStyle::default()
        };
        engine.paint_run(0, 0, "_", style).unwrap();
        assert_eq!(engine.cell(0, 0).unwrap().flags, CellFlags::UNDERLINE.bits());
    }

    #[test]
    fn test_constants_follow_settings() {
        let mut engine = engine();
        engine.present().unwrap();
        let constants = *engine.backend().last_constants().unwrap();
        assert_eq!(constants.cell_count_x, 10);
        assert_eq!(constants.cell_size, [8, 16]);
        assert_eq!(constants.viewport, [0.0, 0.0, 80.0, 48.0]);
        assert_eq!(constants.underline_pos, [14, 15]);
        assert_eq!(constants.use_cleartype, 0);
    }
}
