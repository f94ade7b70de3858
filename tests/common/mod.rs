//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cellatlas::config::DEFAULT_DPI;
use cellatlas::rasterizer::{DrawOptions, GlyphLayout, LayoutRequest, TextShaper};
use cellatlas::scratchpad::{MaskFormat, Scratchpad};
use cellatlas::{Engine, EngineHandle, HeadlessBackend, Result, Settings, Size};

/// Coverage a `BlockShaper` glyph is filled with, derived from its first char
pub fn block_value(text: &str) -> u8 {
    let first = text.chars().next().map_or(0, |c| c as u32);
    (first % 200 + 40) as u8
}

/// Everything the shaper saw, in call order
#[derive(Debug, Default)]
pub struct ShaperLog {
    pub layouts: Vec<String>,
    pub draws: Vec<DrawOptions>,
}

/// Deterministic shaper: every glyph is a solid block covering all of its
/// cells with `block_value(text)`.
#[derive(Clone, Default)]
pub struct BlockShaper {
    pub log: Arc<Mutex<ShaperLog>>,
}

impl BlockShaper {
    pub fn layouts(&self) -> usize {
        self.log.lock().unwrap().layouts.len()
    }

    pub fn draws(&self) -> Vec<DrawOptions> {
        self.log.lock().unwrap().draws.clone()
    }
}

struct BlockLayout {
    value: u8,
    width_px: usize,
    height_px: usize,
    size_dip: (f32, f32),
    log: Arc<Mutex<ShaperLog>>,
}

impl TextShaper for BlockShaper {
    fn layout(&self, request: &LayoutRequest<'_>) -> Result<Box<dyn GlyphLayout>> {
        self.log
            .lock()
            .unwrap()
            .layouts
            .push(request.key.text.clone());
        let scale = request.dpi as f32 / DEFAULT_DPI as f32;
        Ok(Box::new(BlockLayout {
            value: block_value(&request.key.text),
            width_px: (request.width_dip * scale).round() as usize,
            height_px: (request.height_dip * scale).round() as usize,
            size_dip: (request.width_dip, request.height_dip),
            log: Arc::clone(&self.log),
        }))
    }
}

impl GlyphLayout for BlockLayout {
    fn size_dip(&self) -> (f32, f32) {
        self.size_dip
    }

    fn draw(&self, scratchpad: &mut Scratchpad, options: DrawOptions) -> Result<()> {
        self.log.lock().unwrap().draws.push(options);
        let coverage = vec![self.value; self.width_px * self.height_px];
        scratchpad.blend_mask(
            0,
            0,
            self.width_px,
            self.height_px,
            &coverage,
            MaskFormat::Alpha,
        )
    }
}

pub struct Fixture {
    pub engine: Engine<HeadlessBackend>,
    pub handle: EngineHandle,
    pub shaper: BlockShaper,
}

/// Engine over a headless backend with a `columns` x `rows` grid of 8x16 cells.
pub fn fixture_with(settings: Settings, columns: u32, rows: u32) -> Fixture {
    let shaper = BlockShaper::default();
    let cell = settings.cell_size;
    let (mut engine, handle) =
        Engine::new(HeadlessBackend::default(), Box::new(shaper.clone()), settings)
            .expect("engine");
    engine
        .resize(Size::new(cell.width * columns, cell.height * rows))
        .expect("resize");
    Fixture {
        engine,
        handle,
        shaper,
    }
}

pub fn fixture(columns: u32, rows: u32) -> Fixture {
    fixture_with(Settings::default(), columns, rows)
}
