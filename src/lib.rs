//! cellatlas - glyph atlas cache and frame-present pipeline for GPU
//! character grids
//!
//! A producer thread describes what the grid should show through an
//! [`EngineHandle`]; a presenter thread owns the [`Engine`] and turns that
//! intent into frames: glyphs are rasterized once into a growable atlas and
//! every frame is a single fullscreen draw over a dense cell buffer.

pub mod atlas;
pub mod backend;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod glyph;
pub mod handle;
pub mod invalidation;
pub mod rasterizer;
pub mod scratchpad;

pub use backend::{HeadlessBackend, RenderBackend};
#[cfg(feature = "gui")]
pub use backend::WgpuBackend;
pub use config::{AntialiasMode, CursorOptions, CursorType, Settings};
pub use engine::{Engine, FrameStats, TextRun, TextStyle};
pub use error::{EngineError, Result};
pub use geometry::{Size, TileCoord};
pub use handle::{EngineHandle, Intent};
pub use invalidation::Invalidations;
pub use rasterizer::{FontRasterizer, TextShaper};
