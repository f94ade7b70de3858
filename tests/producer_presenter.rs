//! Producer/presenter contract tests
//!
//! The producer only talks through `EngineHandle`; the presenter sees its
//! intents at the start of the next frame.

mod common;

use std::thread;

use cellatlas::glyph::CellFlags;
use cellatlas::{CursorType, EngineError, Invalidations, Settings, Size, TextRun, TextStyle};

use common::fixture;

fn run(column: u32, text: &str) -> TextRun {
    TextRun::new(column, text, TextStyle::default())
}

// =============================================================================
// HANDOFF
// =============================================================================

#[test]
fn intents_apply_at_the_next_frame() {
    let mut f = fixture(4, 2);
    f.handle.resize(Size::new(80, 48)).unwrap();
    f.handle.paint_row(2, vec![run(0, "hi")]).unwrap();
    f.handle.move_cursor(Some((2, 2))).unwrap();

    assert_eq!(f.engine.grid_size(), Size::new(4, 2), "nothing applied yet");
    f.engine.present().unwrap();

    assert_eq!(f.engine.grid_size(), Size::new(10, 3));
    assert_eq!(f.engine.backend().surface_size(), Size::new(80, 48));
    assert_ne!(f.engine.cell(0, 2).unwrap().glyph_pos, 0);
    assert_eq!(f.engine.cursor(), Some((2, 2)));
    let cursor = f.engine.cell(2, 2).unwrap();
    assert_ne!(cursor.flags & CellFlags::CURSOR.bits(), 0);
    assert_eq!(f.engine.backend().last_cells().len(), 30);
}

#[test]
fn selection_intent_marks_cells() {
    let mut f = fixture(10, 2);
    f.handle.set_selection(1, Some(2..6)).unwrap();
    f.engine.present().unwrap();

    let selected = f
        .engine
        .backend()
        .last_cells()
        .iter()
        .filter(|c| c.flags & CellFlags::SELECTED.bits() != 0)
        .count();
    assert_eq!(selected, 4);
}

#[test]
fn raised_invalidation_is_refreshed_once() {
    let mut f = fixture(10, 2);
    f.engine.present().unwrap();
    assert_eq!(f.engine.stats().cursor_redraws, 1);

    f.handle.invalidate(Invalidations::CURSOR);
    f.engine.present().unwrap();
    assert_eq!(f.engine.stats().cursor_redraws, 2);
    assert!(f.engine.invalidations().is_empty());

    f.engine.present().unwrap();
    assert_eq!(f.engine.stats().cursor_redraws, 2);
}

#[test]
fn cursor_settings_redraw_the_cursor_tile() {
    let mut f = fixture(10, 2);
    f.engine.present().unwrap();
    let atlas = f.engine.atlas().texture().unwrap();
    assert_eq!(atlas.pixel(4, 8)[3], 0xFF, "block cursor fills the cell");

    let mut settings = Settings::default();
    settings.cursor.cursor_type = CursorType::EmptyBox;
    f.handle.update_settings(settings).unwrap();
    f.engine.present().unwrap();

    let atlas = f.engine.atlas().texture().unwrap();
    assert!(atlas.pixel(4, 0)[3] > 0x80, "box outline");
    assert_eq!(atlas.pixel(4, 8)[3], 0, "box interior");
}

#[test]
fn invalid_settings_never_reach_the_presenter() {
    let f = fixture(10, 2);
    let settings = Settings {
        atlas_size_limit: Size::new(0, 0),
        ..Settings::default()
    };
    assert!(matches!(
        f.handle.update_settings(settings),
        Err(EngineError::InvalidSettings(_))
    ));
}

// =============================================================================
// THREADS
// =============================================================================

#[test_log::test]
fn producer_thread_and_presenter_thread() {
    let common::Fixture {
        mut engine, handle, ..
    } = fixture(20, 50);

    let producer = thread::spawn(move || {
        for row in 0..50u32 {
            handle
                .paint_row(row, vec![run(0, &format!("row {row}"))])
                .unwrap();
            if row % 10 == 0 {
                handle.invalidate(Invalidations::CONST_BUFFER);
            }
        }
        handle.move_cursor(Some((0, 49))).unwrap();
    });

    while engine.handles_connected() {
        engine.present().expect("present");
    }
    producer.join().unwrap();
    engine.present().unwrap();

    assert!(!engine.handles_connected());
    assert_eq!(engine.queued_glyphs(), 0);
    for row in 0..50 {
        assert_ne!(
            engine.cell(0, row).unwrap().glyph_pos,
            0,
            "row {row} was never painted"
        );
    }
    assert_eq!(engine.cursor(), Some((0, 49)));
    assert_eq!(engine.stats().frames_abandoned, 0);
}

#[test]
fn handle_reports_dropped_engine() {
    let f = fixture(10, 2);
    let handle = f.handle.clone();
    drop(f);
    assert!(matches!(
        handle.move_cursor(None),
        Err(EngineError::Disconnected)
    ));
}
