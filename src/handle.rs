//! Producer side of the engine
//!
//! The producer never touches presenter state. It hands whole `Intent`
//! values over a channel and raises invalidation bits; the presenter picks
//! both up once at the start of the next frame.

use std::ops::Range;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::config::Settings;
use crate::engine::TextRun;
use crate::error::{EngineError, Result};
use crate::geometry::Size;
use crate::invalidation::{Invalidations, SharedInvalidations};

/// A unit of rendering intent handed from the producer to the presenter
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    UpdateSettings(Box<Settings>),
    /// New viewport size in pixels
    Resize(Size),
    /// Cursor cell as (column, row); `None` hides the cursor
    MoveCursor(Option<(u32, u32)>),
    PaintRow { row: u32, runs: Vec<TextRun> },
    /// Selected columns of a row; `None` clears the row's selection
    SetSelection { row: u32, columns: Option<Range<u32>> },
}

#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: Sender<Intent>,
    invalidations: Arc<SharedInvalidations>,
}

impl EngineHandle {
    pub(crate) fn new(sender: Sender<Intent>, invalidations: Arc<SharedInvalidations>) -> Self {
        Self {
            sender,
            invalidations,
        }
    }

    /// Validate and hand over a complete settings record.
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.send(Intent::UpdateSettings(Box::new(settings)))
    }

    pub fn resize(&self, viewport: Size) -> Result<()> {
        self.send(Intent::Resize(viewport))
    }

    pub fn move_cursor(&self, position: Option<(u32, u32)>) -> Result<()> {
        self.send(Intent::MoveCursor(position))
    }

    pub fn paint_row(&self, row: u32, runs: Vec<TextRun>) -> Result<()> {
        self.send(Intent::PaintRow { row, runs })
    }

    pub fn set_selection(&self, row: u32, columns: Option<Range<u32>>) -> Result<()> {
        self.send(Intent::SetSelection { row, columns })
    }

    /// Mark derived resources stale without sending an intent.
    pub fn invalidate(&self, flags: Invalidations) {
        self.invalidations.raise(flags);
    }

    fn send(&self, intent: Intent) -> Result<()> {
        self.sender
            .send(intent)
            .map_err(|_| EngineError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn handle() -> (EngineHandle, mpsc::Receiver<Intent>, Arc<SharedInvalidations>) {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(SharedInvalidations::default());
        (EngineHandle::new(sender, Arc::clone(&shared)), receiver, shared)
    }

    #[test]
    fn test_intents_arrive_in_order() {
        let (handle, receiver, _) = handle();
        handle.resize(Size::new(80, 32)).unwrap();
        handle.move_cursor(Some((1, 0))).unwrap();
        let received: Vec<_> = receiver.try_iter().collect();
        assert_eq!(
            received,
            vec![
                Intent::Resize(Size::new(80, 32)),
                Intent::MoveCursor(Some((1, 0)))
            ]
        );
    }

    #[test]
    fn test_invalid_settings_are_not_sent() {
        let (handle, receiver, _) = handle();
        let settings = Settings {
            dpi: 0,
            ..Settings::default()
        };
        assert!(handle.update_settings(settings).is_err());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_send_after_engine_dropped() {
        let (handle, receiver, _) = handle();
        drop(receiver);
        assert!(matches!(
            handle.resize(Size::new(1, 1)),
            Err(EngineError::Disconnected)
        ));
    }

    #[test]
    fn test_invalidate_raises_shared_bits() {
        let (handle, _receiver, shared) = handle();
        handle.clone().invalidate(Invalidations::CURSOR);
        assert_eq!(shared.take(), Invalidations::CURSOR);
    }
}
