//! Error taxonomy for the present pipeline
//!
//! Every stage of a frame returns `Result<_, EngineError>`. Nothing here is
//! retried internally: `Engine::present` is the single boundary where an
//! error abandons the frame and is handed back to the frame scheduler.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A texture, surface or buffer could not be allocated.
    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },

    /// The bump allocator reached the configured atlas limit.
    #[error("glyph atlas is full ({width}x{height} px limit)")]
    AtlasFull { width: u32, height: u32 },

    /// Command recording, execution or presentation failed.
    #[error("gpu call failed: {0}")]
    Gpu(String),

    #[cfg(feature = "gui")]
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("font error: {0}")]
    Font(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The engine behind a producer handle is gone.
    #[error("engine handle disconnected")]
    Disconnected,
}

impl EngineError {
    /// Stable numeric code for callers that speak error codes.
    pub fn code(&self) -> i32 {
        match self {
            EngineError::ResourceCreation { .. } => 1,
            EngineError::AtlasFull { .. } => 2,
            EngineError::Gpu(_) => 3,
            #[cfg(feature = "gui")]
            EngineError::Surface(_) => 4,
            EngineError::Font(_) => 5,
            EngineError::InvalidSettings(_) => 6,
            EngineError::Disconnected => 7,
        }
    }

    /// Whether the surface should be reconfigured before the next frame.
    pub fn is_surface_lost(&self) -> bool {
        #[cfg(feature = "gui")]
        if let EngineError::Surface(e) = self {
            return matches!(e, wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated);
        }
        false
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            EngineError::ResourceCreation {
                what: "atlas",
                reason: "oom".into(),
            },
            EngineError::AtlasFull {
                width: 16,
                height: 16,
            },
            EngineError::Gpu("lost".into()),
            EngineError::Font("bad".into()),
            EngineError::InvalidSettings("zero".into()),
            EngineError::Disconnected,
        ];
        let mut codes: Vec<i32> = errors.iter().map(EngineError::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_display() {
        let e = EngineError::AtlasFull {
            width: 4096,
            height: 4096,
        };
        assert_eq!(e.to_string(), "glyph atlas is full (4096x4096 px limit)");
        assert!(!e.is_surface_lost());
    }
}
