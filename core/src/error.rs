//! Error type for every fallible operation in the core.
//!
//! Operators either return a fresh tensor or fail with one of these; nothing
//! is partially written on the error path.

/// (channels, height, width)
pub type Shape3 = (usize, usize, usize);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UNetError {
    #[error("{op}: expected shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Shape3,
        found: Shape3,
    },

    #[error("{op}: spatial dims differ, left {left:?} vs right {right:?}")]
    SpatialMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("{op}: height and width must be even, got {height}x{width}")]
    OddDimensions {
        op: &'static str,
        height: usize,
        width: usize,
    },

    #[error("tensor data holds {found} values but dims need {expected}")]
    ExtentMismatch { expected: usize, found: usize },

    #[error("{op}: input vector has length {found}, layer expects {expected}")]
    LengthMismatch {
        op: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("layer {name}: {reason}")]
    InvalidLayer { name: String, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("box-muller needs u1 in (0, 1], got {u1}")]
    InitializationSingularity { u1: f32 },
}

impl UNetError {
    /// True for every variant that reports a tensor or vector shape disagreement.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            UNetError::ShapeMismatch { .. }
                | UNetError::SpatialMismatch { .. }
                | UNetError::OddDimensions { .. }
                | UNetError::ExtentMismatch { .. }
                | UNetError::LengthMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UNetError>;
