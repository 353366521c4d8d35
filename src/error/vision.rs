// Frame processing error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Vision error code constants shared with the coordinating layer
///
/// Error code range: 2001-2003
pub struct VisionErrorCodes {}

impl VisionErrorCodes {
    /// The supplied luminance plane is smaller than its declared geometry
    pub const PLANE_TOO_SMALL: i32 = 2001;

    /// Frame dimensions are invalid (zero width or height)
    pub const INVALID_DIMENSIONS: i32 = 2002;

    /// Mutex was poisoned
    pub const LOCK_POISONED: i32 = 2003;
}

/// Log a vision error with structured context
pub fn log_vision_error(err: &VisionError, context: &str) {
    error!(
        "Vision error in {}: code={}, component=FrameDiffer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Frame-processing errors
///
/// These are transient per-frame failures: the frame is skipped and the
/// pipeline continues on the next callback.
///
/// Error code range: 2001-2003
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionError {
    /// The plane buffer is shorter than width/height/stride imply
    PlaneTooSmall { expected: usize, actual: usize },

    /// Frame dimensions are invalid (zero width or height)
    InvalidDimensions { width: usize, height: usize },

    /// Mutex was poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for VisionError {
    fn code(&self) -> i32 {
        match self {
            VisionError::PlaneTooSmall { .. } => VisionErrorCodes::PLANE_TOO_SMALL,
            VisionError::InvalidDimensions { .. } => VisionErrorCodes::INVALID_DIMENSIONS,
            VisionError::LockPoisoned { .. } => VisionErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            VisionError::PlaneTooSmall { expected, actual } => {
                format!(
                    "Luminance plane too small: need {} bytes, got {}",
                    expected, actual
                )
            }
            VisionError::InvalidDimensions { width, height } => {
                format!("Invalid frame dimensions: {}x{}", width, height)
            }
            VisionError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for VisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VisionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for VisionError {}
