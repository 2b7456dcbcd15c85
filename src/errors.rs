// SPDX-License-Identifier: GPL-3.0-only

//! Error types for recording and capture

use crate::backends::camera::types::MediaType;
use crate::pipelines::video::WriterState;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for recording session operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Result type alias for capture source operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Top-level error type used by the command line front end
#[derive(Debug, Clone)]
pub enum AppError {
    /// Recording session errors
    Recording(RecordingError),
    /// Capture source errors
    Capture(CaptureError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// GPU device errors
    Gpu(String),
    /// Generic error with message
    Other(String),
}

/// Errors surfaced by a recording session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// Operation is not valid for the current lifecycle state
    WrongState {
        operation: &'static str,
        state: WriterState,
    },
    /// The underlying writer or device reported an error
    SystemFailure(String),
    /// Copying a frame texture into a pixel buffer failed
    ConversionFailure(String),
    /// No pixel buffer could be obtained from the pool
    PoolExhausted,
    /// The session was released while the operation was in flight
    CallerDestroyed,
}

/// Errors surfaced while configuring capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Access to the medium was not granted
    PermissionDenied(MediaType),
    /// No usable device exists for the medium
    DeviceUnavailable(MediaType),
    /// Platform pipeline error
    Backend(String),
    /// The capture source was released while the operation was in flight
    CallerDestroyed,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Recording(e) => write!(f, "Recording error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Gpu(msg) => write!(f, "GPU error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::WrongState { operation, state } => {
                write!(f, "Cannot {} while session is {}", operation, state)
            }
            RecordingError::SystemFailure(msg) => write!(f, "System failure: {}", msg),
            RecordingError::ConversionFailure(msg) => write!(f, "Frame conversion failed: {}", msg),
            RecordingError::PoolExhausted => write!(f, "Pixel buffer pool exhausted"),
            RecordingError::CallerDestroyed => {
                write!(f, "Recording session was released before completion")
            }
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::PermissionDenied(media) => write!(f, "Permission denied for {}", media),
            CaptureError::DeviceUnavailable(media) => write!(f, "No {} device available", media),
            CaptureError::Backend(msg) => write!(f, "Backend error: {}", msg),
            CaptureError::CallerDestroyed => {
                write!(f, "Capture source was released before completion")
            }
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for RecordingError {}
impl std::error::Error for CaptureError {}

impl From<RecordingError> for AppError {
    fn from(err: RecordingError) -> Self {
        AppError::Recording(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<gstreamer::glib::Error> for RecordingError {
    fn from(err: gstreamer::glib::Error) -> Self {
        RecordingError::SystemFailure(err.to_string())
    }
}

impl From<gstreamer::glib::BoolError> for RecordingError {
    fn from(err: gstreamer::glib::BoolError) -> Self {
        RecordingError::SystemFailure(err.to_string())
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(err: std::io::Error) -> Self {
        RecordingError::SystemFailure(err.to_string())
    }
}

impl From<gstreamer::glib::BoolError> for CaptureError {
    fn from(err: gstreamer::glib::BoolError) -> Self {
        CaptureError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_state_names_operation_and_state() {
        let err = RecordingError::WrongState {
            operation: "finish",
            state: WriterState::Idle,
        };
        assert_eq!(err.to_string(), "Cannot finish while session is idle");
    }

    #[test]
    fn capture_errors_wrap_into_app_error() {
        let err: AppError = CaptureError::PermissionDenied(MediaType::Audio).into();
        assert_eq!(err.to_string(), "Capture error: Permission denied for audio");
    }
}
