//! Transform error types

use std::fmt;

/// Errors that can occur while turning source bytes into a rendition
#[derive(Debug, Clone)]
pub enum TransformError {
    /// Source bytes are in a format the decoder does not handle
    UnsupportedFormat { format: String },
    /// Failed to decode image data
    DecodeFailed { message: String },
    /// Resize operation failed
    ResizeFailed { message: String },
    /// Encoding to output format failed
    EncodeFailed { format: String, message: String },
    /// The blocking worker running the transform died
    TaskFailed { message: String },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::UnsupportedFormat { format } => {
                write!(f, "Unsupported image format: {}", format)
            }
            TransformError::DecodeFailed { message } => {
                write!(f, "Failed to decode image: {}", message)
            }
            TransformError::ResizeFailed { message } => {
                write!(f, "Resize failed: {}", message)
            }
            TransformError::EncodeFailed { format, message } => {
                write!(f, "Failed to encode to {}: {}", format, message)
            }
            TransformError::TaskFailed { message } => {
                write!(f, "Transform task failed: {}", message)
            }
        }
    }
}

impl std::error::Error for TransformError {}

impl TransformError {
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        TransformError::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<String>) -> Self {
        TransformError::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn resize_failed(message: impl Into<String>) -> Self {
        TransformError::ResizeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(format: impl Into<String>, message: impl Into<String>) -> Self {
        TransformError::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn task_failed(message: impl Into<String>) -> Self {
        TransformError::TaskFailed {
            message: message.into(),
        }
    }
}
