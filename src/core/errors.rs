//! Error types for the segmentation pipeline.
//!
//! This module defines the error types that can occur while serving a
//! segmentation request, including volume I/O errors, transform errors,
//! model loading errors, and inference errors, together with helper
//! constructors that attach context to the underlying error.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Enum representing different stages of processing in the segmentation pipeline.
///
/// This enum is used to identify which stage of the pipeline an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Error occurred during intensity windowing.
    IntensityScaling,
    /// Error occurred during foreground cropping.
    Cropping,
    /// Error occurred during anatomical reorientation.
    Reorientation,
    /// Error occurred during spacing resampling.
    Resampling,
    /// Error occurred during sliding-window blending.
    Blending,
    /// Error occurred during post-processing.
    PostProcessing,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::IntensityScaling => write!(f, "intensity scaling"),
            ProcessingStage::Cropping => write!(f, "cropping"),
            ProcessingStage::Reorientation => write!(f, "reorientation"),
            ProcessingStage::Resampling => write!(f, "resampling"),
            ProcessingStage::Blending => write!(f, "blending"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// Enum representing the errors that can occur in the segmentation pipeline.
#[derive(Error, Debug)]
pub enum SegError {
    /// Error occurred while reading a volume from disk.
    #[error("failed to load volume from '{path}'")]
    VolumeLoad {
        /// Path of the volume that failed to load.
        path: PathBuf,
        /// The underlying NIfTI error.
        #[source]
        source: nifti::NiftiError,
    },

    /// Error occurred while writing a label volume to disk.
    #[error("failed to write label volume to '{path}'")]
    VolumeWrite {
        /// Destination path of the write.
        path: PathBuf,
        /// The underlying NIfTI error.
        #[source]
        source: nifti::NiftiError,
    },

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred while materializing the model.
    #[error("failed to load model from '{path}': {message}")]
    ModelLoad {
        /// Path of the serialized model.
        path: PathBuf,
        /// A message describing the failure.
        message: String,
        /// The underlying ONNX Runtime error, if any.
        #[source]
        source: Option<ort::Error>,
    },

    /// Error occurred during inference.
    #[error("inference failed: {context}")]
    Inference {
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor shape operations.
    #[error("tensor shape")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Convenient result alias for segmentation operations.
pub type SegResult<T> = Result<T, SegError>;

impl SegError {
    /// Creates a processing error for the given stage with context.
    pub fn processing(
        kind: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SegError::Processing {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates an invalid-input error with the given message.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        SegError::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error with the given message.
    pub fn config_error(message: impl Into<String>) -> Self {
        SegError::ConfigError {
            message: message.into(),
        }
    }

    /// Creates an inference error with context and an underlying cause.
    pub fn inference(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SegError::Inference {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates a model-load error for the given path.
    pub fn model_load(
        path: impl AsRef<Path>,
        message: impl Into<String>,
        source: Option<ort::Error>,
    ) -> Self {
        SegError::ModelLoad {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_error_reports_stage_and_context() {
        let err = SegError::processing(
            ProcessingStage::Resampling,
            "output shape would be empty",
            std::io::Error::new(std::io::ErrorKind::InvalidData, "bad shape"),
        );
        let message = err.to_string();
        assert!(message.contains("resampling"));
        assert!(message.contains("output shape would be empty"));
    }

    #[test]
    fn model_load_error_names_path() {
        let err = SegError::model_load("/models/model.onnx", "unsupported format", None);
        assert!(err.to_string().contains("/models/model.onnx"));
    }
}
