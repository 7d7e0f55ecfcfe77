//! ONNX Runtime sessions and the model-loading strategy.

use crate::core::errors::{SegError, SegResult};
use crate::core::inference::WindowPredictor;
use ndarray::{Array5, ArrayView5};
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

const SESSION_CREATION_FAILURE: &str = "failed to create ONNX session";

/// Serialized model formats the loader recognizes.
///
/// The loading strategy is selected by inspecting the path: a
/// self-contained serialized graph loads directly into a session, anything
/// else falls through to the default loading path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// A self-contained serialized graph (`.onnx` / `.ort`), loadable
    /// without separately constructing the network.
    SelfContainedGraph,
    /// A format the direct loader does not handle (e.g. a bare weight
    /// dictionary).
    Unknown,
}

impl ModelFormat {
    /// Detects the format from the file extension.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("onnx") || ext.eq_ignore_ascii_case("ort") => {
                ModelFormat::SelfContainedGraph
            }
            _ => ModelFormat::Unknown,
        }
    }
}

/// Loads a session with default logging configuration.
///
/// With the `cuda` feature the CUDA execution provider is registered first;
/// ONNX Runtime falls back to CPU when no device is available.
pub fn load_session(model_path: impl AsRef<Path>) -> SegResult<Session> {
    let path = model_path.as_ref();
    let builder = Session::builder()?;
    let builder = builder.with_log_level(LogLevel::Error)?;
    #[cfg(feature = "cuda")]
    let builder = builder.with_execution_providers([
        ort::execution_providers::CUDAExecutionProvider::default().build(),
    ])?;
    builder
        .commit_from_file(path)
        .map_err(|e| SegError::model_load(path, SESSION_CREATION_FAILURE, Some(e)))
}

/// A loaded, pre-trained network bound to a file path.
///
/// Load-once and reused across requests; the session is serialized behind
/// a mutex, concurrent request scheduling is the hosting framework's
/// concern.
pub struct OrtModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    model_path: PathBuf,
}

impl std::fmt::Debug for OrtModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtModel")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("model_path", &self.model_path)
            .finish()
    }
}

impl OrtModel {
    /// Loads a model using the format-inspecting strategy.
    ///
    /// Only self-contained graphs load directly; other formats would need
    /// the generic weight-loading path, which requires constructing the
    /// network separately and is not available here.
    pub fn load(path: &Path) -> SegResult<Self> {
        match ModelFormat::detect(path) {
            ModelFormat::SelfContainedGraph => Self::from_file(path),
            ModelFormat::Unknown => Err(SegError::model_load(
                path,
                "unsupported model format; expected a self-contained .onnx graph",
                None,
            )),
        }
    }

    /// Loads a self-contained serialized graph into a session.
    pub fn from_file(path: &Path) -> SegResult<Self> {
        info!(path = %path.display(), "loading serialized model");
        let session = load_session(path)?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| SegError::model_load(path, "model declares no inputs", None))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| SegError::model_load(path, "model declares no outputs", None))?;
        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            model_path: path.to_path_buf(),
        })
    }

    /// Returns the path the model was loaded from.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Runs the network over a `(N, C, X, Y, Z)` batch of windows.
    pub fn infer_5d(&self, x: &Array5<f32>) -> SegResult<Array5<f32>> {
        let input_shape = x.shape().to_vec();
        let input_tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
            SegError::inference(
                format!("failed to convert input tensor with shape {input_shape:?}"),
                e,
            )
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let mut session = self.session.lock().map_err(|_| {
            SegError::invalid_input("model session lock poisoned by a previous panic")
        })?;
        let outputs = session.run(inputs).map_err(|e| {
            SegError::inference(
                format!(
                    "forward pass failed for input '{}' with shape {input_shape:?}",
                    self.input_name
                ),
                e,
            )
        })?;

        let (output_shape, output_data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                SegError::inference(
                    format!("failed to extract output tensor '{}' as f32", self.output_name),
                    e,
                )
            })?;
        if output_shape.len() != 5 {
            return Err(SegError::invalid_input(format!(
                "expected a 5D output tensor, got {}D with shape {:?}",
                output_shape.len(),
                output_shape
            )));
        }

        let dims = (
            output_shape[0] as usize,
            output_shape[1] as usize,
            output_shape[2] as usize,
            output_shape[3] as usize,
            output_shape[4] as usize,
        );
        let expected_len = dims.0 * dims.1 * dims.2 * dims.3 * dims.4;
        if output_data.len() != expected_len {
            return Err(SegError::invalid_input(format!(
                "output data size mismatch: expected {expected_len}, got {}",
                output_data.len()
            )));
        }
        let view = ArrayView5::from_shape(dims, output_data).map_err(SegError::Tensor)?;
        Ok(view.to_owned())
    }
}

impl WindowPredictor for OrtModel {
    fn predict(&self, windows: &Array5<f32>) -> SegResult<Array5<f32>> {
        self.infer_5d(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_self_contained_graphs_by_extension() {
        assert_eq!(
            ModelFormat::detect(Path::new("/models/model.onnx")),
            ModelFormat::SelfContainedGraph
        );
        assert_eq!(
            ModelFormat::detect(Path::new("/models/MODEL.ONNX")),
            ModelFormat::SelfContainedGraph
        );
        assert_eq!(
            ModelFormat::detect(Path::new("/models/model.ort")),
            ModelFormat::SelfContainedGraph
        );
    }

    #[test]
    fn other_formats_are_unknown() {
        assert_eq!(
            ModelFormat::detect(Path::new("/models/model.pt")),
            ModelFormat::Unknown
        );
        assert_eq!(
            ModelFormat::detect(Path::new("/models/weights")),
            ModelFormat::Unknown
        );
    }

    #[test]
    fn unknown_format_is_rejected_before_touching_the_runtime() {
        let err = OrtModel::load(Path::new("/models/model.pt")).unwrap_err();
        assert!(err.to_string().contains("unsupported model format"));
    }
}
