//! Inference task for aortic segmentation with a pretrained 3D UNet.

use crate::config::{AortaConfig, TaskConfigSnapshot};
use crate::core::inference::{OrtModel, SlidingWindowInferer, WindowPredictor};
use crate::core::traits::{InferRequest, InferResult, InferTask};
use crate::core::{SegError, SegResult};
use crate::transforms::{
    Activations, AsDiscrete, CropForeground, EnsureChannelFirst, EnsureType, LoadVolume,
    Orientation, ScaleIntensityRange, Spacing, Transform,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{info, warn};

/// Inference task adapter for aortic segmentation.
///
/// Declares the fixed preprocessing and postprocessing sequences, the
/// sliding-window parameters, and how to materialize the serialized model.
/// The model handle is loaded once (eagerly with [`preload`], lazily on
/// the first request otherwise) and reused for the task's lifetime.
///
/// [`preload`]: AortaSegmentation::preload
pub struct AortaSegmentation {
    paths: Vec<PathBuf>,
    roi_size: [usize; 3],
    config: Arc<AortaConfig>,
    description: String,
    model: OnceLock<Arc<OrtModel>>,
}

impl std::fmt::Debug for AortaSegmentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AortaSegmentation")
            .field("paths", &self.paths)
            .field("roi_size", &self.roi_size)
            .field("model_loaded", &self.model.get().is_some())
            .finish()
    }
}

impl AortaSegmentation {
    /// Creates the task for a single model path.
    pub fn new(path: impl Into<PathBuf>, config: Arc<AortaConfig>) -> Self {
        Self::with_paths(vec![path.into()], config)
    }

    /// Creates the task for a list of model paths; the first is loaded.
    pub fn with_paths(paths: Vec<PathBuf>, config: Arc<AortaConfig>) -> Self {
        let roi_size = config.inference.roi_size;
        Self {
            paths,
            roi_size,
            config,
            description: "A 3D UNet model for aortic segmentation".to_string(),
            model: OnceLock::new(),
        }
    }

    /// Overrides the window size for this instance.
    pub fn with_roi_size(mut self, roi_size: [usize; 3]) -> Self {
        self.roi_size = roi_size;
        self
    }

    /// Loads the model eagerly instead of on the first request.
    pub fn preload(self) -> SegResult<Self> {
        self.load_model()?;
        Ok(self)
    }

    /// Read-only snapshot of the task's configuration, for introspection.
    pub fn get_config(&self) -> TaskConfigSnapshot {
        TaskConfigSnapshot {
            network: self.config.network.clone(),
            inference: self.config.inference,
            intensity_range: self.config.intensity_range,
            target_spacing: self.config.target_spacing,
            roi_size: self.roi_size,
        }
    }

    /// Materializes the model handle, loading it on first use.
    ///
    /// The serialized format is inspected at load time: a self-contained
    /// graph loads directly, bypassing the generic weight-loading path
    /// (which would need the network constructed separately). Without a
    /// configured path there is nothing to defer to, which surfaces as a
    /// configuration error.
    fn load_model(&self) -> SegResult<Arc<OrtModel>> {
        if let Some(model) = self.model.get() {
            return Ok(model.clone());
        }
        let path = self
            .paths
            .first()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| {
                SegError::config_error(
                    "no model path configured; the default weight-loading path is unavailable here",
                )
            })?;
        let model = Arc::new(OrtModel::load(path)?);
        Ok(self.model.get_or_init(|| model).clone())
    }
}

impl InferTask for AortaSegmentation {
    fn description(&self) -> &str {
        &self.description
    }

    fn labels(&self) -> &BTreeMap<u8, String> {
        &self.config.labels
    }

    /// Preprocessing sequence matching the training pipeline.
    fn pre_transforms(&self) -> Vec<Box<dyn Transform>> {
        let range = self.config.intensity_range;
        vec![
            Box::new(LoadVolume::new("image")),
            Box::new(EnsureChannelFirst::new("image")),
            Box::new(ScaleIntensityRange::new(
                "image", range.a_min, range.a_max, range.b_min, range.b_max, true,
            )),
            Box::new(CropForeground::new("image", "image")),
            Box::new(Orientation::ras("image")),
            Box::new(Spacing::new("image", self.config.target_spacing)),
            Box::new(EnsureType::new("image")),
        ]
    }

    fn inferer(&self) -> SegResult<SlidingWindowInferer> {
        SlidingWindowInferer::new(
            self.roi_size,
            self.config.inference.sw_batch_size,
            self.config.inference.overlap,
        )
    }

    /// Postprocessing sequence; the softmax must precede the arg-max.
    fn post_transforms(&self) -> Vec<Box<dyn Transform>> {
        vec![
            Box::new(EnsureType::new("pred")),
            Box::new(Activations::softmax("pred")),
            Box::new(AsDiscrete::argmax("pred")),
            Box::new(EnsureType::new("pred")),
        ]
    }

    fn predictor(&self) -> SegResult<Arc<dyn WindowPredictor>> {
        Ok(self.load_model()?)
    }

    fn path(&self) -> Option<&Path> {
        self.paths.first().map(PathBuf::as_path)
    }

    fn is_valid(&self) -> bool {
        if self.paths.is_empty() {
            warn!("no model path configured");
            return false;
        }
        for path in &self.paths {
            if path.as_os_str().is_empty() || !path.exists() {
                warn!(path = %path.display(), "model file not found or path is invalid");
                return false;
            }
        }
        true
    }

    fn run(&self, request: &InferRequest) -> SegResult<InferResult> {
        info!(image = %request.image.display(), "starting aortic segmentation inference");
        #[cfg(feature = "cuda")]
        {
            use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
            match CUDAExecutionProvider::default().is_available() {
                Ok(true) => info!(
                    "CUDA execution provider available; device memory is managed by the runtime"
                ),
                _ => info!("CUDA execution provider unavailable; falling back to CPU"),
            }
        }
        let started = Instant::now();
        let result = self.execute(request)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aortic segmentation inference completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<AortaConfig> {
        Arc::new(AortaConfig::default())
    }

    #[test]
    fn empty_path_is_invalid() {
        let task = AortaSegmentation::new("", config());
        assert!(!task.is_valid());
    }

    #[test]
    fn missing_file_is_invalid() {
        let task = AortaSegmentation::new("/nonexistent/model.onnx", config());
        assert!(!task.is_valid());
    }

    #[test]
    fn no_paths_is_invalid() {
        let task = AortaSegmentation::with_paths(Vec::new(), config());
        assert!(!task.is_valid());
    }

    #[test]
    fn existing_files_are_valid() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("model.onnx");
        let second = dir.path().join("fallback.onnx");
        std::fs::write(&first, b"graph").unwrap();
        std::fs::write(&second, b"graph").unwrap();

        let task = AortaSegmentation::with_paths(vec![first.clone(), second], config());
        assert!(task.is_valid());
        assert_eq!(task.path(), Some(first.as_path()));
    }

    #[test]
    fn one_missing_path_invalidates_the_whole_list() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("model.onnx");
        std::fs::write(&first, b"graph").unwrap();

        let task = AortaSegmentation::with_paths(
            vec![first, dir.path().join("missing.onnx")],
            config(),
        );
        assert!(!task.is_valid());
    }

    #[test]
    fn config_snapshot_reflects_instance_roi_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"graph").unwrap();

        let task = AortaSegmentation::new(path, config()).with_roi_size([96, 96, 96]);
        let snapshot = task.get_config();
        assert_eq!(snapshot.roi_size, [96, 96, 96]);
        assert!((snapshot.inference.overlap - 0.5).abs() < f32::EPSILON);
        assert_eq!(snapshot.network.out_channels, 24);
        assert_eq!(snapshot.target_spacing, [1.5, 1.5, 2.0]);
    }

    #[test]
    fn config_snapshot_is_independent_of_validity() {
        let task = AortaSegmentation::new("", config()).with_roi_size([64, 64, 32]);
        assert!(!task.is_valid());
        let value = serde_json::to_value(task.get_config()).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "network",
            "inference",
            "intensity_range",
            "target_spacing",
            "roi_size",
        ] {
            assert!(object.contains_key(key), "missing snapshot key {key}");
        }
    }

    #[test]
    fn transform_sequences_are_declared_in_order() {
        let task = AortaSegmentation::new("model.onnx", config());
        let pre: Vec<_> = task.pre_transforms().iter().map(|t| t.name()).collect();
        assert_eq!(
            pre,
            vec![
                "load_volume",
                "ensure_channel_first",
                "scale_intensity_range",
                "crop_foreground",
                "orientation",
                "spacing",
                "ensure_type",
            ]
        );

        let post: Vec<_> = task.post_transforms().iter().map(|t| t.name()).collect();
        assert_eq!(
            post,
            vec![
                "ensure_type",
                "activations_softmax",
                "as_discrete_argmax",
                "ensure_type",
            ]
        );
        assert!(task.inverse_transforms().is_empty());
    }

    #[test]
    fn inferer_carries_the_three_window_parameters() {
        let task = AortaSegmentation::new("model.onnx", config());
        let inferer = task.inferer().unwrap();
        assert_eq!(inferer.roi_size(), [96, 96, 96]);
        assert_eq!(inferer.sw_batch_size(), 1);
        assert!((inferer.overlap() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn unsupported_model_format_fails_at_load_not_construction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pt");
        std::fs::write(&path, b"torchscript").unwrap();

        let task = AortaSegmentation::new(&path, config());
        assert!(task.is_valid());
        let err = task.predictor().err().unwrap();
        assert!(err.to_string().contains("unsupported model format"));
    }

    #[test]
    fn missing_path_surfaces_as_config_error() {
        let task = AortaSegmentation::with_paths(Vec::new(), config());
        assert!(matches!(
            task.predictor().err().unwrap(),
            SegError::ConfigError { .. }
        ));
    }
}
