//! Plugin capability traits consumed by the hosting framework.
//!
//! The hosting label-annotation server depends only on these interfaces,
//! not on concrete task types: an inference task declares its transform
//! sequences and inference strategy, and the provided [`InferTask::execute`]
//! machinery runs them in order. Tasks override [`InferTask::run`] when
//! they want extra diagnostics around the shared execution path.

use crate::core::errors::{ProcessingStage, SegError, SegResult};
use crate::core::inference::{SlidingWindowInferer, WindowPredictor};
use crate::transforms::{io::write_label, Compose, DataMap, Item, Transform};
use ndarray::{ArrayD, Ix4};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A segmentation request dispatched by the hosting framework.
///
/// Carries a reference to one input volume and an optional output
/// destination; storage beyond that single write belongs to the external
/// datastore.
#[derive(Debug, Clone)]
pub struct InferRequest {
    /// Path of the input volume.
    pub image: PathBuf,
    /// Optional path to write the label volume to.
    pub output: Option<PathBuf>,
}

impl InferRequest {
    /// Creates a request for the given input volume.
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            output: None,
        }
    }

    /// Sets the output destination.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// The label volume produced for one request.
#[derive(Debug, Clone)]
pub struct InferResult {
    /// One integer class per voxel, channel dimension dropped.
    pub label: ArrayD<i64>,
    /// Label index to anatomical region name.
    pub label_names: BTreeMap<u8, String>,
}

/// Capability contract for an inference task.
pub trait InferTask: Send + Sync {
    /// Human-readable description of the task.
    fn description(&self) -> &str;

    /// Label index to anatomical region name.
    fn labels(&self) -> &BTreeMap<u8, String>;

    /// Ordered preprocessing steps, raw volume to network input.
    fn pre_transforms(&self) -> Vec<Box<dyn Transform>>;

    /// The windowed inference strategy for this task.
    fn inferer(&self) -> SegResult<SlidingWindowInferer>;

    /// Ordered steps undoing spatial preprocessing on the prediction.
    fn inverse_transforms(&self) -> Vec<Box<dyn Transform>> {
        Vec::new()
    }

    /// Ordered postprocessing steps, network output to label volume.
    fn post_transforms(&self) -> Vec<Box<dyn Transform>>;

    /// Materializes the trained model (load-once, reused across requests).
    fn predictor(&self) -> SegResult<Arc<dyn WindowPredictor>>;

    /// The configured model path, if any.
    fn path(&self) -> Option<&Path>;

    /// Whether the task can serve requests: every configured path must be
    /// non-empty and exist on the filesystem at check time.
    fn is_valid(&self) -> bool;

    /// Serves one request. Defaults to the shared execution machinery;
    /// override to add diagnostics around it.
    fn run(&self, request: &InferRequest) -> SegResult<InferResult> {
        self.execute(request)
    }

    /// Shared execution machinery: compose the preprocessing sequence,
    /// run windowed inference, compose the inverse and postprocessing
    /// sequences, and package the label volume. Errors propagate
    /// unchanged from whichever stage raised them.
    fn execute(&self, request: &InferRequest) -> SegResult<InferResult> {
        let mut data = DataMap::new();
        data.insert("image", Item::Path(request.image.clone()));
        Compose::new(self.pre_transforms()).apply(&mut data)?;

        let volume = data.volume("image")?;
        let image = volume
            .data
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| {
                SegError::processing(
                    ProcessingStage::TensorOperation,
                    "preprocessed volume is not channel-first",
                    e,
                )
            })?
            .to_owned();

        let predictor = self.predictor()?;
        let prediction = self.inferer()?.infer(&image, predictor.as_ref())?;
        data.insert("pred", Item::Tensor(prediction.into_dyn()));

        Compose::new(self.inverse_transforms()).apply(&mut data)?;
        Compose::new(self.post_transforms()).apply(&mut data)?;

        let label = match data.remove("pred") {
            Some(Item::Discrete(label)) => label,
            Some(_) => {
                return Err(SegError::invalid_input(
                    "postprocessing did not produce a discrete label volume",
                ))
            }
            None => return Err(SegError::invalid_input("prediction key vanished")),
        };

        if let Some(output) = &request.output {
            write_label(output, &label)?;
        }

        Ok(InferResult {
            label,
            label_names: self.labels().clone(),
        })
    }
}

/// Capability contract for a training task. This plugin registers none;
/// the trait exists so the bootstrap can expose an (empty) trainer map
/// with a concrete type.
pub trait TrainTask: Send + Sync {
    /// Name of the training task.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::io::read_volume;
    use crate::transforms::{
        Activations, AsDiscrete, EnsureChannelFirst, EnsureType, LoadVolume,
    };
    use ndarray::{Array3, Array5, Axis};

    /// Emits logits favouring one fixed class at every voxel.
    struct FixedClassPredictor {
        classes: usize,
        favoured: usize,
    }

    impl WindowPredictor for FixedClassPredictor {
        fn predict(&self, windows: &Array5<f32>) -> SegResult<Array5<f32>> {
            let (n, _, a, b, c) = windows.dim();
            let mut logits = Array5::from_elem((n, self.classes, a, b, c), -1.0);
            logits.index_axis_mut(Axis(1), self.favoured).fill(3.0);
            Ok(logits)
        }
    }

    struct SyntheticTask {
        labels: BTreeMap<u8, String>,
        predictor: Arc<FixedClassPredictor>,
    }

    impl SyntheticTask {
        fn new(classes: usize, favoured: usize) -> Self {
            Self {
                labels: (0..classes)
                    .map(|i| (i as u8, format!("region_{i}")))
                    .collect(),
                predictor: Arc::new(FixedClassPredictor { classes, favoured }),
            }
        }
    }

    impl InferTask for SyntheticTask {
        fn description(&self) -> &str {
            "synthetic fixed-class task"
        }

        fn labels(&self) -> &BTreeMap<u8, String> {
            &self.labels
        }

        fn pre_transforms(&self) -> Vec<Box<dyn Transform>> {
            vec![
                Box::new(LoadVolume::new("image")) as Box<dyn Transform>,
                Box::new(EnsureChannelFirst::new("image")),
                Box::new(EnsureType::new("image")),
            ]
        }

        fn inferer(&self) -> SegResult<SlidingWindowInferer> {
            SlidingWindowInferer::new([4, 4, 4], 2, 0.25)
        }

        fn post_transforms(&self) -> Vec<Box<dyn Transform>> {
            vec![
                Box::new(Activations::softmax("pred")) as Box<dyn Transform>,
                Box::new(AsDiscrete::argmax("pred")),
                Box::new(EnsureType::new("pred")),
            ]
        }

        fn predictor(&self) -> SegResult<Arc<dyn WindowPredictor>> {
            Ok(self.predictor.clone())
        }

        fn path(&self) -> Option<&Path> {
            None
        }

        fn is_valid(&self) -> bool {
            true
        }
    }

    #[test]
    fn execute_runs_load_infer_post_and_writes_the_label() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.nii");
        let output = dir.path().join("label.nii");
        let source = Array3::<i64>::from_elem((6, 5, 4), 2).into_dyn();
        crate::transforms::io::write_label(&input, &source).unwrap();

        let task = SyntheticTask::new(5, 3);
        let request = InferRequest::new(&input).with_output(&output);
        let result = task.run(&request).unwrap();

        assert_eq!(result.label.shape(), &[1, 6, 5, 4]);
        assert!(result.label.iter().all(|&v| v == 3));
        assert_eq!(result.label_names.len(), 5);
        assert_eq!(result.label_names[&3], "region_3");

        let written = read_volume(&output).unwrap();
        assert_eq!(written.spatial_shape(), [6, 5, 4]);
        assert!(written.data.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn execute_without_output_path_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.nii");
        let source = Array3::<i64>::zeros((4, 4, 4)).into_dyn();
        crate::transforms::io::write_label(&input, &source).unwrap();

        let task = SyntheticTask::new(3, 1);
        let result = task.run(&InferRequest::new(&input)).unwrap();
        assert!(result.label.iter().all(|&v| v == 1));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
