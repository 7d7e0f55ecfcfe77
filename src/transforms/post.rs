//! Postprocessing transforms over the prediction tensor.
//!
//! The postprocessing sequence is order-sensitive: the channel-wise
//! softmax must run before the arg-max collapse.

use super::{DataMap, Item, Transform};
use crate::core::{ProcessingStage, SegError, SegResult};
use ndarray::{Array4, Axis, Ix4};

/// Guarantees a standard-layout, contiguous in-memory representation for
/// the value under a key.
///
/// Earlier steps may leave permuted or sliced views behind; downstream
/// consumers (the windowed inferer, the writer) assume standard layout.
#[derive(Debug, Clone)]
pub struct EnsureType {
    key: String,
}

impl EnsureType {
    /// Creates the step for the given data key.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Transform for EnsureType {
    fn name(&self) -> &'static str {
        "ensure_type"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        let item = data
            .remove(&self.key)
            .ok_or_else(|| SegError::invalid_input(format!("data key '{}' is missing", self.key)))?;
        let item = match item {
            Item::Volume(mut volume) => {
                if !volume.data.is_standard_layout() {
                    let contiguous = volume.data.as_standard_layout().to_owned();
                    volume.data = contiguous;
                }
                Item::Volume(volume)
            }
            Item::Tensor(tensor) => {
                if tensor.is_standard_layout() {
                    Item::Tensor(tensor)
                } else {
                    Item::Tensor(tensor.as_standard_layout().to_owned())
                }
            }
            Item::Discrete(labels) => {
                if labels.is_standard_layout() {
                    Item::Discrete(labels)
                } else {
                    Item::Discrete(labels.as_standard_layout().to_owned())
                }
            }
            other => other,
        };
        data.insert(self.key.clone(), item);
        Ok(())
    }
}

/// Applies a channel-wise softmax to a channel-first prediction tensor.
#[derive(Debug, Clone)]
pub struct Activations {
    key: String,
}

impl Activations {
    /// Creates the softmax step for the given data key.
    pub fn softmax(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Transform for Activations {
    fn name(&self) -> &'static str {
        "activations_softmax"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        let logits = data.tensor(&self.key)?;
        let view = logits.view().into_dimensionality::<Ix4>().map_err(|e| {
            SegError::processing(
                ProcessingStage::PostProcessing,
                "softmax expects a channel-first prediction tensor",
                e,
            )
        })?;
        let (channels, dx, dy, dz) = view.dim();
        if channels == 0 {
            return Err(SegError::invalid_input("prediction tensor has no channels"));
        }

        let mut probabilities = Array4::<f32>::zeros((channels, dx, dy, dz));
        for x in 0..dx {
            for y in 0..dy {
                for z in 0..dz {
                    let mut max = f32::NEG_INFINITY;
                    for c in 0..channels {
                        max = max.max(view[[c, x, y, z]]);
                    }
                    let mut sum = 0.0f32;
                    for c in 0..channels {
                        let e = (view[[c, x, y, z]] - max).exp();
                        probabilities[[c, x, y, z]] = e;
                        sum += e;
                    }
                    for c in 0..channels {
                        probabilities[[c, x, y, z]] /= sum;
                    }
                }
            }
        }
        data.insert(self.key.clone(), Item::Tensor(probabilities.into_dyn()));
        Ok(())
    }
}

/// Collapses channels via arg-max into one discrete label per voxel.
///
/// The channel dimension is kept with size 1, matching the channel-first
/// convention of the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct AsDiscrete {
    key: String,
}

impl AsDiscrete {
    /// Creates the arg-max step for the given data key.
    pub fn argmax(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Transform for AsDiscrete {
    fn name(&self) -> &'static str {
        "as_discrete_argmax"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        let probabilities = data.tensor(&self.key)?;
        let view = probabilities
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| {
                SegError::processing(
                    ProcessingStage::PostProcessing,
                    "arg-max expects a channel-first prediction tensor",
                    e,
                )
            })?;
        let (channels, dx, dy, dz) = view.dim();
        if channels == 0 {
            return Err(SegError::invalid_input("prediction tensor has no channels"));
        }

        let mut labels = ndarray::Array3::<i64>::zeros((dx, dy, dz));
        for x in 0..dx {
            for y in 0..dy {
                for z in 0..dz {
                    let mut best = 0usize;
                    let mut best_value = view[[0, x, y, z]];
                    for c in 1..channels {
                        let value = view[[c, x, y, z]];
                        if value > best_value {
                            best_value = value;
                            best = c;
                        }
                    }
                    labels[[x, y, z]] = best as i64;
                }
            }
        }
        data.insert(
            self.key.clone(),
            Item::Discrete(labels.insert_axis(Axis(0)).into_dyn()),
        );
        Ok(())
    }
}
