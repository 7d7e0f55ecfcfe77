//! Transform pipeline over a request-scoped data mapping.
//!
//! Each segmentation request carries a [`DataMap`]: named slots (`"image"`,
//! `"pred"`) holding a path, a volume, or a tensor. A [`Transform`] is a
//! pure, order-dependent step that mutates only its declared keys;
//! [`Compose`] runs a fixed sequence of them in order. The preprocessing
//! and postprocessing sequences an inference task declares are built from
//! the steps in the submodules:
//!
//! * [`io`] - volume loading and label writing
//! * [`intensity`] - Hounsfield-unit windowing
//! * [`spatial`] - channel handling, foreground cropping, reorientation,
//!   spacing resampling
//! * [`post`] - softmax activation, arg-max collapse, layout guarantees

pub mod intensity;
pub mod io;
pub mod post;
pub mod spatial;

pub use intensity::ScaleIntensityRange;
pub use io::LoadVolume;
pub use post::{Activations, AsDiscrete, EnsureType};
pub use spatial::{CropForeground, EnsureChannelFirst, Orientation, Spacing};

use crate::core::{SegError, SegResult};
use crate::volume::Volume;
use ndarray::ArrayD;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A value stored in the request-scoped data mapping.
#[derive(Debug, Clone)]
pub enum Item {
    /// A filesystem path, before the volume behind it is loaded.
    Path(PathBuf),
    /// A loaded volume with physical metadata.
    Volume(Volume),
    /// A bare floating-point tensor (e.g. model predictions).
    Tensor(ArrayD<f32>),
    /// A discrete label tensor.
    Discrete(ArrayD<i64>),
}

impl Item {
    fn kind(&self) -> &'static str {
        match self {
            Item::Path(_) => "path",
            Item::Volume(_) => "volume",
            Item::Tensor(_) => "tensor",
            Item::Discrete(_) => "discrete",
        }
    }
}

/// Request-scoped data mapping keyed by field name.
#[derive(Debug, Default)]
pub struct DataMap {
    items: HashMap<String, Item>,
}

impl DataMap {
    /// Creates an empty data mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item under the given key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, item: Item) {
        self.items.insert(key.into(), item);
    }

    /// Returns the item stored under the given key, if any.
    pub fn get(&self, key: &str) -> Option<&Item> {
        self.items.get(key)
    }

    /// Removes and returns the item stored under the given key.
    pub fn remove(&mut self, key: &str) -> Option<Item> {
        self.items.remove(key)
    }

    /// Returns the path stored under the given key.
    pub fn path(&self, key: &str) -> SegResult<&Path> {
        match self.get(key) {
            Some(Item::Path(path)) => Ok(path),
            other => Err(self.kind_mismatch(key, "path", other)),
        }
    }

    /// Returns the volume stored under the given key.
    pub fn volume(&self, key: &str) -> SegResult<&Volume> {
        match self.get(key) {
            Some(Item::Volume(volume)) => Ok(volume),
            other => Err(self.kind_mismatch(key, "volume", other)),
        }
    }

    /// Returns a mutable reference to the volume stored under the given key.
    pub fn volume_mut(&mut self, key: &str) -> SegResult<&mut Volume> {
        match self.items.get_mut(key) {
            Some(Item::Volume(volume)) => Ok(volume),
            other => {
                let kind = other.map(|item| item.kind());
                Err(kind_mismatch_message(key, "volume", kind))
            }
        }
    }

    /// Returns the tensor stored under the given key.
    pub fn tensor(&self, key: &str) -> SegResult<&ArrayD<f32>> {
        match self.get(key) {
            Some(Item::Tensor(tensor)) => Ok(tensor),
            other => Err(self.kind_mismatch(key, "tensor", other)),
        }
    }

    /// Returns the discrete label tensor stored under the given key.
    pub fn discrete(&self, key: &str) -> SegResult<&ArrayD<i64>> {
        match self.get(key) {
            Some(Item::Discrete(labels)) => Ok(labels),
            other => Err(self.kind_mismatch(key, "discrete", other)),
        }
    }

    fn kind_mismatch(&self, key: &str, expected: &str, found: Option<&Item>) -> SegError {
        kind_mismatch_message(key, expected, found.map(|item| item.kind()))
    }
}

fn kind_mismatch_message(key: &str, expected: &str, found: Option<&'static str>) -> SegError {
    match found {
        Some(kind) => SegError::invalid_input(format!(
            "data key '{key}' holds a {kind}, expected a {expected}"
        )),
        None => SegError::invalid_input(format!("data key '{key}' is missing")),
    }
}

/// A pure, order-dependent step over the request data mapping.
///
/// Implementations mutate only their declared keys and carry no
/// request-level state, so a transform instance is reusable across
/// requests and the composed sequence is deterministic.
pub trait Transform: Send + Sync {
    /// Short name for tracing.
    fn name(&self) -> &'static str;

    /// Applies the transform to the data mapping.
    fn apply(&self, data: &mut DataMap) -> SegResult<()>;
}

/// Runs a fixed sequence of transforms in order.
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    /// Creates a composed sequence from the given transforms.
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    /// Number of steps in the sequence.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Applies every step in order, stopping at the first error.
    pub fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        for transform in &self.transforms {
            debug!(transform = transform.name(), "applying transform");
            transform.apply(data)?;
        }
        Ok(())
    }
}
