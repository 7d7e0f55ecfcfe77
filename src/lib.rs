//! # Aorta Seg
//!
//! A Rust library for multi-class aortic segmentation of CT volumes using
//! a pretrained 3D UNet served through ONNX Runtime.
//!
//! ## Features
//!
//! - 24-class voxelwise labelling of the aorta and adjacent vasculature
//! - Sliding-window inference over large volumes with overlap blending
//! - Fixed preprocessing pipeline matching the training-time transforms
//! - NIfTI volume loading and label writing
//! - Task adapter system for registering inference workflows
//!
//! ## Modules
//!
//! * [`app`] - Application bootstrap wiring tasks and the datastore
//! * [`config`] - Static configuration (intensity range, network, labels)
//! * [`core`] - Errors, task traits, datastore, and the inference engine
//! * [`tasks`] - Concrete inference task adapters
//! * [`transforms`] - Composable pre- and postprocessing transforms
//! * [`utils`] - Small parsing helpers for configuration values
//! * [`volume`] - In-memory volume representation and axis codes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aorta_seg::prelude::*;
//! use std::collections::HashMap;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app = AortaApp::new(
//!     "/opt/apps/aorta",
//!     "/data/studies",
//!     HashMap::from([("preload".to_string(), "true".to_string())]),
//! )?;
//!
//! let infers = app.init_infers()?;
//! let task = &infers["aorta_segmentation"];
//!
//! let request = InferRequest::new("/data/studies/case_001.nii.gz")
//!     .with_output("/data/labels/case_001.nii.gz");
//! let result = task.run(&request)?;
//! println!("labelled {} classes", result.label_names.len());
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod core;
pub mod tasks;
pub mod transforms;
pub mod utils;
pub mod volume;

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::app::AortaApp;
    pub use crate::config::{AortaConfig, InferenceConfig, IntensityRange, NetworkConfig, TaskConfigSnapshot};
    pub use crate::core::datastore::{Datastore, LocalDatastore};
    pub use crate::core::inference::{OrtModel, SlidingWindowInferer, WindowPredictor};
    pub use crate::core::traits::{InferRequest, InferResult, InferTask, TrainTask};
    pub use crate::core::{SegError, SegResult};
    pub use crate::tasks::AortaSegmentation;
    pub use crate::transforms::{Compose, DataMap, Item, Transform};
    pub use crate::volume::{AxisCode, Volume};
}
