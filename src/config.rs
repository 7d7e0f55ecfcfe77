//! Static configuration for the aortic segmentation task.
//!
//! All values here describe the pretrained model and the pipeline it was
//! trained with: the Hounsfield-unit window, the target voxel spacing, the
//! network hyperparameters, the sliding-window parameters, and the label
//! table. The configuration is built once at startup and passed by
//! reference into the inference task; nothing in this module is mutable
//! after construction.

use crate::core::{SegError, SegResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Hounsfield-unit windowing bounds and the normalized output range.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IntensityRange {
    /// Minimum HU value; everything below is clipped.
    pub a_min: f32,
    /// Maximum HU value; everything above is clipped.
    pub a_max: f32,
    /// Scaled minimum.
    pub b_min: f32,
    /// Scaled maximum.
    pub b_max: f32,
}

impl Default for IntensityRange {
    fn default() -> Self {
        Self {
            a_min: -175.0,
            a_max: 250.0,
            b_min: 0.0,
            b_max: 1.0,
        }
    }
}

/// Declared hyperparameters of the serialized 3D UNet.
///
/// The network itself ships as a self-contained serialized graph; these
/// values are kept for introspection and for the label-cardinality
/// invariant, not to rebuild the network.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkConfig {
    /// Number of spatial dimensions.
    pub spatial_dims: usize,
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output channels (background + 23 anatomical regions).
    pub out_channels: usize,
    /// Feature channels per encoder level.
    pub channels: Vec<usize>,
    /// Downsampling strides between encoder levels.
    pub strides: Vec<usize>,
    /// Residual units per level.
    pub num_res_units: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            spatial_dims: 3,
            in_channels: 1,
            out_channels: 24,
            channels: vec![16, 32, 64, 128, 256],
            strides: vec![2, 2, 2, 2],
            num_res_units: 2,
        }
    }
}

/// Sliding-window inference parameters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InferenceConfig {
    /// Window size in voxels.
    pub roi_size: [usize; 3],
    /// Number of windows evaluated per model call.
    pub sw_batch_size: usize,
    /// Overlap fraction between adjacent windows.
    pub overlap: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            roi_size: [96, 96, 96],
            sw_batch_size: 1,
            overlap: 0.5,
        }
    }
}

/// Target voxel spacing in millimetres.
pub const TARGET_SPACING: [f64; 3] = [1.5, 1.5, 2.0];

/// Immutable application configuration for the aorta segmentation task.
#[derive(Debug, Clone, Serialize)]
pub struct AortaConfig {
    /// Intensity normalization bounds.
    pub intensity_range: IntensityRange,
    /// Target voxel spacing in millimetres.
    pub target_spacing: [f64; 3],
    /// Declared network hyperparameters.
    pub network: NetworkConfig,
    /// Sliding-window inference parameters.
    pub inference: InferenceConfig,
    /// Label index to anatomical region name.
    pub labels: BTreeMap<u8, String>,
}

impl Default for AortaConfig {
    fn default() -> Self {
        Self {
            intensity_range: IntensityRange::default(),
            target_spacing: TARGET_SPACING,
            network: NetworkConfig::default(),
            inference: InferenceConfig::default(),
            labels: label_names(),
        }
    }
}

impl AortaConfig {
    /// Validates the internal consistency of the configuration.
    ///
    /// The network's declared output channel count must equal the label
    /// table's cardinality, the label indices must be contiguous from 0,
    /// and the intensity window must be non-degenerate.
    pub fn validate(&self) -> SegResult<()> {
        if self.network.out_channels != self.labels.len() {
            return Err(SegError::config_error(format!(
                "network declares {} output channels but the label table has {} entries",
                self.network.out_channels,
                self.labels.len()
            )));
        }
        for (expected, &index) in self.labels.keys().enumerate() {
            if index as usize != expected {
                return Err(SegError::config_error(format!(
                    "label indices must be contiguous from 0; expected {expected}, found {index}"
                )));
            }
        }
        if self.intensity_range.a_min >= self.intensity_range.a_max {
            return Err(SegError::config_error(format!(
                "intensity window is degenerate: a_min {} >= a_max {}",
                self.intensity_range.a_min, self.intensity_range.a_max
            )));
        }
        if !(0.0..1.0).contains(&self.inference.overlap) {
            return Err(SegError::config_error(format!(
                "sliding-window overlap must be in [0, 1), got {}",
                self.inference.overlap
            )));
        }
        if self.inference.roi_size.iter().any(|&d| d == 0) || self.inference.sw_batch_size == 0 {
            return Err(SegError::config_error(
                "sliding-window roi_size and sw_batch_size must be positive",
            ));
        }
        Ok(())
    }
}

/// Read-only snapshot returned by the task's configuration accessor.
///
/// Used for introspection and debugging, not for control flow; the five
/// fields are part of the plugin's observable contract.
#[derive(Debug, Clone, Serialize)]
pub struct TaskConfigSnapshot {
    /// Declared network hyperparameters.
    pub network: NetworkConfig,
    /// Sliding-window inference parameters.
    pub inference: InferenceConfig,
    /// Intensity normalization bounds.
    pub intensity_range: IntensityRange,
    /// Target voxel spacing in millimetres.
    pub target_spacing: [f64; 3],
    /// Window size configured on the task instance.
    pub roi_size: [usize; 3],
}

/// Builds the label table: background plus 23 anatomical regions.
///
/// Indices 22 and 23 are placeholder regions carried over from the training
/// configuration; the table cardinality must match the network's 24 output
/// channels, so they stay.
pub fn label_names() -> BTreeMap<u8, String> {
    let names = [
        (0u8, "background"),
        (1, "aortic_root"),
        (2, "ascending_aorta"),
        (3, "aortic_arch"),
        (4, "descending_aorta"),
        (5, "abdominal_aorta"),
        (6, "brachiocephalic_trunk"),
        (7, "left_common_carotid"),
        (8, "left_subclavian"),
        (9, "right_common_carotid"),
        (10, "right_subclavian"),
        (11, "celiac_trunk"),
        (12, "superior_mesenteric"),
        (13, "left_renal"),
        (14, "right_renal"),
        (15, "inferior_mesenteric"),
        (16, "left_common_iliac"),
        (17, "right_common_iliac"),
        (18, "left_internal_iliac"),
        (19, "right_internal_iliac"),
        (20, "left_external_iliac"),
        (21, "right_external_iliac"),
        (22, "region_22"),
        (23, "region_23"),
    ];
    names
        .into_iter()
        .map(|(index, name)| (index, name.to_string()))
        .collect()
}
