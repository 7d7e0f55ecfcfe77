//! Hounsfield-unit windowing.

use super::{DataMap, Transform};
use crate::core::{SegError, SegResult};

/// Clips intensities to `[a_min, a_max]` and linearly rescales them to
/// `[b_min, b_max]`.
///
/// For CT input this is the Hounsfield-unit window the network was trained
/// with; voxels at or below `a_min` map to `b_min`, voxels at or above
/// `a_max` map to `b_max`.
#[derive(Debug, Clone)]
pub struct ScaleIntensityRange {
    key: String,
    a_min: f32,
    a_max: f32,
    b_min: f32,
    b_max: f32,
    clip: bool,
}

impl ScaleIntensityRange {
    /// Creates the windowing step for the given data key.
    pub fn new(key: impl Into<String>, a_min: f32, a_max: f32, b_min: f32, b_max: f32, clip: bool) -> Self {
        Self {
            key: key.into(),
            a_min,
            a_max,
            b_min,
            b_max,
            clip,
        }
    }
}

impl Transform for ScaleIntensityRange {
    fn name(&self) -> &'static str {
        "scale_intensity_range"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        if self.a_min >= self.a_max {
            return Err(SegError::config_error(format!(
                "intensity window is degenerate: a_min {} >= a_max {}",
                self.a_min, self.a_max
            )));
        }
        // Divide before scaling so a_max maps to exactly b_max.
        let window = self.a_max - self.a_min;
        let span = self.b_max - self.b_min;
        let (a_min, b_min, b_max) = (self.a_min, self.b_min, self.b_max);
        let clip = self.clip;
        let (lo, hi) = if b_min <= b_max {
            (b_min, b_max)
        } else {
            (b_max, b_min)
        };

        let volume = data.volume_mut(&self.key)?;
        volume.data.mapv_inplace(|v| {
            let scaled = (v - a_min) / window * span + b_min;
            if clip {
                scaled.clamp(lo, hi)
            } else {
                scaled
            }
        });
        Ok(())
    }
}
