//! In-memory CT volume representation.
//!
//! A [`Volume`] couples a channel-first voxel array with the physical
//! metadata the spatial transforms need: voxel spacing in millimetres and
//! the anatomical axis codes derived from the NIfTI affine. World
//! coordinates follow the NIfTI RAS+ convention (x grows to the patient's
//! right, y to anterior, z to superior).

use crate::core::{SegError, SegResult};
use ndarray::ArrayD;

/// Anatomical direction of one voxel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisCode {
    /// Right
    R,
    /// Left
    L,
    /// Anterior
    A,
    /// Posterior
    P,
    /// Superior
    S,
    /// Inferior
    I,
}

impl AxisCode {
    /// World axis this code belongs to: 0 for R/L, 1 for A/P, 2 for S/I.
    pub fn world_axis(self) -> usize {
        match self {
            AxisCode::R | AxisCode::L => 0,
            AxisCode::A | AxisCode::P => 1,
            AxisCode::S | AxisCode::I => 2,
        }
    }

    /// Whether the code points along the positive world direction (R, A or S).
    pub fn is_positive(self) -> bool {
        matches!(self, AxisCode::R | AxisCode::A | AxisCode::S)
    }

    /// Single-letter representation, matching the usual axcodes notation.
    pub fn as_char(self) -> char {
        match self {
            AxisCode::R => 'R',
            AxisCode::L => 'L',
            AxisCode::A => 'A',
            AxisCode::P => 'P',
            AxisCode::S => 'S',
            AxisCode::I => 'I',
        }
    }
}

/// The canonical axis order volumes are reoriented to before resampling.
pub const RAS: [AxisCode; 3] = [AxisCode::R, AxisCode::A, AxisCode::S];

/// A CT volume with physical metadata.
///
/// The voxel data is a channel-first `f32` array: 3 spatial dimensions,
/// optionally preceded by a channel dimension (`EnsureChannelFirst` inserts
/// it when absent). `spacing[k]` and `axcodes[k]` describe spatial axis `k`.
#[derive(Debug, Clone)]
pub struct Volume {
    /// Voxel data, `(X, Y, Z)` or `(C, X, Y, Z)`.
    pub data: ArrayD<f32>,
    /// Voxel spacing in millimetres, one entry per spatial axis.
    pub spacing: [f64; 3],
    /// Anatomical direction of each spatial axis.
    pub axcodes: [AxisCode; 3],
}

impl Volume {
    /// Creates a volume, validating that the array has 3 or 4 dimensions.
    pub fn new(data: ArrayD<f32>, spacing: [f64; 3], axcodes: [AxisCode; 3]) -> SegResult<Self> {
        if data.ndim() != 3 && data.ndim() != 4 {
            return Err(SegError::invalid_input(format!(
                "volume must have 3 or 4 dimensions, got {} with shape {:?}",
                data.ndim(),
                data.shape()
            )));
        }
        for (k, &s) in spacing.iter().enumerate() {
            if !(s.is_finite() && s > 0.0) {
                return Err(SegError::invalid_input(format!(
                    "voxel spacing for axis {k} must be positive and finite, got {s}"
                )));
            }
        }
        Ok(Self {
            data,
            spacing,
            axcodes,
        })
    }

    /// Whether a leading channel dimension is present.
    pub fn has_channel_dim(&self) -> bool {
        self.data.ndim() == 4
    }

    /// Shape of the spatial dimensions.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let shape = self.data.shape();
        let off = shape.len() - 3;
        [shape[off], shape[off + 1], shape[off + 2]]
    }

    /// Axis codes as a compact string, e.g. `"RAS"`.
    pub fn axcodes_str(&self) -> String {
        self.axcodes.iter().map(|c| c.as_char()).collect()
    }
}

/// Derives axis codes from the NIfTI sform rows.
///
/// For each voxel axis, the dominant component of the corresponding affine
/// column determines the world axis it runs along, and the component's sign
/// whether it runs in the positive (R/A/S) or negative (L/P/I) direction.
pub fn axcodes_from_srow(
    srow_x: [f32; 4],
    srow_y: [f32; 4],
    srow_z: [f32; 4],
) -> SegResult<[AxisCode; 3]> {
    let mut codes = [AxisCode::R; 3];
    for j in 0..3 {
        let column = [srow_x[j], srow_y[j], srow_z[j]];
        let (dominant, value) = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, &v)| (i, v))
            .unwrap_or((j, 0.0));
        if value == 0.0 {
            return Err(SegError::invalid_input(format!(
                "degenerate affine: column {j} of the sform is zero"
            )));
        }
        codes[j] = match (dominant, value > 0.0) {
            (0, true) => AxisCode::R,
            (0, false) => AxisCode::L,
            (1, true) => AxisCode::A,
            (1, false) => AxisCode::P,
            (2, true) => AxisCode::S,
            _ => AxisCode::I,
        };
    }
    let mut seen = [false; 3];
    for code in codes {
        let axis = code.world_axis();
        if seen[axis] {
            return Err(SegError::invalid_input(format!(
                "degenerate affine: world axis {axis} appears twice in axcodes"
            )));
        }
        seen[axis] = true;
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn identity_affine_is_ras() {
        let codes = axcodes_from_srow(
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        )
        .unwrap();
        assert_eq!(codes, RAS);
    }

    #[test]
    fn flipped_affine_gives_lps() {
        let codes = axcodes_from_srow(
            [-1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        )
        .unwrap();
        assert_eq!(codes, [AxisCode::L, AxisCode::P, AxisCode::S]);
    }

    #[test]
    fn permuted_affine_tracks_dominant_axis() {
        // Voxel axis 0 runs along world z, axis 2 along world x.
        let codes = axcodes_from_srow(
            [0.0, 0.0, 2.0, 0.0],
            [0.0, 1.5, 0.0, 0.0],
            [2.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        assert_eq!(codes, [AxisCode::S, AxisCode::A, AxisCode::R]);
    }

    #[test]
    fn duplicate_world_axis_is_rejected() {
        let result = axcodes_from_srow(
            [1.0, 1.0, 0.0, 0.0],
            [0.1, 0.2, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        );
        assert!(result.is_err());
    }

    #[test]
    fn volume_rejects_bad_dimensionality() {
        let data = Array3::<f32>::zeros((2, 2, 2)).into_dyn();
        assert!(Volume::new(data.clone(), [1.0, 1.0, 1.0], RAS).is_ok());

        let flat = data.into_shape_with_order((8,)).unwrap().into_dyn();
        assert!(Volume::new(flat, [1.0, 1.0, 1.0], RAS).is_err());
    }

    #[test]
    fn volume_rejects_nonpositive_spacing() {
        let data = Array3::<f32>::zeros((2, 2, 2)).into_dyn();
        assert!(Volume::new(data, [1.0, 0.0, 1.0], RAS).is_err());
    }
}
