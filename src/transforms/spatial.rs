//! Spatial transforms: channel handling, foreground cropping, anatomical
//! reorientation, and physical spacing resampling.
//!
//! All steps except [`EnsureChannelFirst`] expect channel-first volumes
//! (`C, X, Y, Z`); the preprocessing sequence inserts the channel axis
//! before any of them run.

use super::{DataMap, Transform};
use crate::core::{ProcessingStage, SegError, SegResult};
use crate::volume::{AxisCode, Volume, RAS};
use ndarray::{s, Array4, ArrayView3, Axis, Ix4, Zip};
use tracing::debug;

/// Inserts a leading channel dimension when the volume has none.
#[derive(Debug, Clone)]
pub struct EnsureChannelFirst {
    key: String,
}

impl EnsureChannelFirst {
    /// Creates the step for the given data key.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Transform for EnsureChannelFirst {
    fn name(&self) -> &'static str {
        "ensure_channel_first"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        let volume = data.volume_mut(&self.key)?;
        if !volume.has_channel_dim() {
            let spatial = std::mem::take(&mut volume.data);
            volume.data = spatial.insert_axis(Axis(0));
        }
        Ok(())
    }
}

/// Crops the spatial dimensions to the bounding box of non-background
/// voxels of a source key.
///
/// Background is anything `<= 0`; after the intensity window the clipped
/// CT air value sits exactly at 0, so this trims the scan to the patient.
/// A volume with no foreground voxel keeps its full extent.
#[derive(Debug, Clone)]
pub struct CropForeground {
    key: String,
    source_key: String,
}

impl CropForeground {
    /// Creates the step cropping `key` by the foreground of `source_key`.
    pub fn new(key: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source_key: source_key.into(),
        }
    }
}

impl Transform for CropForeground {
    fn name(&self) -> &'static str {
        "crop_foreground"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        let source = data.volume(&self.source_key)?;
        let bbox = match foreground_bbox(source)? {
            Some(bbox) => bbox,
            None => {
                debug!(key = %self.source_key, "no foreground voxels; keeping full extent");
                return Ok(());
            }
        };

        let volume = data.volume_mut(&self.key)?;
        let view = volume
            .data
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| {
                SegError::processing(
                    ProcessingStage::Cropping,
                    "crop_foreground expects a channel-first volume",
                    e,
                )
            })?;
        let [(x0, x1), (y0, y1), (z0, z1)] = bbox;
        let cropped = view
            .slice(s![.., x0..=x1, y0..=y1, z0..=z1])
            .to_owned()
            .into_dyn();
        volume.data = cropped;
        debug!(
            shape = ?volume.data.shape(),
            "cropped to foreground bounding box"
        );
        Ok(())
    }
}

/// Bounding box of voxels `> 0` over the spatial dimensions, across all
/// channels. `None` when every voxel is background.
fn foreground_bbox(volume: &Volume) -> SegResult<Option<[(usize, usize); 3]>> {
    let view = volume
        .data
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|e| {
            SegError::processing(
                ProcessingStage::Cropping,
                "foreground detection expects a channel-first volume",
                e,
            )
        })?;
    let mut min = [usize::MAX; 3];
    let mut max = [0usize; 3];
    let mut any = false;
    for ((_, x, y, z), &value) in view.indexed_iter() {
        if value > 0.0 {
            any = true;
            let index = [x, y, z];
            for axis in 0..3 {
                min[axis] = min[axis].min(index[axis]);
                max[axis] = max[axis].max(index[axis]);
            }
        }
    }
    if !any {
        return Ok(None);
    }
    Ok(Some([
        (min[0], max[0]),
        (min[1], max[1]),
        (min[2], max[2]),
    ]))
}

/// Reorients a volume to a canonical anatomical axis order.
///
/// The permutation and flips are derived from the axis codes recorded at
/// load time; spacing metadata follows the permutation. Reorienting an
/// already-canonical volume is the identity.
#[derive(Debug, Clone)]
pub struct Orientation {
    key: String,
    target: [AxisCode; 3],
}

impl Orientation {
    /// Creates a reorientation step to the RAS convention.
    pub fn ras(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            target: RAS,
        }
    }
}

impl Transform for Orientation {
    fn name(&self) -> &'static str {
        "orientation"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        let volume = data.volume_mut(&self.key)?;
        if volume.axcodes == self.target {
            return Ok(());
        }

        let mut perm = [usize::MAX; 3];
        let mut flip = [false; 3];
        for (g, &target_code) in self.target.iter().enumerate() {
            let world = target_code.world_axis();
            let source = volume
                .axcodes
                .iter()
                .position(|code| code.world_axis() == world)
                .ok_or_else(|| {
                    SegError::invalid_input(format!(
                        "volume axcodes {} do not cover world axis {world}",
                        volume.axcodes_str()
                    ))
                })?;
            perm[g] = source;
            flip[g] = volume.axcodes[source].is_positive() != target_code.is_positive();
        }

        let view = volume
            .data
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| {
                SegError::processing(
                    ProcessingStage::Reorientation,
                    "orientation expects a channel-first volume",
                    e,
                )
            })?;
        let mut oriented = view.permuted_axes([0, perm[0] + 1, perm[1] + 1, perm[2] + 1]);
        for (g, &invert) in flip.iter().enumerate() {
            if invert {
                oriented.invert_axis(Axis(g + 1));
            }
        }

        let from = volume.axcodes_str();
        let spacing = volume.spacing;
        let reoriented = oriented.as_standard_layout().to_owned().into_dyn();
        volume.data = reoriented;
        volume.spacing = [spacing[perm[0]], spacing[perm[1]], spacing[perm[2]]];
        volume.axcodes = self.target;
        debug!(from = %from, to = %volume.axcodes_str(), "reoriented volume");
        Ok(())
    }
}

/// Resamples a volume to a target physical voxel spacing with trilinear
/// interpolation.
#[derive(Debug, Clone)]
pub struct Spacing {
    key: String,
    pixdim: [f64; 3],
}

impl Spacing {
    /// Creates the resampling step for the given target spacing in mm.
    pub fn new(key: impl Into<String>, pixdim: [f64; 3]) -> Self {
        Self {
            key: key.into(),
            pixdim,
        }
    }
}

impl Transform for Spacing {
    fn name(&self) -> &'static str {
        "spacing"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        for (axis, &target) in self.pixdim.iter().enumerate() {
            if !(target.is_finite() && target > 0.0) {
                return Err(SegError::config_error(format!(
                    "target spacing for axis {axis} must be positive and finite, got {target}"
                )));
            }
        }

        let volume = data.volume_mut(&self.key)?;
        if volume.spacing == self.pixdim {
            return Ok(());
        }
        let view = volume
            .data
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| {
                SegError::processing(
                    ProcessingStage::Resampling,
                    "spacing expects a channel-first volume",
                    e,
                )
            })?;

        let (channels, in_x, in_y, in_z) = view.dim();
        let in_shape = [in_x, in_y, in_z];
        let mut out_shape = [0usize; 3];
        for axis in 0..3 {
            let scaled = in_shape[axis] as f64 * volume.spacing[axis] / self.pixdim[axis];
            out_shape[axis] = (scaled.round() as usize).max(1);
        }

        let mut resampled = Array4::<f32>::zeros((channels, out_shape[0], out_shape[1], out_shape[2]));
        for channel in 0..channels {
            let source = view.index_axis(Axis(0), channel);
            let mut target = resampled.index_axis_mut(Axis(0), channel);
            Zip::indexed(&mut target).par_for_each(|(i, j, k), value| {
                let x = source_coord(i, out_shape[0], in_shape[0]);
                let y = source_coord(j, out_shape[1], in_shape[1]);
                let z = source_coord(k, out_shape[2], in_shape[2]);
                *value = sample_trilinear(&source, x, y, z);
            });
        }

        debug!(
            from = ?in_shape,
            to = ?out_shape,
            spacing = ?self.pixdim,
            "resampled volume"
        );
        volume.data = resampled.into_dyn();
        volume.spacing = self.pixdim;
        Ok(())
    }
}

/// Maps an output index to a fractional source coordinate, keeping the
/// first and last samples aligned with the volume edges.
fn source_coord(index: usize, out_dim: usize, in_dim: usize) -> f64 {
    if out_dim <= 1 {
        0.0
    } else {
        index as f64 * (in_dim - 1) as f64 / (out_dim - 1) as f64
    }
}

fn sample_trilinear(source: &ArrayView3<'_, f32>, x: f64, y: f64, z: f64) -> f32 {
    let (nx, ny, nz) = source.dim();
    let x0 = (x.floor() as usize).min(nx - 1);
    let y0 = (y.floor() as usize).min(ny - 1);
    let z0 = (z.floor() as usize).min(nz - 1);
    let x1 = (x0 + 1).min(nx - 1);
    let y1 = (y0 + 1).min(ny - 1);
    let z1 = (z0 + 1).min(nz - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;
    let fz = (z - z0 as f64) as f32;

    let c000 = source[[x0, y0, z0]];
    let c100 = source[[x1, y0, z0]];
    let c010 = source[[x0, y1, z0]];
    let c110 = source[[x1, y1, z0]];
    let c001 = source[[x0, y0, z1]];
    let c101 = source[[x1, y0, z1]];
    let c011 = source[[x0, y1, z1]];
    let c111 = source[[x1, y1, z1]];

    let c00 = c000 + (c100 - c000) * fx;
    let c10 = c010 + (c110 - c010) * fx;
    let c01 = c001 + (c101 - c001) * fx;
    let c11 = c011 + (c111 - c011) * fx;
    let c0 = c00 + (c10 - c00) * fy;
    let c1 = c01 + (c11 - c01) * fy;
    c0 + (c1 - c0) * fz
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::Item;
    use ndarray::{Array3, Array4};

    fn channel_first(data: Array4<f32>, spacing: [f64; 3], axcodes: [AxisCode; 3]) -> Volume {
        Volume::new(data.into_dyn(), spacing, axcodes).unwrap()
    }

    #[test]
    fn ensure_channel_first_inserts_axis_once() {
        let step = EnsureChannelFirst::new("image");
        let mut data = DataMap::new();
        let volume =
            Volume::new(Array3::<f32>::zeros((3, 4, 5)).into_dyn(), [1.0; 3], RAS).unwrap();
        data.insert("image", Item::Volume(volume));

        step.apply(&mut data).unwrap();
        assert_eq!(data.volume("image").unwrap().data.shape(), &[1, 3, 4, 5]);

        // Idempotent on channel-first input.
        step.apply(&mut data).unwrap();
        assert_eq!(data.volume("image").unwrap().data.shape(), &[1, 3, 4, 5]);
    }

    #[test]
    fn crop_foreground_trims_to_positive_block() {
        let mut array = Array4::<f32>::zeros((1, 8, 8, 8));
        array.slice_mut(s![0, 2..5, 3..6, 1..7]).fill(0.7);
        let mut data = DataMap::new();
        data.insert(
            "image",
            Item::Volume(channel_first(array, [1.0; 3], RAS)),
        );

        CropForeground::new("image", "image")
            .apply(&mut data)
            .unwrap();
        assert_eq!(data.volume("image").unwrap().data.shape(), &[1, 3, 3, 6]);
    }

    #[test]
    fn crop_foreground_keeps_background_only_volume() {
        let array = Array4::<f32>::zeros((1, 4, 4, 4));
        let mut data = DataMap::new();
        data.insert(
            "image",
            Item::Volume(channel_first(array, [1.0; 3], RAS)),
        );

        CropForeground::new("image", "image")
            .apply(&mut data)
            .unwrap();
        assert_eq!(data.volume("image").unwrap().data.shape(), &[1, 4, 4, 4]);
    }

    #[test]
    fn orientation_flips_lps_to_ras() {
        let mut array = Array4::<f32>::zeros((1, 2, 2, 2));
        array[[0, 0, 0, 0]] = 1.0;
        let lps = [AxisCode::L, AxisCode::P, AxisCode::S];
        let mut data = DataMap::new();
        data.insert(
            "image",
            Item::Volume(channel_first(array, [1.0; 3], lps)),
        );

        Orientation::ras("image").apply(&mut data).unwrap();
        let volume = data.volume("image").unwrap();
        assert_eq!(volume.axcodes, RAS);
        // The L and P axes were flipped; the marked voxel moved to the
        // opposite corner in x and y, same z.
        let view = volume.data.view().into_dimensionality::<Ix4>().unwrap();
        assert_eq!(view[[0, 1, 1, 0]], 1.0);
        assert_eq!(view[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn orientation_permutes_axes_and_spacing() {
        // Axis order (S, A, R): spatial axis 0 runs superior, axis 2 right.
        let array = Array4::<f32>::zeros((1, 5, 3, 2));
        let codes = [AxisCode::S, AxisCode::A, AxisCode::R];
        let mut data = DataMap::new();
        data.insert(
            "image",
            Item::Volume(channel_first(array, [2.0, 1.5, 1.0], codes)),
        );

        Orientation::ras("image").apply(&mut data).unwrap();
        let volume = data.volume("image").unwrap();
        assert_eq!(volume.data.shape(), &[1, 2, 3, 5]);
        assert_eq!(volume.spacing, [1.0, 1.5, 2.0]);
        assert_eq!(volume.axcodes, RAS);
    }

    #[test]
    fn orientation_is_identity_on_ras() {
        let mut array = Array4::<f32>::zeros((1, 2, 3, 4));
        array[[0, 1, 2, 3]] = 5.0;
        let mut data = DataMap::new();
        data.insert(
            "image",
            Item::Volume(channel_first(array.clone(), [1.0; 3], RAS)),
        );
        Orientation::ras("image").apply(&mut data).unwrap();
        assert_eq!(
            data.volume("image").unwrap().data,
            array.into_dyn()
        );
    }

    #[test]
    fn spacing_resamples_linear_ramp_exactly() {
        // A ramp along x is linear, so trilinear resampling reproduces it.
        let mut array = Array4::<f32>::zeros((1, 4, 1, 1));
        for x in 0..4 {
            array[[0, x, 0, 0]] = x as f32;
        }
        let mut data = DataMap::new();
        data.insert(
            "image",
            Item::Volume(channel_first(array, [2.0, 1.0, 1.0], RAS)),
        );

        Spacing::new("image", [1.0, 1.0, 1.0])
            .apply(&mut data)
            .unwrap();
        let volume = data.volume("image").unwrap();
        assert_eq!(volume.data.shape(), &[1, 8, 1, 1]);
        assert_eq!(volume.spacing, [1.0, 1.0, 1.0]);

        let view = volume.data.view().into_dimensionality::<Ix4>().unwrap();
        assert_eq!(view[[0, 0, 0, 0]], 0.0);
        assert_eq!(view[[0, 7, 0, 0]], 3.0);
        let step = 3.0 / 7.0;
        for i in 0..8 {
            assert!((view[[0, i, 0, 0]] - step * i as f32).abs() < 1e-5);
        }
    }

    #[test]
    fn spacing_is_identity_when_already_on_target() {
        let mut array = Array4::<f32>::zeros((1, 3, 3, 3));
        array[[0, 1, 1, 1]] = 9.0;
        let mut data = DataMap::new();
        data.insert(
            "image",
            Item::Volume(channel_first(array.clone(), [1.5, 1.5, 2.0], RAS)),
        );
        Spacing::new("image", [1.5, 1.5, 2.0])
            .apply(&mut data)
            .unwrap();
        assert_eq!(data.volume("image").unwrap().data, array.into_dyn());
    }

    #[test]
    fn spacing_rejects_nonpositive_target() {
        let mut data = DataMap::new();
        data.insert(
            "image",
            Item::Volume(channel_first(Array4::<f32>::zeros((1, 2, 2, 2)), [1.0; 3], RAS)),
        );
        assert!(Spacing::new("image", [1.0, -1.0, 1.0])
            .apply(&mut data)
            .is_err());
    }
}
