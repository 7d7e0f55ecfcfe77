//! Volume I/O: NIfTI loading and label writing.

use super::{DataMap, Item, Transform};
use crate::core::{SegError, SegResult};
use crate::volume::{axcodes_from_srow, Volume, RAS};
use ndarray::{ArrayD, Axis};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::path::Path;
use tracing::debug;

/// Loads the NIfTI volume behind a path key, replacing the path with a
/// [`Volume`] carrying spacing and axis-code metadata.
#[derive(Debug, Clone)]
pub struct LoadVolume {
    key: String,
}

impl LoadVolume {
    /// Creates the loading step for the given data key.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Transform for LoadVolume {
    fn name(&self) -> &'static str {
        "load_volume"
    }

    fn apply(&self, data: &mut DataMap) -> SegResult<()> {
        let path = data.path(&self.key)?.to_path_buf();
        let volume = read_volume(&path)?;
        debug!(
            path = %path.display(),
            shape = ?volume.data.shape(),
            spacing = ?volume.spacing,
            axcodes = %volume.axcodes_str(),
            "loaded volume"
        );
        data.insert(self.key.clone(), Item::Volume(volume));
        Ok(())
    }
}

/// Reads a NIfTI file into a [`Volume`].
///
/// Trailing singleton dimensions beyond the third (e.g. a degenerate time
/// axis) are dropped. Axis codes come from the sform when present;
/// otherwise the volume is assumed to already be in RAS order.
pub fn read_volume(path: &Path) -> SegResult<Volume> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|source| SegError::VolumeLoad {
            path: path.to_path_buf(),
            source,
        })?;
    let header = object.header().clone();
    let mut data: ArrayD<f32> =
        object
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|source| SegError::VolumeLoad {
                path: path.to_path_buf(),
                source,
            })?;

    while data.ndim() > 3 && data.shape()[data.ndim() - 1] == 1 {
        let last = data.ndim() - 1;
        data = data.remove_axis(Axis(last));
    }

    let mut spacing = [1.0f64; 3];
    for (axis, value) in spacing.iter_mut().enumerate() {
        let pixdim = header.pixdim[axis + 1];
        if pixdim.is_finite() && pixdim > 0.0 {
            *value = pixdim as f64;
        }
    }

    let axcodes = if header.sform_code > 0 {
        axcodes_from_srow(header.srow_x, header.srow_y, header.srow_z)?
    } else {
        debug!(path = %path.display(), "no sform in header; assuming RAS orientation");
        RAS
    };

    Volume::new(data, spacing, axcodes)
}

/// Writes a discrete label volume as NIfTI.
///
/// The channel dimension, if still present with size 1, is dropped; label
/// values are stored as `u8` (the table has 24 classes).
pub fn write_label(path: &Path, labels: &ArrayD<i64>) -> SegResult<()> {
    let mut view = labels.view();
    while view.ndim() > 3 && view.shape()[0] == 1 {
        view = view.index_axis_move(Axis(0), 0);
    }
    let bytes = view.mapv(|v| v.clamp(0, u8::MAX as i64) as u8);
    nifti::writer::WriterOptions::new(path)
        .write_nifti(&bytes)
        .map_err(|source| SegError::VolumeWrite {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), shape = ?bytes.shape(), "wrote label volume");
    Ok(())
}
