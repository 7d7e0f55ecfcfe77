//! Windowed evaluation over large volumes.
//!
//! A [`SlidingWindowInferer`] tiles a volume into fixed-size overlapping
//! windows, runs a predictor over batches of windows, and blends the
//! overlapping predictions by uniform averaging. Memory use is bounded by
//! the window size rather than the volume size.

use crate::core::errors::{SegError, SegResult};
use ndarray::{s, Array3, Array4, Array5, Axis, CowArray, Ix4};
use tracing::debug;

/// Runs the network over one batch of windows.
///
/// Input and output are `(N, C, X, Y, Z)`; the output spatial shape must
/// equal the input spatial shape. Implemented by the ONNX model handle and
/// by synthetic predictors in tests.
pub trait WindowPredictor: Send + Sync {
    /// Predicts per-channel scores for each window in the batch.
    fn predict(&self, windows: &Array5<f32>) -> SegResult<Array5<f32>>;
}

/// Sliding-window inference strategy.
///
/// Holds the three parameters the inference task supplies: window size,
/// windows per batch, and the overlap fraction between adjacent windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlidingWindowInferer {
    roi_size: [usize; 3],
    sw_batch_size: usize,
    overlap: f32,
}

impl SlidingWindowInferer {
    /// Creates an inferer, validating the window parameters.
    pub fn new(roi_size: [usize; 3], sw_batch_size: usize, overlap: f32) -> SegResult<Self> {
        if roi_size.iter().any(|&d| d == 0) {
            return Err(SegError::config_error(format!(
                "window size must be positive in every dimension, got {roi_size:?}"
            )));
        }
        if sw_batch_size == 0 {
            return Err(SegError::config_error("window batch size must be positive"));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(SegError::config_error(format!(
                "window overlap must be in [0, 1), got {overlap}"
            )));
        }
        Ok(Self {
            roi_size,
            sw_batch_size,
            overlap,
        })
    }

    /// Window size in voxels.
    pub fn roi_size(&self) -> [usize; 3] {
        self.roi_size
    }

    /// Number of windows evaluated per predictor call.
    pub fn sw_batch_size(&self) -> usize {
        self.sw_batch_size
    }

    /// Overlap fraction between adjacent windows.
    pub fn overlap(&self) -> f32 {
        self.overlap
    }

    /// Runs windowed inference over a channel-first volume.
    ///
    /// The volume is zero-padded up to the window size if needed; the
    /// padding is cropped off the blended result, so the output spatial
    /// shape always equals the input spatial shape.
    pub fn infer(
        &self,
        image: &Array4<f32>,
        predictor: &dyn WindowPredictor,
    ) -> SegResult<Array4<f32>> {
        let (channels, dx, dy, dz) = image.dim();
        if channels == 0 || dx == 0 || dy == 0 || dz == 0 {
            return Err(SegError::invalid_input(format!(
                "cannot run windowed inference over an empty volume with shape {:?}",
                image.shape()
            )));
        }

        let [r0, r1, r2] = self.roi_size;
        let padded_shape = [dx.max(r0), dy.max(r1), dz.max(r2)];
        let padded: CowArray<'_, f32, Ix4> = if padded_shape == [dx, dy, dz] {
            image.view().into()
        } else {
            let mut padded =
                Array4::<f32>::zeros((channels, padded_shape[0], padded_shape[1], padded_shape[2]));
            padded.slice_mut(s![.., ..dx, ..dy, ..dz]).assign(image);
            padded.into()
        };

        let starts_x = scan_starts(padded_shape[0], r0, self.scan_interval(r0));
        let starts_y = scan_starts(padded_shape[1], r1, self.scan_interval(r1));
        let starts_z = scan_starts(padded_shape[2], r2, self.scan_interval(r2));
        let mut windows = Vec::with_capacity(starts_x.len() * starts_y.len() * starts_z.len());
        for &sx in &starts_x {
            for &sy in &starts_y {
                for &sz in &starts_z {
                    windows.push([sx, sy, sz]);
                }
            }
        }
        debug!(
            windows = windows.len(),
            roi = ?self.roi_size,
            overlap = self.overlap,
            "running sliding-window inference"
        );

        let mut accumulator: Option<Array4<f32>> = None;
        let mut counts =
            Array3::<f32>::zeros((padded_shape[0], padded_shape[1], padded_shape[2]));

        for chunk in windows.chunks(self.sw_batch_size) {
            let mut batch = Array5::<f32>::zeros((chunk.len(), channels, r0, r1, r2));
            for (b, &[sx, sy, sz]) in chunk.iter().enumerate() {
                batch
                    .slice_mut(s![b, .., .., .., ..])
                    .assign(&padded.slice(s![.., sx..sx + r0, sy..sy + r1, sz..sz + r2]));
            }

            let predictions = predictor.predict(&batch)?;
            let (batch_out, out_channels, o0, o1, o2) = predictions.dim();
            if batch_out != chunk.len() || [o0, o1, o2] != self.roi_size {
                return Err(SegError::invalid_input(format!(
                    "predictor returned shape {:?} for a batch of {} windows of size {:?}",
                    predictions.shape(),
                    chunk.len(),
                    self.roi_size
                )));
            }

            let accumulator = accumulator.get_or_insert_with(|| {
                Array4::<f32>::zeros((
                    out_channels,
                    padded_shape[0],
                    padded_shape[1],
                    padded_shape[2],
                ))
            });
            if accumulator.dim().0 != out_channels {
                return Err(SegError::invalid_input(format!(
                    "predictor changed its output channel count from {} to {}",
                    accumulator.dim().0,
                    out_channels
                )));
            }

            for (b, &[sx, sy, sz]) in chunk.iter().enumerate() {
                let mut region =
                    accumulator.slice_mut(s![.., sx..sx + r0, sy..sy + r1, sz..sz + r2]);
                region += &predictions.slice(s![b, .., .., .., ..]);
                let mut seen = counts.slice_mut(s![sx..sx + r0, sy..sy + r1, sz..sz + r2]);
                seen += 1.0;
            }
        }

        // Every voxel is covered by at least one window, so counts >= 1.
        let mut blended =
            accumulator.ok_or_else(|| SegError::invalid_input("no windows were scheduled"))?;
        for mut channel in blended.axis_iter_mut(Axis(0)) {
            channel /= &counts;
        }

        Ok(blended.slice(s![.., ..dx, ..dy, ..dz]).to_owned())
    }

    fn scan_interval(&self, roi: usize) -> usize {
        ((roi as f64 * (1.0 - self.overlap as f64)) as usize).max(1)
    }
}

/// Window start offsets along one dimension.
///
/// Starts advance by `interval` and the final window is clamped so it ends
/// exactly at the volume edge; a dimension no larger than the window gets a
/// single window at 0.
fn scan_starts(dim: usize, roi: usize, interval: usize) -> Vec<usize> {
    if dim <= roi {
        return vec![0];
    }
    let mut starts = Vec::new();
    let mut start = 0;
    loop {
        if start + roi >= dim {
            starts.push(dim - roi);
            break;
        }
        starts.push(start);
        start += interval;
    }
    starts
}
