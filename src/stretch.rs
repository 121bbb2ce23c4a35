//! Zscale: compute the optimal display range [z1, z2] of an image from an
//! evenly gridded statistical subsample. The sorted sample is fitted with
//! an iteratively reclipped straight line; the fitted slope, divided by the
//! contrast, sets the displayed range around the sample median. If more
//! than half the sample is rejected the full [min, max] range is used.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::view::PlotId;

const MIN_NPIXELS: usize = 5; // smallest permissible sample
const MAX_REJECT: f64 = 0.5; // max fraction of pixels to reject
const KREJ: f64 = 2.5; // k-sigma rejection factor
const MAX_ITERATIONS: usize = 5;
const INDEF: f64 = -999.0;

const GOOD_PIXEL: u8 = 0;
const BAD_PIXEL: u8 = 1;
const REJECT_PIXEL: u8 = 2;

/// Display stretch range for one plot/band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StretchRange {
    pub z1: f64,
    pub z2: f64,
}

/// Sampling and contrast parameters.
#[derive(Clone, Copy, Debug)]
pub struct ZscaleParams {
    /// Adjustment to the slope of the transfer function.
    pub contrast: f64,
    /// Desired number of pixels in the sample.
    pub opt_size: usize,
    /// Optimal number of pixels per sampled line.
    pub len_stdline: usize,
}

impl Default for ZscaleParams {
    fn default() -> Self {
        Self { contrast: 0.25, opt_size: 600, len_stdline: 120 }
    }
}

/// Compute the zscale stretch range of an `nx` x `ny` image. `blank`
/// values (and NaNs) are excluded from the sample. Never fails: degenerate
/// input falls back to the full data range.
pub fn zscale(
    data: &[f32],
    nx: usize,
    ny: usize,
    blank: Option<f32>,
    params: &ZscaleParams,
) -> StretchRange {
    let mut sample = sample_image(data, nx, ny, params.opt_size, params.len_stdline, blank);
    if sample.is_empty() {
        return StretchRange { z1: 0.0, z2: 0.0 };
    }

    // sort the sample; NaNs order to the end and bound the valid count
    sample.sort_unstable_by(f32::total_cmp);
    let mut npix = sample.len();
    if let Some(i) = sample.iter().position(|v| v.is_nan()) {
        if i > 0 {
            npix = i;
        }
    }

    let zmin = sample[0] as f64;
    let zmax = sample[npix - 1] as f64;

    // median: average of the two central values for an even count
    let center_pixel = 1.max((npix + 1) / 2);
    let left = center_pixel - 1;
    let median = if npix % 2 == 1 || center_pixel >= npix {
        sample[left] as f64
    } else {
        (sample[left] as f64 + sample[left + 1] as f64) / 2.0
    };

    let minpix = MIN_NPIXELS.max((npix as f64 * MAX_REJECT) as usize);
    let ngrow = 1.max((npix as f64 * 0.01).round() as usize);
    let fit = fit_line(&sample[..npix], KREJ, ngrow, MAX_ITERATIONS);

    if fit.ngoodpix < minpix {
        return StretchRange { z1: zmin, z2: zmax };
    }

    let mut zslope = fit.zslope;
    if params.contrast > 0.0 {
        zslope /= params.contrast;
    }
    StretchRange {
        z1: zmin.max(median - (center_pixel - 1) as f64 * zslope),
        z2: zmax.min(median + (npix - center_pixel) as f64 * zslope),
    }
}

/// Extract an evenly gridded subsample into a flat vector. The grid spans
/// every sampled line uniformly; blank values become NaN.
fn sample_image(
    data: &[f32],
    nx: usize,
    ny: usize,
    opt_size: usize,
    len_stdline: usize,
    blank: Option<f32>,
) -> Vec<f32> {
    if nx == 0 || ny == 0 || data.len() < nx * ny {
        return Vec::new();
    }

    let opt_npix_per_line = 1.max(nx.min(len_stdline));
    let col_step = 2.max(nx.div_ceil(opt_npix_per_line));
    let npix_per_line = 1.max(nx.div_ceil(col_step));

    // lower bound on sampled lines keeps large images adequately covered
    let min_nlines = 1.max(opt_size / len_stdline.max(1));
    let opt_nlines = min_nlines.max(ny.min(opt_size.div_ceil(npix_per_line)));
    let line_step = 2.max(ny / opt_nlines);
    let max_nlines = ny.div_ceil(line_step);
    let maxpix = npix_per_line * max_nlines;

    let mut sample = Vec::with_capacity(maxpix);
    let mut line = (line_step + 1) / 2;
    while line < ny {
        let row_start = (line - 1) * nx;
        for i in 0..npix_per_line {
            let v = data[row_start + i * col_step];
            let v = match blank {
                Some(b) if v == b => f32::NAN,
                _ => v,
            };
            sample.push(v);
        }
        if sample.len() > maxpix {
            break;
        }
        line += line_step;
    }
    sample
}

struct FitLine {
    ngoodpix: usize,
    zslope: f64,
}

/// Iteratively fit a straight line to the sorted sample, rejecting points
/// further than ksigma from the current fit each round. Converges when a
/// round rejects nothing more, or too few pixels remain.
fn fit_line(data: &[f32], krej: f64, ngrow: usize, maxiter: usize) -> FitLine {
    let npix = data.len();
    if npix == 0 {
        return FitLine { ngoodpix: 0, zslope: 0.0 };
    }
    if npix == 1 {
        return FitLine { ngoodpix: 1, zslope: 0.0 };
    }
    let xscale = 2.0 / (npix - 1) as f64;

    // normalized X in [-1, 1] diagonalizes the lsq matrix
    let normx: Vec<f64> = (0..npix).map(|i| i as f64 * xscale - 1.0).collect();

    let mut sumxsqr = 0.0;
    let mut sumxz = 0.0;
    let mut sumx = 0.0;
    let mut sumz = 0.0;
    for i in 0..npix {
        let x = normx[i];
        let z = data[i] as f64;
        sumxsqr += x * x;
        sumxz += z * x;
        sumz += z;
    }

    let mut z0 = sumz / npix as f64;
    let mut dz = sumxz / sumxsqr;
    let o_dz = dz;

    let mut badpix = vec![GOOD_PIXEL; npix];
    let mut ngoodpix = npix;
    let minpix = MIN_NPIXELS.max((npix as f64 * MAX_REJECT) as usize);

    for _ in 0..maxiter {
        let last_ngoodpix = ngoodpix;

        // residuals about the current fit
        let flat: Vec<f64> = (0..npix)
            .map(|i| data[i] as f64 - (normx[i] * dz + z0))
            .collect();

        let (_, sigma) = compute_sigma(&flat, &badpix);
        let threshold = sigma * krej;

        ngoodpix = reject_pixels(
            data, &flat, &normx, &mut badpix, threshold, ngrow,
            &mut sumxsqr, &mut sumxz, &mut sumx, &mut sumz,
        );

        // after rejection the X values no longer sum to zero
        if ngoodpix > 0 {
            let rowrat = sumx / sumxsqr;
            z0 = (sumz - rowrat * sumxz) / (ngoodpix as f64 - rowrat * sumx);
            dz = (sumxz - z0 * sumx) / sumxsqr;
        }

        if ngoodpix >= last_ngoodpix || ngoodpix < minpix {
            break;
        }
    }

    let mut zslope = dz * xscale;
    if zslope.abs() < 1e-10 {
        zslope = o_dz * xscale;
    }
    FitLine { ngoodpix, zslope }
}

/// Mean and rms deviation of the residual array, ignoring rejected pixels.
fn compute_sigma(a: &[f64], badpix: &[u8]) -> (f64, f64) {
    let mut ngoodpix = 0usize;
    let mut sum = 0.0;
    let mut sumsq = 0.0;
    for (v, flag) in a.iter().zip(badpix) {
        if *flag == GOOD_PIXEL {
            ngoodpix += 1;
            sum += v;
            sumsq += v * v;
        }
    }
    match ngoodpix {
        0 => (INDEF, INDEF),
        1 => (sum, INDEF),
        _ => {
            let n = ngoodpix as f64;
            let mean = sum / n;
            let temp = sumsq / (n - 1.0) - sum * sum / (n * (n - 1.0));
            let sigma = if temp < 0.0 { 0.0 } else { temp.sqrt() };
            (mean, sigma)
        }
    }
}

/// Reject pixels beyond `threshold` of the fitted line, growing each
/// rejection to `ngrow` neighbors and subtracting rejected contributions
/// from the matrix sums. Backward neighbors are rejected immediately;
/// forward neighbors are only marked and stay subject to thresholding on a
/// later pass, otherwise growing would not be symmetric.
#[allow(clippy::too_many_arguments)]
fn reject_pixels(
    data: &[f32],
    flat: &[f64],
    normx: &[f64],
    badpix: &mut [u8],
    threshold: f64,
    ngrow: usize,
    sumxsqr: &mut f64,
    sumxz: &mut f64,
    sumx: &mut f64,
    sumz: &mut f64,
) -> usize {
    let npix = data.len();
    let mut ngoodpix = npix;
    let lcut = -threshold;
    let hcut = threshold;

    for i in 0..npix {
        if badpix[i] == BAD_PIXEL {
            ngoodpix -= 1;
            continue;
        }
        let residual = flat[i];
        if residual < lcut || residual > hcut {
            for j in i.saturating_sub(ngrow)..(i + ngrow).min(npix) {
                if badpix[j] == BAD_PIXEL {
                    continue;
                }
                if j <= i {
                    let x = normx[j];
                    let z = data[j] as f64;
                    *sumxsqr -= x * x;
                    *sumxz -= z * x;
                    *sumx -= x;
                    *sumz -= z;
                    badpix[j] = BAD_PIXEL;
                    ngoodpix -= 1;
                } else {
                    badpix[j] = REJECT_PIXEL;
                }
            }
        }
    }
    ngoodpix
}

/// Color band of a plot's stretch state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    No,
    Red,
    Green,
    Blue,
}

/// Stretch ranges computed per plot/band, kept until invalidated by a
/// band or stretch change (or plot removal).
#[derive(Default)]
pub struct StretchCache {
    ranges: HashMap<(PlotId, Band), StretchRange>,
}

impl StretchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, plot_id: PlotId, band: Band) -> Option<StretchRange> {
        self.ranges.get(&(plot_id, band)).copied()
    }

    pub fn get_or_compute(
        &mut self,
        plot_id: PlotId,
        band: Band,
        compute: impl FnOnce() -> StretchRange,
    ) -> StretchRange {
        *self.ranges.entry((plot_id, band)).or_insert_with(compute)
    }

    pub fn invalidate(&mut self, plot_id: PlotId, band: Band) {
        self.ranges.remove(&(plot_id, band));
    }

    pub fn invalidate_plot(&mut self, plot_id: PlotId) {
        self.ranges.retain(|(id, _), _| *id != plot_id);
    }
}
