use serde::{Deserialize, Serialize};

use crate::geom::Dim;
use crate::view::{Plot, PlotKind};

/// Direction of a step through the zoom-level table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoomDir {
    Up,
    Down,
}

/// Which viewport axis a fit-to-view zoom should match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullType {
    OnlyWidth,
    WidthHeight,
    OnlyHeight,
}

/// Discrete zoom-level tables and scale conversions.
///
/// Every zoom request is quantized to a table entry (or an interpolation
/// between two adjacent entries) so zoom factors stay reproducible across
/// plots and sessions. Images use a fine-grained table; HiPS layers use a
/// geometric table reflecting HEALPix order doubling. Both tables are built
/// once at construction and are strictly ascending.
pub struct ZoomPolicy {
    image_levels: Vec<f64>,
    hips_levels: Vec<f64>,
}

impl ZoomPolicy {
    pub fn new() -> Self {
        let image_levels = vec![
            0.0125, 0.025, 0.03125, 0.05, 0.0625, 0.125, 0.25, 0.5, 0.75, 1.0, 2.0, 3.0, 4.0,
            5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 32.0,
        ];

        // HiPS levels step x1.5 up / x0.75 down from 1x; two up-steps
        // roughly track one HEALPix order doubling.
        let mut hips_levels = Vec::new();
        let mut v = 1.0;
        loop {
            v *= 0.75;
            if v < 0.001 {
                break;
            }
            hips_levels.push(v);
        }
        hips_levels.reverse();
        hips_levels.push(1.0);
        v = 1.0;
        loop {
            v *= 1.5;
            if v > 2048.0 {
                break;
            }
            hips_levels.push(v);
        }

        Self { image_levels, hips_levels }
    }

    pub fn levels(&self, kind: PlotKind) -> &[f64] {
        match kind {
            PlotKind::Image => &self.image_levels,
            PlotKind::Hips => &self.hips_levels,
        }
    }

    /// Next table entry strictly above/below the plot's current factor.
    /// `fraction < 1` interpolates linearly toward that entry (smooth
    /// zoom); the result clamps at the table bounds.
    pub fn next_zoom_level(&self, plot: &Plot, dir: ZoomDir, fraction: f64) -> f64 {
        let levels = self.levels(plot.kind);
        let cur = plot.zoom_factor;
        let target = match dir {
            ZoomDir::Up => {
                let max = *levels.last().unwrap_or(&1.0);
                if cur >= max {
                    return max;
                }
                levels.iter().copied().find(|l| *l > cur).unwrap_or(max)
            }
            ZoomDir::Down => {
                let min = *levels.first().unwrap_or(&1.0);
                if cur <= min {
                    return min;
                }
                levels.iter().rev().copied().find(|l| *l < cur).unwrap_or(min)
            }
        };
        if fraction < 1.0 {
            cur + (target - cur) * fraction
        } else {
            target
        }
    }

    /// Zoom factor that fits the plot's data into the viewport on the
    /// requested axis/axes. Aitoff HiPS plots get an aspect correction:
    /// the all-sky ellipse is 2:1, so the width factor widens by 2.7 and
    /// the height factor tightens by 0.7.
    pub fn estimated_full_zoom_factor(
        &self,
        plot: &Plot,
        view_dim: Dim,
        full_type: FullType,
    ) -> f64 {
        let dw = plot.data_width as f64;
        let dh = plot.data_height as f64;
        let vw = view_dim.width as f64;
        let vh = view_dim.height as f64;
        let aitoff = plot.kind == PlotKind::Hips
            && plot.projection.as_ref().is_some_and(|p| p.is_aitoff());
        let (wf, hf) = if aitoff { (2.7, 0.7) } else { (1.0, 1.0) };

        if full_type == FullType::OnlyWidth || vh <= 0.0 || dh <= 0.0 {
            vw / dw * wf
        } else if full_type == FullType::OnlyHeight || vw <= 0.0 || dw <= 0.0 {
            vh / dh * hf
        } else {
            (vw / dw * wf).min(vh / dh * hf)
        }
    }

    /// Sky scale currently displayed: arcsec per screen pixel at `zoom`.
    /// `None` when the plot carries no projection.
    pub fn arcsec_per_pix(plot: &Plot, zoom: f64) -> Option<f64> {
        plot.pixel_scale_arcsec().map(|scale| scale / zoom)
    }

    /// Zoom level at which this plot matches a given displayed sky scale.
    /// This -- not nominal zoom level -- is the correct criterion for
    /// matching visual scale across plots of different native resolution.
    pub fn zoom_level_for_scale(plot: &Plot, arcsec_per_pix: f64) -> Option<f64> {
        let scale = plot.pixel_scale_arcsec()?;
        if scale == 0.0 {
            return None;
        }
        Some(arcsec_per_pix / scale)
    }
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable zoom label. Exact binary fractions down to 1/256 get
/// dedicated glyphs; everything else uses adaptive precision.
pub fn zoom_to_string(level: f64) -> String {
    let zf = (level * 10000.0).floor() as i64;
    match zf {
        39 => "1/256x".into(),
        78 => "1/128x".into(),
        156 => "1/64x".into(),
        312 => "1/32x".into(),
        625 => "1/16x".into(),
        1250 => "1/8x".into(),
        2500 => "\u{00bc}x".into(),
        5000 => "\u{00bd}x".into(),
        7500 => "\u{00be}x".into(),
        _ if zf >= 10000 => {
            let remainder = level % 1.0;
            if remainder < 0.1 || remainder > 0.9 {
                format!("{}x", level.round() as i64)
            } else {
                format!("{level:.1}x")
            }
        }
        _ if level < 0.125 => format!("{level:.3}x"),
        _ => format!("{level:.1}x"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::test_plot;

    fn plot_at(zoom: f64) -> Plot {
        let mut p = test_plot(1000, 1000, zoom, 1.0);
        p.zoom_factor = zoom;
        p
    }

    #[test]
    fn test_tables_strictly_ascending() {
        let zp = ZoomPolicy::new();
        for levels in [zp.levels(PlotKind::Image), zp.levels(PlotKind::Hips)] {
            assert!(levels.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_next_level_clamps_at_bounds() {
        let zp = ZoomPolicy::new();
        assert_eq!(zp.next_zoom_level(&plot_at(32.0), ZoomDir::Up, 1.0), 32.0);
        assert_eq!(zp.next_zoom_level(&plot_at(0.0125), ZoomDir::Down, 1.0), 0.0125);
        assert_eq!(zp.next_zoom_level(&plot_at(100.0), ZoomDir::Up, 1.0), 32.0);
    }

    #[test]
    fn test_next_level_steps_table() {
        let zp = ZoomPolicy::new();
        assert_eq!(zp.next_zoom_level(&plot_at(1.0), ZoomDir::Up, 1.0), 2.0);
        assert_eq!(zp.next_zoom_level(&plot_at(1.0), ZoomDir::Down, 1.0), 0.75);
        // strictly above/below: a factor between entries snaps outward
        assert_eq!(zp.next_zoom_level(&plot_at(1.3), ZoomDir::Up, 1.0), 2.0);
        assert_eq!(zp.next_zoom_level(&plot_at(1.3), ZoomDir::Down, 1.0), 1.0);
    }

    #[test]
    fn test_fractional_step_interpolates() {
        let zp = ZoomPolicy::new();
        let half = zp.next_zoom_level(&plot_at(1.0), ZoomDir::Up, 0.5);
        assert!((half - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_hips_levels_geometric() {
        let zp = ZoomPolicy::new();
        let levels = zp.levels(PlotKind::Hips);
        let one = levels.iter().position(|l| (*l - 1.0).abs() < 1e-12).unwrap();
        assert!((levels[one + 1] - 1.5).abs() < 1e-12);
        assert!((levels[one - 1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_full_zoom_factor() {
        let zp = ZoomPolicy::new();
        let p = plot_at(1.0); // 1000x1000
        let dim = Dim::new(500, 250);
        assert_eq!(zp.estimated_full_zoom_factor(&p, dim, FullType::OnlyWidth), 0.5);
        assert_eq!(zp.estimated_full_zoom_factor(&p, dim, FullType::OnlyHeight), 0.25);
        assert_eq!(zp.estimated_full_zoom_factor(&p, dim, FullType::WidthHeight), 0.25);
    }

    #[test]
    fn test_zoom_strings() {
        assert_eq!(zoom_to_string(1.0 / 256.0), "1/256x");
        assert_eq!(zoom_to_string(1.0 / 32.0), "1/32x");
        assert_eq!(zoom_to_string(0.25), "\u{00bc}x");
        assert_eq!(zoom_to_string(0.75), "\u{00be}x");
        assert_eq!(zoom_to_string(0.0671), "0.067x");
        assert_eq!(zoom_to_string(0.3), "0.3x");
        assert_eq!(zoom_to_string(3.0), "3x");
        assert_eq!(zoom_to_string(2.5), "2.5x");
        assert_eq!(zoom_to_string(7.95), "8x");
    }

    #[test]
    fn test_scale_conversions() {
        let p = test_plot(1000, 1000, 1.0, 1.0); // 1 arcsec/pixel
        let aspp = ZoomPolicy::arcsec_per_pix(&p, 2.0).unwrap();
        assert!((aspp - 0.5).abs() < 1e-12);
        // a 0.5 arcsec/pixel plot matching a displayed 1.0 arcsec/pixel
        let fine = test_plot(1000, 1000, 1.0, 0.5);
        let target = ZoomPolicy::zoom_level_for_scale(&fine, 1.0).unwrap();
        assert!((target - 2.0).abs() < 1e-12);
    }
}
