use log::debug;

use crate::geom::{DevicePt, WorldPt};
use crate::view::{CsysConverter, PlotView};

/// Margin (device pixels) used when clamping patched corners to the
/// viewport edge. Keeps the quad finite without caring where the limb
/// actually falls.
const EDGE_MARGIN: f64 = 50.0;

/// Above this field of view the Aitoff path skips per-cell culling: the
/// view is effectively whole-sky and every candidate is visible.
const WHOLE_SKY_FOV: f64 = 200.0;

/// Orders at or below this are subdivided when they straddle the
/// projection seam; deeper cells are kept whole and flagged.
const MAX_SPLIT_ORDER: u8 = 2;

/// A candidate HEALPix cell from the external geometry provider:
/// nested pixel index plus its four sky-space corners.
#[derive(Clone, Debug)]
pub struct CandidateCell {
    pub ipix: u64,
    pub corners: [WorldPt; 4],
}

/// External HEALPix geometry provider. The index math (nested scheme,
/// disc queries) lives outside this crate; the finder only needs candidate
/// enumeration and per-cell corners.
pub trait HealpixGeometry {
    /// Candidate cells at `order` whose footprint may intersect a cone of
    /// `fov_deg` around `center`.
    fn candidate_cells(&self, order: u8, center: WorldPt, fov_deg: f64) -> Vec<CandidateCell>;

    /// Sky corners of a single nested cell.
    fn cell_corners(&self, order: u8, ipix: u64) -> [WorldPt; 4];
}

/// A retained, renderable cell: either a device-space quad, or (when a
/// shallow cell straddled the projection seam) four sub-cells at the next
/// order.
#[derive(Clone, Debug)]
pub struct VisibleCell {
    pub ipix: u64,
    pub order: u8,
    /// Order at which the tile image should be fetched.
    pub tile_order: u8,
    pub device_corners: Option<[DevicePt; 4]>,
    pub sub_cells: Vec<VisibleCell>,
    /// Cell straddles the projection seam and needs special rendering.
    pub wrapping: bool,
    pub dx: i32,
    pub dy: i32,
}

impl VisibleCell {
    fn quad(ipix: u64, order: u8, tile_order: u8, corners: [DevicePt; 4], wrapping: bool) -> Self {
        Self {
            ipix,
            order,
            tile_order,
            device_corners: Some(corners),
            sub_cells: Vec::new(),
            wrapping,
            dx: 0,
            dy: 0,
        }
    }
}

/// Inputs for one visibility pass.
#[derive(Clone, Copy, Debug)]
pub struct CellFinderParams {
    /// HEALPix order at which cells are enumerated.
    pub order: u8,
    /// Order of the tile images to fetch (>= `order` for deep zooms).
    pub desired_order: u8,
    pub fov_deg: f64,
    pub center: WorldPt,
}

/// Field of view and sky center of the current viewport, the inputs the
/// finder (and grid overlays) need. Falls back to the projection center
/// when the viewport center does not unproject.
pub fn point_max_side(pv: &PlotView) -> Option<(f64, WorldPt)> {
    let plot = pv.prime()?;
    let cc = CsysConverter::new(pv)?;
    let scale_arcsec = plot.pixel_scale_arcsec()?;
    let max_side = pv.view_dim.width.max(pv.view_dim.height) as f64;
    let fov = (max_side * scale_arcsec / 3600.0 / plot.zoom_factor).min(360.0);
    let center_dev = DevicePt::new(
        pv.view_dim.width as f64 / 2.0,
        pv.view_dim.height as f64 / 2.0,
    );
    let center = cc
        .get_world_coords(center_dev, None)
        .or_else(|| plot.projection.as_ref()?.as_sky().map(|s| s.center()))?;
    Some((fov, center))
}

/// Enumerate the HEALPix cells visible in the view's prime (HiPS) plot and
/// compute a device-space polygon for each.
pub fn visible_hips_cells(
    provider: &dyn HealpixGeometry,
    pv: &PlotView,
    params: CellFinderParams,
) -> Vec<VisibleCell> {
    let Some(cc) = CsysConverter::new(pv) else {
        return Vec::new();
    };
    let Some(plot) = pv.prime() else {
        return Vec::new();
    };
    let aitoff = plot.projection.as_ref().is_some_and(|p| p.is_aitoff());
    let tile_order = params.desired_order.max(params.order);

    let candidates = provider.candidate_cells(params.order, params.center, params.fov_deg);
    let mut retained = Vec::with_capacity(candidates.len());

    for cell in candidates {
        let visible = if aitoff {
            aitoff_cell(provider, pv, &cc, &cell, params, tile_order)
        } else {
            patched_cell(pv, &cc, &cell, params.order, tile_order)
        };
        match visible {
            Some(vc) => retained.push(vc),
            None => debug!("dropped cell ipix={} order={}", cell.ipix, params.order),
        }
    }
    retained
}

//----------------------------------------------------------------------
// Aitoff path: whole-sky domain, but cells can straddle the lon seam
//----------------------------------------------------------------------

fn aitoff_cell(
    provider: &dyn HealpixGeometry,
    pv: &PlotView,
    cc: &CsysConverter,
    cell: &CandidateCell,
    params: CellFinderParams,
    tile_order: u8,
) -> Option<VisibleCell> {
    let wrapping = cell_wraps_seam(pv, cc, &cell.corners);

    if wrapping && params.order <= MAX_SPLIT_ORDER {
        // split into the four children for a cleaner polygon
        let child_order = params.order + 1;
        let mut subs = Vec::with_capacity(4);
        for k in 0..4 {
            let child_ipix = cell.ipix * 4 + k;
            let corners = provider.cell_corners(child_order, child_ipix);
            let Some(dev) = device_quad(cc, &corners) else {
                continue;
            };
            let child_wraps = cell_wraps_seam(pv, cc, &corners);
            if params.fov_deg > WHOLE_SKY_FOV || quad_on_screen(pv, &dev) {
                subs.push(VisibleCell::quad(
                    child_ipix,
                    child_order,
                    tile_order.max(child_order),
                    dev,
                    child_wraps,
                ));
            }
        }
        if subs.is_empty() {
            return None;
        }
        return Some(VisibleCell {
            ipix: cell.ipix,
            order: params.order,
            tile_order,
            device_corners: None,
            sub_cells: subs,
            wrapping: true,
            dx: 0,
            dy: 0,
        });
    }

    let dev = device_quad(cc, &cell.corners)?;
    if params.fov_deg > WHOLE_SKY_FOV || quad_on_screen(pv, &dev) {
        Some(VisibleCell::quad(cell.ipix, params.order, tile_order, dev, wrapping))
    } else {
        None
    }
}

/// A cell straddles the seam when its corners' image-space x extent spans
/// more than half the all-sky width: the corners landed on opposite sides
/// of the lon = +/-180 discontinuity.
fn cell_wraps_seam(pv: &PlotView, cc: &CsysConverter, corners: &[WorldPt; 4]) -> bool {
    let Some(plot) = pv.prime() else {
        return false;
    };
    let mut min_x = f64::MAX;
    let mut max_x = f64::MIN;
    for c in corners {
        match cc.get_image_coords(*c) {
            Some(ip) => {
                min_x = min_x.min(ip.x);
                max_x = max_x.max(ip.x);
            }
            None => return true,
        }
    }
    max_x - min_x > plot.data_width as f64 / 2.0
}

fn device_quad(cc: &CsysConverter, corners: &[WorldPt; 4]) -> Option<[DevicePt; 4]> {
    Some([
        cc.get_device_coords(corners[0])?,
        cc.get_device_coords(corners[1])?,
        cc.get_device_coords(corners[2])?,
        cc.get_device_coords(corners[3])?,
    ])
}

//----------------------------------------------------------------------
// Non-Aitoff path: tolerate up to two unprojectable corners per cell
//----------------------------------------------------------------------

fn patched_cell(
    pv: &PlotView,
    cc: &CsysConverter,
    cell: &CandidateCell,
    order: u8,
    tile_order: u8,
) -> Option<VisibleCell> {
    let converted: [Option<DevicePt>; 4] = [
        cc.get_device_coords(cell.corners[0]),
        cc.get_device_coords(cell.corners[1]),
        cc.get_device_coords(cell.corners[2]),
        cc.get_device_coords(cell.corners[3]),
    ];
    let missing = converted.iter().filter(|c| c.is_none()).count();
    if missing >= 3 {
        return None;
    }

    let view_center = DevicePt::new(
        pv.view_dim.width as f64 / 2.0,
        pv.view_dim.height as f64 / 2.0,
    );
    let mut dev = [DevicePt::new(0.0, 0.0); 4];
    for (i, c) in converted.iter().enumerate() {
        if let Some(p) = c {
            dev[i] = *p;
        }
    }
    for i in 0..4 {
        if converted[i].is_some() {
            continue;
        }
        let anchor = if missing == 1 {
            // single gap: extend past the opposite corner, away from center
            converted[(i + 2) % 4]
        } else {
            // two gaps: extend from the good neighbor on the other axis
            converted[(i + 1) % 4].or(converted[(i + 3) % 4])
        }?;
        dev[i] = extrapolate_past(anchor, view_center, pv);
    }

    if quad_on_screen(pv, &dev) {
        Some(VisibleCell::quad(cell.ipix, order, tile_order, dev, false))
    } else {
        None
    }
}

/// Continue from the view center through `anchor` an equal distance
/// beyond it, then clamp to the viewport edge plus margin.
fn extrapolate_past(anchor: DevicePt, center: DevicePt, pv: &PlotView) -> DevicePt {
    let x = anchor.x + (anchor.x - center.x);
    let y = anchor.y + (anchor.y - center.y);
    DevicePt::new(
        x.clamp(-EDGE_MARGIN, pv.view_dim.width as f64 + EDGE_MARGIN),
        y.clamp(-EDGE_MARGIN, pv.view_dim.height as f64 + EDGE_MARGIN),
    )
}

/// Bounding-box test of a device quad against the viewport rectangle.
fn quad_on_screen(pv: &PlotView, quad: &[DevicePt; 4]) -> bool {
    let mut min_x = f64::MAX;
    let mut max_x = f64::MIN;
    let mut min_y = f64::MAX;
    let mut max_y = f64::MIN;
    for p in quad {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    max_x >= 0.0
        && min_x <= pv.view_dim.width as f64
        && max_y >= 0.0
        && min_y <= pv.view_dim.height as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{CoordSys, Dim};
    use crate::projection::{PlotProjection, ProjectionKind, SkyProjection};
    use crate::view::{Plot, PlotKind, PlotId, PlotViewArena, Rotation};
    use std::collections::HashMap;

    /// Provider that hands out quads of `size` degrees around fixed centers.
    struct QuadProvider {
        centers: Vec<(f64, f64)>,
        size: f64,
    }

    fn quad_corners(lon: f64, lat: f64, h: f64) -> [WorldPt; 4] {
        [
            WorldPt::j2000(lon - h, lat - h),
            WorldPt::j2000(lon + h, lat - h),
            WorldPt::j2000(lon + h, lat + h),
            WorldPt::j2000(lon - h, lat + h),
        ]
    }

    impl HealpixGeometry for QuadProvider {
        fn candidate_cells(&self, _order: u8, _center: WorldPt, _fov: f64) -> Vec<CandidateCell> {
            self.centers
                .iter()
                .enumerate()
                .map(|(i, &(lon, lat))| CandidateCell {
                    ipix: i as u64,
                    corners: quad_corners(lon, lat, self.size / 2.0),
                })
                .collect()
        }

        fn cell_corners(&self, _order: u8, ipix: u64) -> [WorldPt; 4] {
            // children are the parent quad's quadrants
            let (lon, lat) = self.centers[(ipix / 4) as usize];
            let k = ipix % 4;
            let h = self.size / 4.0;
            let lon_off = if k % 2 == 0 { -h } else { h };
            let lat_off = if k < 2 { -h } else { h };
            quad_corners(lon + lon_off, lat + lat_off, h)
        }
    }

    fn hips_plot(kind: ProjectionKind, center_lon: f64, width: u32, height: u32) -> Plot {
        // plate scale that fits the whole aitoff ellipse into the grid
        let cdelt = 4.0 * std::f64::consts::SQRT_2 * crate::geom::RTOD / width as f64;
        Plot {
            kind: PlotKind::Hips,
            data_width: width,
            data_height: height,
            zoom_factor: 1.0,
            projection: Some(PlotProjection::Sky(SkyProjection::new(
                kind,
                WorldPt::j2000(center_lon, 0.0),
                cdelt,
                (width as f64 / 2.0, height as f64 / 2.0),
            ))),
            rotation: Rotation::Unrotated,
            coord_sys: CoordSys::EquatorialJ2000,
            attributes: HashMap::new(),
        }
    }

    fn hips_view(plot: Plot) -> (PlotViewArena, PlotId) {
        let mut arena = PlotViewArena::new();
        let id = arena.create_view(Dim::new(1024, 512));
        arena.view_mut(id).unwrap().push_plot(plot);
        (arena, id)
    }

    #[test]
    fn test_whole_sky_aitoff_retains_every_candidate() {
        let provider = QuadProvider {
            centers: vec![(0.0, 0.0), (90.0, 30.0), (250.0, -45.0), (300.0, 80.0)],
            size: 10.0,
        };
        let (arena, id) = hips_view(hips_plot(ProjectionKind::Aitoff, 0.0, 1024, 512));
        let cells = visible_hips_cells(
            &provider,
            arena.view(id).unwrap(),
            CellFinderParams {
                order: 3,
                desired_order: 3,
                fov_deg: 360.0,
                center: WorldPt::j2000(0.0, 0.0),
            },
        );
        assert_eq!(cells.len(), 4);
        assert!(cells.iter().all(|c| c.dx == 0 && c.dy == 0));
    }

    #[test]
    fn test_seam_cell_flagged_at_deep_order() {
        // center lon 0 puts the seam at lon 180; this cell straddles it
        let provider = QuadProvider { centers: vec![(180.0, 0.0)], size: 8.0 };
        let (arena, id) = hips_view(hips_plot(ProjectionKind::Aitoff, 0.0, 1024, 512));
        let cells = visible_hips_cells(
            &provider,
            arena.view(id).unwrap(),
            CellFinderParams {
                order: 3,
                desired_order: 3,
                fov_deg: 360.0,
                center: WorldPt::j2000(0.0, 0.0),
            },
        );
        assert_eq!(cells.len(), 1);
        assert!(cells[0].wrapping);
        assert!(cells[0].sub_cells.is_empty());
    }

    #[test]
    fn test_seam_cell_subdivided_at_shallow_order() {
        let provider = QuadProvider { centers: vec![(180.0, 0.0)], size: 8.0 };
        let (arena, id) = hips_view(hips_plot(ProjectionKind::Aitoff, 0.0, 1024, 512));
        let cells = visible_hips_cells(
            &provider,
            arena.view(id).unwrap(),
            CellFinderParams {
                order: 2,
                desired_order: 2,
                fov_deg: 360.0,
                center: WorldPt::j2000(0.0, 0.0),
            },
        );
        assert_eq!(cells.len(), 1);
        assert!(cells[0].wrapping);
        assert!(cells[0].device_corners.is_none());
        assert_eq!(cells[0].sub_cells.len(), 4);
        assert!(cells[0].sub_cells.iter().all(|s| s.order == 3));
    }

    #[test]
    fn test_sin_drops_far_hemisphere_and_culls_on_screen() {
        let provider = QuadProvider {
            // near center, off the viewport edge, and far hemisphere
            centers: vec![(10.0, 10.0), (11.0, 10.5), (190.0, -10.0)],
            size: 2.0,
        };
        let mut plot = hips_plot(ProjectionKind::Orthographic, 10.0, 1024, 512);
        plot.projection = Some(PlotProjection::Sky(SkyProjection::new(
            ProjectionKind::Orthographic,
            WorldPt::j2000(10.0, 10.0),
            4.0 / 3600.0,
            (512.0, 256.0),
        )));
        let (arena, id) = hips_view(plot);
        let pv = arena.view(id).unwrap();
        let cells = visible_hips_cells(
            &provider,
            pv,
            CellFinderParams {
                order: 4,
                desired_order: 4,
                fov_deg: 2.0,
                center: WorldPt::j2000(10.0, 10.0),
            },
        );
        // far-hemisphere cell dropped (all corners unprojectable)
        assert!(cells.len() < 3);
        for cell in &cells {
            let quad = cell.device_corners.unwrap();
            assert!(quad_on_screen(pv, &quad));
        }
    }

    #[test]
    fn test_limb_cells_patched_not_dropped() {
        // wide-field SIN view reaching the projection limb: cells with one
        // or two unprojectable corners are patched and kept
        let provider = QuadProvider {
            centers: vec![(100.0, 10.0), (102.0, 10.0)],
            size: 4.0,
        };
        let mut plot = hips_plot(ProjectionKind::Orthographic, 10.0, 1024, 512);
        plot.projection = Some(PlotProjection::Sky(SkyProjection::new(
            ProjectionKind::Orthographic,
            WorldPt::j2000(10.0, 10.0),
            0.25, // degrees per pixel: the whole hemisphere fits on screen
            (512.0, 256.0),
        )));
        let (arena, id) = hips_view(plot);
        let pv = arena.view(id).unwrap();
        let cc = CsysConverter::new(pv).unwrap();

        // sanity: the first cell loses one corner, the second loses two
        let cells_in = provider.candidate_cells(4, WorldPt::j2000(10.0, 10.0), 60.0);
        let lost = |cell: &CandidateCell| {
            cell.corners.iter().filter(|c| cc.get_device_coords(**c).is_none()).count()
        };
        assert_eq!(lost(&cells_in[0]), 1);
        assert_eq!(lost(&cells_in[1]), 2);

        let cells = visible_hips_cells(
            &provider,
            pv,
            CellFinderParams {
                order: 4,
                desired_order: 4,
                fov_deg: 60.0,
                center: WorldPt::j2000(10.0, 10.0),
            },
        );
        assert_eq!(cells.len(), 2);
        for cell in &cells {
            let quad = cell.device_corners.unwrap();
            // patched corners stay within the viewport edge margin
            for p in quad {
                assert!(p.x >= -50.0 && p.x <= 1024.0 + 50.0);
                assert!(p.y >= -50.0 && p.y <= 512.0 + 50.0);
            }
        }
    }

    #[test]
    fn test_tile_order_follows_desired_order() {
        let provider = QuadProvider { centers: vec![(0.0, 0.0)], size: 10.0 };
        let (arena, id) = hips_view(hips_plot(ProjectionKind::Aitoff, 0.0, 1024, 512));
        let cells = visible_hips_cells(
            &provider,
            arena.view(id).unwrap(),
            CellFinderParams {
                order: 3,
                desired_order: 6,
                fov_deg: 360.0,
                center: WorldPt::j2000(0.0, 0.0),
            },
        );
        assert_eq!(cells[0].tile_order, 6);
    }
}
