pub mod converter;
pub mod zoom;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::{CoordSys, Dim, ImagePt, ScreenPt};
use crate::projection::PlotProjection;

pub use converter::CsysConverter;

/// Identifies a `PlotView` (and correlates its async events/commands).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlotId(pub u32);

impl std::fmt::Display for PlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "plot-{}", self.0)
    }
}

/// Identifies a group of PlotViews that share broadcast commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// Whether a command targets one PlotView or its whole group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionScope {
    Group,
    Single,
}

/// Kind of layer a plot holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotKind {
    Image,
    Hips,
}

/// Rotation state of a plot layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Rotation {
    Unrotated,
    NorthUp,
    /// Fixed rotation angle in degrees.
    Angle(f64),
}

impl Rotation {
    pub fn is_north_up(&self) -> bool {
        matches!(self, Rotation::NorthUp)
    }
}

/// One image or sky-survey layer.
#[derive(Clone)]
pub struct Plot {
    pub kind: PlotKind,
    pub data_width: u32,
    pub data_height: u32,
    pub zoom_factor: f64,
    pub projection: Option<PlotProjection>,
    pub rotation: Rotation,
    pub coord_sys: CoordSys,
    /// Selection state, fixed target, etc. set by the host.
    pub attributes: HashMap<String, String>,
}

impl Plot {
    /// Plate scale in arcsec/pixel, when a projection is attached.
    pub fn pixel_scale_arcsec(&self) -> Option<f64> {
        self.projection.as_ref().map(|p| p.pixel_scale_arcsec())
    }

    /// Screen dimensions of the full data grid at the current zoom.
    pub fn screen_size(&self) -> (f64, f64) {
        (
            self.data_width as f64 * self.zoom_factor,
            self.data_height as f64 * self.zoom_factor,
        )
    }
}

/// A viewport over an ordered stack of plot layers, exactly one of which
/// is prime (the active layer).
#[derive(Clone)]
pub struct PlotView {
    pub id: PlotId,
    plots: Vec<Plot>,
    prime_index: usize,
    pub scroll_x: f64,
    pub scroll_y: f64,
    /// View rotation applied on top of the screen coordinates, degrees.
    pub rotation_deg: f64,
    pub flip_y: bool,
    pub view_dim: Dim,
    pub group: Option<GroupId>,
    pub zoom_locked: bool,
}

impl PlotView {
    pub fn plots(&self) -> &[Plot] {
        &self.plots
    }

    pub fn prime_index(&self) -> usize {
        self.prime_index
    }

    pub fn prime(&self) -> Option<&Plot> {
        self.plots.get(self.prime_index)
    }

    pub fn prime_mut(&mut self) -> Option<&mut Plot> {
        self.plots.get_mut(self.prime_index)
    }

    pub fn layer(&self, index: usize) -> Option<&Plot> {
        self.plots.get(index)
    }

    pub fn set_prime(&mut self, index: usize) -> Result<(), ViewError> {
        if index >= self.plots.len() {
            return Err(ViewError::LayerOutOfRange { index, len: self.plots.len() });
        }
        self.prime_index = index;
        Ok(())
    }

    pub fn push_plot(&mut self, plot: Plot) {
        self.plots.push(plot);
    }

    pub fn remove_plot(&mut self, index: usize) -> Result<Plot, ViewError> {
        if index >= self.plots.len() {
            return Err(ViewError::LayerOutOfRange { index, len: self.plots.len() });
        }
        let removed = self.plots.remove(index);
        if self.prime_index >= self.plots.len() && self.prime_index > 0 {
            self.prime_index = self.plots.len() - 1;
        }
        Ok(removed)
    }

    /// Dimensions of the scroll window: the viewport, or the whole plot
    /// when the plot is smaller on an axis.
    pub fn scroll_window(&self) -> (f64, f64) {
        match self.prime() {
            Some(p) => {
                let (sw, sh) = p.screen_size();
                (
                    sw.min(self.view_dim.width as f64),
                    sh.min(self.view_dim.height as f64),
                )
            }
            None => (self.view_dim.width as f64, self.view_dim.height as f64),
        }
    }

    /// Image point of the prime plot currently under the scroll anchor
    /// (the center of the scroll window). This is the point a zoom or
    /// rotation must keep fixed.
    pub fn find_current_center_point(&self) -> Option<ImagePt> {
        let plot = self.prime()?;
        let (screen_w, screen_h) = plot.screen_size();
        let (sw, sh) = self.scroll_window();
        let cx = if screen_w < sw { screen_w / 2.0 } else { self.scroll_x + sw / 2.0 };
        let cy = if screen_h < sh { screen_h / 2.0 } else { self.scroll_y + sh / 2.0 };
        CsysConverter::new(self)?.get_image_coords(ScreenPt::new(cx, cy))
    }

    /// Scroll position that puts `ipt` back under the scroll anchor,
    /// clamped to the plot bounds.
    pub fn find_scroll_pt_for_image_pt(&self, ipt: ImagePt) -> Option<ScreenPt> {
        let plot = self.prime()?;
        let sp = CsysConverter::new(self)?.get_screen_coords(ipt)?;
        let (screen_w, screen_h) = plot.screen_size();
        let (sw, sh) = self.scroll_window();
        let sx = (sp.x - sw / 2.0).clamp(0.0, (screen_w - sw).max(0.0));
        let sy = (sp.y - sh / 2.0).clamp(0.0, (screen_h - sh).max(0.0));
        Some(ScreenPt::new(sx, sy))
    }

    /// Fractional scroll-center position, for matching scroll across a
    /// group of views with different screen sizes.
    pub fn scroll_percent(&self) -> Option<(f64, f64)> {
        let plot = self.prime()?;
        let (screen_w, screen_h) = plot.screen_size();
        let (sw, sh) = self.scroll_window();
        Some(((self.scroll_x + sw / 2.0) / screen_w, (self.scroll_y + sh / 2.0) / screen_h))
    }

    /// Apply a fractional scroll-center position from another view.
    pub fn match_scroll_percent(&mut self, percent: (f64, f64)) {
        if let Some(plot) = self.prime() {
            let (screen_w, screen_h) = plot.screen_size();
            let (sw, sh) = self.scroll_window();
            self.scroll_x = (screen_w * percent.0 - sw / 2.0).clamp(0.0, (screen_w - sw).max(0.0));
            self.scroll_y = (screen_h * percent.1 - sh / 2.0).clamp(0.0, (screen_h - sh).max(0.0));
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("unknown plot view {0}")]
    UnknownPlotView(PlotId),
    #[error("layer index {index} out of range for {len} layers")]
    LayerOutOfRange { index: usize, len: usize },
    #[error("plot view {0} has no layers")]
    NoLayers(PlotId),
}

/// Owns every PlotView plus the group membership map. Views reference
/// groups by id and groups reference views by id -- no object cycles.
#[derive(Default)]
pub struct PlotViewArena {
    views: HashMap<PlotId, PlotView>,
    groups: HashMap<GroupId, HashSet<PlotId>>,
    next_id: u32,
}

impl PlotViewArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty PlotView (done on the first plot request).
    pub fn create_view(&mut self, view_dim: Dim) -> PlotId {
        let id = PlotId(self.next_id);
        self.next_id += 1;
        self.views.insert(
            id,
            PlotView {
                id,
                plots: Vec::new(),
                prime_index: 0,
                scroll_x: 0.0,
                scroll_y: 0.0,
                rotation_deg: 0.0,
                flip_y: false,
                view_dim,
                group: None,
                zoom_locked: false,
            },
        );
        id
    }

    pub fn view(&self, id: PlotId) -> Option<&PlotView> {
        self.views.get(&id)
    }

    pub fn view_mut(&mut self, id: PlotId) -> Option<&mut PlotView> {
        self.views.get_mut(&id)
    }

    /// Destroy a view (viewer close), dropping its group membership.
    pub fn remove_view(&mut self, id: PlotId) -> Option<PlotView> {
        let view = self.views.remove(&id)?;
        if let Some(gid) = view.group {
            if let Some(members) = self.groups.get_mut(&gid) {
                members.remove(&id);
                if members.is_empty() {
                    self.groups.remove(&gid);
                }
            }
        }
        Some(view)
    }

    pub fn join_group(&mut self, id: PlotId, group: GroupId) -> Result<(), ViewError> {
        let view = self.views.get_mut(&id).ok_or(ViewError::UnknownPlotView(id))?;
        if let Some(old) = view.group.replace(group) {
            if let Some(members) = self.groups.get_mut(&old) {
                members.remove(&id);
            }
        }
        self.groups.entry(group).or_default().insert(id);
        Ok(())
    }

    pub fn group_members(&self, group: GroupId) -> impl Iterator<Item = PlotId> + '_ {
        self.groups.get(&group).into_iter().flatten().copied()
    }

    pub fn views(&self) -> impl Iterator<Item = &PlotView> {
        self.views.values()
    }
}

/// Image plot with a SIN projection centered at (10, 10), for tests
/// across the crate.
#[cfg(test)]
pub(crate) fn test_plot(width: u32, height: u32, zoom: f64, arcsec_per_pix: f64) -> Plot {
    use crate::geom::WorldPt;
    use crate::projection::{ProjectionKind, SkyProjection};

    let crpix = (width as f64 / 2.0, height as f64 / 2.0);
    Plot {
        kind: PlotKind::Image,
        data_width: width,
        data_height: height,
        zoom_factor: zoom,
        projection: Some(PlotProjection::Sky(SkyProjection::new(
            ProjectionKind::Orthographic,
            WorldPt::j2000(10.0, 10.0),
            arcsec_per_pix / 3600.0,
            crpix,
        ))),
        rotation: Rotation::Unrotated,
        coord_sys: CoordSys::EquatorialJ2000,
        attributes: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_prime_per_view() {
        let mut arena = PlotViewArena::new();
        let id = arena.create_view(Dim::new(800, 600));
        let pv = arena.view_mut(id).unwrap();
        pv.push_plot(test_plot(100, 100, 1.0, 1.0));
        pv.push_plot(test_plot(200, 200, 1.0, 0.5));
        assert_eq!(pv.prime_index(), 0);
        pv.set_prime(1).unwrap();
        assert_eq!(pv.prime_index(), 1);
        assert_eq!(pv.set_prime(2), Err(ViewError::LayerOutOfRange { index: 2, len: 2 }));
    }

    #[test]
    fn test_center_point_round_trip() {
        let mut arena = PlotViewArena::new();
        let id = arena.create_view(Dim::new(400, 400));
        let pv = arena.view_mut(id).unwrap();
        pv.push_plot(test_plot(1000, 1000, 1.0, 1.0));
        pv.scroll_x = 120.0;
        pv.scroll_y = 80.0;
        let center = pv.find_current_center_point().unwrap();
        let scroll = pv.find_scroll_pt_for_image_pt(center).unwrap();
        assert!((scroll.x - 120.0).abs() < 1e-9);
        assert!((scroll.y - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_remove_plot_clamps_prime() {
        let mut arena = PlotViewArena::new();
        let id = arena.create_view(Dim::new(100, 100));
        let pv = arena.view_mut(id).unwrap();
        pv.push_plot(test_plot(10, 10, 1.0, 1.0));
        pv.push_plot(test_plot(20, 20, 1.0, 1.0));
        pv.set_prime(1).unwrap();
        pv.remove_plot(1).unwrap();
        assert_eq!(pv.prime_index(), 0);
        assert_eq!(pv.plots().len(), 1);
    }

    #[test]
    fn test_group_scroll_matching() {
        let mut arena = PlotViewArena::new();
        let a = arena.create_view(Dim::new(400, 400));
        let b = arena.create_view(Dim::new(400, 400));
        {
            let pv = arena.view_mut(a).unwrap();
            pv.push_plot(test_plot(1000, 1000, 1.0, 1.0));
            pv.scroll_x = 100.0;
            pv.scroll_y = 200.0;
        }
        let percent = arena.view(a).unwrap().scroll_percent().unwrap();
        {
            let pv = arena.view_mut(b).unwrap();
            pv.push_plot(test_plot(2000, 2000, 1.0, 0.5));
            pv.match_scroll_percent(percent);
            // same fractional center: (100+200)/1000 = (x+200)/2000
            assert!((pv.scroll_x - 400.0).abs() < 1e-9);
            assert!((pv.scroll_y - 600.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_group_membership_cleared_on_remove() {
        let mut arena = PlotViewArena::new();
        let a = arena.create_view(Dim::new(100, 100));
        let b = arena.create_view(Dim::new(100, 100));
        arena.join_group(a, GroupId(1)).unwrap();
        arena.join_group(b, GroupId(1)).unwrap();
        assert_eq!(arena.group_members(GroupId(1)).count(), 2);
        arena.remove_view(a);
        assert_eq!(arena.group_members(GroupId(1)).count(), 1);
    }
}
