use crate::geom::{AnyPt, CoordSys, Dim, DevicePt, ImagePt, ScreenPt, WorldPt, DTOR};
use crate::view::{Plot, PlotView};

/// Converts points among the four coordinate spaces of one plot layer:
/// image (pixel array), world (sky), screen (zoom-scaled, unrotated) and
/// device (after view rotation/flip/scroll).
///
/// Every conversion returns `None` rather than failing when the point has
/// no representation -- outside the projection domain, or no projection at
/// all. Callers treat absence as "do not draw".
pub struct CsysConverter<'a> {
    plot: &'a Plot,
    zoom: f64,
    scroll: (f64, f64),
    view_dim: Dim,
    rot_cos: f64,
    rot_sin: f64,
    rotated: bool,
    flip_y: bool,
}

impl<'a> CsysConverter<'a> {
    /// Converter for the prime plot of a view.
    pub fn new(pv: &'a PlotView) -> Option<Self> {
        pv.prime().map(|plot| Self::for_plot(pv, plot))
    }

    /// Converter for a specific layer, sharing the view's transform state.
    pub fn for_plot(pv: &PlotView, plot: &'a Plot) -> Self {
        let rad = pv.rotation_deg * DTOR;
        Self {
            plot,
            zoom: plot.zoom_factor,
            scroll: (pv.scroll_x, pv.scroll_y),
            view_dim: pv.view_dim,
            rot_cos: rad.cos(),
            rot_sin: rad.sin(),
            rotated: pv.rotation_deg != 0.0,
            flip_y: pv.flip_y,
        }
    }

    /// Recompute screen coordinates as if the plot were at a different zoom.
    /// Used by the thumbnail compositor.
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    //------------------------------------------------------------------
    // single-hop conversions
    //------------------------------------------------------------------

    fn image_to_screen(&self, ip: ImagePt) -> ScreenPt {
        ScreenPt::new(
            ip.x * self.zoom,
            (self.plot.data_height as f64 - ip.y) * self.zoom,
        )
    }

    fn screen_to_image(&self, sp: ScreenPt) -> ImagePt {
        ImagePt::new(
            sp.x / self.zoom,
            self.plot.data_height as f64 - sp.y / self.zoom,
        )
    }

    fn screen_to_device(&self, sp: ScreenPt) -> DevicePt {
        let mut x = sp.x - self.scroll.0;
        let mut y = sp.y - self.scroll.1;
        if self.flip_y {
            y = self.view_dim.height as f64 - y;
        }
        if self.rotated {
            let cx = self.view_dim.width as f64 / 2.0;
            let cy = self.view_dim.height as f64 / 2.0;
            let (dx, dy) = (x - cx, y - cy);
            x = cx + dx * self.rot_cos - dy * self.rot_sin;
            y = cy + dx * self.rot_sin + dy * self.rot_cos;
        }
        DevicePt::new(x, y)
    }

    fn device_to_screen(&self, dp: DevicePt) -> ScreenPt {
        let mut x = dp.x;
        let mut y = dp.y;
        if self.rotated {
            let cx = self.view_dim.width as f64 / 2.0;
            let cy = self.view_dim.height as f64 / 2.0;
            let (dx, dy) = (x - cx, y - cy);
            x = cx + dx * self.rot_cos + dy * self.rot_sin;
            y = cy - dx * self.rot_sin + dy * self.rot_cos;
        }
        if self.flip_y {
            y = self.view_dim.height as f64 - y;
        }
        ScreenPt::new(x + self.scroll.0, y + self.scroll.1)
    }

    fn world_to_image(&self, wp: WorldPt) -> Option<ImagePt> {
        let ip = self.plot.projection.as_ref()?.world_to_image(wp)?;
        // projection coords address pixel corners; shift to centers
        Some(ImagePt::new(ip.x + 0.5, ip.y + 0.5))
    }

    fn image_to_world(&self, ip: ImagePt) -> Option<WorldPt> {
        self.plot
            .projection
            .as_ref()?
            .image_to_world(ImagePt::new(ip.x - 0.5, ip.y - 0.5))
    }

    //------------------------------------------------------------------
    // public four-way API
    //------------------------------------------------------------------

    pub fn get_image_coords(&self, pt: impl Into<AnyPt>) -> Option<ImagePt> {
        match pt.into() {
            AnyPt::Image(ip) => Some(ip),
            AnyPt::Screen(sp) => Some(self.screen_to_image(sp)),
            AnyPt::Device(dp) => Some(self.screen_to_image(self.device_to_screen(dp))),
            AnyPt::World(wp) => self.world_to_image(wp),
        }
    }

    pub fn get_screen_coords(&self, pt: impl Into<AnyPt>) -> Option<ScreenPt> {
        match pt.into() {
            AnyPt::Screen(sp) => Some(sp),
            AnyPt::Image(ip) => Some(self.image_to_screen(ip)),
            AnyPt::Device(dp) => Some(self.device_to_screen(dp)),
            AnyPt::World(wp) => self.world_to_image(wp).map(|ip| self.image_to_screen(ip)),
        }
    }

    pub fn get_device_coords(&self, pt: impl Into<AnyPt>) -> Option<DevicePt> {
        match pt.into() {
            AnyPt::Device(dp) => Some(dp),
            other => self
                .get_screen_coords(other)
                .map(|sp| self.screen_to_device(sp)),
        }
    }

    pub fn get_world_coords(
        &self,
        pt: impl Into<AnyPt>,
        target: Option<CoordSys>,
    ) -> Option<WorldPt> {
        let wp = match pt.into() {
            AnyPt::World(wp) => Some(wp),
            other => self
                .get_image_coords(other)
                .and_then(|ip| self.image_to_world(ip)),
        }?;
        Some(match target {
            Some(sys) => wp.in_sys(sys),
            None => wp,
        })
    }

    /// Whether a device point lies within the viewport.
    pub fn device_pt_in_view(&self, dp: DevicePt) -> bool {
        dp.x >= 0.0
            && dp.y >= 0.0
            && dp.x <= self.view_dim.width as f64
            && dp.y <= self.view_dim.height as f64
    }
}
