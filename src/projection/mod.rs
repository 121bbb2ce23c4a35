mod aitoff;
mod sin;

use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::geom::{lonlat_to_vec3, vec3_to_lonlat, ImagePt, WorldPt, RTOD};

/// Sky projection family used for HiPS / all-sky plots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// Orthographic (SIN): near hemisphere only.
    Orthographic,
    /// Aitoff: equal-area whole sky, used when zoomed far out.
    Aitoff,
}

/// Spherical projection centered on a sky point, mapping world coordinates
/// to a plot's pixel grid through a plate scale.
///
/// Orientation is stored as a direction-cosine basis (three unit vectors)
/// built once at construction: `forward` points at the projection center,
/// `right` east, `up` north. Forward rotation is a dot product against each
/// basis vector; the inverse is the transpose combination.
#[derive(Clone, Debug)]
pub struct SkyProjection {
    kind: ProjectionKind,
    center: WorldPt,
    forward: DVec3,
    right: DVec3,
    up: DVec3,
    /// Plate scale in degrees per image pixel.
    cdelt_deg: f64,
    /// Reference pixel: projection center lands here in image coords.
    crpix: (f64, f64),
}

impl SkyProjection {
    pub fn new(kind: ProjectionKind, center: WorldPt, cdelt_deg: f64, crpix: (f64, f64)) -> Self {
        let lon_rad = center.lon.to_radians();
        let lat_rad = center.lat.to_radians();

        // Forward = direction from origin to the center on the unit sphere
        let forward = DVec3::new(
            lat_rad.cos() * lon_rad.cos(),
            lat_rad.cos() * lon_rad.sin(),
            lat_rad.sin(),
        );

        // Up = derivative of forward w.r.t. latitude (points north)
        let raw_up = DVec3::new(
            -lat_rad.sin() * lon_rad.cos(),
            -lat_rad.sin() * lon_rad.sin(),
            lat_rad.cos(),
        );

        // Right = forward x up (points east)
        let right = forward.cross(raw_up).normalize();
        let up = right.cross(forward).normalize();

        Self { kind, center, forward, right, up, cdelt_deg, crpix }
    }

    pub fn kind(&self) -> ProjectionKind {
        self.kind
    }

    pub fn center(&self) -> WorldPt {
        self.center
    }

    /// Plate scale in arcseconds per image pixel.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        self.cdelt_deg * 3600.0
    }

    /// Whether the projection wraps the whole sky (has a lon = +/-180 seam).
    pub fn is_wrapping(&self) -> bool {
        self.kind == ProjectionKind::Aitoff
    }

    /// Rotate a world unit vector into the projection frame:
    /// x = depth toward the viewer, y = east offset, z = north offset.
    #[inline]
    fn to_frame(&self, p: DVec3) -> DVec3 {
        DVec3::new(p.dot(self.forward), p.dot(self.right), p.dot(self.up))
    }

    /// Inverse frame rotation (transpose of `to_frame`).
    #[inline]
    fn from_frame(&self, r: DVec3) -> DVec3 {
        self.forward * r.x + self.right * r.y + self.up * r.z
    }

    /// Project sky lon/lat (degrees, projection-frame system) to plane
    /// coordinates. `None` when the point is outside the projection domain.
    pub fn world_to_plane(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let r = self.to_frame(lonlat_to_vec3(lon, lat));
        match self.kind {
            ProjectionKind::Orthographic => sin::project(r),
            ProjectionKind::Aitoff => aitoff::project(r),
        }
    }

    /// Unproject plane coordinates back to sky lon/lat in degrees.
    pub fn plane_to_world(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let r = match self.kind {
            ProjectionKind::Orthographic => sin::unproject(x, y)?,
            ProjectionKind::Aitoff => aitoff::unproject(x, y)?,
        };
        Some(vec3_to_lonlat(self.from_frame(r)))
    }

    /// World point to image pixel coordinates.
    pub fn world_to_image(&self, wp: WorldPt) -> Option<ImagePt> {
        let wp = wp.in_sys(self.center.csys);
        let (px, py) = self.world_to_plane(wp.lon, wp.lat)?;
        let scale = RTOD / self.cdelt_deg;
        Some(ImagePt::new(self.crpix.0 + px * scale, self.crpix.1 + py * scale))
    }

    /// Image pixel coordinates to a world point in the projection's system.
    pub fn image_to_world(&self, ip: ImagePt) -> Option<WorldPt> {
        let scale = self.cdelt_deg / RTOD;
        let px = (ip.x - self.crpix.0) * scale;
        let py = (ip.y - self.crpix.1) * scale;
        let (lon, lat) = self.plane_to_world(px, py)?;
        Some(WorldPt::new(lon, lat, self.center.csys))
    }
}

/// Opaque external WCS for image-backed plots. The server resolves the FITS
/// headers; this core only requires the four-way conversion contract.
pub trait WcsTransform: Send + Sync {
    fn world_to_image(&self, wp: WorldPt) -> Option<ImagePt>;
    fn image_to_world(&self, ip: ImagePt) -> Option<WorldPt>;
    /// Plate scale in arcseconds per image pixel.
    fn pixel_scale_arcsec(&self) -> f64;
}

/// The projection attached to a plot: a built-in sky projection for
/// HiPS layers, or an external WCS black box for image layers.
#[derive(Clone)]
pub enum PlotProjection {
    Sky(SkyProjection),
    External(Arc<dyn WcsTransform>),
}

impl PlotProjection {
    pub fn world_to_image(&self, wp: WorldPt) -> Option<ImagePt> {
        match self {
            PlotProjection::Sky(p) => p.world_to_image(wp),
            PlotProjection::External(w) => w.world_to_image(wp),
        }
    }

    pub fn image_to_world(&self, ip: ImagePt) -> Option<WorldPt> {
        match self {
            PlotProjection::Sky(p) => p.image_to_world(ip),
            PlotProjection::External(w) => w.image_to_world(ip),
        }
    }

    pub fn pixel_scale_arcsec(&self) -> f64 {
        match self {
            PlotProjection::Sky(p) => p.pixel_scale_arcsec(),
            PlotProjection::External(w) => w.pixel_scale_arcsec(),
        }
    }

    pub fn as_sky(&self) -> Option<&SkyProjection> {
        match self {
            PlotProjection::Sky(p) => Some(p),
            PlotProjection::External(_) => None,
        }
    }

    pub fn is_aitoff(&self) -> bool {
        matches!(self, PlotProjection::Sky(p) if p.kind == ProjectionKind::Aitoff)
    }
}
