use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Degrees-to-radians factor, computed once for the whole crate.
pub const DTOR: f64 = PI / 180.0;
/// Radians-to-degrees factor.
pub const RTOD: f64 = 180.0 / PI;

/// Sky coordinate system tag carried by every world point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordSys {
    EquatorialJ2000,
    Galactic,
}

/// A point on the sky: lon/lat in degrees plus its coordinate system.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPt {
    pub lon: f64,
    pub lat: f64,
    pub csys: CoordSys,
}

impl WorldPt {
    pub fn new(lon: f64, lat: f64, csys: CoordSys) -> Self {
        Self { lon, lat, csys }
    }

    /// J2000 equatorial point, the default system for most catalogs.
    pub fn j2000(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat, CoordSys::EquatorialJ2000)
    }

    /// Return this point expressed in `target`, converting if necessary.
    pub fn in_sys(&self, target: CoordSys) -> WorldPt {
        if self.csys == target {
            *self
        } else {
            convert_sys(*self, target)
        }
    }
}

/// A point in pixel-array coordinates of a plot's data grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImagePt {
    pub x: f64,
    pub y: f64,
}

/// A point in zoom-scaled, unrotated screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenPt {
    pub x: f64,
    pub y: f64,
}

/// A point in final on-screen pixels, after rotation/flip/scroll offset.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DevicePt {
    pub x: f64,
    pub y: f64,
}

impl ImagePt {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl ScreenPt {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl DevicePt {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Any of the four point kinds; the converter dispatches on this.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AnyPt {
    World(WorldPt),
    Image(ImagePt),
    Screen(ScreenPt),
    Device(DevicePt),
}

impl From<WorldPt> for AnyPt {
    fn from(p: WorldPt) -> Self {
        AnyPt::World(p)
    }
}

impl From<ImagePt> for AnyPt {
    fn from(p: ImagePt) -> Self {
        AnyPt::Image(p)
    }
}

impl From<ScreenPt> for AnyPt {
    fn from(p: ScreenPt) -> Self {
        AnyPt::Screen(p)
    }
}

impl From<DevicePt> for AnyPt {
    fn from(p: DevicePt) -> Self {
        AnyPt::Device(p)
    }
}

/// Viewport dimensions in device pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dim {
    pub width: u32,
    pub height: u32,
}

impl Dim {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Convert lon/lat (degrees) to a unit sphere vector.
#[inline(always)]
pub(crate) fn lonlat_to_vec3(lon: f64, lat: f64) -> DVec3 {
    let lon_rad = lon * DTOR;
    let lat_rad = lat * DTOR;
    DVec3::new(
        lat_rad.cos() * lon_rad.cos(),
        lat_rad.cos() * lon_rad.sin(),
        lat_rad.sin(),
    )
}

/// Convert a unit sphere vector back to lon/lat in degrees, lon in [0, 360).
#[inline(always)]
pub(crate) fn vec3_to_lonlat(v: DVec3) -> (f64, f64) {
    let lat = v.z.clamp(-1.0, 1.0).asin() * RTOD;
    let mut lon = v.y.atan2(v.x) * RTOD;
    if lon < 0.0 {
        lon += 360.0;
    }
    (lon, lat)
}

/// Angular distance between two sky points in degrees.
pub fn angular_distance(a: WorldPt, b: WorldPt) -> f64 {
    let b = b.in_sys(a.csys);
    let va = lonlat_to_vec3(a.lon, a.lat);
    let vb = lonlat_to_vec3(b.lon, b.lat);
    va.dot(vb).clamp(-1.0, 1.0).acos() * RTOD
}

// J2000 equatorial -> galactic direction-cosine matrix (IAU 1958 pole,
// rotated to the J2000 frame). Rows are the galactic basis vectors.
const EQ_TO_GAL: [[f64; 3]; 3] = [
    [-0.054_875_560_4, -0.873_437_090_2, -0.483_835_015_5],
    [0.494_109_427_9, -0.444_829_630_0, 0.746_982_244_5],
    [-0.867_666_149_0, -0.198_076_373_4, 0.455_983_776_2],
];

fn rotate_rows(v: DVec3) -> DVec3 {
    DVec3::new(
        EQ_TO_GAL[0][0] * v.x + EQ_TO_GAL[0][1] * v.y + EQ_TO_GAL[0][2] * v.z,
        EQ_TO_GAL[1][0] * v.x + EQ_TO_GAL[1][1] * v.y + EQ_TO_GAL[1][2] * v.z,
        EQ_TO_GAL[2][0] * v.x + EQ_TO_GAL[2][1] * v.y + EQ_TO_GAL[2][2] * v.z,
    )
}

fn rotate_cols(v: DVec3) -> DVec3 {
    DVec3::new(
        EQ_TO_GAL[0][0] * v.x + EQ_TO_GAL[1][0] * v.y + EQ_TO_GAL[2][0] * v.z,
        EQ_TO_GAL[0][1] * v.x + EQ_TO_GAL[1][1] * v.y + EQ_TO_GAL[2][1] * v.z,
        EQ_TO_GAL[0][2] * v.x + EQ_TO_GAL[1][2] * v.y + EQ_TO_GAL[2][2] * v.z,
    )
}

/// Convert a world point between coordinate systems.
pub fn convert_sys(wp: WorldPt, target: CoordSys) -> WorldPt {
    if wp.csys == target {
        return wp;
    }
    let v = lonlat_to_vec3(wp.lon, wp.lat);
    let rotated = match (wp.csys, target) {
        (CoordSys::EquatorialJ2000, CoordSys::Galactic) => rotate_rows(v),
        (CoordSys::Galactic, CoordSys::EquatorialJ2000) => rotate_cols(v),
        _ => v,
    };
    let (lon, lat) = vec3_to_lonlat(rotated);
    WorldPt::new(lon, lat, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_galactic_round_trip() {
        // bounded by the 10-digit precision of the published rotation
        let wp = WorldPt::j2000(83.633, 22.014);
        let gal = convert_sys(wp, CoordSys::Galactic);
        let back = convert_sys(gal, CoordSys::EquatorialJ2000);
        assert!((back.lon - wp.lon).abs() < 1e-6);
        assert!((back.lat - wp.lat).abs() < 1e-6);
    }

    #[test]
    fn test_galactic_center() {
        // Sgr A* region: galactic center is near (266.4, -28.9) in J2000
        let gc = WorldPt::new(0.0, 0.0, CoordSys::Galactic);
        let eq = convert_sys(gc, CoordSys::EquatorialJ2000);
        assert!((eq.lon - 266.405).abs() < 0.01);
        assert!((eq.lat - (-28.936)).abs() < 0.01);
    }

    #[test]
    fn test_angular_distance_poles() {
        let n = WorldPt::j2000(0.0, 90.0);
        let s = WorldPt::j2000(0.0, -90.0);
        assert!((angular_distance(n, s) - 180.0).abs() < 1e-9);
    }
}
