use glam::DVec3;

/// Aitoff forward projection of a projection-frame unit vector.
/// The whole sky maps into the ellipse X^2/8 + Y^2/2 <= 1.
#[inline]
pub(super) fn project(r: DVec3) -> Option<(f64, f64)> {
    let b = r.z.clamp(-1.0, 1.0).asin();
    let l = r.y.atan2(r.x);
    let half_l = l / 2.0;
    let denom = 1.0 + b.cos() * half_l.cos();
    if denom <= 0.0 {
        // exactly antipodal to the projection center
        return None;
    }
    let w = (2.0 / denom).sqrt();
    Some((2.0 * w * b.cos() * half_l.sin(), w * b.sin()))
}

/// Inverse Aitoff projection back to a projection-frame unit vector.
/// Rejects plane points outside the all-sky ellipse.
#[inline]
pub(super) fn unproject(x: f64, y: f64) -> Option<DVec3> {
    let r = x * x / 8.0 + y * y / 2.0;
    if r > 1.0 {
        return None;
    }
    let z2 = 1.0 - (x / 4.0) * (x / 4.0) - (y / 2.0) * (y / 2.0);
    let z = z2.sqrt();
    let l = 2.0 * (z * x / 2.0).atan2(2.0 * z2 - 1.0);
    let b = (y * z).clamp(-1.0, 1.0).asin();
    Some(DVec3::new(b.cos() * l.cos(), b.cos() * l.sin(), b.sin()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_center_is_origin() {
        let (x, y) = project(DVec3::new(1.0, 0.0, 0.0)).unwrap();
        assert!(x.abs() < 1e-12 && y.abs() < 1e-12);
    }

    #[test]
    fn test_pole_on_ellipse_rim() {
        // the frame pole lands at (0, sqrt(2)), on the ellipse boundary
        let (x, y) = project(DVec3::new(0.0, 0.0, 1.0)).unwrap();
        assert!(x.abs() < 1e-12);
        assert!((y - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert!(unproject(x, y).is_some());
    }

    #[test]
    fn test_domain_test_rejects() {
        assert!(unproject(2.9, 0.3).is_none());
        assert!(unproject(0.0, 1.42).is_none());
    }
}
