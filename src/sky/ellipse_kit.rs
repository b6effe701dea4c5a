//! Matching of error ellipses on the sky.
//!
//! Small cases are handled on the sphere: points against ellipses and
//! centres falling inside the other ellipse use a scaled angular distance.
//! Otherwise both ellipses are projected onto the plane tangent at the
//! midpoint of their centres and handed to [`match_ellipses`].

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Vector3;

use crate::ellipse::{match_ellipses, Ellipse};
use crate::scan::MatchKit;
use crate::Result;

use super::coverage::SkyCoverageKit;
use super::mask::PixelTester;
use super::pixellator::{SkyPixellator, VariableRadiusConePixer};
use super::{angular_separation, radec_to_uvec, wrap_angle};

/// Gnomonic projections closer than this to the horizon are rejected.
const MIN_PROJECTION_DENOM: f64 = 1e-6;

/// An ellipse on the sky, all angles in radians.
///
/// `pa_rad` turns the `major_rad` axis from north towards positive RA, the
/// usual position angle. `minor_rad` may exceed `major_rad`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyEllipse {
    pub ra_rad: f64,
    pub dec_rad: f64,
    pub major_rad: f64,
    pub minor_rad: f64,
    pub pa_rad: f64,
}

impl SkyEllipse {
    pub fn new(ra_rad: f64, dec_rad: f64, major_rad: f64, minor_rad: f64, pa_rad: f64) -> Self {
        Self {
            ra_rad,
            dec_rad,
            major_rad,
            minor_rad,
            pa_rad,
        }
    }

    pub fn circle(ra_rad: f64, dec_rad: f64, radius_rad: f64) -> Self {
        Self::new(ra_rad, dec_rad, radius_rad, radius_rad, 0.0)
    }

    pub fn point(ra_rad: f64, dec_rad: f64) -> Self {
        Self::new(ra_rad, dec_rad, 0.0, 0.0, 0.0)
    }

    /// Distance beyond which no point belongs to the ellipse.
    pub fn max_radius(&self) -> f64 {
        self.major_rad.max(self.minor_rad)
    }
}

/// How a [`SkyEllipse`] is treated during matching.
enum Shape {
    Point,
    Circle(f64),
    Eccentric {
        major: f64,
        minor: f64,
        /// Major axis, minor axis and centre as unit vectors.
        frame: [Vector3<f64>; 3],
    },
}

impl Shape {
    fn of(e: &SkyEllipse, recognise_circles: bool) -> Self {
        let (mu, nu) = (e.major_rad, e.minor_rad);
        if mu == 0.0 && nu == 0.0 {
            return Shape::Point;
        }
        if recognise_circles && mu == nu {
            return Shape::Circle(mu);
        }
        let (sin_ra, cos_ra) = e.ra_rad.sin_cos();
        let (sin_dec, cos_dec) = e.dec_rad.sin_cos();
        let (sin_pa, cos_pa) = e.pa_rad.sin_cos();
        let north = Vector3::new(-sin_dec * cos_ra, -sin_dec * sin_ra, cos_dec);
        let east = Vector3::new(-sin_ra, cos_ra, 0.0);
        Shape::Eccentric {
            major: mu,
            minor: nu,
            frame: [
                north * cos_pa + east * sin_pa,
                east * cos_pa - north * sin_pa,
                radec_to_uvec(e.ra_rad, e.dec_rad),
            ],
        }
    }

    fn is_point(&self) -> bool {
        matches!(self, Shape::Point)
    }

    /// Angular analogue of the distance from the centre of `e` to a point,
    /// 0 at the centre and 1 on the edge. Only accurate for small ellipses.
    fn scaled_distance(&self, e: &SkyEllipse, ra: f64, dec: f64) -> f64 {
        match self {
            Shape::Point => {
                if same_position(e.ra_rad, e.dec_rad, ra, dec) {
                    0.0
                } else {
                    f64::INFINITY
                }
            }
            Shape::Circle(mu) => angular_separation(e.ra_rad, e.dec_rad, ra, dec) / mu,
            Shape::Eccentric {
                major,
                minor,
                frame,
            } => {
                let p = radec_to_uvec(ra, dec);
                let mut dm = p.dot(&frame[0]).abs().min(1.0).asin();
                let mut dn = p.dot(&frame[1]).abs().min(1.0).asin();
                // far hemisphere
                if p.dot(&frame[2]) < 0.0 {
                    dm = PI - dm;
                    dn = PI - dn;
                }
                ratio(dm, *major).hypot(ratio(dn, *minor))
            }
        }
    }

    /// Planar ellipse on the plane tangent at (`ra0`, `dec0`).
    fn project(&self, e: &SkyEllipse, ra0: f64, dec0: f64) -> Option<Ellipse> {
        let [x, y] = tangent_project(ra0, dec0, e.ra_rad, e.dec_rad)?;
        Some(match self {
            Shape::Point => Ellipse::point(x, y),
            Shape::Circle(mu) => Ellipse::circle(x, y, *mu),
            // position angle runs from north (+y) towards east (+x)
            Shape::Eccentric { major, minor, .. } => {
                Ellipse::new(x, y, *major, *minor, FRAC_PI_2 - e.pa_rad)
            }
        })
    }
}

fn ratio(d: f64, r: f64) -> f64 {
    if d == 0.0 {
        0.0
    } else {
        d / r
    }
}

fn same_position(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> bool {
    wrap_angle(ra1) == wrap_angle(ra2) && dec1 == dec2
}

/// Gnomonic projection of (`ra`, `dec`) onto the plane tangent at
/// (`ra0`, `dec0`), with x towards east and y towards north in radians.
/// `None` for points 90 degrees or more from the tangent point.
fn tangent_project(ra0: f64, dec0: f64, ra: f64, dec: f64) -> Option<[f64; 2]> {
    let (sin_dec0, cos_dec0) = dec0.sin_cos();
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dra, cos_dra) = (ra - ra0).sin_cos();
    let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
    if denom < MIN_PROJECTION_DENOM {
        return None;
    }
    Some([
        cos_dec * sin_dra / denom,
        (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / denom,
    ])
}

/// Point on the sphere halfway between two positions.
fn midpoint(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> (f64, f64) {
    let c = (radec_to_uvec(ra1, dec1) + radec_to_uvec(ra2, dec2)) * 0.5;
    (c.y.atan2(c.x), c.z.atan2(c.x.hypot(c.y)))
}

/// Score the overlap of two sky ellipses, from 0 (concentric) to 2 (edges
/// just touching), or `None` if they do not overlap.
///
/// With `recognise_circles`, ellipses with equal radii take the circular
/// shortcuts.
pub fn match_sky_ellipses(
    e1: &SkyEllipse,
    e2: &SkyEllipse,
    recognise_circles: bool,
) -> Option<f64> {
    let max_sep = e1.max_radius() + e2.max_radius();
    if (e2.dec_rad - e1.dec_rad).abs() > max_sep {
        return None;
    }
    let sep = angular_separation(e1.ra_rad, e1.dec_rad, e2.ra_rad, e2.dec_rad);
    if sep > max_sep {
        return None;
    }

    let s1 = Shape::of(e1, recognise_circles);
    let s2 = Shape::of(e2, recognise_circles);
    match (s1.is_point(), s2.is_point()) {
        (true, true) => {
            return same_position(e1.ra_rad, e1.dec_rad, e2.ra_rad, e2.dec_rad).then_some(0.0);
        }
        (true, false) => {
            let s = s2.scaled_distance(e2, e1.ra_rad, e1.dec_rad);
            return (s <= 1.0).then_some(s);
        }
        (false, true) => {
            let s = s1.scaled_distance(e1, e2.ra_rad, e2.dec_rad);
            return (s <= 1.0).then_some(s);
        }
        (false, false) => {}
    }

    // a centre inside the other ellipse
    let sc1 = s1.scaled_distance(e1, e2.ra_rad, e2.dec_rad);
    let sc2 = s2.scaled_distance(e2, e1.ra_rad, e1.dec_rad);
    match (sc1 <= 1.0, sc2 <= 1.0) {
        (true, true) => return Some(sc1.min(sc2)),
        (true, false) => return Some(sc1),
        (false, true) => return Some(sc2),
        (false, false) => {}
    }

    if let (Shape::Circle(mu1), Shape::Circle(mu2)) = (&s1, &s2) {
        return Some(1.0 + 0.5 * ((sep - mu2) / mu1 + (sep - mu1) / mu2));
    }
    let (ra0, dec0) = midpoint(e1.ra_rad, e1.dec_rad, e2.ra_rad, e2.dec_rad);
    let p1 = s1.project(e1, ra0, dec0)?;
    let p2 = s2.project(e2, ra0, dec0)?;
    match_ellipses(&p1, &p2, recognise_circles).map(|m| m.score)
}

/// Match kit for [`SkyEllipse`] rows.
///
/// Rows bin under the pixels of the cone of their largest radius.
#[derive(Debug, Clone)]
pub struct SkyEllipseMatchKit {
    pixer: VariableRadiusConePixer,
    recognise_circles: bool,
    footprint: Option<PixelTester>,
}

impl SkyEllipseMatchKit {
    pub fn new<P: SkyPixellator>(pixellator: &P, recognise_circles: bool) -> Result<Self> {
        let factory = pixellator.create_variable_radius_pixer_factory()?;
        Ok(Self {
            pixer: factory.create(),
            recognise_circles,
            footprint: None,
        })
    }

    /// Only bin rows into pixels that `footprint` covers.
    pub fn with_footprint(mut self, footprint: PixelTester) -> Self {
        self.footprint = Some(footprint);
        self
    }
}

impl MatchKit for SkyEllipseMatchKit {
    type Row = SkyEllipse;
    type Key = u64;

    fn bins(&self, row: &SkyEllipse) -> Vec<u64> {
        let mut pixels = self.pixer.pixels(row.ra_rad, row.dec_rad, row.max_radius());
        if let Some(tester) = &self.footprint {
            let order = self.pixer.order();
            pixels.retain(|&p| tester.contains_pixel(order, p));
        }
        pixels
    }

    fn match_score(&self, a: &SkyEllipse, b: &SkyEllipse) -> Option<f64> {
        match_sky_ellipses(a, b, self.recognise_circles)
    }
}

impl SkyCoverageKit for SkyEllipseMatchKit {
    fn pixel_order(&self) -> u8 {
        self.pixer.order()
    }

    fn restricted_to(&self, footprint: PixelTester) -> Self {
        self.clone().with_footprint(footprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky::{HealpixMask, HealpixSkyPixellator, MocMask};

    const ARCSEC: f64 = PI / 180.0 / 3600.0;

    /// Position `east` and `north` arcsec away from (`ra`, `dec`).
    fn offset(ra: f64, dec: f64, east: f64, north: f64) -> (f64, f64) {
        (ra + east * ARCSEC / dec.cos(), dec + north * ARCSEC)
    }

    #[test]
    fn projection_of_tangent_point_is_origin() {
        assert_eq!(tangent_project(1.2, -0.4, 1.2, -0.4), Some([0.0, 0.0]));
        let [x, y] = tangent_project(0.0, 0.0, 1e-5, 0.0).unwrap();
        assert!((x - 1e-5).abs() < 1e-15 && y.abs() < 1e-15);
        let [x, y] = tangent_project(0.0, 0.0, 0.0, 1e-5).unwrap();
        assert!(x.abs() < 1e-15 && (y - 1e-5).abs() < 1e-15);
        assert!(tangent_project(0.0, 0.0, PI, 0.0).is_none());
    }

    #[test]
    fn position_angle_orients_major_axis() {
        let (ra, dec) = (1.0, 0.3);
        let north_major = SkyEllipse::new(ra, dec, 10.0 * ARCSEC, 2.0 * ARCSEC, 0.0);
        let east_major = SkyEllipse::new(ra, dec, 10.0 * ARCSEC, 2.0 * ARCSEC, FRAC_PI_2);
        let (n_ra, n_dec) = offset(ra, dec, 0.0, 8.0);
        let (e_ra, e_dec) = offset(ra, dec, 8.0, 0.0);
        let north = SkyEllipse::circle(n_ra, n_dec, ARCSEC);
        let east = SkyEllipse::circle(e_ra, e_dec, ARCSEC);

        let s = match_sky_ellipses(&north_major, &north, true).unwrap();
        assert!((s - 0.8).abs() < 1e-6);
        assert!(match_sky_ellipses(&north_major, &east, true).is_none());
        let s = match_sky_ellipses(&east_major, &east, true).unwrap();
        assert!((s - 0.8).abs() < 1e-6);
        assert!(match_sky_ellipses(&east_major, &north, true).is_none());
    }

    #[test]
    fn points_match_inside_only() {
        let e = SkyEllipse::new(2.0, -0.5, 4.0 * ARCSEC, 4.0 * ARCSEC, 0.0);
        let (ra, dec) = offset(2.0, -0.5, 0.0, 2.0);
        let inside = SkyEllipse::point(ra, dec);
        let s = match_sky_ellipses(&e, &inside, false).unwrap();
        assert!((s - 0.5).abs() < 1e-6);
        let (ra, dec) = offset(2.0, -0.5, 0.0, 5.0);
        assert!(match_sky_ellipses(&SkyEllipse::point(ra, dec), &e, false).is_none());

        let p = SkyEllipse::point(2.0, -0.5);
        assert_eq!(match_sky_ellipses(&p, &p, true), Some(0.0));
        assert!(match_sky_ellipses(&p, &inside, true).is_none());
    }

    #[test]
    fn circles_use_closed_form() {
        let a = SkyEllipse::circle(0.5, 0.0, 3.0 * ARCSEC);
        let (ra, dec) = offset(0.5, 0.0, 4.0, 0.0);
        let b = SkyEllipse::circle(ra, dec, 3.0 * ARCSEC);
        let s = match_sky_ellipses(&a, &b, true).unwrap();
        assert!((s - (1.0 + 1.0 / 3.0)).abs() < 1e-6);
        let (ra, dec) = offset(0.5, 0.0, 6.5, 0.0);
        assert!(match_sky_ellipses(&a, &SkyEllipse::circle(ra, dec, 3.0 * ARCSEC), true).is_none());
    }

    #[test]
    fn overlapping_edges_follow_planar_match() {
        // major axes east-west on the equator, centres 12 arcsec apart
        let a = SkyEllipse::new(1.0, 0.0, 10.0 * ARCSEC, 2.0 * ARCSEC, FRAC_PI_2);
        let (ra, dec) = offset(1.0, 0.0, 12.0, 0.0);
        let b = SkyEllipse::new(ra, dec, 10.0 * ARCSEC, 2.0 * ARCSEC, FRAC_PI_2);
        let score = match_sky_ellipses(&a, &b, false).unwrap();
        let planar = match_ellipses(
            &Ellipse::new(0.0, 0.0, 10.0, 2.0, 0.0),
            &Ellipse::new(12.0, 0.0, 10.0, 2.0, 0.0),
            false,
        )
        .unwrap()
        .score;
        assert!(score > 1.0 && score <= 2.0);
        assert!((score - planar).abs() < 1e-4, "{score} vs {planar}");

        // b turned north-south no longer reaches a
        let (ra, dec) = offset(1.0, 0.0, 13.0, 0.0);
        let c = SkyEllipse::new(ra, dec, 10.0 * ARCSEC, 2.0 * ARCSEC, 0.0);
        assert!(match_sky_ellipses(&a, &c, false).is_none());
    }

    #[test]
    fn kit_bins_share_pixel_for_matches() {
        let pixellator = HealpixSkyPixellator::new(5.0 * ARCSEC);
        let kit = SkyEllipseMatchKit::new(&pixellator, true).unwrap();
        let a = SkyEllipse::new(0.3, 1.1, 6.0 * ARCSEC, 2.0 * ARCSEC, 0.7);
        let (ra, dec) = offset(0.3, 1.1, 2.0, 2.0);
        let b = SkyEllipse::new(ra, dec, 5.0 * ARCSEC, 5.0 * ARCSEC, 0.0);
        assert!(kit.match_score(&a, &b).is_some());
        let bins_a = kit.bins(&a);
        assert!(kit.bins(&b).iter().any(|p| bins_a.contains(p)));

        let first = bins_a[0];
        let mut mask = MocMask::new();
        mask.add_pixel(kit.pixel_order(), first).unwrap();
        let restricted = kit.restricted_to(mask.create_pixel_tester());
        assert_eq!(restricted.bins(&a), vec![first]);
    }
}
