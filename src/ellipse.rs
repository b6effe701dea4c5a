//! Overlap test for planar error ellipses.
//!
//! Two positions with anisotropic errors match when their error ellipses
//! overlap. The score runs from 0 to 2: 0 for concentric ellipses, 1 when
//! the centre of one lies on the edge of the other, and 2 when the edges
//! only just touch.
//!
//! When neither centre lies inside the other ellipse, the point of the
//! second ellipse's edge closest to the first (in the first's scaled
//! metric) is found with the [`AngleOptimiser`].

use std::fmt;

use tracing::warn;

use crate::optimise::{AngleOptimiser, ExtremumKind};

/// Ellipse with centre (`x`, `y`), semi-axes `a` and `b`, and the
/// semi-major axis turned `theta` radians from the X axis towards Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub x: f64,
    pub y: f64,
    pub a: f64,
    pub b: f64,
    pub theta: f64,
}

impl Ellipse {
    pub fn new(x: f64, y: f64, a: f64, b: f64, theta: f64) -> Self {
        Self { x, y, a, b, theta }
    }

    /// A dimensionless position.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, 0.0, 0.0, 0.0)
    }

    /// Circle of radius `r`.
    pub fn circle(x: f64, y: f64, r: f64) -> Self {
        Self::new(x, y, r, r, 0.0)
    }

    /// True if the ellipse has no usable extent.
    pub fn is_point(&self) -> bool {
        !((self.a > 0.0 || self.b > 0.0) && !self.theta.is_nan())
    }

    pub fn is_circle(&self) -> bool {
        self.a == self.b
    }

    pub fn max_radius(&self) -> f64 {
        self.a.max(self.b)
    }
}

impl fmt::Display for Ellipse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(x={}, y={}, a={}, b={}, theta={})",
            self.x, self.y, self.a, self.b, self.theta
        )
    }
}

/// Result of a successful ellipse match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseMatch {
    /// Normalised separation in `[0, 2]`; lower is better.
    pub score: f64,
    /// Point of the second ellipse lying deepest inside the first, if
    /// one was computed.
    pub point_in_first: Option<[f64; 2]>,
    /// Point of the first ellipse lying deepest inside the second, if
    /// one was computed.
    pub point_in_second: Option<[f64; 2]>,
}

impl EllipseMatch {
    fn new(
        score: f64,
        point_in_first: Option<[f64; 2]>,
        point_in_second: Option<[f64; 2]>,
    ) -> Self {
        Self {
            score,
            point_in_first,
            point_in_second,
        }
    }
}

/// Test two ellipses for overlap.
///
/// With `recognise_circles` set, a pair of circles is scored in closed form
/// rather than through the optimiser.
pub fn match_ellipses(
    e1: &Ellipse,
    e2: &Ellipse,
    recognise_circles: bool,
) -> Option<EllipseMatch> {
    let dx = e2.x - e1.x;
    let dy = e2.y - e1.y;
    let reach = e1.max_radius() + e2.max_radius();
    if dx * dx + dy * dy > reach * reach {
        return None;
    }

    // points match only if they lie inside the other ellipse
    match (e1.is_point(), e2.is_point()) {
        (true, true) => {
            return (dx == 0.0 && dy == 0.0).then(|| EllipseMatch::new(0.0, None, None));
        }
        (true, false) => {
            let s = scaled_distance(e2, e1.x, e1.y);
            return (s <= 1.0).then(|| EllipseMatch::new(s, None, Some([e1.x, e1.y])));
        }
        (false, true) => {
            let s = scaled_distance(e1, e2.x, e2.y);
            return (s <= 1.0).then(|| EllipseMatch::new(s, Some([e2.x, e2.y]), None));
        }
        (false, false) => {}
    }

    let sc1 = scaled_distance(e1, e2.x, e2.y);
    let sc2 = scaled_distance(e2, e1.x, e1.y);
    match (sc1 <= 1.0, sc2 <= 1.0) {
        (true, true) if sc1 < sc2 => {
            return Some(EllipseMatch::new(sc1, Some([e2.x, e2.y]), None));
        }
        (true, true) | (false, true) => {
            return Some(EllipseMatch::new(sc2, None, Some([e1.x, e1.y])));
        }
        (true, false) => {
            return Some(EllipseMatch::new(sc1, Some([e2.x, e2.y]), None));
        }
        (false, false) => {}
    }

    if recognise_circles && e1.is_circle() && e2.is_circle() {
        let r1 = e1.a;
        let r2 = e2.a;
        let s = (dx * dx + dy * dy).sqrt();
        if s > r1 + r2 {
            return None;
        }
        let fx = dx / s;
        let fy = dy / s;
        return Some(EllipseMatch::new(
            1.0 + 0.5 * ((s - r2) / r1 + (s - r1) / r2),
            Some([e2.x - r2 * fx, e2.y - r2 * fy]),
            Some([e1.x + r1 * fx, e1.y + r1 * fy]),
        ));
    }

    let p1 = find_closest_edge_point(e1, e2);
    let sp1 = scaled_distance(e1, p1[0], p1[1]);
    if sp1 > 1.0 {
        return None;
    }
    let p2 = find_closest_edge_point(e2, e1);
    let sp2 = scaled_distance(e2, p2[0], p2[1]);
    Some(EllipseMatch::new(1.0 + 0.5 * (sp1 + sp2), Some(p1), Some(p2)))
}

/// Distance of (`x`, `y`) from the centre of `e`, in units of the
/// ellipse radius along that direction: 1 on the edge, below 1 inside.
pub fn scaled_distance(e: &Ellipse, x: f64, y: f64) -> f64 {
    let rx = x - e.x;
    let ry = y - e.y;
    let (s, c) = e.theta.sin_cos();
    let dx = (rx * c - ry * s) / e.a;
    let dy = (rx * s + ry * c) / e.b;
    dx.hypot(dy)
}

/// Point on the edge of `e` at parametric angle `phi`.
pub fn edge_point(e: &Ellipse, phi: f64) -> [f64; 2] {
    let (sp, cp) = phi.sin_cos();
    let (st, ct) = e.theta.sin_cos();
    [
        e.x + e.a * ct * cp + e.b * st * sp,
        e.y + e.b * ct * sp - e.a * st * cp,
    ]
}

/// Parametric angle of the edge point of `e` on the ray from its centre
/// towards (`x`, `y`).
pub fn phi_towards_point(e: &Ellipse, x: f64, y: f64) -> f64 {
    let psi = (x - e.x).atan2(y - e.y);
    (e.a * (psi - e.theta).cos()).atan2(e.b * (psi - e.theta).sin())
}

/// Squared scaled distance, relative to `e1`, of the edge point of `e2` at
/// parametric angle `phi2`, with its first and second derivatives in
/// `phi2`.
pub fn separation_derivs(e1: &Ellipse, e2: &Ellipse, phi2: f64) -> [f64; 3] {
    let (s1, c1) = e1.theta.sin_cos();
    let (s12, c12) = (e2.theta - e1.theta).sin_cos();
    let (a2, b2) = (e2.a, e2.b);
    let x12 = e2.x - e1.x;
    let y12 = e2.y - e1.y;
    let raa1 = 1.0 / (e1.a * e1.a);
    let rbb1 = 1.0 / (e1.b * e1.b);

    // centre offset in the frame of e1
    let u = x12 * c1 - y12 * s1;
    let v = x12 * s1 + y12 * c1;

    let tcc = a2 * a2 * (c12 * c12 * raa1 + s12 * s12 * rbb1);
    let tss = b2 * b2 * (s12 * s12 * raa1 + c12 * c12 * rbb1);
    let tcs = 2.0 * a2 * b2 * c12 * s12 * (raa1 - rbb1);
    let tc = 2.0 * a2 * (c12 * raa1 * u - s12 * rbb1 * v);
    let ts = 2.0 * b2 * (s12 * raa1 * u + c12 * rbb1 * v);
    let t = raa1 * u * u + rbb1 * v * v;

    let (sp, cp) = phi2.sin_cos();
    let (s2p, c2p) = (2.0 * phi2).sin_cos();
    [
        tcc * cp * cp + tss * sp * sp + tcs * cp * sp + tc * cp + ts * sp + t,
        (tss - tcc) * s2p + tcs * c2p - tc * sp + ts * cp,
        2.0 * (tss - tcc) * c2p - 2.0 * tcs * s2p - tc * cp - ts * sp,
    ]
}

/// Point on the edge of `e2` closest to the centre of `e1`, measured in
/// the scaled metric of `e1`.
pub fn find_closest_edge_point(e1: &Ellipse, e2: &Ellipse) -> [f64; 2] {
    let optimiser = AngleOptimiser::default();
    let phi0 = phi_towards_point(e2, e1.x, e1.y);
    let found = optimiser.find_extremum(
        |phi| separation_derivs(e1, e2, phi),
        phi0,
        Some(ExtremumKind::Minimum),
    );
    match found {
        Some(phi) => edge_point(e2, phi),
        // the search struggles when the centre of e2 sits on the edge of e1
        None if (scaled_distance(e1, e2.x, e2.y) - 1.0).abs() < 1e-3 => [e2.x, e2.y],
        None => {
            warn!("Ellipse optimisation failed for {}, {}", e1, e2);
            edge_point(e2, phi0)
        }
    }
}
