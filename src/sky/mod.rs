//! Sky-position matching: HEALPix pixellation, coverage masks, match kits
//! for isotropic errors and error ellipses, and the coverage pass that
//! confines a pair match to the sky the tables share.
//!
//! All angles are in radians.

mod coverage;
mod ellipse_kit;
mod kit;
mod mask;
mod pixellator;

use std::f64::consts::TAU;

use nalgebra::Vector3;

pub use coverage::{
    count_rows_in_footprint, find_sky_pair_matches, read_coverage, SkyCoverageKit,
};
pub use ellipse_kit::{match_sky_ellipses, SkyEllipse, SkyEllipseMatchKit};
pub use kit::{FixedSkyMatchKit, SkyMatchKit, SkyPosition};
pub use mask::{HealpixMask, MocMask, PixelTester};
pub use pixellator::{
    order_for_scale, pixel_count, pixel_size, FixedRadiusConePixer, FixedRadiusPixerFactory,
    HealpixSkyPixellator, SkyPixellator, TuningParameter, VariableRadiusConePixer,
    VariableRadiusPixerFactory, MAX_AUTO_ORDER, MAX_ORDER,
};

/// Wrap an angle into `[0, 2π)`.
pub fn wrap_angle(theta_rad: f64) -> f64 {
    theta_rad.rem_euclid(TAU)
}

/// Unit vector pointing at (`ra`, `dec`) on the celestial sphere.
pub fn radec_to_uvec(ra_rad: f64, dec_rad: f64) -> Vector3<f64> {
    let (sin_ra, cos_ra) = ra_rad.sin_cos();
    let (sin_dec, cos_dec) = dec_rad.sin_cos();
    Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
}

/// Great-circle separation between two sky positions.
///
/// Uses `atan2(|a × b|, a · b)`, which stays accurate for both tiny and
/// near-antipodal separations.
pub fn angular_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let a = radec_to_uvec(ra1, dec1);
    let b = radec_to_uvec(ra2, dec2);
    a.cross(&b).norm().atan2(a.dot(&b))
}
