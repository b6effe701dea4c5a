//! Match kits for sky positions.
//!
//! Rows bin under the HEALPix pixels touched by a cone around their
//! position. [`SkyMatchKit`] uses a per-row error radius combined with an
//! [`ErrorSummation`]; [`FixedSkyMatchKit`] uses one maximum separation for
//! every pair.

use crate::policy::ErrorSummation;
use crate::scan::MatchKit;
use crate::Result;

use super::angular_separation;
use super::coverage::SkyCoverageKit;
use super::mask::PixelTester;
use super::pixellator::{FixedRadiusConePixer, SkyPixellator, VariableRadiusConePixer};

/// A sky position with an isotropic error radius, all in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPosition {
    pub ra_rad: f64,
    pub dec_rad: f64,
    pub error_rad: f64,
}

impl SkyPosition {
    pub fn new(ra_rad: f64, dec_rad: f64, error_rad: f64) -> Self {
        Self {
            ra_rad,
            dec_rad,
            error_rad,
        }
    }

    /// Great-circle distance to `other`.
    pub fn separation(&self, other: &SkyPosition) -> f64 {
        angular_separation(self.ra_rad, self.dec_rad, other.ra_rad, other.dec_rad)
    }
}

/// Score a separation against a threshold: `sep / threshold` in `[0, 1]`,
/// or `None` if the separation exceeds it.
fn threshold_score(sep: f64, threshold: f64) -> Option<f64> {
    if sep <= threshold {
        Some(if threshold > 0.0 { sep / threshold } else { 0.0 })
    } else {
        None
    }
}

/// Drop pixels outside the footprint, if there is one.
fn restrict(mut pixels: Vec<u64>, order: u8, footprint: Option<&PixelTester>) -> Vec<u64> {
    if let Some(tester) = footprint {
        pixels.retain(|&p| tester.contains_pixel(order, p));
    }
    pixels
}

/// Sky match with per-row errors.
///
/// Two positions match when their separation is at most the combination of
/// their errors. The score is the separation as a fraction of that
/// threshold.
#[derive(Debug, Clone)]
pub struct SkyMatchKit {
    pixer: VariableRadiusConePixer,
    summation: ErrorSummation,
    footprint: Option<PixelTester>,
}

impl SkyMatchKit {
    /// Kit binning at the pixellator's current scale.
    pub fn new<P: SkyPixellator>(pixellator: &P, summation: ErrorSummation) -> Result<Self> {
        let factory = pixellator.create_variable_radius_pixer_factory()?;
        Ok(Self {
            pixer: factory.create(),
            summation,
            footprint: None,
        })
    }

    /// Only bin rows into pixels that `footprint` covers.
    pub fn with_footprint(mut self, footprint: PixelTester) -> Self {
        self.footprint = Some(footprint);
        self
    }

    pub fn summation(&self) -> ErrorSummation {
        self.summation
    }
}

impl MatchKit for SkyMatchKit {
    type Row = SkyPosition;
    type Key = u64;

    fn bins(&self, row: &SkyPosition) -> Vec<u64> {
        let pixels = self.pixer.pixels(row.ra_rad, row.dec_rad, row.error_rad);
        restrict(pixels, self.pixer.order(), self.footprint.as_ref())
    }

    fn match_score(&self, a: &SkyPosition, b: &SkyPosition) -> Option<f64> {
        let threshold = self.summation.combine(a.error_rad, b.error_rad);
        threshold_score(a.separation(b), threshold)
    }
}

impl SkyCoverageKit for SkyMatchKit {
    fn pixel_order(&self) -> u8 {
        self.pixer.order()
    }

    fn restricted_to(&self, footprint: PixelTester) -> Self {
        self.clone().with_footprint(footprint)
    }
}

/// Sky match with a single maximum separation. Row errors are ignored.
#[derive(Debug, Clone)]
pub struct FixedSkyMatchKit {
    pixer: FixedRadiusConePixer,
    max_separation: f64,
    footprint: Option<PixelTester>,
}

impl FixedSkyMatchKit {
    /// Kit matching positions at most `max_separation` radians apart.
    pub fn new<P: SkyPixellator>(pixellator: &P, max_separation: f64) -> Result<Self> {
        // each row covers half the separation, so matching cones touch
        let factory = pixellator.create_fixed_radius_pixer_factory(0.5 * max_separation)?;
        Ok(Self {
            pixer: factory.create(),
            max_separation,
            footprint: None,
        })
    }

    pub fn with_footprint(mut self, footprint: PixelTester) -> Self {
        self.footprint = Some(footprint);
        self
    }

    pub fn max_separation(&self) -> f64 {
        self.max_separation
    }
}

impl MatchKit for FixedSkyMatchKit {
    type Row = SkyPosition;
    type Key = u64;

    fn bins(&self, row: &SkyPosition) -> Vec<u64> {
        let pixels = self.pixer.pixels(row.ra_rad, row.dec_rad);
        restrict(pixels, self.pixer.order(), self.footprint.as_ref())
    }

    fn match_score(&self, a: &SkyPosition, b: &SkyPosition) -> Option<f64> {
        threshold_score(a.separation(b), self.max_separation)
    }
}

impl SkyCoverageKit for FixedSkyMatchKit {
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

    const ARCSEC: f64 = std::f64::consts::PI / 180.0 / 3600.0;

    fn kit(summation: ErrorSummation) -> SkyMatchKit {
        SkyMatchKit::new(&HealpixSkyPixellator::new(5.0 * ARCSEC), summation).unwrap()
    }

    #[test]
    fn score_is_fraction_of_threshold() {
        let kit = kit(ErrorSummation::Simple);
        let a = SkyPosition::new(1.0, 0.2, 2.0 * ARCSEC);
        let b = SkyPosition::new(1.0, 0.2 + 3.0 * ARCSEC, 2.0 * ARCSEC);
        let score = kit.match_score(&a, &b).unwrap();
        assert!((score - 0.75).abs() < 1e-6);

        let c = SkyPosition::new(1.0, 0.2 + 5.0 * ARCSEC, 2.0 * ARCSEC);
        assert!(kit.match_score(&a, &c).is_none());
        let quad = self::kit(ErrorSummation::Quadrature);
        assert!(quad.match_score(&a, &b).is_none());
    }

    #[test]
    fn zero_errors_match_only_coincident_points() {
        let kit = kit(ErrorSummation::Simple);
        let a = SkyPosition::new(2.0, -0.5, 0.0);
        assert_eq!(kit.match_score(&a, &a), Some(0.0));
        let b = SkyPosition::new(2.0, -0.5 + ARCSEC, 0.0);
        assert!(kit.match_score(&a, &b).is_none());
        assert_eq!(kit.bins(&a).len(), 1);
    }

    #[test]
    fn matching_rows_share_a_bin() {
        let kit = kit(ErrorSummation::Simple);
        let a = SkyPosition::new(0.3, 1.1, 4.0 * ARCSEC);
        let b = SkyPosition::new(0.3 + 5.0 * ARCSEC, 1.1 - 2.0 * ARCSEC, 3.0 * ARCSEC);
        assert!(kit.match_score(&a, &b).is_some());
        let bins_a = kit.bins(&a);
        assert!(kit.bins(&b).iter().any(|p| bins_a.contains(p)));
    }

    #[test]
    fn footprint_drops_outside_pixels() {
        let pixellator = HealpixSkyPixellator::new(5.0 * ARCSEC);
        let order = pixellator.order().unwrap();
        let a = SkyPosition::new(0.3, 1.1, 4.0 * ARCSEC);
        let full = SkyMatchKit::new(&pixellator, ErrorSummation::Simple).unwrap();
        let first = full.bins(&a)[0];

        let mut mask = MocMask::new();
        mask.add_pixel(order, first).unwrap();
        let restricted = full.clone().with_footprint(mask.create_pixel_tester());
        assert_eq!(restricted.bins(&a), vec![first]);
        let empty = full.with_footprint(MocMask::new().create_pixel_tester());
        assert!(empty.bins(&a).is_empty());
    }

    #[test]
    fn fixed_kit_restricts_like_footprint() {
        let pixellator = HealpixSkyPixellator::new(2.0 * ARCSEC);
        let kit = FixedSkyMatchKit::new(&pixellator, 2.0 * ARCSEC).unwrap();
        let a = SkyPosition::new(4.0, 0.0, 0.0);
        let first = kit.bins(&a)[0];
        let mut mask = MocMask::new();
        mask.add_pixel(kit.pixel_order(), first).unwrap();
        let restricted = kit.restricted_to(mask.create_pixel_tester());
        assert_eq!(restricted.bins(&a), vec![first]);
        assert_eq!(restricted.max_separation(), kit.max_separation());
    }

    #[test]
    fn fixed_kit_uses_single_separation() {
        let pixellator = HealpixSkyPixellator::new(2.0 * ARCSEC);
        let kit = FixedSkyMatchKit::new(&pixellator, 2.0 * ARCSEC).unwrap();
        let a = SkyPosition::new(4.0, 0.0, 0.0);
        let b = SkyPosition::new(4.0 + ARCSEC, 0.0, 100.0);
        let score = kit.match_score(&a, &b).unwrap();
        assert!((score - 0.5).abs() < 1e-6);
        let bins_a = kit.bins(&a);
        assert!(kit.bins(&b).iter().any(|p| bins_a.contains(p)));
        assert!(kit
            .match_score(&a, &SkyPosition::new(4.0 + 3.0 * ARCSEC, 0.0, 0.0))
            .is_none());
        assert!(FixedSkyMatchKit::new(&pixellator, -1.0).is_err());
    }
}
