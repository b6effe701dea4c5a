//! Sky pixellation for candidate restriction.
//!
//! A pixellator turns an angular scale into a HEALPix order, and hands out
//! pixer factories that map a cone on the sky to the nested pixel indices
//! it may touch. Two rows can only match if their pixel sets intersect, so
//! the pixel indices serve directly as bin keys.
//!
//! Factories snapshot the order when they are created; changing the scale
//! afterwards does not affect pixers already handed out.

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::debug;

use crate::{MatchError, Result};

use super::wrap_angle;

/// Deepest order supported by the nested scheme.
pub const MAX_ORDER: u8 = 29;

/// Deepest order chosen automatically from a scale.
pub const MAX_AUTO_ORDER: u8 = 20;

/// Number of pixels at `order`.
pub fn pixel_count(order: u8) -> u64 {
    12u64 << (2 * u32::from(order))
}

/// Mean linear size of a pixel at `order`, in radians.
pub fn pixel_size(order: u8) -> f64 {
    (4.0 * PI / pixel_count(order) as f64).sqrt()
}

/// Deepest order (up to [`MAX_AUTO_ORDER`]) whose pixels are at least
/// `scale` radians across.
pub fn order_for_scale(scale: f64) -> u8 {
    (0..=MAX_AUTO_ORDER)
        .rev()
        .find(|&order| pixel_size(order) >= scale)
        .unwrap_or(0)
}

/// A named numeric knob exposed for external tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningParameter {
    pub name: &'static str,
    pub description: &'static str,
    pub value: f64,
}

/// Converts an angular length scale into sky pixel sets.
pub trait SkyPixellator {
    /// Set the characteristic angular scale, in radians.
    fn set_scale(&mut self, scale: f64);

    /// The scale exactly as last set.
    fn scale(&self) -> f64;

    /// The scale-derived parameter that controls pixel size.
    fn tuning_parameter(&self) -> TuningParameter;

    /// Factory for pixers taking a per-query radius.
    fn create_variable_radius_pixer_factory(&self) -> Result<VariableRadiusPixerFactory>;

    /// Factory for pixers with a fixed radius.
    fn create_fixed_radius_pixer_factory(&self, radius: f64) -> Result<FixedRadiusPixerFactory>;
}

/// [`SkyPixellator`] based on the nested HEALPix tessellation.
#[derive(Debug, Clone, PartialEq)]
pub struct HealpixSkyPixellator {
    scale: f64,
    order: Option<u8>,
}

impl HealpixSkyPixellator {
    /// Pixellator for the given scale (radians) with automatic order.
    pub fn new(scale: f64) -> Self {
        Self { scale, order: None }
    }

    /// Fix the order explicitly, or pass `None` to derive it from the scale.
    pub fn set_order(&mut self, order: Option<u8>) -> Result<()> {
        if let Some(o) = order {
            if o > MAX_ORDER {
                return Err(MatchError::Config(format!(
                    "HEALPix order {o} out of range 0..={MAX_ORDER}"
                )));
            }
        }
        self.order = order;
        Ok(())
    }

    /// The order factories would currently use.
    pub fn order(&self) -> Result<u8> {
        match self.order {
            Some(o) => Ok(o),
            None => {
                if !(self.scale.is_finite() && self.scale > 0.0) {
                    return Err(MatchError::Config(format!(
                        "sky pixellator scale must be positive, got {}",
                        self.scale
                    )));
                }
                Ok(order_for_scale(self.scale))
            }
        }
    }
}

impl SkyPixellator for HealpixSkyPixellator {
    fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn tuning_parameter(&self) -> TuningParameter {
        let value = match self.order {
            Some(o) => f64::from(o),
            None if self.scale.is_finite() && self.scale > 0.0 => {
                f64::from(order_for_scale(self.scale))
            }
            None => f64::NAN,
        };
        TuningParameter {
            name: "healpix_order",
            description: "HEALPix order used for sky binning",
            value,
        }
    }

    fn create_variable_radius_pixer_factory(&self) -> Result<VariableRadiusPixerFactory> {
        let order = self.order()?;
        debug!(
            "Variable-radius pixer factory: order {}, pixel size {:.4}°",
            order,
            pixel_size(order).to_degrees()
        );
        Ok(VariableRadiusPixerFactory { order })
    }

    fn create_fixed_radius_pixer_factory(&self, radius: f64) -> Result<FixedRadiusPixerFactory> {
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(MatchError::Config(format!(
                "pixer radius must be non-negative, got {radius}"
            )));
        }
        let order = self.order()?;
        debug!(
            "Fixed-radius pixer factory: order {}, radius {:.3e} rad",
            order, radius
        );
        Ok(FixedRadiusPixerFactory { order, radius })
    }
}

/// Immutable source of [`VariableRadiusConePixer`]s at a fixed order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableRadiusPixerFactory {
    order: u8,
}

impl VariableRadiusPixerFactory {
    pub fn order(&self) -> u8 {
        self.order
    }

    pub fn create(&self) -> VariableRadiusConePixer {
        VariableRadiusConePixer { order: self.order }
    }
}

/// Immutable source of [`FixedRadiusConePixer`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRadiusPixerFactory {
    order: u8,
    radius: f64,
}

impl FixedRadiusPixerFactory {
    pub fn order(&self) -> u8 {
        self.order
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn create(&self) -> FixedRadiusConePixer {
        FixedRadiusConePixer {
            inner: VariableRadiusConePixer { order: self.order },
            radius: self.radius,
        }
    }
}

/// Maps a cone of any radius to the pixels it may touch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableRadiusConePixer {
    order: u8,
}

impl VariableRadiusConePixer {
    pub fn order(&self) -> u8 {
        self.order
    }

    /// Sorted pixel indices whose cells may intersect the cone of `radius`
    /// around (`ra`, `dec`), all in radians.
    ///
    /// The set may include extra pixels but never misses one that the cone
    /// overlaps. A zero radius gives the single pixel containing the centre;
    /// a negative or non-finite input gives no pixels.
    pub fn pixels(&self, ra: f64, dec: f64, radius: f64) -> Vec<u64> {
        if !(ra.is_finite() && dec.is_finite() && radius.is_finite()) || radius < 0.0 {
            return Vec::new();
        }
        let lon = wrap_angle(ra);
        let lat = dec.clamp(-FRAC_PI_2, FRAC_PI_2);
        if radius == 0.0 {
            return vec![cdshealpix::nested::hash(self.order, lon, lat)];
        }
        if radius >= PI {
            return (0..pixel_count(self.order)).collect();
        }
        let bmoc = cdshealpix::nested::cone_coverage_approx(self.order, lon, lat, radius);
        let mut pixels: Vec<u64> = bmoc.flat_iter().collect();
        pixels.sort_unstable();
        pixels.dedup();
        pixels
    }
}

/// Maps a position to the pixels touched by a cone of fixed radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRadiusConePixer {
    inner: VariableRadiusConePixer,
    radius: f64,
}

impl FixedRadiusConePixer {
    pub fn order(&self) -> u8 {
        self.inner.order
    }

    pub fn pixels(&self, ra: f64, dec: f64) -> Vec<u64> {
        self.inner.pixels(ra, dec, self.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_follows_scale() {
        // order 0 pixels are ~58.6 deg across
        assert_eq!(order_for_scale(1.5), 0);
        assert_eq!(order_for_scale(pixel_size(6)), 6);
        assert_eq!(order_for_scale(pixel_size(6) * 1.01), 5);
        // very small scales stop at the automatic limit
        assert_eq!(order_for_scale(1e-12), MAX_AUTO_ORDER);
        for order in 1..=MAX_AUTO_ORDER {
            assert!(pixel_size(order) < pixel_size(order - 1));
        }
    }

    #[test]
    fn scale_round_trips_and_tunes() {
        let mut px = HealpixSkyPixellator::new(1e-3);
        assert_eq!(px.scale(), 1e-3);
        px.set_scale(2.5e-4);
        assert_eq!(px.scale(), 2.5e-4);
        let param = px.tuning_parameter();
        assert_eq!(param.name, "healpix_order");
        assert_eq!(param.value, f64::from(order_for_scale(2.5e-4)));

        px.set_order(Some(7)).unwrap();
        assert_eq!(px.tuning_parameter().value, 7.0);
        assert!(px.set_order(Some(30)).is_err());
    }

    #[test]
    fn invalid_scale_is_config_error() {
        let px = HealpixSkyPixellator::new(0.0);
        assert!(matches!(
            px.create_variable_radius_pixer_factory(),
            Err(MatchError::Config(_))
        ));
        let px = HealpixSkyPixellator::new(1e-3);
        assert!(px.create_fixed_radius_pixer_factory(-1.0).is_err());
    }

    #[test]
    fn factories_snapshot_order() {
        let mut px = HealpixSkyPixellator::new(1e-2);
        let factory = px.create_variable_radius_pixer_factory().unwrap();
        let fixed = px.create_fixed_radius_pixer_factory(1e-3).unwrap();
        let order_before = factory.order();
        px.set_scale(1e-6);
        assert_ne!(px.order().unwrap(), order_before);
        assert_eq!(factory.order(), order_before);
        assert_eq!(factory.create().order(), order_before);
        assert_eq!(fixed.create().order(), order_before);
    }

    #[test]
    fn zero_radius_gives_containing_pixel() {
        let pixer = VariableRadiusPixerFactory { order: 8 }.create();
        let ra = 1.234;
        let dec = -0.4;
        let pixels = pixer.pixels(ra, dec, 0.0);
        assert_eq!(pixels, vec![cdshealpix::nested::hash(8, ra, dec)]);
        assert!(pixer.pixels(f64::NAN, dec, 0.0).is_empty());
        assert!(pixer.pixels(ra, dec, -1.0).is_empty());
    }

    #[test]
    fn cone_pixels_contain_centre_and_edges() {
        let order = 10;
        let pixer = VariableRadiusPixerFactory { order }.create();
        let (ra, dec, radius) = (3.0_f64, 0.7_f64, 2e-3_f64);
        let pixels = pixer.pixels(ra, dec, radius);
        assert!(pixels.len() > 1);
        assert!(pixels.windows(2).all(|w| w[0] < w[1]));
        let centre = cdshealpix::nested::hash(order, ra, dec);
        assert!(pixels.binary_search(&centre).is_ok());
        // a point just inside the cone edge, due north
        let edge = cdshealpix::nested::hash(order, ra, dec + radius * 0.99);
        assert!(pixels.binary_search(&edge).is_ok());
    }

    #[test]
    fn full_sky_radius_gives_every_pixel() {
        let pixer = VariableRadiusPixerFactory { order: 1 }.create();
        assert_eq!(pixer.pixels(0.0, 0.0, PI).len() as u64, pixel_count(1));
    }
}
