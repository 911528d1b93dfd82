//! Map projections from geographic degrees to screen pixels.
//!
//! Screen space follows canvas conventions: `x` grows to the right and `y`
//! grows downward, so north-pointing vectors have negative `y` components.

use std::f64::consts::{FRAC_PI_2, PI};

use super::geo::{DEG, wrap_pi};
use crate::bounds::{View, ViewBounds};

/// Step (degrees) used when differentiating a projection numerically.
const DISTORTION_STEP: f64 = 6.309_573_444_801_933e-6; // 10^-5.2

/// A forward/inverse mapping between `(lon, lat)` in degrees and pixels.
///
/// `project` is unclipped: it returns a position even for points that are not
/// visible (the far side of a globe). Use [`Projection::is_visible`] to clip.
pub trait Projection {
    fn project(&self, lon: f64, lat: f64) -> Option<[f64; 2]>;

    /// Maps a pixel back to `(lon, lat)`, or `None` when the pixel is off the map.
    fn invert(&self, x: f64, y: f64) -> Option<[f64; 2]>;

    /// Pixels per radian at the projection center.
    fn scale(&self) -> f64;

    /// Pixel extent of the whole sphere under this projection, clamped to `view`.
    fn bounds(&self, view: View) -> ViewBounds;

    fn is_visible(&self, _lon: f64, _lat: f64) -> bool {
        true
    }

    /// Local Jacobian of the projection at `(lon, lat)`; see [`distortion`].
    fn distortion(&self, lon: f64, lat: f64, x: f64, y: f64) -> [f64; 4] {
        distortion(self, lon, lat, x, y)
    }
}

/// Numerically estimates how the projection stretches and rotates a unit
/// east vector and a unit north vector at `(lon, lat)`, whose pixel position is
/// `(x, y)`.
///
/// Returns `[d0, d1, d2, d3]` where `(d0, d1)` is the screen image of east and
/// `(d2, d3)` the screen image of north, both per degree of latitude-equivalent
/// arc. Entries are NaN when a neighbouring point cannot be projected.
pub fn distortion<P: Projection + ?Sized>(
    projection: &P,
    lon: f64,
    lat: f64,
    x: f64,
    y: f64,
) -> [f64; 4] {
    let h_lon = if lon < 0.0 { DISTORTION_STEP } else { -DISTORTION_STEP };
    let h_lat = if lat < 0.0 { DISTORTION_STEP } else { -DISTORTION_STEP };
    let (Some(p_lon), Some(p_lat)) = (
        projection.project(lon + h_lon, lat),
        projection.project(lon, lat + h_lat),
    ) else {
        return [f64::NAN; 4];
    };
    // One degree of longitude spans cos(lat) degrees of arc.
    let k = (lat * DEG).cos();
    [
        (p_lon[0] - x) / h_lon / k,
        (p_lon[1] - y) / h_lon / k,
        (p_lat[0] - x) / h_lat,
        (p_lat[1] - y) / h_lat,
    ]
}

/// Rotation that brings `center` to `(0, 0)` before a raw projection is applied.
#[derive(Debug, Copy, Clone, PartialEq)]
struct Rotation {
    d_lambda: f64,
    cos_phi: f64,
    sin_phi: f64,
}

impl Rotation {
    fn new(center: [f64; 2]) -> Self {
        let d_phi = -center[1] * DEG;
        Rotation {
            d_lambda: -center[0] * DEG,
            cos_phi: d_phi.cos(),
            sin_phi: d_phi.sin(),
        }
    }

    fn forward(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let lambda = wrap_pi(lambda + self.d_lambda);
        let cos_phi = phi.cos();
        let x = lambda.cos() * cos_phi;
        let y = lambda.sin() * cos_phi;
        let z = phi.sin();
        let k = z * self.cos_phi + x * self.sin_phi;
        (
            y.atan2(x * self.cos_phi - z * self.sin_phi),
            k.clamp(-1.0, 1.0).asin(),
        )
    }

    fn inverse(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let cos_phi = phi.cos();
        let x = lambda.cos() * cos_phi;
        let y = lambda.sin() * cos_phi;
        let z = phi.sin();
        let lambda = y.atan2(x * self.cos_phi + z * self.sin_phi);
        let phi = (z * self.cos_phi - x * self.sin_phi).clamp(-1.0, 1.0).asin();
        (wrap_pi(lambda - self.d_lambda), phi)
    }
}

/// The globe as seen from infinitely far away.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Orthographic {
    center: [f64; 2],
    rotation: Rotation,
    scale: f64,
    translate: [f64; 2],
}

impl Orthographic {
    pub fn new(center: [f64; 2], scale: f64, translate: [f64; 2]) -> Self {
        Self {
            center,
            rotation: Rotation::new(center),
            scale,
            translate,
        }
    }

    /// Centers the globe in `view` with a small margin around the limb.
    pub fn fit(view: View, center: [f64; 2]) -> Self {
        let scale = 0.9 * (view.width.min(view.height) as f64) / 2.0;
        let translate = [view.width as f64 / 2.0, view.height as f64 / 2.0];
        Self::new(center, scale, translate)
    }

    pub fn center(&self) -> [f64; 2] {
        self.center
    }

    pub fn with_scale(self, scale: f64) -> Self {
        Self::new(self.center, scale, self.translate)
    }
}

impl Projection for Orthographic {
    fn project(&self, lon: f64, lat: f64) -> Option<[f64; 2]> {
        let (lambda, phi) = self.rotation.forward(lon * DEG, lat * DEG);
        let x = phi.cos() * lambda.sin();
        let y = phi.sin();
        let p = [
            self.translate[0] + self.scale * x,
            self.translate[1] - self.scale * y,
        ];
        (p[0].is_finite() && p[1].is_finite()).then_some(p)
    }

    fn invert(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        let x = (x - self.translate[0]) / self.scale;
        let y = (self.translate[1] - y) / self.scale;
        let rho = (x * x + y * y).sqrt();
        if !rho.is_finite() || rho > 1.0 {
            return None;
        }
        let c = rho.asin();
        let (sin_c, cos_c) = c.sin_cos();
        let lambda = (x * sin_c).atan2(rho * cos_c);
        let phi = if rho == 0.0 {
            0.0
        } else {
            (y * sin_c / rho).clamp(-1.0, 1.0).asin()
        };
        let (lambda, phi) = self.rotation.inverse(lambda, phi);
        Some([lambda / DEG, phi / DEG])
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn bounds(&self, view: View) -> ViewBounds {
        let [tx, ty] = self.translate;
        ViewBounds::clamped(
            [tx - self.scale, ty - self.scale],
            [tx + self.scale, ty + self.scale],
            view,
        )
    }

    fn is_visible(&self, lon: f64, lat: f64) -> bool {
        let (lambda, phi) = self.rotation.forward(lon * DEG, lat * DEG);
        phi.cos() * lambda.cos() >= 0.0
    }
}

/// Plate carrée: longitude and latitude map linearly to `x` and `y`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Equirectangular {
    center_lon: f64,
    scale: f64,
    translate: [f64; 2],
}

impl Equirectangular {
    pub fn new(center_lon: f64, scale: f64, translate: [f64; 2]) -> Self {
        Self {
            center_lon,
            scale,
            translate,
        }
    }

    /// Fits the whole world into `view`.
    pub fn fit(view: View, center_lon: f64) -> Self {
        let scale = (view.width as f64 / (2.0 * PI)).min(view.height as f64 / PI);
        let translate = [view.width as f64 / 2.0, view.height as f64 / 2.0];
        Self::new(center_lon, scale, translate)
    }
}

impl Projection for Equirectangular {
    fn project(&self, lon: f64, lat: f64) -> Option<[f64; 2]> {
        let lambda = wrap_pi((lon - self.center_lon) * DEG);
        let p = [
            self.translate[0] + self.scale * lambda,
            self.translate[1] - self.scale * lat * DEG,
        ];
        (p[0].is_finite() && p[1].is_finite()).then_some(p)
    }

    fn invert(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        let lambda = (x - self.translate[0]) / self.scale;
        let phi = (self.translate[1] - y) / self.scale;
        if !(lambda.abs() <= PI && phi.abs() <= FRAC_PI_2) {
            return None;
        }
        let lon = wrap_pi(lambda + self.center_lon * DEG) / DEG;
        Some([lon, phi / DEG])
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn bounds(&self, view: View) -> ViewBounds {
        let [tx, ty] = self.translate;
        ViewBounds::clamped(
            [tx - self.scale * PI, ty - self.scale * FRAC_PI_2],
            [tx + self.scale * PI, ty + self.scale * FRAC_PI_2],
            view,
        )
    }
}
