//! Scalar helpers for geographic coordinates in degrees.

use std::f64::consts::PI;

/// Radians per degree.
pub const DEG: f64 = PI / 180.0;

/// Modulo whose result takes the sign of the divisor, so `floor_mod(-10, 360) == 350`.
pub fn floor_mod(a: f64, n: f64) -> f64 {
    a - n * (a / n).floor()
}

/// Wraps an angle in radians into `[-PI, PI)`.
pub fn wrap_pi(rad: f64) -> f64 {
    floor_mod(rad + PI, 2.0 * PI) - PI
}

/// Normalizes a longitude in degrees into `[-180, 180)`.
pub fn normalize_lon(lon: f64) -> f64 {
    floor_mod(180.0 + lon, 360.0) - 180.0
}

/// Position of `x` within `[low, high]`, clamped to `[0, 1]`.
pub fn proportion(x: f64, low: f64, high: f64) -> f64 {
    (x.clamp(low, high) - low) / (high - low)
}

/// Inverse of [`proportion`]: maps `p` in `[0, 1]` onto `[low, high]`.
pub fn spread(p: f64, low: f64, high: f64) -> f64 {
    p * (high - low) + low
}
