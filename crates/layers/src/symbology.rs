use foundation::math::{proportion, spread};

pub type Rgba = [u8; 4];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];

/// One control point of a [`ColorScale`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColorStop {
    pub value: f64,
    pub rgb: [u8; 3],
    /// Opacity in `[0, 1]`, used only when drawing legends.
    pub alpha: f64,
}

impl ColorStop {
    pub const fn new(value: f64, rgb: [u8; 3], alpha: f64) -> Self {
        Self { value, rgb, alpha }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleError {
    TooFewStops(usize),
    Unordered { index: usize },
}

impl std::fmt::Display for ScaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleError::TooFewStops(n) => write!(f, "color scale needs at least 2 stops, got {n}"),
            ScaleError::Unordered { index } => {
                write!(f, "color stop values must increase (stop {index})")
            }
        }
    }
}

impl std::error::Error for ScaleError {}

/// Piecewise-linear color ramp over a scalar domain.
///
/// A value is colored by the first segment whose upper stop is at or above
/// it; the last segment takes everything beyond. Within a segment the
/// position is clamped, so values outside the stops get the end colors.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    stops: Vec<ColorStop>,
    bounds: [f64; 2],
}

impl ColorScale {
    pub fn segmented(stops: Vec<ColorStop>) -> Result<Self, ScaleError> {
        if stops.len() < 2 {
            return Err(ScaleError::TooFewStops(stops.len()));
        }
        if let Some(index) = (1..stops.len()).find(|&i| stops[i].value <= stops[i - 1].value) {
            return Err(ScaleError::Unordered { index });
        }
        let bounds = [stops[0].value, stops[stops.len() - 1].value];
        Ok(Self { stops, bounds })
    }

    /// Domain shown by the color bar, which may differ from the stop range.
    pub fn with_bounds(mut self, bounds: [f64; 2]) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bounds(&self) -> [f64; 2] {
        self.bounds
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    pub fn gradient(&self, value: f64, alpha: u8) -> Rgba {
        let last_segment = self.stops.len() - 2;
        let mut i = 0;
        while i < last_segment && value > self.stops[i + 1].value {
            i += 1;
        }
        let (a, b) = (self.stops[i], self.stops[i + 1]);
        let p = proportion(value, a.value, b.value);
        [
            channel(a.rgb[0], b.rgb[0], p),
            channel(a.rgb[1], b.rgb[1], p),
            channel(a.rgb[2], b.rgb[2], p),
            alpha,
        ]
    }

    /// Stop colors with their own opacity, for legends.
    pub fn legend(&self) -> Vec<(f64, Rgba)> {
        self.stops
            .iter()
            .map(|s| {
                let a = (s.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
                (s.value, [s.rgb[0], s.rgb[1], s.rgb[2], a])
            })
            .collect()
    }

    /// Maps a color-bar position in `[0, 1]` to a value in the scale bounds.
    pub fn spread(&self, fraction: f64) -> f64 {
        spread(fraction, self.bounds[0], self.bounds[1])
    }
}

fn channel(start: u8, end: u8, p: f64) -> u8 {
    let v = (start as f64 + p * (end as f64 - start as f64)).floor();
    if v.is_nan() { start } else { v.clamp(0.0, 255.0) as u8 }
}

/// Grayscale ramp used to batch particles by speed.
///
/// Bucket `i` has gray level `85 + i * step`, and magnitudes are mapped with
/// `floor(clamp(m, 0, max) / (max / (n - 1)))`.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityScale {
    colors: Vec<Rgba>,
    max: f64,
}

impl IntensityScale {
    pub fn new(step: u8, max: f64) -> Self {
        let step = step.max(1) as usize;
        let colors = (85..=255usize)
            .step_by(step)
            .map(|j| [j as u8, j as u8, j as u8, 255])
            .collect();
        Self { colors, max }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn color(&self, index: usize) -> Rgba {
        self.colors[index.min(self.colors.len() - 1)]
    }

    pub fn colors(&self) -> &[Rgba] {
        &self.colors
    }

    pub fn index_for(&self, magnitude: f64) -> usize {
        if self.colors.len() < 2 || !(self.max > 0.0) {
            return 0;
        }
        let step = self.max / (self.colors.len() - 1) as f64;
        let m = if magnitude.is_nan() { 0.0 } else { magnitude.clamp(0.0, self.max) };
        ((m / step).floor() as usize).min(self.colors.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale() -> ColorScale {
        ColorScale::segmented(vec![
            ColorStop::new(0.0, [0, 0, 0], 0.6),
            ColorStop::new(10.0, [100, 200, 50], 0.6),
            ColorStop::new(20.0, [200, 0, 250], 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_within_segment() {
        assert_eq!(scale().gradient(5.0, 102), [50, 100, 25, 102]);
        assert_eq!(scale().gradient(15.0, 7), [150, 100, 150, 7]);
    }

    #[test]
    fn clamps_outside_stops() {
        assert_eq!(scale().gradient(-3.0, 255), [0, 0, 0, 255]);
        assert_eq!(scale().gradient(99.0, 255), [200, 0, 250, 255]);
    }

    #[test]
    fn stop_value_uses_lower_segment() {
        assert_eq!(scale().gradient(10.0, 255), [100, 200, 50, 255]);
    }

    #[test]
    fn gradient_is_pure() {
        let s = scale();
        assert_eq!(s.gradient(12.3, 80), s.gradient(12.3, 80));
    }

    #[test]
    fn rejects_bad_stops() {
        assert_eq!(
            ColorScale::segmented(vec![ColorStop::new(0.0, [0, 0, 0], 1.0)]),
            Err(ScaleError::TooFewStops(1))
        );
        assert_eq!(
            ColorScale::segmented(vec![
                ColorStop::new(1.0, [0, 0, 0], 1.0),
                ColorStop::new(1.0, [0, 0, 0], 1.0),
            ]),
            Err(ScaleError::Unordered { index: 1 })
        );
    }

    #[test]
    fn legend_uses_stop_alpha() {
        let legend = scale().legend();
        assert_eq!(legend[0], (0.0, [0, 0, 0, 153]));
        assert_eq!(legend[2].1[3], 255);
    }

    #[test]
    fn spread_maps_into_bounds() {
        let s = scale().with_bounds([0.0, 40.0]);
        assert_eq!(s.spread(0.25), 10.0);
    }

    #[test]
    fn intensity_scale_has_eighteen_gray_buckets() {
        let s = IntensityScale::new(10, 17.0);
        assert_eq!(s.len(), 18);
        assert_eq!(s.color(0), [85, 85, 85, 255]);
        assert_eq!(s.color(17), [255, 255, 255, 255]);
    }

    #[test]
    fn intensity_index_clamps_and_is_stable() {
        let s = IntensityScale::new(10, 17.0);
        assert_eq!(s.index_for(-1.0), 0);
        assert_eq!(s.index_for(0.99), 0);
        assert_eq!(s.index_for(1.0), 1);
        assert_eq!(s.index_for(17.0), 17);
        assert_eq!(s.index_for(1e9), 17);
        assert_eq!(s.index_for(8.5), s.index_for(8.5));
    }
}
