use foundation::bounds::ViewBounds;

use crate::raster::RgbaImage;
use crate::symbology::Rgba;

/// A 2D surface that particle trails are drawn onto.
pub trait TrailSurface {
    /// Keeps `keep` of the existing opacity inside `bounds`, fading old trails.
    fn fade(&mut self, bounds: ViewBounds, keep: f64);

    /// Draws a batch of `[x0, y0, x1, y1]` segments with one color.
    fn stroke_segments(&mut self, color: Rgba, width: f64, segments: &[[f64; 4]]);

    fn clear(&mut self);
}

/// Software trail surface backed by an [`RgbaImage`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrailCanvas {
    image: RgbaImage,
    strokes: u64,
}

impl TrailCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            strokes: 0,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Number of batched stroke calls so far.
    pub fn stroke_calls(&self) -> u64 {
        self.strokes
    }

    fn plot(&mut self, x: f64, y: f64, color: Rgba, half: i32) {
        let cx = x.floor() as i32;
        let cy = y.floor() as i32;
        for dy in -half..=half {
            for dx in -half..=half {
                self.image.blend(cx + dx, cy + dy, color);
            }
        }
    }

    fn line(&mut self, s: [f64; 4], color: Rgba, half: i32) {
        let [x0, y0, x1, y1] = s;
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return;
        }
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as usize;
        for k in 0..=steps {
            let t = k as f64 / steps as f64;
            self.plot(x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, color, half);
        }
    }
}

impl TrailSurface for TrailCanvas {
    fn fade(&mut self, bounds: ViewBounds, keep: f64) {
        self.image
            .scale_alpha(bounds.x, bounds.y, bounds.x_max, bounds.y_max, keep);
    }

    fn stroke_segments(&mut self, color: Rgba, width: f64, segments: &[[f64; 4]]) {
        self.strokes += 1;
        let half = ((width - 1.0) / 2.0).round().max(0.0) as i32;
        for &s in segments {
            self.line(s, color, half);
        }
    }

    fn clear(&mut self) {
        self.image.fill([0, 0, 0, 0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strokes_cover_both_endpoints() {
        let mut c = TrailCanvas::new(10, 10);
        c.stroke_segments([255, 255, 255, 255], 1.0, &[[1.0, 1.0, 5.0, 3.0]]);
        assert_eq!(c.image().get(1, 1), Some([255, 255, 255, 255]));
        assert_eq!(c.image().get(5, 3), Some([255, 255, 255, 255]));
        assert_eq!(c.image().get(9, 9), Some([0, 0, 0, 0]));
        assert_eq!(c.stroke_calls(), 1);
    }

    #[test]
    fn fade_reduces_opacity_inside_bounds() {
        let mut c = TrailCanvas::new(4, 4);
        c.stroke_segments([255, 255, 255, 255], 1.0, &[[0.0, 0.0, 3.0, 0.0]]);
        c.fade(ViewBounds::new(0, 0, 1, 3), 0.5);
        assert_eq!(c.image().get(0, 0).unwrap()[3], 127);
        assert_eq!(c.image().get(3, 0).unwrap()[3], 255);
    }

    #[test]
    fn clear_erases_everything() {
        let mut c = TrailCanvas::new(2, 2);
        c.stroke_segments([9, 9, 9, 255], 3.0, &[[0.0, 0.0, 1.0, 1.0]]);
        c.clear();
        assert_eq!(c.image().get(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn non_finite_segments_are_skipped() {
        let mut c = TrailCanvas::new(2, 2);
        c.stroke_segments([9, 9, 9, 255], 1.0, &[[f64::NAN, 0.0, 1.0, 1.0]]);
        assert_eq!(c.image().get(1, 1), Some([0, 0, 0, 0]));
    }
}
