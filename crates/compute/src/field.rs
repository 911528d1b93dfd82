use foundation::bounds::ViewBounds;
use layers::RgbaImage;
use rand::Rng;

/// Attempts made after the first when looking for a defined pixel.
pub const RANDOMIZE_RETRIES: usize = 30;

/// Value of the field at one pixel block.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FieldSample {
    /// Outside the drawable area of the projection.
    Outside,
    /// Inside the boundary but without data, e.g. land in an ocean field.
    Hole,
    /// Screen-space `[u, v]` in pixels per frame and the raw magnitude.
    Flow([f32; 3]),
}

impl FieldSample {
    pub fn vector(&self) -> Option<[f64; 3]> {
        match *self {
            FieldSample::Flow([u, v, m]) => Some([u as f64, v as f64, m as f64]),
            _ => None,
        }
    }
}

/// Screen-space field produced by a finished build.
///
/// Samples are stored once per `stride x stride` block. Column `k` covers
/// `x` in `bounds.x + k * stride .. bounds.x + (k + 1) * stride`, and rows
/// are laid out the same way from `bounds.y`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    bounds: ViewBounds,
    stride: usize,
    columns: usize,
    rows: usize,
    samples: Vec<FieldSample>,
    overlay: RgbaImage,
}

impl Field {
    pub(crate) fn new(
        bounds: ViewBounds,
        stride: usize,
        rows: usize,
        samples: Vec<FieldSample>,
        overlay: RgbaImage,
    ) -> Self {
        let columns = if rows == 0 { 0 } else { samples.len() / rows };
        Self {
            bounds,
            stride,
            columns,
            rows,
            samples,
            overlay,
        }
    }

    pub fn bounds(&self) -> ViewBounds {
        self.bounds
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Colored overlay pixels for the visible area.
    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    /// Sample at the pixel nearest to `(x, y)`.
    pub fn sample(&self, x: f64, y: f64) -> FieldSample {
        if !(x.is_finite() && y.is_finite()) {
            return FieldSample::Outside;
        }
        let dx = x.round() as i64 - self.bounds.x as i64;
        let dy = y.round() as i64 - self.bounds.y as i64;
        if dx < 0 || dy < 0 {
            return FieldSample::Outside;
        }
        let col = dx as usize / self.stride;
        let row = dy as usize / self.stride;
        if col >= self.columns || row >= self.rows {
            return FieldSample::Outside;
        }
        self.samples[col * self.rows + row]
    }

    /// `[u, v, magnitude]` at `(x, y)`, or `None` where the field is undefined.
    pub fn vector(&self, x: f64, y: f64) -> Option<[f64; 3]> {
        self.sample(x, y).vector()
    }

    pub fn is_defined(&self, x: f64, y: f64) -> bool {
        matches!(self.sample(x, y), FieldSample::Flow(_))
    }

    /// True inside the field's outer boundary, even over holes.
    pub fn is_inside_boundary(&self, x: f64, y: f64) -> bool {
        !matches!(self.sample(x, y), FieldSample::Outside)
    }

    /// Picks a random pixel inside the bounds, preferring defined ones.
    ///
    /// Gives up after [`RANDOMIZE_RETRIES`] retries and returns the last
    /// candidate so fields without any data cannot stall the caller.
    pub fn randomize<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let b = self.bounds;
        if b.is_empty() {
            return (b.x as f64, b.y as f64);
        }
        let mut candidate = (0.0, 0.0);
        for _ in 0..=RANDOMIZE_RETRIES {
            candidate = (
                rng.gen_range(b.x..=b.x_max) as f64,
                rng.gen_range(b.y..=b.y_max) as f64,
            );
            if self.is_defined(candidate.0, candidate.1) {
                break;
            }
        }
        candidate
    }

    /// Drops the backing storage. Every point reads as outside afterwards.
    pub fn release(&mut self) {
        self.samples = Vec::new();
        self.columns = 0;
        self.rows = 0;
    }

    pub fn is_released(&self) -> bool {
        self.samples.is_empty()
    }
}
