/// Size of the drawable viewport in pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct View {
    pub width: u32,
    pub height: u32,
}

impl View {
    pub fn new(width: u32, height: u32) -> Self {
        View { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Screen-space rectangle covered by a projected globe.
///
/// Both `x_max` and `y_max` are inclusive, so `width == x_max - x + 1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ViewBounds {
    pub x: i32,
    pub y: i32,
    pub x_max: i32,
    pub y_max: i32,
    pub width: i32,
    pub height: i32,
}

impl ViewBounds {
    pub fn new(x: i32, y: i32, x_max: i32, y_max: i32) -> Self {
        ViewBounds {
            x,
            y,
            x_max,
            y_max,
            width: x_max - x + 1,
            height: y_max - y + 1,
        }
    }

    /// Rounds a floating-point extent outward and clamps it to the view.
    pub fn clamped(min: [f64; 2], max: [f64; 2], view: View) -> Self {
        let x = (min[0].floor() as i32).max(0);
        let y = (min[1].floor() as i32).max(0);
        let x_max = (max[0].ceil() as i32).min(view.width as i32 - 1);
        let y_max = (max[1].ceil() as i32).min(view.height as i32 - 1);
        ViewBounds::new(x, y, x_max, y_max)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x <= self.x_max && y >= self.y && y <= self.y_max
    }
}

#[cfg(test)]
mod tests {
    use super::{View, ViewBounds};

    #[test]
    fn clamped_rounds_outward_and_clips_to_view() {
        let b = ViewBounds::clamped([-10.5, 20.2], [99.1, 1000.0], View::new(100, 50));
        assert_eq!(b, ViewBounds::new(0, 20, 99, 49));
        assert_eq!(b.width, 100);
        assert_eq!(b.height, 30);
    }

    #[test]
    fn contains_is_inclusive() {
        let b = ViewBounds::new(2, 3, 4, 5);
        assert!(b.contains(2, 3));
        assert!(b.contains(4, 5));
        assert!(!b.contains(5, 5));
        assert!(!b.contains(1, 4));
    }

    #[test]
    fn inverted_extent_is_empty() {
        let b = ViewBounds::clamped([500.0, 500.0], [600.0, 600.0], View::new(100, 100));
        assert!(b.is_empty());
    }
}
