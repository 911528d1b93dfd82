use foundation::bounds::View;
use foundation::math::Projection;

use crate::symbology::Rgba;

/// Row-major RGBA8 pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbaImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Rgba> {
        let i = self.offset(x, y)?;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    /// Writes a pixel; coordinates outside the image are ignored.
    pub fn set(&mut self, x: i32, y: i32, rgba: Rgba) {
        if let Some(i) = self.offset(x, y) {
            self.data[i..i + 4].copy_from_slice(&rgba);
        }
    }

    /// Source-over blend of `rgba` onto the pixel at `(x, y)`.
    pub fn blend(&mut self, x: i32, y: i32, rgba: Rgba) {
        if let Some(i) = self.offset(x, y) {
            let dst = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
            self.data[i..i + 4].copy_from_slice(&source_over(rgba, dst));
        }
    }

    pub fn fill(&mut self, rgba: Rgba) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Scales the alpha of every pixel inside the inclusive rectangle.
    pub fn scale_alpha(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, keep: f64) {
        let x0 = x0.max(0);
        let y0 = y0.max(0);
        let x1 = x1.min(self.width as i32 - 1);
        let y1 = y1.min(self.height as i32 - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if let Some(i) = self.offset(x, y) {
                    let a = self.data[i + 3] as f64 * keep;
                    self.data[i + 3] = a.floor().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }

    /// Draws `top` over this image. Images must have the same size.
    pub fn composite(&mut self, top: &RgbaImage) {
        if top.width != self.width || top.height != self.height {
            return;
        }
        for (dst, src) in self.data.chunks_exact_mut(4).zip(top.data.chunks_exact(4)) {
            let out = source_over([src[0], src[1], src[2], src[3]], [dst[0], dst[1], dst[2], dst[3]]);
            dst.copy_from_slice(&out);
        }
    }

    /// Binary PPM (P6) of the image flattened onto `background`.
    pub fn to_ppm(&self, background: [u8; 3]) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.reserve(self.width as usize * self.height as usize * 3);
        for px in self.data.chunks_exact(4) {
            let a = px[3] as f64 / 255.0;
            for c in 0..3 {
                let v = px[c] as f64 * a + background[c] as f64 * (1.0 - a);
                out.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
        out
    }
}

fn source_over(src: Rgba, dst: Rgba) -> Rgba {
    let sa = src[3] as f64 / 255.0;
    let da = dst[3] as f64 / 255.0;
    let oa = sa + da * (1.0 - sa);
    if oa <= 0.0 {
        return [0, 0, 0, 0];
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f64 * sa + dst[c] as f64 * da * (1.0 - sa)) / oa;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

/// Per-pixel visibility of the projected sphere plus the overlay colors
/// written for visible pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    view: View,
    visible: Vec<bool>,
    image: RgbaImage,
}

impl Mask {
    /// Nothing visible yet; rows are filled in with [`Mask::mark_row`].
    pub fn new(view: View) -> Self {
        Self {
            view,
            visible: vec![false; view.pixel_count()],
            image: RgbaImage::new(view.width, view.height),
        }
    }

    /// A pixel is visible when it inverts to a geographic position.
    pub fn from_projection(projection: &dyn Projection, view: View) -> Self {
        let mut mask = Self::new(view);
        for y in 0..view.height {
            mask.mark_row(projection, y);
        }
        mask
    }

    /// Computes visibility for one pixel row.
    pub fn mark_row(&mut self, projection: &dyn Projection, y: u32) {
        if y >= self.view.height {
            return;
        }
        let start = y as usize * self.view.width as usize;
        for x in 0..self.view.width {
            self.visible[start + x as usize] = projection.invert(x as f64, y as f64).is_some();
        }
    }

    /// Everything visible; useful for flat maps and tests.
    pub fn full(view: View) -> Self {
        Self {
            view,
            visible: vec![true; view.pixel_count()],
            image: RgbaImage::new(view.width, view.height),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn is_visible(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.view.width as i32 || y >= self.view.height as i32 {
            return false;
        }
        self.visible[y as usize * self.view.width as usize + x as usize]
    }

    pub fn set(&mut self, x: i32, y: i32, rgba: Rgba) {
        self.image.set(x, y, rgba);
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}
