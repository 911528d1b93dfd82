//! Projects a grid onto the screen as a time-sliced task.
//!
//! The build runs in two phases. First the visibility mask is computed row by
//! row, then screen columns are interpolated left to right in steps of the
//! resolution stride. Both phases check the batch budget after every row or
//! column and yield when it is spent; cancellation is checked at the start of
//! every batch.

use std::str::FromStr;
use std::sync::Arc;

use foundation::bounds::{View, ViewBounds};
use foundation::math::Projection;
use layers::{ColorScale, Mask, TRANSPARENT};
use runtime::{Step, StepContext, Task};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::field::{Field, FieldSample};
use crate::grid::{Grid, Sample};

/// Pixel block size for field builds; coarser is faster.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Full,
    Half,
    #[default]
    Quarter,
}

impl Resolution {
    pub fn stride(self) -> usize {
        match self {
            Resolution::Full => 1,
            Resolution::Half => 2,
            Resolution::Quarter => 4,
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" | "hd" => Ok(Resolution::Full),
            "half" => Ok(Resolution::Half),
            "quarter" | "sd" => Ok(Resolution::Quarter),
            other => Err(format!("unknown resolution {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    MaskSize { mask: View, view: View },
    Finished,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldError::MaskSize { mask, view } => write!(
                f,
                "mask is {}x{} but the view is {}x{}",
                mask.width, mask.height, view.width, view.height
            ),
            FieldError::Finished => write!(f, "field build already finished"),
        }
    }
}

impl std::error::Error for FieldError {}

/// Applies the projection's local distortion to a wind vector.
///
/// `scale` converts data units into pixels per frame. The magnitude is kept
/// in data units.
pub fn distort(
    projection: &dyn Projection,
    lon: f64,
    lat: f64,
    x: f64,
    y: f64,
    scale: f64,
    wind: [f64; 3],
) -> [f64; 3] {
    let u = wind[0] * scale;
    let v = wind[1] * scale;
    let d = projection.distortion(lon, lat, x, y);
    [d[0] * u + d[2] * v, d[1] * u + d[3] * v, wind[2]]
}

/// Everything a field build reads.
#[derive(Clone)]
pub struct FieldRequest {
    pub projection: Arc<dyn Projection>,
    pub view: View,
    pub primary: Arc<Grid>,
    /// Grid used for overlay colors when it differs from `primary`.
    pub overlay: Option<Arc<Grid>>,
    /// Screen speed per unit of data, as a fraction of the bounds height.
    pub velocity_scale: f64,
    /// Overlay coloring; `None` leaves the overlay transparent.
    pub color_scale: Option<ColorScale>,
    pub overlay_alpha: u8,
    pub resolution: Resolution,
}

pub struct FieldBuilder {
    request: FieldRequest,
    bounds: ViewBounds,
    stride: usize,
    rows: usize,
    velocity: f64,
    mask: Option<Mask>,
    mask_rows: u32,
    x: i32,
    samples: Vec<FieldSample>,
    started_ms: Option<f64>,
}

impl FieldBuilder {
    pub fn new(request: FieldRequest) -> Self {
        let mask = Mask::new(request.view);
        Self::assemble(request, mask, 0)
    }

    /// Uses a precomputed visibility mask instead of deriving one.
    pub fn with_mask(request: FieldRequest, mask: Mask) -> Result<Self, FieldError> {
        if mask.view() != request.view {
            return Err(FieldError::MaskSize {
                mask: mask.view(),
                view: request.view,
            });
        }
        let rows = request.view.height;
        Ok(Self::assemble(request, mask, rows))
    }

    fn assemble(request: FieldRequest, mask: Mask, mask_rows: u32) -> Self {
        let bounds = request.projection.bounds(request.view);
        let stride = request.resolution.stride();
        let rows = if bounds.is_empty() {
            0
        } else {
            (bounds.height as usize).div_ceil(stride)
        };
        let velocity = bounds.height as f64 * request.velocity_scale;
        Self {
            bounds,
            stride,
            rows,
            velocity,
            mask: Some(mask),
            mask_rows,
            x: bounds.x,
            samples: Vec::new(),
            started_ms: None,
            request,
        }
    }

    pub fn bounds(&self) -> ViewBounds {
        self.bounds
    }

    /// Columns interpolated so far.
    pub fn columns_done(&self) -> usize {
        if self.rows == 0 { 0 } else { self.samples.len() / self.rows }
    }

    fn progress(&self) -> f64 {
        let span = (self.bounds.x_max - self.bounds.x) as f64;
        if span <= 0.0 {
            1.0
        } else {
            (self.x - self.bounds.x) as f64 / span
        }
    }

    fn interpolate_column(&mut self, mask: &mut Mask, x: i32) {
        let projection = &*self.request.projection;
        let stride = self.stride as i32;
        let mut y = self.bounds.y;
        while y <= self.bounds.y_max {
            let mut sample = FieldSample::Outside;
            if mask.is_visible(x, y) {
                let mut color = TRANSPARENT;
                if let Some([lon, lat]) = projection.invert(x as f64, y as f64)
                    && lon.is_finite()
                {
                    let mut scalar = None;
                    sample = match self.request.primary.interpolate(lon, lat) {
                        Some(Sample::Vector(wind)) => {
                            let w = distort(projection, lon, lat, x as f64, y as f64, self.velocity, wind);
                            scalar = Some(w[2]);
                            FieldSample::Flow([w[0] as f32, w[1] as f32, w[2] as f32])
                        }
                        Some(Sample::Scalar(s)) => {
                            scalar = Some(s);
                            FieldSample::Flow([0.0, 0.0, s as f32])
                        }
                        None => FieldSample::Hole,
                    };
                    if let Some(overlay) = &self.request.overlay {
                        scalar = overlay.interpolate_scalar(lon, lat);
                    }
                    if let (Some(s), Some(scale)) = (scalar, &self.request.color_scale)
                        && s.is_finite()
                    {
                        color = scale.gradient(s, self.request.overlay_alpha);
                    }
                }
                for dy in 0..stride {
                    for dx in 0..stride {
                        mask.set(x + dx, y + dy, color);
                    }
                }
            }
            self.samples.push(sample);
            y += stride;
        }
    }

    fn finish(&mut self, mask: Mask, cx: &StepContext<'_>) -> Field {
        let elapsed_ms = self.started_ms.map(|t| cx.now_ms() - t).unwrap_or_default();
        debug!(
            columns = self.columns_done(),
            rows = self.rows,
            stride = self.stride,
            elapsed_ms,
            "field built"
        );
        Field::new(
            self.bounds,
            self.stride,
            self.rows,
            std::mem::take(&mut self.samples),
            mask.into_image(),
        )
    }
}

impl Task for FieldBuilder {
    type Output = Field;
    type Error = FieldError;

    fn step(&mut self, cx: &mut StepContext<'_>) -> Step<Field, FieldError> {
        if cx.is_canceled() {
            debug!(columns = self.columns_done(), "field build canceled");
            return Step::Canceled;
        }
        let Some(mut mask) = self.mask.take() else {
            return Step::Failed(FieldError::Finished);
        };
        if self.started_ms.is_none() {
            self.started_ms = Some(cx.now_ms());
        }

        while self.mask_rows < self.request.view.height {
            mask.mark_row(&*self.request.projection, self.mask_rows);
            self.mask_rows += 1;
            if cx.should_yield() {
                self.mask = Some(mask);
                return Step::progress(0.0);
            }
        }

        while self.x < self.bounds.x_max {
            let x = self.x;
            self.interpolate_column(&mut mask, x);
            self.x += self.stride as i32;
            if cx.should_yield() {
                self.mask = Some(mask);
                let progress = self.progress();
                debug!(progress, "field build yielding");
                return Step::progress(progress);
            }
        }

        Step::Ready(self.finish(mask, cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::{GridHeader, GridRecord};
    use foundation::math::{Equirectangular, Orthographic};
    use layers::ColorStop;
    use runtime::{CancelToken, ManualClock, run_to_completion};

    fn header() -> GridHeader {
        GridHeader {
            lo1: 0.0,
            la1: 90.0,
            lo2: None,
            la2: None,
            dx: 10.0,
            dy: 10.0,
            nx: 36,
            ny: 19,
            ref_time: "2014-01-31T00:00:00Z".to_string(),
            forecast_time: 0,
            center: None,
            center_name: None,
            parameter_category: None,
            parameter_number: None,
            surface1_type: None,
            surface1_value: None,
        }
    }

    fn record(f: impl Fn(usize, usize) -> Option<f64>) -> GridRecord {
        let h = header();
        let mut data = Vec::new();
        for j in 0..h.ny {
            for i in 0..h.nx {
                data.push(f(i, j));
            }
        }
        GridRecord { header: h, data }
    }

    fn wind(missing: impl Fn(usize) -> bool + Copy) -> Arc<Grid> {
        let u = record(|i, _| (!missing(i)).then_some(1.0));
        let v = record(|i, _| (!missing(i)).then_some(0.0));
        Arc::new(Grid::vector(&u, &v).unwrap())
    }

    fn scale() -> ColorScale {
        ColorScale::segmented(vec![
            ColorStop::new(0.0, [0, 0, 255], 1.0),
            ColorStop::new(10.0, [255, 0, 0], 1.0),
        ])
        .unwrap()
    }

    fn flat_request(resolution: Resolution) -> FieldRequest {
        let view = View::new(72, 36);
        FieldRequest {
            projection: Arc::new(Equirectangular::fit(view, 0.0)),
            view,
            primary: wind(|_| false),
            overlay: None,
            velocity_scale: 1.0 / 36.0,
            color_scale: Some(scale()),
            overlay_alpha: 102,
            resolution,
        }
    }

    fn build(request: FieldRequest) -> Field {
        let clock = ManualClock::new(0.0);
        match run_to_completion(&mut FieldBuilder::new(request), &CancelToken::new(), &clock) {
            Step::Ready(field) => field,
            other => panic!("unexpected outcome {:?}", other.is_pending()),
        }
    }

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    struct Identity;

    impl Projection for Identity {
        fn project(&self, lon: f64, lat: f64) -> Option<[f64; 2]> {
            Some([lon, lat])
        }
        fn invert(&self, x: f64, y: f64) -> Option<[f64; 2]> {
            Some([x, y])
        }
        fn scale(&self) -> f64 {
            1.0
        }
        fn bounds(&self, view: View) -> ViewBounds {
            ViewBounds::new(0, 0, view.width as i32 - 1, view.height as i32 - 1)
        }
        fn distortion(&self, _lon: f64, _lat: f64, _x: f64, _y: f64) -> [f64; 4] {
            [1.0, 0.0, 0.0, 1.0]
        }
    }

    #[test]
    fn identity_distortion_keeps_wind() {
        let w = distort(&Identity, 12.0, 34.0, 5.0, 6.0, 1.0, [1.0, 0.0, 1.0]);
        assert_eq!(w, [1.0, 0.0, 1.0]);
    }

    #[test]
    fn distortion_scales_components_but_not_magnitude() {
        let w = distort(&Identity, 0.0, 0.0, 0.0, 0.0, 3.0, [1.0, 2.0, 5.0f64.sqrt()]);
        assert_eq!(w[0], 3.0);
        assert_eq!(w[1], 6.0);
        assert_eq!(w[2], 5.0f64.sqrt());
    }

    #[test]
    fn equator_wind_points_east_in_pixels() {
        let field = build(flat_request(Resolution::Full));
        let v = field.vector(36.0, 18.0).unwrap();
        assert_close(v[0], 0.2, 1e-4);
        assert_close(v[1], 0.0, 1e-4);
        assert_close(v[2], 1.0, 1e-6);
    }

    #[test]
    fn missing_data_inside_the_map_is_a_hole() {
        let mut request = flat_request(Resolution::Full);
        request.primary = wind(|i| i <= 6);
        let field = build(request);
        // lon 30E on the equator, then lon 90W.
        assert_eq!(field.sample(42.0, 18.0), FieldSample::Hole);
        assert!(field.is_inside_boundary(42.0, 18.0));
        assert!(field.is_defined(18.0, 18.0));
    }

    #[test]
    fn off_globe_pixels_are_outside() {
        let view = View::new(40, 40);
        let mut request = flat_request(Resolution::Full);
        request.projection = Arc::new(Orthographic::new([0.0, 0.0], 15.0, [20.0, 20.0]));
        request.view = view;
        let field = build(request);
        assert_eq!(field.bounds(), ViewBounds::new(5, 5, 35, 35));
        assert_eq!(field.sample(6.0, 6.0), FieldSample::Outside);
        assert!(field.is_defined(20.0, 20.0));
        assert_eq!(field.overlay().get(6, 6).unwrap()[3], 0);
        assert_eq!(field.overlay().get(20, 20).unwrap()[3], 102);
    }

    #[test]
    fn distinct_overlay_drives_colors() {
        let mut request = flat_request(Resolution::Half);
        request.overlay = Some(Arc::new(Grid::scalar(&record(|_, _| Some(7.0))).unwrap()));
        let expected = scale().gradient(7.0, 102);
        let field = build(request);
        assert_eq!(field.overlay().get(36, 18), Some(expected));
        assert_eq!(field.overlay().get(37, 19), Some(expected));
    }

    #[test]
    fn blocks_replicate_values() {
        let field = build(flat_request(Resolution::Quarter));
        assert_eq!(field.stride(), 4);
        assert_eq!(field.sample(36.0, 16.0), field.sample(39.0, 19.0));
    }

    #[test]
    fn time_slicing_matches_a_single_pass() {
        let expected = build(flat_request(Resolution::Full));

        // Every clock read costs 1 ms, so a 10 ms budget forces many yields.
        let clock = ManualClock::with_auto_advance(0.0, 1.0);
        let cancel = CancelToken::new();
        let mut builder = FieldBuilder::new(flat_request(Resolution::Full));
        let mut batches = 0;
        let mut last_progress = 0.0;
        let field = loop {
            batches += 1;
            let mut cx = StepContext::new(&cancel, &clock, 10.0);
            match builder.step(&mut cx) {
                Step::Pending { progress } => {
                    let p = progress.unwrap_or(0.0);
                    assert!(p >= last_progress && p <= 1.0);
                    last_progress = p;
                }
                Step::Ready(field) => break field,
                _ => panic!("build did not finish"),
            }
        };
        assert!(batches > 5, "only {batches} batches");
        assert_eq!(field, expected);
    }

    #[test]
    fn canceled_build_stops_writing_columns() {
        let clock = ManualClock::with_auto_advance(0.0, 1.0);
        let cancel = CancelToken::new();
        let mut builder = FieldBuilder::new(flat_request(Resolution::Full));
        loop {
            let mut cx = StepContext::new(&cancel, &clock, 5.0);
            match builder.step(&mut cx) {
                Step::Pending { .. } if builder.columns_done() > 0 => break,
                Step::Pending { .. } => {}
                _ => panic!("finished too early"),
            }
        }
        let done = builder.columns_done();
        cancel.cancel();
        let mut cx = StepContext::new(&cancel, &clock, 5.0);
        assert!(matches!(builder.step(&mut cx), Step::Canceled));
        assert_eq!(builder.columns_done(), done);
    }

    #[test]
    fn mask_must_match_view() {
        let request = flat_request(Resolution::Full);
        let mask = Mask::full(View::new(10, 10));
        assert!(matches!(
            FieldBuilder::with_mask(request, mask),
            Err(FieldError::MaskSize { .. })
        ));
    }

    #[test]
    fn resolution_names() {
        assert_eq!("full".parse::<Resolution>(), Ok(Resolution::Full));
        assert_eq!("sd".parse::<Resolution>(), Ok(Resolution::Quarter));
        assert!("ultra".parse::<Resolution>().is_err());
        assert_eq!(Resolution::default().stride(), 4);
    }
}
