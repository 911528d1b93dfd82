//! The visualization engine: three agents and the wiring between them.
//!
//! The grid agent downloads and decodes the selected products, the field
//! agent interpolates them onto the screen, and the animator moves particles
//! through the finished field. Agents never call each other; their events
//! are routed through [`WIRING`] each time the engine is pumped.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;
use std::sync::Arc;

use catalog::{Attributes, LAYER_KEYS, OVERLAY_DEFAULT, OVERLAY_OFF, Product, Unit, products_for};
use chrono::Utc;
use compute::{
    Animation, DEFAULT_ZOOM, Field, FieldBuilder, FieldError, FieldRequest, Grid, ParticleSimulator,
    Sample, SharedSurface,
};
use formats::GridRecord;
use foundation::bounds::View;
use foundation::math::{Equirectangular, Orthographic, Projection};
use layers::{Rgba, RgbaImage, TrailCanvas, TrailSurface};
use runtime::{Agent, AgentEvent, Clock, FrameThrottle};
use streaming::{GridRequest, GridSource, LoadTask, load_request};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::status::StatusReport;

const GRID_POINT: Rgba = [255, 255, 255, 255];

/// Rounds of event routing per pump before giving up on a feedback loop.
const MAX_DISPATCH_ROUNDS: usize = 8;

/// Decoded grids for the current attributes.
#[derive(Debug)]
pub struct Grids {
    pub primary: Arc<Grid>,
    /// Same allocation as `primary` when no separate overlay was requested.
    pub overlay: Arc<Grid>,
    pub primary_product: Product,
    pub overlay_product: Product,
}

impl Grids {
    pub fn has_distinct_overlay(&self) -> bool {
        !Arc::ptr_eq(&self.primary, &self.overlay)
    }
}

/// Projection plus the viewport it draws into.
#[derive(Clone)]
pub struct Globe {
    pub projection: Arc<dyn Projection>,
    pub view: View,
    /// Scale the particle count is normalized against.
    pub zoom: f64,
}

impl Globe {
    pub fn orthographic(view: View, center: [f64; 2]) -> Self {
        Self {
            projection: Arc::new(Orthographic::fit(view, center)),
            view,
            zoom: DEFAULT_ZOOM,
        }
    }

    pub fn equirectangular(view: View, center_lon: f64) -> Self {
        Self {
            projection: Arc::new(Equirectangular::fit(view, center_lon)),
            view,
            zoom: DEFAULT_ZOOM,
        }
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Grid,
    Field,
    Animator,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Signal {
    Submit,
    Update,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reaction {
    ShowDownloading,
    ShowRendering,
    ClearStatus,
    StopAnimation,
    StartInterpolation,
    StartAnimation,
    DrawOverlay,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub source: Role,
    pub signal: Signal,
    pub reaction: Reaction,
}

const fn on(source: Role, signal: Signal, reaction: Reaction) -> Subscription {
    Subscription {
        source,
        signal,
        reaction,
    }
}

/// Who reacts to what. Reactions run in table order.
pub const WIRING: &[Subscription] = &[
    on(Role::Grid, Signal::Submit, Reaction::ShowDownloading),
    on(Role::Grid, Signal::Submit, Reaction::StopAnimation),
    on(Role::Grid, Signal::Update, Reaction::StartInterpolation),
    on(Role::Field, Signal::Submit, Reaction::ShowRendering),
    on(Role::Field, Signal::Submit, Reaction::StopAnimation),
    on(Role::Field, Signal::Update, Reaction::ClearStatus),
    on(Role::Field, Signal::Update, Reaction::StartAnimation),
    on(Role::Field, Signal::Update, Reaction::DrawOverlay),
];

/// Whether a configuration change needs new grids.
///
/// Any layer key forces a reload. A new overlay type reloads unless it is
/// `off`, or it is already what the loaded grids show.
pub fn needs_rebuild(changed: &[&str], attributes: &Attributes, grids: Option<&Grids>) -> bool {
    if changed.iter().any(|key| LAYER_KEYS.contains(key)) {
        return true;
    }
    if !changed.contains(&"overlayType") || attributes.overlay_type == OVERLAY_OFF {
        return false;
    }
    let Some(grids) = grids else {
        return true;
    };
    if attributes.overlay_type == OVERLAY_DEFAULT {
        return grids.has_distinct_overlay();
    }
    grids.overlay_product.type_name() != attributes.overlay_type
}

/// What the data says at one screen position.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub lon: f64,
    pub lat: f64,
    pub primary: Option<Sample>,
    /// Overlay scalar, only when the overlay is a separate product.
    pub overlay: Option<f64>,
    /// Screen-space flow, once a field exists.
    pub flow: Option<[f64; 3]>,
}

pub struct Engine {
    config: EngineConfig,
    runtime: Handle,
    source: Arc<dyn GridSource>,
    clock: Rc<dyn Clock>,
    attributes: Attributes,
    globe: Option<Globe>,
    grids: Agent<Grids, EngineError>,
    field: Agent<Field, FieldError>,
    animator: Agent<u64, Infallible>,
    trails: SharedSurface<TrailCanvas>,
    overlay: Option<RgbaImage>,
    status: StatusReport,
    frame_limit: Option<u64>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        runtime: Handle,
        source: Arc<dyn GridSource>,
        clock: Rc<dyn Clock>,
        attributes: Attributes,
    ) -> Self {
        Self {
            grids: Agent::new("grids", config.agent_timing()),
            field: Agent::new("field", config.agent_timing()),
            animator: Agent::new("animator", config.animation_timing()),
            config,
            runtime,
            source,
            clock,
            attributes,
            globe: None,
            trails: Rc::new(RefCell::new(TrailCanvas::new(0, 0))),
            overlay: None,
            status: StatusReport::new(),
            frame_limit: None,
        }
    }

    /// Stops each animation after `frames` drawn frames.
    pub fn set_frame_limit(&mut self, frames: Option<u64>) {
        self.frame_limit = frames;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn status(&self) -> &StatusReport {
        &self.status
    }

    pub fn grids(&self) -> Option<&Arc<Grids>> {
        self.grids.value()
    }

    pub fn field(&self) -> Option<&Arc<Field>> {
        self.field.value()
    }

    /// Overlay layer as last drawn.
    pub fn overlay(&self) -> Option<&RgbaImage> {
        self.overlay.as_ref()
    }

    pub fn trails(&self) -> &SharedSurface<TrailCanvas> {
        &self.trails
    }

    pub fn is_loading(&self) -> bool {
        self.grids.is_running()
    }

    pub fn is_interpolating(&self) -> bool {
        self.field.is_running()
    }

    pub fn is_animating(&self) -> bool {
        self.animator.is_running()
    }

    pub fn is_busy(&self) -> bool {
        self.is_loading() || self.is_interpolating() || self.is_animating()
    }

    /// Frames drawn by the last animation that ran to its frame limit.
    pub fn frames_finished(&self) -> Option<u64> {
        self.animator.value().map(|frames| **frames)
    }

    /// Earliest time any agent wants to run again.
    pub fn next_wake_ms(&self) -> Option<f64> {
        [
            self.grids.next_wake_ms(),
            self.field.next_wake_ms(),
            self.animator.next_wake_ms(),
        ]
        .into_iter()
        .flatten()
        .reduce(f64::min)
    }

    /// Shows the globe and loads grids for the current attributes.
    pub fn start(&mut self, globe: Globe) {
        self.set_globe(globe);
        self.load_grids();
    }

    /// Applies new attributes, reloading grids only when needed.
    pub fn configure(&mut self, attributes: Attributes) {
        let changed = attributes.changed(&self.attributes);
        if changed.is_empty() {
            return;
        }
        debug!(?changed, "attributes changed");
        self.status.reset();
        self.attributes = attributes;
        if needs_rebuild(&changed, &self.attributes, self.grids.value().map(|g| &**g)) {
            self.load_grids();
        } else if changed.contains(&"overlayType") || changed.contains(&"showGridPoints") {
            self.draw_overlay();
        }
    }

    /// The user started dragging or zooming: the field is about to be stale.
    pub fn move_start(&mut self) {
        self.field.cancel();
        self.animator.cancel();
        self.overlay = None;
        if let Ok(mut trails) = self.trails.try_borrow_mut() {
            trails.clear();
        }
        self.status.progress(1.0);
    }

    /// The user settled on `globe`; rebuild the field for it.
    pub fn move_end(&mut self, globe: Globe) {
        self.set_globe(globe);
        self.start_interpolation();
    }

    /// Runs whatever batches are due and routes the resulting events.
    ///
    /// Returns `true` if any agent ran.
    pub fn pump(&mut self) -> bool {
        let clock = Rc::clone(&self.clock);
        let mut ran = self.grids.drive(&*clock);
        ran |= self.field.drive(&*clock);
        ran |= self.animator.drive(&*clock);
        self.dispatch();
        ran
    }

    /// Data under the pixel `(x, y)`, or `None` off the globe or before the
    /// grids arrive.
    pub fn sample_at(&self, x: f64, y: f64) -> Option<LocationSample> {
        let globe = self.globe.as_ref()?;
        let grids = self.grids.value()?;
        let [lon, lat] = globe.projection.invert(x, y)?;
        if !(lon.is_finite() && lat.is_finite()) {
            return None;
        }
        let overlay = if grids.has_distinct_overlay() {
            grids.overlay.interpolate_scalar(lon, lat)
        } else {
            None
        };
        Some(LocationSample {
            lon,
            lat,
            primary: grids.primary.interpolate(lon, lat),
            overlay,
            flow: self.field.value().and_then(|f| f.vector(x, y)),
        })
    }

    /// Overlay with the particle trails on top.
    pub fn compose(&self) -> RgbaImage {
        let view = self.globe.as_ref().map_or(View::new(0, 0), |g| g.view);
        let mut image = self
            .overlay
            .clone()
            .unwrap_or_else(|| RgbaImage::new(view.width, view.height));
        if let Ok(trails) = self.trails.try_borrow() {
            image.composite(trails.image());
        }
        image
    }

    fn set_globe(&mut self, globe: Globe) {
        let resized = self.globe.as_ref().is_none_or(|g| g.view != globe.view);
        if resized {
            // The running animation holds the old surface.
            self.animator.cancel();
            self.trails = Rc::new(RefCell::new(TrailCanvas::new(globe.view.width, globe.view.height)));
        }
        self.globe = Some(globe);
    }

    fn load_grids(&mut self) {
        let products = match products_for(&self.attributes, Utc::now()) {
            Ok(products) if !products.is_empty() => products,
            Ok(_) => {
                self.status.error(&EngineError::NoProducts(self.attributes.param.clone()));
                return;
            }
            Err(e) => {
                self.status.error(&e.into());
                return;
            }
        };
        info!(
            products = ?products.iter().map(|p| p.type_name()).collect::<Vec<_>>(),
            "loading grids"
        );
        let task = LoadTask::spawn(&self.runtime, fetch_grids(Arc::clone(&self.source), products));
        let now = self.clock.now_ms();
        self.grids.submit(task, now);
    }

    fn start_interpolation(&mut self) {
        let (Some(globe), Some(grids)) = (&self.globe, self.grids.value()) else {
            return;
        };
        let spec = grids.primary_product.particle_spec();
        let request = FieldRequest {
            projection: Arc::clone(&globe.projection),
            view: globe.view,
            primary: Arc::clone(&grids.primary),
            overlay: grids.has_distinct_overlay().then(|| Arc::clone(&grids.overlay)),
            velocity_scale: spec.velocity_scale,
            color_scale: Some(grids.overlay_product.scale.clone()),
            overlay_alpha: self.config.overlay_alpha,
            resolution: self.config.resolution,
        };
        let now = self.clock.now_ms();
        self.field.submit(FieldBuilder::new(request), now);
    }

    fn start_animation(&mut self) {
        let (Some(globe), Some(grids), Some(field)) =
            (&self.globe, self.grids.value(), self.field.value())
        else {
            return;
        };
        let settings = self.config.particle_settings(&grids.primary_product.particle_spec());
        let count = settings.particle_count(field.bounds().width, globe.zoom);
        let seed = self.config.seed.unwrap_or_else(clock_seed);
        let simulator =
            ParticleSimulator::new(field, count, settings, globe.projection.scale(), seed);
        let mut animation = Animation::new(
            Arc::clone(field),
            simulator,
            Rc::clone(&self.trails),
            FrameThrottle::new(self.config.frame_interval_ms),
        );
        if let Some(limit) = self.frame_limit {
            animation = animation.with_frame_limit(limit);
        }
        info!(count, seed, "animation starting");
        let now = self.clock.now_ms();
        self.animator.submit(animation, now);
    }

    fn draw_overlay(&mut self) {
        let (Some(globe), Some(field)) = (&self.globe, self.field.value()) else {
            return;
        };
        let mut image = if self.attributes.overlay_type == OVERLAY_OFF {
            RgbaImage::new(globe.view.width, globe.view.height)
        } else {
            field.overlay().clone()
        };
        if self.attributes.show_grid_points
            && let Some(grids) = self.grids.value()
        {
            draw_grid_points(&mut image, &*globe.projection, &grids.overlay);
        }
        self.overlay = Some(image);
    }

    fn dispatch(&mut self) {
        for _ in 0..MAX_DISPATCH_ROUNDS {
            let signals = self.collect_signals();
            if signals.is_empty() {
                return;
            }
            for (role, signal) in signals {
                for sub in WIRING.iter().filter(|s| s.source == role && s.signal == signal) {
                    self.react(sub.reaction);
                }
            }
        }
        warn!("event routing did not settle");
    }

    fn collect_signals(&mut self) -> Vec<(Role, Signal)> {
        let mut out = Vec::new();
        for event in self.grids.drain_events() {
            match event {
                AgentEvent::Submit(_) => out.push((Role::Grid, Signal::Submit)),
                AgentEvent::Update(grids) => {
                    info!(
                        primary = %grids.primary_product.description(),
                        overlay = grids.overlay_product.type_name(),
                        source = %grids.primary.source(),
                        "grids ready"
                    );
                    out.push((Role::Grid, Signal::Update));
                }
                AgentEvent::Reject(err) => self.status.error(&err),
                AgentEvent::Fail(msg) => self.status.error(&EngineError::Fatal(msg)),
                AgentEvent::Progress { .. } | AgentEvent::Cancel(_) => {}
            }
        }
        for event in self.field.drain_events() {
            match event {
                AgentEvent::Submit(_) => out.push((Role::Field, Signal::Submit)),
                AgentEvent::Progress { fraction, .. } => self.status.progress(fraction),
                AgentEvent::Update(_) => {
                    self.status.progress(1.0);
                    out.push((Role::Field, Signal::Update));
                }
                AgentEvent::Reject(err) => self.status.error(&EngineError::Field(err)),
                AgentEvent::Fail(msg) => self.status.error(&EngineError::Fatal(msg)),
                AgentEvent::Cancel(_) => self.status.progress(1.0),
            }
        }
        for event in self.animator.drain_events() {
            match event {
                AgentEvent::Submit(_) => out.push((Role::Animator, Signal::Submit)),
                AgentEvent::Update(frames) => {
                    debug!(frames = *frames, "animation reached its frame limit");
                    out.push((Role::Animator, Signal::Update));
                }
                AgentEvent::Reject(never) => match never {},
                AgentEvent::Fail(msg) => self.status.error(&EngineError::Fatal(msg)),
                AgentEvent::Progress { .. } | AgentEvent::Cancel(_) => {}
            }
        }
        out
    }

    fn react(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::ShowDownloading => self.status.status("Downloading..."),
            Reaction::ShowRendering => self.status.status("Rendering..."),
            Reaction::ClearStatus => self.status.status(""),
            Reaction::StopAnimation => {
                self.animator.cancel();
            }
            Reaction::StartInterpolation => self.start_interpolation(),
            Reaction::StartAnimation => self.start_animation(),
            Reaction::DrawOverlay => self.draw_overlay(),
        }
    }
}

/// Loads the files of every product and decodes the first two into grids.
async fn fetch_grids(
    source: Arc<dyn GridSource>,
    products: Vec<Product>,
) -> Result<Grids, EngineError> {
    let mut products = products.into_iter();
    let primary_product = products
        .next()
        .ok_or_else(|| EngineError::NoProducts(String::new()))?;
    let overlay_product = products.next();

    let mut request = GridRequest::new(primary_product.paths.clone());
    if let Some(product) = &overlay_product {
        request = request.with_overlay(product.paths.clone());
    }
    let files = load_request(&*source, &request).await?;

    let primary = Arc::new(decode(&files.primary)?);
    let (overlay, overlay_product) = match (files.overlay, overlay_product) {
        (Some(files), Some(product)) => (Arc::new(decode(&files)?), product),
        _ => (Arc::clone(&primary), primary_product.clone()),
    };
    Ok(Grids {
        primary,
        overlay,
        primary_product,
        overlay_product,
    })
}

/// Flattens the records of all files of one product into a grid.
fn decode(files: &[Vec<GridRecord>]) -> Result<Grid, EngineError> {
    let records: Vec<GridRecord> = files.iter().flatten().cloned().collect();
    Ok(Grid::from_records(&records)?)
}

/// Marks each defined, visible grid point with a white pixel.
pub fn draw_grid_points(image: &mut RgbaImage, projection: &dyn Projection, grid: &Grid) {
    grid.for_each_point(|lon, lat, value| {
        if value.is_none() || !projection.is_visible(lon, lat) {
            return;
        }
        if let Some([x, y]) = projection.project(lon, lat)
            && x.is_finite()
            && y.is_finite()
        {
            image.set(x.floor() as i32, y.floor() as i32, GRID_POINT);
        }
    });
}

fn clock_seed() -> u64 {
    Utc::now().timestamp_nanos_opt().map_or(0, |n| n as u64)
}

/// `12.34° N, 56.78° W`.
pub fn format_coordinates(lon: f64, lat: f64) -> String {
    format!(
        "{:.2}° {}, {:.2}° {}",
        lat.abs(),
        if lat >= 0.0 { "N" } else { "S" },
        lon.abs(),
        if lon >= 0.0 { "E" } else { "W" },
    )
}

/// Direction the flow comes from, in whole degrees clockwise from north,
/// and its speed in `unit`.
pub fn format_vector(wind: [f64; 3], unit: &Unit) -> String {
    let [u, v, m] = wind;
    let direction = ((-u).atan2(-v).to_degrees() + 360.0).rem_euclid(360.0).round() as i64 % 360;
    format!("{direction}° @ {} {}", unit.format(m), unit.label)
}

pub fn format_scalar(value: f64, unit: &Unit) -> String {
    format!("{} {}", unit.format(value), unit.label)
}
