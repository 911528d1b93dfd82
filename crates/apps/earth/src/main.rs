use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use catalog::{Attributes, step_date};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use compute::{DEFAULT_ZOOM, Sample};
use foundation::bounds::View;
use runtime::{Clock, MonotonicClock};
use streaming::{FilesystemSource, GridSource};
use tokio::runtime::Handle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use earth::config::EngineConfig;
use earth::engine::{Engine, Globe, format_coordinates, format_scalar, format_vector};
use earth::error::EngineError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ProjectionKind {
    Orthographic,
    Equirectangular,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Animated wind map renderer for gridded weather data")]
struct Args {
    /// Directory containing the `weather/` data files
    #[arg(long, default_value = "public/data")]
    data: PathBuf,

    /// Layer attributes as JSON; the flags below override it
    #[arg(long)]
    attributes: Option<PathBuf>,

    /// `yyyy/mm/dd` or `current`
    #[arg(long)]
    date: Option<String>,

    /// `hhmm`
    #[arg(long)]
    hour: Option<String>,

    /// Move the date by this many steps (±1 is six hours, more is a day each)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    step: i32,

    /// `wind` or `ocean`
    #[arg(long)]
    param: Option<String>,

    #[arg(long)]
    surface: Option<String>,

    /// `sfc` or a pressure level such as `1000hPa`
    #[arg(long)]
    level: Option<String>,

    /// Overlay type, `default` or `off`
    #[arg(long)]
    overlay: Option<String>,

    /// Mark native grid points on the overlay
    #[arg(long)]
    grid_points: bool,

    #[arg(long, value_enum, default_value_t = ProjectionKind::Orthographic)]
    projection: ProjectionKind,

    /// Center longitude
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    lon: f64,

    /// Center latitude (orthographic only)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Scale the particle count is normalized against
    #[arg(long, default_value_t = DEFAULT_ZOOM)]
    zoom: f64,

    /// Animation frames to draw before writing the image
    #[arg(long, default_value_t = 60)]
    frames: u64,

    /// Output image (binary PPM)
    #[arg(long, default_value = "earth.ppm")]
    output: PathBuf,

    /// Engine tuning as JSON; `EARTH_*` variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pixel to describe once rendered: `x,y`
    #[arg(long)]
    probe: Option<String>,
}

impl Args {
    async fn layer_attributes(&self) -> Result<Attributes, Box<dyn std::error::Error>> {
        let mut attrs = match &self.attributes {
            Some(path) => Attributes::from_json(&tokio::fs::read(path).await?)?,
            None => Attributes::default(),
        };
        let overrides = [
            (&self.date, &mut attrs.date),
            (&self.hour, &mut attrs.hour),
            (&self.param, &mut attrs.param),
            (&self.surface, &mut attrs.surface),
            (&self.level, &mut attrs.level),
            (&self.overlay, &mut attrs.overlay_type),
        ];
        for (flag, field) in overrides {
            if let Some(value) = flag {
                *field = value.clone();
            }
        }
        attrs.show_grid_points |= self.grid_points;
        if self.step != 0 {
            let date = attrs.valid_date(Utc::now())?;
            attrs = attrs.at(step_date(date, self.step));
        }
        Ok(attrs)
    }

    fn globe(&self) -> Globe {
        let view = View::new(self.width, self.height);
        let globe = match self.projection {
            ProjectionKind::Orthographic => Globe::orthographic(view, [self.lon, self.lat]),
            ProjectionKind::Equirectangular => Globe::equirectangular(view, self.lon),
        };
        globe.with_zoom(self.zoom)
    }

    fn probe(&self) -> Option<(f64, f64)> {
        let (x, y) = self.probe.as_deref()?.split_once(',')?;
        Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref()).await?;
    let attributes = args.layer_attributes().await?;
    info!(?attributes, data = %args.data.display(), "starting");

    let source: Arc<dyn GridSource> = Arc::new(FilesystemSource::new(&args.data));
    let clock = Rc::new(MonotonicClock::new());
    let mut engine = Engine::new(
        config,
        Handle::current(),
        source,
        Rc::clone(&clock) as Rc<dyn Clock>,
        attributes,
    );
    engine.set_frame_limit(Some(args.frames));
    engine.start(args.globe());

    while engine.frames_finished().is_none() {
        engine.pump();
        if engine.status().has_error() {
            let status = engine.status().text().to_string();
            error!(%status, "render failed");
            return Err(EngineError::Fatal(status).into());
        }
        if !engine.is_busy() {
            break;
        }
        let wait_ms = engine
            .next_wake_ms()
            .map_or(1.0, |at| (at - clock.now_ms()).max(1.0));
        tokio::time::sleep(Duration::from_secs_f64(wait_ms / 1000.0)).await;
    }

    let image = engine.compose();
    tokio::fs::write(&args.output, image.to_ppm([0, 0, 0])).await?;
    info!(
        path = %args.output.display(),
        frames = engine.frames_finished().unwrap_or(0),
        "image written"
    );

    if let Some((x, y)) = args.probe() {
        describe(&engine, x, y);
    }
    Ok(())
}

fn describe(engine: &Engine, x: f64, y: f64) {
    let (Some(sample), Some(grids)) = (engine.sample_at(x, y), engine.grids()) else {
        println!("({x}, {y}): off the globe");
        return;
    };
    let mut line = format_coordinates(sample.lon, sample.lat);
    let primary_unit = grids.primary_product.units.first();
    match (sample.primary, primary_unit) {
        (Some(Sample::Vector(wind)), Some(unit)) => {
            line.push_str("  ");
            line.push_str(&format_vector(wind, unit));
        }
        (Some(Sample::Scalar(value)), Some(unit)) => {
            line.push_str("  ");
            line.push_str(&format_scalar(value, unit));
        }
        _ => {}
    }
    if let (Some(value), Some(unit)) = (sample.overlay, grids.overlay_product.units.first()) {
        line.push_str("  ");
        line.push_str(&format_scalar(value, unit));
    }
    println!("{}  {line}", grids.primary_product.description());
}
