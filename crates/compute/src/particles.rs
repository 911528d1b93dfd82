use layers::{IntensityScale, TrailSurface};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::field::Field;

pub const MAX_PARTICLE_AGE: u32 = 100;
pub const WAVE_MAX_PARTICLE_AGE: u32 = 40;
pub const PARTICLE_MULTIPLIER: f64 = 3.0;
/// Particle count factor on constrained devices.
pub const PARTICLE_REDUCTION: f64 = 0.75;
pub const PARTICLE_LINE_WIDTH: f64 = 1.0;
pub const INTENSITY_SCALE_STEP: u8 = 10;
/// Zoom level assumed when the orientation does not carry one.
pub const DEFAULT_ZOOM: f64 = 1000.0;

const TRAIL_FADE: f64 = 0.77;
const WAVE_TRAIL_FADE: f64 = 0.8;
const WAVE_REFERENCE_SCALE: f64 = 600.0;
const WAVE_STEP_EXPONENT: f64 = 2.5;
const WAVE_CREST_DIVISOR: f64 = 2.5;

/// How particles move and what segment they leave behind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionModel {
    /// Follow the field; the trail is the path travelled this tick.
    #[default]
    Advection,
    /// Short crest drawn across the flow, advanced with a zoom-damped step.
    Wave,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSettings {
    pub motion: MotionModel,
    pub multiplier: f64,
    pub constrained: bool,
    pub reduction: f64,
    pub max_age: u32,
    pub line_width: f64,
    pub intensity: IntensityScale,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            motion: MotionModel::Advection,
            multiplier: PARTICLE_MULTIPLIER,
            constrained: false,
            reduction: PARTICLE_REDUCTION,
            max_age: MAX_PARTICLE_AGE,
            line_width: PARTICLE_LINE_WIDTH,
            intensity: IntensityScale::new(INTENSITY_SCALE_STEP, 17.0),
        }
    }
}

impl ParticleSettings {
    /// Wave settings: shorter lives, half the particles.
    pub fn waves(mut self) -> Self {
        self.motion = MotionModel::Wave;
        self.max_age = WAVE_MAX_PARTICLE_AGE;
        self
    }

    /// Share of trail opacity kept from one frame to the next.
    pub fn fade(&self) -> f64 {
        match self.motion {
            MotionModel::Advection => TRAIL_FADE,
            MotionModel::Wave => WAVE_TRAIL_FADE,
        }
    }

    /// `round(width * multiplier * 1000 / zoom)`, then the device and wave
    /// reductions.
    pub fn particle_count(&self, width: i32, zoom: f64) -> usize {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { DEFAULT_ZOOM };
        let mut count = (width.max(0) as f64 * self.multiplier * 1000.0 / zoom).round();
        if self.constrained {
            count *= self.reduction;
        }
        if self.motion == MotionModel::Wave {
            count *= 0.5;
        }
        count.round() as usize
    }
}

/// Step multiplier for wave mode at a projection scale.
///
/// `600 / scale * (ln(scale) / ln(600))^2.5`; scales at or below 1 give 0.
pub fn wave_step(scale: f64) -> f64 {
    if !(scale > 1.0) {
        return 0.0;
    }
    let ratio = scale.ln() / WAVE_REFERENCE_SCALE.ln();
    WAVE_REFERENCE_SCALE / scale * ratio.powf(WAVE_STEP_EXPONENT)
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub age: u32,
    /// Trail segment from the most recent tick.
    pub sx: f64,
    pub sy: f64,
    pub ex: f64,
    pub ey: f64,
}

impl Particle {
    fn at(x: f64, y: f64, age: u32) -> Self {
        Self {
            x,
            y,
            age,
            sx: x,
            sy: y,
            ex: x,
            ey: y,
        }
    }

    pub fn segment(&self) -> [f64; 4] {
        [self.sx, self.sy, self.ex, self.ey]
    }
}

/// Owns the particle pool and advances it through a field once per tick.
///
/// After each [`evolve`](ParticleSimulator::evolve), bucket `i` lists the
/// particles to stroke with intensity color `i`.
pub struct ParticleSimulator {
    settings: ParticleSettings,
    step: f64,
    particles: Vec<Particle>,
    buckets: Vec<Vec<usize>>,
    segments: Vec<[f64; 4]>,
    rng: ChaCha8Rng,
}

impl ParticleSimulator {
    /// Seeds `count` particles at random defined pixels with random ages.
    ///
    /// `projection_scale` only matters for wave motion.
    pub fn new(
        field: &Field,
        count: usize,
        settings: ParticleSettings,
        projection_scale: f64,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let particles = (0..count)
            .map(|_| {
                let age = rng.gen_range(0..=settings.max_age);
                let (x, y) = field.randomize(&mut rng);
                Particle::at(x, y, age)
            })
            .collect();
        let step = match settings.motion {
            MotionModel::Advection => 1.0,
            MotionModel::Wave => wave_step(projection_scale),
        };
        debug!(count, motion = ?settings.motion, step, "particles seeded");
        Self {
            buckets: vec![Vec::new(); settings.intensity.len()],
            settings,
            step,
            particles,
            segments: Vec::new(),
            rng,
        }
    }

    pub fn settings(&self) -> &ParticleSettings {
        &self.settings
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn buckets(&self) -> &[Vec<usize>] {
        &self.buckets
    }

    /// Advances every particle by one tick.
    pub fn evolve(&mut self, field: &Field) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        let max_age = self.settings.max_age;
        let last_bucket = self.buckets.len().saturating_sub(1);
        for (i, p) in self.particles.iter_mut().enumerate() {
            if p.age > max_age {
                let (x, y) = field.randomize(&mut self.rng);
                *p = Particle::at(x, y, 0);
            }
            match field.vector(p.x, p.y) {
                None => p.age = max_age,
                Some([u, v, m]) => {
                    let (dx, dy) = (u * self.step, v * self.step);
                    let (xt, yt) = (p.x + dx, p.y + dy);
                    if field.is_defined(xt, yt) {
                        match self.settings.motion {
                            MotionModel::Advection => {
                                p.sx = p.x;
                                p.sy = p.y;
                                p.ex = xt;
                                p.ey = yt;
                            }
                            MotionModel::Wave => {
                                let [cx, cy] = crest(u, v);
                                p.sx = p.x - cy;
                                p.sy = p.y + cx;
                                p.ex = p.x + cy;
                                p.ey = p.y - cx;
                            }
                        }
                        let k = self.settings.intensity.index_for(m).min(last_bucket);
                        if let Some(bucket) = self.buckets.get_mut(k) {
                            bucket.push(i);
                        }
                    } else {
                        p.age = max_age;
                    }
                    p.x = xt;
                    p.y = yt;
                }
            }
            p.age += 1;
        }
    }

    /// Fades old trails and strokes one batch per non-empty bucket.
    pub fn draw(&mut self, field: &Field, surface: &mut dyn TrailSurface) {
        surface.fade(field.bounds(), self.settings.fade());
        for (i, bucket) in self.buckets.iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            self.segments.clear();
            self.segments
                .extend(bucket.iter().map(|&k| self.particles[k].segment()));
            surface.stroke_segments(
                self.settings.intensity.color(i),
                self.settings.line_width,
                &self.segments,
            );
        }
    }
}

/// Flow direction scaled to a 2.5 pixel half-crest.
fn crest(u: f64, v: f64) -> [f64; 2] {
    let mag = (u * u + v * v).sqrt() / WAVE_CREST_DIVISOR;
    if mag > 0.0 { [u / mag, v / mag] } else { [0.0, 0.0] }
}
