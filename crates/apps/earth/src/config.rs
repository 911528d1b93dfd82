//! Engine tuning, read from an optional JSON file and then `EARTH_*`
//! environment variables.

use std::env;
use std::path::Path;
use std::str::FromStr;

use catalog::ParticleSpec;
use compute::{
    INTENSITY_SCALE_STEP, MAX_PARTICLE_AGE, PARTICLE_LINE_WIDTH, PARTICLE_MULTIPLIER,
    PARTICLE_REDUCTION, ParticleSettings, Resolution, WAVE_MAX_PARTICLE_AGE,
};
use layers::IntensityScale;
use runtime::AgentTiming;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest batch a cooperative task may run before yielding.
    pub max_task_ms: f64,
    /// Pause between batches of grid and field tasks.
    pub min_sleep_ms: f64,
    /// Minimum gap between drawn animation frames.
    pub frame_interval_ms: f64,
    /// How often the animation task is called back.
    pub animation_tick_ms: f64,
    pub resolution: Resolution,
    pub overlay_alpha: u8,
    pub particle_multiplier: f64,
    pub particle_reduction: f64,
    /// Applies `particle_reduction` when set.
    pub constrained_device: bool,
    pub max_particle_age: u32,
    pub wave_max_particle_age: u32,
    pub intensity_scale_step: u8,
    pub particle_line_width: f64,
    /// Fixed particle seed; taken from the clock when unset.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_task_ms: 100.0,
            min_sleep_ms: 25.0,
            frame_interval_ms: 40.0,
            animation_tick_ms: 16.0,
            resolution: Resolution::Quarter,
            overlay_alpha: 102,
            particle_multiplier: PARTICLE_MULTIPLIER,
            particle_reduction: PARTICLE_REDUCTION,
            constrained_device: false,
            max_particle_age: MAX_PARTICLE_AGE,
            wave_max_particle_age: WAVE_MAX_PARTICLE_AGE,
            intensity_scale_step: INTENSITY_SCALE_STEP,
            particle_line_width: PARTICLE_LINE_WIDTH,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, EngineError> {
        serde_json::from_slice(bytes).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Defaults, overlaid with `path` when given, overlaid with the environment.
    pub async fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let config = match path {
            Some(path) => Self::from_json(&tokio::fs::read(path).await?)?,
            None => Self::default(),
        };
        Ok(config.apply_env())
    }

    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| env::var(key).ok())
    }

    /// Overrides fields from `lookup`; unparsable values are ignored.
    pub fn apply_vars(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let seed = lookup("EARTH_SEED").and_then(|v| v.parse().ok()).or(self.seed);
        Self {
            max_task_ms: env_var(&lookup, "EARTH_MAX_TASK_MS", self.max_task_ms),
            min_sleep_ms: env_var(&lookup, "EARTH_MIN_SLEEP_MS", self.min_sleep_ms),
            frame_interval_ms: env_var(&lookup, "EARTH_FRAME_INTERVAL_MS", self.frame_interval_ms),
            animation_tick_ms: env_var(&lookup, "EARTH_ANIMATION_TICK_MS", self.animation_tick_ms),
            resolution: env_var(&lookup, "EARTH_RESOLUTION", self.resolution),
            overlay_alpha: env_var(&lookup, "EARTH_OVERLAY_ALPHA", self.overlay_alpha),
            particle_multiplier: env_var(&lookup, "EARTH_PARTICLE_MULTIPLIER", self.particle_multiplier),
            particle_reduction: env_var(&lookup, "EARTH_PARTICLE_REDUCTION", self.particle_reduction),
            constrained_device: env_var(&lookup, "EARTH_CONSTRAINED_DEVICE", self.constrained_device),
            max_particle_age: env_var(&lookup, "EARTH_MAX_PARTICLE_AGE", self.max_particle_age),
            wave_max_particle_age: env_var(
                &lookup,
                "EARTH_WAVE_MAX_PARTICLE_AGE",
                self.wave_max_particle_age,
            ),
            intensity_scale_step: env_var(
                &lookup,
                "EARTH_INTENSITY_SCALE_STEP",
                self.intensity_scale_step,
            ),
            particle_line_width: env_var(&lookup, "EARTH_PARTICLE_LINE_WIDTH", self.particle_line_width),
            seed,
        }
    }

    /// Timing of the grid and field agents.
    pub fn agent_timing(&self) -> AgentTiming {
        AgentTiming {
            max_task_ms: self.max_task_ms,
            min_sleep_ms: self.min_sleep_ms,
        }
    }

    /// Timing of the animation agent: one callback per tick.
    pub fn animation_timing(&self) -> AgentTiming {
        AgentTiming {
            max_task_ms: self.max_task_ms,
            min_sleep_ms: self.animation_tick_ms,
        }
    }

    pub fn particle_settings(&self, spec: &ParticleSpec) -> ParticleSettings {
        let settings = ParticleSettings {
            multiplier: self.particle_multiplier,
            constrained: self.constrained_device,
            reduction: self.particle_reduction,
            max_age: self.max_particle_age,
            line_width: self.particle_line_width,
            intensity: IntensityScale::new(self.intensity_scale_step, spec.max_intensity),
            ..ParticleSettings::default()
        };
        if spec.waves {
            ParticleSettings {
                max_age: self.wave_max_particle_age,
                ..settings.waves()
            }
        } else {
            settings
        }
    }
}

fn env_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compute::MotionModel;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let config = EngineConfig::default().apply_vars(vars(&[
            ("EARTH_MAX_TASK_MS", "50"),
            ("EARTH_RESOLUTION", "full"),
            ("EARTH_CONSTRAINED_DEVICE", "true"),
            ("EARTH_SEED", "7"),
        ]));
        assert_eq!(config.max_task_ms, 50.0);
        assert_eq!(config.resolution, Resolution::Full);
        assert!(config.constrained_device);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.min_sleep_ms, 25.0);
    }

    #[test]
    fn unparsable_env_values_are_ignored() {
        let config = EngineConfig::default().apply_vars(vars(&[
            ("EARTH_OVERLAY_ALPHA", "lots"),
            ("EARTH_SEED", "-1"),
        ]));
        assert_eq!(config.overlay_alpha, 102);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn json_fills_missing_fields() {
        let config =
            EngineConfig::from_json(br#"{"resolution": "half", "overlay_alpha": 255}"#).unwrap();
        assert_eq!(config.resolution, Resolution::Half);
        assert_eq!(config.overlay_alpha, 255);
        assert_eq!(config.frame_interval_ms, 40.0);
        assert!(matches!(
            EngineConfig::from_json(b"{\"seed\": \"x\"}"),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("earth.json");
        tokio::fs::write(&path, br#"{"max_particle_age": 60}"#).await.unwrap();
        let config = EngineConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.max_particle_age, 60);

        let missing = EngineConfig::load(Some(&dir.path().join("nope.json"))).await;
        assert!(matches!(missing, Err(EngineError::Io(_))));
    }

    #[test]
    fn wave_products_get_wave_settings() {
        let config = EngineConfig::default();
        let wind = config.particle_settings(&ParticleSpec::default());
        assert_eq!(wind.motion, MotionModel::Advection);
        assert_eq!(wind.max_age, MAX_PARTICLE_AGE);

        let waves = config.particle_settings(&ParticleSpec {
            velocity_scale: 1.0 / 101_200.0,
            max_intensity: 12.0,
            waves: true,
        });
        assert_eq!(waves.motion, MotionModel::Wave);
        assert_eq!(waves.max_age, WAVE_MAX_PARTICLE_AGE);
        assert_eq!(waves.intensity.max(), 12.0);
    }

    #[test]
    fn animation_runs_on_its_own_tick() {
        let config = EngineConfig::default();
        assert_eq!(config.agent_timing().min_sleep_ms, 25.0);
        assert_eq!(config.animation_timing().min_sleep_ms, 16.0);
    }
}
