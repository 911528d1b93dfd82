use std::str::FromStr;

use chrono::{DateTime, Utc};
use layers::{ColorScale, ColorStop, Rgba};
use serde::{Deserialize, Serialize};

use crate::CatalogError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductKind {
    #[serde(rename = "wind")]
    Wind,
    #[serde(rename = "temp")]
    Temperature,
    #[serde(rename = "pres")]
    Pressure,
    #[serde(rename = "taprecip")]
    Precipitation,
    #[serde(rename = "cloud")]
    Cloud,
    #[serde(rename = "htsgwo")]
    OceanCurrents,
    #[serde(rename = "htsgw")]
    WaveHeight,
}

impl ProductKind {
    pub const ALL: [ProductKind; 7] = [
        ProductKind::Wind,
        ProductKind::Temperature,
        ProductKind::Pressure,
        ProductKind::Precipitation,
        ProductKind::Cloud,
        ProductKind::OceanCurrents,
        ProductKind::WaveHeight,
    ];

    /// Overlay type name used in attributes and file names.
    pub fn type_name(self) -> &'static str {
        match self {
            ProductKind::Wind => "wind",
            ProductKind::Temperature => "temp",
            ProductKind::Pressure => "pres",
            ProductKind::Precipitation => "taprecip",
            ProductKind::Cloud => "cloud",
            ProductKind::OceanCurrents => "htsgwo",
            ProductKind::WaveHeight => "htsgw",
        }
    }
}

impl FromStr for ProductKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductKind::ALL
            .into_iter()
            .find(|k| k.type_name() == s)
            .ok_or_else(|| CatalogError::UnknownProduct(s.to_string()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Scalar,
    Vector,
}

/// A display unit: `value * scale + offset`, optionally rounded.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Unit {
    pub label: &'static str,
    scale: f64,
    offset: f64,
    round: bool,
    pub precision: usize,
}

impl Unit {
    pub const fn identity(label: &'static str, precision: usize) -> Self {
        Self {
            label,
            scale: 1.0,
            offset: 0.0,
            round: false,
            precision,
        }
    }

    pub const fn rounded(label: &'static str, scale: f64, offset: f64) -> Self {
        Self {
            label,
            scale,
            offset,
            round: true,
            precision: 0,
        }
    }

    pub fn convert(&self, value: f64) -> f64 {
        let v = value * self.scale + self.offset;
        if self.round { v.round() } else { v }
    }

    pub fn format(&self, value: f64) -> String {
        format!("{:.*}", self.precision, self.convert(value))
    }
}

/// How particles are animated over a vector product.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticleSpec {
    /// Screen speed per data unit, as a fraction of the map height.
    pub velocity_scale: f64,
    /// Speed at which particle intensity saturates.
    pub max_intensity: f64,
    #[serde(default)]
    pub waves: bool,
}

impl Default for ParticleSpec {
    fn default() -> Self {
        Self {
            velocity_scale: 1.0 / 200_000.0,
            max_intensity: 17.0,
            waves: false,
        }
    }
}

/// A loadable layer with its presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub kind: ProductKind,
    pub field: FieldKind,
    pub name: &'static str,
    pub qualifier: String,
    /// Data files relative to the data root, in load order.
    pub paths: Vec<String>,
    pub date: DateTime<Utc>,
    pub units: Vec<Unit>,
    pub scale: ColorScale,
    /// Stops shown in the color legend.
    pub legend: Vec<ColorStop>,
    pub particles: Option<ParticleSpec>,
}

impl Product {
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn description(&self) -> String {
        format!("{}{}", self.name, self.qualifier)
    }

    /// Particle settings, falling back to the wind defaults for scalars.
    pub fn particle_spec(&self) -> ParticleSpec {
        self.particles.unwrap_or_default()
    }

    /// Legend entries with each stop's own opacity.
    pub fn legend_colors(&self) -> Vec<(f64, Rgba)> {
        self.legend
            .iter()
            .map(|s| {
                let a = (s.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
                (s.value, [s.rgb[0], s.rgb[1], s.rgb[2], a])
            })
            .collect()
    }

    /// Legend label for a stop value in `unit`. Precipitation of a metre or
    /// more is shown in metres.
    pub fn legend_label(&self, value: f64, unit: &Unit) -> String {
        let converted = unit.convert(value);
        if self.kind == ProductKind::Precipitation && converted >= 1000.0 {
            return format!("{}m", (converted / 1000.0).round());
        }
        unit.format(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_names() {
        for kind in ProductKind::ALL {
            assert_eq!(kind.type_name().parse::<ProductKind>(), Ok(kind));
        }
        assert!(matches!("snow".parse::<ProductKind>(), Err(CatalogError::UnknownProduct(_))));
    }

    #[test]
    fn kind_serializes_as_type_name() {
        let json = serde_json::to_string(&ProductKind::OceanCurrents).unwrap();
        assert_eq!(json, "\"htsgwo\"");
    }

    #[test]
    fn unit_conversion_and_format() {
        let kmh = Unit::rounded("km/h", 3.6, 0.0);
        assert_eq!(kmh.convert(10.0), 36.0);
        assert_eq!(kmh.format(10.04), "36");
        let ms = Unit::identity("m/s", 1);
        assert_eq!(ms.format(3.14159), "3.1");
        let celsius = Unit::rounded("°C", 1.0, -273.15);
        assert_eq!(celsius.convert(273.15), 0.0);
    }

    #[test]
    fn particle_spec_parses_camel_case() {
        let spec: ParticleSpec =
            serde_json::from_str(r#"{"velocityScale": 0.5, "maxIntensity": 12}"#).unwrap();
        assert_eq!(spec.velocity_scale, 0.5);
        assert!(!spec.waves);
    }
}
