//! Product definitions and the rules that select them.
//!
//! Data files live under `weather/` in the data root and are named
//! `{yyyymmdd}{hh}_{TYPE}_{LEVEL}.json`, or `current_{TYPE}_{LEVEL}.json` for
//! the most recent layer.

use chrono::{DateTime, Utc};
use layers::{ColorScale, ColorStop};

use crate::attributes::Attributes;
use crate::product::{FieldKind, ParticleSpec, Product, ProductKind, Unit};
use crate::CatalogError;

pub const WEATHER_DIR: &str = "weather";

/// Overlay value that hides the overlay.
pub const OVERLAY_OFF: &str = "off";
/// Overlay value that colors by the primary product.
pub const OVERLAY_DEFAULT: &str = "default";

type Stop = (f64, [u8; 3], f64);

const WIND_STOPS: &[Stop] = &[
    (0.0, [37, 74, 255], 0.6),
    (2.0, [0, 150, 254], 0.6),
    (4.0, [18, 196, 200], 0.6),
    (6.0, [18, 211, 73], 0.6),
    (8.0, [0, 240, 0], 0.6),
    (10.0, [127, 237, 0], 0.6),
    (12.0, [254, 199, 0], 0.6),
    (14.0, [237, 124, 14], 0.6),
    (16.0, [200, 37, 39], 0.6),
    (18.0, [217, 0, 100], 0.6),
    (20.0, [202, 25, 186], 0.6),
    (24.0, [86, 54, 222], 0.6),
    (27.0, [42, 132, 222], 0.6),
    (29.0, [64, 199, 222], 0.6),
];

// Kelvin, -35 C to 35 C.
const TEMP_STOPS: &[Stop] = &[
    (238.15, [171, 66, 160], 0.6),
    (243.15, [145, 104, 174], 0.6),
    (248.15, [115, 147, 190], 0.6),
    (253.15, [90, 185, 204], 0.6),
    (258.15, [67, 207, 213], 0.6),
    (263.15, [52, 167, 204], 0.6),
    (268.15, [39, 132, 197], 0.6),
    (273.15, [24, 92, 188], 0.6),
    (278.15, [45, 143, 18], 0.6),
    (283.15, [112, 179, 31], 0.6),
    (288.15, [188, 219, 47], 0.6),
    (293.15, [246, 244, 56], 0.6),
    (298.15, [236, 179, 26], 0.6),
    (303.15, [233, 139, 26], 0.6),
    (308.15, [231, 104, 32], 0.6),
];

const PRES_STOPS: &[Stop] = &[
    (995.0, [40, 9, 119], 0.6),
    (998.0, [61, 25, 83], 0.6),
    (1001.0, [110, 39, 69], 0.6),
    (1004.0, [151, 96, 171], 0.6),
    (1007.0, [63, 197, 211], 0.6),
    (1010.0, [21, 88, 169], 0.6),
    (1013.0, [22, 114, 77], 0.6),
    (1016.0, [79, 161, 25], 0.6),
    (1019.0, [213, 233, 52], 0.6),
    (1022.0, [236, 178, 26], 0.6),
    (1025.0, [230, 77, 37], 0.6),
    (1028.0, [144, 44, 55], 0.6),
];

const PRECIP_STOPS: &[Stop] = &[
    (0.0, [60, 60, 60], 0.6),
    (5.0, [107, 63, 180], 0.6),
    (10.0, [107, 63, 180], 0.6),
    (20.0, [27, 160, 223], 0.6),
    (30.0, [13, 192, 190], 0.6),
    (40.0, [0, 225, 158], 0.6),
    (100.0, [243, 145, 42], 0.6),
    (1000.0, [229, 60, 151], 0.6),
    (3000.0, [197, 60, 158], 0.6),
];

const CLOUD_STOPS: &[Stop] = &[
    (0.0, [53, 53, 53], 0.6),
    (1.0, [102, 102, 102], 0.6),
    (2.0, [130, 130, 130], 0.6),
    (3.0, [158, 158, 158], 0.6),
    (4.0, [173, 173, 173], 0.6),
    (5.0, [191, 191, 191], 0.6),
    (6.0, [204, 204, 204], 0.6),
    (7.0, [217, 217, 217], 0.6),
    (8.0, [232, 232, 232], 0.6),
    (9.0, [242, 242, 242], 0.6),
    (10.0, [255, 255, 255], 0.6),
];

const CURRENT_STOPS: &[Stop] = &[
    (0.0, [159, 185, 191], 0.75),
    (1.0, [48, 157, 185], 0.75),
    (2.0, [48, 98, 141], 0.75),
    (3.0, [56, 104, 191], 0.75),
    (4.0, [57, 60, 142], 0.75),
    (5.0, [187, 90, 191], 0.75),
    (6.0, [154, 48, 151], 0.75),
    (7.0, [133, 48, 8], 0.75),
    (8.0, [191, 51, 95], 0.75),
    (9.0, [191, 103, 87], 0.75),
    (10.0, [191, 191, 191], 0.75),
    (11.0, [154, 127, 155], 0.75),
    (12.0, [255, 0, 150], 0.75),
    (13.0, [255, 0, 200], 0.75),
    (14.0, [255, 0, 250], 0.75),
    (15.0, [255, 50, 255], 0.75),
];

const WAVE_HEIGHT_STOPS: &[Stop] = &[
    (0.0, [49, 158, 185], 1.0),
    (0.5, [49, 158, 185], 1.0),
    (0.75, [47, 128, 164], 1.0),
    (1.0, [48, 98, 141], 1.0),
    (1.25, [51, 101, 166], 1.0),
    (1.5, [56, 104, 191], 1.0),
    (1.75, [56, 82, 168], 1.0),
    (2.0, [57, 60, 143], 1.0),
    (2.5, [187, 89, 191], 1.0),
    (3.0, [154, 48, 150], 1.0),
    (3.5, [151, 43, 100], 1.0),
    (4.0, [133, 48, 48], 1.0),
    (4.5, [162, 49, 71], 1.0),
    (5.0, [191, 51, 95], 1.0),
    (5.5, [192, 61, 93], 1.0),
    (6.0, [193, 76, 90], 1.0),
    (6.5, [193, 90, 88], 1.0),
    (7.0, [191, 105, 88], 1.0),
    (7.5, [191, 118, 104], 1.0),
    (8.0, [191, 130, 119], 1.0),
    (8.5, [191, 150, 142], 1.0),
    (9.0, [191, 162, 156], 1.0),
    (10.0, [191, 162, 156], 1.0),
];

const WAVE_HEIGHT_LEGEND: &[Stop] = &[
    (0.0, [49, 158, 185], 1.0),
    (0.5, [49, 158, 185], 1.0),
    (1.0, [48, 98, 141], 1.0),
    (2.0, [57, 60, 143], 1.0),
    (4.0, [133, 48, 48], 1.0),
    (6.0, [193, 76, 90], 1.0),
    (9.0, [191, 162, 156], 1.0),
    (10.0, [191, 162, 156], 1.0),
];

const WIND_UNITS: &[Unit] = &[
    Unit::identity("m/s", 1),
    Unit::rounded("km/h", 3.6, 0.0),
    Unit::rounded("kn", 1.943844, 0.0),
    Unit::rounded("mph", 2.236936, 0.0),
];

const TEMP_UNITS: &[Unit] = &[
    Unit::rounded("°C", 1.0, -273.15),
    Unit::rounded("°F", 9.0 / 5.0, -459.67),
];

fn stops(table: &[Stop]) -> Vec<ColorStop> {
    table
        .iter()
        .map(|&(value, rgb, alpha)| ColorStop::new(value, rgb, alpha))
        .collect()
}

fn scale(kind: ProductKind, table: &[Stop], bounds: [f64; 2]) -> Result<ColorScale, CatalogError> {
    ColorScale::segmented(stops(table))
        .map(|s| s.with_bounds(bounds))
        .map_err(|e| CatalogError::InvalidScale(format!("{}: {e}", kind.type_name())))
}

/// File path for a layer: `{stamp}_{TYPE}_{key}.json` under [`WEATHER_DIR`].
fn layer_path(attr: &Attributes, type_code: &str, key: &str) -> Result<String, CatalogError> {
    let file = if attr.is_current() {
        format!("current_{type_code}_{key}.json")
    } else {
        format!("{}{}_{type_code}_{key}.json", attr.date_stamp(), attr.hour_stamp()?)
    };
    Ok(format!("{WEATHER_DIR}/{file}"))
}

/// Level-dependent key; surface data uses `surface_key`.
fn level_key<'a>(attr: &'a Attributes, surface_key: &'a str) -> &'a str {
    if attr.level == "sfc" { surface_key } else { &attr.level }
}

fn describe_surface(attr: &Attributes) -> String {
    if attr.surface == "surface" {
        return " @ Surface".to_string();
    }
    let mut chars = attr.level.chars();
    match chars.next() {
        Some(first) => format!(" @ {}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

fn selects(kind: ProductKind, attr: &Attributes) -> bool {
    let wind = attr.param == "wind";
    let ocean = attr.param == "ocean";
    match kind {
        ProductKind::Wind => wind,
        ProductKind::Temperature => wind && attr.overlay_type == "temp",
        ProductKind::Pressure => wind && attr.overlay_type == "pres",
        ProductKind::Precipitation => wind && attr.overlay_type == "taprecip",
        ProductKind::Cloud => wind && attr.overlay_type == "cloud",
        ProductKind::OceanCurrents => ocean,
        ProductKind::WaveHeight => ocean && attr.overlay_type == "htsgw",
    }
}

/// Builds one product for `attr`, whether or not it matches.
pub fn create(kind: ProductKind, attr: &Attributes, now: DateTime<Utc>) -> Result<Product, CatalogError> {
    let date = attr.valid_date(now)?;
    let qualifier = describe_surface(attr);
    let scalar = |name: &'static str, path: String, units: Vec<Unit>, table: &[Stop], bounds: [f64; 2]| {
        Ok::<_, CatalogError>(Product {
            kind,
            field: FieldKind::Scalar,
            name,
            qualifier: qualifier.clone(),
            paths: vec![path],
            date,
            units,
            scale: scale(kind, table, bounds)?,
            legend: stops(table),
            particles: None,
        })
    };
    match kind {
        ProductKind::Wind => Ok(Product {
            kind,
            field: FieldKind::Vector,
            name: "Wind",
            qualifier: qualifier.clone(),
            paths: vec![layer_path(attr, "UV", level_key(attr, "SFC"))?],
            date,
            units: WIND_UNITS.to_vec(),
            scale: scale(kind, WIND_STOPS, [0.0, 35.0])?,
            legend: stops(WIND_STOPS),
            particles: Some(ParticleSpec {
                velocity_scale: 1.0 / 200_000.0,
                max_intensity: 17.0,
                waves: false,
            }),
        }),
        ProductKind::Temperature => scalar(
            "Temp",
            layer_path(attr, "T", level_key(attr, "LSFC"))?,
            TEMP_UNITS.to_vec(),
            TEMP_STOPS,
            [193.0, 328.0],
        ),
        ProductKind::Pressure => scalar(
            "Pressure",
            layer_path(attr, "PRES", "SFC")?,
            vec![Unit::identity("hPa", 0)],
            PRES_STOPS,
            [990.0, 1050.0],
        ),
        ProductKind::Precipitation => scalar(
            "Precipitation",
            layer_path(attr, "TAPRECIP", "SFC")?,
            vec![Unit::identity("mm", 0)],
            PRECIP_STOPS,
            [0.0, 3000.0],
        ),
        ProductKind::Cloud => scalar(
            "Cloud",
            layer_path(attr, "CLOUD", "ALL")?,
            vec![Unit::identity("", 0)],
            CLOUD_STOPS,
            [0.0, 10.0],
        ),
        ProductKind::OceanCurrents => Ok(Product {
            kind,
            field: FieldKind::Vector,
            name: "Ocean Currents",
            qualifier: " @ Surface".to_string(),
            paths: vec![layer_path(attr, "UV", "WSFC")?],
            date,
            units: vec![Unit::identity("", 0)],
            scale: scale(kind, CURRENT_STOPS, [0.0, 10.0])?,
            legend: stops(CURRENT_STOPS),
            particles: Some(ParticleSpec {
                velocity_scale: 1.0 / 101_200.0,
                max_intensity: 12.0,
                waves: true,
            }),
        }),
        ProductKind::WaveHeight => {
            let mut product = scalar(
                "Wave Height",
                layer_path(attr, "HTSGW", "WSFC")?,
                vec![Unit::identity("m", 0)],
                WAVE_HEIGHT_STOPS,
                [0.0, 10.0],
            )?;
            product.legend = stops(WAVE_HEIGHT_LEGEND);
            Ok(product)
        }
    }
}

/// Products selected by `attr`, primary first.
///
/// The second product, when present, is a distinct overlay. An `off`
/// overlay never adds one.
pub fn products_for(attr: &Attributes, now: DateTime<Utc>) -> Result<Vec<Product>, CatalogError> {
    ProductKind::ALL
        .into_iter()
        .filter(|&kind| selects(kind, attr))
        .map(|kind| create(kind, attr, now))
        .collect()
}

/// Every value accepted as an overlay type.
pub fn overlay_types() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = ProductKind::ALL.iter().map(|k| k.type_name()).collect();
    out.push(OVERLAY_DEFAULT);
    out.push(OVERLAY_OFF);
    out
}
