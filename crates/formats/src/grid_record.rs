//! JSON grid records as produced by GRIB-to-JSON converters.
//!
//! A file is an array of records. Scalar layers carry one record, vector
//! layers carry two (u then v) with identical headers. Samples are row-major
//! starting at `(lo1, la1)` with longitude increasing eastward; `null` marks a
//! missing sample.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Instant a forecast is valid for.
pub type ValidTime = DateTime<Utc>;

#[derive(Debug)]
pub enum FormatError {
    Json(serde_json::Error),
    Empty,
    SizeMismatch { expected: usize, actual: usize },
    InvalidHeader(String),
    InvalidTime(String),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::Json(e) => write!(f, "invalid grid json: {e}"),
            FormatError::Empty => write!(f, "grid file contains no records"),
            FormatError::SizeMismatch { expected, actual } => {
                write!(f, "grid data has {actual} samples, header expects {expected}")
            }
            FormatError::InvalidHeader(msg) => write!(f, "invalid grid header: {msg}"),
            FormatError::InvalidTime(msg) => write!(f, "invalid reference time: {msg}"),
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormatError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(e: serde_json::Error) -> Self {
        FormatError::Json(e)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridHeader {
    pub lo1: f64,
    pub la1: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lo2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub la2: Option<f64>,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    pub ref_time: String,
    #[serde(default)]
    pub forecast_time: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_category: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface1_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface1_value: Option<f64>,
}

impl GridHeader {
    pub fn sample_count(&self) -> usize {
        self.nx * self.ny
    }

    /// True when rows are stored from south to north.
    ///
    /// Decided from `la2` when present, otherwise from the sign of `dy`.
    pub fn scans_northward(&self) -> bool {
        match self.la2 {
            Some(la2) => la2 > self.la1,
            None => self.dy < 0.0,
        }
    }

    /// Latitude of the northernmost row.
    pub fn north_lat(&self) -> f64 {
        if self.scans_northward() {
            self.la1 + (self.ny.saturating_sub(1)) as f64 * self.dy.abs()
        } else {
            self.la1
        }
    }

    /// Reference time plus forecast hours.
    pub fn valid_time(&self) -> Result<ValidTime, FormatError> {
        let reference = DateTime::parse_from_rfc3339(&self.ref_time)
            .map_err(|e| FormatError::InvalidTime(format!("{}: {e}", self.ref_time)))?;
        Ok(reference.with_timezone(&Utc) + Duration::hours(self.forecast_time))
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        if self.nx == 0 || self.ny == 0 {
            return Err(FormatError::InvalidHeader(format!(
                "empty grid {}x{}",
                self.nx, self.ny
            )));
        }
        if !(self.dx.is_finite() && self.dx > 0.0) {
            return Err(FormatError::InvalidHeader(format!("dx must be positive, got {}", self.dx)));
        }
        if !(self.dy.is_finite() && self.dy != 0.0) {
            return Err(FormatError::InvalidHeader(format!("dy must be non-zero, got {}", self.dy)));
        }
        if !(self.lo1.is_finite() && self.la1.is_finite()) {
            return Err(FormatError::InvalidHeader("non-finite origin".to_string()));
        }
        Ok(())
    }

    /// Headers describe the same lattice when origin, spacing and size agree.
    pub fn same_lattice(&self, other: &GridHeader) -> bool {
        self.lo1 == other.lo1
            && self.la1 == other.la1
            && self.dx == other.dx
            && self.dy == other.dy
            && self.nx == other.nx
            && self.ny == other.ny
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridRecord {
    pub header: GridHeader,
    pub data: Vec<Option<f64>>,
}

impl GridRecord {
    pub fn validate(&self) -> Result<(), FormatError> {
        self.header.validate()?;
        let expected = self.header.sample_count();
        if self.data.len() != expected {
            return Err(FormatError::SizeMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Parses and validates a grid file.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<GridRecord>, FormatError> {
    let records: Vec<GridRecord> = serde_json::from_slice(bytes)?;
    if records.is_empty() {
        return Err(FormatError::Empty);
    }
    for record in &records {
        record.validate()?;
    }
    Ok(records)
}

pub fn to_json(records: &[GridRecord]) -> Result<Vec<u8>, FormatError> {
    Ok(serde_json::to_vec(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"[{
            "header": {
                "refTime": "2013-11-30T18:00:00.000Z",
                "parameterCategory": 2,
                "parameterNumber": 2,
                "surface1Type": 100,
                "surface1Value": 100000.0,
                "forecastTime": 6,
                "scanMode": 0,
                "nx": 3, "ny": 2,
                "lo1": 0, "la1": 90, "lo2": 2, "la2": 89,
                "dx": 1, "dy": 1
            },
            "data": [1.5, null, 3, 4, 5, 6]
        }]"#
    }

    #[test]
    fn parses_header_and_missing_samples() {
        let records = parse_records(sample_json().as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.header.nx, 3);
        assert_eq!(r.header.parameter_number, Some(2));
        assert_eq!(r.data[0], Some(1.5));
        assert_eq!(r.data[1], None);
        assert!(!r.header.scans_northward());
    }

    #[test]
    fn valid_time_adds_forecast_hours() {
        let records = parse_records(sample_json().as_bytes()).unwrap();
        let t = records[0].header.valid_time().unwrap();
        assert_eq!(t.to_rfc3339(), "2013-12-01T00:00:00+00:00");
    }

    #[test]
    fn rejects_size_mismatch() {
        let json = sample_json().replace("[1.5, null, 3, 4, 5, 6]", "[1, 2]");
        match parse_records(json.as_bytes()) {
            Err(FormatError::SizeMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (6, 2));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_file() {
        assert!(matches!(parse_records(b"[]"), Err(FormatError::Empty)));
    }

    #[test]
    fn northward_scan_detected_from_la2() {
        let json = sample_json().replace("\"la1\": 90, \"lo2\": 2, \"la2\": 89", "\"la1\": 89, \"lo2\": 2, \"la2\": 90");
        let records = parse_records(json.as_bytes()).unwrap();
        assert!(records[0].header.scans_northward());
        assert_eq!(records[0].header.north_lat(), 90.0);
    }

    #[test]
    fn bad_time_is_reported() {
        let json = sample_json().replace("2013-11-30T18:00:00.000Z", "yesterday");
        let records = parse_records(json.as_bytes()).unwrap();
        assert!(matches!(
            records[0].header.valid_time(),
            Err(FormatError::InvalidTime(_))
        ));
    }
}
