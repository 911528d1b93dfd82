use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::CatalogError;

/// Date value meaning "the most recent layer".
pub const CURRENT: &str = "current";

/// Attributes whose change means a different set of grids.
pub const LAYER_KEYS: [&str; 5] = ["date", "hour", "param", "surface", "level"];

/// Layer selection as it appears in the page configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attributes {
    /// `yyyy/mm/dd` or `current`.
    pub date: String,
    /// `hhmm`, ignored when `date` is current.
    pub hour: String,
    pub param: String,
    pub surface: String,
    pub level: String,
    pub overlay_type: String,
    pub show_grid_points: bool,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            date: CURRENT.to_string(),
            hour: "0000".to_string(),
            param: "wind".to_string(),
            surface: "surface".to_string(),
            level: "sfc".to_string(),
            overlay_type: "default".to_string(),
            show_grid_points: false,
        }
    }
}

impl Attributes {
    pub fn from_json(bytes: &[u8]) -> Result<Self, CatalogError> {
        serde_json::from_slice(bytes).map_err(|e| CatalogError::Corrupt(e.to_string()))
    }

    pub fn is_current(&self) -> bool {
        self.date == CURRENT
    }

    /// Names of the attributes that differ from `previous`.
    pub fn changed(&self, previous: &Attributes) -> Vec<&'static str> {
        let mut out = Vec::new();
        let pairs = [
            ("date", &self.date, &previous.date),
            ("hour", &self.hour, &previous.hour),
            ("param", &self.param, &previous.param),
            ("surface", &self.surface, &previous.surface),
            ("level", &self.level, &previous.level),
            ("overlayType", &self.overlay_type, &previous.overlay_type),
        ];
        for (key, a, b) in pairs {
            if a != b {
                out.push(key);
            }
        }
        if self.show_grid_points != previous.show_grid_points {
            out.push("showGridPoints");
        }
        out
    }

    /// `yyyymmdd`, or `current`.
    pub fn date_stamp(&self) -> String {
        self.date.replace('/', "")
    }

    /// Two-digit hour of day.
    pub fn hour_stamp(&self) -> Result<&str, CatalogError> {
        match self.hour.get(..2) {
            Some(hh) if hh.bytes().all(|b| b.is_ascii_digit()) => Ok(hh),
            _ => Err(CatalogError::InvalidHour(self.hour.clone())),
        }
    }

    /// Instant the selected layer describes.
    ///
    /// For the current layer this is `now` rounded down to a three-hour
    /// block.
    pub fn valid_date(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CatalogError> {
        if self.is_current() {
            let hour = now.hour() / 3 * 3;
            return Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), hour, 0, 0)
                .single()
                .ok_or_else(|| CatalogError::InvalidDate(now.to_rfc3339()));
        }
        let invalid = || CatalogError::InvalidDate(self.date.clone());
        let parts: Vec<&str> = self.date.split('/').collect();
        let [y, m, d] = parts.as_slice() else {
            return Err(invalid());
        };
        let (y, m, d) = (
            y.parse::<i32>().map_err(|_| invalid())?,
            m.parse::<u32>().map_err(|_| invalid())?,
            d.parse::<u32>().map_err(|_| invalid())?,
        );
        let hour: u32 = self
            .hour_stamp()?
            .parse()
            .map_err(|_| CatalogError::InvalidHour(self.hour.clone()))?;
        let naive = NaiveDate::from_ymd_opt(y, m, d)
            .ok_or_else(invalid)?
            .and_hms_opt(hour, 0, 0)
            .ok_or_else(|| CatalogError::InvalidHour(self.hour.clone()))?;
        Ok(Utc.from_utc_datetime(&naive))
    }

    /// Same selection at another instant.
    pub fn at(&self, date: DateTime<Utc>) -> Attributes {
        Attributes {
            date: date.format("%Y/%m/%d").to_string(),
            hour: date.format("%H00").to_string(),
            ..self.clone()
        }
    }
}

/// Date of the next or previous layer.
///
/// Steps of ±1 move six hours; larger steps move a whole day.
pub fn step_date(date: DateTime<Utc>, step: i32) -> DateTime<Utc> {
    let blocks = if step > 1 {
        4
    } else if step < -1 {
        -4
    } else {
        step
    };
    date + Duration::hours(blocks as i64 * 6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn dated(date: &str, hour: &str) -> Attributes {
        Attributes {
            date: date.to_string(),
            hour: hour.to_string(),
            ..Attributes::default()
        }
    }

    #[test]
    fn current_rounds_down_to_three_hours() {
        let a = Attributes::default();
        assert_eq!(a.valid_date(utc(2014, 1, 31, 5, 47)).unwrap(), utc(2014, 1, 31, 3, 0));
        assert_eq!(a.valid_date(utc(2014, 1, 31, 23, 59)).unwrap(), utc(2014, 1, 31, 21, 0));
    }

    #[test]
    fn explicit_date_and_hour() {
        let a = dated("2014/01/31", "0900");
        assert_eq!(a.valid_date(utc(2020, 1, 1, 0, 0)).unwrap(), utc(2014, 1, 31, 9, 0));
        assert_eq!(a.date_stamp(), "20140131");
        assert_eq!(a.hour_stamp().unwrap(), "09");
    }

    #[test]
    fn malformed_dates_are_rejected() {
        let now = utc(2020, 1, 1, 0, 0);
        assert!(matches!(dated("2014/13/31", "0000").valid_date(now), Err(CatalogError::InvalidDate(_))));
        assert!(matches!(dated("yesterday", "0000").valid_date(now), Err(CatalogError::InvalidDate(_))));
        assert!(matches!(dated("2014/01/31", "x9").valid_date(now), Err(CatalogError::InvalidHour(_))));
        assert!(matches!(dated("2014/01/31", "2500").valid_date(now), Err(CatalogError::InvalidHour(_))));
    }

    #[test]
    fn steps_move_six_hours_or_a_day() {
        let t = utc(2014, 1, 31, 12, 0);
        assert_eq!(step_date(t, 1), utc(2014, 1, 31, 18, 0));
        assert_eq!(step_date(t, -1), utc(2014, 1, 31, 6, 0));
        assert_eq!(step_date(t, 10), utc(2014, 2, 1, 12, 0));
        assert_eq!(step_date(t, -10), utc(2014, 1, 30, 12, 0));
        assert_eq!(step_date(t, 0), t);
    }

    #[test]
    fn at_formats_date_and_hour() {
        let a = Attributes::default().at(utc(2014, 2, 1, 6, 0));
        assert_eq!(a.date, "2014/02/01");
        assert_eq!(a.hour, "0600");
    }

    #[test]
    fn changed_lists_differing_keys() {
        let before = Attributes::default();
        let after = Attributes {
            level: "1000hPa".to_string(),
            overlay_type: "temp".to_string(),
            ..before.clone()
        };
        assert_eq!(after.changed(&before), vec!["level", "overlayType"]);
        assert!(before.changed(&before).is_empty());
    }

    #[test]
    fn json_fills_missing_fields() {
        let a = Attributes::from_json(br#"{"param": "ocean", "overlayType": "htsgw"}"#).unwrap();
        assert_eq!(a.param, "ocean");
        assert_eq!(a.overlay_type, "htsgw");
        assert_eq!(a.date, CURRENT);
        assert!(matches!(Attributes::from_json(b"[1]"), Err(CatalogError::Corrupt(_))));
    }
}
