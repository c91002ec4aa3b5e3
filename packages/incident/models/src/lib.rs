#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The canonical incident record entity and the municipal category catalog.
//!
//! Every feature read from a source shapefile is normalized into an
//! [`IncidentRecord`] before it reaches the database. The catalog maps the
//! city's numeric incident-type codes (`FK_delito_` in the source attribute
//! table) to their published Spanish labels.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A crime incident normalized to the persisted schema.
///
/// The date/time component fields are always derived from `occurred_at`;
/// use [`IncidentRecord::from_parts`] to keep them consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Business key from the source (`OBJECTID`). Unique per incident and
    /// immutable once created.
    pub object_id: i64,
    /// Raw incident-type code from the source (`FK_delito_`).
    pub category_code: i32,
    /// Label from the category catalog. Empty for codes the catalog does
    /// not list.
    pub category_label: String,
    /// When the incident occurred (no timezone in the source data).
    pub occurred_at: NaiveDateTime,
    /// Calendar date portion of `occurred_at`.
    pub occurred_date: NaiveDate,
    /// Time-of-day portion of `occurred_at`.
    pub occurred_time: NaiveTime,
    /// Year portion of `occurred_at`.
    pub occurred_year: i32,
    /// Month portion of `occurred_at` (1-12).
    pub occurred_month: u32,
    /// Day-of-month portion of `occurred_at` (1-31).
    pub occurred_day: u32,
    /// Longitude in EPSG:4326, after reprojection from the source CRS.
    pub longitude: f64,
    /// Latitude in EPSG:4326, after reprojection from the source CRS.
    pub latitude: f64,
}

impl IncidentRecord {
    /// Builds a record from the mapped pieces, deriving every date/time
    /// component field from `occurred_at`.
    #[must_use]
    pub fn from_parts(
        object_id: i64,
        category_code: i32,
        occurred_at: NaiveDateTime,
        longitude: f64,
        latitude: f64,
    ) -> Self {
        Self {
            object_id,
            category_code,
            category_label: label_for(category_code).to_string(),
            occurred_at,
            occurred_date: occurred_at.date(),
            occurred_time: occurred_at.time(),
            occurred_year: occurred_at.year(),
            occurred_month: occurred_at.month(),
            occurred_day: occurred_at.day(),
            longitude,
            latitude,
        }
    }

    /// Whether the derived component fields still match `occurred_at`.
    ///
    /// Holds by construction for records built with
    /// [`IncidentRecord::from_parts`]; rows decoded from external storage
    /// can be re-checked with this.
    #[must_use]
    pub fn components_consistent(&self) -> bool {
        self.occurred_date == self.occurred_at.date()
            && self.occurred_time == self.occurred_at.time()
            && self.occurred_year == self.occurred_at.year()
            && self.occurred_month == self.occurred_at.month()
            && self.occurred_day == self.occurred_at.day()
    }
}

/// Returns the published label for a municipal incident-type code.
///
/// Total function: codes outside the catalog map to the empty string
/// rather than an error. The city's exports routinely contain codes the
/// published catalog doesn't list, and those incidents still get loaded.
#[must_use]
pub const fn label_for(code: i32) -> &'static str {
    match code {
        1 => "Homicidio",
        2 => "Lesiones",
        3 => "Robo",
        4 => "Robo de vehículo",
        5 => "Violación",
        6 => "Secuestro",
        7 => "Extorsión",
        8 => "Narcomenudeo",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn catalog_labels() {
        assert_eq!(label_for(1), "Homicidio");
        assert_eq!(label_for(2), "Lesiones");
        assert_eq!(label_for(3), "Robo");
        assert_eq!(label_for(4), "Robo de vehículo");
        assert_eq!(label_for(5), "Violación");
        assert_eq!(label_for(6), "Secuestro");
        assert_eq!(label_for(7), "Extorsión");
        assert_eq!(label_for(8), "Narcomenudeo");
    }

    #[test]
    fn unlisted_codes_get_empty_label() {
        assert_eq!(label_for(0), "");
        assert_eq!(label_for(9), "");
        assert_eq!(label_for(-1), "");
        assert_eq!(label_for(i32::MAX), "");
    }

    #[test]
    fn from_parts_derives_components() {
        let occurred_at = NaiveDate::from_ymd_opt(2020, 1, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let record = IncidentRecord::from_parts(1, 3, occurred_at, -110.95, 32.22);

        assert_eq!(record.category_label, "Robo");
        assert_eq!(record.occurred_year, 2020);
        assert_eq!(record.occurred_month, 1);
        assert_eq!(record.occurred_day, 5);
        assert_eq!(record.occurred_time.hour(), 14);
        assert_eq!(record.occurred_time.minute(), 30);
        assert!(record.components_consistent());
    }

    #[test]
    fn components_recombine_to_occurred_at() {
        let occurred_at = NaiveDate::from_ymd_opt(2019, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let record = IncidentRecord::from_parts(42, 8, occurred_at, -111.0, 31.5);

        assert_eq!(record.occurred_date.and_time(record.occurred_time), record.occurred_at);
    }
}
