//! Maps raw shapefile features to normalized incident records.

use chrono::NaiveDateTime;
use delito_map_incident_models::IncidentRecord;
use delito_map_projection::Reprojector;
use delito_map_shapefile::RawFeature;

use crate::IngestError;

/// Format of the combined date + time-of-day columns.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maps one raw feature to an [`IncidentRecord`].
///
/// The source splits the occurrence timestamp across a date column and a
/// time-of-day string column; they are recombined here and parsed as one
/// timestamp, and every derived date/time field comes from that parse
/// rather than the source columns.
///
/// # Errors
///
/// Returns [`IngestError::MalformedTimestamp`] if the two columns do not
/// combine into a valid timestamp, or a projection error if the point
/// cannot be reprojected.
pub fn map_feature(
    feature: &RawFeature,
    reprojector: &Reprojector,
) -> Result<IncidentRecord, IngestError> {
    let combined = format!("{} {}", feature.occurred_date, feature.occurred_time);

    let occurred_at = NaiveDateTime::parse_from_str(&combined, TIMESTAMP_FORMAT).map_err(|_| {
        IngestError::MalformedTimestamp {
            object_id: feature.object_id,
            value: combined,
        }
    })?;

    let location = reprojector.reproject(feature.point)?;

    Ok(IncidentRecord::from_parts(
        feature.object_id,
        feature.category_code,
        occurred_at,
        location.x(),
        location.y(),
    ))
}
