#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Transform-and-load pipeline for crime incident shapefiles.
//!
//! One load run validates the source, resolves the projection once, then
//! maps and reconciles every feature inside a single store transaction:
//! either the whole file lands or the table is left exactly as it was.

pub mod mapper;
pub mod reconcile;

use std::path::PathBuf;
use std::time::Instant;

use delito_map_database::DbError;
use delito_map_database::store::{IncidentStore, IncidentTransaction};
use delito_map_projection::{ProjectionError, Reprojector, TARGET_SRID};
use delito_map_shapefile::{FeatureSource, RawFeature, ShapeKind, ShapefileError, ShapefileTable};
use serde::Serialize;

pub use crate::mapper::map_feature;
pub use crate::reconcile::{ReconcileAction, ReconcileStats, Reconciler};

/// Errors that can occur during a load run.
///
/// All of them are fatal to the run: validation errors abort before the
/// transaction opens, everything else rolls the open transaction back.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// No source spatial reference id was supplied.
    #[error("source shapefile has no spatial reference id")]
    MissingSourceCrs,

    /// The source's geometry type is something other than single points.
    #[error("unsupported geometry type {found}, expected point")]
    UnsupportedGeometryType {
        /// Geometry type the source declared.
        found: ShapeKind,
    },

    /// The source carries no attribute table.
    #[error("source shapefile has no attribute table")]
    AttributesUnavailable,

    /// A feature's date and time columns do not combine into a valid
    /// timestamp.
    #[error("feature {object_id}: malformed timestamp {value:?}")]
    MalformedTimestamp {
        /// Business key of the offending feature.
        object_id: i64,
        /// The combined date + time string that failed to parse.
        value: String,
    },

    /// Coordinate system resolution or reprojection failed.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// The source shapefile could not be read.
    #[error(transparent)]
    Shapefile(#[from] ShapefileError),

    /// The store rejected a write or the transaction failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),
}

/// Parameters for one load run.
#[derive(Debug, Clone)]
pub struct LoadParams {
    /// Path to the source `.shp` (sibling `.dbf` is read with it).
    pub shapefile_path: PathBuf,
    /// EPSG code the source coordinates are in.
    pub source_srid: Option<i32>,
    /// Whether to empty the table before loading. Defaults to `true`;
    /// when `false` the run upserts by `object_id` instead.
    pub force_delete: bool,
}

impl LoadParams {
    /// Builds parameters with the default full-replace behavior.
    #[must_use]
    pub fn new(shapefile_path: impl Into<PathBuf>, source_srid: Option<i32>) -> Self {
        Self {
            shapefile_path: shapefile_path.into(),
            source_srid,
            force_delete: true,
        }
    }
}

/// Outcome of a committed load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    /// Features processed from the source.
    pub total: u64,
    /// Rows inserted as new.
    pub new: u64,
    /// Rows overwritten in place.
    pub updated: u64,
}

/// Opens the shapefile named by `params` and runs the load pipeline on it.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be read or the run fails;
/// see [`run_load`] for the failure modes.
pub async fn load_shapefile(
    store: &dyn IncidentStore,
    params: &LoadParams,
) -> Result<LoadSummary, IngestError> {
    let source = ShapefileTable::open(&params.shapefile_path)?;
    run_load(store, &source, params.source_srid, params.force_delete).await
}

/// Validates the source, then maps and reconciles every feature inside a
/// single transaction.
///
/// Validation happens before the transaction opens, in this order: srid
/// presence, srid resolution, point geometry type, attribute-table
/// availability. Once the transaction is open, any mapping or persistence
/// error rolls it back — a failed run leaves the table untouched.
///
/// # Errors
///
/// Returns [`IngestError`] on any validation, read, mapping, or
/// persistence failure.
pub async fn run_load(
    store: &dyn IncidentStore,
    source: &dyn FeatureSource,
    source_srid: Option<i32>,
    force_delete: bool,
) -> Result<LoadSummary, IngestError> {
    let start = Instant::now();

    let srid = source_srid.ok_or(IngestError::MissingSourceCrs)?;

    // One resolution per run; projections are stable for the run's duration.
    let reprojector = Reprojector::resolve(srid)?;

    let shape_kind = source.shape_kind();
    if shape_kind != ShapeKind::Point {
        return Err(IngestError::UnsupportedGeometryType { found: shape_kind });
    }

    if !source.attributes_available() {
        return Err(IngestError::AttributesUnavailable);
    }

    log::info!(
        "Loading {} feature(s) (EPSG:{srid} -> EPSG:{TARGET_SRID}, force_delete={force_delete})",
        source.size(),
    );

    let features = source.features()?;

    let txn = store.begin().await?;

    match process_features(txn.as_ref(), &features, &reprojector, force_delete).await {
        Ok(summary) => {
            txn.commit().await?;
            log::info!(
                "Load complete: {} feature(s), {} new, {} updated, took {:.1}s",
                summary.total,
                summary.new,
                summary.updated,
                start.elapsed().as_secs_f64(),
            );
            Ok(summary)
        }
        Err(e) => {
            txn.rollback().await?;
            Err(e)
        }
    }
}

async fn process_features(
    txn: &dyn IncidentTransaction,
    features: &[RawFeature],
    reprojector: &Reprojector,
    force_delete: bool,
) -> Result<LoadSummary, IngestError> {
    if force_delete {
        let removed = txn.clear().await?;
        log::info!("Cleared {removed} existing incident(s) before load");
    }

    let mut reconciler = Reconciler::new(txn, force_delete);
    let mut total = 0u64;

    for feature in features {
        let record = mapper::map_feature(feature, reprojector)?;
        let action = reconciler.reconcile(&record).await?;
        total += 1;

        log::info!(
            "[{}] [{}] POINT({} {}) => POINT({} {})",
            action.tag(),
            record.object_id,
            feature.point.x(),
            feature.point.y(),
            record.longitude,
            record.latitude,
        );
    }

    let stats = reconciler.stats();

    Ok(LoadSummary {
        total,
        new: stats.new,
        updated: stats.updated,
    })
}

#[cfg(test)]
mod tests {
    use delito_map_database::store::MemoryStore;
    use geo::Point;

    use super::*;

    struct MemorySource {
        shape_kind: ShapeKind,
        attributes_available: bool,
        features: Vec<RawFeature>,
    }

    impl FeatureSource for MemorySource {
        fn shape_kind(&self) -> ShapeKind {
            self.shape_kind
        }

        fn attributes_available(&self) -> bool {
            self.attributes_available
        }

        fn size(&self) -> u64 {
            self.features.len() as u64
        }

        fn features(&self) -> Result<Vec<RawFeature>, ShapefileError> {
            Ok(self.features.clone())
        }
    }

    fn source(features: Vec<RawFeature>) -> MemorySource {
        MemorySource {
            shape_kind: ShapeKind::Point,
            attributes_available: true,
            features,
        }
    }

    fn feature(object_id: i64, category_code: i32, date: &str, time: &str) -> RawFeature {
        RawFeature {
            object_id,
            occurred_date: date.to_string(),
            occurred_time: time.to_string(),
            category_code,
            point: Point::new(-110.95, 32.22),
        }
    }

    #[tokio::test]
    async fn first_load_inserts_everything() {
        let store = MemoryStore::new();
        let src = source(vec![
            feature(1, 3, "2020-01-05", "14:30:00"),
            feature(2, 1, "2020-01-06", "02:15:00"),
            feature(3, 99, "2020-01-07", "23:59:59"),
        ]);

        let summary = run_load(&store, &src, Some(4326), false).await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.new, 3);
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.new + summary.updated, summary.total);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn second_load_updates_repeated_ids() {
        let store = MemoryStore::new();

        let first = source(vec![
            feature(1, 3, "2020-01-05", "14:30:00"),
            feature(2, 1, "2020-01-06", "02:15:00"),
            feature(3, 2, "2020-01-07", "08:00:00"),
        ]);
        run_load(&store, &first, Some(4326), false).await.unwrap();

        let second = source(vec![
            feature(2, 8, "2020-02-01", "12:00:00"),
            feature(3, 4, "2020-02-02", "13:00:00"),
            feature(4, 3, "2020-02-03", "14:00:00"),
        ]);
        let summary = run_load(&store, &second, Some(4326), false).await.unwrap();

        assert_eq!(summary.new, 1);
        assert_eq!(summary.updated, 2);

        // Final rows = distinct object_ids across both inputs.
        let rows = store.snapshot();
        assert_eq!(rows.len(), 4);

        let two = rows.iter().find(|r| r.object_id == 2).unwrap();
        assert_eq!(two.category_code, 8);
        assert_eq!(two.category_label, "Narcomenudeo");
        assert_eq!(two.occurred_month, 2);
    }

    #[tokio::test]
    async fn force_delete_runs_are_idempotent() {
        let store = MemoryStore::new();
        let features = vec![
            feature(1, 3, "2020-01-05", "14:30:00"),
            feature(2, 5, "2020-03-10", "18:45:00"),
        ];

        let first = run_load(&store, &source(features.clone()), Some(4326), true)
            .await
            .unwrap();
        let after_first = store.snapshot();

        let second = run_load(&store, &source(features), Some(4326), true)
            .await
            .unwrap();
        let after_second = store.snapshot();

        assert_eq!(first, second);
        assert_eq!(second.new, 2);
        assert_eq!(second.updated, 0);
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn force_delete_replaces_unrelated_rows() {
        let store = MemoryStore::new();

        run_load(
            &store,
            &source(vec![feature(100, 3, "2019-12-01", "00:00:01")]),
            Some(4326),
            false,
        )
        .await
        .unwrap();

        let summary = run_load(
            &store,
            &source(vec![
                feature(1, 3, "2020-01-05", "14:30:00"),
                feature(2, 1, "2020-01-06", "02:15:00"),
            ]),
            Some(4326),
            true,
        )
        .await
        .unwrap();

        assert_eq!(summary.new, 2);
        assert_eq!(summary.updated, 0);

        let rows = store.snapshot();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.object_id != 100));
    }

    #[tokio::test]
    async fn malformed_timestamp_rolls_back_the_whole_run() {
        let store = MemoryStore::new();

        run_load(
            &store,
            &source(vec![feature(1, 3, "2019-12-01", "10:00:00")]),
            Some(4326),
            false,
        )
        .await
        .unwrap();
        let before = store.snapshot();

        let src = source(vec![
            feature(10, 2, "2020-01-01", "09:00:00"),
            feature(11, 2, "2020-01-02", "not-a-time"),
        ]);
        let err = run_load(&store, &src, Some(4326), true).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::MalformedTimestamp { object_id: 11, .. }
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn missing_srid_fails_before_touching_the_store() {
        let store = MemoryStore::new();
        let src = source(vec![feature(1, 3, "2020-01-05", "14:30:00")]);

        let err = run_load(&store, &src, None, true).await.unwrap_err();

        assert!(matches!(err, IngestError::MissingSourceCrs));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_srid_fails_before_touching_the_store() {
        let store = MemoryStore::new();
        let src = source(vec![feature(1, 3, "2020-01-05", "14:30:00")]);

        let err = run_load(&store, &src, Some(999_999), true).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::Projection(ProjectionError::UnknownCoordinateSystem { srid: 999_999, .. })
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn non_point_sources_are_rejected() {
        let store = MemoryStore::new();
        let src = MemorySource {
            shape_kind: ShapeKind::Polygon,
            attributes_available: true,
            features: vec![],
        };

        let err = run_load(&store, &src, Some(4326), true).await.unwrap_err();

        assert!(matches!(
            err,
            IngestError::UnsupportedGeometryType {
                found: ShapeKind::Polygon,
            }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_attribute_table_is_rejected() {
        let store = MemoryStore::new();
        let src = MemorySource {
            shape_kind: ShapeKind::Point,
            attributes_available: false,
            features: vec![],
        };

        let err = run_load(&store, &src, Some(4326), true).await.unwrap_err();

        assert!(matches!(err, IngestError::AttributesUnavailable));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn arizona_central_scenario_lands_in_geographic_coordinates() {
        let store = MemoryStore::new();
        let src = MemorySource {
            shape_kind: ShapeKind::Point,
            attributes_available: true,
            features: vec![RawFeature {
                object_id: 1,
                occurred_date: "2020-01-05".to_string(),
                occurred_time: "14:30:00".to_string(),
                category_code: 3,
                point: Point::new(1_000_000.0, 400_000.0),
            }],
        };

        let summary = run_load(&store, &src, Some(2866), true).await.unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.new, 1);

        let rows = store.snapshot();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];

        assert_eq!(row.object_id, 1);
        assert_eq!(row.category_label, "Robo");
        assert_eq!(row.occurred_year, 2020);
        assert_eq!(row.occurred_month, 1);
        assert_eq!(row.occurred_day, 5);
        assert!(row.longitude > -113.0 && row.longitude < -110.0);
        assert!(row.latitude > 31.0 && row.latitude < 33.0);
    }
}
