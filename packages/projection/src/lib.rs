#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate system resolution and point reprojection.
//!
//! Incident shapefiles arrive in whatever projected CRS the city GIS uses;
//! everything at rest is EPSG:4326. A [`Reprojector`] is resolved once per
//! load run and reused for every feature.

use geo::Point;
use proj::{Proj, ProjCreateError, ProjError, Transform};

/// The geographic coordinate system every stored location uses.
pub const TARGET_SRID: i32 = 4326;

/// Errors that can occur while resolving or applying a projection.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// The source srid is not in the PROJ coordinate-system database.
    #[error("unknown coordinate system: EPSG:{srid}")]
    UnknownCoordinateSystem {
        /// The unresolvable srid.
        srid: i32,
        /// Underlying PROJ failure.
        #[source]
        source: ProjCreateError,
    },

    /// A point could not be transformed between the two systems.
    #[error("Reprojection failed: {0}")]
    Reproject(#[from] ProjError),
}

/// A resolved source-to-target projection pipeline.
///
/// Axis order is normalized to x=longitude/easting, y=latitude/northing on
/// both sides, so [`geo::Point`] coordinates pass straight through.
#[derive(Debug)]
pub struct Reprojector {
    source_srid: i32,
    forward: Proj,
}

impl Reprojector {
    /// Resolves the projection from `source_srid` to [`TARGET_SRID`].
    ///
    /// Resolution is the expensive step (a PROJ database lookup), so this
    /// runs once per load, not once per feature.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::UnknownCoordinateSystem`] if PROJ does not
    /// know the EPSG code.
    pub fn resolve(source_srid: i32) -> Result<Self, ProjectionError> {
        let forward = Proj::new_known_crs(
            &format!("EPSG:{source_srid}"),
            &format!("EPSG:{TARGET_SRID}"),
            None,
        )
        .map_err(|source| ProjectionError::UnknownCoordinateSystem {
            srid: source_srid,
            source,
        })?;

        log::debug!("Resolved projection EPSG:{source_srid} -> EPSG:{TARGET_SRID}");

        Ok(Self {
            source_srid,
            forward,
        })
    }

    /// The srid this reprojector was resolved for.
    #[must_use]
    pub const fn source_srid(&self) -> i32 {
        self.source_srid
    }

    /// Reprojects a single point from the source system into
    /// [`TARGET_SRID`] lon/lat.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Reproject`] if PROJ rejects the
    /// coordinates (e.g. outside the projection's domain).
    pub fn reproject(&self, point: Point<f64>) -> Result<Point<f64>, ProjectionError> {
        let mut reprojected = point;
        reprojected.transform(&self.forward)?;
        Ok(reprojected)
    }
}
