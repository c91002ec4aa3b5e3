#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Source reader boundary for incident shapefiles.
//!
//! Wraps the `shapefile` crate (and its `dbase` attribute reader) behind the
//! [`FeatureSource`] trait so the pipeline never touches the binary format
//! directly. The dynamic attribute bag is converted to the typed
//! [`RawFeature`] structure here, on ingress, rather than trusted throughout
//! the pipeline.

use std::path::Path;

use geo::Point;
use shapefile::dbase::{FieldValue, Record};
use shapefile::{Shape, ShapeType};
use strum_macros::{AsRefStr, Display};

/// Attribute column holding the incident business key.
pub const FIELD_OBJECT_ID: &str = "OBJECTID";
/// Attribute column holding the occurrence date.
pub const FIELD_OCCURRED_DATE: &str = "fecha_ocur";
/// Attribute column holding the occurrence time-of-day string.
pub const FIELD_OCCURRED_TIME: &str = "hora_ocurr";
/// Attribute column holding the numeric incident-type code.
pub const FIELD_CATEGORY_CODE: &str = "FK_delito_";

/// Errors that can occur while reading a source shapefile.
#[derive(Debug, thiserror::Error)]
pub enum ShapefileError {
    /// The `.shp`/`.dbf` pair could not be opened or decoded.
    #[error("Failed to read shapefile: {0}")]
    Read(#[from] shapefile::Error),

    /// A feature's geometry was not a single point.
    #[error("feature {index}: geometry is not a single point")]
    NotAPoint {
        /// Zero-based position of the feature in the file.
        index: usize,
    },

    /// A feature was missing an expected attribute column.
    #[error("feature {index}: missing attribute {name:?}")]
    MissingAttribute {
        /// Zero-based position of the feature in the file.
        index: usize,
        /// Name of the missing attribute column.
        name: &'static str,
    },

    /// An attribute had a type the loader cannot interpret.
    #[error("feature {index}: attribute {name:?} has an unexpected type")]
    AttributeType {
        /// Zero-based position of the feature in the file.
        index: usize,
        /// Name of the offending attribute column.
        name: &'static str,
    },
}

/// File-level geometry type of a shapefile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ShapeKind {
    /// Null shapes (no geometry).
    Null,
    /// Single 2D points. The only kind the pipeline accepts.
    Point,
    /// Points with a measure value.
    PointM,
    /// Points with elevation.
    PointZ,
    /// Line strings.
    Polyline,
    /// Line strings with measures.
    PolylineM,
    /// Line strings with elevation.
    PolylineZ,
    /// Polygons.
    Polygon,
    /// Polygons with measures.
    PolygonM,
    /// Polygons with elevation.
    PolygonZ,
    /// Point collections.
    Multipoint,
    /// Point collections with measures.
    MultipointM,
    /// Point collections with elevation.
    MultipointZ,
    /// Multipatch surfaces.
    Multipatch,
}

impl From<ShapeType> for ShapeKind {
    fn from(value: ShapeType) -> Self {
        match value {
            ShapeType::Point => Self::Point,
            ShapeType::PointM => Self::PointM,
            ShapeType::PointZ => Self::PointZ,
            ShapeType::Polyline => Self::Polyline,
            ShapeType::PolylineM => Self::PolylineM,
            ShapeType::PolylineZ => Self::PolylineZ,
            ShapeType::Polygon => Self::Polygon,
            ShapeType::PolygonM => Self::PolygonM,
            ShapeType::PolygonZ => Self::PolygonZ,
            ShapeType::Multipoint => Self::Multipoint,
            ShapeType::MultipointM => Self::MultipointM,
            ShapeType::MultipointZ => Self::MultipointZ,
            ShapeType::Multipatch => Self::Multipatch,
            _ => Self::Null,
        }
    }
}

/// One feature as read from the source, typed at the reader boundary.
///
/// Date and time content stay raw strings: combining and parsing them into
/// a timestamp is the record mapper's job, along with the error that parse
/// can produce.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeature {
    /// Business key (`OBJECTID`).
    pub object_id: i64,
    /// Occurrence date as stored, formatted `YYYY-MM-DD`.
    pub occurred_date: String,
    /// Occurrence time-of-day as stored (e.g. `"14:30:00"`).
    pub occurred_time: String,
    /// Numeric incident-type code (`FK_delito_`).
    pub category_code: i32,
    /// Point geometry in the source coordinate system.
    pub point: Point<f64>,
}

/// A finite source of incident features plus its file-level metadata.
///
/// Implemented by [`ShapefileTable`] for real `.shp`/`.dbf` pairs; tests
/// substitute in-memory sources.
pub trait FeatureSource {
    /// Geometry type declared by the source.
    fn shape_kind(&self) -> ShapeKind;

    /// Whether the source carries an attribute table at all.
    fn attributes_available(&self) -> bool;

    /// Number of features in the source.
    fn size(&self) -> u64;

    /// Reads every feature as a typed [`RawFeature`].
    ///
    /// # Errors
    ///
    /// Returns [`ShapefileError`] if a feature's geometry is not a point or
    /// an expected attribute is missing or mistyped.
    fn features(&self) -> Result<Vec<RawFeature>, ShapefileError>;
}

/// A whole incident shapefile read into memory.
///
/// Files are small municipal exports; streaming reads are out of scope.
pub struct ShapefileTable {
    shape_kind: ShapeKind,
    attributes_available: bool,
    pairs: Vec<(Shape, Record)>,
}

impl ShapefileTable {
    /// Opens the `.shp` at `path` together with its sibling `.dbf`.
    ///
    /// # Errors
    ///
    /// Returns [`ShapefileError::Read`] if either file cannot be opened or
    /// decoded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ShapefileError> {
        let mut reader = shapefile::Reader::from_path(path.as_ref())?;

        let shape_kind = ShapeKind::from(reader.header().shape_type);

        let pairs: Vec<(Shape, Record)> = reader
            .iter_shapes_and_records()
            .collect::<Result<_, _>>()?;

        // A .dbf with no columns decodes to empty records.
        let attributes_available = pairs
            .first()
            .is_none_or(|(_, record)| record.clone().into_iter().next().is_some());

        log::debug!(
            "Opened {} ({} features, {shape_kind} geometry)",
            path.as_ref().display(),
            pairs.len(),
        );

        Ok(Self {
            shape_kind,
            attributes_available,
            pairs,
        })
    }
}

impl FeatureSource for ShapefileTable {
    fn shape_kind(&self) -> ShapeKind {
        self.shape_kind
    }

    fn attributes_available(&self) -> bool {
        self.attributes_available
    }

    fn size(&self) -> u64 {
        self.pairs.len() as u64
    }

    fn features(&self) -> Result<Vec<RawFeature>, ShapefileError> {
        self.pairs
            .iter()
            .enumerate()
            .map(|(index, (shape, record))| convert_feature(index, shape, record))
            .collect()
    }
}

/// Converts one `(shape, record)` pair into a typed [`RawFeature`].
fn convert_feature(
    index: usize,
    shape: &Shape,
    record: &Record,
) -> Result<RawFeature, ShapefileError> {
    let Shape::Point(point) = shape else {
        return Err(ShapefileError::NotAPoint { index });
    };

    Ok(RawFeature {
        object_id: int_attribute(record, index, FIELD_OBJECT_ID)?,
        occurred_date: date_attribute(record, index, FIELD_OCCURRED_DATE)?,
        occurred_time: string_attribute(record, index, FIELD_OCCURRED_TIME)?,
        category_code: i32::try_from(int_attribute(record, index, FIELD_CATEGORY_CODE)?)
            .map_err(|_| ShapefileError::AttributeType {
                index,
                name: FIELD_CATEGORY_CODE,
            })?,
        point: Point::new(point.x, point.y),
    })
}

fn attribute<'a>(
    record: &'a Record,
    index: usize,
    name: &'static str,
) -> Result<&'a FieldValue, ShapefileError> {
    record
        .get(name)
        .ok_or(ShapefileError::MissingAttribute { index, name })
}

/// Reads an integer attribute. dBASE stores integers either natively or as
/// numerics, depending on the tool that produced the file.
#[allow(clippy::cast_possible_truncation)]
fn int_attribute(record: &Record, index: usize, name: &'static str) -> Result<i64, ShapefileError> {
    match attribute(record, index, name)? {
        FieldValue::Integer(value) => Ok(i64::from(*value)),
        FieldValue::Numeric(Some(value)) => Ok(*value as i64),
        FieldValue::Double(value) => Ok(*value as i64),
        _ => Err(ShapefileError::AttributeType { index, name }),
    }
}

fn string_attribute(
    record: &Record,
    index: usize,
    name: &'static str,
) -> Result<String, ShapefileError> {
    match attribute(record, index, name)? {
        FieldValue::Character(Some(value)) => Ok(value.trim().to_string()),
        _ => Err(ShapefileError::AttributeType { index, name }),
    }
}

/// Reads a date attribute as a `YYYY-MM-DD` string, from either a native
/// dBASE date column or a character column.
fn date_attribute(
    record: &Record,
    index: usize,
    name: &'static str,
) -> Result<String, ShapefileError> {
    match attribute(record, index, name)? {
        FieldValue::Date(Some(date)) => Ok(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        )),
        FieldValue::Character(Some(value)) => Ok(value.trim().to_string()),
        _ => Err(ShapefileError::AttributeType { index, name }),
    }
}
