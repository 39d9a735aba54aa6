//! Shared types for the location subsystem.

use crate::field::FieldError;
use crate::geocoding::{Coordinates, GeocodingError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Anything with a latitude/longitude pair: a corner of a bounding box, the
/// other end of a distance, or a stored location.
pub trait LatLon {
    fn lat_lon(&self) -> (f64, f64);
}

impl LatLon for (f64, f64) {
    fn lat_lon(&self) -> (f64, f64) {
        *self
    }
}

impl LatLon for Coordinates {
    fn lat_lon(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Dictionary view of a location's position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coords {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon for Coords {
    fn lat_lon(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Location store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Geocoding(#[from] GeocodingError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("location {0} does not exist")]
    NotFound(i64),

    #[error("a location needs a non-empty query")]
    EmptyQuery,

    #[error("cannot create database directory {path}: {source}")]
    Directory {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
