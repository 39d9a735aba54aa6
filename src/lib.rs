//! geoloc: geocoded location records.
//!
//! Place queries are resolved to coordinates through an XML geocoding web
//! service, cached in SQLite with a time-based expiry, and searched by
//! bounding box or by distance.

pub mod config;
pub mod distance;
pub mod field;
pub mod geocoding;
pub mod location;
