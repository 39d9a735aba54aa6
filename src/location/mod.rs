//! Location records and their SQLite store.
//!
//! A [`Location`] pairs a free-text place query with coordinates resolved by
//! a geocoder. The [`LocationStore`] keeps them in a table and answers
//! bounding-box and proximity queries.

#[cfg(test)]
mod fixtures;
pub mod record;
pub mod store;
pub mod types;

pub use record::{Location, FRIENDLY_NAME_MAX};
pub use store::LocationStore;
pub use types::{Coords, LatLon, StoreError};
