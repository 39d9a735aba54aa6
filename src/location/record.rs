//! The `Location` record: a place query and its cached coordinates.

use super::types::{Coords, LatLon};
use crate::distance::{great_circle, Units};
use crate::field::{DictionaryField, SerializedField};
use crate::geocoding::{Geocoder, GeocodingError, GeocodingResult, Provider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;
use std::time::Duration;
use tracing::debug;

/// Longest friendly name kept; longer names are cut.
pub const FRIENDLY_NAME_MAX: usize = 250;

/// A stored place query with its geocoded position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Option<i64>,
    pub query: String,
    pub friendly_name: Option<String>,
    /// Geocoder for this record. Unset means the geocoder's default, which
    /// is filled in on first refresh.
    pub provider: Option<Provider>,
    /// Last raw geocoder answer. Not part of the JSON view.
    #[serde(skip)]
    pub geocoder: SerializedField<Option<GeocodingResult>>,
    pub response_data: DictionaryField,
    pub latitude: f64,
    pub longitude: f64,
    pub refreshed: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub is_public: bool,
}

impl Location {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: None,
            query: query.into(),
            friendly_name: None,
            provider: None,
            geocoder: SerializedField::default(),
            response_data: DictionaryField::default(),
            latitude: 0.0,
            longitude: 0.0,
            refreshed: None,
            created: None,
            is_public: true,
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.set_friendly_name(name);
        self
    }

    pub fn set_friendly_name(&mut self, name: impl Into<String>) {
        let name: String = name.into();
        self.friendly_name = Some(name.chars().take(FRIENDLY_NAME_MAX).collect());
    }

    /// Friendly name when set, the query otherwise.
    pub fn name(&self) -> &str {
        match self.friendly_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.query,
        }
    }

    pub fn coords(&self) -> Coords {
        Coords {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn coords_tuple(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// `(0, 0)` doubles as "not geocoded yet".
    pub fn has_coordinates(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Never refreshed, or refreshed more than `max_age` before `now`.
    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.refreshed {
            None => true,
            Some(refreshed) => now
                .signed_duration_since(refreshed)
                .to_std()
                .map(|age| age > max_age)
                .unwrap_or(false),
        }
    }

    /// Geocode the query with this location's provider, or the geocoder's
    /// default when unset, and store the answer.
    pub fn refresh(&mut self, geocoder: &Geocoder, now: DateTime<Utc>) -> Result<(), GeocodingError> {
        let provider = *self.provider.get_or_insert(geocoder.default_provider());
        let result = geocoder.geocode_with(provider, &self.query)?;
        debug!(query = %self.query, lat = result.coords.latitude, lon = result.coords.longitude, "location refreshed");

        self.latitude = result.coords.latitude;
        self.longitude = result.coords.longitude;
        self.response_data = result.response.to_dictionary();
        self.geocoder = SerializedField::new(Some(result));
        self.refreshed = Some(now);
        Ok(())
    }

    /// Refresh when the cached position is stale or missing. Returns whether
    /// the geocoder was called.
    pub fn refresh_if_needed(
        &mut self,
        geocoder: &Geocoder,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, GeocodingError> {
        if self.is_expired(max_age, now) || !self.has_coordinates() {
            self.refresh(geocoder, now)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Great-circle distance to `other`, in `units`.
    pub fn distance_between(&self, other: &impl LatLon, units: Units) -> f64 {
        let here = self.coords_tuple();
        let there = other.lat_lon();
        if here == there {
            return 0.0;
        }
        great_circle(here, there).in_units(units)
    }

    /// Strictly inside the box spanned by its north-west and south-east
    /// corners.
    pub fn within_bounds(&self, north_west: &impl LatLon, south_east: &impl LatLon) -> bool {
        let (north, west) = north_west.lat_lon();
        let (south, east) = south_east.lat_lon();
        south < self.latitude
            && self.latitude < north
            && west < self.longitude
            && self.longitude < east
    }
}

impl LatLon for Location {
    fn lat_lon(&self) -> (f64, f64) {
        self.coords_tuple()
    }
}

impl Index<usize> for Location {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        match index {
            0 => &self.latitude,
            1 => &self.longitude,
            _ => panic!("location index out of range: {}", index),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
