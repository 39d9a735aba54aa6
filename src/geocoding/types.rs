//! Core types for the geocoding subsystem.

use super::providers::Provider;
use crate::field::DictionaryField;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;
use thiserror::Error;

/// A geocoded position.
///
/// `granularity` follows the 0–9 accuracy scale (0 unknown, 1 country,
/// 4 town, 8 address, 9 premise).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub granularity: u8,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }

    /// Like [`Coordinates::new`], but rejects values that are not finite or
    /// lie off the globe.
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self, FetchError> {
        check_range("latitude", latitude, 90.0)?;
        check_range("longitude", longitude, 180.0)?;
        Ok(Self::new(latitude, longitude))
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_granularity(mut self, granularity: u8) -> Self {
        self.granularity = granularity;
        self
    }

    /// `(latitude, longitude, elevation)`
    pub fn as_tuple(&self) -> (f64, f64, f64) {
        (self.latitude, self.longitude, self.elevation)
    }

    pub fn lat_lon(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

impl Index<usize> for Coordinates {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        match index {
            0 => &self.latitude,
            1 => &self.longitude,
            2 => &self.elevation,
            _ => panic!("coordinate index out of range: {}", index),
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.latitude, self.longitude, self.elevation)
    }
}

/// One element of a geocoder response: its text content and attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct XmlElement {
    pub tag: String,
    pub text: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
}

impl XmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Flat view of an XML document: every element keyed by its lower-cased,
/// namespace-free tag. No nesting is kept; when a tag repeats, the last
/// occurrence wins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct XmlResponse {
    pub raw: String,
    pub data: BTreeMap<String, XmlElement>,
}

impl XmlResponse {
    pub fn element(&self, tag: &str) -> Result<&XmlElement, FetchError> {
        self.data
            .get(tag)
            .ok_or_else(|| FetchError::MissingElement(tag.to_string()))
    }

    pub fn text(&self, tag: &str) -> Result<&str, FetchError> {
        self.element(tag).map(|el| el.text.as_str())
    }

    /// Text content of `tag` parsed as a number.
    pub fn number(&self, tag: &str) -> Result<f64, FetchError> {
        parse_number(tag, self.text(tag)?)
    }

    /// The tag → text dictionary stored alongside a location.
    pub fn to_dictionary(&self) -> DictionaryField {
        self.data
            .iter()
            .map(|(tag, el)| (tag.clone(), el.text.clone()))
            .collect()
    }
}

pub(crate) fn parse_number(field: &str, value: &str) -> Result<f64, FetchError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| FetchError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn check_range(field: &str, value: f64, limit: f64) -> Result<(), FetchError> {
    // NaN fails the comparison too.
    if value.abs() <= limit {
        Ok(())
    } else {
        Err(FetchError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

/// The outcome of a successful geocoding request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodingResult {
    pub query: String,
    pub provider: Provider,
    pub response: XmlResponse,
    pub coords: Coordinates,
}

impl fmt::Display for GeocodingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GeocodingResult for '{}' via {}", self.query, self.provider)
    }
}

/// What went wrong inside a geocoding request.
///
/// Callers only ever see [`GeocodingError`]; this is kept as its source so
/// logs still say why.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid geocoder URL: {0}")]
    Url(String),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("provider returned status {0}")]
    Status(String),

    #[error("response has no <{0}> element")]
    MissingElement(String),

    #[error("<{element}> has no '{attr}' attribute")]
    MissingAttribute { element: String, attr: String },

    #[error("'{value}' in <{field}> is not a number")]
    InvalidNumber { field: String, value: String },

    #[error("unknown precision '{0}'")]
    UnknownPrecision(String),
}

/// The single error raised for any geocoding failure.
#[derive(Debug, Error)]
#[error("The location '{query}' could not be geocoded.")]
pub struct GeocodingError {
    pub query: String,
    #[source]
    pub cause: FetchError,
}

impl GeocodingError {
    pub fn new(query: impl Into<String>, cause: FetchError) -> Self {
        Self {
            query: query.into(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_indexable() {
        let c = Coordinates::new(51.5, -0.12).with_elevation(11.0);
        assert_eq!(c[0], 51.5);
        assert_eq!(c[1], -0.12);
        assert_eq!(c[2], 11.0);
        assert_eq!(c.as_tuple(), (51.5, -0.12, 11.0));
    }

    #[test]
    #[should_panic]
    fn test_coordinates_index_out_of_range() {
        let c = Coordinates::default();
        let _ = c[3];
    }

    #[test]
    fn test_checked_coordinates() {
        assert_eq!(Coordinates::try_new(-90.0, 180.0).unwrap().lat_lon(), (-90.0, 180.0));
        assert!(matches!(
            Coordinates::try_new(90.5, 0.0),
            Err(FetchError::InvalidNumber { ref field, .. }) if field == "latitude"
        ));
        assert!(matches!(
            Coordinates::try_new(0.0, -181.0),
            Err(FetchError::InvalidNumber { ref field, .. }) if field == "longitude"
        ));
        assert!(Coordinates::try_new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        assert_eq!(parse_number("lat", " 51.5 ").unwrap(), 51.5);
        for bad in ["NaN", "inf", "-infinity", "abc"] {
            assert!(matches!(parse_number("lat", bad), Err(FetchError::InvalidNumber { .. })));
        }
    }

    #[test]
    fn test_response_lookups() {
        let mut response = XmlResponse::default();
        response.data.insert(
            "lat".into(),
            XmlElement { tag: "lat".into(), text: "51.5".into(), attrs: BTreeMap::new() },
        );
        response.data.insert(
            "name".into(),
            XmlElement { tag: "name".into(), text: "London".into(), attrs: BTreeMap::new() },
        );

        assert_eq!(response.number("lat").unwrap(), 51.5);
        assert!(matches!(response.number("name"), Err(FetchError::InvalidNumber { .. })));
        assert!(matches!(response.text("lng"), Err(FetchError::MissingElement(ref t)) if t == "lng"));

        let dict = response.to_dictionary();
        assert_eq!(dict.get_str("name"), Some("London"));
    }

    #[test]
    fn test_geocoding_error_message() {
        let err = GeocodingError::new("Atlantis", FetchError::MissingElement("lat".into()));
        assert_eq!(err.to_string(), "The location 'Atlantis' could not be geocoded.");
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("<lat>"));
    }
}
