//! Geocoding providers: Yahoo! Maps, Google Maps and GeoNames.
//!
//! Every provider speaks plain HTTP GET with query-string parameters and
//! answers in XML. They differ in endpoint, parameter names, whether an API
//! key is sent, and where the coordinates live in the response.

use super::types::{parse_number, Coordinates, FetchError, XmlResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A third-party geocoding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Yahoo! Maps. Needs a `yahoo` key.
    Yahoo,
    /// Google Maps. Needs a `google` key.
    Google,
    /// GeoNames. Works without a key.
    #[default]
    GeoNames,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Yahoo, Provider::Google, Provider::GeoNames];

    /// Name used in configuration and the `GEOCODING_KEYS`-style key table.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Google => "google",
            Self::GeoNames => "geonames",
        }
    }

    pub fn from_short_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.short_name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Yahoo => "http://local.yahooapis.com/MapsService/V1/geocode",
            Self::Google => "http://maps.google.com/maps/geo",
            Self::GeoNames => "http://api.geonames.org/search",
        }
    }

    /// Query parameter carrying the API key. GeoNames calls it `username`.
    pub fn key_param(self) -> &'static str {
        match self {
            Self::Yahoo => "appid",
            Self::Google => "key",
            Self::GeoNames => "username",
        }
    }

    /// Query parameter carrying the place name.
    pub fn query_param(self) -> &'static str {
        match self {
            Self::Yahoo => "location",
            Self::Google | Self::GeoNames => "q",
        }
    }

    /// Fixed extra arguments sent with every request.
    pub fn default_args(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Yahoo => &[],
            Self::Google => &[("output", "xml")],
            Self::GeoNames => &[("maxRows", "1")],
        }
    }

    /// Pull the coordinates out of a parsed response.
    pub fn extract(self, response: &XmlResponse) -> Result<Coordinates, FetchError> {
        match self {
            Self::Yahoo => extract_yahoo(response),
            Self::Google => extract_google(response),
            Self::GeoNames => extract_geonames(response),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_short_name(s).ok_or_else(|| {
            format!(
                "Unknown geocoder '{}'. Use one of: yahoo, google, geonames.",
                s
            )
        })
    }
}

// ─── Yahoo! ─────────────────────────────────────────────────────

/// Map a Yahoo! `precision` attribute onto the 0–9 accuracy scale.
pub fn yahoo_precision_to_granularity(precision: &str) -> Option<u8> {
    let level = match precision.to_lowercase().as_str() {
        "country" => 1,
        "state" => 2,
        "city" => 4,
        "zip" | "zip+2" | "zip+4" => 5,
        "street" => 6,
        "address" => 8,
        _ => return None,
    };
    Some(level)
}

fn extract_yahoo(response: &XmlResponse) -> Result<Coordinates, FetchError> {
    let latitude = response.number("latitude")?;
    let longitude = response.number("longitude")?;
    let result = response.element("result")?;
    let precision = result
        .attr("precision")
        .ok_or_else(|| FetchError::MissingAttribute {
            element: "result".into(),
            attr: "precision".into(),
        })?;
    let granularity = yahoo_precision_to_granularity(precision)
        .ok_or_else(|| FetchError::UnknownPrecision(precision.to_string()))?;

    Ok(Coordinates::try_new(latitude, longitude)?.with_granularity(granularity))
}

// ─── Google ─────────────────────────────────────────────────────

const GOOGLE_STATUS_OK: &str = "200";

fn extract_google(response: &XmlResponse) -> Result<Coordinates, FetchError> {
    if let Ok(code) = response.text("code") {
        if code != GOOGLE_STATUS_OK {
            return Err(FetchError::Status(code.to_string()));
        }
    }

    // KML order: longitude,latitude[,altitude]
    let raw = response.text("coordinates")?;
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return Err(FetchError::InvalidNumber {
            field: "coordinates".into(),
            value: raw.to_string(),
        });
    }
    let longitude = parse_number("coordinates", parts[0])?;
    let latitude = parse_number("coordinates", parts[1])?;
    let elevation = match parts.get(2) {
        Some(v) if !v.is_empty() => parse_number("coordinates", v)?,
        _ => 0.0,
    };

    let granularity = response
        .element("addressdetails")
        .ok()
        .and_then(|el| el.attr("Accuracy").or_else(|| el.attr("accuracy")))
        .and_then(|a| a.parse::<u8>().ok())
        .unwrap_or(0);

    Ok(Coordinates::try_new(latitude, longitude)?
        .with_elevation(elevation)
        .with_granularity(granularity))
}

// ─── GeoNames ───────────────────────────────────────────────────

fn extract_geonames(response: &XmlResponse) -> Result<Coordinates, FetchError> {
    // GeoNames reports errors as <status message=".." value=".."/>
    if let Ok(status) = response.element("status") {
        let message = status.attr("message").unwrap_or("unknown error");
        return Err(FetchError::Status(message.to_string()));
    }
    Coordinates::try_new(response.number("lat")?, response.number("lng")?)
}
