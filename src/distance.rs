//! Great-circle distance between two lat/lon points.
//!
//! Uses the spherical special case of the Vincenty formula, which stays
//! numerically stable for both tiny and antipodal separations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DEG: f64 = std::f64::consts::PI / 180.0;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.009;

const MILES_PER_KM: f64 = 1.0 / 1.609344;
const FEET_PER_MILE: f64 = 5280.0;
const NAUTICAL_PER_KM: f64 = 1.0 / 1.852;

/// Unit of measurement for reported distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Kilometers,
    #[default]
    Miles,
    Feet,
    Nautical,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kilometers => write!(f, "kilometers"),
            Self::Miles => write!(f, "miles"),
            Self::Feet => write!(f, "feet"),
            Self::Nautical => write!(f, "nautical"),
        }
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kilometers" | "kilometres" | "km" => Ok(Self::Kilometers),
            "miles" | "mi" => Ok(Self::Miles),
            "feet" | "ft" => Ok(Self::Feet),
            "nautical" | "nm" => Ok(Self::Nautical),
            _ => Err(format!(
                "Unknown units '{}'. Use kilometers, miles, feet or nautical.",
                s
            )),
        }
    }
}

/// A distance on the Earth's surface.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Distance {
    km: f64,
}

impl Distance {
    pub const ZERO: Distance = Distance { km: 0.0 };

    pub const fn from_km(km: f64) -> Self {
        Self { km }
    }

    pub fn kilometers(self) -> f64 {
        self.km
    }

    pub fn miles(self) -> f64 {
        self.km * MILES_PER_KM
    }

    pub fn feet(self) -> f64 {
        self.miles() * FEET_PER_MILE
    }

    pub fn nautical(self) -> f64 {
        self.km * NAUTICAL_PER_KM
    }

    pub fn in_units(self, units: Units) -> f64 {
        match units {
            Units::Kilometers => self.kilometers(),
            Units::Miles => self.miles(),
            Units::Feet => self.feet(),
            Units::Nautical => self.nautical(),
        }
    }
}

/// Great-circle distance between `(lat, lon)` pairs given in degrees.
pub fn great_circle(a: (f64, f64), b: (f64, f64)) -> Distance {
    let (lat1, lon1) = (a.0 * DEG, a.1 * DEG);
    let (lat2, lon2) = (b.0 * DEG, b.1 * DEG);

    let (lat1_sin, lat1_cos) = lat1.sin_cos();
    let (lat2_sin, lat2_cos) = lat2.sin_cos();

    let dlon = (lon1 - lon2).abs();
    let (dlon_sin, dlon_cos) = dlon.sin_cos();

    let nom1 = lat2_cos * dlon_sin;
    let nom2 = lat1_cos * lat2_sin - lat1_sin * lat2_cos * dlon_cos;
    let nom = (nom1 * nom1 + nom2 * nom2).sqrt();
    let denom = lat1_sin * lat2_sin + lat1_cos * lat2_cos * dlon_cos;

    Distance::from_km(EARTH_RADIUS_KM * nom.atan2(denom))
}
