//! Geocoding subsystem.
//!
//! Turns a free-text place query into coordinates by calling one of several
//! XML web services, each with its own URL scheme and result layout.

pub mod geocoder;
pub mod providers;
pub mod transport;
pub mod types;
pub mod xml;

pub use geocoder::Geocoder;
pub use providers::Provider;
pub use transport::{HttpTransport, Transport};
pub use types::{Coordinates, FetchError, GeocodingError, GeocodingResult, XmlElement, XmlResponse};
