//! The geocoder: builds provider URLs, fetches and parses responses.

use super::providers::Provider;
use super::transport::{HttpTransport, Transport};
use super::types::{FetchError, GeocodingError, GeocodingResult};
use super::xml::parse_response;
use crate::config::GeocodingSettings;
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

/// Resolves place names to coordinates through one of the [`Provider`]s.
pub struct Geocoder {
    default_provider: Provider,
    keys: HashMap<String, String>,
    endpoints: HashMap<Provider, String>,
    transport: Box<dyn Transport>,
}

impl Geocoder {
    pub fn new(default_provider: Provider, transport: impl Transport + 'static) -> Self {
        Self {
            default_provider,
            keys: HashMap::new(),
            endpoints: HashMap::new(),
            transport: Box::new(transport),
        }
    }

    /// HTTP geocoder configured from settings.
    pub fn from_settings(settings: &GeocodingSettings) -> Self {
        let transport = HttpTransport::new(settings.timeout, &settings.user_agent);
        let mut geocoder = Self::new(settings.default_geocoder, transport)
            .with_keys(settings.keys.clone());
        for (name, url) in &settings.endpoints {
            match Provider::from_short_name(name) {
                Some(provider) => geocoder = geocoder.with_endpoint(provider, url.clone()),
                None => warn!(name = %name, "ignoring endpoint for unknown geocoder"),
            }
        }
        geocoder
    }

    /// API keys by provider short name.
    pub fn with_keys(mut self, keys: HashMap<String, String>) -> Self {
        self.keys = keys;
        self
    }

    /// Send `provider`'s requests to `url` instead of its public endpoint.
    pub fn with_endpoint(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.endpoints.insert(provider, url.into());
        self
    }

    pub fn default_provider(&self) -> Provider {
        self.default_provider
    }

    /// The configured `(parameter, key)` pair for `provider`, if any.
    pub fn key(&self, provider: Provider) -> Option<(&'static str, &str)> {
        let key = self.keys.get(provider.short_name())?;
        Some((provider.key_param(), key.as_str()))
    }

    /// Query parameters in request order: query, key, then default arguments.
    pub fn parameters(&self, provider: Provider, query: &str) -> Vec<(String, String)> {
        let mut params = vec![(provider.query_param().to_string(), query.to_string())];
        if let Some((param, key)) = self.key(provider) {
            params.push((param.to_string(), key.to_string()));
        }
        for (name, value) in provider.default_args() {
            if !params.iter().any(|(k, _)| k == name) {
                params.push((name.to_string(), value.to_string()));
            }
        }
        params
    }

    /// The full request URL for `query`.
    pub fn url(&self, provider: Provider, query: &str) -> Result<Url, FetchError> {
        let endpoint = self
            .endpoints
            .get(&provider)
            .map(String::as_str)
            .unwrap_or_else(|| provider.endpoint());
        Url::parse_with_params(endpoint, self.parameters(provider, query))
            .map_err(|e| FetchError::Url(e.to_string()))
    }

    /// Geocode with the default provider.
    pub fn geocode(&self, query: &str) -> Result<GeocodingResult, GeocodingError> {
        self.geocode_with(self.default_provider, query)
    }

    /// Geocode `query` with a specific provider.
    ///
    /// Whatever goes wrong (network, XML, missing fields) surfaces as a
    /// single [`GeocodingError`].
    #[tracing::instrument(level = "debug", skip(self, provider), fields(provider = %provider))]
    pub fn geocode_with(
        &self,
        provider: Provider,
        query: &str,
    ) -> Result<GeocodingResult, GeocodingError> {
        self.fetch(provider, query).map_err(|cause| {
            warn!(query, error = %cause, "geocoding failed");
            GeocodingError::new(query, cause)
        })
    }

    fn fetch(&self, provider: Provider, query: &str) -> Result<GeocodingResult, FetchError> {
        let url = self.url(provider, query)?;
        let raw = self.transport.get(url.as_str())?;
        let response = parse_response(&raw)?;
        let coords = provider.extract(&response)?;
        debug!(lat = coords.latitude, lon = coords.longitude, "geocoded");

        Ok(GeocodingResult {
            query: query.to_string(),
            provider,
            response,
            coords,
        })
    }
}
