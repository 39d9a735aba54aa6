//! Blocking HTTP transport for geocoder requests.

use super::types::FetchError;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = concat!("geoloc/", env!("CARGO_PKG_VERSION"));

/// Fetches a URL and returns the response body.
pub trait Transport {
    fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// Closures make convenient canned transports.
impl<F> Transport for F
where
    F: Fn(&str) -> Result<String, FetchError>,
{
    fn get(&self, url: &str) -> Result<String, FetchError> {
        self(url)
    }
}

/// `ureq`-backed transport. One agent is reused for every request.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(user_agent)
            .build();
        Self { agent }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), DEFAULT_USER_AGENT)
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "GET");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => FetchError::Status(code.to_string()),
                other => FetchError::Network(other.to_string()),
            })?;
        debug!(status = response.status(), "response received");
        response
            .into_string()
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}
