//! Google Geocoding API client.

use medfinder_core::geocoding::{Coordinates, Geocoder, GeocodingError};
use std::time::Duration;

use crate::response::{parse_response, GeocodeError, GeocodeResult};

pub const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Blocking Google geocoder.
pub struct GoogleGeocoder {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>) -> GeocodeResult<Self> {
        Self::with_base_url(api_key, GEOCODE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> GeocodeResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GeocodeError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    /// Read the key from `GOOGLE_MAP_API_KEY`.
    pub fn from_env() -> GeocodeResult<Self> {
        let key = std::env::var("GOOGLE_MAP_API_KEY")
            .map_err(|_| GeocodeError::Http("GOOGLE_MAP_API_KEY is not set".into()))?;
        Self::new(key)
    }

    fn lookup(&self, query: &str) -> GeocodeResult<Option<Coordinates>> {
        let body = self
            .client
            .get(&self.base_url)
            .query(&[
                ("address", query),
                ("sensor", "false"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| GeocodeError::Http(format!("HTTP request failed: {}", e)))?;
        parse_response(&body)
    }
}

impl Geocoder for GoogleGeocoder {
    fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodingError> {
        tracing::debug!(query, "Geocoding address");
        Ok(self.lookup(query)?)
    }
}
