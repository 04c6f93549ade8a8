//! Geocoding seam.
//!
//! Providers are geocoded from their address when first saved. The storage
//! layer only depends on this trait; concrete geocoders live in the
//! `medfinder-geocode` crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A geocoded point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Geocoding failures.
#[derive(Error, Debug)]
pub enum GeocodingError {
    #[error("Geocoding request failed: {0}")]
    Request(String),

    #[error("Invalid geocoding response: {0}")]
    InvalidResponse(String),
}

/// Resolves an address query to a point.
///
/// `Ok(None)` means the geocoder answered but found nothing.
pub trait Geocoder: Send + Sync {
    fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodingError>;
}
