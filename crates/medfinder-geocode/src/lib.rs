//! Address geocoding adapters for medfinder providers.
//!
//! [`GoogleGeocoder`] calls the Google Geocoding API (feature `google`);
//! [`MockGeocoder`] answers from a fixed table for tests and offline imports.
//! Both implement [`medfinder_core::Geocoder`].

pub mod mock;
pub mod response;

#[cfg(feature = "google")]
pub mod google;

pub use mock::MockGeocoder;
pub use response::{parse_response, GeocodeError, GeocodeResult};

#[cfg(feature = "google")]
pub use google::GoogleGeocoder;
