//! Table-backed geocoder for tests and offline imports.

use medfinder_core::geocoding::{Coordinates, Geocoder, GeocodingError};
use std::collections::HashMap;

/// Answers from a fixed address table.
///
/// Lookups ignore case and surrounding whitespace. Unknown addresses
/// geocode to nothing.
#[derive(Debug, Clone, Default)]
pub struct MockGeocoder {
    points: HashMap<String, Coordinates>,
}

fn key(query: &str) -> String {
    query.trim().to_lowercase()
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, lat: f64, lng: f64) -> Self {
        self.points.insert(key(query), Coordinates { lat, lng });
        self
    }
}

impl Geocoder for MockGeocoder {
    fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodingError> {
        let found = self.points.get(&key(query)).copied();
        tracing::debug!(query, found = found.is_some(), "Mock geocode");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let geocoder = MockGeocoder::new().with("1 Main St, Springfield, MO 65619", 37.2, -93.3);
        let coords = geocoder
            .geocode("  1 MAIN ST, Springfield, MO 65619 ")
            .unwrap()
            .unwrap();
        assert_eq!(coords, Coordinates { lat: 37.2, lng: -93.3 });
        assert_eq!(geocoder.geocode("2 Elm St").unwrap(), None);
    }

    #[test]
    fn test_saves_provider_point() {
        use medfinder_core::models::{Provider, ProviderSaveOptions};
        use medfinder_core::Database;

        let db = Database::open_in_memory().unwrap();
        let mut provider = Provider::new(1, "1 Main St", "Springfield", "MO", "65619");
        let geocoder = MockGeocoder::new().with(&provider.geocoding_query(), 37.2, -93.3);

        db.save_provider(&mut provider, ProviderSaveOptions::default(), Some(&geocoder))
            .unwrap();
        let stored = db.get_provider(provider.id).unwrap().unwrap();
        assert_eq!(stored.point(), Some((-93.3, 37.2)));
    }
}
