//! Provider locations (pharmacies, clinics).

use serde::{Deserialize, Serialize};

/// Country appended to every geocoding query.
pub const COUNTRY: &str = "United States";

/// NCPDP provider type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderType {
    pub id: i64,
    /// Two-character NCPDP code, e.g. "01"
    pub code: String,
    pub name: String,
}

/// NCPDP provider category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderCategory {
    pub id: i64,
    pub code: String,
    pub name: String,
}

/// A physical provider location that reports medication supply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provider {
    pub id: i64,
    pub organization_id: Option<i64>,
    pub store_number: i64,
    pub name: String,
    pub type_id: Option<i64>,
    pub category_id: Option<i64>,
    pub address: String,
    pub city: String,
    /// USPS state code
    pub state: String,
    pub zip: String,
    pub related_zipcode_id: Option<i64>,
    pub phone: String,
    pub website: String,
    pub email: Option<String>,
    pub operating_hours: String,
    pub notes: String,
    pub insurance_accepted: bool,
    /// Unknown when `None`
    pub walkins_accepted: Option<bool>,
    pub home_delivery: bool,
    pub home_delivery_info_url: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Last time this provider uploaded new information
    pub last_import_date: String,
    pub active: bool,
}

impl Provider {
    /// Create a provider with its address; everything else defaults.
    pub fn new(
        store_number: i64,
        address: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            organization_id: None,
            store_number,
            name: String::new(),
            type_id: None,
            category_id: None,
            address: address.into(),
            city: city.into(),
            state: state.into(),
            zip: zip.into(),
            related_zipcode_id: None,
            phone: String::new(),
            website: String::new(),
            email: None,
            operating_hours: String::new(),
            notes: String::new(),
            insurance_accepted: false,
            walkins_accepted: None,
            home_delivery: false,
            home_delivery_info_url: String::new(),
            lat: None,
            lng: None,
            start_date: None,
            end_date: None,
            last_import_date: super::now_timestamp(),
            active: true,
        }
    }

    /// Display address used in search results.
    pub fn full_address(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.address, self.city, self.state, COUNTRY, self.zip
        )
    }

    /// Query string sent to the geocoder; empty parts are skipped.
    pub fn geocoding_query(&self) -> String {
        [
            self.address.as_str(),
            self.city.as_str(),
            self.state.as_str(),
            COUNTRY,
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("+")
    }

    /// Five-digit prefix used to relate the provider to a zipcode row.
    pub fn zip5(&self) -> &str {
        self.zip.get(..5).unwrap_or(&self.zip)
    }

    /// Geocoded point as (lng, lat), if known.
    pub fn point(&self) -> Option<(f64, f64)> {
        Some((self.lng?, self.lat?))
    }

    /// Display label, mirrors how admins refer to stores.
    pub fn label(&self) -> String {
        let name = if self.name.is_empty() { "provider" } else { &self.name };
        format!("{} - store number: {}", name, self.store_number)
    }
}

/// Options applied when a provider is saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderSaveOptions {
    /// Recompute coordinates even if the provider already has some.
    pub change_coordinates: bool,
    /// Look up and link the matching zipcode row.
    pub relate_related_zipcode: bool,
}
