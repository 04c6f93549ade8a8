//! Geographic hierarchy: states, counties and zipcodes.

use serde::{Deserialize, Serialize};

/// USPS codes accepted for states and provider addresses.
pub const US_STATE_CODES: &[&str] = &[
    "AL", "AK", "AS", "AZ", "AR", "AA", "AE", "AP", "CA", "CO", "CT", "DE", "DC", "FL", "GA",
    "GU", "HI", "ID", "IL", "IN", "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS",
    "MO", "MT", "NE", "NV", "NH", "NJ", "NM", "NY", "NC", "ND", "MP", "OH", "OK", "OR", "PA",
    "PR", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VI", "VA", "WA", "WV", "WI", "WY",
];

/// Check that a value is a USPS state code.
pub fn is_valid_state(value: &str) -> bool {
    US_STATE_CODES.contains(&value)
}

/// Check that a value is a US zip code (`12345` or `12345-6789`).
pub fn is_valid_zip(value: &str) -> bool {
    let bytes = value.as_bytes();
    let all_digits = |s: &[u8]| s.iter().all(u8::is_ascii_digit);
    match bytes.len() {
        5 => all_digits(bytes),
        10 => all_digits(&bytes[..5]) && bytes[5] == b'-' && all_digits(&bytes[6..]),
        _ => false,
    }
}

/// Lowercase, hyphen-separated slug used for county lookups.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    slug
}

/// A US state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    pub id: i64,
    /// USPS two-letter code
    pub state_code: String,
    pub state_name: String,
    /// Census identifier
    pub state_us_id: Option<i64>,
    pub population: Option<i64>,
    /// GeoJSON geometry
    pub geometry: Option<serde_json::Value>,
    /// Cached count of active providers
    pub active_provider_count: i64,
}

impl State {
    pub fn new(state_code: impl Into<String>, state_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            state_code: state_code.into(),
            state_name: state_name.into(),
            state_us_id: None,
            population: None,
            geometry: None,
            active_provider_count: 0,
        }
    }
}

/// A county inside a state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct County {
    pub id: i64,
    pub county_name: String,
    pub county_name_slug: String,
    pub state_id: i64,
    pub county_id: Option<i64>,
    pub geo_id: Option<i64>,
    pub population: Option<i64>,
    pub geometry: Option<serde_json::Value>,
    pub active_provider_count: i64,
}

impl County {
    /// New county; the slug is derived from the name.
    pub fn new(county_name: impl Into<String>, state_id: i64) -> Self {
        let county_name = county_name.into();
        Self {
            id: 0,
            county_name_slug: slugify(&county_name),
            county_name,
            state_id,
            county_id: None,
            geo_id: None,
            population: None,
            geometry: None,
            active_provider_count: 0,
        }
    }
}

/// A zipcode tabulation area.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZipCode {
    pub id: i64,
    pub zipcode: String,
    pub state_id: i64,
    pub population: Option<i64>,
    pub geometry: Option<serde_json::Value>,
    pub active_provider_count: i64,
}

impl ZipCode {
    pub fn new(zipcode: impl Into<String>, state_id: i64) -> Self {
        Self {
            id: 0,
            zipcode: zipcode.into(),
            state_id,
            population: None,
            geometry: None,
            active_provider_count: 0,
        }
    }
}
