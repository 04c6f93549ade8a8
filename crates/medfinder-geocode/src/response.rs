//! Google Geocoding API response parsing.

use medfinder_core::geocoding::{Coordinates, GeocodingError};
use serde::Deserialize;
use thiserror::Error;

/// Geocoding adapter errors.
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Geocoder returned status {status}: {message}")]
    Status { status: String, message: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

pub type GeocodeResult<T> = Result<T, GeocodeError>;

impl From<GeocodeError> for GeocodingError {
    fn from(e: GeocodeError) -> Self {
        match e {
            GeocodeError::Http(msg) => GeocodingError::Request(msg),
            other => GeocodingError::InvalidResponse(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeEntry>,
}

#[derive(Debug, Deserialize)]
struct GeocodeEntry {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

/// Parse a Geocoding API body into the first result's location.
///
/// `ZERO_RESULTS` (or `OK` with no results) is `Ok(None)`. Any other status
/// is an error.
pub fn parse_response(body: &str) -> GeocodeResult<Option<Coordinates>> {
    let response: GeocodeResponse = serde_json::from_str(body)?;
    match response.status.as_str() {
        "OK" => Ok(response.results.first().map(|entry| Coordinates {
            lat: entry.geometry.location.lat,
            lng: entry.geometry.location.lng,
        })),
        "ZERO_RESULTS" => Ok(None),
        _ => Err(GeocodeError::Status {
            message: response.error_message.unwrap_or_default(),
            status: response.status,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok() {
        let body = r#"{
            "status": "OK",
            "results": [
                {"geometry": {"location": {"lat": 37.2089, "lng": -93.2923}}},
                {"geometry": {"location": {"lat": 0.0, "lng": 0.0}}}
            ]
        }"#;
        let coords = parse_response(body).unwrap().unwrap();
        assert_eq!(coords.lat, 37.2089);
        assert_eq!(coords.lng, -93.2923);
    }

    #[test]
    fn test_parse_zero_results() {
        assert_eq!(
            parse_response(r#"{"status": "ZERO_RESULTS", "results": []}"#).unwrap(),
            None
        );
        assert_eq!(parse_response(r#"{"status": "OK", "results": []}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_denied() {
        let err = parse_response(
            r#"{"status": "REQUEST_DENIED", "error_message": "The provided API key is invalid."}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
        assert!(matches!(
            GeocodingError::from(err),
            GeocodingError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_response("<html>"),
            Err(GeocodeError::JsonParse(_))
        ));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_bodies_never_panic(body in ".{0,200}") {
                let _ = parse_response(&body);
            }

            #[test]
            fn unknown_status_is_error(status in "[A-Z_]{1,20}") {
                prop_assume!(status != "OK" && status != "ZERO_RESULTS");
                let body = serde_json::json!({ "status": status, "results": [] }).to_string();
                let is_status_error = matches!(parse_response(&body), Err(GeocodeError::Status { .. }));
                prop_assert!(is_status_error);
            }

            #[test]
            fn ok_returns_first_location(lat in -90.0f64..90.0, lng in -180.0f64..180.0) {
                let body = serde_json::json!({
                    "status": "OK",
                    "results": [{ "geometry": { "location": { "lat": lat, "lng": lng } } }],
                })
                .to_string();
                let coords = parse_response(&body).unwrap().unwrap();
                prop_assert!((coords.lat - lat).abs() < 1e-9);
                prop_assert!((coords.lng - lng).abs() < 1e-9);
            }
        }
    }
}
