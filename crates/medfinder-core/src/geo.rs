//! Distance math and GeoJSON builders.

use serde_json::{json, Map, Value};

use crate::db::BoundingBox;

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

const MILES_PER_DEGREE_LAT: f64 = 69.0;

/// Great-circle distance between two (lng, lat) points, in miles.
pub fn haversine_miles(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lng1, lat1) = (from.0.to_radians(), from.1.to_radians());
    let (lng2, lat2) = (to.0.to_radians(), to.1.to_radians());

    let a = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lng2 - lng1) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().min(1.0).asin()
}

/// Box that contains every point within `miles` of (lng, lat).
///
/// Longitude span widens with latitude. Near the poles, or when the window
/// crosses the antimeridian, the box covers every longitude.
pub fn bounding_box(lng: f64, lat: f64, miles: f64) -> BoundingBox {
    let dlat = miles / MILES_PER_DEGREE_LAT;
    let cos_lat = lat.to_radians().cos();
    let dlng = if cos_lat.abs() < 1e-6 {
        180.0
    } else {
        (miles / (MILES_PER_DEGREE_LAT * cos_lat.abs())).min(180.0)
    };
    let (min_lng, max_lng) = if lng - dlng < -180.0 || lng + dlng > 180.0 {
        (-180.0, 180.0)
    } else {
        (lng - dlng, lng + dlng)
    };
    BoundingBox {
        min_lat: lat - dlat,
        max_lat: lat + dlat,
        min_lng,
        max_lng,
    }
}

/// GeoJSON point geometry.
pub fn point(lng: f64, lat: f64) -> Value {
    json!({ "type": "Point", "coordinates": [lng, lat] })
}

/// GeoJSON feature; a missing geometry serializes as `null`.
pub fn feature(id: i64, geometry: Option<Value>, properties: Map<String, Value>) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "geometry": geometry.unwrap_or(Value::Null),
        "properties": Value::Object(properties),
    })
}

pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({ "type": "FeatureCollection", "features": features })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // Springfield, MO to St. Louis, MO is roughly 190 miles
        let springfield = (-93.2923, 37.2090);
        let st_louis = (-90.1994, 38.6270);
        let d = haversine_miles(springfield, st_louis);
        assert!((d - 193.0).abs() < 5.0, "got {}", d);
    }

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_miles((-93.0, 37.0), (-93.0, 37.0)), 0.0);
    }

    #[test]
    fn test_bounding_box_contains_radius() {
        let center = (-93.0, 37.0);
        let bbox = bounding_box(center.0, center.1, 10.0);
        // A point 9.9 miles due east must fall inside
        let east = (center.0 + 9.9 / (69.0 * 37.0_f64.to_radians().cos()), center.1);
        assert!(haversine_miles(center, east) < 10.0);
        assert!(east.0 <= bbox.max_lng && east.0 >= bbox.min_lng);
        assert!(bbox.max_lat - bbox.min_lat > 0.28);
    }

    #[test]
    fn test_bounding_box_across_antimeridian() {
        // Adak, AK and a point 20 miles west of 180
        let adak = (179.9, 51.88);
        let west = (-179.8, 51.88);
        assert!(haversine_miles(adak, west) < 20.0);

        let bbox = bounding_box(adak.0, adak.1, 20.0);
        assert_eq!((bbox.min_lng, bbox.max_lng), (-180.0, 180.0));
        assert!(west.0 >= bbox.min_lng && west.0 <= bbox.max_lng);
    }

    #[test]
    fn test_feature_shapes() {
        let mut props = Map::new();
        props.insert("name".into(), json!("MO"));
        let f = feature(3, None, props);
        assert_eq!(f["type"], "Feature");
        assert_eq!(f["geometry"], Value::Null);
        assert_eq!(f["properties"]["name"], "MO");

        let fc = feature_collection(vec![f, feature(4, Some(point(1.0, 2.0)), Map::new())]);
        assert_eq!(fc["features"].as_array().unwrap().len(), 2);
        assert_eq!(fc["features"][1]["geometry"]["coordinates"][1], 2.0);
    }
}
