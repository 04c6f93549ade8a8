//! End-to-end tests through the `Medfinder` facade: import a supply CSV,
//! then read it back through stats, search, history and export.

use chrono::{Duration, Utc};
use medfinder_core::geocoding::{Coordinates, Geocoder, GeocodingError};
use medfinder_core::models::{County, Organization, State, ZipCode};
use medfinder_core::{Config, Medfinder, MedfinderError, PermissionLevel, QueryParams, User};
use std::sync::Arc;

/// Springfield, MO and Kansas City, MO, about 140 miles apart.
struct StoreGeocoder;

impl Geocoder for StoreGeocoder {
    fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodingError> {
        if query.starts_with("1 Main St") {
            Ok(Some(Coordinates { lat: 37.2089, lng: -93.2923 }))
        } else if query.starts_with("500 Grand Blvd") {
            Ok(Some(Coordinates { lat: 39.0997, lng: -94.5786 }))
        } else {
            Ok(None)
        }
    }
}

const CSV: &str = "\
store #,address,city,zipcode,state,phone,med_code,med_name,supply_level,drug_type,provider_name
1,1 Main St,Springfield,65619,MO,555-0100,0002-1433-80,Tamiflu 75mg,>48,b,Corner Drug
1,1 Main St,Springfield,65619,MO,555-0100,0093-7312-06,Oseltamivir 75mg,<24,g,Corner Drug
1,1 Main St,Springfield,65619,MO,555-0100,9999-0000-01,Oseltamivir SNS,24,p,Corner Drug
2,500 Grand Blvd,Kansas City,64106,MO,555-0200,0002-1433-80,Tamiflu 75mg,24-48,b,Grand Pharmacy
3,8 Nowhere Rd,Nowhere,00000,ZZ,555-0300,0002-1433-80,Tamiflu 75mg,>48,b,Broken Row
";

struct Fixture {
    medfinder: Medfinder,
    missouri: i64,
    kansas: i64,
    name_id: i64,
    /// Tamiflu, generic, public health supply
    formulations: [i64; 3],
}

fn setup() -> Fixture {
    let medfinder = Medfinder::open_in_memory(Config::default())
        .unwrap()
        .with_geocoder(Arc::new(StoreGeocoder));

    let (missouri, kansas, org_id) = medfinder
        .with_db(|db| {
            let missouri = db.insert_state(&State::new("MO", "Missouri"))?;
            let kansas = db.insert_state(&State::new("KS", "Kansas"))?;
            let greene = db.insert_county(&County::new("Greene", missouri))?;
            let jackson = db.insert_county(&County::new("Jackson", missouri))?;
            let springfield = db.insert_zipcode(&ZipCode::new("65619", missouri))?;
            let kansas_city = db.insert_zipcode(&ZipCode::new("64106", missouri))?;
            db.insert_zipcode(&ZipCode::new("66101", kansas))?;
            db.link_zipcode_county(springfield, greene)?;
            db.link_zipcode_county(kansas_city, jackson)?;
            let org_id = db.insert_organization(&Organization::new("Corner Drug Co"))?;
            Ok((missouri, kansas, org_id))
        })
        .unwrap();

    let summary = medfinder.import_csv(CSV.as_bytes(), Some(org_id)).unwrap();
    assert_eq!(summary.rows, 5);
    assert_eq!(summary.providers_created, 2);
    assert_eq!(summary.medications_created, 3);
    assert_eq!(summary.reports_created, 4);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].line, 6);

    let (name_id, formulations) = medfinder
        .with_db(|db| {
            let name_id = db.insert_medication_name("Oseltamivir")?;
            let mut formulations = [0; 3];
            for (slot, ndc) in ["0002-1433-80", "0093-7312-06", "9999-0000-01"].iter().enumerate() {
                let medication_id = db
                    .get_ndc_by_code(ndc)?
                    .and_then(|n| n.medication_id)
                    .ok_or_else(|| MedfinderError::NotFound(ndc.to_string()))?;
                db.assign_medication_name(medication_id, name_id)?;
                formulations[slot] = medication_id;
            }
            db.refresh_active_provider_counts()?;
            Ok((name_id, formulations))
        })
        .unwrap();

    Fixture {
        medfinder,
        missouri,
        kansas,
        name_id,
        formulations,
    }
}

fn properties_of(collection: &serde_json::Value, key: &str, value: &str) -> serde_json::Value {
    collection["features"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["properties"][key] == value)
        .map(|f| f["properties"].clone())
        .unwrap()
}

#[test]
fn test_state_stats_after_import() {
    let f = setup();
    let params = QueryParams::parse(&format!("med_id={}", f.name_id));
    let stats = f.medfinder.state_stats(&params, None).unwrap();

    let missouri = properties_of(&stats, "state_code", "MO");
    assert_eq!(missouri["id"], f.missouri);
    assert_eq!(missouri["providers"], 2);
    assert_eq!(missouri["active_provider_count"], 2);
    assert_eq!(missouri["supplies"]["high"], 1);
    assert_eq!(missouri["supplies"]["medium"], 2);
    assert_eq!(missouri["supplies"]["low"], 1);

    let kansas = properties_of(&stats, "state_code", "KS");
    assert_eq!(kansas["providers"], 0);
    assert!(kansas["supply"].is_null());
}

#[test]
fn test_unchecked_formulations_yield_no_supply() {
    let f = setup();
    let params = QueryParams::parse(&format!("med_id={}&formulations=", f.name_id));
    let stats = f.medfinder.state_stats(&params, None).unwrap();
    let missouri = properties_of(&stats, "state_code", "MO");
    assert_eq!(missouri["providers"], 0);
}

#[test]
fn test_county_and_zipcode_stats() {
    let f = setup();
    let params = QueryParams::parse(&format!("med_id={}&drug_type=b", f.name_id));

    let counties = f.medfinder.county_stats(f.missouri, &params, None).unwrap();
    let greene = properties_of(&counties, "county_name", "Greene");
    assert_eq!(greene["supplies"]["high"], 1);
    assert_eq!(greene["supply"], "high");

    let zipcode = f.medfinder.zipcode_stats("64106", &params, None).unwrap();
    let features = zipcode["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0]["properties"]["zipcode"], "64106");
    assert_eq!(features[1]["properties"]["store_number"], 2);
    assert_eq!(features[1]["geometry"]["type"], "Point");

    let err = f
        .medfinder
        .zipcode_stats("99999", &params, None)
        .unwrap_err();
    assert!(matches!(err, MedfinderError::NotFound(_)));
}

#[test]
fn test_state_user_sees_only_own_state() {
    let f = setup();
    let mut user = User::new("kansas@health.gov", PermissionLevel::State);
    user.state_id = Some(f.kansas);
    let user = f.medfinder.create_user(&user).unwrap();

    let params = QueryParams::parse(&format!("med_id={}&state={}", f.name_id, f.missouri));
    let stats = f.medfinder.state_stats(&params, Some(&user)).unwrap();
    let features = stats["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["state_code"], "KS");

    let zip = f.medfinder.zipcode_stats("65619", &params, Some(&user));
    assert!(matches!(zip, Err(MedfinderError::PermissionDenied(_))));

    let mut out = Vec::new();
    let rows = f.medfinder.export_csv(&params, Some(&user), &mut out).unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn test_search_excludes_public_health_until_epidemic() {
    let f = setup();
    let query = format!(
        "med_ids={}&formulations={},{},{}&localization=-93.29,37.21&distance=25",
        f.name_id, f.formulations[0], f.formulations[1], f.formulations[2]
    );
    let params = QueryParams::parse(&query);

    let results = f.medfinder.find_providers(&params).unwrap();
    let features = results["features"].as_array().unwrap();
    assert_eq!(features.len(), 1, "Kansas City is out of range");
    let drugs = features[0]["properties"]["drugs"].as_array().unwrap();
    let types: Vec<_> = drugs.iter().map(|d| d["drug_type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["Generic Drugs", "Brand Drugs"]);

    let admin = User::new("admin@health.gov", PermissionLevel::National);
    f.medfinder.set_epidemic(true, &admin).unwrap();

    let results = f.medfinder.find_providers(&params).unwrap();
    let drugs = results["features"][0]["properties"]["drugs"].as_array().unwrap();
    assert_eq!(drugs.len(), 3);
    assert_eq!(drugs[0]["drug_type"], "Public Health Supply");

    // Widening the radius reaches Kansas City, nearest first
    let wide = QueryParams::parse(&query.replace("distance=25", "distance=200"));
    let results = f.medfinder.find_providers(&wide).unwrap();
    let stores: Vec<_> = results["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["store_number"].as_i64().unwrap())
        .collect();
    assert_eq!(stores, vec![1, 2]);
}

#[test]
fn test_historic_series_cover_every_day() {
    let f = setup();
    let today = Utc::now().date_naive();
    let start = today - Duration::days(2);
    let params = QueryParams::parse(&format!(
        "med_id={}&start_date={}&end_date={}",
        f.name_id, start, today
    ));

    let overall = f.medfinder.historic_overall(&params, None).unwrap();
    assert_eq!(overall.len(), 3);
    assert_eq!(overall[0].supply.supplies.total(), 0);
    assert_eq!(overall[2].day, today);
    assert_eq!(overall[2].supply.supplies.total(), 4);

    let average = f.medfinder.historic_average(&params, None).unwrap();
    assert_eq!(average.len(), 3);
    assert!(average.iter().all(|s| s.series.len() == 3));

    let reversed = QueryParams::parse(&format!(
        "med_id={}&start_date={}&end_date={}",
        f.name_id, today, start
    ));
    assert!(matches!(
        f.medfinder.historic_overall(&reversed, None),
        Err(MedfinderError::InvalidInput(_))
    ));
}

#[test]
fn test_export_and_housekeeping() {
    let f = setup();
    let mut out = Vec::new();
    let rows = f
        .medfinder
        .export_csv(&QueryParams::parse("zipcode=65619"), None, &mut out)
        .unwrap();
    assert_eq!(rows, 3);
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("state,zipcode,provider_name,"));
    assert!(text.contains("Corner Drug Co"));

    let report = f.medfinder.run_housekeeping(Utc::now()).unwrap();
    assert_eq!(report.providers_deactivated, 0);
    assert_eq!(report.latest_reports, 4);

    // Far enough in the future every provider has gone stale
    let later = Utc::now() + Duration::days(90);
    let report = f.medfinder.run_housekeeping(later).unwrap();
    assert_eq!(report.providers_deactivated, 2);
}

#[test]
fn test_medication_name_suggestions() {
    let f = setup();
    let matches = f.medfinder.search_medication_names("osel", 5).unwrap();
    assert_eq!(matches[0].medication_name.id, f.name_id);
    assert!(f.medfinder.search_medication_names("", 5).unwrap().is_empty());
}
