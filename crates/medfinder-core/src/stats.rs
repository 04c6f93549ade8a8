//! Geographic supply statistics rendered as GeoJSON.
//!
//! Each view tallies the latest reports of active providers per geographic
//! unit and attaches the counts and dominant bucket to the unit's feature.

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::aggregation::{SupplyCounts, SupplySummary};
use crate::db::{Database, DbError, GroupBy, GroupTally};
use crate::filters::{FilterError, GeoScope, SupplyFilter};
use crate::geo::{feature, feature_collection, point};
use crate::models::{MedicationName, State};

pub const WRONG_MED_ID: &str = "Wrong med_id in the request.";
pub const MISSING_DATES: &str = "You must provide start_date and end_date.";
pub const UNKNOWN_STATE: &str = "The state_id in the request does not exist";
pub const UNKNOWN_ZIPCODE: &str = "The zipcode in the request does not exist.";

/// Errors from statistics views.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Filter(#[from] FilterError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type StatsResult<T> = Result<T, StatsError>;

/// Resolve a requested medication name id, rejecting absent or unknown ids.
pub fn require_medication_name(db: &Database, med_id: Option<i64>) -> StatsResult<MedicationName> {
    let id = med_id.ok_or_else(|| StatsError::InvalidInput(WRONG_MED_ID.to_string()))?;
    db.get_medication_name(id)?
        .ok_or_else(|| StatsError::InvalidInput(WRONG_MED_ID.to_string()))
}

fn supply_properties(props: &mut Map<String, Value>, summary: &SupplySummary, providers: usize) {
    props.insert("supplies".into(), json!(summary.supplies));
    props.insert("supply".into(), json!(summary.dominant));
    props.insert("providers".into(), json!(providers));
}

fn summarize(tally: Option<&GroupTally>, threshold: f64) -> (SupplySummary, usize) {
    match tally {
        Some(t) => (t.counts.summarize(threshold), t.providers),
        None => (SupplyCounts::default().summarize(threshold), 0),
    }
}

/// States visible under `scope`.
fn states_in_scope(db: &Database, scope: &GeoScope) -> StatsResult<Vec<State>> {
    let states = db.list_states()?;
    let keep: Option<Vec<i64>> = match scope {
        GeoScope::National => None,
        GeoScope::State(id) => Some(vec![*id]),
        GeoScope::County(id) => Some(db.get_county(*id)?.map(|c| c.state_id).into_iter().collect()),
        GeoScope::ZipCode(code) => Some(db.get_zipcode_by_code(code)?.map(|z| z.state_id).into_iter().collect()),
    };
    Ok(match keep {
        None => states,
        Some(ids) => states.into_iter().filter(|s| ids.contains(&s.id)).collect(),
    })
}

/// One feature per state with its supply tally.
pub fn state_stats(
    db: &Database,
    filter: &SupplyFilter,
    scope: &GeoScope,
    threshold: f64,
) -> StatsResult<Value> {
    let tallies = db.tally_levels(GroupBy::State, filter, scope)?;
    let states = states_in_scope(db, scope)?;

    let features = states
        .into_iter()
        .map(|state| {
            let (summary, providers) = summarize(tallies.get(&state.id), threshold);
            let mut props = Map::new();
            props.insert("id".into(), json!(state.id));
            props.insert("state_code".into(), json!(state.state_code));
            props.insert("state_name".into(), json!(state.state_name));
            props.insert("population".into(), json!(state.population));
            props.insert(
                "active_provider_count".into(),
                json!(state.active_provider_count),
            );
            supply_properties(&mut props, &summary, providers);
            feature(state.id, state.geometry, props)
        })
        .collect();

    tracing::debug!(scope = ?scope, "Computed state stats");
    Ok(feature_collection(features))
}

/// One feature per county of a state with its supply tally.
pub fn county_stats(
    db: &Database,
    state_id: i64,
    filter: &SupplyFilter,
    threshold: f64,
) -> StatsResult<Value> {
    if db.get_state(state_id)?.is_none() {
        return Err(StatsError::NotFound(UNKNOWN_STATE.to_string()));
    }
    let tallies = db.tally_levels(GroupBy::County, filter, &GeoScope::State(state_id))?;

    let features = db
        .list_counties(state_id)?
        .into_iter()
        .map(|county| {
            let (summary, providers) = summarize(tallies.get(&county.id), threshold);
            let mut props = Map::new();
            props.insert("id".into(), json!(county.id));
            props.insert("county_name".into(), json!(county.county_name));
            props.insert("county_name_slug".into(), json!(county.county_name_slug));
            props.insert("state_id".into(), json!(county.state_id));
            props.insert("population".into(), json!(county.population));
            props.insert(
                "active_provider_count".into(),
                json!(county.active_provider_count),
            );
            supply_properties(&mut props, &summary, providers);
            feature(county.id, county.geometry, props)
        })
        .collect();
    Ok(feature_collection(features))
}

/// The zipcode feature followed by one point per provider in it.
pub fn zipcode_stats(
    db: &Database,
    zipcode: &str,
    filter: &SupplyFilter,
    threshold: f64,
) -> StatsResult<Value> {
    let zip = db
        .get_zipcode_by_code(zipcode)?
        .ok_or_else(|| StatsError::NotFound(UNKNOWN_ZIPCODE.to_string()))?;
    let scope = GeoScope::ZipCode(zipcode.to_string());
    let tallies = db.tally_levels(GroupBy::Provider, filter, &scope)?;

    let mut total = SupplyCounts::default();
    for tally in tallies.values() {
        total.merge(&tally.counts);
    }

    let mut zip_props = Map::new();
    zip_props.insert("id".into(), json!(zip.id));
    zip_props.insert("zipcode".into(), json!(zip.zipcode));
    zip_props.insert("state_id".into(), json!(zip.state_id));
    zip_props.insert("population".into(), json!(zip.population));
    zip_props.insert(
        "active_provider_count".into(),
        json!(zip.active_provider_count),
    );
    supply_properties(&mut zip_props, &total.summarize(threshold), tallies.len());

    let mut features = vec![feature(zip.id, zip.geometry, zip_props)];
    for provider in db.list_providers_in_zipcode(zip.id, true)? {
        let (summary, _) = summarize(tallies.get(&provider.id), threshold);
        let mut props = Map::new();
        props.insert("id".into(), json!(provider.id));
        props.insert("name".into(), json!(provider.name));
        props.insert("store_number".into(), json!(provider.store_number));
        props.insert("address".into(), json!(provider.full_address()));
        props.insert("supplies".into(), json!(summary.supplies));
        props.insert("supply".into(), json!(summary.dominant));
        let geometry = provider.point().map(|(lng, lat)| point(lng, lat));
        features.push(feature(provider.id, geometry, props));
    }
    Ok(feature_collection(features))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::DOMINANCE_THRESHOLD;
    use crate::models::{County, DrugType, Provider, SupplyReport, ZipCode};

    struct Fixture {
        db: Database,
        missouri: i64,
        kansas: i64,
        name_id: i64,
    }

    fn add_provider(db: &Database, store: i64, state: &str, zip: &str, zip_id: i64) -> i64 {
        let mut provider = Provider::new(store, "1 Main St", "Town", state, zip);
        provider.related_zipcode_id = Some(zip_id);
        provider.lat = Some(37.0);
        provider.lng = Some(-93.0);
        db.insert_provider(&provider).unwrap()
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let missouri = db.insert_state(&State::new("MO", "Missouri")).unwrap();
        let kansas = db.insert_state(&State::new("KS", "Kansas")).unwrap();
        let mo_zip = db.insert_zipcode(&ZipCode::new("65619", missouri)).unwrap();
        let ks_zip = db.insert_zipcode(&ZipCode::new("66002", kansas)).unwrap();
        let greene = db.insert_county(&County::new("Greene", missouri)).unwrap();
        db.link_zipcode_county(mo_zip, greene).unwrap();

        let name_id = db.insert_medication_name("Oseltamivir").unwrap();
        let ndc = db
            .get_or_create_ndc("0002-1433-80", "Tamiflu 75mg", DrugType::Brand)
            .unwrap();
        db.assign_medication_name(ndc.medication_id.unwrap(), name_id)
            .unwrap();

        for store in 1..=3 {
            let provider = add_provider(&db, store, "MO", "65619", mo_zip);
            db.insert_supply_report(&SupplyReport::new(provider, ndc.ndc_id, ">48"))
                .unwrap();
        }
        let provider = add_provider(&db, 9, "KS", "66002", ks_zip);
        db.insert_supply_report(&SupplyReport::new(provider, ndc.ndc_id, "<24"))
            .unwrap();

        Fixture {
            db,
            missouri,
            kansas,
            name_id,
        }
    }

    fn feature_for<'a>(fc: &'a Value, id: i64) -> &'a Value {
        fc["features"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["id"] == id)
            .unwrap()
    }

    #[test]
    fn test_state_stats_national() {
        let f = setup();
        let fc = state_stats(
            &f.db,
            &SupplyFilter::for_medication_name(f.name_id),
            &GeoScope::National,
            DOMINANCE_THRESHOLD,
        )
        .unwrap();

        assert_eq!(fc["type"], "FeatureCollection");
        let mo = feature_for(&fc, f.missouri);
        assert_eq!(mo["properties"]["supplies"]["high"], 3);
        assert_eq!(mo["properties"]["supply"], "high");
        assert_eq!(mo["properties"]["providers"], 3);
        let ks = feature_for(&fc, f.kansas);
        assert_eq!(ks["properties"]["supply"], "low");
    }

    #[test]
    fn test_state_stats_scoped() {
        let f = setup();
        let fc = state_stats(
            &f.db,
            &SupplyFilter::for_medication_name(f.name_id),
            &GeoScope::State(f.kansas),
            DOMINANCE_THRESHOLD,
        )
        .unwrap();
        let features = fc["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["state_code"], "KS");
    }

    #[test]
    fn test_state_without_reports_has_no_dominant() {
        let f = setup();
        let fc = state_stats(
            &f.db,
            &SupplyFilter::for_medication_name(f.name_id + 100),
            &GeoScope::National,
            DOMINANCE_THRESHOLD,
        )
        .unwrap();
        let mo = feature_for(&fc, f.missouri);
        assert_eq!(mo["properties"]["supply"], Value::Null);
        assert_eq!(mo["properties"]["supplies"]["none"], 0);
    }

    #[test]
    fn test_county_stats() {
        let f = setup();
        let fc = county_stats(
            &f.db,
            f.missouri,
            &SupplyFilter::for_medication_name(f.name_id),
            DOMINANCE_THRESHOLD,
        )
        .unwrap();
        let features = fc["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["county_name"], "Greene");
        assert_eq!(features[0]["properties"]["supplies"]["high"], 3);

        assert!(matches!(
            county_stats(&f.db, 999, &SupplyFilter::default(), DOMINANCE_THRESHOLD),
            Err(StatsError::NotFound(_))
        ));
    }

    #[test]
    fn test_zipcode_stats() {
        let f = setup();
        let fc = zipcode_stats(
            &f.db,
            "65619",
            &SupplyFilter::for_medication_name(f.name_id),
            DOMINANCE_THRESHOLD,
        )
        .unwrap();
        let features = fc["features"].as_array().unwrap();
        assert_eq!(features.len(), 4);
        assert_eq!(features[0]["properties"]["supplies"]["high"], 3);
        assert_eq!(features[1]["geometry"]["type"], "Point");
        assert_eq!(features[1]["properties"]["supply"], "high");

        let err = zipcode_stats(&f.db, "00000", &SupplyFilter::default(), DOMINANCE_THRESHOLD)
            .unwrap_err();
        assert_eq!(err.to_string(), UNKNOWN_ZIPCODE);
    }

    #[test]
    fn test_require_medication_name() {
        let f = setup();
        assert!(require_medication_name(&f.db, Some(f.name_id)).is_ok());
        assert_eq!(
            require_medication_name(&f.db, None).unwrap_err().to_string(),
            WRONG_MED_ID
        );
        assert_eq!(
            require_medication_name(&f.db, Some(999))
                .unwrap_err()
                .to_string(),
            WRONG_MED_ID
        );
    }
}
