//! Public provider search.
//!
//! The public looks for providers near a point that stock a medication.
//! Results are GeoJSON features ordered by distance, each listing the
//! matching formulations with their supply.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use strsim::{jaro_winkler, normalized_levenshtein};
use thiserror::Error;

use crate::aggregation::{SupplyCounts, SupplySummary};
use crate::db::{Database, DbError};
use crate::filters::{parse_drug_types, FilterError, QueryParams, SupplyFilter};
use crate::geo::{bounding_box, feature, feature_collection, haversine_miles, point};
use crate::models::{DrugType, Epidemic, MedicationName};

pub const BAD_LOCALIZATION: &str = "Localization should be provided and consist of 2 coordinates";
pub const MISSING_SEARCH_PARAMS: &str =
    "You should provide med_ids, formulations and lozalization params";

/// Minimum similarity for a medication name suggestion.
const MIN_NAME_SIMILARITY: f64 = 0.5;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Filter(#[from] FilterError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type SearchResult<T> = Result<T, SearchError>;

/// A validated provider search.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSearch {
    pub medication_name_ids: Vec<i64>,
    pub formulations: Vec<i64>,
    pub drug_types: Option<Vec<DrugType>>,
    /// Search origin as (lng, lat)
    pub localization: (f64, f64),
    pub distance_miles: f64,
}

/// Parse `lng,lat`.
pub fn parse_localization(raw: Option<&str>) -> SearchResult<(f64, f64)> {
    let bad = || SearchError::BadRequest(BAD_LOCALIZATION.to_string());
    let raw = raw.ok_or_else(bad)?;
    let coords = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| bad())?;
    match coords.as_slice() {
        [lng, lat, ..] if lng.is_finite() && lat.is_finite() => Ok((*lng, *lat)),
        _ => Err(bad()),
    }
}

impl ProviderSearch {
    /// Validate `med_ids`, `formulations`, `localization`, `drug_type` and
    /// `distance`. The distance falls back to `default_distance` miles.
    pub fn from_params(params: &QueryParams, default_distance: f64) -> SearchResult<Self> {
        let localization = parse_localization(params.get("localization"))?;

        let medication_name_ids = params.id_list("med_ids")?.unwrap_or_default();
        let formulations = params.id_list("formulations")?.unwrap_or_default();
        if medication_name_ids.is_empty() || formulations.is_empty() {
            return Err(SearchError::BadRequest(MISSING_SEARCH_PARAMS.to_string()));
        }

        let drug_types = params
            .get("drug_type")
            .filter(|raw| !raw.trim().is_empty())
            .map(parse_drug_types)
            .transpose()?;

        let distance_miles = match params.get("distance").map(str::trim) {
            None | Some("") => default_distance,
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite() && *d > 0.0)
                .ok_or_else(|| FilterError::InvalidList {
                    param: "distance".to_string(),
                    value: raw.to_string(),
                })?,
        };

        Ok(Self {
            medication_name_ids,
            formulations,
            drug_types,
            localization,
            distance_miles,
        })
    }

    fn supply_filter(&self, epidemic: Epidemic) -> SupplyFilter {
        SupplyFilter {
            medication_name_ids: Some(self.medication_name_ids.clone()),
            formulations: Some(self.formulations.clone()),
            drug_types: self.drug_types.clone(),
            exclude_drug_types: if epidemic.active {
                Vec::new()
            } else {
                vec![DrugType::PublicHealthSupply]
            },
            ..Default::default()
        }
    }
}

/// A formulation stocked by a provider, as shown to the public.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderDrug {
    pub id: i64,
    pub medication_name: String,
    pub name: String,
    pub drug_type: String,
    pub supply_level: SupplySummary,
}

/// Providers within the search distance, nearest first.
///
/// Providers without matching drugs are still listed with an empty `drugs`
/// array.
pub fn find_providers(
    db: &Database,
    search: &ProviderSearch,
    epidemic: Epidemic,
    threshold: f64,
) -> SearchResult<Value> {
    let (lng, lat) = search.localization;
    let mut nearby: Vec<_> = db
        .providers_in_bounds(bounding_box(lng, lat, search.distance_miles))?
        .into_iter()
        .filter_map(|provider| {
            let distance = haversine_miles((lng, lat), provider.point()?);
            (distance <= search.distance_miles).then_some((provider, distance))
        })
        .collect();
    nearby.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)));

    let provider_ids: Vec<i64> = nearby.iter().map(|(p, _)| p.id).collect();
    let levels = db.provider_drug_levels(&provider_ids, &search.supply_filter(epidemic))?;

    // provider -> formulation -> (drug, counts)
    let mut drugs: BTreeMap<i64, BTreeMap<i64, (ProviderDrug, DrugType, SupplyCounts)>> =
        BTreeMap::new();
    for level in levels {
        let entry = drugs
            .entry(level.provider_id)
            .or_default()
            .entry(level.medication_id)
            .or_insert_with(|| {
                (
                    ProviderDrug {
                        id: level.medication_id,
                        medication_name: level.medication_name.clone(),
                        name: level.medication.clone(),
                        drug_type: level.drug_type.display().to_string(),
                        supply_level: SupplySummary::default(),
                    },
                    level.drug_type,
                    SupplyCounts::default(),
                )
            });
        entry.2.add(level.level);
    }

    let features = nearby
        .into_iter()
        .map(|(provider, distance)| {
            let mut provider_drugs: Vec<(ProviderDrug, DrugType)> = drugs
                .remove(&provider.id)
                .unwrap_or_default()
                .into_values()
                .map(|(mut drug, drug_type, counts)| {
                    drug.supply_level = counts.summarize(threshold);
                    (drug, drug_type)
                })
                .collect();
            provider_drugs.sort_by_key(|(drug, drug_type)| (Reverse(*drug_type), drug.name.clone()));

            let mut props = Map::new();
            props.insert("id".into(), json!(provider.id));
            props.insert("name".into(), json!(provider.name));
            props.insert("address".into(), json!(provider.full_address()));
            props.insert("phone".into(), json!(provider.phone));
            props.insert("website".into(), json!(provider.website));
            props.insert("email".into(), json!(provider.email));
            props.insert("operating_hours".into(), json!(provider.operating_hours));
            props.insert(
                "insurance_accepted".into(),
                json!(provider.insurance_accepted),
            );
            props.insert("distance".into(), json!(distance));
            props.insert("store_number".into(), json!(provider.store_number));
            props.insert(
                "drugs".into(),
                json!(provider_drugs.into_iter().map(|(d, _)| d).collect::<Vec<_>>()),
            );
            let geometry = provider.point().map(|(lng, lat)| point(lng, lat));
            feature(provider.id, geometry, props)
        })
        .collect();

    Ok(feature_collection(features))
}

/// Drug type choices offered to the public.
pub fn basic_info(epidemic: Epidemic) -> Value {
    let drug_types: Map<String, Value> = DrugType::ALL
        .iter()
        .filter(|t| epidemic.active || **t != DrugType::PublicHealthSupply)
        .map(|t| (t.code().to_string(), json!(t.display())))
        .collect();
    json!({ "drug_type": drug_types })
}

pub fn epidemic_info(epidemic: Epidemic) -> Value {
    json!({ "active": epidemic.active })
}

/// A medication name suggestion with its similarity score.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NameMatch {
    pub medication_name: MedicationName,
    pub score: f64,
}

fn name_similarity(query: &str, candidate: &str) -> f64 {
    let jw = jaro_winkler(query, candidate);
    let lev = normalized_levenshtein(query, candidate);
    let score = jw * 0.6 + lev * 0.4;
    if candidate.starts_with(query) {
        score.max(0.9)
    } else {
        score
    }
}

/// Medication names resembling `query`, best first.
pub fn search_medication_names(db: &Database, query: &str, limit: usize) -> SearchResult<Vec<NameMatch>> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let mut matches: Vec<NameMatch> = db
        .list_medication_names()?
        .into_iter()
        .map(|name| NameMatch {
            score: name_similarity(&query, &name.name.to_lowercase()),
            medication_name: name,
        })
        .filter(|m| m.score >= MIN_NAME_SIMILARITY)
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(limit);
    Ok(matches)
}
