//! Daily supply history of a medication name.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::aggregation::{SupplyCounts, SupplySummary};
use crate::db::Database;
use crate::filters::{DateRange, FilterError, GeoScope, QueryParams, SupplyFilter};
use crate::stats::{
    require_medication_name, StatsError, StatsResult, MISSING_DATES, UNKNOWN_STATE,
    UNKNOWN_ZIPCODE,
};

/// A validated history request.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricQuery {
    pub medication_name_id: i64,
    pub range: DateRange,
    pub scope: GeoScope,
    pub filter: SupplyFilter,
}

impl HistoricQuery {
    /// Validate query parameters in order: medication, dates, geography.
    pub fn from_params(db: &Database, params: &QueryParams) -> StatsResult<Self> {
        let medication_name = require_medication_name(db, params.id("med_id").unwrap_or(None))?;

        let start = params.get("start_date").filter(|s| !s.trim().is_empty());
        let end = params.get("end_date").filter(|s| !s.trim().is_empty());
        let (Some(start), Some(end)) = (start, end) else {
            return Err(StatsError::InvalidInput(MISSING_DATES.to_string()));
        };
        let range = DateRange::parse(start, end).map_err(|e| match e {
            FilterError::InvalidDate(_) | FilterError::DatesOutOfOrder => {
                StatsError::InvalidInput(e.to_string())
            }
            other => StatsError::Filter(other),
        })?;

        let scope = GeoScope::from_params(params)?;
        match &scope {
            GeoScope::State(id) if db.get_state(*id)?.is_none() => {
                return Err(StatsError::NotFound(UNKNOWN_STATE.to_string()));
            }
            GeoScope::ZipCode(code) if db.get_zipcode_by_code(code)?.is_none() => {
                return Err(StatsError::NotFound(UNKNOWN_ZIPCODE.to_string()));
            }
            _ => {}
        }

        let mut filter = SupplyFilter::from_params(params)?;
        filter.medication_name_ids = Some(vec![medication_name.id]);

        Ok(Self {
            medication_name_id: medication_name.id,
            range,
            scope,
            filter: filter.with_range(&range),
        })
    }
}

/// Supply summary of one day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailySupply {
    pub day: NaiveDate,
    pub supply: SupplySummary,
}

/// Daily series of one formulation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FormulationSeries {
    pub medication_id: i64,
    pub medication: String,
    pub series: Vec<DailySupply>,
}

fn series_for(range: &DateRange, by_day: &HashMap<String, SupplyCounts>, threshold: f64) -> Vec<DailySupply> {
    range
        .days()
        .map(|day| {
            let counts = by_day
                .get(&day.format("%Y-%m-%d").to_string())
                .copied()
                .unwrap_or_default();
            DailySupply {
                day,
                supply: counts.summarize(threshold),
            }
        })
        .collect()
}

/// Per-formulation daily series for every day of the range.
///
/// Formulations of the medication name without reports still get a series
/// of empty days.
pub fn average(db: &Database, query: &HistoricQuery, threshold: f64) -> StatsResult<Vec<FormulationSeries>> {
    let mut by_medication: HashMap<i64, HashMap<String, SupplyCounts>> = HashMap::new();
    for level in db.daily_levels(&query.filter, &query.scope)? {
        by_medication
            .entry(level.medication_id)
            .or_default()
            .entry(level.day)
            .or_default()
            .add(level.level);
    }

    let empty = HashMap::new();
    let medications = db
        .list_medications_for_name(query.medication_name_id)?
        .into_iter()
        .filter(|m| match &query.filter.formulations {
            Some(ids) => ids.contains(&m.id),
            None => true,
        })
        .filter(|m| match &query.filter.drug_types {
            Some(types) => types.contains(&m.drug_type),
            None => true,
        });

    Ok(medications
        .map(|medication| FormulationSeries {
            series: series_for(
                &query.range,
                by_medication.get(&medication.id).unwrap_or(&empty),
                threshold,
            ),
            medication_id: medication.id,
            medication: medication.name,
        })
        .collect())
}

/// One daily series across every formulation.
pub fn overall(db: &Database, query: &HistoricQuery, threshold: f64) -> StatsResult<Vec<DailySupply>> {
    let mut by_day: HashMap<String, SupplyCounts> = HashMap::new();
    for level in db.daily_levels(&query.filter, &query.scope)? {
        by_day.entry(level.day).or_default().add(level.level);
    }
    Ok(series_for(&query.range, &by_day, threshold))
}
