//! Query-string filters applied to supply report queries.
//!
//! Every view narrows the same joined relation of reports, NDCs,
//! formulations, providers and zipcodes. Filters are parsed from
//! comma-separated query-string values and rendered into a SQL `WHERE`
//! clause with positional parameters.

use chrono::{Duration, NaiveDate};
use rusqlite::types::Value;
use thiserror::Error;

use crate::models::DrugType;

/// Filter parsing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid list for {param}: {value}")]
    InvalidList { param: String, value: String },

    #[error("Invalid drug type: {0}")]
    InvalidDrugType(String),

    #[error("Incorrect date: {0}")]
    InvalidDate(String),

    #[error("start_date must precede end_date.")]
    DatesOutOfOrder,
}

pub type FilterResult<T> = Result<T, FilterError>;

// =========================================================================
// Query parameters
// =========================================================================

/// Ordered key/value pairs from a query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parse `a=1&b=2,3` with percent-decoding. A key without `=` maps to an
    /// empty value.
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .trim_start_matches('?')
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((k, v)) => (percent_decode(k), percent_decode(v)),
                None => (percent_decode(part), String::new()),
            })
            .collect();
        Self { pairs }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Last value given for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Comma-separated id list. An empty value yields an empty list.
    pub fn id_list(&self, key: &str) -> FilterResult<Option<Vec<i64>>> {
        self.get(key).map(|raw| parse_id_list(key, raw)).transpose()
    }

    /// Single integer value.
    pub fn id(&self, key: &str) -> FilterResult<Option<i64>> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| FilterError::InvalidList {
                param: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }
}

fn percent_decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    }
}

/// Parse `1,2,3`; blanks between commas are ignored.
pub fn parse_id_list(param: &str, raw: &str) -> FilterResult<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| FilterError::InvalidList {
                param: param.to_string(),
                value: raw.to_string(),
            })
        })
        .collect()
}

/// Parse `b,g,p`.
pub fn parse_drug_types(raw: &str) -> FilterResult<Vec<DrugType>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            DrugType::from_code(part).ok_or_else(|| FilterError::InvalidDrugType(part.to_string()))
        })
        .collect()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> FilterResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| FilterError::InvalidDate(raw.to_string()))
}

// =========================================================================
// Date range
// =========================================================================

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `start` must come strictly before `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> FilterResult<Self> {
        if start >= end {
            return Err(FilterError::DatesOutOfOrder);
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> FilterResult<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// First stored timestamp inside the range.
    pub fn start_timestamp(&self) -> String {
        format!("{}T00:00:00Z", self.start.format("%Y-%m-%d"))
    }

    /// First stored timestamp after the range; the end day counts in full.
    pub fn end_timestamp_exclusive(&self) -> String {
        let after = self.end + Duration::days(1);
        format!("{}T00:00:00Z", after.format("%Y-%m-%d"))
    }

    /// Every day from start to end, inclusive.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

// =========================================================================
// Geographic scope
// =========================================================================

/// Geographic restriction of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoScope {
    National,
    State(i64),
    County(i64),
    ZipCode(String),
}

impl GeoScope {
    /// Scope requested through `zipcode`, `county` or `state` parameters,
    /// most specific first.
    pub fn from_params(params: &QueryParams) -> FilterResult<Self> {
        if let Some(zipcode) = params.get("zipcode").map(str::trim).filter(|z| !z.is_empty()) {
            return Ok(GeoScope::ZipCode(zipcode.to_string()));
        }
        if let Some(county) = params.id("county")? {
            return Ok(GeoScope::County(county));
        }
        if let Some(state) = params.id("state")? {
            return Ok(GeoScope::State(state));
        }
        Ok(GeoScope::National)
    }

    pub(crate) fn push_sql(&self, query: &mut WhereClause) {
        match self {
            GeoScope::National => {}
            GeoScope::State(id) => query.push("z.state_id = ?", [Value::Integer(*id)]),
            GeoScope::County(id) => query.push(
                "p.related_zipcode_id IN (SELECT zipcode_id FROM zipcode_counties WHERE county_id = ?)",
                [Value::Integer(*id)],
            ),
            GeoScope::ZipCode(code) => query.push("z.zipcode = ?", [Value::Text(code.clone())]),
        }
    }
}

// =========================================================================
// Supply filter
// =========================================================================

/// Filters over supply reports.
///
/// `None` means "not filtered"; `Some(vec![])` means "nothing selected" and
/// matches no rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyFilter {
    pub medication_name_ids: Option<Vec<i64>>,
    pub formulations: Option<Vec<i64>>,
    pub drug_types: Option<Vec<DrugType>>,
    pub provider_types: Option<Vec<i64>>,
    pub provider_categories: Option<Vec<i64>>,
    pub exclude_drug_types: Vec<DrugType>,
    /// Lower bound on creation date, inclusive
    pub created_from: Option<String>,
    /// Upper bound on creation date, exclusive
    pub created_before: Option<String>,
    pub active_providers_only: bool,
    pub latest_only: bool,
}

impl Default for SupplyFilter {
    fn default() -> Self {
        Self {
            medication_name_ids: None,
            formulations: None,
            drug_types: None,
            provider_types: None,
            provider_categories: None,
            exclude_drug_types: Vec::new(),
            created_from: None,
            created_before: None,
            active_providers_only: true,
            latest_only: true,
        }
    }
}

impl SupplyFilter {
    /// Latest reports of one medication name at active providers.
    pub fn for_medication_name(medication_name_id: i64) -> Self {
        Self {
            medication_name_ids: Some(vec![medication_name_id]),
            ..Default::default()
        }
    }

    /// Build a filter from query parameters.
    ///
    /// `med_id` and `med_ids` are merged. Empty lists other than
    /// `formulations` and `drug_type` are treated as absent.
    pub fn from_params(params: &QueryParams) -> FilterResult<Self> {
        let mut filter = Self::default();

        let mut names = params.id_list("med_ids")?.unwrap_or_default();
        if let Some(id) = params.id("med_id")? {
            names.push(id);
        }
        if !names.is_empty() {
            filter.medication_name_ids = Some(names);
        }

        filter.formulations = params.id_list("formulations")?;
        filter.drug_types = params.get("drug_type").map(parse_drug_types).transpose()?;
        filter.provider_types = params.id_list("provider_type")?.filter(|v| !v.is_empty());
        filter.provider_categories = params
            .id_list("provider_category")?
            .filter(|v| !v.is_empty());

        let start = params
            .get("start_date")
            .filter(|s| !s.trim().is_empty())
            .map(parse_date)
            .transpose()?;
        let end = params
            .get("end_date")
            .filter(|s| !s.trim().is_empty())
            .map(parse_date)
            .transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Err(FilterError::DatesOutOfOrder);
            }
        }
        filter.created_from = start.map(|d| format!("{}T00:00:00Z", d.format("%Y-%m-%d")));
        filter.created_before =
            end.map(|d| format!("{}T00:00:00Z", (d + Duration::days(1)).format("%Y-%m-%d")));

        Ok(filter)
    }

    /// Restrict to a date range and include superseded reports.
    ///
    /// Reports of providers deactivated since then still count.
    pub fn with_range(mut self, range: &DateRange) -> Self {
        self.created_from = Some(range.start_timestamp());
        self.created_before = Some(range.end_timestamp_exclusive());
        self.latest_only = false;
        self.active_providers_only = false;
        self
    }

    /// Whether an explicit empty selection rules out every row.
    pub fn selects_nothing(&self) -> bool {
        matches!(&self.formulations, Some(v) if v.is_empty())
            || matches!(&self.drug_types, Some(v) if v.is_empty())
            || matches!(&self.medication_name_ids, Some(v) if v.is_empty())
    }

    pub(crate) fn push_sql(&self, query: &mut WhereClause) {
        if self.selects_nothing() {
            query.push("0", []);
            return;
        }
        if self.latest_only {
            query.push("r.latest = 1", []);
        }
        if self.active_providers_only {
            query.push("p.active = 1", []);
        }
        if let Some(ids) = &self.medication_name_ids {
            query.push_in("m.medication_name_id", ids.iter().map(|id| Value::Integer(*id)));
        }
        if let Some(ids) = &self.formulations {
            query.push_in("m.id", ids.iter().map(|id| Value::Integer(*id)));
        }
        if let Some(types) = &self.drug_types {
            query.push_in(
                "m.drug_type",
                types.iter().map(|t| Value::Text(t.code().to_string())),
            );
        }
        if !self.exclude_drug_types.is_empty() {
            query.push_not_in(
                "m.drug_type",
                self.exclude_drug_types
                    .iter()
                    .map(|t| Value::Text(t.code().to_string())),
            );
        }
        if let Some(ids) = &self.provider_types {
            query.push_in("p.type_id", ids.iter().map(|id| Value::Integer(*id)));
        }
        if let Some(ids) = &self.provider_categories {
            query.push_in("p.category_id", ids.iter().map(|id| Value::Integer(*id)));
        }
        if let Some(from) = &self.created_from {
            query.push("r.creation_date >= ?", [Value::Text(from.clone())]);
        }
        if let Some(before) = &self.created_before {
            query.push("r.creation_date < ?", [Value::Text(before.clone())]);
        }
    }
}

/// Accumulates `AND`-joined conditions and their positional values.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    conditions: Vec<String>,
    pub(crate) values: Vec<Value>,
}

impl WhereClause {
    pub(crate) fn push<I>(&mut self, condition: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.conditions.push(condition.to_string());
        self.values.extend(values);
    }

    pub(crate) fn push_in<I>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.push_list(column, "IN", values);
    }

    pub(crate) fn push_not_in<I>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.push_list(column, "NOT IN", values);
    }

    fn push_list<I>(&mut self, column: &str, op: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let values: Vec<Value> = values.into_iter().collect();
        if values.is_empty() {
            // IN () matches nothing, NOT IN () matches everything
            if op == "IN" {
                self.conditions.push("0".to_string());
            }
            return;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.conditions
            .push(format!("{} {} ({})", column, op, placeholders));
        self.values.extend(values);
    }

    /// ` WHERE a AND b`, or an empty string.
    pub(crate) fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}
