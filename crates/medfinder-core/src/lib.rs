//! MedFinder Core Library
//!
//! Geographic medication supply tracking. Pharmacies and other providers
//! report stock levels per drug product; the library aggregates them by
//! state, county and zipcode, serves historic series, and lets the public
//! find nearby providers.
//!
//! # Architecture
//!
//! ```text
//!   CSV upload ──► import ──► providers / NDCs / supply reports
//!                                   │  (latest flag per pair)
//!                                   ▼
//!        ┌───────────────┬──────────┴─────────┬───────────────┐
//!        ▼               ▼                    ▼               ▼
//!    geo stats       historic            public search     CSV export
//!  (state/county/   (daily series)     (distance + drugs)  (fingerprinted)
//!    zipcode)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Provider, Medication, SupplyReport, etc.)
//! - [`aggregation`]: Supply level bucketing and dominant level
//! - [`filters`]: Query string parsing into supply filters and scopes
//! - [`access`]: Role-scoped geography
//! - [`stats`] / [`historic`]: GeoJSON and time series statistics
//! - [`search`]: Public provider search
//! - [`import`] / [`export`]: CSV in and out
//! - [`housekeeping`]: Periodic maintenance jobs
//! - [`config`] / [`telemetry`]: Runtime settings and logging

pub mod access;
pub mod aggregation;
pub mod config;
pub mod db;
pub mod export;
pub mod filters;
pub mod geo;
pub mod geocoding;
pub mod historic;
pub mod housekeeping;
pub mod import;
pub mod models;
pub mod search;
pub mod stats;
pub mod telemetry;

// Re-export commonly used types
pub use aggregation::{get_supplies, SupplyBucket, SupplyCounts, SupplySummary};
pub use config::Config;
pub use db::Database;
pub use filters::{GeoScope, QueryParams, SupplyFilter};
pub use geocoding::{Coordinates, Geocoder};
pub use models::{
    DrugType, Epidemic, Medication, MedicationName, Organization, PermissionLevel, Provider,
    SupplyReport, User,
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::db::ExportFile;
use crate::historic::{DailySupply, FormulationSeries, HistoricQuery};
use crate::housekeeping::HousekeepingReport;
use crate::import::{ImportOptions, ImportSummary};
use crate::search::{NameMatch, ProviderSearch};

// =========================================================================
// Error Type
// =========================================================================

#[derive(Debug, thiserror::Error)]
pub enum MedfinderError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("Import error: {0}")]
    ImportError(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type MedfinderResult<T> = Result<T, MedfinderError>;

impl From<db::DbError> for MedfinderError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(msg) => MedfinderError::NotFound(msg),
            db::DbError::Validation(msg) | db::DbError::Constraint(msg) => {
                MedfinderError::InvalidInput(msg)
            }
            other => MedfinderError::DatabaseError(other.to_string()),
        }
    }
}

impl From<filters::FilterError> for MedfinderError {
    fn from(e: filters::FilterError) -> Self {
        MedfinderError::InvalidInput(e.to_string())
    }
}

impl From<access::AccessError> for MedfinderError {
    fn from(e: access::AccessError) -> Self {
        match e {
            access::AccessError::PermissionDenied(msg) => MedfinderError::PermissionDenied(msg),
            access::AccessError::Database(e) => e.into(),
        }
    }
}

impl From<stats::StatsError> for MedfinderError {
    fn from(e: stats::StatsError) -> Self {
        match e {
            stats::StatsError::InvalidInput(msg) => MedfinderError::InvalidInput(msg),
            stats::StatsError::NotFound(msg) => MedfinderError::NotFound(msg),
            stats::StatsError::Filter(e) => e.into(),
            stats::StatsError::Database(e) => e.into(),
        }
    }
}

impl From<search::SearchError> for MedfinderError {
    fn from(e: search::SearchError) -> Self {
        match e {
            search::SearchError::BadRequest(msg) => MedfinderError::InvalidInput(msg),
            search::SearchError::Filter(e) => e.into(),
            search::SearchError::Database(e) => e.into(),
        }
    }
}

impl From<import::ImportError> for MedfinderError {
    fn from(e: import::ImportError) -> Self {
        match e {
            import::ImportError::Database(e) => e.into(),
            other => MedfinderError::ImportError(other.to_string()),
        }
    }
}

impl From<export::ExportError> for MedfinderError {
    fn from(e: export::ExportError) -> Self {
        match e {
            export::ExportError::Database(e) => e.into(),
            other => MedfinderError::ExportError(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for MedfinderError {
    fn from(e: config::ConfigError) -> Self {
        MedfinderError::ConfigError(e.to_string())
    }
}

impl From<serde_json::Error> for MedfinderError {
    fn from(e: serde_json::Error) -> Self {
        MedfinderError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for MedfinderError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        MedfinderError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe entry point over one database.
///
/// Operations that take an optional [`User`] restrict geography to what the
/// user may see; `None` means an unrestricted (operator) caller.
pub struct Medfinder {
    db: Arc<Mutex<Database>>,
    config: Config,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl Medfinder {
    /// Open or create the database named by `config.database.path`.
    pub fn open(config: Config) -> MedfinderResult<Self> {
        config.validate()?;
        let db = Database::open(&config.database.path)?;
        tracing::info!(path = %config.database.path.display(), "Opened database");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            config,
            geocoder: None,
        })
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory(config: Config) -> MedfinderResult<Self> {
        config.validate()?;
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            config,
            geocoder: None,
        })
    }

    /// Use `geocoder` for providers saved through imports.
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `f` with exclusive access to the database.
    pub fn with_db<T, F>(&self, f: F) -> MedfinderResult<T>
    where
        F: FnOnce(&Database) -> MedfinderResult<T>,
    {
        let db = self.db.lock()?;
        f(&db)
    }

    fn threshold(&self) -> f64 {
        self.config.aggregation.dominance_threshold
    }

    fn scope_for(db: &Database, user: Option<&User>, requested: GeoScope) -> MedfinderResult<GeoScope> {
        match user {
            Some(user) => Ok(access::force_user_scope(db, user, requested)?),
            None => Ok(requested),
        }
    }

    // =========================================================================
    // Geo Stats
    // =========================================================================

    /// State features for the medication named by `med_id`.
    pub fn state_stats(&self, params: &QueryParams, user: Option<&User>) -> MedfinderResult<Value> {
        let db = self.db.lock()?;
        stats::require_medication_name(&db, params.id("med_id")?)?;
        let filter = SupplyFilter::from_params(params)?;
        let scope = Self::scope_for(&db, user, GeoScope::from_params(params)?)?;
        Ok(stats::state_stats(&db, &filter, &scope, self.threshold())?)
    }

    /// County features of a state. State users always get their own state.
    pub fn county_stats(
        &self,
        state_id: i64,
        params: &QueryParams,
        user: Option<&User>,
    ) -> MedfinderResult<Value> {
        let db = self.db.lock()?;
        stats::require_medication_name(&db, params.id("med_id")?)?;
        let filter = SupplyFilter::from_params(params)?;
        let state_id = match Self::scope_for(&db, user, GeoScope::State(state_id))? {
            GeoScope::State(id) => id,
            _ => state_id,
        };
        Ok(stats::county_stats(&db, state_id, &filter, self.threshold())?)
    }

    /// A zipcode feature followed by its providers.
    pub fn zipcode_stats(
        &self,
        zipcode: &str,
        params: &QueryParams,
        user: Option<&User>,
    ) -> MedfinderResult<Value> {
        let db = self.db.lock()?;
        stats::require_medication_name(&db, params.id("med_id")?)?;
        let filter = SupplyFilter::from_params(params)?;
        Self::scope_for(&db, user, GeoScope::ZipCode(zipcode.to_string()))?;
        Ok(stats::zipcode_stats(&db, zipcode, &filter, self.threshold())?)
    }

    // =========================================================================
    // Historic Stats
    // =========================================================================

    fn historic_query(db: &Database, params: &QueryParams, user: Option<&User>) -> MedfinderResult<HistoricQuery> {
        let mut query = HistoricQuery::from_params(db, params)?;
        query.scope = Self::scope_for(db, user, query.scope)?;
        Ok(query)
    }

    /// Daily series per formulation.
    pub fn historic_average(
        &self,
        params: &QueryParams,
        user: Option<&User>,
    ) -> MedfinderResult<Vec<FormulationSeries>> {
        let db = self.db.lock()?;
        let query = Self::historic_query(&db, params, user)?;
        Ok(historic::average(&db, &query, self.threshold())?)
    }

    /// One daily series across all formulations.
    pub fn historic_overall(
        &self,
        params: &QueryParams,
        user: Option<&User>,
    ) -> MedfinderResult<Vec<DailySupply>> {
        let db = self.db.lock()?;
        let query = Self::historic_query(&db, params, user)?;
        Ok(historic::overall(&db, &query, self.threshold())?)
    }

    // =========================================================================
    // Public Search
    // =========================================================================

    /// Providers near `localization` stocking the requested formulations.
    pub fn find_providers(&self, params: &QueryParams) -> MedfinderResult<Value> {
        let search = ProviderSearch::from_params(params, self.config.search.default_distance_miles)?;
        let db = self.db.lock()?;
        let epidemic = db.get_epidemic()?;
        Ok(search::find_providers(&db, &search, epidemic, self.threshold())?)
    }

    pub fn basic_info(&self) -> MedfinderResult<Value> {
        let db = self.db.lock()?;
        Ok(search::basic_info(db.get_epidemic()?))
    }

    pub fn epidemic_info(&self) -> MedfinderResult<Value> {
        let db = self.db.lock()?;
        Ok(search::epidemic_info(db.get_epidemic()?))
    }

    /// Toggle the epidemic flag. National users only.
    pub fn set_epidemic(&self, active: bool, user: &User) -> MedfinderResult<()> {
        access::require_national(user)?;
        let db = self.db.lock()?;
        db.set_epidemic_active(active)?;
        Ok(())
    }

    /// Medication names resembling `query`, best first.
    pub fn search_medication_names(&self, query: &str, limit: usize) -> MedfinderResult<Vec<NameMatch>> {
        let db = self.db.lock()?;
        Ok(search::search_medication_names(&db, query, limit)?)
    }

    /// Medication names with their formulations, for filter pickers.
    pub fn list_medication_names(&self) -> MedfinderResult<Vec<models::MedicationNameWithFormulations>> {
        let db = self.db.lock()?;
        Ok(db.list_names_with_formulations()?)
    }

    // =========================================================================
    // Import / Export
    // =========================================================================

    fn import_options(&self, organization_id: Option<i64>) -> ImportOptions {
        ImportOptions {
            organization_id,
            batch_size: self.config.import.batch_size,
            throttle: self.config.import.throttle(),
            ..Default::default()
        }
    }

    /// Import a supply CSV for an organization.
    pub fn import_file(&self, path: &Path, organization_id: Option<i64>) -> MedfinderResult<ImportSummary> {
        let options = self.import_options(organization_id);
        let db = self.db.lock()?;
        Ok(import::import_file(&db, path, &options, self.geocoder.as_deref())?)
    }

    /// Import supply CSV from any reader.
    pub fn import_csv<R: std::io::Read>(
        &self,
        input: R,
        organization_id: Option<i64>,
    ) -> MedfinderResult<ImportSummary> {
        let options = self.import_options(organization_id);
        let db = self.db.lock()?;
        Ok(import::import_csv(&db, input, &options, self.geocoder.as_deref())?)
    }

    /// Write matching latest reports as CSV. Returns the row count.
    pub fn export_csv<W: Write>(
        &self,
        params: &QueryParams,
        user: Option<&User>,
        output: W,
    ) -> MedfinderResult<usize> {
        let db = self.db.lock()?;
        let filter = SupplyFilter::from_params(params)?;
        let scope = Self::scope_for(&db, user, GeoScope::from_params(params)?)?;
        Ok(export::export_csv(&db, &filter, &scope, output)?)
    }

    /// Write an export into the configured directory and record it.
    pub fn export_to_directory(
        &self,
        params: &QueryParams,
        user: Option<&User>,
        now: DateTime<Utc>,
    ) -> MedfinderResult<ExportFile> {
        let db = self.db.lock()?;
        let filter = SupplyFilter::from_params(params)?;
        let scope = Self::scope_for(&db, user, GeoScope::from_params(params)?)?;
        Ok(export::export_to_directory(
            &db,
            &filter,
            &scope,
            &self.config.export.directory,
            self.config.export.retention_hours,
            now,
        )?)
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    pub fn run_housekeeping(&self, now: DateTime<Utc>) -> MedfinderResult<HousekeepingReport> {
        let db = self.db.lock()?;
        Ok(housekeeping::run_all(
            &db,
            now,
            self.config.housekeeping.inactive_after_days,
        )?)
    }

    /// Recompute every latest flag. Returns the number of latest reports.
    pub fn rebuild_latest(&self) -> MedfinderResult<usize> {
        let db = self.db.lock()?;
        Ok(housekeeping::rebuild_latest_flags(&db)?)
    }

    // =========================================================================
    // Users & Organizations
    // =========================================================================

    pub fn create_user(&self, user: &User) -> MedfinderResult<User> {
        let db = self.db.lock()?;
        let id = db.insert_user(user)?;
        db.get_user(id)?
            .ok_or_else(|| MedfinderError::NotFound(format!("user {}", id)))
    }

    pub fn get_user_by_email(&self, email: &str) -> MedfinderResult<Option<User>> {
        let db = self.db.lock()?;
        Ok(db.get_user_by_email(email)?)
    }

    pub fn create_organization(&self, organization: &Organization) -> MedfinderResult<i64> {
        let db = self.db.lock()?;
        Ok(db.insert_organization(organization)?)
    }

    pub fn list_organizations(&self) -> MedfinderResult<Vec<Organization>> {
        let db = self.db.lock()?;
        Ok(db.list_organizations()?)
    }
}
