//! Bulk CSV import of supply reports.
//!
//! An organization uploads one CSV per inventory snapshot. Each row names a
//! store, a drug NDC and a supply string. Unknown stores and NDCs are created
//! on the fly; every row becomes a new supply report.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::geocoding::Geocoder;
use crate::models::{
    is_valid_state, is_valid_zip, now_timestamp, DrugType, Provider, ProviderSaveOptions,
    SupplyReport,
};

/// Columns every import file must have.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "store #",
    "address",
    "city",
    "zipcode",
    "state",
    "phone",
    "med_code",
    "med_name",
    "supply_level",
];

/// Columns read when present.
pub const OPTIONAL_COLUMNS: [&str; 4] = [
    "provider_name",
    "provider_type",
    "provider_category",
    "drug_type",
];

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV missing required column '{0}'")]
    MissingColumn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Import settings.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub organization_id: Option<i64>,
    /// Pause after this many rows
    pub batch_size: usize,
    pub throttle: Duration,
    /// Timestamp stamped on every report of this import
    pub imported_at: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            organization_id: None,
            batch_size: 500,
            throttle: Duration::ZERO,
            imported_at: now_timestamp(),
        }
    }
}

/// A row that was not imported.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedRow {
    /// 1-based line in the file, header included
    pub line: u64,
    pub reason: String,
}

/// What an import did.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ImportSummary {
    pub rows: usize,
    pub providers_created: usize,
    pub medications_created: usize,
    pub reports_created: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Positions of known columns in the header.
struct Columns {
    required: HashMap<&'static str, usize>,
    optional: HashMap<&'static str, usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> ImportResult<Self> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let mut required = HashMap::new();
        for name in REQUIRED_COLUMNS {
            let idx = position(name).ok_or_else(|| ImportError::MissingColumn(name.to_string()))?;
            required.insert(name, idx);
        }
        let optional = OPTIONAL_COLUMNS
            .iter()
            .filter_map(|name| position(name).map(|idx| (*name, idx)))
            .collect();
        Ok(Self { required, optional })
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.required
            .get(name)
            .or_else(|| self.optional.get(name))
            .and_then(|idx| record.get(*idx))
            .map(str::trim)
            .unwrap_or("")
    }
}

/// Accepts codes (`b`) or labels (`generic`, `Public Health Supply`).
fn parse_drug_type(raw: &str) -> Option<DrugType> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    DrugType::from_code(&lower).or_else(|| {
        DrugType::ALL
            .into_iter()
            .find(|t| t.display().to_lowercase().starts_with(&lower))
    })
}

/// Import one CSV stream inside a single transaction.
pub fn import_csv<R: Read>(
    db: &Database,
    input: R,
    options: &ImportOptions,
    geocoder: Option<&dyn Geocoder>,
) -> ImportResult<ImportSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let columns = Columns::from_headers(reader.headers()?)?;

    db.in_transaction(|db| {
        let mut summary = ImportSummary::default();
        let mut current_provider: Option<(i64, i64)> = None;
        let mut ndc_cache: HashMap<String, i64> = HashMap::new();
        let mut touched: HashSet<i64> = HashSet::new();

        for record in reader.records() {
            let record = record?;
            summary.rows += 1;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let skip = |summary: &mut ImportSummary, reason: String| {
                tracing::warn!(line, reason = %reason, "Skipping import row");
                summary.skipped.push(SkippedRow { line, reason });
            };

            let store_raw = columns.get(&record, "store #");
            let Ok(store_number) = store_raw.parse::<i64>() else {
                skip(&mut summary, format!("invalid store number '{}'", store_raw));
                continue;
            };
            let state = columns.get(&record, "state").to_uppercase();
            if !is_valid_state(&state) {
                skip(&mut summary, format!("invalid state '{}'", state));
                continue;
            }
            let zip = columns.get(&record, "zipcode");
            if !is_valid_zip(zip) {
                skip(&mut summary, format!("invalid zipcode '{}'", zip));
                continue;
            }
            let med_code = columns.get(&record, "med_code");
            if med_code.is_empty() {
                skip(&mut summary, "empty med_code".to_string());
                continue;
            }

            // Consecutive rows usually belong to the same store
            let provider_id = match current_provider {
                Some((store, id)) if store == store_number => id,
                _ => {
                    let id = match db.find_provider_by_store(options.organization_id, store_number)? {
                        Some(existing) => existing.id,
                        None => {
                            let mut provider = Provider::new(
                                store_number,
                                columns.get(&record, "address"),
                                columns.get(&record, "city"),
                                state.as_str(),
                                zip,
                            );
                            provider.organization_id = options.organization_id;
                            provider.phone = columns.get(&record, "phone").to_string();
                            provider.name = columns.get(&record, "provider_name").to_string();
                            provider.last_import_date = options.imported_at.clone();
                            let type_name = columns.get(&record, "provider_type");
                            if !type_name.is_empty() {
                                provider.type_id = Some(db.get_or_create_provider_type(type_name)?);
                            }
                            let category_name = columns.get(&record, "provider_category");
                            if !category_name.is_empty() {
                                provider.category_id =
                                    Some(db.get_or_create_provider_category(category_name)?);
                            }
                            let save_options = ProviderSaveOptions {
                                change_coordinates: false,
                                relate_related_zipcode: true,
                            };
                            let id = db.save_provider(&mut provider, save_options, geocoder)?;
                            summary.providers_created += 1;
                            id
                        }
                    };
                    current_provider = Some((store_number, id));
                    id
                }
            };

            let ndc_id = match ndc_cache.get(med_code) {
                Some(id) => *id,
                None => {
                    let drug_type = parse_drug_type(columns.get(&record, "drug_type"))
                        .unwrap_or_default();
                    let resolution =
                        db.get_or_create_ndc(med_code, columns.get(&record, "med_name"), drug_type)?;
                    if resolution.medication_created {
                        summary.medications_created += 1;
                    }
                    ndc_cache.insert(med_code.to_string(), resolution.ndc_id);
                    resolution.ndc_id
                }
            };

            let report = SupplyReport::new(provider_id, ndc_id, columns.get(&record, "supply_level"))
                .at(options.imported_at.clone());
            db.insert_supply_report(&report)?;
            summary.reports_created += 1;
            touched.insert(provider_id);

            if options.batch_size > 0 && summary.rows % options.batch_size == 0 {
                tracing::info!(rows = summary.rows, "Import progress");
                if !options.throttle.is_zero() {
                    std::thread::sleep(options.throttle);
                }
            }
        }

        for provider_id in &touched {
            db.mark_provider_imported(*provider_id, &options.imported_at)?;
        }

        tracing::info!(
            rows = summary.rows,
            providers_created = summary.providers_created,
            medications_created = summary.medications_created,
            reports_created = summary.reports_created,
            skipped = summary.skipped.len(),
            "Import finished"
        );
        Ok::<_, ImportError>(summary)
    })
}

/// Import a CSV file from disk.
pub fn import_file(
    db: &Database,
    path: &Path,
    options: &ImportOptions,
    geocoder: Option<&dyn Geocoder>,
) -> ImportResult<ImportSummary> {
    let file = std::fs::File::open(path)?;
    tracing::info!(path = %path.display(), "Importing supply CSV");
    import_csv(db, file, options, geocoder)
}
