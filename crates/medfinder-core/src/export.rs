//! CSV export of latest supply reports.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{Database, DbError, ExportFile, ExportRecord};
use crate::filters::{GeoScope, SupplyFilter};
use crate::models::timestamp;

/// Fixed column order of every export.
pub const EXPORT_HEADER: [&str; 15] = [
    "state",
    "zipcode",
    "provider_name",
    "store_number",
    "address",
    "city",
    "phone",
    "organization",
    "medication_name",
    "formulation",
    "ndc",
    "drug_type",
    "supply",
    "level",
    "last_modified",
];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Hex SHA-256 of exported bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Write records as CSV with the fixed header. Returns the row count.
pub fn write_csv<W: Write>(records: &[ExportRecord], output: W) -> ExportResult<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);
    writer.write_record(EXPORT_HEADER)?;
    for record in records {
        let store_number = record.store_number.to_string();
        let level = record.level.to_string();
        writer.write_record([
            record.state.as_str(),
            record.zipcode.as_str(),
            record.provider_name.as_str(),
            store_number.as_str(),
            record.address.as_str(),
            record.city.as_str(),
            record.phone.as_str(),
            record.organization.as_str(),
            record.medication_name.as_str(),
            record.formulation.as_str(),
            record.ndc.as_str(),
            record.drug_type.as_str(),
            record.supply.as_str(),
            level.as_str(),
            record.last_modified.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Export the reports matching `filter` and `scope` to `output`.
pub fn export_csv<W: Write>(
    db: &Database,
    filter: &SupplyFilter,
    scope: &GeoScope,
    output: W,
) -> ExportResult<usize> {
    let records = db.export_records(filter, scope)?;
    write_csv(&records, output)
}

/// Write an export file under `directory` and record it for expiry.
pub fn export_to_directory(
    db: &Database,
    filter: &SupplyFilter,
    scope: &GeoScope,
    directory: &Path,
    retention_hours: i64,
    now: DateTime<Utc>,
) -> ExportResult<ExportFile> {
    let mut buffer = Vec::new();
    let row_count = export_csv(db, filter, scope, &mut buffer)?;

    std::fs::create_dir_all(directory)?;
    let id = Uuid::new_v4().to_string();
    let path: PathBuf = directory.join(format!("medfinder-export-{}.csv", id));
    std::fs::write(&path, &buffer)?;

    let file = ExportFile {
        id,
        path: path.to_string_lossy().into_owned(),
        sha256: fingerprint(&buffer),
        row_count: row_count as i64,
        created_at: timestamp(now),
        expires_at: timestamp(now + Duration::hours(retention_hours)),
    };
    db.insert_export_file(&file)?;

    tracing::info!(
        path = %file.path,
        rows = row_count,
        sha256 = %file.sha256,
        "Wrote export file"
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrugType, Provider, State, SupplyReport, ZipCode};
    use chrono::TimeZone;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let state_id = db.insert_state(&State::new("MO", "Missouri")).unwrap();
        let zip_id = db.insert_zipcode(&ZipCode::new("65619", state_id)).unwrap();
        let mut provider = Provider::new(7, "1 Main St", "Springfield", "MO", "65619");
        provider.name = "Corner, Drug".into();
        provider.related_zipcode_id = Some(zip_id);
        let provider_id = db.insert_provider(&provider).unwrap();
        let ndc = db
            .get_or_create_ndc("0002-1433-80", "Tamiflu 75mg", DrugType::Brand)
            .unwrap();
        db.insert_supply_report(
            &SupplyReport::new(provider_id, ndc.ndc_id, "<24").at("2020-03-01T10:00:00Z"),
        )
        .unwrap();
        db.insert_supply_report(
            &SupplyReport::new(provider_id, ndc.ndc_id, ">48").at("2020-03-02T10:00:00Z"),
        )
        .unwrap();
        (db, state_id)
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_export_latest_only_with_header() {
        let (db, state_id) = setup();
        let mut out = Vec::new();
        let rows = export_csv(
            &db,
            &SupplyFilter::default(),
            &GeoScope::State(state_id),
            &mut out,
        )
        .unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), EXPORT_HEADER.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("MO,65619,\"Corner, Drug\",7,"));
        assert!(row.ends_with(",b,>48,4,2020-03-02T10:00:00Z"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_export_other_state_is_empty() {
        let (db, state_id) = setup();
        let mut out = Vec::new();
        let rows = export_csv(
            &db,
            &SupplyFilter::default(),
            &GeoScope::State(state_id + 1),
            &mut out,
        )
        .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_export_to_directory_records_file() {
        let (db, _) = setup();
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2020, 3, 5, 8, 0, 0).unwrap();

        let file = export_to_directory(
            &db,
            &SupplyFilter::default(),
            &GeoScope::National,
            dir.path(),
            24,
            now,
        )
        .unwrap();

        assert_eq!(file.expires_at, "2020-03-06T08:00:00Z");
        assert_eq!(file.row_count, 1);
        let bytes = std::fs::read(&file.path).unwrap();
        assert_eq!(fingerprint(&bytes), file.sha256);
        assert_eq!(db.list_export_files().unwrap(), vec![file]);
    }
}
