//! CSV export rows and export file bookkeeping.

use rusqlite::{params, params_from_iter, Row};
use serde::{Deserialize, Serialize};

use super::supply::SUPPLY_FROM;
use super::{Database, DbResult};
use crate::filters::{GeoScope, SupplyFilter, WhereClause};

/// One exported line: a report joined with its provider and drug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRecord {
    pub state: String,
    pub zipcode: String,
    pub provider_name: String,
    pub store_number: i64,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub organization: String,
    pub medication_name: String,
    pub formulation: String,
    pub ndc: String,
    pub drug_type: String,
    pub supply: String,
    pub level: u8,
    pub last_modified: String,
}

/// A written export file awaiting expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportFile {
    pub id: String,
    pub path: String,
    /// Hex-encoded SHA-256 of the file contents
    pub sha256: String,
    pub row_count: i64,
    pub created_at: String,
    pub expires_at: String,
}

fn export_file_from_row(row: &Row<'_>) -> rusqlite::Result<ExportFile> {
    Ok(ExportFile {
        id: row.get(0)?,
        path: row.get(1)?,
        sha256: row.get(2)?,
        row_count: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}

impl Database {
    /// Rows for a CSV export, ordered by state, zipcode, provider and drug.
    pub fn export_records(&self, filter: &SupplyFilter, scope: &GeoScope) -> DbResult<Vec<ExportRecord>> {
        let mut clause = WhereClause::default();
        filter.push_sql(&mut clause);
        scope.push_sql(&mut clause);

        let sql = format!(
            r#"
            SELECT p.state, p.zip, p.name, p.store_number, p.address, p.city, p.phone,
                   COALESCE(o.organization_name, ''), COALESCE(n.name, ''), m.name, d.ndc,
                   m.drug_type, r.supply, r.level, r.last_modified
            {}
            LEFT JOIN organizations o ON o.id = p.organization_id
            LEFT JOIN medication_names n ON n.id = m.medication_name_id
            {}
            ORDER BY p.state, p.zip, p.id, m.name, d.ndc, r.last_modified
            "#,
            SUPPLY_FROM,
            clause.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(clause.values.iter()), |row| {
            Ok(ExportRecord {
                state: row.get(0)?,
                zipcode: row.get(1)?,
                provider_name: row.get(2)?,
                store_number: row.get(3)?,
                address: row.get(4)?,
                city: row.get(5)?,
                phone: row.get(6)?,
                organization: row.get(7)?,
                medication_name: row.get(8)?,
                formulation: row.get(9)?,
                ndc: row.get(10)?,
                drug_type: row.get(11)?,
                supply: row.get(12)?,
                level: row.get(13)?,
                last_modified: row.get(14)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn insert_export_file(&self, file: &ExportFile) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO export_files (id, path, sha256, row_count, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                file.id,
                file.path,
                file.sha256,
                file.row_count,
                file.created_at,
                file.expires_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_export_files(&self) -> DbResult<Vec<ExportFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, sha256, row_count, created_at, expires_at \
             FROM export_files ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], export_file_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Export files whose expiry is at or before `now`.
    pub fn expired_export_files(&self, now: &str) -> DbResult<Vec<ExportFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, sha256, row_count, created_at, expires_at \
             FROM export_files WHERE expires_at <= ? ORDER BY expires_at, id",
        )?;
        let rows = stmt.query_map([now], export_file_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_export_file(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM export_files WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrugType, Organization, Provider, SupplyReport};

    fn make_file(id: &str, expires_at: &str) -> ExportFile {
        ExportFile {
            id: id.to_string(),
            path: format!("/tmp/{}.csv", id),
            sha256: "00".repeat(32),
            row_count: 3,
            created_at: "2020-03-01T00:00:00Z".into(),
            expires_at: expires_at.into(),
        }
    }

    #[test]
    fn test_expired_lookup_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.insert_export_file(&make_file("old", "2020-03-02T00:00:00Z"))
            .unwrap();
        db.insert_export_file(&make_file("new", "2020-03-09T00:00:00Z"))
            .unwrap();

        let expired = db.expired_export_files("2020-03-05T00:00:00Z").unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "old");

        assert!(db.delete_export_file("old").unwrap());
        assert_eq!(db.list_export_files().unwrap().len(), 1);
    }

    #[test]
    fn test_export_records_join_organization() {
        let db = Database::open_in_memory().unwrap();
        let org_id = db
            .insert_organization(&Organization::new("Corner Drug"))
            .unwrap();
        let mut provider = Provider::new(7, "1 Main St", "Springfield", "MO", "65619");
        provider.organization_id = Some(org_id);
        provider.name = "Corner Drug #7".into();
        let provider_id = db.insert_provider(&provider).unwrap();
        let ndc = db
            .get_or_create_ndc("0002-1433-80", "Tamiflu 75mg", DrugType::Brand)
            .unwrap();
        db.insert_supply_report(&SupplyReport::new(provider_id, ndc.ndc_id, "24-48"))
            .unwrap();

        let records = db
            .export_records(&SupplyFilter::default(), &GeoScope::National)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].organization, "Corner Drug");
        assert_eq!(records[0].medication_name, "");
        assert_eq!(records[0].formulation, "Tamiflu 75mg");
        assert_eq!(records[0].drug_type, "b");
        assert_eq!(records[0].level, 3);
    }
}
