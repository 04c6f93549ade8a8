//! Database layer for medfinder.

mod schema;
mod epidemic;
mod exports;
mod geography;
mod medications;
mod organizations;
mod providers;
mod supply;
mod users;

pub use exports::{ExportFile, ExportRecord};
pub use medications::NdcResolution;
pub use providers::BoundingBox;
pub use schema::SCHEMA;
pub use supply::{DailyLevel, GroupBy, GroupTally, ProviderDrugLevel};

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    ///
    /// Every `Database` method called from `f` shares the transaction since
    /// they all go through the same connection. When a transaction is already
    /// open, `f` joins it and the outer caller decides commit or rollback.
    pub fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| E::from(DbError::from(e)))?;
        let value = f(self)?;
        tx.commit().map_err(|e| E::from(DbError::from(e)))?;
        Ok(value)
    }
}

/// Decode an optional GeoJSON column.
pub(crate) fn geometry_from_column(raw: Option<String>) -> DbResult<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(Into::into)
}

/// Encode an optional GeoJSON value for storage.
pub(crate) fn geometry_to_column(value: &Option<serde_json::Value>) -> DbResult<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_open_on_disk_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medfinder.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_medication_name("Amoxicillin").unwrap();
        }
        // Schema creation is idempotent and data survives
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_medication_names().unwrap().len(), 1);
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "organizations",
            "states",
            "counties",
            "zipcodes",
            "zipcode_counties",
            "providers",
            "medication_names",
            "medications",
            "medication_ndcs",
            "supply_reports",
            "users",
            "epidemic",
            "export_files",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: DbResult<()> = db.in_transaction(|db| {
            db.insert_medication_name("Rolled back")?;
            Err(DbError::Validation("abort".into()))
        });
        assert!(result.is_err());
        assert!(db.list_medication_names().unwrap().is_empty());
    }

    #[test]
    fn test_nested_transaction_joins_outer() {
        let db = Database::open_in_memory().unwrap();
        let result: DbResult<()> = db.in_transaction(|db| {
            db.in_transaction(|db| db.insert_medication_name("Inner").map(|_| ()))?;
            Err(DbError::Validation("abort outer".into()))
        });
        assert!(result.is_err());
        assert!(db.list_medication_names().unwrap().is_empty());
    }
}
