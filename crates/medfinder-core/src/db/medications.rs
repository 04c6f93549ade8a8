//! Medication name, formulation and NDC operations.

use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeMap;

use super::{Database, DbError, DbResult};
use crate::models::{
    DrugType, Medication, MedicationName, MedicationNameWithFormulations, MedicationNdc,
};

/// Intermediate row struct for database mapping.
struct MedicationRow {
    id: i64,
    name: String,
    medication_name_id: Option<i64>,
    drug_type: String,
}

impl MedicationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            medication_name_id: row.get(2)?,
            drug_type: row.get(3)?,
        })
    }
}

impl TryFrom<MedicationRow> for Medication {
    type Error = DbError;

    fn try_from(row: MedicationRow) -> Result<Self, Self::Error> {
        let drug_type = DrugType::from_code(&row.drug_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown drug type: {}", row.drug_type)))?;
        Ok(Medication {
            id: row.id,
            name: row.name,
            medication_name_id: row.medication_name_id,
            drug_type,
        })
    }
}

/// Outcome of resolving an NDC during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdcResolution {
    pub ndc_id: i64,
    pub medication_id: Option<i64>,
    pub medication_created: bool,
}

impl Database {
    // =========================================================================
    // Medication names
    // =========================================================================

    pub fn insert_medication_name(&self, name: &str) -> DbResult<i64> {
        if name.trim().is_empty() {
            return Err(DbError::Validation("medication name must not be empty".into()));
        }
        self.conn
            .execute("INSERT INTO medication_names (name) VALUES (?)", [name.trim()])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_medication_name(&self, id: i64) -> DbResult<Option<MedicationName>> {
        self.conn
            .query_row(
                "SELECT id, name FROM medication_names WHERE id = ?",
                [id],
                |row| {
                    Ok(MedicationName {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// All medication names ordered alphabetically.
    pub fn list_medication_names(&self) -> DbResult<Vec<MedicationName>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM medication_names ORDER BY name, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(MedicationName {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Medication names with their formulations, for filter pickers.
    pub fn list_names_with_formulations(&self) -> DbResult<Vec<MedicationNameWithFormulations>> {
        let mut grouped: BTreeMap<i64, Vec<Medication>> = BTreeMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT id, name, medication_name_id, drug_type FROM medications \
                 WHERE medication_name_id IS NOT NULL ORDER BY name, id",
            )?;
            let rows = stmt.query_map([], MedicationRow::from_row)?;
            for row in rows {
                let medication: Medication = row?.try_into()?;
                if let Some(name_id) = medication.medication_name_id {
                    grouped.entry(name_id).or_default().push(medication);
                }
            }
        }

        Ok(self
            .list_medication_names()?
            .into_iter()
            .map(|name| MedicationNameWithFormulations {
                medications: grouped.remove(&name.id).unwrap_or_default(),
                id: name.id,
                name: name.name,
            })
            .collect())
    }

    // =========================================================================
    // Medications (formulations)
    // =========================================================================

    pub fn insert_medication(&self, medication: &Medication) -> DbResult<i64> {
        self.conn.execute(
            "INSERT INTO medications (name, medication_name_id, drug_type) VALUES (?1, ?2, ?3)",
            params![
                medication.name,
                medication.medication_name_id,
                medication.drug_type.code(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_medication(&self, id: i64) -> DbResult<Option<Medication>> {
        self.conn
            .query_row(
                "SELECT id, name, medication_name_id, drug_type FROM medications WHERE id = ?",
                [id],
                MedicationRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Formulations of a medication name.
    pub fn list_medications_for_name(&self, medication_name_id: i64) -> DbResult<Vec<Medication>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, medication_name_id, drug_type FROM medications \
             WHERE medication_name_id = ? ORDER BY name, id",
        )?;
        let rows = stmt.query_map([medication_name_id], MedicationRow::from_row)?;

        let mut medications = Vec::new();
        for row in rows {
            medications.push(row?.try_into()?);
        }
        Ok(medications)
    }

    /// Attach a formulation to a medication name.
    pub fn assign_medication_name(&self, medication_id: i64, medication_name_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE medications SET medication_name_id = ?2 WHERE id = ?1",
            params![medication_id, medication_name_id],
        )?;
        Ok(rows_affected > 0)
    }

    // =========================================================================
    // NDCs
    // =========================================================================

    pub fn insert_ndc(&self, medication_id: Option<i64>, ndc: &str) -> DbResult<i64> {
        self.conn.execute(
            "INSERT INTO medication_ndcs (medication_id, ndc) VALUES (?1, ?2)",
            params![medication_id, ndc],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_ndc_by_code(&self, ndc: &str) -> DbResult<Option<MedicationNdc>> {
        self.conn
            .query_row(
                "SELECT id, medication_id, ndc FROM medication_ndcs WHERE ndc = ?",
                [ndc],
                |row| {
                    Ok(MedicationNdc {
                        id: row.get(0)?,
                        medication_id: row.get(1)?,
                        ndc: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Resolve an NDC code, creating it and its formulation when unknown.
    ///
    /// The formulation is looked up by exact name before a new one is created
    /// with `drug_type`.
    pub fn get_or_create_ndc(
        &self,
        ndc: &str,
        medication_name: &str,
        drug_type: DrugType,
    ) -> DbResult<NdcResolution> {
        if let Some(existing) = self.get_ndc_by_code(ndc)? {
            return Ok(NdcResolution {
                ndc_id: existing.id,
                medication_id: existing.medication_id,
                medication_created: false,
            });
        }

        let existing_medication: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM medications WHERE name = ? ORDER BY id LIMIT 1",
                [medication_name],
                |row| row.get(0),
            )
            .optional()?;
        let (medication_id, medication_created) = match existing_medication {
            Some(id) => (id, false),
            None => {
                let id = self.insert_medication(&Medication::new(medication_name, drug_type))?;
                tracing::debug!(medication = %medication_name, id, "Created medication");
                (id, true)
            }
        };

        let ndc_id = self.insert_ndc(Some(medication_id), ndc)?;
        Ok(NdcResolution {
            ndc_id,
            medication_id: Some(medication_id),
            medication_created,
        })
    }
}
