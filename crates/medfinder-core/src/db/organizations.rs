//! Organization database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::Organization;

const ORGANIZATION_COLUMNS: &str =
    "id, organization_name, contact_name, phone, website, registration_date";

fn organization_from_row(row: &Row<'_>) -> rusqlite::Result<Organization> {
    Ok(Organization {
        id: row.get(0)?,
        organization_name: row.get(1)?,
        contact_name: row.get(2)?,
        phone: row.get(3)?,
        website: row.get(4)?,
        registration_date: row.get(5)?,
    })
}

impl Database {
    /// Insert an organization, returning its id.
    pub fn insert_organization(&self, organization: &Organization) -> DbResult<i64> {
        if organization.organization_name.trim().is_empty() {
            return Err(DbError::Validation(
                "organization name must not be empty".into(),
            ));
        }
        self.conn.execute(
            r#"
            INSERT INTO organizations (
                organization_name, contact_name, phone, website, registration_date
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                organization.organization_name,
                organization.contact_name,
                organization.phone,
                organization.website,
                organization.registration_date,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update an existing organization.
    pub fn update_organization(&self, organization: &Organization) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE organizations SET
                organization_name = ?2,
                contact_name = ?3,
                phone = ?4,
                website = ?5
            WHERE id = ?1
            "#,
            params![
                organization.id,
                organization.organization_name,
                organization.contact_name,
                organization.phone,
                organization.website,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an organization by id.
    pub fn get_organization(&self, id: i64) -> DbResult<Option<Organization>> {
        let sql = format!(
            "SELECT {} FROM organizations WHERE id = ?",
            ORGANIZATION_COLUMNS
        );
        self.conn
            .query_row(&sql, [id], organization_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// List organizations ordered by name.
    pub fn list_organizations(&self) -> DbResult<Vec<Organization>> {
        let sql = format!(
            "SELECT {} FROM organizations ORDER BY organization_name",
            ORGANIZATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], organization_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete an organization; its providers keep existing without one.
    pub fn delete_organization(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM organizations WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}
