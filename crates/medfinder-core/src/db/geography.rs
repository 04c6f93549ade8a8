//! State, county and zipcode database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{geometry_from_column, geometry_to_column, Database, DbError, DbResult};
use crate::models::{is_valid_state, is_valid_zip, slugify, County, State, ZipCode};

const STATE_COLUMNS: &str =
    "id, state_code, state_name, state_us_id, population, geometry, active_provider_count";
const COUNTY_COLUMNS: &str = "id, county_name, county_name_slug, state_id, county_id, geo_id, \
                              population, geometry, active_provider_count";
const ZIPCODE_COLUMNS: &str =
    "id, zipcode, state_id, population, geometry, active_provider_count";

/// Intermediate row struct for database mapping.
struct StateRow {
    id: i64,
    state_code: String,
    state_name: String,
    state_us_id: Option<i64>,
    population: Option<i64>,
    geometry: Option<String>,
    active_provider_count: i64,
}

impl StateRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            state_code: row.get(1)?,
            state_name: row.get(2)?,
            state_us_id: row.get(3)?,
            population: row.get(4)?,
            geometry: row.get(5)?,
            active_provider_count: row.get(6)?,
        })
    }
}

impl TryFrom<StateRow> for State {
    type Error = DbError;

    fn try_from(row: StateRow) -> Result<Self, Self::Error> {
        Ok(State {
            id: row.id,
            state_code: row.state_code,
            state_name: row.state_name,
            state_us_id: row.state_us_id,
            population: row.population,
            geometry: geometry_from_column(row.geometry)?,
            active_provider_count: row.active_provider_count,
        })
    }
}

/// Intermediate row struct for database mapping.
struct CountyRow {
    id: i64,
    county_name: String,
    county_name_slug: String,
    state_id: i64,
    county_id: Option<i64>,
    geo_id: Option<i64>,
    population: Option<i64>,
    geometry: Option<String>,
    active_provider_count: i64,
}

impl CountyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            county_name: row.get(1)?,
            county_name_slug: row.get(2)?,
            state_id: row.get(3)?,
            county_id: row.get(4)?,
            geo_id: row.get(5)?,
            population: row.get(6)?,
            geometry: row.get(7)?,
            active_provider_count: row.get(8)?,
        })
    }
}

impl TryFrom<CountyRow> for County {
    type Error = DbError;

    fn try_from(row: CountyRow) -> Result<Self, Self::Error> {
        Ok(County {
            id: row.id,
            county_name: row.county_name,
            county_name_slug: row.county_name_slug,
            state_id: row.state_id,
            county_id: row.county_id,
            geo_id: row.geo_id,
            population: row.population,
            geometry: geometry_from_column(row.geometry)?,
            active_provider_count: row.active_provider_count,
        })
    }
}

/// Intermediate row struct for database mapping.
struct ZipCodeRow {
    id: i64,
    zipcode: String,
    state_id: i64,
    population: Option<i64>,
    geometry: Option<String>,
    active_provider_count: i64,
}

impl ZipCodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            zipcode: row.get(1)?,
            state_id: row.get(2)?,
            population: row.get(3)?,
            geometry: row.get(4)?,
            active_provider_count: row.get(5)?,
        })
    }
}

impl TryFrom<ZipCodeRow> for ZipCode {
    type Error = DbError;

    fn try_from(row: ZipCodeRow) -> Result<Self, Self::Error> {
        Ok(ZipCode {
            id: row.id,
            zipcode: row.zipcode,
            state_id: row.state_id,
            population: row.population,
            geometry: geometry_from_column(row.geometry)?,
            active_provider_count: row.active_provider_count,
        })
    }
}

impl Database {
    // =========================================================================
    // States
    // =========================================================================

    /// Insert a state, returning its id.
    pub fn insert_state(&self, state: &State) -> DbResult<i64> {
        if !is_valid_state(&state.state_code) {
            return Err(DbError::Validation(
                "The selected state is not a US state.".into(),
            ));
        }
        self.conn.execute(
            r#"
            INSERT INTO states (state_code, state_name, state_us_id, population, geometry)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                state.state_code,
                state.state_name,
                state.state_us_id,
                state.population,
                geometry_to_column(&state.geometry)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a state by id.
    pub fn get_state(&self, id: i64) -> DbResult<Option<State>> {
        let sql = format!("SELECT {} FROM states WHERE id = ?", STATE_COLUMNS);
        self.conn
            .query_row(&sql, [id], StateRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a state by its USPS code.
    pub fn get_state_by_code(&self, state_code: &str) -> DbResult<Option<State>> {
        let sql = format!(
            "SELECT {} FROM states WHERE state_code = ? ORDER BY id LIMIT 1",
            STATE_COLUMNS
        );
        self.conn
            .query_row(&sql, [state_code], StateRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all states ordered by name.
    pub fn list_states(&self) -> DbResult<Vec<State>> {
        let sql = format!("SELECT {} FROM states ORDER BY state_name", STATE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], StateRow::from_row)?;

        let mut states = Vec::new();
        for row in rows {
            states.push(row?.try_into()?);
        }
        Ok(states)
    }

    // =========================================================================
    // Counties
    // =========================================================================

    /// Insert a county; an empty slug is derived from the name.
    pub fn insert_county(&self, county: &County) -> DbResult<i64> {
        let slug = if county.county_name_slug.is_empty() {
            slugify(&county.county_name)
        } else {
            county.county_name_slug.clone()
        };
        self.conn.execute(
            r#"
            INSERT INTO counties (
                county_name, county_name_slug, state_id, county_id, geo_id, population, geometry
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                county.county_name,
                slug,
                county.state_id,
                county.county_id,
                county.geo_id,
                county.population,
                geometry_to_column(&county.geometry)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a county by id.
    pub fn get_county(&self, id: i64) -> DbResult<Option<County>> {
        let sql = format!("SELECT {} FROM counties WHERE id = ?", COUNTY_COLUMNS);
        self.conn
            .query_row(&sql, [id], CountyRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List counties of a state ordered by name.
    pub fn list_counties(&self, state_id: i64) -> DbResult<Vec<County>> {
        let sql = format!(
            "SELECT {} FROM counties WHERE state_id = ? ORDER BY county_name",
            COUNTY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([state_id], CountyRow::from_row)?;

        let mut counties = Vec::new();
        for row in rows {
            counties.push(row?.try_into()?);
        }
        Ok(counties)
    }

    // =========================================================================
    // Zipcodes
    // =========================================================================

    /// Insert a zipcode, returning its id.
    pub fn insert_zipcode(&self, zipcode: &ZipCode) -> DbResult<i64> {
        if !is_valid_zip(&zipcode.zipcode) {
            return Err(DbError::Validation(
                "The used code is not a US zip code.".into(),
            ));
        }
        self.conn.execute(
            r#"
            INSERT INTO zipcodes (zipcode, state_id, population, geometry)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                zipcode.zipcode,
                zipcode.state_id,
                zipcode.population,
                geometry_to_column(&zipcode.geometry)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a zipcode row by id.
    pub fn get_zipcode(&self, id: i64) -> DbResult<Option<ZipCode>> {
        let sql = format!("SELECT {} FROM zipcodes WHERE id = ?", ZIPCODE_COLUMNS);
        self.conn
            .query_row(&sql, [id], ZipCodeRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// First zipcode row with this code.
    pub fn get_zipcode_by_code(&self, zipcode: &str) -> DbResult<Option<ZipCode>> {
        let sql = format!(
            "SELECT {} FROM zipcodes WHERE zipcode = ? ORDER BY id LIMIT 1",
            ZIPCODE_COLUMNS
        );
        self.conn
            .query_row(&sql, [zipcode], ZipCodeRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Zipcode with this code inside the state with this USPS code.
    ///
    /// Several rows can match when a zipcode was imported twice; the first
    /// one wins.
    pub fn find_zipcode_in_state(&self, zipcode: &str, state_code: &str) -> DbResult<Option<ZipCode>> {
        let columns = ZIPCODE_COLUMNS
            .split(", ")
            .map(|c| format!("z.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {}
            FROM zipcodes z
            JOIN states s ON s.id = z.state_id
            WHERE z.zipcode = ?1 AND s.state_code = ?2
            ORDER BY z.id
            LIMIT 1
            "#,
            columns
        );
        self.conn
            .query_row(&sql, params![zipcode, state_code], ZipCodeRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Whether a zipcode code exists inside a given state.
    pub fn zipcode_in_state(&self, zipcode: &str, state_id: i64) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM zipcodes WHERE zipcode = ?1 AND state_id = ?2",
            params![zipcode, state_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Relate a zipcode to a county (many-to-many).
    pub fn link_zipcode_county(&self, zipcode_id: i64, county_id: i64) -> DbResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO zipcode_counties (zipcode_id, county_id) VALUES (?1, ?2)",
            params![zipcode_id, county_id],
        )?;
        Ok(())
    }

    /// Counties a zipcode belongs to.
    pub fn counties_for_zipcode(&self, zipcode_id: i64) -> DbResult<Vec<County>> {
        let columns = COUNTY_COLUMNS
            .split(", ")
            .map(|c| format!("c.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {}
            FROM counties c
            JOIN zipcode_counties zc ON zc.county_id = c.id
            WHERE zc.zipcode_id = ?
            ORDER BY c.county_name
            "#,
            columns
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([zipcode_id], CountyRow::from_row)?;

        let mut counties = Vec::new();
        for row in rows {
            counties.push(row?.try_into()?);
        }
        Ok(counties)
    }

    /// Recount active providers for every state, county and zipcode.
    pub fn refresh_active_provider_counts(&self) -> DbResult<()> {
        self.conn.execute_batch(
            r#"
            UPDATE states SET active_provider_count = (
                SELECT COUNT(*) FROM providers p
                WHERE p.state = states.state_code AND p.active = 1
            );
            UPDATE zipcodes SET active_provider_count = (
                SELECT COUNT(*) FROM providers p
                WHERE p.related_zipcode_id = zipcodes.id AND p.active = 1
            );
            UPDATE counties SET active_provider_count = (
                SELECT COUNT(DISTINCT p.id) FROM providers p
                JOIN zipcode_counties zc ON zc.zipcode_id = p.related_zipcode_id
                WHERE zc.county_id = counties.id AND p.active = 1
            );
            "#,
        )?;
        Ok(())
    }
}
