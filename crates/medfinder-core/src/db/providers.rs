//! Provider, provider type and provider category operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::geocoding::Geocoder;
use crate::models::{
    is_valid_state, is_valid_zip, Provider, ProviderCategory, ProviderSaveOptions, ProviderType,
};

pub(crate) const PROVIDER_COLUMNS: &str = "id, organization_id, store_number, name, type_id, \
    category_id, address, city, state, zip, related_zipcode_id, phone, website, email, \
    operating_hours, notes, insurance_accepted, walkins_accepted, home_delivery, \
    home_delivery_info_url, lat, lng, start_date, end_date, last_import_date, active";

/// Rectangle in degrees used to pre-filter providers before exact distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

pub(crate) fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<Provider> {
    Ok(Provider {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        store_number: row.get(2)?,
        name: row.get(3)?,
        type_id: row.get(4)?,
        category_id: row.get(5)?,
        address: row.get(6)?,
        city: row.get(7)?,
        state: row.get(8)?,
        zip: row.get(9)?,
        related_zipcode_id: row.get(10)?,
        phone: row.get(11)?,
        website: row.get(12)?,
        email: row.get(13)?,
        operating_hours: row.get(14)?,
        notes: row.get(15)?,
        insurance_accepted: row.get(16)?,
        walkins_accepted: row.get(17)?,
        home_delivery: row.get(18)?,
        home_delivery_info_url: row.get(19)?,
        lat: row.get(20)?,
        lng: row.get(21)?,
        start_date: row.get(22)?,
        end_date: row.get(23)?,
        last_import_date: row.get(24)?,
        active: row.get(25)?,
    })
}

fn validate_provider(provider: &Provider) -> DbResult<()> {
    if !is_valid_state(&provider.state) {
        return Err(DbError::Validation(format!(
            "{} is not a US state.",
            provider.state
        )));
    }
    if !is_valid_zip(&provider.zip) {
        return Err(DbError::Validation(format!(
            "{} is not a US zip code.",
            provider.zip
        )));
    }
    Ok(())
}

/// Empty emails are stored as NULL so the unique index ignores them.
fn email_column(provider: &Provider) -> Option<&str> {
    provider
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
}

fn map_unique_violation(err: rusqlite::Error) -> DbError {
    match &err {
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("email") =>
        {
            DbError::Constraint("A provider with that email already exists.".into())
        }
        _ => err.into(),
    }
}

impl Database {
    // =========================================================================
    // Providers
    // =========================================================================

    /// Insert a provider without geocoding, returning its id.
    pub fn insert_provider(&self, provider: &Provider) -> DbResult<i64> {
        validate_provider(provider)?;
        self.conn
            .execute(
                r#"
                INSERT INTO providers (
                    organization_id, store_number, name, type_id, category_id,
                    address, city, state, zip, related_zipcode_id, phone, website,
                    email, operating_hours, notes, insurance_accepted, walkins_accepted,
                    home_delivery, home_delivery_info_url, lat, lng, start_date,
                    end_date, last_import_date, active
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
                )
                "#,
                params![
                    provider.organization_id,
                    provider.store_number,
                    provider.name,
                    provider.type_id,
                    provider.category_id,
                    provider.address,
                    provider.city,
                    provider.state,
                    provider.zip,
                    provider.related_zipcode_id,
                    provider.phone,
                    provider.website,
                    email_column(provider),
                    provider.operating_hours,
                    provider.notes,
                    provider.insurance_accepted,
                    provider.walkins_accepted,
                    provider.home_delivery,
                    provider.home_delivery_info_url,
                    provider.lat,
                    provider.lng,
                    provider.start_date,
                    provider.end_date,
                    provider.last_import_date,
                    provider.active,
                ],
            )
            .map_err(map_unique_violation)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update every column of an existing provider.
    pub fn update_provider(&self, provider: &Provider) -> DbResult<bool> {
        validate_provider(provider)?;
        let rows_affected = self
            .conn
            .execute(
                r#"
                UPDATE providers SET
                    organization_id = ?2, store_number = ?3, name = ?4, type_id = ?5,
                    category_id = ?6, address = ?7, city = ?8, state = ?9, zip = ?10,
                    related_zipcode_id = ?11, phone = ?12, website = ?13, email = ?14,
                    operating_hours = ?15, notes = ?16, insurance_accepted = ?17,
                    walkins_accepted = ?18, home_delivery = ?19,
                    home_delivery_info_url = ?20, lat = ?21, lng = ?22,
                    start_date = ?23, end_date = ?24, last_import_date = ?25,
                    active = ?26
                WHERE id = ?1
                "#,
                params![
                    provider.id,
                    provider.organization_id,
                    provider.store_number,
                    provider.name,
                    provider.type_id,
                    provider.category_id,
                    provider.address,
                    provider.city,
                    provider.state,
                    provider.zip,
                    provider.related_zipcode_id,
                    provider.phone,
                    provider.website,
                    email_column(provider),
                    provider.operating_hours,
                    provider.notes,
                    provider.insurance_accepted,
                    provider.walkins_accepted,
                    provider.home_delivery,
                    provider.home_delivery_info_url,
                    provider.lat,
                    provider.lng,
                    provider.start_date,
                    provider.end_date,
                    provider.last_import_date,
                    provider.active,
                ],
            )
            .map_err(map_unique_violation)?;
        Ok(rows_affected > 0)
    }

    /// Save a provider, geocoding and relating it to a zipcode as requested.
    ///
    /// New providers are always geocoded. Geocoding failures are logged and
    /// leave the point empty; they never fail the save.
    pub fn save_provider(
        &self,
        provider: &mut Provider,
        options: ProviderSaveOptions,
        geocoder: Option<&dyn Geocoder>,
    ) -> DbResult<i64> {
        let is_new = provider.id == 0;
        if is_new || options.change_coordinates {
            if let Some(geocoder) = geocoder {
                let query = provider.geocoding_query();
                match geocoder.geocode(&query) {
                    Ok(Some(point)) => {
                        provider.lat = Some(point.lat);
                        provider.lng = Some(point.lng);
                    }
                    Ok(None) => {
                        tracing::warn!(query = %query, "Geocoder returned no result");
                        provider.lat = None;
                        provider.lng = None;
                    }
                    Err(e) => {
                        tracing::warn!(query = %query, error = %e, "Geocoding failed");
                        provider.lat = None;
                        provider.lng = None;
                    }
                }
            }
        }

        if options.relate_related_zipcode {
            self.relate_provider_zipcode(provider)?;
        }

        if is_new {
            provider.id = self.insert_provider(provider)?;
        } else if !self.update_provider(provider)? {
            return Err(DbError::NotFound(format!("provider {}", provider.id)));
        }
        Ok(provider.id)
    }

    /// Point `related_zipcode_id` at the zipcode matching the provider's zip.
    ///
    /// Returns whether a zipcode was found. The provider is not persisted.
    pub fn relate_provider_zipcode(&self, provider: &mut Provider) -> DbResult<bool> {
        match self.find_zipcode_in_state(provider.zip5(), &provider.state)? {
            Some(zipcode) => {
                provider.related_zipcode_id = Some(zipcode.id);
                Ok(true)
            }
            None => {
                tracing::debug!(
                    zip = %provider.zip,
                    state = %provider.state,
                    "No zipcode row for provider"
                );
                Ok(false)
            }
        }
    }

    /// Get a provider by id.
    pub fn get_provider(&self, id: i64) -> DbResult<Option<Provider>> {
        let sql = format!("SELECT {} FROM providers WHERE id = ?", PROVIDER_COLUMNS);
        self.conn
            .query_row(&sql, [id], provider_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Find the provider an organization registered under a store number.
    pub fn find_provider_by_store(
        &self,
        organization_id: Option<i64>,
        store_number: i64,
    ) -> DbResult<Option<Provider>> {
        let sql = format!(
            "SELECT {} FROM providers WHERE organization_id IS ?1 AND store_number = ?2 \
             ORDER BY id LIMIT 1",
            PROVIDER_COLUMNS
        );
        self.conn
            .query_row(&sql, params![organization_id, store_number], provider_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// List all providers ordered by id.
    pub fn list_providers(&self) -> DbResult<Vec<Provider>> {
        let sql = format!("SELECT {} FROM providers ORDER BY id", PROVIDER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], provider_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Providers linked to a zipcode row.
    pub fn list_providers_in_zipcode(&self, zipcode_id: i64, active_only: bool) -> DbResult<Vec<Provider>> {
        let sql = format!(
            "SELECT {} FROM providers WHERE related_zipcode_id = ?1 AND (?2 = 0 OR active = 1) \
             ORDER BY id",
            PROVIDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![zipcode_id, active_only], provider_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Active geocoded providers inside a bounding box.
    pub fn providers_in_bounds(&self, bounds: BoundingBox) -> DbResult<Vec<Provider>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM providers
            WHERE active = 1
              AND lat IS NOT NULL AND lng IS NOT NULL
              AND lat BETWEEN ?1 AND ?2
              AND lng BETWEEN ?3 AND ?4
            "#,
            PROVIDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![bounds.min_lat, bounds.max_lat, bounds.min_lng, bounds.max_lng],
            provider_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Providers not yet linked to a zipcode row.
    pub fn providers_missing_zipcode(&self) -> DbResult<Vec<Provider>> {
        let sql = format!(
            "SELECT {} FROM providers WHERE related_zipcode_id IS NULL ORDER BY id",
            PROVIDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], provider_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Record a fresh import for a provider and reactivate it.
    pub fn mark_provider_imported(&self, id: i64, at: &str) -> DbResult<()> {
        self.conn.execute(
            "UPDATE providers SET last_import_date = ?2, active = 1 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    }

    /// Deactivate active providers whose last import is older than `cutoff`.
    pub fn deactivate_providers_imported_before(&self, cutoff: &str) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "UPDATE providers SET active = 0 WHERE active = 1 AND last_import_date < ?",
            [cutoff],
        )?;
        Ok(rows_affected)
    }

    // =========================================================================
    // Provider types and categories
    // =========================================================================

    pub fn insert_provider_type(&self, code: &str, name: &str) -> DbResult<i64> {
        self.conn.execute(
            "INSERT INTO provider_types (code, name) VALUES (?1, ?2)",
            params![code, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_provider_types(&self) -> DbResult<Vec<ProviderType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, code, name FROM provider_types ORDER BY code, name")?;
        let rows = stmt.query_map([], |row| {
            Ok(ProviderType {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Find a provider type by name (case-insensitive) or create it.
    pub fn get_or_create_provider_type(&self, name: &str) -> DbResult<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM provider_types WHERE lower(name) = lower(?) ORDER BY id LIMIT 1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => Ok(id),
            None => self.insert_provider_type("00", name),
        }
    }

    pub fn insert_provider_category(&self, code: &str, name: &str) -> DbResult<i64> {
        self.conn.execute(
            "INSERT INTO provider_categories (code, name) VALUES (?1, ?2)",
            params![code, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_provider_categories(&self) -> DbResult<Vec<ProviderCategory>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, code, name FROM provider_categories ORDER BY code, name")?;
        let rows = stmt.query_map([], |row| {
            Ok(ProviderCategory {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Find a provider category by name (case-insensitive) or create it.
    pub fn get_or_create_provider_category(&self, name: &str) -> DbResult<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM provider_categories WHERE lower(name) = lower(?) ORDER BY id LIMIT 1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => Ok(id),
            None => self.insert_provider_category("00", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoding::{Coordinates, GeocodingError};
    use crate::models::{State, ZipCode};
    use std::sync::Mutex;

    struct FixedGeocoder {
        answer: Option<Coordinates>,
        queries: Mutex<Vec<String>>,
    }

    impl FixedGeocoder {
        fn new(answer: Option<Coordinates>) -> Self {
            Self {
                answer,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodingError> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.answer)
        }
    }

    struct FailingGeocoder;

    impl Geocoder for FailingGeocoder {
        fn geocode(&self, _query: &str) -> Result<Option<Coordinates>, GeocodingError> {
            Err(GeocodingError::Request("offline".into()))
        }
    }

    fn make_provider() -> Provider {
        Provider::new(42, "1 Main St", "Springfield", "MO", "65619-1234")
    }

    #[test]
    fn test_insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let mut provider = make_provider();
        provider.walkins_accepted = Some(true);
        provider.email = Some(String::new());
        let id = db.insert_provider(&provider).unwrap();

        let stored = db.get_provider(id).unwrap().unwrap();
        assert_eq!(stored.store_number, 42);
        assert_eq!(stored.walkins_accepted, Some(true));
        assert_eq!(stored.email, None);
        assert!(stored.active);
    }

    #[test]
    fn test_invalid_state_and_zip_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut provider = make_provider();
        provider.state = "XX".into();
        assert!(matches!(
            db.insert_provider(&provider),
            Err(DbError::Validation(_))
        ));

        let mut provider = make_provider();
        provider.zip = "6561".into();
        assert!(matches!(
            db.insert_provider(&provider),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut first = make_provider();
        first.email = Some("store@example.com".into());
        db.insert_provider(&first).unwrap();

        let mut second = make_provider();
        second.store_number = 43;
        second.email = Some("store@example.com".into());
        assert!(matches!(
            db.insert_provider(&second),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_save_new_provider_geocodes() {
        let db = Database::open_in_memory().unwrap();
        let geocoder = FixedGeocoder::new(Some(Coordinates {
            lat: 37.2,
            lng: -93.3,
        }));
        let mut provider = make_provider();

        let id = db
            .save_provider(&mut provider, ProviderSaveOptions::default(), Some(&geocoder))
            .unwrap();
        let stored = db.get_provider(id).unwrap().unwrap();
        assert_eq!(stored.point(), Some((-93.3, 37.2)));
        assert_eq!(
            geocoder.queries.lock().unwrap().as_slice(),
            ["1 Main St+Springfield+MO+United States"]
        );
    }

    #[test]
    fn test_save_existing_skips_geocoding_unless_requested() {
        let db = Database::open_in_memory().unwrap();
        let mut provider = make_provider();
        db.save_provider(&mut provider, ProviderSaveOptions::default(), None)
            .unwrap();

        let geocoder = FixedGeocoder::new(Some(Coordinates { lat: 1.0, lng: 2.0 }));
        db.save_provider(&mut provider, ProviderSaveOptions::default(), Some(&geocoder))
            .unwrap();
        assert!(geocoder.queries.lock().unwrap().is_empty());

        let options = ProviderSaveOptions {
            change_coordinates: true,
            ..Default::default()
        };
        db.save_provider(&mut provider, options, Some(&geocoder))
            .unwrap();
        assert_eq!(db.get_provider(provider.id).unwrap().unwrap().lat, Some(1.0));
    }

    #[test]
    fn test_geocoding_failure_leaves_point_empty() {
        let db = Database::open_in_memory().unwrap();
        let mut provider = make_provider();
        let id = db
            .save_provider(&mut provider, ProviderSaveOptions::default(), Some(&FailingGeocoder))
            .unwrap();
        assert_eq!(db.get_provider(id).unwrap().unwrap().point(), None);
    }

    #[test]
    fn test_save_relates_zipcode() {
        let db = Database::open_in_memory().unwrap();
        let state_id = db.insert_state(&State::new("MO", "Missouri")).unwrap();
        let zip_id = db.insert_zipcode(&ZipCode::new("65619", state_id)).unwrap();

        let mut provider = make_provider();
        let options = ProviderSaveOptions {
            relate_related_zipcode: true,
            ..Default::default()
        };
        db.save_provider(&mut provider, options, None).unwrap();
        assert_eq!(provider.related_zipcode_id, Some(zip_id));
        assert_eq!(
            db.list_providers_in_zipcode(zip_id, true).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_find_by_store() {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_provider(&make_provider()).unwrap();
        assert_eq!(
            db.find_provider_by_store(None, 42).unwrap().map(|p| p.id),
            Some(id)
        );
        assert!(db.find_provider_by_store(Some(1), 42).unwrap().is_none());
    }

    #[test]
    fn test_bounds_filter_skips_inactive_and_ungeocoded() {
        let db = Database::open_in_memory().unwrap();
        let mut inside = make_provider();
        inside.lat = Some(37.0);
        inside.lng = Some(-93.0);
        let inside_id = db.insert_provider(&inside).unwrap();

        let mut inactive = inside.clone();
        inactive.store_number = 2;
        inactive.active = false;
        db.insert_provider(&inactive).unwrap();

        let mut ungeocoded = make_provider();
        ungeocoded.store_number = 3;
        db.insert_provider(&ungeocoded).unwrap();

        let found = db
            .providers_in_bounds(BoundingBox {
                min_lat: 36.0,
                max_lat: 38.0,
                min_lng: -94.0,
                max_lng: -92.0,
            })
            .unwrap();
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![inside_id]);
    }

    #[test]
    fn test_deactivate_and_reimport() {
        let db = Database::open_in_memory().unwrap();
        let mut provider = make_provider();
        provider.last_import_date = "2020-01-01T00:00:00Z".into();
        let id = db.insert_provider(&provider).unwrap();

        assert_eq!(
            db.deactivate_providers_imported_before("2020-02-01T00:00:00Z")
                .unwrap(),
            1
        );
        assert!(!db.get_provider(id).unwrap().unwrap().active);

        db.mark_provider_imported(id, "2020-03-01T00:00:00Z").unwrap();
        let provider = db.get_provider(id).unwrap().unwrap();
        assert!(provider.active);
        assert_eq!(provider.last_import_date, "2020-03-01T00:00:00Z");
    }

    #[test]
    fn test_provider_type_get_or_create() {
        let db = Database::open_in_memory().unwrap();
        let id = db.get_or_create_provider_type("Community Pharmacy").unwrap();
        assert_eq!(
            db.get_or_create_provider_type("community pharmacy").unwrap(),
            id
        );
        assert_eq!(db.list_provider_types().unwrap()[0].code, "00");

        let cat = db.get_or_create_provider_category("Chain").unwrap();
        assert_eq!(db.get_or_create_provider_category("Chain").unwrap(), cat);
        assert_eq!(db.list_provider_categories().unwrap().len(), 1);
    }
}
