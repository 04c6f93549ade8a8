//! Supply report storage and the latest-flag invariant.
//!
//! For each (provider, NDC) pair exactly one report, the newest by
//! `last_modified` with ties broken by id, carries `latest = 1`. Every write
//! path refreshes the flag for the affected pair inside the same transaction.

use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};

use super::{Database, DbError, DbResult};
use crate::aggregation::SupplyCounts;
use crate::filters::{GeoScope, SupplyFilter, WhereClause};
use crate::models::{supply_to_level, DrugType, SupplyReport};

const REPORT_COLUMNS: &str =
    "id, provider_id, medication_ndc_id, supply, level, creation_date, last_modified, latest";

/// Joined relation every filtered supply query starts from.
pub(crate) const SUPPLY_FROM: &str = r#"
    FROM supply_reports r
    JOIN medication_ndcs d ON d.id = r.medication_ndc_id
    JOIN medications m ON m.id = d.medication_id
    JOIN providers p ON p.id = r.provider_id
    LEFT JOIN zipcodes z ON z.id = p.related_zipcode_id
"#;

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<SupplyReport> {
    Ok(SupplyReport {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        medication_ndc_id: row.get(2)?,
        supply: row.get(3)?,
        level: row.get(4)?,
        creation_date: row.get(5)?,
        last_modified: row.get(6)?,
        latest: row.get(7)?,
    })
}

/// Geographic unit reports are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    State,
    County,
    ZipCode,
    Provider,
}

impl GroupBy {
    fn key_column(&self) -> &'static str {
        match self {
            GroupBy::State => "z.state_id",
            GroupBy::County => "zc.county_id",
            GroupBy::ZipCode => "p.related_zipcode_id",
            GroupBy::Provider => "p.id",
        }
    }

    fn extra_join(&self) -> &'static str {
        match self {
            GroupBy::County => "JOIN zipcode_counties zc ON zc.zipcode_id = p.related_zipcode_id",
            _ => "",
        }
    }
}

/// Supply tally for one geographic unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupTally {
    pub counts: SupplyCounts,
    /// Distinct providers contributing reports
    pub providers: usize,
}

/// One report level with the day and formulation it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyLevel {
    pub medication_id: i64,
    pub medication: String,
    /// `YYYY-MM-DD` of the report's creation
    pub day: String,
    pub level: u8,
}

/// Latest report level of one formulation at one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDrugLevel {
    pub provider_id: i64,
    pub medication_id: i64,
    pub medication: String,
    pub medication_name: String,
    pub drug_type: DrugType,
    pub level: u8,
}

impl Database {
    /// Insert a supply report and refresh the latest flag of its pair.
    ///
    /// The level is always recomputed from the supply string.
    pub fn insert_supply_report(&self, report: &SupplyReport) -> DbResult<i64> {
        let ndc_id = report.medication_ndc_id.ok_or_else(|| {
            DbError::Constraint("Medication NDC object must be provided".into())
        })?;
        self.in_transaction(|db| {
            db.conn.execute(
                r#"
                INSERT INTO supply_reports (
                    provider_id, medication_ndc_id, supply, level,
                    creation_date, last_modified, latest
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                "#,
                params![
                    report.provider_id,
                    ndc_id,
                    report.supply,
                    supply_to_level(&report.supply),
                    report.creation_date,
                    report.last_modified,
                ],
            )?;
            let id = db.conn.last_insert_rowid();
            db.refresh_latest_for_pair(report.provider_id, ndc_id)?;
            Ok(id)
        })
    }

    /// Change the supply of an existing report, stamping `last_modified`.
    pub fn update_supply_report(&self, id: i64, supply: &str, at: &str) -> DbResult<bool> {
        self.in_transaction(|db| {
            let Some(report) = db.get_supply_report(id)? else {
                return Ok(false);
            };
            db.conn.execute(
                "UPDATE supply_reports SET supply = ?2, level = ?3, last_modified = ?4 WHERE id = ?1",
                params![id, supply, supply_to_level(supply), at],
            )?;
            if let Some(ndc_id) = report.medication_ndc_id {
                db.refresh_latest_for_pair(report.provider_id, ndc_id)?;
            }
            Ok(true)
        })
    }

    /// Delete a report; a sibling takes over the latest flag.
    pub fn delete_supply_report(&self, id: i64) -> DbResult<bool> {
        self.in_transaction(|db| {
            let Some(report) = db.get_supply_report(id)? else {
                return Ok(false);
            };
            db.conn
                .execute("DELETE FROM supply_reports WHERE id = ?", [id])?;
            if let Some(ndc_id) = report.medication_ndc_id {
                db.refresh_latest_for_pair(report.provider_id, ndc_id)?;
            }
            Ok(true)
        })
    }

    fn refresh_latest_for_pair(&self, provider_id: i64, ndc_id: i64) -> DbResult<()> {
        self.conn.execute(
            r#"
            UPDATE supply_reports
            SET latest = (id = (
                SELECT id FROM supply_reports
                WHERE provider_id = ?1 AND medication_ndc_id = ?2
                ORDER BY last_modified DESC, id DESC
                LIMIT 1
            ))
            WHERE provider_id = ?1 AND medication_ndc_id = ?2
            "#,
            params![provider_id, ndc_id],
        )?;
        Ok(())
    }

    /// Recompute the latest flag for every pair. Returns the number of
    /// latest rows afterwards.
    pub fn rebuild_latest_flags(&self) -> DbResult<usize> {
        self.in_transaction(|db| {
            db.conn.execute(
                r#"
                UPDATE supply_reports
                SET latest = (id = (
                    SELECT s.id FROM supply_reports s
                    WHERE s.provider_id = supply_reports.provider_id
                      AND s.medication_ndc_id = supply_reports.medication_ndc_id
                    ORDER BY s.last_modified DESC, s.id DESC
                    LIMIT 1
                ))
                "#,
                [],
            )?;
            let latest: i64 = db.conn.query_row(
                "SELECT COUNT(*) FROM supply_reports WHERE latest = 1",
                [],
                |row| row.get(0),
            )?;
            Ok(latest as usize)
        })
    }

    pub fn get_supply_report(&self, id: i64) -> DbResult<Option<SupplyReport>> {
        let sql = format!("SELECT {} FROM supply_reports WHERE id = ?", REPORT_COLUMNS);
        self.conn
            .query_row(&sql, [id], report_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Reports of one pair, oldest first.
    pub fn list_reports_for_pair(&self, provider_id: i64, ndc_id: i64) -> DbResult<Vec<SupplyReport>> {
        let sql = format!(
            "SELECT {} FROM supply_reports WHERE provider_id = ?1 AND medication_ndc_id = ?2 \
             ORDER BY last_modified, id",
            REPORT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![provider_id, ndc_id], report_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // =========================================================================
    // Filtered queries
    // =========================================================================

    /// Tally report levels per geographic unit.
    ///
    /// Reports whose provider has no unit for `group` (e.g. no related
    /// zipcode) are left out.
    pub fn tally_levels(
        &self,
        group: GroupBy,
        filter: &SupplyFilter,
        scope: &GeoScope,
    ) -> DbResult<BTreeMap<i64, GroupTally>> {
        let mut clause = WhereClause::default();
        filter.push_sql(&mut clause);
        scope.push_sql(&mut clause);
        clause.push(&format!("{} IS NOT NULL", group.key_column()), []);

        let sql = format!(
            "SELECT {}, p.id, r.level {} {}{}",
            group.key_column(),
            SUPPLY_FROM,
            group.extra_join(),
            clause.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(clause.values.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, u8>(2)?,
            ))
        })?;

        let mut counts: BTreeMap<i64, (SupplyCounts, BTreeSet<i64>)> = BTreeMap::new();
        for row in rows {
            let (key, provider_id, level) = row?;
            let entry = counts.entry(key).or_default();
            entry.0.add(level);
            entry.1.insert(provider_id);
        }
        Ok(counts
            .into_iter()
            .map(|(key, (counts, providers))| {
                (
                    key,
                    GroupTally {
                        counts,
                        providers: providers.len(),
                    },
                )
            })
            .collect())
    }

    /// Levels with their creation day and formulation, for daily series.
    pub fn daily_levels(&self, filter: &SupplyFilter, scope: &GeoScope) -> DbResult<Vec<DailyLevel>> {
        let mut clause = WhereClause::default();
        filter.push_sql(&mut clause);
        scope.push_sql(&mut clause);

        let sql = format!(
            "SELECT m.id, m.name, substr(r.creation_date, 1, 10), r.level {}{} \
             ORDER BY r.creation_date, r.id",
            SUPPLY_FROM,
            clause.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(clause.values.iter()), |row| {
            Ok(DailyLevel {
                medication_id: row.get(0)?,
                medication: row.get(1)?,
                day: row.get(2)?,
                level: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Per-formulation levels at the given providers.
    pub fn provider_drug_levels(
        &self,
        provider_ids: &[i64],
        filter: &SupplyFilter,
    ) -> DbResult<Vec<ProviderDrugLevel>> {
        if provider_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut clause = WhereClause::default();
        filter.push_sql(&mut clause);
        clause.push_in(
            "p.id",
            provider_ids.iter().map(|id| rusqlite::types::Value::Integer(*id)),
        );

        let sql = format!(
            "SELECT p.id, m.id, m.name, COALESCE(n.name, ''), m.drug_type, r.level {} \
             LEFT JOIN medication_names n ON n.id = m.medication_name_id{} \
             ORDER BY p.id, m.id",
            SUPPLY_FROM,
            clause.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(clause.values.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, u8>(5)?,
            ))
        })?;

        let mut levels = Vec::new();
        for row in rows {
            let (provider_id, medication_id, medication, medication_name, drug_type, level) = row?;
            let drug_type = DrugType::from_code(&drug_type)
                .ok_or_else(|| DbError::Constraint(format!("Unknown drug type: {}", drug_type)))?;
            levels.push(ProviderDrugLevel {
                provider_id,
                medication_id,
                medication,
                medication_name,
                drug_type,
                level,
            });
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrugType, Provider, State, ZipCode};

    struct Fixture {
        db: Database,
        provider_id: i64,
        ndc_id: i64,
        name_id: i64,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let state_id = db.insert_state(&State::new("MO", "Missouri")).unwrap();
        let zip_id = db.insert_zipcode(&ZipCode::new("65619", state_id)).unwrap();
        let mut provider = Provider::new(1, "1 Main St", "Springfield", "MO", "65619");
        provider.related_zipcode_id = Some(zip_id);
        let provider_id = db.insert_provider(&provider).unwrap();

        let name_id = db.insert_medication_name("Oseltamivir").unwrap();
        let resolution = db
            .get_or_create_ndc("0002-1433-80", "Tamiflu 75mg", DrugType::Brand)
            .unwrap();
        db.assign_medication_name(resolution.medication_id.unwrap(), name_id)
            .unwrap();
        Fixture {
            db,
            provider_id,
            ndc_id: resolution.ndc_id,
            name_id,
        }
    }

    fn latest_ids(f: &Fixture) -> Vec<i64> {
        f.db.list_reports_for_pair(f.provider_id, f.ndc_id)
            .unwrap()
            .into_iter()
            .filter(|r| r.latest)
            .map(|r| r.id)
            .collect()
    }

    #[test]
    fn test_missing_ndc_is_integrity_error() {
        let f = setup();
        let mut report = SupplyReport::new(f.provider_id, f.ndc_id, "<24");
        report.medication_ndc_id = None;
        let err = f.db.insert_supply_report(&report).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Constraint violation: Medication NDC object must be provided"
        );
    }

    #[test]
    fn test_newest_report_is_latest() {
        let f = setup();
        let first = f
            .db
            .insert_supply_report(
                &SupplyReport::new(f.provider_id, f.ndc_id, "<24").at("2020-03-01T10:00:00Z"),
            )
            .unwrap();
        assert_eq!(latest_ids(&f), vec![first]);

        let second = f
            .db
            .insert_supply_report(
                &SupplyReport::new(f.provider_id, f.ndc_id, ">48").at("2020-03-02T10:00:00Z"),
            )
            .unwrap();
        assert_eq!(latest_ids(&f), vec![second]);

        // A backfilled older report does not steal the flag
        f.db.insert_supply_report(
            &SupplyReport::new(f.provider_id, f.ndc_id, "24").at("2020-02-01T10:00:00Z"),
        )
        .unwrap();
        assert_eq!(latest_ids(&f), vec![second]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let f = setup();
        let at = "2020-03-01T10:00:00Z";
        f.db.insert_supply_report(&SupplyReport::new(f.provider_id, f.ndc_id, "<24").at(at))
            .unwrap();
        let second = f
            .db
            .insert_supply_report(&SupplyReport::new(f.provider_id, f.ndc_id, "24").at(at))
            .unwrap();
        assert_eq!(latest_ids(&f), vec![second]);
    }

    #[test]
    fn test_level_recomputed_on_insert() {
        let f = setup();
        let mut report = SupplyReport::new(f.provider_id, f.ndc_id, ">48");
        report.level = 0;
        let id = f.db.insert_supply_report(&report).unwrap();
        assert_eq!(f.db.get_supply_report(id).unwrap().unwrap().level, 4);
    }

    #[test]
    fn test_update_and_delete_move_flag() {
        let f = setup();
        let old = f
            .db
            .insert_supply_report(
                &SupplyReport::new(f.provider_id, f.ndc_id, "<24").at("2020-03-01T10:00:00Z"),
            )
            .unwrap();
        let new = f
            .db
            .insert_supply_report(
                &SupplyReport::new(f.provider_id, f.ndc_id, "24").at("2020-03-02T10:00:00Z"),
            )
            .unwrap();

        assert!(f
            .db
            .update_supply_report(old, "24-48", "2020-03-03T10:00:00Z")
            .unwrap());
        assert_eq!(latest_ids(&f), vec![old]);
        assert_eq!(f.db.get_supply_report(old).unwrap().unwrap().level, 3);

        assert!(f.db.delete_supply_report(old).unwrap());
        assert_eq!(latest_ids(&f), vec![new]);
        assert!(!f.db.delete_supply_report(old).unwrap());
    }

    #[test]
    fn test_rebuild_repairs_flags() {
        let f = setup();
        for (i, supply) in ["<24", "24", ">48"].iter().enumerate() {
            f.db.insert_supply_report(
                &SupplyReport::new(f.provider_id, f.ndc_id, *supply)
                    .at(format!("2020-03-0{}T10:00:00Z", i + 1)),
            )
            .unwrap();
        }
        f.db.conn()
            .execute("UPDATE supply_reports SET latest = 1", [])
            .unwrap();

        assert_eq!(f.db.rebuild_latest_flags().unwrap(), 1);
        let reports = f.db.list_reports_for_pair(f.provider_id, f.ndc_id).unwrap();
        assert!(reports.last().unwrap().latest);
    }

    #[test]
    fn test_tally_by_state_uses_latest_only() {
        let f = setup();
        f.db.insert_supply_report(
            &SupplyReport::new(f.provider_id, f.ndc_id, "<24").at("2020-03-01T10:00:00Z"),
        )
        .unwrap();
        f.db.insert_supply_report(
            &SupplyReport::new(f.provider_id, f.ndc_id, ">48").at("2020-03-02T10:00:00Z"),
        )
        .unwrap();

        let tallies = f
            .db
            .tally_levels(
                GroupBy::State,
                &SupplyFilter::for_medication_name(f.name_id),
                &GeoScope::National,
            )
            .unwrap();
        assert_eq!(tallies.len(), 1);
        let tally = tallies.values().next().unwrap();
        assert_eq!(tally.counts.high, 1);
        assert_eq!(tally.counts.total(), 1);
        assert_eq!(tally.providers, 1);
    }

    #[test]
    fn test_daily_levels_include_history() {
        let f = setup();
        f.db.insert_supply_report(
            &SupplyReport::new(f.provider_id, f.ndc_id, "<24").at("2020-03-01T10:00:00Z"),
        )
        .unwrap();
        f.db.insert_supply_report(
            &SupplyReport::new(f.provider_id, f.ndc_id, ">48").at("2020-03-02T23:59:59Z"),
        )
        .unwrap();

        let range = crate::filters::DateRange::parse("2020-03-01", "2020-03-02").unwrap();
        let filter = SupplyFilter::for_medication_name(f.name_id).with_range(&range);
        let levels = f.db.daily_levels(&filter, &GeoScope::National).unwrap();
        let days: Vec<_> = levels.iter().map(|l| l.day.as_str()).collect();
        assert_eq!(days, vec!["2020-03-01", "2020-03-02"]);
        assert_eq!(levels[0].medication, "Tamiflu 75mg");
    }

    #[test]
    fn test_provider_drug_levels() {
        let f = setup();
        f.db.insert_supply_report(&SupplyReport::new(f.provider_id, f.ndc_id, "24"))
            .unwrap();
        let levels = f
            .db
            .provider_drug_levels(&[f.provider_id], &SupplyFilter::for_medication_name(f.name_id))
            .unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].medication_name, "Oseltamivir");
        assert_eq!(levels[0].drug_type, DrugType::Brand);
        assert_eq!(levels[0].level, 2);

        assert!(f
            .db
            .provider_drug_levels(&[], &SupplyFilter::default())
            .unwrap()
            .is_empty());
    }
}
