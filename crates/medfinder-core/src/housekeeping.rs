//! Periodic maintenance jobs.
//!
//! Each job is a plain function over the database; the CLI runs them on
//! demand or from a scheduler.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::{Database, DbResult};
use crate::models::timestamp;

/// Outcome of a full housekeeping run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct HousekeepingReport {
    pub providers_deactivated: usize,
    pub providers_related: usize,
    pub exports_purged: usize,
    pub latest_reports: usize,
}

/// Deactivate providers that have not imported for `inactive_after_days`.
pub fn mark_inactive_providers(db: &Database, now: DateTime<Utc>, inactive_after_days: i64) -> DbResult<usize> {
    let cutoff = timestamp(now - Duration::days(inactive_after_days));
    let count = db.deactivate_providers_imported_before(&cutoff)?;
    if count > 0 {
        tracing::info!(count, cutoff = %cutoff, "Deactivated stale providers");
    }
    Ok(count)
}

/// Refresh cached active provider counts on geographic rows.
pub fn cache_provider_counts(db: &Database) -> DbResult<()> {
    db.refresh_active_provider_counts()?;
    tracing::debug!("Refreshed active provider counts");
    Ok(())
}

/// Delete expired export files and their records.
///
/// A file already gone from disk still has its record removed.
pub fn purge_expired_exports(db: &Database, now: DateTime<Utc>) -> DbResult<usize> {
    let expired = db.expired_export_files(&timestamp(now))?;
    let mut purged = 0;
    for file in expired {
        match std::fs::remove_file(&file.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %file.path, "Export file already removed");
            }
            Err(e) => {
                tracing::warn!(path = %file.path, error = %e, "Failed to remove export file");
                continue;
            }
        }
        if db.delete_export_file(&file.id)? {
            purged += 1;
        }
    }
    if purged > 0 {
        tracing::info!(purged, "Purged expired exports");
    }
    Ok(purged)
}

/// Recompute the latest flag of every report.
pub fn rebuild_latest_flags(db: &Database) -> DbResult<usize> {
    let latest = db.rebuild_latest_flags()?;
    tracing::info!(latest, "Rebuilt latest flags");
    Ok(latest)
}

/// Link providers without a zipcode to the matching zipcode row.
pub fn relate_providers_to_zipcodes(db: &Database) -> DbResult<usize> {
    db.in_transaction(|db| {
        let mut related = 0;
        for mut provider in db.providers_missing_zipcode()? {
            if db.relate_provider_zipcode(&mut provider)? {
                db.update_provider(&provider)?;
                related += 1;
            }
        }
        Ok(related)
    })
}

/// Run every job in order.
pub fn run_all(db: &Database, now: DateTime<Utc>, inactive_after_days: i64) -> DbResult<HousekeepingReport> {
    let providers_related = relate_providers_to_zipcodes(db)?;
    let providers_deactivated = mark_inactive_providers(db, now, inactive_after_days)?;
    cache_provider_counts(db)?;
    let exports_purged = purge_expired_exports(db, now)?;
    let latest_reports = rebuild_latest_flags(db)?;
    Ok(HousekeepingReport {
        providers_deactivated,
        providers_related,
        exports_purged,
        latest_reports,
    })
}
