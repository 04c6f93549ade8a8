//! Epidemic flag operations.

use super::{Database, DbResult};
use crate::models::Epidemic;

impl Database {
    /// Current epidemic flag.
    pub fn get_epidemic(&self) -> DbResult<Epidemic> {
        let active: bool =
            self.conn
                .query_row("SELECT active FROM epidemic WHERE id = 1", [], |row| row.get(0))?;
        Ok(Epidemic { active })
    }

    /// Toggle the epidemic flag.
    pub fn set_epidemic_active(&self, active: bool) -> DbResult<()> {
        self.conn
            .execute("UPDATE epidemic SET active = ? WHERE id = 1", [active])?;
        tracing::info!(active, "Epidemic flag updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epidemic_defaults_inactive() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.get_epidemic().unwrap().active);
    }

    #[test]
    fn test_toggle() {
        let db = Database::open_in_memory().unwrap();
        db.set_epidemic_active(true).unwrap();
        assert!(db.get_epidemic().unwrap().active);
        db.set_epidemic_active(false).unwrap();
        assert!(!db.get_epidemic().unwrap().active);
    }
}
