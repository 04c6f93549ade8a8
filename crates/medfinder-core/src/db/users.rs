//! User database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{PermissionLevel, User};

const USER_COLUMNS: &str = "id, email, first_name, last_name, organization_id, role, \
                            permission_level, state_id, is_active, date_joined";

/// Intermediate row struct for database mapping.
struct UserRow {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    organization_id: Option<i64>,
    role: String,
    permission_level: String,
    state_id: Option<i64>,
    is_active: bool,
    date_joined: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            organization_id: row.get(4)?,
            role: row.get(5)?,
            permission_level: row.get(6)?,
            state_id: row.get(7)?,
            is_active: row.get(8)?,
            date_joined: row.get(9)?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let permission_level = PermissionLevel::from_code(&row.permission_level).ok_or_else(|| {
            DbError::Constraint(format!("Unknown permission level: {}", row.permission_level))
        })?;
        Ok(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            organization_id: row.organization_id,
            role: row.role,
            permission_level,
            state_id: row.state_id,
            is_active: row.is_active,
            date_joined: row.date_joined,
        })
    }
}

impl Database {
    /// Insert a user; the email is lower-cased and must be unique.
    pub fn insert_user(&self, user: &User) -> DbResult<i64> {
        let email = user.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(DbError::Validation("The given email must be set".into()));
        }
        if self.get_user_by_email(&email)?.is_some() {
            return Err(DbError::Constraint(
                "A user with that email already exists.".into(),
            ));
        }
        self.conn.execute(
            r#"
            INSERT INTO users (
                email, first_name, last_name, organization_id, role,
                permission_level, state_id, is_active, date_joined
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                email,
                user.first_name,
                user.last_name,
                user.organization_id,
                user.role,
                user.permission_level.code(),
                user.state_id,
                user.is_active,
                user.date_joined,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get a user by id.
    pub fn get_user(&self, id: i64) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        self.conn
            .query_row(&sql, [id], UserRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a user by email, case-insensitively.
    pub fn get_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        self.conn
            .query_row(&sql, [email.trim().to_lowercase()], UserRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Change a user's permission level and state.
    pub fn update_user_scope(
        &self,
        id: i64,
        permission_level: PermissionLevel,
        state_id: Option<i64>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE users SET permission_level = ?2, state_id = ?3 WHERE id = ?1",
            params![id, permission_level.code(), state_id],
        )?;
        Ok(rows_affected > 0)
    }
}
