//! Role-scoped access.
//!
//! National users see every state. State users are pinned to the state on
//! their account, whatever scope they request.

use thiserror::Error;

use crate::db::{Database, DbError};
use crate::filters::GeoScope;
use crate::models::User;

pub const PERMISSION_DENIED: &str = "Permission denied - Please check with system administrator";
pub const NOT_NATIONAL: &str = "This user has not national level permission";

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("{0}")]
    PermissionDenied(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type AccessResult<T> = Result<T, AccessError>;

fn denied() -> AccessError {
    AccessError::PermissionDenied(PERMISSION_DENIED.to_string())
}

/// Restrict `requested` to what `user` may see.
///
/// A state user asking for the nation or another state gets their own state.
/// Asking for a county or zipcode outside their state is denied.
pub fn force_user_scope(db: &Database, user: &User, requested: GeoScope) -> AccessResult<GeoScope> {
    if user.is_national() {
        return Ok(requested);
    }
    let Some(own_state) = user.state_id else {
        tracing::warn!(user = %user.email, "State user without a state");
        return Err(denied());
    };

    match requested {
        GeoScope::National | GeoScope::State(_) => Ok(GeoScope::State(own_state)),
        GeoScope::County(county_id) => match db.get_county(county_id)? {
            Some(county) if county.state_id == own_state => Ok(GeoScope::County(county_id)),
            _ => Err(denied()),
        },
        GeoScope::ZipCode(code) => {
            if db.zipcode_in_state(&code, own_state)? {
                Ok(GeoScope::ZipCode(code))
            } else {
                Err(denied())
            }
        }
    }
}

/// Reject anyone without national permission.
pub fn require_national(user: &User) -> AccessResult<()> {
    if user.is_national() {
        Ok(())
    } else {
        Err(AccessError::PermissionDenied(NOT_NATIONAL.to_string()))
    }
}
