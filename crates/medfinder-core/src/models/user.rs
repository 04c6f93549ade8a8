//! Users and their reporting permission level.

use serde::{Deserialize, Serialize};

/// Reporting scope granted to a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionLevel {
    #[serde(rename = "nl")]
    National,
    #[serde(rename = "sl")]
    State,
}

impl PermissionLevel {
    pub fn code(&self) -> &'static str {
        match self {
            PermissionLevel::National => "nl",
            PermissionLevel::State => "sl",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "nl" => Some(PermissionLevel::National),
            "sl" => Some(PermissionLevel::State),
            _ => None,
        }
    }
}

impl Default for PermissionLevel {
    fn default() -> Self {
        PermissionLevel::State
    }
}

/// An email-keyed user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    /// Always stored lower-cased
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub organization_id: Option<i64>,
    /// Role in the related organization
    pub role: String,
    pub permission_level: PermissionLevel,
    pub state_id: Option<i64>,
    pub is_active: bool,
    pub date_joined: String,
}

impl User {
    pub fn new(email: &str, permission_level: PermissionLevel) -> Self {
        Self {
            id: 0,
            email: email.trim().to_lowercase(),
            first_name: String::new(),
            last_name: String::new(),
            organization_id: None,
            role: String::new(),
            permission_level,
            state_id: None,
            is_active: true,
            date_joined: super::now_timestamp(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_national(&self) -> bool {
        self.permission_level == PermissionLevel::National
    }
}
