//! Reporting organizations.

use serde::{Deserialize, Serialize};

/// A pharmacy chain, clinic network or other reporting organization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: i64,
    pub organization_name: String,
    pub contact_name: String,
    pub phone: String,
    pub website: String,
    pub registration_date: String,
}

impl Organization {
    pub fn new(organization_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            organization_name: organization_name.into(),
            contact_name: String::new(),
            phone: String::new(),
            website: String::new(),
            registration_date: super::now_timestamp(),
        }
    }
}
