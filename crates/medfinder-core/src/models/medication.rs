//! Drug taxonomy: medication names, formulations and NDC codes.

use serde::{Deserialize, Serialize};

/// Medication drug type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DrugType {
    #[serde(rename = "b")]
    Brand,
    #[serde(rename = "g")]
    Generic,
    #[serde(rename = "p")]
    PublicHealthSupply,
}

impl DrugType {
    pub const ALL: [DrugType; 3] = [
        DrugType::Brand,
        DrugType::Generic,
        DrugType::PublicHealthSupply,
    ];

    /// Single-character code stored in the database.
    pub fn code(&self) -> &'static str {
        match self {
            DrugType::Brand => "b",
            DrugType::Generic => "g",
            DrugType::PublicHealthSupply => "p",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "b" => Some(DrugType::Brand),
            "g" => Some(DrugType::Generic),
            "p" => Some(DrugType::PublicHealthSupply),
            _ => None,
        }
    }

    /// Human readable label.
    pub fn display(&self) -> &'static str {
        match self {
            DrugType::Brand => "Brand Drugs",
            DrugType::Generic => "Generic Drugs",
            DrugType::PublicHealthSupply => "Public Health Supply",
        }
    }
}

impl Default for DrugType {
    fn default() -> Self {
        DrugType::Brand
    }
}

/// Generic molecule name the public searches by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationName {
    pub id: i64,
    pub name: String,
}

/// A formulation of a medication name (e.g. "Amoxicillin 250mg capsule").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    pub medication_name_id: Option<i64>,
    pub drug_type: DrugType,
}

impl Medication {
    pub fn new(name: impl Into<String>, drug_type: DrugType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            medication_name_id: None,
            drug_type,
        }
    }
}

/// National Drug Code attached to a formulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationNdc {
    pub id: i64,
    pub medication_id: Option<i64>,
    pub ndc: String,
}

/// A medication name together with its formulations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationNameWithFormulations {
    pub id: i64,
    pub name: String,
    pub medications: Vec<Medication>,
}
