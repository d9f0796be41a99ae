//! Medication catalogue models.

use serde::{Deserialize, Serialize};

/// Active ingredient of a medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ingredient {
    pub id: i64,
    pub name_en: String,
    pub name_he: Option<String>,
}

/// A medication in the pharmacy catalogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    /// Row ID
    pub id: i64,
    /// English display name
    pub name_en: String,
    /// Hebrew display name
    pub name_he: Option<String>,
    pub description_en: Option<String>,
    pub description_he: Option<String>,
    /// Price of one monthly pack
    pub price: Option<f64>,
    /// Whether dispensing needs an active prescription
    pub requires_prescription: bool,
    /// Creation timestamp
    pub created_at: String,
    /// Populated only by lookups that join ingredients
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

impl Medication {
    /// Create a new medication with required fields. The ID is assigned on insert.
    pub fn new(name_en: impl Into<String>) -> Self {
        Self {
            id: 0,
            name_en: name_en.into(),
            name_he: None,
            description_en: None,
            description_he: None,
            price: None,
            requires_prescription: false,
            created_at: chrono::Utc::now().to_rfc3339(),
            ingredients: Vec::new(),
        }
    }

    /// Price of one pack, treating a missing price as free.
    pub fn unit_price(&self) -> f64 {
        self.price.unwrap_or(0.0)
    }

    /// Check whether `name` matches either display name, ignoring case.
    pub fn matches_name(&self, name: &str) -> bool {
        let wanted = name.trim().to_lowercase();
        self.name_en.to_lowercase() == wanted
            || self
                .name_he
                .as_ref()
                .is_some_and(|he| he.to_lowercase() == wanted)
    }
}

/// Dosing guidance for one strength of a medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DosageInstruction {
    pub medication_id: i64,
    /// Strength label, e.g. "500mg"
    pub dosage: String,
    pub adult_dose: Option<String>,
    pub child_dose: Option<String>,
    pub frequency: Option<String>,
    pub max_daily: Option<String>,
    pub instructions: Option<String>,
    pub warnings: Option<String>,
}

impl DosageInstruction {
    /// Create an empty instruction for a medication strength.
    pub fn new(medication_id: i64, dosage: impl Into<String>) -> Self {
        Self {
            medication_id,
            dosage: dosage.into(),
            adult_dose: None,
            child_dose: None,
            frequency: None,
            max_daily: None,
            instructions: None,
            warnings: None,
        }
    }

    /// One-line usage note for a reservation receipt.
    ///
    /// Returns `None` when the instruction carries nothing worth showing.
    pub fn usage_note(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(dose) = &self.adult_dose {
            parts.push(format!("Adults: {}", dose));
        }
        if let Some(freq) = &self.frequency {
            parts.push(freq.clone());
        }
        if let Some(max) = &self.max_daily {
            parts.push(format!("max {} per day", max));
        }
        if let Some(text) = &self.instructions {
            parts.push(text.clone());
        }
        if let Some(warn) = &self.warnings {
            parts.push(format!("Warning: {}", warn));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}
