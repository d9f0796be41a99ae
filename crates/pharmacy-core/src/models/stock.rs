//! Warehouse stock models.

use serde::{Deserialize, Serialize};

/// Comparison key for strength labels: case and whitespace are not significant.
pub fn dosage_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Stock level of one strength of a medication, counted in monthly packs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stock {
    pub id: i64,
    pub medication_id: i64,
    /// Strength label, e.g. "20mg"
    pub dosage: String,
    /// Packs on hand, never negative
    pub quantity: i64,
    pub updated_at: String,
}

impl Stock {
    /// Create a new stock row. The ID is assigned on insert.
    pub fn new(medication_id: i64, dosage: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: 0,
            medication_id,
            dosage: dosage.into(),
            quantity,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Packs left once `claimed` packs are promised elsewhere.
    pub fn remaining_after(&self, claimed: i64) -> i64 {
        self.quantity.saturating_sub(claimed).max(0)
    }
}

/// Result of checking stock for a medication and optional strength.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StockAvailability {
    pub medication_id: i64,
    pub requested_dosage: Option<String>,
    /// Row for the requested strength, if stocked
    pub exact_match: Option<Stock>,
    /// Quantity of the exact match, or of all strengths when none was requested
    pub available_quantity: i64,
    /// Other strengths of the same medication
    pub alternatives: Vec<Stock>,
}

impl StockAvailability {
    /// Exact strength found and not sold out.
    pub fn has_exact_match(&self) -> bool {
        self.exact_match.is_some() && self.available_quantity > 0
    }

    pub fn has_alternatives(&self) -> bool {
        !self.alternatives.is_empty()
    }

    /// Build the availability summary from every stock row of a medication.
    pub fn from_rows(medication_id: i64, dosage: Option<&str>, rows: Vec<Stock>) -> Self {
        let mut result = Self {
            medication_id,
            requested_dosage: dosage.map(str::to_string),
            ..Self::default()
        };

        match dosage {
            Some(wanted) => {
                let wanted = dosage_key(wanted);
                for row in rows {
                    if dosage_key(&row.dosage) == wanted {
                        result.available_quantity = row.quantity;
                        result.exact_match = Some(row);
                    } else {
                        result.alternatives.push(row);
                    }
                }
            }
            None => {
                result.available_quantity = rows.iter().map(|s| s.quantity).sum();
                result.alternatives = rows;
            }
        }

        result
    }
}
