//! Reservation request, validated line and receipt models.

use serde::{Deserialize, Serialize};

use super::{Medication, Prescription, Stock};

/// One requested line: a medication strength and a number of monthly packs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationLineRequest {
    pub medication_name: String,
    /// Strength label as typed by the customer, e.g. "10mg"
    pub dosage: String,
    /// Packs requested, must be positive
    pub quantity: i64,
}

impl ReservationLineRequest {
    pub fn new(medication_name: impl Into<String>, dosage: impl Into<String>, quantity: i64) -> Self {
        Self {
            medication_name: medication_name.into(),
            dosage: dosage.into(),
            quantity,
        }
    }
}

/// A reservation batch submitted on behalf of one customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationRequest {
    /// Customer PIN
    pub user_identity: String,
    pub lines: Vec<ReservationLineRequest>,
}

impl ReservationRequest {
    pub fn new(user_identity: impl Into<String>, lines: Vec<ReservationLineRequest>) -> Self {
        Self {
            user_identity: user_identity.into(),
            lines,
        }
    }

    /// Parse a request from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A line that passed every check and is ready to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLine {
    pub medication: Medication,
    /// Absent when the medication needs no prescription
    pub prescription: Option<Prescription>,
    pub stock: Stock,
    pub quantity: i64,
    pub dosage: String,
    /// Prescription months consumed by this line, if linked to a prescription
    pub effective_months: Option<i64>,
}

impl ValidatedLine {
    pub fn unit_price(&self) -> f64 {
        self.medication.unit_price()
    }

    pub fn total_price(&self) -> f64 {
        self.unit_price() * self.quantity as f64
    }
}

/// Priced summary of one committed line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationLineResult {
    pub medication_name: String,
    pub dosage: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription_id: Option<i64>,
    /// Months left on the prescription after this reservation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub months_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_note: Option<String>,
}

/// Result of a committed reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationReceipt {
    pub lines: Vec<ReservationLineResult>,
    pub total_price: f64,
}

/// Caller-facing response, in the shape sent back over JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<ReservationLineResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ReservationResponse {
    pub fn reserved(receipt: ReservationReceipt) -> Self {
        Self {
            success: true,
            total_price: Some(receipt.total_price),
            lines: receipt.lines,
            errors: Vec::new(),
        }
    }

    pub fn rejected(errors: Vec<String>) -> Self {
        Self {
            success: false,
            total_price: None,
            lines: Vec::new(),
            errors,
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
