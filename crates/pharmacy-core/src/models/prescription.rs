//! Customer and prescription models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pharmacy customer, identified at the counter by a 4-digit PIN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub pin: String,
    pub name: String,
    pub created_at: String,
}

impl User {
    /// Create a new user. The ID is assigned on insert.
    pub fn new(pin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            pin: pin.into(),
            name: name.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// PINs are exactly four ASCII digits.
    pub fn is_valid_pin(pin: &str) -> bool {
        pin.len() == 4 && pin.chars().all(|c| c.is_ascii_digit())
    }
}

/// A prescription entitling a user to a number of monthly packs of a medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: i64,
    pub user_id: i64,
    pub medication_id: i64,
    /// Strength the prescription was written for (one pack per month)
    pub dosage: Option<String>,
    /// Total months of entitlement
    pub months_supply: i64,
    /// Months already dispensed
    pub months_fulfilled: i64,
    pub created_at: String,
    /// RFC 3339 expiry, if any
    pub expires_at: Option<String>,
}

impl Prescription {
    /// Create a new, unfulfilled prescription. The ID is assigned on insert.
    pub fn new(user_id: i64, medication_id: i64, dosage: Option<String>, months_supply: i64) -> Self {
        Self {
            id: 0,
            user_id,
            medication_id,
            dosage,
            months_supply,
            months_fulfilled: 0,
            created_at: Utc::now().to_rfc3339(),
            expires_at: None,
        }
    }

    pub fn months_remaining(&self) -> i64 {
        self.months_supply - self.months_fulfilled
    }

    pub fn is_fully_fulfilled(&self) -> bool {
        self.months_fulfilled >= self.months_supply
    }

    /// Check whether the prescription has expired as of `now`.
    ///
    /// An expiry that cannot be parsed counts as expired.
    pub fn is_expired_at(&self, now: &DateTime<Utc>) -> bool {
        match &self.expires_at {
            None => false,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(expiry) => expiry.with_timezone(&Utc) <= *now,
                Err(_) => true,
            },
        }
    }

    /// Unfulfilled and unexpired as of `now`.
    pub fn is_active_at(&self, now: &DateTime<Utc>) -> bool {
        !self.is_fully_fulfilled() && !self.is_expired_at(now)
    }
}
