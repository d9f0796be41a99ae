//! Per-line reservation checks.
//!
//! Each line runs catalogue → prescription → equivalence → stock, stopping at
//! the first failure. Lines are independent except that packs and months
//! claimed by earlier lines of the same batch count against later ones.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::ReservationError;
use crate::db::{Database, DbResult};
use crate::dosage::EquivalenceCalculator;
use crate::models::{
    Medication, Prescription, ReservationLineRequest, Stock, User, ValidatedLine,
};

/// Outcome of validating one line.
pub type LineOutcome = Result<ValidatedLine, ReservationError>;

/// Packs and months already promised to earlier lines of a batch.
#[derive(Debug, Default)]
struct Claims {
    stock: HashMap<i64, i64>,
    months: HashMap<i64, i64>,
}

impl Claims {
    fn stock_claimed(&self, stock_id: i64) -> i64 {
        self.stock.get(&stock_id).copied().unwrap_or(0)
    }

    fn months_claimed(&self, prescription_id: i64) -> i64 {
        self.months.get(&prescription_id).copied().unwrap_or(0)
    }

    fn record(&mut self, line: &ValidatedLine) {
        *self.stock.entry(line.stock.id).or_default() += line.quantity;
        if let (Some(rx), Some(months)) = (&line.prescription, line.effective_months) {
            *self.months.entry(rx.id).or_default() += months;
        }
    }
}

/// Read-only validator for reservation lines.
pub struct Validator<'a> {
    db: &'a Database,
    calculator: EquivalenceCalculator,
    as_of: DateTime<Utc>,
}

impl<'a> Validator<'a> {
    /// Create a validator that judges prescription activity as of now.
    pub fn new(db: &'a Database, calculator: EquivalenceCalculator) -> Self {
        Self {
            db,
            calculator,
            as_of: Utc::now(),
        }
    }

    /// Judge prescription activity as of `as_of` instead of now.
    pub fn at(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }

    /// Validate every line for `user`, in order.
    ///
    /// Never stops early: the result has one entry per input line. Store
    /// failures abort validation and are returned as `Err`.
    pub fn validate(&self, user: &User, lines: &[ReservationLineRequest]) -> DbResult<Vec<LineOutcome>> {
        let mut claims = Claims::default();
        let mut outcomes = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let outcome = self.validate_line(user, line, &claims)?;
            match &outcome {
                Ok(validated) => {
                    debug!(line = index + 1, medication = %line.medication_name, "Line validated");
                    claims.record(validated);
                }
                Err(e) => {
                    debug!(line = index + 1, medication = %line.medication_name, error = %e, "Line rejected");
                }
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    fn validate_line(
        &self,
        user: &User,
        line: &ReservationLineRequest,
        claims: &Claims,
    ) -> DbResult<LineOutcome> {
        if line.quantity <= 0 {
            return Ok(Err(ReservationError::InvalidRequest(format!(
                "quantity for {} must be positive, got {}",
                line.medication_name, line.quantity
            ))));
        }

        // 1. Catalogue
        let Some(medication) = self.db.find_medication_by_name(&line.medication_name)? else {
            return Ok(Err(self.medication_not_found(&line.medication_name)?));
        };

        // 2. Prescription
        let prescription = if medication.requires_prescription {
            match self
                .db
                .find_active_prescription(user.id, medication.id, &self.as_of)?
            {
                Some(rx) => Some(rx),
                None => {
                    return Ok(Err(ReservationError::PrescriptionRequired {
                        medication: medication.name_en,
                    }))
                }
            }
        } else {
            None
        };

        // 3. Equivalence against the prescription
        let effective_months = match &prescription {
            Some(rx) => match self.effective_months(&medication, rx, line, claims) {
                Ok(months) => Some(months),
                Err(e) => return Ok(Err(e)),
            },
            None => None,
        };

        // 4. Stock
        let stock = match self.resolve_stock(&medication, line, claims)? {
            Ok(stock) => stock,
            Err(e) => return Ok(Err(e)),
        };

        Ok(Ok(ValidatedLine {
            medication,
            prescription,
            stock,
            quantity: line.quantity,
            dosage: line.dosage.clone(),
            effective_months,
        }))
    }

    /// Months this line debits from `rx`, checked against what is left.
    fn effective_months(
        &self,
        medication: &Medication,
        rx: &Prescription,
        line: &ReservationLineRequest,
        claims: &Claims,
    ) -> Result<i64, ReservationError> {
        let months = match &rx.dosage {
            Some(prescribed) => self
                .calculator
                .equivalent_months(&line.dosage, line.quantity, prescribed)
                .ok_or_else(|| ReservationError::DosageIncompatible {
                    medication: medication.name_en.clone(),
                    requested_dosage: line.dosage.clone(),
                    requested_quantity: line.quantity,
                    prescribed_dosage: prescribed.clone(),
                })?,
            // No strength on the prescription: one pack is one month
            None => line.quantity,
        };

        let remaining = rx.months_remaining() - claims.months_claimed(rx.id);
        if months > remaining {
            return Err(ReservationError::InsufficientPrescriptionEntitlement {
                medication: medication.name_en.clone(),
                needed_months: months,
                remaining_months: remaining.max(0),
            });
        }

        Ok(months)
    }

    fn resolve_stock(
        &self,
        medication: &Medication,
        line: &ReservationLineRequest,
        claims: &Claims,
    ) -> DbResult<Result<Stock, ReservationError>> {
        let Some(stock) = self
            .db
            .find_stock(medication.id, Some(&line.dosage))?
            .into_iter()
            .next()
        else {
            let stocked: Vec<String> = self
                .db
                .find_stock(medication.id, None)?
                .into_iter()
                .map(|s| s.dosage)
                .collect();
            let detail = if stocked.is_empty() {
                format!("{} {} is not stocked", medication.name_en, line.dosage)
            } else {
                format!(
                    "{} {} is not stocked (available strengths: {})",
                    medication.name_en,
                    line.dosage,
                    stocked.join(", ")
                )
            };
            return Ok(Err(ReservationError::NotFound(detail)));
        };

        let available = stock.remaining_after(claims.stock_claimed(stock.id));
        if line.quantity > available {
            return Ok(Err(ReservationError::InsufficientStock {
                medication: medication.name_en.clone(),
                dosage: stock.dosage.clone(),
                requested: line.quantity,
                available,
            }));
        }

        Ok(Ok(stock))
    }

    fn medication_not_found(&self, name: &str) -> DbResult<ReservationError> {
        let detail = match self.db.suggest_medication_name(name)? {
            Some(suggestion) => format!("medication '{}' (did you mean '{}'?)", name, suggestion),
            None => format!("medication '{}'", name),
        };
        Ok(ReservationError::NotFound(detail))
    }
}
