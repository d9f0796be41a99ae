//! Reservation engine.
//!
//! A batch is validated line by line against the catalogue, the customer's
//! prescriptions and the warehouse stock. Only when every line passes is it
//! committed, in one transaction:
//!
//! ```text
//! request ──▶ user lookup ──▶ Validator (per line) ──┬─▶ any failure ──▶ Rejected(errors)
//!                                                    │
//!                                                    └─▶ all valid ──▶ Committer ──▶ Reserved(receipt)
//! ```

mod committer;
mod validator;

pub use committer::Committer;
pub use validator::{LineOutcome, Validator};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::EquivalenceConfig;
use crate::db::{Database, DbResult};
use crate::dosage::EquivalenceCalculator;
use crate::models::{ReservationReceipt, ReservationRequest, ReservationResponse, ValidatedLine};

/// Why a reservation line, or a whole batch, was refused.
///
/// The display text of each variant is what the caller sees in the
/// response's error list.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReservationError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{medication} requires a prescription and no active prescription was found")]
    PrescriptionRequired { medication: String },

    #[error(
        "{medication}: {requested_quantity} x {requested_dosage} is not equivalent to the prescribed {prescribed_dosage}"
    )]
    DosageIncompatible {
        medication: String,
        requested_dosage: String,
        requested_quantity: i64,
        prescribed_dosage: String,
    },

    #[error(
        "{medication}: request needs {needed_months} prescription months but only {remaining_months} remain"
    )]
    InsufficientPrescriptionEntitlement {
        medication: String,
        needed_months: i64,
        remaining_months: i64,
    },

    #[error("{medication} {dosage}: requested {requested}, only {available} in stock")]
    InsufficientStock {
        medication: String,
        dosage: String,
        requested: i64,
        available: i64,
    },

    #[error("Reservation could not be committed: {0}")]
    CommitFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Final result of a reservation batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationOutcome {
    Reserved(ReservationReceipt),
    /// Nothing was written. Errors are in line order.
    Rejected(Vec<ReservationError>),
}

impl ReservationOutcome {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReservationOutcome::Reserved(_))
    }

    pub fn errors(&self) -> &[ReservationError] {
        match self {
            ReservationOutcome::Reserved(_) => &[],
            ReservationOutcome::Rejected(errors) => errors,
        }
    }

    /// Convert to the caller-facing response shape.
    pub fn into_response(self) -> ReservationResponse {
        match self {
            ReservationOutcome::Reserved(receipt) => ReservationResponse::reserved(receipt),
            ReservationOutcome::Rejected(errors) => {
                ReservationResponse::rejected(errors.iter().map(ToString::to_string).collect())
            }
        }
    }
}

/// Validates and commits reservation batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationEngine {
    calculator: EquivalenceCalculator,
}

impl ReservationEngine {
    pub fn new(calculator: EquivalenceCalculator) -> Self {
        Self { calculator }
    }

    pub fn from_config(config: &EquivalenceConfig) -> Self {
        Self::new(config.calculator())
    }

    pub fn calculator(&self) -> &EquivalenceCalculator {
        &self.calculator
    }

    /// Run every check without writing anything.
    ///
    /// Returns the validated lines when the whole batch passes, or every
    /// failure in line order. Calling it twice against an unchanged store
    /// gives the same answer.
    pub fn validate(
        &self,
        db: &Database,
        request: &ReservationRequest,
    ) -> DbResult<Result<Vec<ValidatedLine>, Vec<ReservationError>>> {
        if request.lines.is_empty() {
            return Ok(Err(vec![ReservationError::InvalidRequest(
                "a reservation needs at least one line".to_string(),
            )]));
        }

        let Some(user) = db.find_user_by_pin(&request.user_identity)? else {
            return Ok(Err(vec![ReservationError::NotFound(
                "no customer matches the given PIN".to_string(),
            )]));
        };

        let outcomes = Validator::new(db, self.calculator).validate(&user, &request.lines)?;

        let mut lines = Vec::with_capacity(outcomes.len());
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(line) => lines.push(line),
                Err(e) => errors.push(e),
            }
        }

        Ok(if errors.is_empty() { Ok(lines) } else { Err(errors) })
    }

    /// Validate and, if every line passes, commit the batch atomically.
    ///
    /// Store failures while validating are returned as `Err`; once
    /// validation has passed, any failure is reported in the outcome and
    /// nothing is written.
    pub fn reserve(&self, db: &mut Database, request: &ReservationRequest) -> DbResult<ReservationOutcome> {
        let lines = match self.validate(db, request)? {
            Ok(lines) => lines,
            Err(errors) => {
                warn!(lines = request.lines.len(), errors = errors.len(), "Reservation rejected");
                return Ok(ReservationOutcome::Rejected(errors));
            }
        };

        match Committer::new(db).commit(&lines) {
            Ok(receipt) => {
                info!(
                    lines = receipt.lines.len(),
                    total_price = receipt.total_price,
                    "Reservation committed"
                );
                Ok(ReservationOutcome::Reserved(receipt))
            }
            Err(e) => {
                warn!(error = %e, "Reservation commit rolled back");
                Ok(ReservationOutcome::Rejected(vec![e]))
            }
        }
    }
}
