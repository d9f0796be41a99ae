//! All-or-nothing commit of validated reservation lines.

use tracing::{debug, warn};

use super::ReservationError;
use crate::db::{
    decrement_stock, increment_prescription_fulfillment, prescription_months_remaining,
    stock_quantity, Database, DbError,
};
use crate::models::{ReservationLineResult, ReservationReceipt, ValidatedLine};

/// Applies validated lines to the store in a single transaction.
///
/// Every write is guarded by the row it changes, so a concurrent reservation
/// that took the last pack in between validation and commit is caught here
/// and the whole batch rolls back.
pub struct Committer<'a> {
    db: &'a mut Database,
}

impl<'a> Committer<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    /// Commit `lines` and return the priced receipt.
    pub fn commit(&mut self, lines: &[ValidatedLine]) -> Result<ReservationReceipt, ReservationError> {
        if lines.is_empty() {
            return Err(ReservationError::InvalidRequest(
                "nothing to commit".to_string(),
            ));
        }

        // Reference data, read before the write lock is taken
        let notes = lines
            .iter()
            .map(|line| self.usage_note(line))
            .collect::<Result<Vec<_>, _>>()
            .map_err(commit_failed)?;

        let tx = self.db.immediate_transaction().map_err(commit_failed)?;
        let mut results = Vec::with_capacity(lines.len());
        let mut total_price = 0.0;

        for (line, usage_note) in lines.iter().zip(notes) {
            if !decrement_stock(&tx, line.stock.id, line.quantity).map_err(commit_failed)? {
                let available = stock_quantity(&tx, line.stock.id)
                    .map_err(commit_failed)?
                    .unwrap_or(0);
                warn!(stock_id = line.stock.id, requested = line.quantity, available, "Stock guard rejected commit");
                return Err(ReservationError::InsufficientStock {
                    medication: line.medication.name_en.clone(),
                    dosage: line.stock.dosage.clone(),
                    requested: line.quantity,
                    available,
                });
            }

            let mut prescription_id = None;
            let mut months_remaining = None;
            if let (Some(rx), Some(months)) = (&line.prescription, line.effective_months) {
                if !increment_prescription_fulfillment(&tx, rx.id, months).map_err(commit_failed)? {
                    let remaining = prescription_months_remaining(&tx, rx.id)
                        .map_err(commit_failed)?
                        .unwrap_or(0);
                    warn!(prescription_id = rx.id, months, remaining, "Prescription guard rejected commit");
                    return Err(ReservationError::InsufficientPrescriptionEntitlement {
                        medication: line.medication.name_en.clone(),
                        needed_months: months,
                        remaining_months: remaining.max(0),
                    });
                }
                prescription_id = Some(rx.id);
                months_remaining = prescription_months_remaining(&tx, rx.id).map_err(commit_failed)?;
            }

            let line_total = line.total_price();
            total_price += line_total;
            debug!(medication = %line.medication.name_en, quantity = line.quantity, line_total, "Line applied");

            results.push(ReservationLineResult {
                medication_name: line.medication.name_en.clone(),
                dosage: line.stock.dosage.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price(),
                total_price: line_total,
                prescription_id,
                months_remaining,
                usage_note,
            });
        }

        tx.commit().map_err(|e| commit_failed(e.into()))?;

        Ok(ReservationReceipt {
            lines: results,
            total_price,
        })
    }

    fn usage_note(&self, line: &ValidatedLine) -> Result<Option<String>, DbError> {
        let instructions = self
            .db
            .dosage_instructions(line.medication.id, Some(&line.stock.dosage))?;
        Ok(instructions.first().and_then(|i| i.usage_note()))
    }
}

fn commit_failed(e: DbError) -> ReservationError {
    ReservationError::CommitFailed(e.to_string())
}
