//! Prescription database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use tracing::debug;

use super::{Database, DbResult};
use crate::models::Prescription;

const PRESCRIPTION_COLUMNS: &str = "id, user_id, medication_id, dosage, months_supply, \
                                    months_fulfilled, created_at, expires_at";

/// SQL predicate for an active prescription; `?{n}` is the as-of timestamp.
fn active_predicate(as_of_param: usize) -> String {
    format!(
        "months_fulfilled < months_supply \
         AND (expires_at IS NULL OR julianday(expires_at) > julianday(?{}))",
        as_of_param
    )
}

impl Database {
    /// Insert a prescription and return the new ID.
    pub fn insert_prescription(&self, rx: &Prescription) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                user_id, medication_id, dosage, months_supply,
                months_fulfilled, created_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                rx.user_id,
                rx.medication_id,
                rx.dosage,
                rx.months_supply,
                rx.months_fulfilled,
                rx.created_at,
                rx.expires_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, user_id = rx.user_id, medication_id = rx.medication_id, "Inserted prescription");
        Ok(id)
    }

    /// Get a prescription by ID.
    pub fn get_prescription(&self, id: i64) -> DbResult<Option<Prescription>> {
        let sql = format!("SELECT {} FROM prescriptions WHERE id = ?", PRESCRIPTION_COLUMNS);
        self.conn
            .query_row(&sql, [id], prescription_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Find the newest active prescription a user holds for a medication.
    pub fn find_active_prescription(
        &self,
        user_id: i64,
        medication_id: i64,
        as_of: &DateTime<Utc>,
    ) -> DbResult<Option<Prescription>> {
        let sql = format!(
            r#"
            SELECT {} FROM prescriptions
            WHERE user_id = ?1 AND medication_id = ?2 AND {}
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            PRESCRIPTION_COLUMNS,
            active_predicate(3)
        );
        self.conn
            .query_row(
                &sql,
                params![user_id, medication_id, as_of.to_rfc3339()],
                prescription_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List a user's prescriptions, newest first.
    pub fn list_prescriptions_for_user(
        &self,
        user_id: i64,
        active_only: bool,
        as_of: &DateTime<Utc>,
    ) -> DbResult<Vec<Prescription>> {
        let filter = if active_only {
            active_predicate(2)
        } else {
            "?2 IS NOT NULL".to_string()
        };
        let sql = format!(
            r#"
            SELECT {} FROM prescriptions
            WHERE user_id = ?1 AND {}
            ORDER BY created_at DESC, id DESC
            "#,
            PRESCRIPTION_COLUMNS, filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, as_of.to_rfc3339()], prescription_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List prescriptions of the user holding `pin`; empty for an unknown PIN.
    pub fn list_prescriptions_for_pin(
        &self,
        pin: &str,
        active_only: bool,
        as_of: &DateTime<Utc>,
    ) -> DbResult<Vec<Prescription>> {
        match self.find_user_by_pin(pin)? {
            Some(user) => self.list_prescriptions_for_user(user.id, active_only, as_of),
            None => Ok(Vec::new()),
        }
    }
}

/// Add `months` to a prescription's fulfilment inside a transaction.
///
/// The update only applies while the new total stays within the supply;
/// returns `false` when the guard rejected it or the row does not exist.
pub fn increment_prescription_fulfillment(
    tx: &Transaction<'_>,
    prescription_id: i64,
    months: i64,
) -> DbResult<bool> {
    let rows_affected = tx.execute(
        r#"
        UPDATE prescriptions
        SET months_fulfilled = months_fulfilled + ?1
        WHERE id = ?2 AND months_fulfilled + ?1 <= months_supply
        "#,
        params![months, prescription_id],
    )?;
    Ok(rows_affected == 1)
}

/// Remaining months of a prescription as seen inside a transaction.
pub fn prescription_months_remaining(
    tx: &Transaction<'_>,
    prescription_id: i64,
) -> DbResult<Option<i64>> {
    tx.query_row(
        "SELECT months_supply - months_fulfilled FROM prescriptions WHERE id = ?",
        [prescription_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn prescription_from_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        medication_id: row.get(2)?,
        dosage: row.get(3)?,
        months_supply: row.get(4)?,
        months_fulfilled: row.get(5)?,
        created_at: row.get(6)?,
        expires_at: row.get(7)?,
    })
}
