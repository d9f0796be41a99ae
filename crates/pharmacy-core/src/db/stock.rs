//! Stock database operations.
//!
//! Quantities only ever go down through [`decrement_stock`], which runs inside
//! the reservation transaction and refuses to take more than is on hand.

use rusqlite::{params, OptionalExtension, Row, Transaction};
use tracing::debug;

use super::{Database, DbError, DbResult};
use crate::models::{dosage_key, Stock, StockAvailability};

const STOCK_COLUMNS: &str = "id, medication_id, dosage, quantity, updated_at";

impl Database {
    /// Insert a stock row and return the new ID.
    pub fn insert_stock(&self, stock: &Stock) -> DbResult<i64> {
        self.conn.execute(
            "INSERT INTO stock (medication_id, dosage, quantity, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![stock.medication_id, stock.dosage, stock.quantity, stock.updated_at],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, medication_id = stock.medication_id, dosage = %stock.dosage, "Inserted stock");
        Ok(id)
    }

    /// Get a stock row by ID.
    pub fn get_stock(&self, id: i64) -> DbResult<Option<Stock>> {
        let sql = format!("SELECT {} FROM stock WHERE id = ?", STOCK_COLUMNS);
        self.conn
            .query_row(&sql, [id], stock_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Stock rows of a medication, all strengths or only `dosage`.
    ///
    /// Strength labels match ignoring case and whitespace.
    pub fn find_stock(&self, medication_id: i64, dosage: Option<&str>) -> DbResult<Vec<Stock>> {
        let sql = format!(
            "SELECT {} FROM stock WHERE medication_id = ? ORDER BY dosage",
            STOCK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([medication_id], stock_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match dosage {
            Some(wanted) => {
                let wanted = dosage_key(wanted);
                rows.into_iter()
                    .filter(|s| dosage_key(&s.dosage) == wanted)
                    .collect()
            }
            None => rows,
        })
    }

    /// Summarise availability of a medication, with alternative strengths.
    pub fn check_availability(
        &self,
        medication_id: i64,
        dosage: Option<&str>,
    ) -> DbResult<StockAvailability> {
        let rows = self.find_stock(medication_id, None)?;
        Ok(StockAvailability::from_rows(medication_id, dosage, rows))
    }

    /// Stock rows at or below `threshold` packs, emptiest first.
    pub fn list_low_stock(&self, threshold: i64) -> DbResult<Vec<Stock>> {
        let sql = format!(
            "SELECT {} FROM stock WHERE quantity <= ? ORDER BY quantity, id",
            STOCK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([threshold], stock_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Overwrite the quantity of a stock row (restocking, stock takes).
    pub fn set_stock_quantity(&self, id: i64, quantity: i64) -> DbResult<()> {
        if quantity < 0 {
            return Err(DbError::Constraint(format!(
                "Stock quantity cannot be negative, got {}",
                quantity
            )));
        }

        let rows_affected = self.conn.execute(
            "UPDATE stock SET quantity = ?1, updated_at = ?2 WHERE id = ?3",
            params![quantity, chrono::Utc::now().to_rfc3339(), id],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("stock {}", id)));
        }
        debug!(id, quantity, "Set stock quantity");
        Ok(())
    }
}

/// Take `amount` packs from a stock row inside a transaction.
///
/// The update only applies while enough packs remain; returns `false` when
/// the guard rejected it or the row does not exist.
pub fn decrement_stock(tx: &Transaction<'_>, stock_id: i64, amount: i64) -> DbResult<bool> {
    let rows_affected = tx.execute(
        r#"
        UPDATE stock
        SET quantity = quantity - ?1, updated_at = ?2
        WHERE id = ?3 AND quantity >= ?1
        "#,
        params![amount, chrono::Utc::now().to_rfc3339(), stock_id],
    )?;
    Ok(rows_affected == 1)
}

/// Current quantity of a stock row as seen inside a transaction.
pub fn stock_quantity(tx: &Transaction<'_>, stock_id: i64) -> DbResult<Option<i64>> {
    tx.query_row(
        "SELECT quantity FROM stock WHERE id = ?",
        [stock_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn stock_from_row(row: &Row<'_>) -> rusqlite::Result<Stock> {
    Ok(Stock {
        id: row.get(0)?,
        medication_id: row.get(1)?,
        dosage: row.get(2)?,
        quantity: row.get(3)?,
        updated_at: row.get(4)?,
    })
}
