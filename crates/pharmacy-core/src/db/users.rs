//! Customer database operations.

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::{Database, DbError, DbResult};
use crate::models::User;

impl Database {
    /// Insert a user and return the new ID.
    pub fn insert_user(&self, user: &User) -> DbResult<i64> {
        if !User::is_valid_pin(&user.pin) {
            return Err(DbError::Constraint(format!(
                "PIN must be exactly 4 digits, got '{}'",
                user.pin
            )));
        }

        self.conn.execute(
            "INSERT INTO users (pin, name, created_at) VALUES (?1, ?2, ?3)",
            params![user.pin, user.name, user.created_at],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, "Inserted user");
        Ok(id)
    }

    /// Get a user by ID.
    pub fn get_user(&self, id: i64) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, pin, name, created_at FROM users WHERE id = ?",
                [id],
                user_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Find a user by their 4-digit PIN.
    pub fn find_user_by_pin(&self, pin: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, pin, name, created_at FROM users WHERE pin = ?",
                [pin.trim()],
                user_from_row,
            )
            .optional()
            .map_err(Into::into)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        pin: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}
