//! Medication catalogue database operations.

use rusqlite::{params, OptionalExtension, Row};
use strsim::jaro_winkler;
use tracing::debug;

use super::{Database, DbResult};
use crate::models::{DosageInstruction, Ingredient, Medication};

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.85;

const MEDICATION_COLUMNS: &str = "id, name_en, name_he, description_en, description_he, \
                                  price, requires_prescription, created_at";

impl Database {
    /// Insert a medication and return its new ID.
    pub fn insert_medication(&self, med: &Medication) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO medications (
                name_en, name_he, description_en, description_he,
                price, requires_prescription, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                med.name_en,
                med.name_he,
                med.description_en,
                med.description_he,
                med.price,
                med.requires_prescription,
                med.created_at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, name = %med.name_en, "Inserted medication");
        Ok(id)
    }

    /// Link an active ingredient to a medication, creating the ingredient if new.
    pub fn add_ingredient(
        &self,
        medication_id: i64,
        name_en: &str,
        name_he: Option<&str>,
    ) -> DbResult<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO ingredients (name_en, name_he) VALUES (?1, ?2)",
            params![name_en, name_he],
        )?;
        let ingredient_id: i64 = self.conn.query_row(
            "SELECT id FROM ingredients WHERE name_en = ?1 COLLATE NOCASE",
            [name_en],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO medication_ingredients (medication_id, ingredient_id) VALUES (?1, ?2)",
            params![medication_id, ingredient_id],
        )?;
        Ok(ingredient_id)
    }

    /// Get a medication by ID, optionally with its ingredients.
    pub fn get_medication(&self, id: i64, include_ingredients: bool) -> DbResult<Option<Medication>> {
        let sql = format!("SELECT {} FROM medications WHERE id = ?", MEDICATION_COLUMNS);
        let med = self
            .conn
            .query_row(&sql, [id], medication_from_row)
            .optional()?;

        match med {
            Some(med) if include_ingredients => Ok(Some(self.with_ingredients(med)?)),
            other => Ok(other),
        }
    }

    /// Find a medication by its English or Hebrew name, ignoring case.
    pub fn find_medication_by_name(&self, name: &str) -> DbResult<Option<Medication>> {
        let sql = format!(
            r#"
            SELECT {} FROM medications
            WHERE name_en = ?1 COLLATE NOCASE OR name_he = ?1 COLLATE NOCASE
            ORDER BY id
            LIMIT 1
            "#,
            MEDICATION_COLUMNS
        );
        self.conn
            .query_row(&sql, [name.trim()], medication_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Search medications whose English or Hebrew name contains `query`.
    pub fn search_medications(&self, query: &str) -> DbResult<Vec<Medication>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let sql = format!(
            r#"
            SELECT {} FROM medications
            WHERE name_en LIKE ?1 ESCAPE '\' OR name_he LIKE ?1 ESCAPE '\'
            ORDER BY name_en
            "#,
            MEDICATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([pattern], medication_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Find medications containing an ingredient (partial name match).
    pub fn find_medications_by_ingredient(&self, ingredient: &str) -> DbResult<Vec<Medication>> {
        let pattern = format!("%{}%", escape_like(ingredient.trim()));
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT m.id, m.name_en, m.name_he, m.description_en, m.description_he,
                   m.price, m.requires_prescription, m.created_at
            FROM medications m
            JOIN medication_ingredients mi ON m.id = mi.medication_id
            JOIN ingredients i ON i.id = mi.ingredient_id
            WHERE i.name_en LIKE ?1 ESCAPE '\' OR i.name_he LIKE ?1 ESCAPE '\'
            ORDER BY m.name_en
            "#,
        )?;
        let rows = stmt.query_map([pattern], medication_from_row)?;

        let mut meds = Vec::new();
        for med in rows {
            meds.push(self.with_ingredients(med?)?);
        }
        Ok(meds)
    }

    /// Get all medications ordered by English name.
    pub fn list_medications(&self) -> DbResult<Vec<Medication>> {
        let sql = format!("SELECT {} FROM medications ORDER BY name_en", MEDICATION_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], medication_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Closest catalogue name to a misspelled `name`, if any is close enough.
    pub fn suggest_medication_name(&self, name: &str) -> DbResult<Option<String>> {
        let wanted = name.trim().to_lowercase();
        let mut stmt = self.conn.prepare("SELECT name_en, name_he FROM medications")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut best: Option<(f64, String)> = None;
        for row in rows {
            let (name_en, name_he) = row?;
            for candidate in std::iter::once(name_en).chain(name_he) {
                let score = jaro_winkler(&wanted, &candidate.to_lowercase());
                if score >= SUGGESTION_THRESHOLD && best.as_ref().map_or(true, |(s, _)| score > *s) {
                    best = Some((score, candidate));
                }
            }
        }

        Ok(best.map(|(_, name)| name))
    }

    /// Insert or replace dosing guidance for a medication strength.
    pub fn insert_dosage_instruction(&self, instr: &DosageInstruction) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO dosage_instructions (
                medication_id, dosage, adult_dose, child_dose,
                frequency, max_daily, instructions, warnings
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(medication_id, dosage) DO UPDATE SET
                adult_dose = excluded.adult_dose,
                child_dose = excluded.child_dose,
                frequency = excluded.frequency,
                max_daily = excluded.max_daily,
                instructions = excluded.instructions,
                warnings = excluded.warnings
            "#,
            params![
                instr.medication_id,
                instr.dosage,
                instr.adult_dose,
                instr.child_dose,
                instr.frequency,
                instr.max_daily,
                instr.instructions,
                instr.warnings,
            ],
        )?;
        Ok(())
    }

    /// Dosing guidance for a medication, for one strength or for all of them.
    pub fn dosage_instructions(
        &self,
        medication_id: i64,
        dosage: Option<&str>,
    ) -> DbResult<Vec<DosageInstruction>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT medication_id, dosage, adult_dose, child_dose,
                   frequency, max_daily, instructions, warnings
            FROM dosage_instructions
            WHERE medication_id = ?1 AND (?2 IS NULL OR dosage = ?2 COLLATE NOCASE)
            ORDER BY dosage
            "#,
        )?;
        let rows = stmt.query_map(params![medication_id, dosage], |row| {
            Ok(DosageInstruction {
                medication_id: row.get(0)?,
                dosage: row.get(1)?,
                adult_dose: row.get(2)?,
                child_dose: row.get(3)?,
                frequency: row.get(4)?,
                max_daily: row.get(5)?,
                instructions: row.get(6)?,
                warnings: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn with_ingredients(&self, mut med: Medication) -> DbResult<Medication> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT i.id, i.name_en, i.name_he
            FROM ingredients i
            JOIN medication_ingredients mi ON i.id = mi.ingredient_id
            WHERE mi.medication_id = ?
            ORDER BY i.name_en
            "#,
        )?;
        let rows = stmt.query_map([med.id], |row| {
            Ok(Ingredient {
                id: row.get(0)?,
                name_en: row.get(1)?,
                name_he: row.get(2)?,
            })
        })?;
        med.ingredients = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(med)
    }
}

fn medication_from_row(row: &Row<'_>) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: row.get(0)?,
        name_en: row.get(1)?,
        name_he: row.get(2)?,
        description_en: row.get(3)?,
        description_he: row.get(4)?,
        price: row.get(5)?,
        requires_prescription: row.get(6)?,
        created_at: row.get(7)?,
        ingredients: Vec::new(),
    })
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
